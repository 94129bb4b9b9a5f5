//! End-to-end API tests over the assembled router (in-memory SQLite)

use axum::Router;
use axum::body::Body;
use http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use practice_server::{ServerState, build_app};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn app() -> Router {
    let state = ServerState::for_tests().await.unwrap();
    build_app(&state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login_as(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_string()
}

async fn admin(app: &Router) -> String {
    login_as(app, "admin", "admin-password").await
}

async fn patient(app: &Router, token: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/patients",
        Some(token),
        Some(json!({ "first_name": "Ada", "last_name": "Lovelace", "date_of_birth": "1990-12-10" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn api_requires_token() {
    let app = app().await;
    let (status, _) = send(&app, Method::GET, "/api/patients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/patients", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_and_me() {
    let app = app().await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = admin(&app).await;
    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "admin");
    assert_eq!(me["role"], "admin");
}

#[tokio::test]
async fn patient_lifecycle() {
    let app = app().await;
    let token = admin(&app).await;
    let id = patient(&app, &token).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/patients/{id}"),
        Some(&token),
        Some(json!({ "phone": "+1 555 0100" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phone"], "+1 555 0100");
    assert_eq!(body["first_name"], "Ada");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/patients",
        Some(&token),
        Some(json!({ "first_name": "Late", "last_name": "Born", "date_of_birth": "2999-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/patients/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, page) = send(&app, Method::GET, "/api/patients?is_active=true", Some(&token), None).await;
    assert_eq!(page["total"], 0);
    let (_, page) = send(&app, Method::GET, "/api/patients", Some(&token), None).await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn order_to_paid_invoice() {
    let app = app().await;
    let token = admin(&app).await;
    let patient_id = patient(&app, &token).await;

    let (status, order) = send(
        &app,
        Method::POST,
        "/api/orders",
        Some(&token),
        Some(json!({
            "patient_id": patient_id,
            "items": [{ "name": "Initial consult", "quantity": 1, "unit_price": 120.0 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{order}");

    let (status, invoice) = send(
        &app,
        Method::POST,
        "/api/invoices/from-order",
        Some(&token),
        Some(json!({ "order_id": order["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{invoice}");
    assert_eq!(invoice["status"], "draft");
    assert_eq!(invoice["total"], 120.0);
    let id = invoice["id"].as_i64().unwrap();

    // Payments need an issued invoice
    let pay = |amount: f64| json!({ "amount": amount, "method": "card" });
    let (status, _) = send(&app, Method::POST, &format!("/api/invoices/{id}/payments"), Some(&token), Some(pay(10.0))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, issued) = send(&app, Method::POST, &format!("/api/invoices/{id}/issue"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{issued}");
    assert_eq!(issued["status"], "issued");
    assert!(issued["due_date"].is_string());

    let (status, body) = send(&app, Method::POST, &format!("/api/invoices/{id}/payments"), Some(&token), Some(pay(50.0))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["balance"], 70.0);
    assert_eq!(body["invoice"]["status"], "issued");

    let (status, _) = send(&app, Method::POST, &format!("/api/invoices/{id}/payments"), Some(&token), Some(pay(80.0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::POST, &format!("/api/invoices/{id}/payments"), Some(&token), Some(pay(70.0))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invoice"]["status"], "paid");
    assert_eq!(body["invoice"]["payments"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::POST, &format!("/api/invoices/{id}/void"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn form_submission_reports_each_field() {
    let app = app().await;
    let token = admin(&app).await;
    let patient_id = patient(&app, &token).await;

    let (status, template) = send(
        &app,
        Method::POST,
        "/api/forms",
        Some(&token),
        Some(json!({
            "name": "Intake",
            "fields": [
                { "key": "age", "label": "Age", "kind": "number", "required": true, "min": 0, "max": 130 },
                { "key": "consent", "label": "Consent", "kind": "checkbox", "required": true }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{template}");
    let id = template["id"].as_i64().unwrap();
    assert_eq!(template["version"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/forms/{id}/submissions"),
        Some(&token),
        Some(json!({ "patient_id": patient_id, "answers": { "age": 200, "shoe_size": 9 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = body["details"].as_object().unwrap();
    assert!(details.contains_key("age"));
    assert!(details.contains_key("consent"));
    assert!(details.contains_key("shoe_size"));

    let (status, submission) = send(
        &app,
        Method::POST,
        &format!("/api/forms/{id}/submissions"),
        Some(&token),
        Some(json!({ "patient_id": patient_id, "answers": { "age": 34, "consent": true } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{submission}");
    assert_eq!(submission["template_version"], 1);

    // Templates with submissions cannot be deleted
    let (status, _) = send(&app, Method::DELETE, &format!("/api/forms/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, page) = send(
        &app,
        Method::GET,
        &format!("/api/form-submissions?patient_id={patient_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn front_desk_cannot_bill() {
    let app = app().await;
    let token = admin(&app).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/staff-users",
        Some(&token),
        Some(json!({
            "username": "desk",
            "display_name": "Front Desk",
            "password": "desk-password",
            "role": "front_desk"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let desk = login_as(&app, "desk", "desk-password").await;
    let (status, _) = send(&app, Method::GET, "/api/patients", Some(&desk), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/invoices", Some(&desk), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::GET, "/api/staff-users", Some(&desk), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn audit_chain_covers_writes() {
    let app = app().await;
    let token = admin(&app).await;
    patient(&app, &token).await;

    let (status, page) = send(
        &app,
        Method::GET,
        "/api/audit?resource_type=patient&action=created",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{page}");
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["operator_name"], "Administrator");

    let (status, report) = send(&app, Method::GET, "/api/audit/verify", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["chain_intact"], true);
    assert!(report["total_entries"].as_i64().unwrap() >= 2);
}

#[tokio::test]
async fn admin_account_guards() {
    let app = app().await;
    let token = admin(&app).await;
    let (_, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    let admin_id = me["id"].as_i64().unwrap();

    let (status, body) = send(&app, Method::DELETE, &format!("/api/staff-users/{admin_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["code"], 2003);

    let demote = json!({ "role": "clinician" });
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/staff-users/{admin_id}"),
        Some(&token),
        Some(demote.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["code"], 2004);

    // With a second admin the first one may step down
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/staff-users",
        Some(&token),
        Some(json!({
            "username": "deputy",
            "display_name": "Deputy",
            "password": "deputy-password",
            "role": "admin"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/staff-users/{admin_id}"),
        Some(&token),
        Some(demote),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"], "clinician");
}

#[tokio::test]
async fn blank_discount_code_is_rejected() {
    let app = app().await;
    let token = admin(&app).await;
    let discount = |code: &str| json!({ "name": "Spring", "code": code, "kind": "percentage", "value": 10.0 });

    let (status, body) = send(&app, Method::POST, "/api/discounts", Some(&token), Some(discount("   "))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["details"]["field"], "code");

    let (status, created) = send(&app, Method::POST, "/api/discounts", Some(&token), Some(discount("spring10"))).await;
    assert_eq!(status, StatusCode::OK, "{created}");
    assert_eq!(created["code"], "SPRING10");
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/discounts/{}", created["id"]),
        Some(&token),
        Some(json!({ "code": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
