//! JSON diff for audit details
//!
//! Compares before/after serializations of a record and lists the changed
//! fields. Nested objects are walked; numbers compare with a tolerance.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;

/// Float tolerance (REAL columns round-trip through f64)
const FLOAT_EPSILON: f64 = 1e-9;

/// Fields never written to audit details
const ALWAYS_EXCLUDED: &[&str] = &["id", "created_at", "updated_at"];

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(fa), Some(fb)) => (fa - fb).abs() < FLOAT_EPSILON,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(va, vb)| values_equal(va, vb))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, va)| b.get(key).is_some_and(|vb| values_equal(va, vb)))
        }
        _ => false,
    }
}

/// One changed field
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct FieldChange {
    /// Dotted path for nested fields
    pub field: String,
    pub from: Value,
    pub to: Value,
}

/// Per-resource snapshot settings
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Removed in addition to `id` and timestamps
    pub exclude_fields: &'static [&'static str],
}

pub fn get_config(resource_type: &str) -> AuditConfig {
    match resource_type {
        "staff_user" => AuditConfig {
            exclude_fields: &["hash_pass"],
        },
        // Derived counters
        "ticket" => AuditConfig {
            exclude_fields: &["last_message_at", "message_count"],
        },
        "invoice" => AuditConfig {
            exclude_fields: &["balance"],
        },
        _ => AuditConfig { exclude_fields: &[] },
    }
}

fn diff_json_recursive(from: &Value, to: &Value, path: &str, changes: &mut Vec<FieldChange>) {
    match (from, to) {
        (Value::Object(from_obj), Value::Object(to_obj)) => {
            // Sorted so details hash the same on every run
            let keys: BTreeSet<&String> = from_obj.keys().chain(to_obj.keys()).collect();
            for key in keys {
                let field_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                match (from_obj.get(key), to_obj.get(key)) {
                    (Some(f), Some(t)) => diff_json_recursive(f, t, &field_path, changes),
                    (Some(f), None) => changes.push(FieldChange {
                        field: field_path,
                        from: f.clone(),
                        to: Value::Null,
                    }),
                    (None, Some(t)) => changes.push(FieldChange {
                        field: field_path,
                        from: Value::Null,
                        to: t.clone(),
                    }),
                    (None, None) => {}
                }
            }
        }
        (f, t) => {
            if !values_equal(f, t) {
                changes.push(FieldChange {
                    field: path.to_string(),
                    from: f.clone(),
                    to: t.clone(),
                });
            }
        }
    }
}

fn filter_fields(value: &mut Value, exclude: &[&str]) {
    if let Value::Object(obj) = value {
        for field in ALWAYS_EXCLUDED.iter().chain(exclude) {
            obj.remove(*field);
        }
    }
}

fn to_filtered<T: Serialize>(value: &T, resource_type: &str) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(mut json) => {
            filter_fields(&mut json, get_config(resource_type).exclude_fields);
            Some(json)
        }
        Err(e) => {
            tracing::error!(error = %e, resource_type, "Failed to serialize audit details");
            None
        }
    }
}

/// Details for a create: filtered snapshot of the new record
pub fn create_snapshot<T: Serialize>(value: &T, resource_type: &str) -> Value {
    to_filtered(value, resource_type).unwrap_or_else(|| json!({"error": "serialization_failed"}))
}

/// Details for an update: `{"changes": [{"field", "from", "to"}, ...]}`
pub fn create_diff<T: Serialize>(from: &T, to: &T, resource_type: &str) -> Value {
    let (Some(from_json), Some(to_json)) =
        (to_filtered(from, resource_type), to_filtered(to, resource_type))
    else {
        return json!({"error": "serialization_failed"});
    };

    let mut changes = Vec::new();
    diff_json_recursive(&from_json, &to_json, "", &mut changes);

    if changes.is_empty() {
        json!({"changes": [], "note": "no_changes_detected"})
    } else {
        json!({"changes": changes})
    }
}

/// Details for a delete: the record's display name
pub fn create_delete_details(name: &str) -> Value {
    json!({"name": name})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestService {
        id: i64,
        name: String,
        price: f64,
        is_active: bool,
        updated_at: i64,
    }

    #[derive(Serialize)]
    struct TestStaff {
        id: i64,
        username: String,
        hash_pass: String,
        role: String,
    }

    fn service(name: &str, price: f64, updated_at: i64) -> TestService {
        TestService {
            id: 1,
            name: name.into(),
            price,
            is_active: true,
            updated_at,
        }
    }

    #[test]
    fn snapshot_drops_id_and_timestamps() {
        let snapshot = create_snapshot(&service("Consult", 80.0, 5), "service");
        let obj = snapshot.as_object().unwrap();
        assert!(obj.contains_key("name"));
        assert!(obj.contains_key("price"));
        assert!(!obj.contains_key("id"));
        assert!(!obj.contains_key("updated_at"));
    }

    #[test]
    fn snapshot_drops_password_hash() {
        let staff = TestStaff {
            id: 1,
            username: "admin".into(),
            hash_pass: "$argon2id$secret".into(),
            role: "admin".into(),
        };
        let snapshot = create_snapshot(&staff, "staff_user");
        let obj = snapshot.as_object().unwrap();
        assert!(obj.contains_key("username"));
        assert!(!obj.contains_key("hash_pass"));
    }

    #[test]
    fn diff_lists_changed_fields_sorted() {
        let diff = create_diff(&service("Consult", 80.0, 1), &service("Follow-up", 95.5, 2), "service");
        let fields: Vec<&str> = diff["changes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, ["name", "price"]);
        assert_eq!(diff["changes"][0]["from"], "Consult");
        assert_eq!(diff["changes"][0]["to"], "Follow-up");
    }

    #[test]
    fn float_noise_is_not_a_change() {
        let diff = create_diff(&service("A", 0.1 + 0.2, 1), &service("A", 0.3, 1), "service");
        assert!(diff["changes"].as_array().unwrap().is_empty());
        assert_eq!(diff["note"], "no_changes_detected");
    }

    #[test]
    fn nested_fields_use_dotted_paths() {
        let from = json!({"address": {"city": "Austin", "zip": "78701"}});
        let to = json!({"address": {"city": "Dallas", "zip": "78701"}});
        let diff = create_diff(&from, &to, "patient");
        assert_eq!(diff["changes"][0]["field"], "address.city");
    }

    #[test]
    fn delete_details() {
        assert_eq!(create_delete_details("Main St Pharmacy")["name"], "Main St Pharmacy");
    }
}
