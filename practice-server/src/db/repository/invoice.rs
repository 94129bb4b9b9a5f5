//! Invoice Repository
//!
//! Draft invoices are priced on the current date and repriced on every
//! edit. Issuing reprices once more on the issue date and freezes the
//! amounts; afterwards only payments and voiding change the row.

use super::list::{Arg, Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult, discount, insurance, order, patient, sequence};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use shared::ErrorCode;
use shared::models::{
    DEFAULT_PAYMENT_TERMS_DAYS, Discount, InsuranceRecord, Invoice, InvoiceCreate, InvoiceFilter,
    InvoiceFromOrder, InvoiceIssue, InvoiceItem, InvoiceItemInput, InvoiceStatus, InvoiceTotals,
    InvoiceUpdate, OrderStatus, Payment, PaymentCreate,
};
use shared::money;
use shared::query::{ListQuery, Page, SortOrder};
use shared::util::{format_date, parse_date, today};
use sqlx::{Sqlite, SqlitePool, Transaction};

const COLUMNS: &str = "id, invoice_number, patient_id, order_id, insurance_record_id, discount_id, \
                       status, issue_date, due_date, subtotal, discount_amount, insurance_amount, \
                       total, amount_paid, ROUND(total - amount_paid, 2) AS balance, notes, \
                       created_by, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, invoice_id, description, quantity, unit_price, line_total";

const PAYMENT_COLUMNS: &str = "id, invoice_id, amount, method, reference, recorded_by, created_at";

const OVERDUE: &str = "status = 'issued' AND ROUND(total - amount_paid, 2) > 0 AND due_date < ?";

const LIST: ListSpec = ListSpec {
    table: "invoice",
    columns: COLUMNS,
    search_columns: &["invoice_number", "notes"],
    sort_columns: &[
        ("created_at", "created_at"),
        ("invoice_number", "invoice_number"),
        ("issue_date", "issue_date"),
        ("due_date", "due_date"),
        ("total", "total"),
        ("balance", "balance"),
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
};

/// Line ready to insert
struct LineDraft {
    description: String,
    quantity: i64,
    unit_price: f64,
    line_total: Decimal,
}

impl LineDraft {
    fn new(description: String, quantity: i64, unit_price: f64) -> Self {
        Self {
            line_total: money::line_total(unit_price, quantity),
            description,
            quantity,
            unit_price,
        }
    }
}

pub async fn list(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &InvoiceFilter,
) -> RepoResult<Page<Invoice>> {
    let filters = Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("patient_id", filter.patient_id)
        .raw_if(
            filter.overdue == Some(true),
            OVERDUE,
            vec![Arg::from(format_date(today()))],
        );
    fetch_page(pool, &LIST, &filters, query).await
}

/// Invoice with items and payments
pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Invoice>> {
    let sql = format!("SELECT {COLUMNS} FROM invoice WHERE id = ?");
    let invoice = sqlx::query_as::<_, Invoice>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let Some(mut invoice) = invoice else {
        return Ok(None);
    };
    let sql = format!("SELECT {ITEM_COLUMNS} FROM invoice_item WHERE invoice_id = ? ORDER BY id");
    invoice.items = sqlx::query_as::<_, InvoiceItem>(&sql)
        .bind(id)
        .fetch_all(pool)
        .await?;
    invoice.payments = payments_for(pool, id).await?;
    Ok(Some(invoice))
}

async fn require(pool: &SqlitePool, id: i64) -> RepoResult<Invoice> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Invoice {id} not found")))
}

pub async fn payments_for(pool: &SqlitePool, invoice_id: i64) -> RepoResult<Vec<Payment>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE invoice_id = ? ORDER BY created_at, id");
    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(invoice_id)
        .fetch_all(pool)
        .await?;
    Ok(payments)
}

/// Sum of balances of issued invoices
pub async fn outstanding_balance(pool: &SqlitePool) -> RepoResult<f64> {
    let total: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(ROUND(total - amount_paid, 2)), 0.0) FROM invoice WHERE status = 'issued'",
    )
    .fetch_one(pool)
    .await?;
    Ok(money::to_f64(money::to_decimal(total)))
}

fn not_editable(invoice: &Invoice, what: &str) -> RepoError {
    RepoError::Business(
        ErrorCode::InvoiceNotEditable,
        format!(
            "Invoice {} is {}; only drafts can be {what}",
            invoice.invoice_number,
            invoice.status.as_str()
        ),
    )
}

fn invalid_transition(invoice: &Invoice, next: InvoiceStatus) -> RepoError {
    RepoError::Business(
        ErrorCode::InvoiceInvalidTransition,
        format!(
            "Invoice {} cannot move from {} to {}",
            invoice.invoice_number,
            invoice.status.as_str(),
            next.as_str()
        ),
    )
}

fn parse_day(value: &str, field: &str) -> RepoResult<NaiveDate> {
    parse_date(value).ok_or_else(|| RepoError::Validation(format!("{field} is not a date: {value}")))
}

/// Insurance record must exist, be active and belong to the patient
async fn resolve_insurance(
    pool: &SqlitePool,
    patient_id: i64,
    record_id: i64,
) -> RepoResult<InsuranceRecord> {
    let record = insurance::find_by_id(pool, record_id).await?.ok_or_else(|| {
        RepoError::Business(
            ErrorCode::InsuranceNotFound,
            format!("Insurance record {record_id} not found"),
        )
    })?;
    if record.patient_id != patient_id {
        return Err(RepoError::Business(
            ErrorCode::InsuranceNotValid,
            format!("Insurance record {record_id} belongs to another patient"),
        ));
    }
    if !record.is_active {
        return Err(RepoError::Business(
            ErrorCode::InsuranceNotValid,
            format!("Insurance record {record_id} is inactive"),
        ));
    }
    Ok(record)
}

fn lines_from_input(items: &[InvoiceItemInput]) -> RepoResult<Vec<LineDraft>> {
    if items.is_empty() {
        return Err(RepoError::Validation("invoice must have at least one item".into()));
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            money::check_amount(item.unit_price, &format!("items[{i}].unit_price"))
                .map_err(RepoError::Validation)?;
            if !(1..=money::MAX_QUANTITY).contains(&item.quantity) {
                return Err(RepoError::Validation(format!(
                    "items[{i}].quantity must be between 1 and {}",
                    money::MAX_QUANTITY
                )));
            }
            let description = item.description.trim();
            if description.is_empty() {
                return Err(RepoError::Validation(format!(
                    "items[{i}].description must not be blank"
                )));
            }
            Ok(LineDraft::new(
                description.to_string(),
                item.quantity,
                item.unit_price,
            ))
        })
        .collect()
}

async fn replace_items(
    tx: &mut Transaction<'_, Sqlite>,
    invoice_id: i64,
    lines: &[LineDraft],
) -> RepoResult<()> {
    sqlx::query("DELETE FROM invoice_item WHERE invoice_id = ?")
        .bind(invoice_id)
        .execute(&mut **tx)
        .await?;
    for line in lines {
        sqlx::query(
            "INSERT INTO invoice_item (id, invoice_id, description, quantity, unit_price, line_total) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(shared::util::snowflake_id())
        .bind(invoice_id)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(money::to_f64(line.line_total))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn write_totals(
    tx: &mut Transaction<'_, Sqlite>,
    invoice_id: i64,
    totals: &InvoiceTotals,
) -> RepoResult<()> {
    sqlx::query(
        "UPDATE invoice SET subtotal = ?, discount_amount = ?, insurance_amount = ?, total = ? \
         WHERE id = ?",
    )
    .bind(money::to_f64(totals.subtotal))
    .bind(money::to_f64(totals.discount_amount))
    .bind(money::to_f64(totals.insurance_amount))
    .bind(money::to_f64(totals.total))
    .bind(invoice_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

struct Draft {
    patient_id: i64,
    order_id: Option<i64>,
    insurance: Option<InsuranceRecord>,
    discount: Option<Discount>,
    due_date: Option<String>,
    notes: Option<String>,
    lines: Vec<LineDraft>,
}

async fn insert_draft(pool: &SqlitePool, draft: Draft, created_by: i64) -> RepoResult<Invoice> {
    let on = today();
    let totals = InvoiceTotals::compute(
        draft.lines.iter().map(|l| l.line_total),
        draft.discount.as_ref(),
        draft.insurance.as_ref(),
        on,
    );
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let mut tx = pool.begin().await?;
    let invoice_number = sequence::next_invoice_number(&mut *tx, on).await?;
    sqlx::query(
        "INSERT INTO invoice (id, invoice_number, patient_id, order_id, insurance_record_id, \
         discount_id, status, due_date, notes, created_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'draft', ?7, ?8, ?9, ?10, ?10)",
    )
    .bind(id)
    .bind(&invoice_number)
    .bind(draft.patient_id)
    .bind(draft.order_id)
    .bind(draft.insurance.as_ref().map(|r| r.id))
    .bind(draft.discount.as_ref().map(|d| d.id))
    .bind(&draft.due_date)
    .bind(&draft.notes)
    .bind(created_by)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    replace_items(&mut tx, id, &draft.lines).await?;
    write_totals(&mut tx, id, &totals).await?;
    tx.commit().await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create invoice".into()))
}

pub async fn create(pool: &SqlitePool, data: InvoiceCreate, created_by: i64) -> RepoResult<Invoice> {
    patient::find_active(pool, data.patient_id).await?;
    if let Some(due) = &data.due_date {
        parse_day(due, "due_date")?;
    }
    let lines = lines_from_input(&data.items)?;
    let insurance = match data.insurance_record_id {
        Some(rid) => Some(resolve_insurance(pool, data.patient_id, rid).await?),
        None => None,
    };
    let discount = match data.discount_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => Some(discount::resolve_code(pool, code, today()).await?),
        None => None,
    };
    insert_draft(
        pool,
        Draft {
            patient_id: data.patient_id,
            order_id: None,
            insurance,
            discount,
            due_date: data.due_date,
            notes: data.notes,
            lines,
        },
        created_by,
    )
    .await
}

/// Draft invoice carrying the order's items and discount
pub async fn create_from_order(
    pool: &SqlitePool,
    data: InvoiceFromOrder,
    created_by: i64,
) -> RepoResult<Invoice> {
    let source = order::find_by_id(pool, data.order_id).await?.ok_or_else(|| {
        RepoError::Business(
            ErrorCode::OrderNotFound,
            format!("Order {} not found", data.order_id),
        )
    })?;
    if source.status == OrderStatus::Cancelled {
        return Err(RepoError::Business(
            ErrorCode::OrderCancelled,
            format!("Order {} is cancelled", source.order_number),
        ));
    }
    let insurance = match data.insurance_record_id {
        Some(rid) => Some(resolve_insurance(pool, source.patient_id, rid).await?),
        None => None,
    };
    let discount = match source.discount_id {
        Some(did) => discount::find_by_id(pool, did).await?,
        None => None,
    };
    let lines = source
        .items
        .iter()
        .map(|item| LineDraft::new(item.name.clone(), item.quantity, item.unit_price))
        .collect();
    insert_draft(
        pool,
        Draft {
            patient_id: source.patient_id,
            order_id: Some(source.id),
            insurance,
            discount,
            due_date: None,
            notes: data.notes.or_else(|| Some(format!("From order {}", source.order_number))),
            lines,
        },
        created_by,
    )
    .await
}

/// Edit a draft; amounts are recomputed from the resulting items
pub async fn update(pool: &SqlitePool, id: i64, data: InvoiceUpdate) -> RepoResult<Invoice> {
    let current = require(pool, id).await?;
    if current.status != InvoiceStatus::Draft {
        return Err(not_editable(&current, "edited"));
    }
    if let Some(due) = &data.due_date {
        parse_day(due, "due_date")?;
    }

    let insurance = match data.insurance_record_id {
        Some(0) => None,
        Some(rid) => Some(resolve_insurance(pool, current.patient_id, rid).await?),
        None => match current.insurance_record_id {
            Some(rid) => insurance::find_by_id(pool, rid).await?,
            None => None,
        },
    };
    let discount = match data.discount_code.as_deref().map(str::trim) {
        Some("") => None,
        Some(code) => Some(discount::resolve_code(pool, code, today()).await?),
        None => match current.discount_id {
            Some(did) => discount::find_by_id(pool, did).await?,
            None => None,
        },
    };
    let lines = match &data.items {
        Some(items) => lines_from_input(items)?,
        None => current
            .items
            .iter()
            .map(|i| LineDraft::new(i.description.clone(), i.quantity, i.unit_price))
            .collect(),
    };
    let totals = InvoiceTotals::compute(
        lines.iter().map(|l| l.line_total),
        discount.as_ref(),
        insurance.as_ref(),
        today(),
    );

    let edit = DraftEdit {
        insurance_record_id: insurance.as_ref().map(|r| r.id),
        discount_id: discount.as_ref().map(|d| d.id),
        due_date: data.due_date.as_deref(),
        notes: data.notes.as_deref(),
        lines: data.items.as_ref().map(|_| lines.as_slice()),
        totals: &totals,
    };
    save_draft(pool, &current, &edit).await?;
    require(pool, id).await
}

struct DraftEdit<'a> {
    insurance_record_id: Option<i64>,
    discount_id: Option<i64>,
    due_date: Option<&'a str>,
    notes: Option<&'a str>,
    /// `None` keeps the stored items
    lines: Option<&'a [LineDraft]>,
    totals: &'a InvoiceTotals,
}

/// Write an edit to a draft. The header and totals change only while the
/// row is still a draft; items are touched only after that holds.
async fn save_draft(pool: &SqlitePool, current: &Invoice, edit: &DraftEdit<'_>) -> RepoResult<()> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE invoice SET insurance_record_id = ?1, discount_id = ?2, \
         due_date = COALESCE(?3, due_date), notes = COALESCE(?4, notes), updated_at = ?5, \
         subtotal = ?6, discount_amount = ?7, insurance_amount = ?8, total = ?9 \
         WHERE id = ?10 AND status = 'draft'",
    )
    .bind(edit.insurance_record_id)
    .bind(edit.discount_id)
    .bind(edit.due_date)
    .bind(edit.notes)
    .bind(shared::util::now_millis())
    .bind(money::to_f64(edit.totals.subtotal))
    .bind(money::to_f64(edit.totals.discount_amount))
    .bind(money::to_f64(edit.totals.insurance_amount))
    .bind(money::to_f64(edit.totals.total))
    .bind(current.id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Invoice {} is no longer a draft",
            current.invoice_number
        )));
    }
    if let Some(lines) = edit.lines {
        replace_items(&mut tx, current.id, lines).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// draft -> issued. Amounts are final from here on; an invoice totalling
/// zero is paid on issue.
pub async fn issue(pool: &SqlitePool, id: i64, data: InvoiceIssue) -> RepoResult<Invoice> {
    let current = require(pool, id).await?;
    if !current.status.can_transition_to(InvoiceStatus::Issued) {
        return Err(invalid_transition(&current, InvoiceStatus::Issued));
    }
    if current.items.is_empty() {
        return Err(RepoError::Validation("invoice has no items".into()));
    }
    let issue_date = match &data.issue_date {
        Some(s) => parse_day(s, "issue_date")?,
        None => today(),
    };
    let due_date = match data.due_date.as_deref().or(current.due_date.as_deref()) {
        Some(s) => parse_day(s, "due_date")?,
        None => issue_date + Duration::days(DEFAULT_PAYMENT_TERMS_DAYS),
    };
    if due_date < issue_date {
        return Err(RepoError::Validation("due_date must not be before issue_date".into()));
    }

    let insurance = match current.insurance_record_id {
        Some(rid) => insurance::find_by_id(pool, rid).await?,
        None => None,
    };
    let discount = match current.discount_id {
        Some(did) => discount::find_by_id(pool, did).await?,
        None => None,
    };
    let totals = InvoiceTotals::compute(
        current
            .items
            .iter()
            .map(|i| money::line_total(i.unit_price, i.quantity)),
        discount.as_ref(),
        insurance.as_ref(),
        issue_date,
    );
    let status = if totals.total <= Decimal::ZERO {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Issued
    };

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE invoice SET status = ?, issue_date = ?, due_date = ?, updated_at = ? \
         WHERE id = ? AND status = 'draft'",
    )
    .bind(status)
    .bind(format_date(issue_date))
    .bind(format_date(due_date))
    .bind(shared::util::now_millis())
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Invoice {} changed concurrently",
            current.invoice_number
        )));
    }
    write_totals(&mut tx, id, &totals).await?;
    tx.commit().await?;
    require(pool, id).await
}

/// Record a payment on an issued invoice; a zero balance marks it paid
pub async fn record_payment(
    pool: &SqlitePool,
    id: i64,
    data: PaymentCreate,
    recorded_by: i64,
) -> RepoResult<(Payment, Invoice)> {
    let current = require(pool, id).await?;
    if current.status != InvoiceStatus::Issued {
        return Err(RepoError::Business(
            ErrorCode::InvoiceInvalidTransition,
            format!(
                "Invoice {} is {}; payments need an issued invoice",
                current.invoice_number,
                current.status.as_str()
            ),
        ));
    }
    if !data.amount.is_finite() || data.amount <= 0.0 || data.amount > money::MAX_AMOUNT {
        return Err(RepoError::Business(
            ErrorCode::InvalidAmount,
            format!("Payment amount must be positive and at most {}", money::MAX_AMOUNT),
        ));
    }
    let amount = money::round(money::to_decimal(data.amount));
    let balance = money::to_decimal(current.balance);
    if amount > balance + money::MONEY_TOLERANCE {
        return Err(RepoError::Business(
            ErrorCode::PaymentExceedsBalance,
            format!(
                "Payment {} exceeds balance {} of invoice {}",
                amount, current.balance, current.invoice_number
            ),
        ));
    }
    let amount = amount.min(balance);
    let paid = money::round(money::to_decimal(current.amount_paid) + amount);
    let settled = money::to_decimal(current.total) - paid < money::MONEY_TOLERANCE;
    let status = if settled {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Issued
    };

    let now = shared::util::now_millis();
    let payment_id = shared::util::snowflake_id();
    let mut tx = pool.begin().await?;
    // guarded on the amount read above so two concurrent payments cannot both pass the balance check
    let result = sqlx::query(
        "UPDATE invoice SET amount_paid = ?, status = ?, updated_at = ? \
         WHERE id = ? AND status = 'issued' AND amount_paid = ?",
    )
    .bind(money::to_f64(paid))
    .bind(status)
    .bind(now)
    .bind(id)
    .bind(current.amount_paid)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Invoice {} changed concurrently",
            current.invoice_number
        )));
    }
    sqlx::query(
        "INSERT INTO payment (id, invoice_id, amount, method, reference, recorded_by, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(payment_id)
    .bind(id)
    .bind(money::to_f64(amount))
    .bind(&data.method)
    .bind(&data.reference)
    .bind(recorded_by)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let invoice = require(pool, id).await?;
    let payment = invoice
        .payments
        .iter()
        .find(|p| p.id == payment_id)
        .cloned()
        .ok_or_else(|| RepoError::Database("Failed to record payment".into()))?;
    Ok((payment, invoice))
}

/// draft|issued -> void
pub async fn void(pool: &SqlitePool, id: i64) -> RepoResult<Invoice> {
    let current = require(pool, id).await?;
    if !current.status.can_transition_to(InvoiceStatus::Void) {
        return Err(invalid_transition(&current, InvoiceStatus::Void));
    }
    let result = sqlx::query(
        "UPDATE invoice SET status = 'void', updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(shared::util::now_millis())
    .bind(id)
    .bind(current.status)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Invoice {} changed concurrently",
            current.invoice_number
        )));
    }
    require(pool, id).await
}

/// Delete a draft with its items
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<Invoice> {
    let current = require(pool, id).await?;
    if current.status != InvoiceStatus::Draft {
        return Err(not_editable(&current, "deleted"));
    }
    delete_draft(pool, &current).await?;
    Ok(current)
}

async fn delete_draft(pool: &SqlitePool, current: &Invoice) -> RepoResult<()> {
    let result = sqlx::query("DELETE FROM invoice WHERE id = ? AND status = 'draft'")
        .bind(current.id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Invoice {} is no longer a draft",
            current.invoice_number
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;
    use shared::models::{
        DiscountCreate, DiscountKind, InsuranceCreate, OrderCreate, OrderItemInput, is_overdue,
    };

    fn line(description: &str, quantity: i64, unit_price: f64) -> InvoiceItemInput {
        InvoiceItemInput {
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    fn draft(patient_id: i64, items: Vec<InvoiceItemInput>) -> InvoiceCreate {
        InvoiceCreate {
            patient_id,
            insurance_record_id: None,
            discount_code: None,
            due_date: None,
            notes: None,
            items,
        }
    }

    async fn issued(pool: &SqlitePool, total: f64) -> Invoice {
        let ada = test_support::patient(pool, "Ada", "Lovelace").await;
        let inv = create(pool, draft(ada.id, vec![line("Visit", 1, total)]), 1)
            .await
            .unwrap();
        issue(pool, inv.id, InvoiceIssue::default()).await.unwrap()
    }

    #[tokio::test]
    async fn create_computes_totals_with_discount_and_insurance() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let policy = insurance::create(
            &pool,
            InsuranceCreate {
                patient_id: ada.id,
                carrier: "Acme".into(),
                plan_name: None,
                policy_number: "P-1".into(),
                group_number: None,
                holder_name: None,
                holder_relationship: None,
                coverage_percent: 80.0,
                valid_from: None,
                valid_until: None,
                is_primary: true,
                notes: None,
            },
        )
        .await
        .unwrap();
        discount::create(
            &pool,
            DiscountCreate {
                name: "Ten".into(),
                code: "TEN".into(),
                kind: DiscountKind::Percentage,
                value: 10.0,
                valid_from: None,
                valid_until: None,
            },
        )
        .await
        .unwrap();

        let inv = create(
            &pool,
            InvoiceCreate {
                insurance_record_id: Some(policy.id),
                discount_code: Some("ten".into()),
                ..draft(ada.id, vec![line("Visit", 1, 100.0), line("Lab", 2, 25.0)])
            },
            1,
        )
        .await
        .unwrap();

        assert_eq!(inv.status, InvoiceStatus::Draft);
        assert!(inv.invoice_number.starts_with("INV-"));
        assert_eq!(inv.subtotal, 150.0);
        assert_eq!(inv.discount_amount, 15.0);
        assert_eq!(inv.insurance_amount, 108.0);
        assert_eq!(inv.total, 27.0);
        assert_eq!(inv.balance, 27.0);
        assert_eq!(inv.items.len(), 2);
    }

    #[tokio::test]
    async fn insurance_of_another_patient_is_rejected() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let bob = test_support::patient(&pool, "Bob", "Stone").await;
        let policy = insurance::create(
            &pool,
            InsuranceCreate {
                patient_id: bob.id,
                carrier: "Acme".into(),
                plan_name: None,
                policy_number: "P-2".into(),
                group_number: None,
                holder_name: None,
                holder_relationship: None,
                coverage_percent: 50.0,
                valid_from: None,
                valid_until: None,
                is_primary: false,
                notes: None,
            },
        )
        .await
        .unwrap();
        let err = create(
            &pool,
            InvoiceCreate {
                insurance_record_id: Some(policy.id),
                ..draft(ada.id, vec![line("Visit", 1, 10.0)])
            },
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::InsuranceNotValid, _)));
    }

    #[tokio::test]
    async fn issue_sets_dates_and_freezes() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let inv = create(&pool, draft(ada.id, vec![line("Visit", 1, 80.0)]), 1)
            .await
            .unwrap();
        let inv = issue(
            &pool,
            inv.id,
            InvoiceIssue {
                issue_date: Some("2024-03-01".into()),
                due_date: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(inv.status, InvoiceStatus::Issued);
        assert_eq!(inv.issue_date.as_deref(), Some("2024-03-01"));
        assert_eq!(inv.due_date.as_deref(), Some("2024-03-31"));

        let err = update(&pool, inv.id, InvoiceUpdate::default()).await.unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::InvoiceNotEditable, _)));
        let err = delete(&pool, inv.id).await.unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::InvoiceNotEditable, _)));
        let err = issue(&pool, inv.id, InvoiceIssue::default()).await.unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::InvoiceInvalidTransition, _)));
    }

    #[tokio::test]
    async fn payments_settle_the_balance() {
        let pool = test_support::pool().await;
        let inv = issued(&pool, 100.0).await;

        let (payment, inv) = record_payment(
            &pool,
            inv.id,
            PaymentCreate {
                amount: 40.0,
                method: Some("card".into()),
                reference: None,
            },
            7,
        )
        .await
        .unwrap();
        assert_eq!(payment.amount, 40.0);
        assert_eq!(payment.recorded_by, 7);
        assert_eq!(inv.amount_paid, 40.0);
        assert_eq!(inv.balance, 60.0);
        assert_eq!(inv.status, InvoiceStatus::Issued);

        let err = record_payment(
            &pool,
            inv.id,
            PaymentCreate {
                amount: 60.5,
                method: None,
                reference: None,
            },
            7,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::PaymentExceedsBalance, _)));

        let (_, inv) = record_payment(
            &pool,
            inv.id,
            PaymentCreate {
                amount: 60.0,
                method: None,
                reference: None,
            },
            7,
        )
        .await
        .unwrap();
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert_eq!(inv.balance, 0.0);
        assert_eq!(inv.payments.len(), 2);

        // paid invoices cannot be voided
        let err = void(&pool, inv.id).await.unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::InvoiceInvalidTransition, _)));
    }

    #[tokio::test]
    async fn non_positive_payment_is_rejected() {
        let pool = test_support::pool().await;
        let inv = issued(&pool, 10.0).await;
        for amount in [0.0, -5.0, f64::NAN] {
            let err = record_payment(
                &pool,
                inv.id,
                PaymentCreate {
                    amount,
                    method: None,
                    reference: None,
                },
                1,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, RepoError::Business(ErrorCode::InvalidAmount, _)));
        }
    }

    #[tokio::test]
    async fn draft_payment_and_void() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let inv = create(&pool, draft(ada.id, vec![line("Visit", 1, 10.0)]), 1)
            .await
            .unwrap();
        let err = record_payment(
            &pool,
            inv.id,
            PaymentCreate {
                amount: 1.0,
                method: None,
                reference: None,
            },
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::InvoiceInvalidTransition, _)));

        let inv = void(&pool, inv.id).await.unwrap();
        assert_eq!(inv.status, InvoiceStatus::Void);
    }

    #[tokio::test]
    async fn update_draft_replaces_items() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let inv = create(&pool, draft(ada.id, vec![line("Visit", 1, 10.0)]), 1)
            .await
            .unwrap();
        let inv = update(
            &pool,
            inv.id,
            InvoiceUpdate {
                items: Some(vec![line("Visit", 2, 10.0), line("Lab", 1, 0.1)]),
                notes: Some("updated".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(inv.items.len(), 2);
        assert_eq!(inv.total, 20.1);
        assert_eq!(inv.notes.as_deref(), Some("updated"));

        delete(&pool, inv.id).await.unwrap();
        assert!(find_by_id(&pool, inv.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn draft_snapshot_cannot_rewrite_an_issued_invoice() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let stale = create(&pool, draft(ada.id, vec![line("Visit", 1, 10.0)]), 1)
            .await
            .unwrap();
        issue(&pool, stale.id, InvoiceIssue::default()).await.unwrap();

        // An edit prepared against the draft lands after the issue
        let lines = lines_from_input(&[line("Visit", 5, 10.0)]).unwrap();
        let totals = InvoiceTotals::compute(lines.iter().map(|l| l.line_total), None, None, today());
        let edit = DraftEdit {
            insurance_record_id: None,
            discount_id: None,
            due_date: None,
            notes: Some("late edit"),
            lines: Some(&lines),
            totals: &totals,
        };
        let err = save_draft(&pool, &stale, &edit).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
        let err = delete_draft(&pool, &stale).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        let inv = require(&pool, stale.id).await.unwrap();
        assert_eq!(inv.status, InvoiceStatus::Issued);
        assert_eq!(inv.total, 10.0);
        assert_eq!(inv.items.len(), 1);
        assert_eq!(inv.items[0].quantity, 1);
        assert_ne!(inv.notes.as_deref(), Some("late edit"));
    }

    #[tokio::test]
    async fn blank_item_description_is_rejected() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let err = create(&pool, draft(ada.id, vec![line("   ", 1, 10.0)]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[tokio::test]
    async fn from_order_copies_items() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let o = order::create(
            &pool,
            OrderCreate {
                patient_id: ada.id,
                provider_id: None,
                pharmacy_id: None,
                discount_code: None,
                notes: None,
                items: vec![OrderItemInput {
                    service_id: None,
                    name: Some("Consult".into()),
                    quantity: 2,
                    unit_price: Some(45.0),
                }],
            },
            1,
        )
        .await
        .unwrap();

        let inv = create_from_order(
            &pool,
            InvoiceFromOrder {
                order_id: o.id,
                insurance_record_id: None,
                notes: None,
            },
            1,
        )
        .await
        .unwrap();
        assert_eq!(inv.order_id, Some(o.id));
        assert_eq!(inv.items[0].description, "Consult");
        assert_eq!(inv.total, 90.0);

        order::set_status(&pool, o.id, OrderStatus::Cancelled).await.unwrap();
        let err = create_from_order(
            &pool,
            InvoiceFromOrder {
                order_id: o.id,
                insurance_record_id: None,
                notes: None,
            },
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Business(ErrorCode::OrderCancelled, _)));
    }

    #[tokio::test]
    async fn overdue_filter_and_outstanding() {
        let pool = test_support::pool().await;
        let ada = test_support::patient(&pool, "Ada", "Lovelace").await;
        let old = create(&pool, draft(ada.id, vec![line("Old", 1, 50.0)]), 1)
            .await
            .unwrap();
        issue(
            &pool,
            old.id,
            InvoiceIssue {
                issue_date: Some("2020-01-01".into()),
                due_date: Some("2020-01-31".into()),
            },
        )
        .await
        .unwrap();
        issued(&pool, 25.0).await;

        let page = list(
            &pool,
            &ListQuery::default(),
            &InvoiceFilter {
                overdue: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, old.id);
        assert!(is_overdue(&page.items[0], today()));

        assert_eq!(outstanding_balance(&pool).await.unwrap(), 75.0);
    }
}
