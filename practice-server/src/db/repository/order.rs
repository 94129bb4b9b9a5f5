//! Order Repository
//!
//! Orders own their items. Totals are recomputed in `Decimal` whenever the
//! items or the discount change, and are only changeable while pending.

use super::list::{Filters, ListSpec, fetch_page};
use super::{RepoError, RepoResult, discount, patient, pharmacy, provider, sequence, service};
use rust_decimal::Decimal;
use shared::ErrorCode;
use shared::models::{
    Discount, Order, OrderCreate, OrderFilter, OrderItem, OrderItemInput, OrderStatus, OrderUpdate,
};
use shared::money;
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::{Sqlite, SqlitePool, Transaction};

const COLUMNS: &str = "id, order_number, patient_id, provider_id, pharmacy_id, discount_id, status, \
                       subtotal, discount_amount, total, notes, created_by, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, service_id, name, quantity, unit_price, line_total";

const LIST: ListSpec = ListSpec {
    table: "orders",
    columns: COLUMNS,
    search_columns: &["order_number", "notes"],
    sort_columns: &[
        ("created_at", "created_at"),
        ("total", "total"),
        ("order_number", "order_number"),
        ("status", "status"),
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
};

/// Line resolved against the catalog, ready to insert
#[derive(Debug, Clone)]
struct LineDraft {
    service_id: Option<i64>,
    name: String,
    quantity: i64,
    unit_price: f64,
    line_total: Decimal,
}

#[derive(Debug, Clone, Copy)]
struct Totals {
    subtotal: Decimal,
    discount_amount: Decimal,
    total: Decimal,
}

impl Totals {
    fn compute(lines: &[LineDraft], discount: Option<&Discount>) -> Self {
        let subtotal = money::sum(lines.iter().map(|l| l.line_total));
        let today = shared::util::today();
        let discount_amount = discount
            .map(|d| d.apply(subtotal, today))
            .unwrap_or(Decimal::ZERO);
        Self {
            subtotal,
            discount_amount,
            total: money::round(subtotal - discount_amount),
        }
    }
}

pub async fn list(
    pool: &SqlitePool,
    query: &ListQuery,
    filter: &OrderFilter,
) -> RepoResult<Page<Order>> {
    let filters = Filters::new()
        .eq("status", filter.status.map(|s| s.as_str()))
        .eq("patient_id", filter.patient_id);
    fetch_page(pool, &LIST, &filters, query).await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Order>> {
    let sql = format!("SELECT {COLUMNS} FROM orders WHERE id = ?");
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match order {
        Some(mut order) => {
            order.items = items_for(pool, id).await?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

async fn require(pool: &SqlitePool, id: i64) -> RepoResult<Order> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Order {id} not found")))
}

pub async fn items_for(pool: &SqlitePool, order_id: i64) -> RepoResult<Vec<OrderItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM order_item WHERE order_id = ? ORDER BY id");
    let items = sqlx::query_as::<_, OrderItem>(&sql)
        .bind(order_id)
        .fetch_all(pool)
        .await?;
    Ok(items)
}

/// Fill name and price from the catalog where the input leaves them out
async fn resolve_items(pool: &SqlitePool, inputs: &[OrderItemInput]) -> RepoResult<Vec<LineDraft>> {
    if inputs.is_empty() {
        return Err(RepoError::Business(
            ErrorCode::OrderEmpty,
            "Order must have at least one item".into(),
        ));
    }
    let mut lines = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        if !(1..=money::MAX_QUANTITY).contains(&input.quantity) {
            return Err(RepoError::Validation(format!(
                "items[{i}].quantity must be between 1 and {}",
                money::MAX_QUANTITY
            )));
        }
        let (service_id, name, unit_price) = match input.service_id {
            Some(service_id) => {
                let svc = service::find_by_id(pool, service_id).await?.ok_or_else(|| {
                    RepoError::Business(
                        ErrorCode::ServiceNotFound,
                        format!("Service {service_id} not found"),
                    )
                })?;
                (
                    Some(service_id),
                    input.name.clone().unwrap_or(svc.name),
                    input.unit_price.unwrap_or(svc.price),
                )
            }
            None => {
                let (Some(name), Some(price)) = (&input.name, input.unit_price) else {
                    return Err(RepoError::Validation(format!(
                        "items[{i}] needs a service_id or both name and unit_price"
                    )));
                };
                (None, name.trim().to_string(), price)
            }
        };
        money::check_amount(unit_price, &format!("items[{i}].unit_price"))
            .map_err(RepoError::Validation)?;
        lines.push(LineDraft {
            service_id,
            name,
            quantity: input.quantity,
            unit_price,
            line_total: money::line_total(unit_price, input.quantity),
        });
    }
    Ok(lines)
}

async fn insert_items(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: i64,
    lines: &[LineDraft],
) -> RepoResult<()> {
    for line in lines {
        sqlx::query(
            "INSERT INTO order_item (id, order_id, service_id, name, quantity, unit_price, line_total) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(shared::util::snowflake_id())
        .bind(order_id)
        .bind(line.service_id)
        .bind(&line.name)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(money::to_f64(line.line_total))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn check_references(
    pool: &SqlitePool,
    provider_id: Option<i64>,
    pharmacy_id: Option<i64>,
) -> RepoResult<()> {
    if let Some(id) = provider_id
        && provider::find_by_id(pool, id).await?.is_none()
    {
        return Err(RepoError::Business(
            ErrorCode::ProviderNotFound,
            format!("Provider {id} not found"),
        ));
    }
    if let Some(id) = pharmacy_id
        && pharmacy::find_by_id(pool, id).await?.is_none()
    {
        return Err(RepoError::Business(
            ErrorCode::PharmacyNotFound,
            format!("Pharmacy {id} not found"),
        ));
    }
    Ok(())
}

pub async fn create(pool: &SqlitePool, data: OrderCreate, created_by: i64) -> RepoResult<Order> {
    patient::find_active(pool, data.patient_id).await?;
    check_references(pool, data.provider_id, data.pharmacy_id).await?;
    let lines = resolve_items(pool, &data.items).await?;
    let today = shared::util::today();
    let discount = match data.discount_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => Some(discount::resolve_code(pool, code, today).await?),
        None => None,
    };
    let totals = Totals::compute(&lines, discount.as_ref());

    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let mut tx = pool.begin().await?;
    let order_number = sequence::next_order_number(&mut *tx, today).await?;
    sqlx::query(
        "INSERT INTO orders (id, order_number, patient_id, provider_id, pharmacy_id, discount_id, \
         status, subtotal, discount_amount, total, notes, created_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
    )
    .bind(id)
    .bind(&order_number)
    .bind(data.patient_id)
    .bind(data.provider_id)
    .bind(data.pharmacy_id)
    .bind(discount.as_ref().map(|d| d.id))
    .bind(money::to_f64(totals.subtotal))
    .bind(money::to_f64(totals.discount_amount))
    .bind(money::to_f64(totals.total))
    .bind(&data.notes)
    .bind(created_by)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    insert_items(&mut tx, id, &lines).await?;
    tx.commit().await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create order".into()))
}

/// Header fields can change until the order is terminal; items and the
/// discount only while pending.
pub async fn update(pool: &SqlitePool, id: i64, data: OrderUpdate) -> RepoResult<Order> {
    let current = require(pool, id).await?;
    let reprices = data.items.is_some() || data.discount_code.is_some();
    if reprices && !current.status.is_editable() {
        return Err(RepoError::Business(
            ErrorCode::OrderNotEditable,
            format!("Order {} is {}; items and discount are fixed", current.order_number, current.status.as_str()),
        ));
    }
    if current.status.is_terminal() {
        return Err(RepoError::Business(
            ErrorCode::OrderNotEditable,
            format!("Order {} is {}", current.order_number, current.status.as_str()),
        ));
    }
    check_references(pool, data.provider_id, data.pharmacy_id).await?;

    let lines = match &data.items {
        Some(items) => Some(resolve_items(pool, items).await?),
        None => None,
    };
    // None: keep, Some(None): remove, Some(Some(d)): replace
    let discount = match data.discount_code.as_deref().map(str::trim) {
        Some("") => Some(None),
        Some(code) => Some(Some(discount::resolve_code(pool, code, shared::util::today()).await?)),
        None => None,
    };

    let now = shared::util::now_millis();
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE orders SET provider_id = COALESCE(?1, provider_id), \
         pharmacy_id = COALESCE(?2, pharmacy_id), notes = COALESCE(?3, notes), updated_at = ?4 \
         WHERE id = ?5",
    )
    .bind(data.provider_id)
    .bind(data.pharmacy_id)
    .bind(&data.notes)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if reprices {
        let lines = match lines {
            Some(lines) => {
                sqlx::query("DELETE FROM order_item WHERE order_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                insert_items(&mut tx, id, &lines).await?;
                lines
            }
            None => current
                .items
                .iter()
                .map(|item| LineDraft {
                    service_id: item.service_id,
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: money::line_total(item.unit_price, item.quantity),
                })
                .collect(),
        };
        let discount = match discount {
            Some(d) => d,
            None => match current.discount_id {
                Some(did) => discount::find_by_id(pool, did).await?,
                None => None,
            },
        };
        let totals = Totals::compute(&lines, discount.as_ref());
        sqlx::query(
            "UPDATE orders SET discount_id = ?, subtotal = ?, discount_amount = ?, total = ? WHERE id = ?",
        )
        .bind(discount.as_ref().map(|d| d.id))
        .bind(money::to_f64(totals.subtotal))
        .bind(money::to_f64(totals.discount_amount))
        .bind(money::to_f64(totals.total))
        .bind(id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    require(pool, id).await
}

/// Move along the status machine; returns the previous status with the order
pub async fn set_status(
    pool: &SqlitePool,
    id: i64,
    next: OrderStatus,
) -> RepoResult<(OrderStatus, Order)> {
    let current = require(pool, id).await?;
    if !current.status.can_transition_to(next) {
        return Err(RepoError::Business(
            ErrorCode::OrderInvalidTransition,
            format!(
                "Order {} cannot move from {} to {}",
                current.order_number,
                current.status.as_str(),
                next.as_str()
            ),
        ));
    }
    // guarded on the old status so a concurrent change loses cleanly
    let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(next)
        .bind(shared::util::now_millis())
        .bind(id)
        .bind(current.status)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Order {} changed concurrently",
            current.order_number
        )));
    }
    Ok((current.status, require(pool, id).await?))
}

/// Delete a pending or cancelled order with its items
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<Order> {
    let current = require(pool, id).await?;
    if !current.status.is_deletable() {
        return Err(RepoError::Business(
            ErrorCode::OrderNotEditable,
            format!(
                "Order {} is {}; only pending or cancelled orders can be deleted",
                current.order_number,
                current.status.as_str()
            ),
        ));
    }
    sqlx::query("DELETE FROM orders WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(current)
}
