//! Generic listing: search, filters, whitelisted sort, pagination
//!
//! Each repository describes its table with a [`ListSpec`] and passes the
//! request's [`ListQuery`] plus entity filters as [`Filters`]. Column names
//! never come from the request; only bound values do.

use super::RepoResult;
use shared::query::{ListQuery, Page, SortOrder};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

/// Static description of a listable table
#[derive(Debug, Clone, Copy)]
pub struct ListSpec {
    /// Table name
    pub table: &'static str,
    /// Select list
    pub columns: &'static str,
    /// Columns matched by `q` (LIKE, case-insensitive for ASCII)
    pub search_columns: &'static [&'static str],
    /// `(sort key, SQL expression)` whitelist
    pub sort_columns: &'static [(&'static str, &'static str)],
    /// Key into `sort_columns` used when the request names none or an unknown one
    pub default_sort: &'static str,
    pub default_order: SortOrder,
}

impl ListSpec {
    /// Resolve the ORDER BY expression and direction for a request
    pub fn order_by(&self, query: &ListQuery) -> (&'static str, SortOrder) {
        let lookup = |key: &str| {
            self.sort_columns
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, expr)| *expr)
        };
        match query.sort.as_deref().and_then(lookup) {
            Some(expr) => (expr, query.order.unwrap_or(self.default_order)),
            None => (
                lookup(self.default_sort).unwrap_or("id"),
                query.order.unwrap_or(self.default_order),
            ),
        }
    }
}

/// Bound value in a filter clause
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Real(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Text(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Text(v.to_string())
    }
}

/// WHERE clauses joined with AND; `?` marks a bound argument
#[derive(Debug, Clone, Default)]
pub struct Filters {
    clauses: Vec<(String, Vec<Arg>)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = ?` when the value is present
    pub fn eq<V: Into<Arg>>(self, column: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.raw(format!("{column} = ?"), vec![v.into()]),
            None => self,
        }
    }

    /// Arbitrary clause with one argument per `?`
    pub fn raw(mut self, clause: impl Into<String>, args: Vec<Arg>) -> Self {
        self.clauses.push((clause.into(), args));
        self
    }

    /// [`Filters::raw`] when `cond` holds
    pub fn raw_if(self, cond: bool, clause: impl Into<String>, args: Vec<Arg>) -> Self {
        if cond { self.raw(clause, args) } else { self }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

fn push_arg(qb: &mut QueryBuilder<'_, Sqlite>, arg: Arg) {
    match arg {
        Arg::Int(v) => qb.push_bind(v),
        Arg::Real(v) => qb.push_bind(v),
        Arg::Text(v) => qb.push_bind(v),
        Arg::Bool(v) => qb.push_bind(v),
    };
}

/// Escape `%`, `_` and `\` for a LIKE pattern with `ESCAPE '\'`
pub fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_where(
    qb: &mut QueryBuilder<'_, Sqlite>,
    spec: &ListSpec,
    filters: &Filters,
    search: Option<&str>,
) {
    let mut first = true;
    let mut next = |qb: &mut QueryBuilder<'_, Sqlite>| {
        qb.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    for (clause, args) in &filters.clauses {
        next(qb);
        qb.push("(");
        let mut parts = clause.split('?');
        if let Some(head) = parts.next() {
            qb.push(head);
        }
        for (part, arg) in parts.zip(args.iter().cloned()) {
            push_arg(qb, arg);
            qb.push(part);
        }
        qb.push(")");
    }

    if let Some(q) = search
        && !spec.search_columns.is_empty()
    {
        next(qb);
        let pattern = like_pattern(q);
        qb.push("(");
        for (i, column) in spec.search_columns.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(format!("{column} LIKE "));
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\'");
        }
        qb.push(")");
    }
}

/// Count and fetch one page
pub async fn fetch_page<T>(
    pool: &SqlitePool,
    spec: &ListSpec,
    filters: &Filters,
    query: &ListQuery,
) -> RepoResult<Page<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let search = query.search();

    let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", spec.table));
    push_where(&mut count, spec, filters, search);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let (sort, order) = spec.order_by(query);
    let dir = order.as_sql();
    let mut select =
        QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", spec.columns, spec.table));
    push_where(&mut select, spec, filters, search);
    select.push(format!(" ORDER BY {sort} {dir}, id {dir} LIMIT "));
    select.push_bind(query.per_page() as i64);
    select.push(" OFFSET ");
    select.push_bind(query.offset());

    let items = select.build_query_as::<T>().fetch_all(pool).await?;
    Ok(Page::from_query(items, total, query))
}

/// Delete rows by id, returning the number removed
pub async fn delete_ids(pool: &SqlitePool, table: &str, ids: &[i64]) -> RepoResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table} WHERE id IN ("));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: ListSpec = ListSpec {
        table: "tag",
        columns: "*",
        search_columns: &["name"],
        sort_columns: &[("name", "name COLLATE NOCASE"), ("created_at", "created_at")],
        default_sort: "name",
        default_order: SortOrder::Asc,
    };

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ann"), "%ann%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn unknown_sort_falls_back_to_default() {
        let q = ListQuery::default().order_by("drop table", SortOrder::Desc);
        assert_eq!(SPEC.order_by(&q), ("name COLLATE NOCASE", SortOrder::Desc));

        let q = ListQuery::default().order_by("created_at", SortOrder::Asc);
        assert_eq!(SPEC.order_by(&q), ("created_at", SortOrder::Asc));

        assert_eq!(
            SPEC.order_by(&ListQuery::default()),
            ("name COLLATE NOCASE", SortOrder::Asc)
        );
    }

    #[test]
    fn filter_builder() {
        let filters = Filters::new()
            .eq("is_active", Some(true))
            .eq::<i64>("tag_id", None)
            .raw_if(false, "x = ?", vec![Arg::Int(1)]);
        assert!(!filters.is_empty());
        assert_eq!(filters.clauses.len(), 1);
        assert!(Filters::new().is_empty());
    }

    #[tokio::test]
    async fn pages_searches_and_sorts() {
        let pool = super::super::test_support::pool().await;
        for (i, name) in ["alpha", "beta", "gamma", "delta", "alphabet"].iter().enumerate() {
            sqlx::query("INSERT INTO tag (id, name, color, created_at) VALUES (?, ?, '#000000', ?)")
                .bind(i as i64 + 1)
                .bind(*name)
                .bind(i as i64)
                .execute(&pool)
                .await
                .unwrap();
        }

        let page: Page<shared::models::Tag> =
            fetch_page(&pool, &SPEC, &Filters::new(), &ListQuery::default().paginate(1, 2))
                .await
                .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        let names: Vec<_> = page.items.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alpha", "alphabet"]);

        let page: Page<shared::models::Tag> = fetch_page(
            &pool,
            &SPEC,
            &Filters::new(),
            &ListQuery::default().with_search("ALPHA"),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 2);

        let page: Page<shared::models::Tag> = fetch_page(
            &pool,
            &SPEC,
            &Filters::new().raw("created_at >= ?", vec![Arg::Int(3)]),
            &ListQuery::default().order_by("created_at", SortOrder::Desc),
        )
        .await
        .unwrap();
        let names: Vec<_> = page.items.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alphabet", "delta"]);
    }

    #[tokio::test]
    async fn bulk_delete_by_ids() {
        let pool = super::super::test_support::pool().await;
        for id in 1..=3_i64 {
            sqlx::query("INSERT INTO tag (id, name) VALUES (?, ?)")
                .bind(id)
                .bind(format!("t{id}"))
                .execute(&pool)
                .await
                .unwrap();
        }
        assert_eq!(delete_ids(&pool, "tag", &[1, 3, 99]).await.unwrap(), 2);
        assert_eq!(delete_ids(&pool, "tag", &[]).await.unwrap(), 0);
    }
}
