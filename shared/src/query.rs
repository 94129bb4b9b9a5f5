//! List query and pagination types
//!
//! Every listing endpoint accepts a [`ListQuery`] (free-text search, sort
//! column, direction, page) and answers with a [`Page`].

use serde::{Deserialize, Serialize};

/// Default page size
pub const DEFAULT_PER_PAGE: u32 = 25;
/// Upper bound on page size
pub const MAX_PER_PAGE: u32 = 100;

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// List request: `?q=&sort=&order=&page=&per_page=`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    /// Free-text search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// Sort column (resolved against a per-resource whitelist)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    /// Sort direction (resource default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    /// Page number (1-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl ListQuery {
    /// Page number, clamped to >= 1
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size, clamped to [1, MAX_PER_PAGE]
    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// Row offset for the current page
    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.per_page() as i64
    }

    /// Trimmed search text, `None` when blank
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Add search text
    pub fn with_search(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Add sort
    pub fn order_by(mut self, sort: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(sort.into());
        self.order = Some(order);
        self
    }

    /// Add pagination
    pub fn paginate(mut self, page: u32, per_page: u32) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: u32, per_page: u32) -> Self {
        let total_pages = if per_page > 0 && total > 0 {
            ((total as u64).div_ceil(per_page as u64)) as u32
        } else {
            0
        };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }

    /// Build a page from the query that produced it
    pub fn from_query(items: Vec<T>, total: i64, query: &ListQuery) -> Self {
        Self::new(items, total, query.page(), query.per_page())
    }

    /// Map items, keeping pagination metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

/// Bulk delete (data-table row selection)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<i64>,
}

/// Bulk delete result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteResult {
    pub deleted: u64,
}
