mod cost_records;
mod insights;

pub use cost_records::*;
pub use insights::*;

/// Pagination window for list queries.
///
/// `total` in [`ListResult`] is always computed before this window is
/// applied, so callers can page through a stable count.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
        }
    }
}

/// A page of results plus the pre-pagination total.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total: i64,
}
