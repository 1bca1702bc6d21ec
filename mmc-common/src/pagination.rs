//! Offset pagination for track listings

/// Page size for all paginated track listings
pub const PAGE_SIZE: i64 = 20;

/// Which page a caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    /// 1-indexed page number
    Number(i64),
    /// Every matching row, no LIMIT
    All,
}

impl PageRequest {
    /// Parse the `page` query parameter; missing or unparseable means page 1
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("all") => PageRequest::All,
            Some(s) => PageRequest::Number(s.parse::<i64>().unwrap_or(1).max(1)),
            None => PageRequest::Number(1),
        }
    }

    /// LIMIT and OFFSET for this request; `None` when paging is disabled
    pub fn limit_offset(&self) -> Option<(i64, i64)> {
        match self {
            PageRequest::Number(page) => {
                Some((PAGE_SIZE, ((*page).max(1) - 1).saturating_mul(PAGE_SIZE)))
            }
            PageRequest::All => None,
        }
    }
}

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed); 1 when paging is disabled
    pub page: i64,
    /// Total number of pages
    pub total_pages: i64,
}

/// Calculate pagination metadata from the total match count
///
/// Pages past the end are reported as requested (they simply hold no rows).
///
/// # Examples
/// ```
/// use mmc_common::pagination::{calculate_pagination, PageRequest};
///
/// // 45 results = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, PageRequest::Number(2));
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// ```
pub fn calculate_pagination(total_results: i64, request: PageRequest) -> Pagination {
    match request {
        PageRequest::Number(page) => Pagination {
            page: page.max(1),
            total_pages: (total_results + PAGE_SIZE - 1) / PAGE_SIZE,
        },
        PageRequest::All => Pagination {
            page: 1,
            total_pages: if total_results > 0 { 1 } else { 0 },
        },
    }
}
