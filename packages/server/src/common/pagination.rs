//! Page/size pagination types
//!
//! Listing queries, slot searches and favorites are paginated by page number
//! (1-based) and page size, with a total count so clients can render pagers.
//!
//! # Usage
//!
//! ```rust
//! use toq_core::common::pagination::{Page, PageRequest};
//!
//! let request = PageRequest::new(Some(2), Some(10)).validate().unwrap();
//! assert_eq!(request.offset(), 10);
//!
//! let page = Page::new(vec![11, 12], 12, &request);
//! assert!(!page.has_next_page);
//! ```

use serde::{Deserialize, Serialize};

/// Default page size when none is given.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page size a client may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw pagination input (as received from query strings).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl PageRequest {
    pub fn new(page: Option<i64>, size: Option<i64>) -> Self {
        Self { page, size }
    }

    /// Apply defaults and bounds.
    ///
    /// Page must be >= 1 when given; size is clamped to 1..=100.
    pub fn validate(&self) -> Result<ValidatedPage, &'static str> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err("page must be >= 1");
        }
        let size = self.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Ok(ValidatedPage { page, size })
    }
}

/// Validated and normalized pagination arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPage {
    /// 1-based page number.
    pub page: i64,
    /// Items per page (1-100, default 20).
    pub size: i64,
}

impl ValidatedPage {
    pub fn first(size: i64) -> Self {
        Self {
            page: 1,
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// SQL OFFSET value.
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }

    /// SQL LIMIT value.
    pub fn limit(&self) -> i64 {
        self.size
    }

    /// Slice an already ordered in-memory result set.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let size = usize::try_from(self.size).unwrap_or(0);
        items.iter().skip(start).take(size).cloned().collect()
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total: i64,
    pub has_next_page: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: &ValidatedPage) -> Self {
        let has_next_page = request.offset() + (items.len() as i64) < total;
        Self {
            items,
            page: request.page,
            size: request.size,
            total,
            has_next_page,
        }
    }

    pub fn empty(request: &ValidatedPage) -> Self {
        Self::new(Vec::new(), 0, request)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
            has_next_page: self.has_next_page,
        }
    }
}
