use crate::error::{DataError, FieldError};
use serde::{Deserialize, Serialize};

/// Largest row count or offset representable as a signed 64-bit SQL integer.
const MAX_ROWS: u64 = i64::MAX as u64;

/// Pagination parameters. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl PageRequest {
    /// Validate and build a request; both numbers must be at least 1.
    pub fn new(page: u64, per_page: u64) -> Result<Self, DataError> {
        let mut errors = Vec::new();
        if page < 1 {
            errors.push(FieldError::new("page", "must be a positive integer"));
        }
        if per_page < 1 {
            errors.push(FieldError::new("per_page", "must be a positive integer"));
        }
        if !errors.is_empty() {
            return Err(DataError::Validation(errors));
        }
        Ok(Self { page, per_page })
    }

    /// Rows to skip, or `None` when the page starts beyond any row count a
    /// database can hold. Such a page is past the end.
    pub fn offset(&self) -> Option<u64> {
        self.page
            .saturating_sub(1)
            .checked_mul(self.per_page)
            .filter(|offset| *offset <= MAX_ROWS)
    }

    /// Row limit for one page, capped at what SQL `LIMIT` accepts.
    pub fn limit(&self) -> u64 {
        self.per_page.min(MAX_ROWS)
    }
}

/// A page of results with pagination metadata.
///
/// An immutable snapshot: items and total were read in the same session.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: &PageRequest, total: u64) -> Self {
        let pages = if request.per_page == 0 {
            0
        } else {
            total.div_ceil(request.per_page)
        };
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
            pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            pages: self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_is_one_based() {
        assert_eq!(PageRequest::new(1, 10).unwrap().offset(), Some(0));
        assert_eq!(PageRequest::new(3, 10).unwrap().offset(), Some(20));
    }

    #[test]
    fn test_huge_page_has_no_offset() {
        assert_eq!(PageRequest::new(u64::MAX, 10).unwrap().offset(), None);
        assert_eq!(PageRequest::new(2, u64::MAX).unwrap().offset(), None);
        assert_eq!(PageRequest::new(1, u64::MAX).unwrap().offset(), Some(0));
        assert_eq!(PageRequest::new(1, u64::MAX).unwrap().limit(), i64::MAX as u64);
    }

    #[test]
    fn test_rejects_zero() {
        let err = PageRequest::new(0, 0).unwrap_err();
        match err {
            DataError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_page_metadata() {
        let req = PageRequest::new(3, 10).unwrap();
        let page = Page::new(vec![1, 2, 3, 4, 5], &req, 25);
        assert_eq!(page.pages, 3);
        assert!(!page.has_next());
        assert!(page.has_prev());

        let first = Page::new(vec![0; 10], &PageRequest::new(1, 10).unwrap(), 25);
        assert!(first.has_next());
        assert!(!first.has_prev());
    }

    #[test]
    fn test_empty_total_has_no_pages() {
        let page: Page<i32> = Page::new(Vec::new(), &PageRequest::default(), 0);
        assert_eq!(page.pages, 0);
        assert!(!page.has_next());
    }

    #[test]
    fn test_serializes_snapshot() {
        let page = Page::new(vec!["a"], &PageRequest::new(2, 1).unwrap(), 2);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["items"], serde_json::json!(["a"]));
        assert_eq!(json["total"], 2);
        assert_eq!(json["pages"], 2);
    }
}
