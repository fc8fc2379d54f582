//! Page parameters for drill-down views over statistic details.

use serde::{Deserialize, Serialize};

/// `?page=&per_page=` query parameters. Pages start at 1.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    const MAX_PER_PAGE: i64 = 100;
    const DEFAULT_PER_PAGE: i64 = 25;

    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.current_page() - 1) * self.limit()
    }

    pub fn current_page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }
}

/// One page of an in-memory list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T: Serialize + Clone> PagedResult<T> {
    /// Cut the requested page out of the full list. Pages past the end are empty.
    pub fn from_slice(all: &[T], pagination: &Pagination) -> Self {
        let per_page = pagination.limit();
        let total = all.len() as i64;
        let start = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
        let items = all
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect();
        Self {
            items,
            total,
            page: pagination.current_page(),
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_25() {
        let p = Pagination::default();
        assert_eq!(p.limit(), 25);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.current_page(), 1);
    }

    #[test]
    fn per_page_is_clamped() {
        assert_eq!(Pagination::new(1, 500).limit(), 100);
        assert_eq!(Pagination::new(1, 0).limit(), 1);
        assert_eq!(Pagination::new(-4, 10).current_page(), 1);
    }

    #[test]
    fn slices_requested_page() {
        let all: Vec<i32> = (1..=25).collect();
        let page = PagedResult::from_slice(&all, &Pagination::new(3, 10));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 3);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let all = vec!["a", "b"];
        let page = PagedResult::from_slice(&all, &Pagination::new(5, 10));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 1);
    }
}
