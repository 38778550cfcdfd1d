//! Zero-based page/per-page query parameters and the envelope list
//! endpoints respond with.

use serde::{Deserialize, Serialize};

fn default_per_page() -> i64 {
    10
}

const MAX_PER_PAGE: i64 = 100;
// Highest page whose offset still fits in an i64 at the per_page cap.
const MAX_PAGE: i64 = i64::MAX / MAX_PER_PAGE;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 0,
            per_page: default_per_page(),
        }
    }
}

impl PageParams {
    /// Clamps per_page into 1..=100 and page to the largest value whose
    /// offset still fits in an i64.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.clamp(0, MAX_PAGE),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.per_page)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResponse<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> PagedResponse<T> {
    pub fn new(content: Vec<T>, params: PageParams, total: i64) -> Self {
        Self {
            content,
            page: params.page,
            per_page: params.per_page,
            total,
        }
    }

    /// Pages an already materialized list, for endpoints that filter in
    /// memory after the database query.
    pub fn slice(items: Vec<T>, params: PageParams) -> Self {
        let params = params.normalized();
        let total = items.len() as i64;
        let content = items
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.per_page as usize)
            .collect();
        Self::new(content, params, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_first_page_of_ten() {
        let params = PageParams::default();
        assert_eq!(params.page, 0);
        assert_eq!(params.per_page, 10);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn normalized_clamps_hostile_values() {
        let params = PageParams {
            page: -3,
            per_page: 5000,
        }
        .normalized();
        assert_eq!(params.page, 0);
        assert_eq!(params.per_page, 100);
    }

    #[test]
    fn hostile_page_cannot_overflow_the_offset() {
        let params = PageParams {
            page: i64::MAX,
            per_page: 3,
        };
        // Saturates rather than wrapping even before normalization.
        assert_eq!(params.offset(), i64::MAX);

        let params = params.normalized();
        assert_eq!(params.page, i64::MAX / 100);
        assert_eq!(params.offset(), i64::MAX / 100 * 3);
    }

    #[test]
    fn slice_returns_the_requested_window() {
        let items: Vec<i32> = (0..25).collect();
        let paged = PagedResponse::slice(
            items,
            PageParams {
                page: 1,
                per_page: 10,
            },
        );
        assert_eq!(paged.content, (10..20).collect::<Vec<_>>());
        assert_eq!(paged.total, 25);
    }

    #[test]
    fn slice_past_the_end_is_empty() {
        let items: Vec<i32> = (0..5).collect();
        let paged = PagedResponse::slice(
            items,
            PageParams {
                page: 4,
                per_page: 10,
            },
        );
        assert!(paged.content.is_empty());
        assert_eq!(paged.total, 5);
    }
}
