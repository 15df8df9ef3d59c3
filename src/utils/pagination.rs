use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

/// Raw `?page=&limit=` query. Both are kept as strings so malformed values
/// fall back to the defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_pages: i64,
    pub current_page: i64,
    pub items_per_page: i64,
    pub total_items: i64,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

impl PaginationParams {
    pub fn page(&self) -> Page {
        let page = positive_or(self.page.as_deref(), DEFAULT_PAGE);
        let limit = positive_or(self.limit.as_deref(), DEFAULT_LIMIT).min(MAX_LIMIT);
        Page {
            page,
            limit,
            offset: (page - 1).saturating_mul(limit),
        }
    }
}

impl Page {
    pub fn meta(&self, total_items: i64) -> PageMeta {
        PageMeta {
            total_pages: total_items / self.limit + i64::from(total_items % self.limit != 0),
            current_page: self.page,
            items_per_page: self.limit,
            total_items,
        }
    }

    pub fn wrap<T>(&self, data: Vec<T>, total_items: i64) -> Paginated<T> {
        Paginated {
            data,
            meta: self.meta(total_items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<&str>, limit: Option<&str>) -> PaginationParams {
        PaginationParams {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn test_defaults() {
        let page = PaginationParams::default().page();
        assert_eq!(page, Page { page: 1, limit: 50, offset: 0 });
    }

    #[test]
    fn test_offset_from_page_and_limit() {
        let page = params(Some("3"), Some("20")).page();
        assert_eq!(page.offset, 40);
        assert_eq!(page.limit, 20);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let page = params(Some("abc"), Some("-5")).page();
        assert_eq!(page, Page { page: 1, limit: 50, offset: 0 });
    }

    #[test]
    fn test_huge_limit_is_capped() {
        let page = params(Some("2"), Some("9223372036854775807")).page();
        assert_eq!(page, Page { page: 2, limit: MAX_LIMIT, offset: MAX_LIMIT });
        assert_eq!(page.meta(250).total_pages, 3);
    }

    #[test]
    fn test_huge_page_saturates_offset() {
        let page = params(Some("9223372036854775807"), Some("100")).page();
        assert_eq!(page.offset, i64::MAX);
        assert_eq!(page.meta(i64::MAX).total_pages, i64::MAX / 100 + 1);
    }

    #[test]
    fn test_meta_rounds_pages_up() {
        let page = params(Some("2"), Some("10")).page();
        let meta = page.meta(21);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.items_per_page, 10);
        assert_eq!(meta.total_items, 21);

        assert_eq!(page.meta(0).total_pages, 0);
    }
}
