//! This modules defines the common functionality for paging data.

use serde::Serialize;

use crate::Error;

/// The config for pagination
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The page number to default to when not specified in a request.
    pub default_page: u64,
    /// The maximum number of items per page when not specified in a request.
    pub default_page_size: u64,
    /// The largest page size a client may ask for.
    pub max_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// The page that a client asked for, after defaults and limits are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// The 1-based page number.
    pub page: u64,
    /// The number of items per page.
    pub per_page: u64,
}

impl PageRequest {
    /// Resolve the optional `page` and `per_page` query parameters against `config`.
    ///
    /// Page numbers below one are treated as the first page and page sizes are
    /// clamped to `1..=config.max_page_size`.
    pub fn resolve(page: Option<u64>, per_page: Option<u64>, config: &PaginationConfig) -> Self {
        let page = page.unwrap_or(config.default_page).max(1);
        let per_page = per_page
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size.max(1));

        Self { page, per_page }
    }

    /// The page size as a SQL `LIMIT`.
    ///
    /// # Errors
    /// Returns an [Error::Validation] on `per_page` if it does not fit in a SQL integer.
    pub fn limit(&self) -> Result<i64, Error> {
        i64::try_from(self.per_page).map_err(|_| Error::validation("per_page", "is too large"))
    }

    /// The number of rows to skip for this page as a SQL `OFFSET`.
    ///
    /// # Errors
    /// Returns an [Error::Validation] on `page` if the offset does not fit in a SQL integer.
    pub fn offset(&self) -> Result<i64, Error> {
        self.page
            .saturating_sub(1)
            .checked_mul(self.per_page)
            .and_then(|offset| i64::try_from(offset).ok())
            .ok_or_else(|| Error::validation("page", "is too large"))
    }
}

/// Where a page sits among all the matching items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// The 1-based page number.
    pub page: u64,
    /// The maximum number of items per page.
    pub per_page: u64,
    /// The total number of items across all pages.
    pub total: u64,
    /// The number of pages needed to show all items.
    pub page_count: u64,
}

impl PageInfo {
    /// Describe the page fetched for `request` out of `total` matching items.
    pub fn new(request: PageRequest, total: u64) -> Self {
        Self {
            page: request.page,
            per_page: request.per_page,
            total,
            page_count: total.div_ceil(request.per_page),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Error,
        pagination::{PageInfo, PageRequest, PaginationConfig},
    };

    #[test]
    fn uses_defaults_when_not_specified() {
        let config = PaginationConfig::default();

        let got = PageRequest::resolve(None, None, &config);

        assert_eq!(
            got,
            PageRequest {
                page: 1,
                per_page: 20
            }
        );
        assert_eq!(got.offset(), Ok(0));
    }

    #[test]
    fn clamps_out_of_range_values() {
        let config = PaginationConfig::default();

        let got = PageRequest::resolve(Some(0), Some(10_000), &config);

        assert_eq!(
            got,
            PageRequest {
                page: 1,
                per_page: 100
            }
        );
    }

    #[test]
    fn offset_skips_previous_pages() {
        let request = PageRequest {
            page: 3,
            per_page: 10,
        };

        assert_eq!(request.offset(), Ok(20));
    }

    #[test]
    fn huge_page_is_a_validation_error() {
        let config = PaginationConfig::default();

        let got = PageRequest::resolve(Some(u64::MAX), None, &config);

        assert_eq!(got.offset(), Err(Error::validation("page", "is too large")));
        assert_eq!(got.limit(), Ok(20));
    }

    #[test]
    fn offset_beyond_sql_integer_is_a_validation_error() {
        let request = PageRequest {
            page: u64::MAX / 100,
            per_page: 100,
        };

        assert_eq!(request.offset(), Err(Error::validation("page", "is too large")));
    }

    #[test]
    fn page_count_rounds_up() {
        let request = PageRequest {
            page: 1,
            per_page: 20,
        };

        let page = PageInfo::new(request, 41);

        assert_eq!(page.page_count, 3);
        assert_eq!(page.total, 41);
    }
}
