//! Pagination and sort parameters for list queries.
//!
//! The sort key is user input and ends up in an `ORDER BY` clause, which
//! cannot take bind parameters. [`Filters::sort_column`] therefore only ever
//! returns a value that appears verbatim in the code-supplied safe list.

use std::fmt;

use serde::Serialize;

use crate::error::AuthError;
use crate::validator::{permitted_value, Validator};

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safe_list: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl Filters {
    pub fn new<S: AsRef<str>>(
        page: i64,
        page_size: i64,
        sort: impl Into<String>,
        sort_safe_list: &[S],
    ) -> Self {
        Self {
            page,
            page_size,
            sort: sort.into(),
            sort_safe_list: sort_safe_list
                .iter()
                .map(|s| s.as_ref().to_string())
                .collect(),
        }
    }

    /// Column named by the sort key, without its direction prefix.
    ///
    /// A key missing from the safe list means validation was skipped; the
    /// query is aborted instead of guessing a column.
    pub fn sort_column(&self) -> Result<&str, AuthError> {
        if permitted_value(&self.sort, &self.sort_safe_list) {
            return Ok(self.sort.strip_prefix('-').unwrap_or(&self.sort));
        }

        tracing::error!(sort = %self.sort, "Unsafe sort parameter reached query construction");
        Err(AuthError::Invariant("unsafe sort parameter"))
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0).saturating_mul(self.page_size)
    }

    /// `ORDER BY` body with a primary-key tiebreak for stable paging.
    pub fn order_by_clause(&self) -> Result<String, AuthError> {
        let column = self.sort_column()?;
        Ok(format!("{} {}, id ASC", column, self.sort_direction()))
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(
        filters.page < MAX_PAGE,
        "page",
        "must be a maximum of 10 million",
    );
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= MAX_PAGE_SIZE,
        "page_size",
        "must be a maximum of 100",
    );
    v.check(
        permitted_value(&filters.sort, &filters.sort_safe_list),
        "sort",
        "invalid sort value",
    );
}

/// Pagination details returned next to a page of results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records <= 0 || page_size <= 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAFE: [&str; 4] = ["year", "-year", "title", "-title"];

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters::new(page, page_size, sort, &SAFE)
    }

    fn errors_for(f: &Filters) -> Validator {
        let mut v = Validator::new();
        validate_filters(&mut v, f);
        v
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(
            errors_for(&filters(0, 20, "year")).errors()["page"],
            "must be greater than zero"
        );
        assert_eq!(
            errors_for(&filters(MAX_PAGE, 20, "year")).errors()["page"],
            "must be a maximum of 10 million"
        );
        assert!(errors_for(&filters(9_999_999, 20, "year")).valid());
        assert!(errors_for(&filters(1, 20, "year")).valid());
    }

    #[test]
    fn test_page_size_bounds() {
        assert_eq!(
            errors_for(&filters(1, 0, "year")).errors()["page_size"],
            "must be greater than zero"
        );
        assert_eq!(
            errors_for(&filters(1, 101, "year")).errors()["page_size"],
            "must be a maximum of 100"
        );
        assert!(errors_for(&filters(1, 100, "year")).valid());
    }

    #[test]
    fn test_sort_must_be_safe() {
        let v = errors_for(&filters(1, 20, "id"));
        assert_eq!(v.errors()["sort"], "invalid sort value");
        assert_eq!(v.errors().len(), 1);

        let v = errors_for(&filters(1, 20, "year; DROP TABLE users"));
        assert_eq!(v.errors()["sort"], "invalid sort value");
    }

    #[test]
    fn test_all_failures_reported_together() {
        let v = errors_for(&filters(0, 101, "id"));
        assert_eq!(v.errors().len(), 3);
    }

    #[test]
    fn test_sort_column_and_direction() {
        let f = filters(1, 20, "-year");
        assert_eq!(f.sort_column().unwrap(), "year");
        assert_eq!(f.sort_direction(), SortDirection::Descending);
        assert_eq!(f.sort_direction().to_string(), "DESC");

        let f = filters(1, 20, "title");
        assert_eq!(f.sort_column().unwrap(), "title");
        assert_eq!(f.sort_direction().as_sql(), "ASC");
    }

    #[test]
    fn test_sort_column_aborts_on_safe_list_miss() {
        let f = filters(1, 20, "id");
        assert!(matches!(f.sort_column(), Err(AuthError::Invariant(_))));
        assert!(f.order_by_clause().is_err());
    }

    #[test]
    fn test_sign_must_match_safe_list_exactly() {
        let f = Filters::new(1, 20, "-year", &["year"]);
        assert!(f.sort_column().is_err());
    }

    #[test]
    fn test_order_by_clause() {
        assert_eq!(
            filters(1, 20, "-title").order_by_clause().unwrap(),
            "title DESC, id ASC"
        );
    }

    #[test]
    fn test_limit_and_offset() {
        let f = filters(3, 25, "year");
        assert_eq!(f.limit(), 25);
        assert_eq!(f.offset(), 50);
        assert_eq!(filters(1, 25, "year").offset(), 0);
    }

    #[test]
    fn test_calculate_metadata() {
        assert_eq!(calculate_metadata(0, 1, 20), Metadata::default());

        let metadata = calculate_metadata(41, 2, 20);
        assert_eq!(metadata.current_page, 2);
        assert_eq!(metadata.first_page, 1);
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.total_records, 41);

        assert_eq!(calculate_metadata(40, 1, 20).last_page, 2);
    }

    #[test]
    fn test_empty_metadata_serializes_empty() {
        let json = serde_json::to_string(&Metadata::default()).unwrap();
        assert_eq!(json, "{}");
    }

    proptest! {
        #[test]
        fn prop_sort_column_only_from_safe_list(sort in "-?[a-z_]{1,12}") {
            let f = filters(1, 20, &sort);
            match f.sort_column() {
                Ok(column) => {
                    prop_assert!(SAFE.contains(&sort.as_str()));
                    prop_assert!(SAFE.contains(&column));
                }
                Err(_) => prop_assert!(!SAFE.contains(&sort.as_str())),
            }
        }

        #[test]
        fn prop_in_range_filters_validate(page in 1i64..MAX_PAGE, page_size in 1i64..=MAX_PAGE_SIZE) {
            prop_assert!(errors_for(&filters(page, page_size, "year")).valid());
        }
    }
}
