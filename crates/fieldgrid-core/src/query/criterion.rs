//! Module: query::criterion
//! Responsibility: the serializable request shapes: criteria, sort keys and
//! the search setup that owns them.

use serde::{Deserialize, Serialize};

///
/// SearchCriterion
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SearchCriterion {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: String,
}

impl SearchCriterion {
    #[must_use]
    pub fn new(field: &str, operator: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
        }
    }
}

///
/// SortCriterion
///
/// Keys apply in ascending `rank`; equal ranks keep their list order.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SortCriterion {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub rank: i64,
}

impl SortCriterion {
    #[must_use]
    pub fn asc(field: &str, rank: i64) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
            rank,
        }
    }

    #[must_use]
    pub fn desc(field: &str, rank: i64) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
            rank,
        }
    }
}

///
/// SearchSetup
///
/// A saved (or transient) search: root module, filter, order and the
/// columns to materialize.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SearchSetup {
    pub id: i64,
    pub module: String,
    #[serde(default)]
    pub criteria: Vec<SearchCriterion>,
    #[serde(default)]
    pub sorts: Vec<SortCriterion>,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl SearchSetup {
    #[must_use]
    pub fn new(id: i64, module: &str) -> Self {
        Self {
            id,
            module: module.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_criterion(mut self, field: &str, operator: &str, value: &str) -> Self {
        self.criteria.push(SearchCriterion::new(field, operator, value));
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: SortCriterion) -> Self {
        self.sorts.push(sort);
        self
    }

    #[must_use]
    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(ToString::to_string).collect();
        self
    }

    /// Sort keys in application order.
    #[must_use]
    pub fn ordered_sorts(&self) -> Vec<&SortCriterion> {
        let mut sorts: Vec<&SortCriterion> = self.sorts.iter().collect();
        sorts.sort_by_key(|s| s.rank);

        sorts
    }
}
