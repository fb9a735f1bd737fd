//! Collection queries: equality and array-membership filters, single-field ordering, limit.
//!
//! Both backends evaluate queries client-side with [`Query::matches`] and [`Query::apply`], so
//! a query means the same thing against any store.
//!
//! Filters can be written as `field:op:value` descriptors (`bookmarks:contains:u1`,
//! `author.uid:eq:u2`); the value is read as JSON when it parses and as a string otherwise.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{errors::StoreError, store::DocSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field at `path` equals `value`.
    Eq { path: String, value: Value },
    /// Field at `path` is an array containing `value`.
    ArrayContains { path: String, value: Value },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn array_contains(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::ArrayContains {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Parses a `field:op:value` descriptor. Supported ops: `eq`, `contains`.
    pub fn parse(descriptor: &str) -> Result<Self, StoreError> {
        let mut parts = descriptor.splitn(3, ':');
        let (Some(path), Some(op), Some(raw)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(StoreError::invalid(format!(
                "filter '{descriptor}' must look like field:op:value"
            )));
        };
        if path.is_empty() {
            return Err(StoreError::invalid(format!("filter '{descriptor}' has an empty field")));
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        match op {
            "eq" => Ok(Filter::eq(path, value)),
            "contains" => Ok(Filter::array_contains(path, value)),
            other => Err(StoreError::invalid(format!("unknown filter operator '{other}'"))),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq { path, value } => lookup(data, path).is_some_and(|found| found == value),
            Filter::ArrayContains { path, value } => lookup(data, path)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_eq(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(path, value))
    }

    pub fn where_array_contains(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::array_contains(path, value))
    }

    pub fn order_by(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((path.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(data))
    }

    /// Filters, orders and truncates `snapshots` of this query's collection.
    ///
    /// Without an ordering, results are sorted by document id so repeated evaluations agree.
    pub fn apply(&self, snapshots: impl IntoIterator<Item = DocSnapshot>) -> Vec<DocSnapshot> {
        let mut results: Vec<DocSnapshot> = snapshots.into_iter().filter(|snap| self.matches(&snap.data)).collect();
        match &self.order_by {
            Some((path, order)) => results.sort_by(|a, b| {
                let ordering = compare_values(lookup(&a.data, path), lookup(&b.data, path)).then_with(|| a.id.cmp(&b.id));
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            }),
            None => results.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}

/// Resolves a dotted path (`author.uid`) inside a JSON document.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| current.get(segment))
}

/// Total order over JSON values used for sorting: missing < null < bool < number < string.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
