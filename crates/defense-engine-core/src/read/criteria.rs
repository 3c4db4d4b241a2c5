// File: src/read/criteria.rs
//
// Query criteria: AND-combined field predicates, multi-key sort, pagination

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::read::ReadModelRecord;

/// Comparison operators supported by read-store filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
}

/// One field predicate. A bare value in the wire form means equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub op: FilterOp,
    pub value: serde_json::Value,
}

impl FilterPredicate {
    pub fn new(op: FilterOp, value: serde_json::Value) -> Self {
        Self { op, value }
    }

    pub fn eq(value: serde_json::Value) -> Self {
        Self::new(FilterOp::Eq, value)
    }

    pub fn ne(value: serde_json::Value) -> Self {
        Self::new(FilterOp::Ne, value)
    }

    pub fn gt(value: serde_json::Value) -> Self {
        Self::new(FilterOp::Gt, value)
    }

    pub fn ge(value: serde_json::Value) -> Self {
        Self::new(FilterOp::Ge, value)
    }

    pub fn lt(value: serde_json::Value) -> Self {
        Self::new(FilterOp::Lt, value)
    }

    pub fn le(value: serde_json::Value) -> Self {
        Self::new(FilterOp::Le, value)
    }

    pub fn within(values: Vec<serde_json::Value>) -> Self {
        Self::new(FilterOp::In, serde_json::Value::Array(values))
    }

    /// Evaluate against a present field value. Missing fields are handled by
    /// the caller: they never match, regardless of operator.
    pub fn evaluate(&self, actual: &serde_json::Value) -> bool {
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Ne => actual != &self.value,
            FilterOp::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Le => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            FilterOp::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Ge => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            FilterOp::In => self
                .value
                .as_array()
                .map_or(false, |candidates| candidates.contains(actual)),
        }
    }
}

/// Sort direction for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A read-store query: one model type, AND-combined filters, multi-key sort,
/// offset/limit pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCriteria {
    pub model_type: String,
    #[serde(default)]
    pub filters: HashMap<String, FilterPredicate>,
    #[serde(default)]
    pub sort: Vec<(String, SortDirection)>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryCriteria {
    pub fn for_type(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            filters: HashMap::new(),
            sort: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, predicate: FilterPredicate) -> Self {
        self.filters.insert(field.into(), predicate);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Do this record's body fields satisfy every filter?
    ///
    /// A field that is absent from the body never matches.
    pub fn matches(&self, record: &ReadModelRecord) -> bool {
        self.filters.iter().all(|(field, predicate)| {
            lookup_field(&record.body, field)
                .map_or(false, |actual| predicate.evaluate(actual))
        })
    }

    /// Comparator implementing the multi-key sort; records missing a sort
    /// field order after those carrying it.
    pub fn compare(&self, a: &ReadModelRecord, b: &ReadModelRecord) -> Ordering {
        for (field, direction) in &self.sort {
            let left = lookup_field(&a.body, field);
            let right = lookup_field(&b.body, field);
            let ordering = match (left, right) {
                (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        // Stable tiebreak so paginated queries are deterministic.
        a.id.cmp(&b.id)
    }
}

/// Resolve a possibly dotted field path inside a JSON body.
pub fn lookup_field<'a>(
    body: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut current = body;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Ordering over JSON scalars: numbers numerically, strings and booleans by
/// their natural order. Mixed or non-scalar types do not compare.
pub fn compare_values(a: &serde_json::Value, b: &serde_json::Value) -> Option<Ordering> {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(l), Value::Number(r)) => {
            l.as_f64().partial_cmp(&r.as_f64())
        }
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, body: serde_json::Value) -> ReadModelRecord {
        ReadModelRecord::new("view", id, body)
    }

    #[test]
    fn equality_and_ordering_filters() {
        let rec = record("r1", json!({"gold": 120, "name": "alpha"}));

        let crit = QueryCriteria::for_type("view")
            .filter("gold", FilterPredicate::ge(json!(100)))
            .filter("name", FilterPredicate::eq(json!("alpha")));
        assert!(crit.matches(&rec));

        let crit = QueryCriteria::for_type("view").filter("gold", FilterPredicate::lt(json!(100)));
        assert!(!crit.matches(&rec));
    }

    #[test]
    fn missing_fields_never_match() {
        let rec = record("r1", json!({"gold": 120}));
        for predicate in [
            FilterPredicate::eq(json!(1)),
            FilterPredicate::ne(json!(1)),
            FilterPredicate::within(vec![json!(1)]),
        ] {
            let crit = QueryCriteria::for_type("view").filter("missing", predicate);
            assert!(!crit.matches(&rec));
        }
    }

    #[test]
    fn in_filter_checks_membership() {
        let rec = record("r1", json!({"status": "active"}));
        let crit = QueryCriteria::for_type("view").filter(
            "status",
            FilterPredicate::within(vec![json!("active"), json!("paused")]),
        );
        assert!(crit.matches(&rec));

        let crit = QueryCriteria::for_type("view")
            .filter("status", FilterPredicate::within(vec![json!("gone")]));
        assert!(!crit.matches(&rec));
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        let rec = record("r1", json!({"stats": {"kills": 42}}));
        let crit = QueryCriteria::for_type("view")
            .filter("stats.kills", FilterPredicate::gt(json!(40)));
        assert!(crit.matches(&rec));
    }

    #[test]
    fn multi_key_sort_with_direction() {
        let a = record("a", json!({"wave": 2, "score": 10}));
        let b = record("b", json!({"wave": 2, "score": 30}));
        let c = record("c", json!({"wave": 1, "score": 99}));

        let crit = QueryCriteria::for_type("view")
            .sort_by("wave", SortDirection::Asc)
            .sort_by("score", SortDirection::Desc);

        let mut rows = vec![a.clone(), b.clone(), c.clone()];
        rows.sort_by(|x, y| crit.compare(x, y));
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn mixed_types_do_not_compare() {
        assert_eq!(compare_values(&json!(1), &json!("1")), None);
        assert_eq!(compare_values(&json!([1]), &json!([1])), None);
    }
}
