//! Filter types shared by the underlying accessors and the scoped layer.
//!
//! Records are JSON objects ([`Document`]). [`WhereClause`] models the
//! predicate argument of the `find` family: either one record of
//! constraints or an array of alternatives (logical OR). [`Predicate`] is
//! the expression tree the fluent query builders accumulate.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored representation of one record.
pub type Document = serde_json::Map<String, Value>;

/// Constraints keyed by storage column. All entries must hold.
pub type Conditions = BTreeMap<String, FieldFilter>;

/// Constraint on a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldFilter {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    IsNull,
    NotNull,
}

impl FieldFilter {
    /// Evaluates the constraint against a column value. A missing column is
    /// treated as `null`.
    #[must_use]
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = actual.unwrap_or(&Value::Null);
        match self {
            Self::Eq(expected) => actual == expected,
            Self::Ne(expected) => actual != expected,
            Self::Gt(bound) => compare_values(actual, bound) == Some(Ordering::Greater),
            Self::Gte(bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt(bound) => compare_values(actual, bound) == Some(Ordering::Less),
            Self::Lte(bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In(candidates) => candidates.contains(actual),
            Self::IsNull => actual.is_null(),
            Self::NotNull => !actual.is_null(),
        }
    }
}

impl From<&str> for FieldFilter {
    fn from(value: &str) -> Self {
        Self::Eq(Value::String(value.to_string()))
    }
}

impl From<String> for FieldFilter {
    fn from(value: String) -> Self {
        Self::Eq(Value::String(value))
    }
}

impl From<Value> for FieldFilter {
    fn from(value: Value) -> Self {
        Self::Eq(value)
    }
}

/// Orders two JSON scalars of the same kind. Mixed kinds are incomparable.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Returns `true` if every constraint holds on `doc`.
#[must_use]
pub fn conditions_match(conditions: &Conditions, doc: &Document) -> bool {
    conditions
        .iter()
        .all(|(column, filter)| filter.matches(doc.get(column)))
}

/// Predicate argument of the `find` family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhereClause {
    /// A single record of constraints.
    All(Conditions),
    /// Alternatives; a record matches if any alternative matches.
    /// An empty list places no constraint.
    Any(Vec<Conditions>),
}

impl WhereClause {
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All(conditions) => conditions_match(conditions, doc),
            Self::Any(alternatives) => {
                alternatives.is_empty() || alternatives.iter().any(|c| conditions_match(c, doc))
            }
        }
    }

    /// Adds `extra` to every alternative, overwriting columns already present.
    #[must_use]
    pub fn and_conditions(self, extra: &Conditions) -> Self {
        let merge = |mut conditions: Conditions| {
            for (column, filter) in extra {
                conditions.insert(column.clone(), filter.clone());
            }
            conditions
        };
        match self {
            Self::All(conditions) => Self::All(merge(conditions)),
            Self::Any(alternatives) if alternatives.is_empty() => Self::Any(vec![extra.clone()]),
            Self::Any(alternatives) => Self::Any(alternatives.into_iter().map(merge).collect()),
        }
    }

    /// The list of alternatives, with `All` seen as one alternative.
    #[must_use]
    pub fn alternatives(&self) -> Vec<&Conditions> {
        match self {
            Self::All(conditions) => vec![conditions],
            Self::Any(alternatives) => alternatives.iter().collect(),
        }
    }
}

impl From<Conditions> for WhereClause {
    fn from(conditions: Conditions) -> Self {
        Self::All(conditions)
    }
}

/// Sort direction for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Options accepted by `find`, `find_one` and `find_and_count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub filter: Option<WhereClause>,
    pub order: Vec<(String, SortDirection)>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    /// Include soft-deleted records.
    pub with_deleted: bool,
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: impl Into<WhereClause>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push((column.into(), direction));
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    #[must_use]
    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }
}

/// Target of `update`, `delete`, `soft_delete` and `restore`.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// A single primary key.
    Id(Value),
    /// Several primary keys.
    Ids(Vec<Value>),
    /// A record of constraints.
    Where(Conditions),
}

impl Criteria {
    /// Converts identifier forms into constraints on `primary_key`.
    #[must_use]
    pub fn into_conditions(self, primary_key: &str) -> Conditions {
        match self {
            Self::Id(id) => Conditions::from([(primary_key.to_string(), FieldFilter::Eq(id))]),
            Self::Ids(ids) => Conditions::from([(primary_key.to_string(), FieldFilter::In(ids))]),
            Self::Where(conditions) => conditions,
        }
    }
}

impl From<&str> for Criteria {
    fn from(id: &str) -> Self {
        Self::Id(Value::String(id.to_string()))
    }
}

impl From<Conditions> for Criteria {
    fn from(conditions: Conditions) -> Self {
        Self::Where(conditions)
    }
}

/// Expression tree built by fluent query builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    Field { column: String, filter: FieldFilter },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    #[must_use]
    pub fn field(column: impl Into<String>, filter: FieldFilter) -> Self {
        Self::Field {
            column: column.into(),
            filter,
        }
    }

    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(column, FieldFilter::Eq(value.into()))
    }

    /// Conjunction of every constraint in `conditions`.
    #[must_use]
    pub fn from_conditions(conditions: &Conditions) -> Self {
        Self::And(
            conditions
                .iter()
                .map(|(column, filter)| Self::field(column.clone(), filter.clone()))
                .collect(),
        )
    }

    /// `And` of nothing is true, `Or` of nothing is false.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Field { column, filter } => filter.matches(doc.get(column)),
            Self::And(children) => children.iter().all(|p| p.matches(doc)),
            Self::Or(children) => children.iter().any(|p| p.matches(doc)),
            Self::Not(inner) => !inner.matches(doc),
        }
    }

    /// Returns `true` if the tree constrains `column` to exactly `value` on
    /// every path, i.e. no record with a different value can match.
    #[must_use]
    pub fn pins(&self, column: &str, value: &Value) -> bool {
        match self {
            Self::Field { column: c, filter } => {
                c == column && *filter == FieldFilter::Eq(value.clone())
            }
            Self::And(children) => children.iter().any(|p| p.pins(column, value)),
            Self::Or(children) => !children.is_empty() && children.iter().all(|p| p.pins(column, value)),
            Self::Not(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn org(id: &str) -> Conditions {
        Conditions::from([("organization_id".to_string(), FieldFilter::from(id))])
    }

    #[test]
    fn field_filters_compare_numbers_and_strings() {
        assert!(FieldFilter::Gt(json!(3)).matches(Some(&json!(4))));
        assert!(!FieldFilter::Gt(json!(3)).matches(Some(&json!(3))));
        assert!(FieldFilter::Lte(json!("b")).matches(Some(&json!("a"))));
        assert!(FieldFilter::In(vec![json!(1), json!(2)]).matches(Some(&json!(2))));
        assert!(FieldFilter::IsNull.matches(None));
        assert!(!FieldFilter::NotNull.matches(Some(&Value::Null)));
        // Mixed kinds never compare.
        assert!(!FieldFilter::Gt(json!(1)).matches(Some(&json!("2"))));
    }

    #[test]
    fn and_conditions_overwrites_caller_tenant_field() {
        let caller = Conditions::from([
            ("organization_id".to_string(), FieldFilter::from("org-2")),
            ("status".to_string(), FieldFilter::from("open")),
        ]);
        let merged = WhereClause::All(caller).and_conditions(&org("org-1"));
        let WhereClause::All(conditions) = merged else {
            panic!("shape changed");
        };
        assert_eq!(conditions["organization_id"], FieldFilter::from("org-1"));
        assert_eq!(conditions["status"], FieldFilter::from("open"));
    }

    #[test]
    fn and_conditions_reaches_every_alternative() {
        let clause = WhereClause::Any(vec![
            Conditions::from([("status".to_string(), FieldFilter::from("open"))]),
            Conditions::from([("status".to_string(), FieldFilter::from("closed"))]),
        ])
        .and_conditions(&org("org-1"));
        let foreign = doc(json!({"organization_id": "org-2", "status": "open"}));
        let own = doc(json!({"organization_id": "org-1", "status": "closed"}));
        assert!(!clause.matches(&foreign));
        assert!(clause.matches(&own));
    }

    #[test]
    fn empty_alternatives_become_a_single_scoped_alternative() {
        let clause = WhereClause::Any(Vec::new()).and_conditions(&org("org-1"));
        assert_eq!(clause, WhereClause::Any(vec![org("org-1")]));
        assert!(!clause.matches(&doc(json!({"organization_id": "org-2"}))));
    }

    #[test]
    fn criteria_identifiers_become_primary_key_constraints() {
        let single = Criteria::from("a").into_conditions("id");
        assert_eq!(single["id"], FieldFilter::from("a"));

        let many = Criteria::Ids(vec![json!(1), json!(2)]).into_conditions("pk");
        assert_eq!(many["pk"], FieldFilter::In(vec![json!(1), json!(2)]));
    }

    #[test]
    fn predicate_pins_only_when_every_branch_constrains() {
        let scoped = Predicate::And(vec![
            Predicate::eq("organization_id", "org-1"),
            Predicate::Or(vec![Predicate::eq("a", 1), Predicate::eq("b", 2)]),
        ]);
        assert!(scoped.pins("organization_id", &json!("org-1")));

        let escaped = Predicate::Or(vec![
            Predicate::eq("organization_id", "org-1"),
            Predicate::eq("a", 1),
        ]);
        assert!(!escaped.pins("organization_id", &json!("org-1")));
        assert!(!Predicate::Or(Vec::new()).pins("organization_id", &json!("org-1")));
    }

    #[test]
    fn predicate_evaluation() {
        let p = Predicate::And(vec![
            Predicate::eq("kind", "task"),
            Predicate::Not(Box::new(Predicate::field("done", FieldFilter::Eq(json!(true))))),
        ]);
        assert!(p.matches(&doc(json!({"kind": "task", "done": false}))));
        assert!(!p.matches(&doc(json!({"kind": "task", "done": true}))));
        assert!(Predicate::And(Vec::new()).matches(&Document::new()));
        assert!(!Predicate::Or(Vec::new()).matches(&Document::new()));
    }

    proptest! {
        #[test]
        fn merged_alternatives_never_admit_foreign_tenant(
            statuses in proptest::collection::vec("[a-z]{1,6}", 0..6),
            foreign in "org-[2-9]",
        ) {
            let alternatives: Vec<Conditions> = statuses
                .iter()
                .map(|s| Conditions::from([("status".to_string(), FieldFilter::from(s.as_str()))]))
                .collect();
            let clause = WhereClause::Any(alternatives).and_conditions(&org("org-1"));
            for status in &statuses {
                let record = doc(json!({"organization_id": foreign, "status": status}));
                prop_assert!(!clause.matches(&record));
            }
            for alternative in clause.alternatives() {
                prop_assert_eq!(&alternative["organization_id"], &FieldFilter::from("org-1"));
            }
        }
    }
}
