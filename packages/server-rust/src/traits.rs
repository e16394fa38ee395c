use async_trait::async_trait;
use serde_json::Value;
use tenantscope_core::{Criteria, Document, Entity, FindOptions, Predicate, SortDirection, WhereClause};

use crate::scoped::guard::ScopeMarker;

/// Underlying, unscoped accessor for one entity type.
///
/// A conventional predicate-based repository with a fluent query builder.
/// Implementations: in-memory (tests, dev); SQL backends wrap one table each.
/// Business code never holds one of these directly; it goes through
/// [`ScopedRepository`](crate::scoped::ScopedRepository).
#[async_trait]
pub trait DataAccessor<E: Entity>: Send + Sync {
    /// Records matching `options`, soft-deleted ones excluded unless requested.
    async fn find(&self, options: FindOptions) -> anyhow::Result<Vec<E>>;

    /// First record matching `options`.
    async fn find_one(&self, options: FindOptions) -> anyhow::Result<Option<E>>;

    /// One page of records plus the total number of matches ignoring skip/take.
    async fn find_and_count(&self, options: FindOptions) -> anyhow::Result<(Vec<E>, usize)>;

    async fn count(&self, filter: Option<WhereClause>) -> anyhow::Result<usize>;

    async fn exists(&self, filter: Option<WhereClause>) -> anyhow::Result<bool>;

    /// Builds an unsaved record from a partial JSON object.
    fn create(&self, partial: Value) -> anyhow::Result<E>;

    /// Inserts or replaces by primary key. Assigns a key when absent.
    async fn save(&self, entity: E) -> anyhow::Result<E>;

    async fn save_many(&self, entities: Vec<E>) -> anyhow::Result<Vec<E>>;

    /// Applies `patch` to every matching record. Returns the affected count.
    async fn update(&self, criteria: Criteria, patch: Document) -> anyhow::Result<usize>;

    /// Removes matching records. Returns the affected count.
    async fn delete(&self, criteria: Criteria) -> anyhow::Result<usize>;

    /// Marks matching records deleted. Returns the affected count.
    async fn soft_delete(&self, criteria: Criteria) -> anyhow::Result<usize>;

    /// Clears the soft-delete mark of matching records. Returns the affected count.
    async fn restore(&self, criteria: Criteria) -> anyhow::Result<usize>;

    /// Executes a raw storage command.
    async fn query(&self, raw: &str, params: &[Value]) -> anyhow::Result<Vec<Document>>;

    /// Starts a fluent query over this collection.
    fn create_query_builder(&self, alias: &str) -> Box<dyn QueryBuilder<E>>;
}

/// Fluent query over one collection.
///
/// Builders accumulate a [`SelectStatement`] and execute it on a terminal call.
#[async_trait]
pub trait QueryBuilder<E: Entity>: Send + Sync {
    fn statement(&self) -> &SelectStatement;

    fn statement_mut(&mut self) -> &mut SelectStatement;

    /// Attaches the scoped marker. Only the scoped layer can mint one.
    fn mark(&mut self, marker: ScopeMarker);

    fn marker(&self) -> Option<&ScopeMarker>;

    // --- Terminal calls ---

    async fn get_many(&self) -> anyhow::Result<Vec<E>>;

    async fn get_one(&self) -> anyhow::Result<Option<E>>;

    async fn get_many_and_count(&self) -> anyhow::Result<(Vec<E>, usize)>;

    async fn get_count(&self) -> anyhow::Result<usize>;

    async fn get_exists(&self) -> anyhow::Result<bool>;

    /// Deletes every matching record. Returns the affected count.
    async fn execute_delete(&self) -> anyhow::Result<usize>;
}

/// Accumulated state of a fluent query.
///
/// Scope clauses are kept apart from the caller's where tree and are always
/// ANDed with it, so `or_where` can never widen a query past its scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub alias: String,
    scope: Vec<Predicate>,
    filter: Option<Predicate>,
    pub order: Vec<(String, SortDirection)>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub with_deleted: bool,
}

impl SelectStatement {
    #[must_use]
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..Self::default()
        }
    }

    pub(crate) fn scope_where(&mut self, predicate: Predicate) {
        self.scope.push(predicate);
    }

    /// `filter = filter AND predicate`
    pub fn and_where(&mut self, predicate: Predicate) {
        self.filter = Some(match self.filter.take() {
            None => predicate,
            Some(Predicate::And(mut children)) => {
                children.push(predicate);
                Predicate::And(children)
            }
            Some(current) => Predicate::And(vec![current, predicate]),
        });
    }

    /// `filter = filter OR predicate`
    pub fn or_where(&mut self, predicate: Predicate) {
        self.filter = Some(match self.filter.take() {
            None => predicate,
            Some(Predicate::Or(mut children)) => {
                children.push(predicate);
                Predicate::Or(children)
            }
            Some(current) => Predicate::Or(vec![current, predicate]),
        });
    }

    #[must_use]
    pub fn scope_clauses(&self) -> &[Predicate] {
        &self.scope
    }

    #[must_use]
    pub fn filter(&self) -> Option<&Predicate> {
        self.filter.as_ref()
    }

    /// Full predicate to evaluate: scope clauses AND the where tree.
    #[must_use]
    pub fn predicate(&self) -> Predicate {
        let mut all = self.scope.clone();
        all.extend(self.filter.clone());
        Predicate::And(all)
    }
}
