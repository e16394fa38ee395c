//! Scoped query builder: a decorator over an underlying [`QueryBuilder`]
//! that runs the guardrail before every terminal call.

use serde_json::Value;
use tenantscope_core::{Entity, FieldFilter, Predicate, SortDirection};

use super::filter::ScopedFilter;
use super::guard::{Guardrail, ScopeMarker};
use crate::error::TenancyError;
use crate::traits::{QueryBuilder, SelectStatement};

/// Fluent query carrying the tenant predicates of the scope it was built in.
///
/// The predicates are applied before the builder is handed out and are not
/// re-read afterwards: a builder built for one tenant keeps querying that
/// tenant even if it outlives the scope.
pub struct ScopedQueryBuilder<E: Entity> {
    inner: Box<dyn QueryBuilder<E>>,
    guard: Guardrail,
}

impl<E: Entity> ScopedQueryBuilder<E> {
    pub(crate) fn seal(mut inner: Box<dyn QueryBuilder<E>>, filter: &ScopedFilter, guard: Guardrail) -> Self {
        let statement = inner.statement_mut();
        for predicate in filter.predicates() {
            statement.scope_where(predicate);
        }
        inner.mark(ScopeMarker::new(
            filter.organization_column(),
            filter.organization_id(),
        ));
        Self { inner, guard }
    }

    /// Wraps a builder that did not come from a scoped repository.
    ///
    /// The result carries no marker, so while the guardrail is enabled every
    /// terminal call fails with [`TenancyError::ScopingBypassDetected`].
    #[must_use]
    pub fn from_unscoped(inner: Box<dyn QueryBuilder<E>>, guard: Guardrail) -> Self {
        Self { inner, guard }
    }

    // --- Fluent API ---

    #[must_use]
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.inner.statement_mut().and_where(predicate);
        self
    }

    #[must_use]
    pub fn or_where(mut self, predicate: Predicate) -> Self {
        self.inner.statement_mut().or_where(predicate);
        self
    }

    /// Shorthand for `and_where(column = value)`.
    #[must_use]
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(Predicate::field(column, FieldFilter::Eq(value.into())))
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.inner.statement_mut().order.push((column.into(), direction));
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.inner.statement_mut().skip = Some(skip);
        self
    }

    #[must_use]
    pub fn take(mut self, take: usize) -> Self {
        self.inner.statement_mut().take = Some(take);
        self
    }

    #[must_use]
    pub fn with_deleted(mut self) -> Self {
        self.inner.statement_mut().with_deleted = true;
        self
    }

    // --- Inspection ---

    /// The statement as it would execute now.
    #[must_use]
    pub fn snapshot(&self) -> &SelectStatement {
        self.inner.statement()
    }

    #[must_use]
    pub fn marker(&self) -> Option<&ScopeMarker> {
        self.inner.marker()
    }

    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.inner.marker().is_some()
    }

    // --- Terminal calls ---

    /// # Errors
    ///
    /// [`TenancyError::ScopingBypassDetected`] for an unscoped builder,
    /// [`TenancyError::Storage`] if the query fails.
    pub async fn get_many(&self) -> Result<Vec<E>, TenancyError> {
        self.guard.assert_scoped(self.inner.as_ref())?;
        Ok(self.inner.get_many().await?)
    }

    /// # Errors
    ///
    /// See [`get_many`](Self::get_many).
    pub async fn get_one(&self) -> Result<Option<E>, TenancyError> {
        self.guard.assert_scoped(self.inner.as_ref())?;
        Ok(self.inner.get_one().await?)
    }

    /// # Errors
    ///
    /// See [`get_many`](Self::get_many).
    pub async fn get_many_and_count(&self) -> Result<(Vec<E>, usize), TenancyError> {
        self.guard.assert_scoped(self.inner.as_ref())?;
        Ok(self.inner.get_many_and_count().await?)
    }

    /// # Errors
    ///
    /// See [`get_many`](Self::get_many).
    pub async fn get_count(&self) -> Result<usize, TenancyError> {
        self.guard.assert_scoped(self.inner.as_ref())?;
        Ok(self.inner.get_count().await?)
    }

    /// # Errors
    ///
    /// See [`get_many`](Self::get_many).
    pub async fn get_exists(&self) -> Result<bool, TenancyError> {
        self.guard.assert_scoped(self.inner.as_ref())?;
        Ok(self.inner.get_exists().await?)
    }

    /// # Errors
    ///
    /// See [`get_many`](Self::get_many).
    pub async fn execute_delete(&self) -> Result<usize, TenancyError> {
        self.guard.assert_scoped(self.inner.as_ref())?;
        Ok(self.inner.execute_delete().await?)
    }
}
