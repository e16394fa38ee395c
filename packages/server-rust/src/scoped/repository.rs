//! Scoped data accessor: the only sanctioned path from business services to
//! tenant-partitioned state.
//!
//! Every operation reads the live tenant scope, builds a [`ScopedFilter`],
//! applies it and only then delegates to the wrapped [`DataAccessor`]. The
//! repository holds no tenant state of its own, so a single instance is
//! shared by every concurrent call chain.

use std::sync::Arc;

use serde_json::Value;
use tenantscope_core::{Conditions, Criteria, Document, Entity, FieldFilter, FindOptions, WhereClause};
use tracing::{trace, warn};

use super::filter::ScopedFilter;
use super::guard::Guardrail;
use super::query_builder::ScopedQueryBuilder;
use crate::context::TenantContextManager;
use crate::error::TenancyError;
use crate::registry::{EntityScope, ScopeRegistry};
use crate::traits::DataAccessor;

/// Tenant-filtering wrapper around one underlying accessor.
pub struct ScopedRepository<E: Entity> {
    inner: Arc<dyn DataAccessor<E>>,
    scope: Arc<EntityScope>,
    contexts: TenantContextManager,
    guard: Guardrail,
}

impl<E: Entity> ScopedRepository<E> {
    /// Wraps `inner`, registering `E` with `registry`.
    ///
    /// # Errors
    ///
    /// [`TenancyError::UnresolvedColumn`] when `E` declares no organization column.
    pub fn new(
        inner: Arc<dyn DataAccessor<E>>,
        registry: &ScopeRegistry,
        guard: Guardrail,
    ) -> Result<Self, TenancyError> {
        Ok(Self {
            inner,
            scope: registry.register::<E>()?,
            contexts: TenantContextManager::new(),
            guard,
        })
    }

    #[must_use]
    pub fn entity_scope(&self) -> &EntityScope {
        &self.scope
    }

    /// Filter for the current scope. Fails before anything is delegated.
    fn filter(&self, operation: &'static str) -> Result<ScopedFilter, TenancyError> {
        let ctx = self.contexts.assert_context(operation)?;
        let filter = ScopedFilter::build(&self.scope, &ctx);
        trace!(
            entity = self.scope.name(),
            operation,
            organization_id = filter.organization_id(),
            workspace_id = filter.workspace_id().unwrap_or(""),
            "scoped operation"
        );
        Ok(filter)
    }

    fn scoped_options(&self, operation: &'static str, mut options: FindOptions) -> Result<FindOptions, TenancyError> {
        let filter = self.filter(operation)?;
        options.filter = Some(filter.apply(options.filter.take()));
        Ok(options)
    }

    // --- Reads ---

    /// # Errors
    ///
    /// [`TenancyError::ContextMissing`] outside a tenant scope,
    /// [`TenancyError::Storage`] if the underlying accessor fails.
    pub async fn find(&self, options: FindOptions) -> Result<Vec<E>, TenancyError> {
        let options = self.scoped_options("find", options)?;
        Ok(self.inner.find(options).await?)
    }

    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn find_one(&self, options: FindOptions) -> Result<Option<E>, TenancyError> {
        let options = self.scoped_options("find_one", options)?;
        Ok(self.inner.find_one(options).await?)
    }

    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn find_one_by(&self, filter: impl Into<WhereClause>) -> Result<Option<E>, TenancyError> {
        let options = self.scoped_options("find_one_by", FindOptions::new().filter(filter))?;
        Ok(self.inner.find_one(options).await?)
    }

    /// Records with the given primary keys that belong to the current tenant.
    ///
    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn find_by_ids(&self, ids: Vec<Value>) -> Result<Vec<E>, TenancyError> {
        let filter = self.filter("find_by_ids")?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let by_id = Conditions::from([(self.scope.primary_key().to_string(), FieldFilter::In(ids))]);
        let options = FindOptions::new().filter(filter.apply(Some(by_id.into())));
        Ok(self.inner.find(options).await?)
    }

    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn find_and_count(&self, options: FindOptions) -> Result<(Vec<E>, usize), TenancyError> {
        let options = self.scoped_options("find_and_count", options)?;
        Ok(self.inner.find_and_count(options).await?)
    }

    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn count(&self, filter: Option<WhereClause>) -> Result<usize, TenancyError> {
        let scoped = self.filter("count")?.apply(filter);
        Ok(self.inner.count(Some(scoped)).await?)
    }

    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn exists(&self, filter: Option<WhereClause>) -> Result<bool, TenancyError> {
        let scoped = self.filter("exists")?.apply(filter);
        Ok(self.inner.exists(Some(scoped)).await?)
    }

    // --- Query builders ---

    /// Query builder seeded with the current tenant's predicates.
    ///
    /// # Errors
    ///
    /// [`TenancyError::ContextMissing`] outside a tenant scope.
    pub fn qb(&self, alias: &str) -> Result<ScopedQueryBuilder<E>, TenancyError> {
        let filter = self.filter("qb")?;
        Ok(ScopedQueryBuilder::seal(
            self.inner.create_query_builder(alias),
            &filter,
            self.guard,
        ))
    }

    /// Same as [`qb`](Self::qb).
    ///
    /// # Errors
    ///
    /// [`TenancyError::ContextMissing`] outside a tenant scope.
    pub fn create_query_builder(&self, alias: &str) -> Result<ScopedQueryBuilder<E>, TenancyError> {
        self.qb(alias)
    }

    // --- Writes ---

    /// Builds an unsaved record. Tenant fields are NOT filled in; the
    /// caller sets them.
    ///
    /// # Errors
    ///
    /// [`TenancyError::ContextMissing`] outside a tenant scope,
    /// [`TenancyError::Storage`] if `partial` does not describe a record.
    pub fn create(&self, partial: Value) -> Result<E, TenancyError> {
        self.contexts.assert_organization_id("create")?;
        Ok(self.inner.create(partial)?)
    }

    /// Persists `entity` as given. Its tenant fields are not compared with
    /// the current scope.
    ///
    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn save(&self, entity: E) -> Result<E, TenancyError> {
        self.contexts.assert_organization_id("save")?;
        Ok(self.inner.save(entity).await?)
    }

    /// # Errors
    ///
    /// See [`save`](Self::save).
    pub async fn save_many(&self, entities: Vec<E>) -> Result<Vec<E>, TenancyError> {
        self.contexts.assert_organization_id("save_many")?;
        Ok(self.inner.save_many(entities).await?)
    }

    /// Applies `patch` to the current tenant's records matching `criteria`.
    /// Identifier criteria are scoped the same way as predicate criteria.
    ///
    /// # Errors
    ///
    /// [`TenancyError::TenantColumnPatched`] when `patch` would move records
    /// to another organization or workspace; otherwise see [`find`](Self::find).
    pub async fn update(&self, criteria: impl Into<Criteria>, patch: Document) -> Result<usize, TenancyError> {
        let filter = self.filter("update")?;
        if let Some(column) = filter.reassigned_column(&patch) {
            warn!(entity = self.scope.name(), column, "update patch rejected: tenant column changed");
            return Err(TenancyError::TenantColumnPatched {
                entity: self.scope.name(),
                column,
            });
        }
        let criteria = filter.scope_criteria(criteria.into(), self.scope.primary_key());
        Ok(self.inner.update(criteria, patch).await?)
    }

    /// Removes the current tenant's records matching `criteria`.
    ///
    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn delete(&self, criteria: impl Into<Criteria>) -> Result<usize, TenancyError> {
        let filter = self.filter("delete")?;
        let criteria = filter.scope_criteria(criteria.into(), self.scope.primary_key());
        Ok(self.inner.delete(criteria).await?)
    }

    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn soft_delete(&self, criteria: impl Into<Criteria>) -> Result<usize, TenancyError> {
        let filter = self.filter("soft_delete")?;
        let criteria = filter.scope_criteria(criteria.into(), self.scope.primary_key());
        Ok(self.inner.soft_delete(criteria).await?)
    }

    /// # Errors
    ///
    /// See [`find`](Self::find).
    pub async fn restore(&self, criteria: impl Into<Criteria>) -> Result<usize, TenancyError> {
        let filter = self.filter("restore")?;
        let criteria = filter.scope_criteria(criteria.into(), self.scope.primary_key());
        Ok(self.inner.restore(criteria).await?)
    }

    // --- Escape hatches ---

    /// Always refuses. Raw storage commands cannot be scoped.
    ///
    /// # Errors
    ///
    /// Always [`TenancyError::BypassForbidden`]; the detail is omitted in production.
    #[allow(clippy::unused_async)]
    pub async fn query(&self, raw: &str, _params: &[Value]) -> Result<Vec<Document>, TenancyError> {
        Err(self.guard.forbid_raw_query(self.scope.name(), raw))
    }

    /// The wrapped, unscoped accessor. For infrastructure and migration code.
    #[must_use]
    pub fn underlying(&self) -> &Arc<dyn DataAccessor<E>> {
        &self.inner
    }
}
