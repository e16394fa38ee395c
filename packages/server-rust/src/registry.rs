//! Scope capability registry.
//!
//! Maps entity type names to their static scope declaration and the
//! resolved storage columns for the organization and workspace identifiers.
//! Populated at startup; read-only afterwards.

use std::sync::Arc;

use dashmap::DashMap;
use tenantscope_core::schema::{
    ORGANIZATION_COLUMN_CONVENTIONS, ORGANIZATION_PROPERTY, WORKSPACE_COLUMN_CONVENTIONS,
    WORKSPACE_PROPERTY,
};
use tenantscope_core::{Entity, EntitySchema};

use crate::error::TenancyError;

// ---------------------------------------------------------------------------
// EntityScope
// ---------------------------------------------------------------------------

/// Resolved scope declaration of one entity type.
#[derive(Debug, Clone)]
pub struct EntityScope {
    schema: EntitySchema,
    organization_column: &'static str,
    workspace_column: Option<&'static str>,
}

impl EntityScope {
    /// Resolves the scope columns of `schema`.
    ///
    /// # Errors
    ///
    /// [`TenancyError::UnresolvedColumn`] when no organization column can be found.
    pub fn resolve(schema: EntitySchema) -> Result<Self, TenancyError> {
        let organization_column = schema
            .resolve_column(ORGANIZATION_PROPERTY, ORGANIZATION_COLUMN_CONVENTIONS)
            .ok_or(TenancyError::UnresolvedColumn {
                entity: schema.name,
                field: "organization",
            })?;

        let workspace_column = if schema.workspace_scoped {
            let column = schema.resolve_column(WORKSPACE_PROPERTY, WORKSPACE_COLUMN_CONVENTIONS);
            if column.is_none() {
                tracing::warn!(
                    entity = schema.name,
                    "workspace-scoped entity declares no workspace column; \
                     workspace filter will not be applied"
                );
            }
            column
        } else {
            None
        };

        Ok(Self {
            schema,
            organization_column,
            workspace_column,
        })
    }

    /// Resolves the scope columns of `E`.
    ///
    /// # Errors
    ///
    /// [`TenancyError::UnresolvedColumn`] when `E` has no organization column.
    pub fn of<E: Entity>() -> Result<Self, TenancyError> {
        Self::resolve(E::schema())
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    #[must_use]
    pub fn is_workspace_scoped(&self) -> bool {
        self.schema.workspace_scoped
    }

    #[must_use]
    pub fn organization_column(&self) -> &'static str {
        self.organization_column
    }

    /// `None` for workspace-agnostic types and for workspace-scoped types
    /// whose workspace column could not be resolved.
    #[must_use]
    pub fn workspace_column(&self) -> Option<&'static str> {
        self.workspace_column
    }

    #[must_use]
    pub fn primary_key(&self) -> &'static str {
        self.schema.primary_key
    }
}

// ---------------------------------------------------------------------------
// ScopeRegistry
// ---------------------------------------------------------------------------

/// Static capability table: entity name -> resolved scope declaration.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    entries: DashMap<&'static str, Arc<EntityScope>>,
}

impl ScopeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E`, returning the existing entry if already present.
    ///
    /// # Errors
    ///
    /// [`TenancyError::UnresolvedColumn`] when `E` has no organization column.
    pub fn register<E: Entity>(&self) -> Result<Arc<EntityScope>, TenancyError> {
        self.register_schema(E::schema())
    }

    /// Registers a schema, returning the existing entry if already present.
    ///
    /// # Errors
    ///
    /// [`TenancyError::UnresolvedColumn`] when the schema has no organization column.
    pub fn register_schema(&self, schema: EntitySchema) -> Result<Arc<EntityScope>, TenancyError> {
        if let Some(existing) = self.entries.get(schema.name) {
            return Ok(existing.value().clone());
        }
        let scope = Arc::new(EntityScope::resolve(schema)?);
        Ok(self
            .entries
            .entry(scope.name())
            .or_insert(scope)
            .value()
            .clone())
    }

    #[must_use]
    pub fn get(&self, entity: &str) -> Option<Arc<EntityScope>> {
        self.entries.get(entity).map(|e| e.value().clone())
    }

    /// Unknown types are not workspace-scoped.
    #[must_use]
    pub fn is_workspace_scoped(&self, entity: &str) -> bool {
        self.get(entity).is_some_and(|s| s.is_workspace_scoped())
    }

    /// # Errors
    ///
    /// [`TenancyError::UnresolvedColumn`] for an unregistered type.
    pub fn resolve_organization_column(&self, entity: &'static str) -> Result<&'static str, TenancyError> {
        self.get(entity)
            .map(|s| s.organization_column())
            .ok_or(TenancyError::UnresolvedColumn {
                entity,
                field: "organization",
            })
    }

    #[must_use]
    pub fn resolve_workspace_column(&self, entity: &str) -> Option<&'static str> {
        self.get(entity).and_then(|s| s.workspace_column())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
