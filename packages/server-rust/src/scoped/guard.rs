//! Bypass guardrail.
//!
//! Development, test and CI safety net: fails fast when a query builder
//! reaches a terminal call without the marker the scoped layer attaches at
//! construction. Disabled in production unless forced on through
//! [`TenancyConfig::guardrail`](crate::config::TenancyConfig::guardrail).

use serde_json::Value;
use tenantscope_core::Entity;
use tracing::error;

use crate::config::{Environment, TenancyConfig};
use crate::context::store::{self, ContextKey};
use crate::error::TenancyError;
use crate::traits::QueryBuilder;

/// Proof that a builder was seeded with tenant predicates.
///
/// Fields are private and the constructor is crate-internal, so code
/// outside this crate cannot mint one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeMarker {
    organization_column: &'static str,
    organization_id: String,
}

impl ScopeMarker {
    pub(crate) fn new(organization_column: &'static str, organization_id: impl Into<String>) -> Self {
        Self {
            organization_column,
            organization_id: organization_id.into(),
        }
    }

    #[must_use]
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    #[must_use]
    pub fn organization_column(&self) -> &'static str {
        self.organization_column
    }
}

/// Runtime checks guarding the scoped layer's escape routes.
#[derive(Debug, Clone, Copy)]
pub struct Guardrail {
    enabled: bool,
    environment: Environment,
}

impl Guardrail {
    #[must_use]
    pub fn new(config: &TenancyConfig) -> Self {
        Self {
            enabled: config.guardrail_enabled(),
            environment: config.environment,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Verifies `builder` carries a marker and that its scope clauses still
    /// pin the marked organization. No-op when disabled.
    ///
    /// # Errors
    ///
    /// [`TenancyError::ScopingBypassDetected`] when either check fails.
    pub fn assert_scoped<E: Entity>(&self, builder: &dyn QueryBuilder<E>) -> Result<(), TenancyError> {
        if !self.enabled {
            return Ok(());
        }
        let statement = builder.statement();
        if let Some(marker) = builder.marker() {
            let pinned = Value::String(marker.organization_id.clone());
            if statement
                .scope_clauses()
                .iter()
                .any(|p| p.pins(marker.organization_column, &pinned))
            {
                return Ok(());
            }
        }

        let organization_id = builder
            .marker()
            .map(|m| m.organization_id.clone())
            .or_else(|| store::get(ContextKey::OrganizationId));
        error!(
            alias = %statement.alias,
            organization_id = organization_id.as_deref().unwrap_or("unknown"),
            "unscoped query builder reached a terminal call"
        );
        Err(TenancyError::ScopingBypassDetected {
            organization_id,
            alias: statement.alias.clone(),
        })
    }

    /// Error returned for every raw query through the scoped layer.
    ///
    /// Production gets the terse form; elsewhere the message names the
    /// statement and the sanctioned alternatives.
    #[must_use]
    pub fn forbid_raw_query(&self, entity: &'static str, raw: &str) -> TenancyError {
        error!(entity, "raw query attempted through scoped data layer");
        if self.environment.is_production() {
            return TenancyError::BypassForbidden { detail: None };
        }
        let excerpt: String = raw.chars().take(80).collect();
        TenancyError::BypassForbidden {
            detail: Some(format!(
                "`{excerpt}` on `{entity}` would run without tenant filters; \
                 use qb()/create_query_builder() or a find method instead"
            )),
        }
    }
}

impl Default for Guardrail {
    fn default() -> Self {
        Self::new(&TenancyConfig::default())
    }
}
