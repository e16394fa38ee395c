//! Error taxonomy of the tenant-isolation layer.
//!
//! Every variant is fatal to the operation that raised it. Nothing in this
//! crate catches one of these and substitutes a default.

/// Errors raised by the tenant context manager and the scoped data layer.
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    /// No organization id in scope when one is required.
    #[error(
        "no organization id in tenant scope for `{operation}`; verify the caller is \
         authenticated and that the tenant scope layer (or run_with_tenant) wraps this call"
    )]
    ContextMissing { operation: &'static str },

    /// Scope establishment called without the mandatory identifier.
    #[error("invalid tenant scope: {reason}")]
    Validation { reason: String },

    /// A query builder reached a terminal call without the scoped marker.
    #[error(
        "unscoped query builder `{alias}` executed (organization: {}); obtain query \
         builders from ScopedRepository::qb or create_query_builder only",
        .organization_id.as_deref().unwrap_or("unknown")
    )]
    ScopingBypassDetected {
        organization_id: Option<String>,
        alias: String,
    },

    /// The raw-query escape hatch was invoked.
    #[error("raw queries are forbidden through the scoped data layer{}", suffix(.detail))]
    BypassForbidden { detail: Option<String> },

    /// An entity declaration lacks a field the scoped layer requires.
    #[error("entity `{entity}` declares no {field} column")]
    UnresolvedColumn {
        entity: &'static str,
        field: &'static str,
    },

    /// An update patch would move records out of the caller's tenant.
    #[error("update of `{entity}` may not change tenant column `{column}`")]
    TenantColumnPatched {
        entity: &'static str,
        column: &'static str,
    },

    /// A low-level context hook was called outside any scope.
    #[error("no tenant scope is active on this task")]
    NoActiveScope,

    /// An attempt to replace the organization id of a live scope.
    #[error("organization id of an active scope cannot be changed")]
    OrganizationReassigned,

    /// Failure reported by the wrapped accessor.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

fn suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl TenancyError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}
