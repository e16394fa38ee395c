//! Tenantscope server: task-local tenant scope, scoped data access and the
//! bypass guardrail.
//!
//! Business services get their data through [`ScopedRepository`] instances
//! (usually handed out by [`AccessorRegistry`]). Every operation reads the
//! tenant scope of the current task, established per request by
//! [`TenantScopeLayer`] or per job by [`TenantContextManager::run_job_with_tenant`].

pub mod accessors;
pub mod config;
pub mod context;
pub mod error;
pub mod network;
pub mod registry;
pub mod scoped;
pub mod storage;
pub mod telemetry;
pub mod traits;

pub use accessors::AccessorRegistry;
pub use config::{Environment, TenancyConfig};
pub use context::{spawn_scoped, JobPayload, TenantContextManager};
pub use error::TenancyError;
pub use network::{build_http_layers, ScopeLayerConfig, TenantScopeLayer};
pub use registry::{EntityScope, ScopeRegistry};
pub use scoped::{Guardrail, ScopedQueryBuilder, ScopedRepository};
pub use storage::MemoryCollection;
pub use traits::{DataAccessor, QueryBuilder, SelectStatement};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
