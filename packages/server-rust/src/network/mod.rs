//! HTTP plumbing that establishes a tenant scope per request.

pub mod config;
pub mod middleware;

pub use config::*;
pub use middleware::{build_http_layers, TenantScopeLayer, TenantScopeService};
