//! Task-scoped tenant context.

pub mod manager;
pub mod store;

pub use manager::{JobPayload, TenantContextManager};
pub use store::{spawn_scoped, ContextKey, ScopeSlots};
