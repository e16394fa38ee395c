//! Tenant-filtering data access layer.

pub mod filter;
pub mod guard;
pub mod query_builder;
pub mod repository;

pub use filter::ScopedFilter;
pub use guard::{Guardrail, ScopeMarker};
pub use query_builder::ScopedQueryBuilder;
pub use repository::ScopedRepository;
