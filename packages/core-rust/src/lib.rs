//! Tenantscope core: tenant context, entity scope declarations and filter types.

pub mod context;
pub mod filter;
pub mod schema;

pub use context::{Principal, TenantContext};
pub use filter::{
    Conditions, Criteria, Document, FieldFilter, FindOptions, Predicate, SortDirection,
    WhereClause,
};
pub use schema::{Entity, EntitySchema, FieldDef};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
