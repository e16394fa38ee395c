use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tenantscope_core::Entity;
use tracing::debug;

use crate::error::TenancyError;
use crate::registry::ScopeRegistry;
use crate::scoped::{Guardrail, ScopedRepository};
use crate::traits::DataAccessor;

// ---------------------------------------------------------------------------
// AccessorRegistry
// ---------------------------------------------------------------------------

/// Hands business services the one shared scoped accessor per entity type.
///
/// Lookup is by concrete entity type (`TypeId`), so callers get a typed
/// `Arc<ScopedRepository<E>>` back. Every repository shares the same
/// [`ScopeRegistry`] and [`Guardrail`].
pub struct AccessorRegistry {
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    /// Entity names in registration order.
    order: RwLock<Vec<&'static str>>,
    scopes: Arc<ScopeRegistry>,
    guard: Guardrail,
}

impl AccessorRegistry {
    #[must_use]
    pub fn new(guard: Guardrail) -> Self {
        Self {
            by_type: DashMap::new(),
            order: RwLock::new(Vec::new()),
            scopes: Arc::new(ScopeRegistry::new()),
            guard,
        }
    }

    /// Wraps `inner` in a scoped repository and makes it available via
    /// [`get`](Self::get). A second registration for the same type replaces
    /// the first.
    ///
    /// # Errors
    ///
    /// [`TenancyError::UnresolvedColumn`] when `E` declares no organization column.
    pub fn register<E: Entity>(
        &self,
        inner: Arc<dyn DataAccessor<E>>,
    ) -> Result<Arc<ScopedRepository<E>>, TenancyError> {
        let repository = Arc::new(ScopedRepository::new(inner, &self.scopes, self.guard)?);
        let name = repository.entity_scope().name();
        let replaced = self
            .by_type
            .insert(TypeId::of::<E>(), repository.clone())
            .is_some();
        if !replaced {
            self.order.write().push(name);
        }
        debug!(entity = name, replaced, "scoped accessor registered");
        Ok(repository)
    }

    /// The scoped accessor for `E`, if one was registered.
    #[must_use]
    pub fn get<E: Entity>(&self) -> Option<Arc<ScopedRepository<E>>> {
        self.by_type
            .get(&TypeId::of::<E>())
            .and_then(|entry| entry.value().clone().downcast::<ScopedRepository<E>>().ok())
    }

    /// Registered entity names in registration order.
    #[must_use]
    pub fn entity_names(&self) -> Vec<&'static str> {
        self.order.read().clone()
    }

    #[must_use]
    pub fn scopes(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    #[must_use]
    pub fn guardrail(&self) -> Guardrail {
        self.guard
    }
}

impl Default for AccessorRegistry {
    fn default() -> Self {
        Self::new(Guardrail::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use tenantscope_core::{EntitySchema, FieldDef, FindOptions, TenantContext};

    use super::*;
    use crate::context::TenantContextManager;
    use crate::storage::MemoryCollection;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Invoice {
        id: String,
        org_id: String,
    }

    impl Entity for Invoice {
        fn schema() -> EntitySchema {
            EntitySchema::new("invoices")
                .field(FieldDef::plain("id"))
                .field(FieldDef::plain("org_id"))
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Customer {
        id: String,
        organization_id: String,
    }

    impl Entity for Customer {
        fn schema() -> EntitySchema {
            EntitySchema::new("customers")
                .field(FieldDef::plain("id"))
                .field(FieldDef::plain("organization_id"))
        }
    }

    #[test]
    fn register_and_get_by_type() {
        let registry = AccessorRegistry::default();
        registry
            .register::<Invoice>(Arc::new(MemoryCollection::new()))
            .unwrap();

        let invoices = registry.get::<Invoice>().unwrap();
        assert_eq!(invoices.entity_scope().organization_column(), "org_id");
        assert!(registry.get::<Customer>().is_none());
    }

    #[test]
    fn get_returns_the_shared_instance() {
        let registry = AccessorRegistry::default();
        let registered = registry
            .register::<Customer>(Arc::new(MemoryCollection::new()))
            .unwrap();
        let fetched = registry.get::<Customer>().unwrap();
        assert!(Arc::ptr_eq(&registered, &fetched));
    }

    #[test]
    fn names_follow_registration_order() {
        let registry = AccessorRegistry::default();
        registry
            .register::<Invoice>(Arc::new(MemoryCollection::new()))
            .unwrap();
        registry
            .register::<Customer>(Arc::new(MemoryCollection::new()))
            .unwrap();
        registry
            .register::<Invoice>(Arc::new(MemoryCollection::new()))
            .unwrap();

        assert_eq!(registry.entity_names(), vec!["invoices", "customers"]);
        assert_eq!(registry.scopes().len(), 2);
    }

    #[tokio::test]
    async fn registered_accessor_is_scoped() {
        let raw = Arc::new(MemoryCollection::<Customer>::new());
        raw.save_many(vec![
            Customer {
                id: "c1".to_string(),
                organization_id: "org-1".to_string(),
            },
            Customer {
                id: "c2".to_string(),
                organization_id: "org-2".to_string(),
            },
        ])
        .await
        .unwrap();

        let registry = AccessorRegistry::default();
        registry.register::<Customer>(raw).unwrap();
        let customers = registry.get::<Customer>().unwrap();

        let found = TenantContextManager::new()
            .run_with_tenant(TenantContext::new("org-2"), || async move {
                customers.find(FindOptions::new()).await
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c2");
    }
}
