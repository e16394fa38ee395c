//! Call-chain-scoped key/value store backed by a tokio task-local.
//!
//! A scope is entered with [`scope`] and lasts exactly as long as the
//! wrapped future. Everything the future awaits, including `join!`/`select!`
//! branches, reads the same slots. Tasks started with [`spawn_scoped`] get a
//! copy of the slots; plain `tokio::spawn` starts with no scope at all.
//!
//! Slots are written only at scope-establishment points. The organization
//! slot is write-once per scope until [`clear`] runs.

use std::cell::RefCell;
use std::future::Future;

use tenantscope_core::TenantContext;
use tokio::task::JoinHandle;

use crate::error::TenancyError;

tokio::task_local! {
    static SCOPE: RefCell<ScopeSlots>;
}

/// Keys held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    OrganizationId,
    WorkspaceId,
    RequestId,
}

/// Values of one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSlots {
    pub organization_id: Option<String>,
    pub workspace_id: Option<String>,
    pub request_id: Option<String>,
}

impl ScopeSlots {
    #[must_use]
    pub fn get(&self, key: ContextKey) -> Option<&String> {
        match key {
            ContextKey::OrganizationId => self.organization_id.as_ref(),
            ContextKey::WorkspaceId => self.workspace_id.as_ref(),
            ContextKey::RequestId => self.request_id.as_ref(),
        }
    }

    fn slot_mut(&mut self, key: ContextKey) -> &mut Option<String> {
        match key {
            ContextKey::OrganizationId => &mut self.organization_id,
            ContextKey::WorkspaceId => &mut self.workspace_id,
            ContextKey::RequestId => &mut self.request_id,
        }
    }

    /// The slots as a [`TenantContext`], if an organization is set.
    #[must_use]
    pub fn tenant_context(&self) -> Option<TenantContext> {
        Some(TenantContext {
            organization_id: self.organization_id.clone()?,
            workspace_id: self.workspace_id.clone(),
            request_id: self.request_id.clone(),
        })
    }
}

impl From<TenantContext> for ScopeSlots {
    fn from(ctx: TenantContext) -> Self {
        Self {
            organization_id: Some(ctx.organization_id),
            workspace_id: ctx.workspace_id,
            request_id: ctx.request_id,
        }
    }
}

/// Runs `fut` inside a fresh scope holding `slots`.
pub async fn scope<F: Future>(slots: ScopeSlots, fut: F) -> F::Output {
    SCOPE.scope(RefCell::new(slots), fut).await
}

/// Runs the synchronous closure `f` inside a fresh scope holding `slots`.
pub fn sync_scope<R>(slots: ScopeSlots, f: impl FnOnce() -> R) -> R {
    SCOPE.sync_scope(RefCell::new(slots), f)
}

/// Whether the current task runs inside a scope.
#[must_use]
pub fn is_active() -> bool {
    SCOPE.try_with(|_| ()).is_ok()
}

/// Current value of `key`, or `None` outside a scope.
#[must_use]
pub fn get(key: ContextKey) -> Option<String> {
    SCOPE
        .try_with(|cell| cell.borrow().get(key).cloned())
        .ok()
        .flatten()
}

/// Copy of all slots of the current scope.
#[must_use]
pub fn snapshot() -> Option<ScopeSlots> {
    SCOPE.try_with(|cell| cell.borrow().clone()).ok()
}

/// Writes `key` in the current scope.
///
/// # Errors
///
/// [`TenancyError::NoActiveScope`] outside a scope;
/// [`TenancyError::OrganizationReassigned`] when the scope already holds a
/// different organization id.
pub fn set(key: ContextKey, value: impl Into<String>) -> Result<(), TenancyError> {
    let value = value.into();
    SCOPE
        .try_with(|cell| {
            let mut slots = cell.borrow_mut();
            if key == ContextKey::OrganizationId {
                if let Some(current) = &slots.organization_id {
                    if *current != value {
                        return Err(TenancyError::OrganizationReassigned);
                    }
                }
            }
            *slots.slot_mut(key) = Some(value);
            Ok(())
        })
        .map_err(|_| TenancyError::NoActiveScope)?
}

/// Empties every slot of the current scope.
///
/// # Errors
///
/// [`TenancyError::NoActiveScope`] outside a scope.
pub fn clear() -> Result<(), TenancyError> {
    SCOPE
        .try_with(|cell| *cell.borrow_mut() = ScopeSlots::default())
        .map_err(|_| TenancyError::NoActiveScope)
}

/// Spawns `fut` on the runtime with a copy of the current scope.
pub fn spawn_scoped<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match snapshot() {
        Some(slots) => tokio::spawn(scope(slots, fut)),
        None => tokio::spawn(fut),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn org(id: &str) -> ScopeSlots {
        ScopeSlots::from(TenantContext::new(id))
    }

    #[tokio::test]
    async fn nothing_is_visible_outside_a_scope() {
        assert!(!is_active());
        assert!(get(ContextKey::OrganizationId).is_none());
        assert!(snapshot().is_none());
        assert!(matches!(
            set(ContextKey::RequestId, "r"),
            Err(TenancyError::NoActiveScope)
        ));
        assert!(matches!(clear(), Err(TenancyError::NoActiveScope)));
    }

    #[tokio::test]
    async fn scope_survives_suspension_points() {
        let seen = scope(org("org-1"), async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            tokio::task::yield_now().await;
            async { get(ContextKey::OrganizationId) }.await
        })
        .await;
        assert_eq!(seen.as_deref(), Some("org-1"));
        assert!(!is_active());
    }

    #[tokio::test]
    async fn organization_is_write_once() {
        scope(ScopeSlots::default(), async {
            set(ContextKey::OrganizationId, "org-1").unwrap();
            // Same value is accepted.
            set(ContextKey::OrganizationId, "org-1").unwrap();
            assert!(matches!(
                set(ContextKey::OrganizationId, "org-2"),
                Err(TenancyError::OrganizationReassigned)
            ));
            clear().unwrap();
            set(ContextKey::OrganizationId, "org-2").unwrap();
            assert_eq!(get(ContextKey::OrganizationId).as_deref(), Some("org-2"));
        })
        .await;
    }

    #[tokio::test]
    async fn spawned_child_gets_a_copy() {
        scope(org("org-1"), async {
            let child = spawn_scoped(async {
                set(ContextKey::WorkspaceId, "ws-child").unwrap();
                get(ContextKey::OrganizationId)
            });
            assert_eq!(child.await.unwrap().as_deref(), Some("org-1"));
            assert!(get(ContextKey::WorkspaceId).is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn plain_spawn_does_not_inherit() {
        scope(org("org-1"), async {
            let seen = tokio::spawn(async { get(ContextKey::OrganizationId) })
                .await
                .unwrap();
            assert!(seen.is_none());
        })
        .await;
    }

    #[test]
    fn sync_scope_is_visible_to_closure() {
        let seen = sync_scope(org("org-7"), || get(ContextKey::OrganizationId));
        assert_eq!(seen.as_deref(), Some("org-7"));
    }

    #[test]
    fn slots_convert_to_context_only_with_organization() {
        assert!(ScopeSlots::default().tenant_context().is_none());
        let ctx = org("org-1").tenant_context().unwrap();
        assert_eq!(ctx.organization_id, "org-1");
    }
}
