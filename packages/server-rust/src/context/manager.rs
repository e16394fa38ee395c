//! Typed access to the current tenant scope and the two ways of entering one.

use std::future::Future;

use serde::Deserialize;
use tenantscope_core::TenantContext;
use tracing::{debug, Instrument};

use super::store::{self, ContextKey, ScopeSlots};
use crate::error::TenancyError;

/// Unit of work handed to a batch job or script runner.
///
/// Identifiers come from trusted infrastructure state (the job queue row,
/// the scheduler), never from user input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Typed accessors over the context store.
///
/// Stateless: every call reads the live scope of the current task, so one
/// instance can be shared by any number of concurrent call chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantContextManager;

impl TenantContextManager {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn organization_id(&self) -> Option<String> {
        store::get(ContextKey::OrganizationId)
    }

    #[must_use]
    pub fn workspace_id(&self) -> Option<String> {
        store::get(ContextKey::WorkspaceId)
    }

    #[must_use]
    pub fn request_id(&self) -> Option<String> {
        store::get(ContextKey::RequestId)
    }

    /// The whole scope, if it carries an organization.
    #[must_use]
    pub fn current(&self) -> Option<TenantContext> {
        store::snapshot()?.tenant_context()
    }

    /// Returns the organization id of the current scope.
    ///
    /// # Errors
    ///
    /// [`TenancyError::ContextMissing`] when no organization is in scope.
    pub fn assert_organization_id(&self, operation: &'static str) -> Result<String, TenancyError> {
        self.organization_id()
            .filter(|id| !id.trim().is_empty())
            .ok_or(TenancyError::ContextMissing { operation })
    }

    /// Like [`assert_organization_id`](Self::assert_organization_id) but returns the full context.
    ///
    /// # Errors
    ///
    /// [`TenancyError::ContextMissing`] when no organization is in scope.
    pub fn assert_context(&self, operation: &'static str) -> Result<TenantContext, TenancyError> {
        self.current()
            .filter(|ctx| !ctx.is_anonymous())
            .ok_or(TenancyError::ContextMissing { operation })
    }

    /// Runs `f` to completion inside a fresh scope for `tenant`.
    ///
    /// `f` is not invoked when validation fails.
    ///
    /// # Errors
    ///
    /// [`TenancyError::Validation`] when the organization id is blank.
    pub async fn run_with_tenant<F, Fut, T>(&self, tenant: TenantContext, f: F) -> Result<T, TenancyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if tenant.is_anonymous() {
            return Err(TenancyError::validation("organization id is required"));
        }
        let span = tracing::debug_span!(
            "tenant_scope",
            organization_id = %tenant.organization_id,
            request_id = tenant.request_id.as_deref().unwrap_or(""),
        );
        debug!(parent: &span, "entering tenant scope");
        // `f` itself runs inside the scope, so its synchronous prologue sees it too.
        let work = async move { f().await }.instrument(span);
        Ok(store::scope(ScopeSlots::from(tenant), work).await)
    }

    /// Runs a batch job inside a scope built from its payload.
    ///
    /// The request id is `job:<job_id>`, or a fresh UUID when the payload has none.
    ///
    /// # Errors
    ///
    /// [`TenancyError::Validation`] when the payload has no organization id.
    pub async fn run_job_with_tenant<F, Fut, T>(&self, payload: JobPayload, f: F) -> Result<T, TenancyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let organization_id = payload
            .organization_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| TenancyError::validation("job payload carries no organization id"))?;
        let request_id = payload.job_id.map_or_else(
            || uuid::Uuid::new_v4().to_string(),
            |job_id| format!("job:{job_id}"),
        );
        let tenant = TenantContext {
            organization_id,
            workspace_id: payload.workspace_id,
            request_id: Some(request_id),
        };
        self.run_with_tenant(tenant, f).await
    }

    /// Runs `fut` inside an empty scope. Interceptor hook only.
    pub async fn init_context<F: Future>(&self, fut: F) -> F::Output {
        store::scope(ScopeSlots::default(), fut).await
    }

    /// Writes `ctx` into the current scope. Interceptor hook only.
    ///
    /// # Errors
    ///
    /// [`TenancyError::Validation`] for a blank organization id,
    /// [`TenancyError::NoActiveScope`] outside [`init_context`](Self::init_context),
    /// [`TenancyError::OrganizationReassigned`] if the scope already belongs to another organization.
    pub fn set_context(&self, ctx: TenantContext) -> Result<(), TenancyError> {
        if ctx.is_anonymous() {
            return Err(TenancyError::validation("organization id is required"));
        }
        store::set(ContextKey::OrganizationId, ctx.organization_id)?;
        if let Some(workspace_id) = ctx.workspace_id {
            store::set(ContextKey::WorkspaceId, workspace_id)?;
        }
        if let Some(request_id) = ctx.request_id {
            store::set(ContextKey::RequestId, request_id)?;
        }
        Ok(())
    }

    /// Empties the current scope. Interceptor hook only.
    ///
    /// # Errors
    ///
    /// [`TenancyError::NoActiveScope`] outside a scope.
    pub fn clear(&self) -> Result<(), TenancyError> {
        store::clear()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn accessors_are_none_outside_scope() {
        let manager = TenantContextManager::new();
        assert!(manager.organization_id().is_none());
        assert!(manager.workspace_id().is_none());
        assert!(manager.request_id().is_none());
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn assert_organization_id_fails_outside_scope() {
        let manager = TenantContextManager::new();
        let err = manager.assert_organization_id("find").unwrap_err();
        assert!(matches!(err, TenancyError::ContextMissing { operation: "find" }));
    }

    #[tokio::test]
    async fn run_with_tenant_exposes_all_identifiers() {
        let manager = TenantContextManager::new();
        let tenant = TenantContext::new("org-1")
            .with_workspace("ws-1")
            .with_request_id("req-1");
        let seen = manager
            .run_with_tenant(tenant.clone(), || async move {
                tokio::task::yield_now().await;
                manager.current()
            })
            .await
            .unwrap();
        assert_eq!(seen, Some(tenant));
        assert!(manager.organization_id().is_none());
    }

    #[tokio::test]
    async fn closure_prologue_runs_inside_scope() {
        let manager = TenantContextManager::new();
        let seen = manager
            .run_with_tenant(TenantContext::new("org-b"), || {
                let sync_read = manager.organization_id();
                async move { sync_read }
            })
            .await
            .unwrap();
        assert_eq!(seen.as_deref(), Some("org-b"));
    }

    #[tokio::test]
    async fn nested_scope_replaces_outer_tenant_for_whole_closure() {
        let manager = TenantContextManager::new();
        let (inner, outer_after) = manager
            .run_with_tenant(TenantContext::new("org-a"), || async move {
                let inner = manager
                    .run_with_tenant(TenantContext::new("org-b"), || {
                        let sync_read = manager.organization_id();
                        async move { (sync_read, manager.organization_id()) }
                    })
                    .await
                    .unwrap();
                (inner, manager.organization_id())
            })
            .await
            .unwrap();
        assert_eq!(inner.0.as_deref(), Some("org-b"));
        assert_eq!(inner.1.as_deref(), Some("org-b"));
        assert_eq!(outer_after.as_deref(), Some("org-a"));
    }

    #[tokio::test]
    async fn blank_organization_is_rejected_before_work_runs() {
        let manager = TenantContextManager::new();
        let probe = Arc::new(AtomicBool::new(false));
        let touched = probe.clone();
        let result = manager
            .run_with_tenant(TenantContext::new(""), || async move {
                touched.store(true, Ordering::SeqCst);
            })
            .await;
        assert!(matches!(result, Err(TenancyError::Validation { .. })));
        assert!(!probe.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_chains_never_see_each_other() {
        let manager = TenantContextManager::new();
        let chain = |org: &'static str| async move {
            manager
                .run_with_tenant(TenantContext::new(org), || async move {
                    let mut seen = Vec::new();
                    for _ in 0..50 {
                        seen.push(manager.organization_id());
                        tokio::task::yield_now().await;
                    }
                    seen
                })
                .await
                .unwrap()
        };
        let (a, b) = tokio::join!(chain("org-a"), chain("org-b"));
        assert!(a.iter().all(|id| id.as_deref() == Some("org-a")));
        assert!(b.iter().all(|id| id.as_deref() == Some("org-b")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn isolation_holds_across_worker_threads() {
        let manager = TenantContextManager::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                tokio::spawn(async move {
                    let org = format!("org-{i}");
                    let expected = org.clone();
                    manager
                        .run_with_tenant(TenantContext::new(org), || async move {
                            for _ in 0..20 {
                                tokio::task::yield_now().await;
                                assert_eq!(manager.organization_id().as_deref(), Some(expected.as_str()));
                            }
                        })
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn job_payload_sets_job_request_id() {
        let manager = TenantContextManager::new();
        let payload: JobPayload = serde_json::from_value(serde_json::json!({
            "organizationId": "org-1",
            "workspaceId": "ws-2",
            "jobId": "nightly-42"
        }))
        .unwrap();
        let ctx = manager
            .run_job_with_tenant(payload, || async move { manager.current() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.organization_id, "org-1");
        assert_eq!(ctx.workspace_id.as_deref(), Some("ws-2"));
        assert_eq!(ctx.request_id.as_deref(), Some("job:nightly-42"));
    }

    #[tokio::test]
    async fn job_without_id_gets_generated_request_id() {
        let manager = TenantContextManager::new();
        let payload = JobPayload {
            organization_id: Some("org-1".to_string()),
            ..JobPayload::default()
        };
        let request_id = manager
            .run_job_with_tenant(payload, || async move { manager.request_id() })
            .await
            .unwrap()
            .unwrap();
        assert!(uuid::Uuid::parse_str(&request_id).is_ok());
    }

    #[tokio::test]
    async fn job_without_organization_is_rejected() {
        let manager = TenantContextManager::new();
        let probe = Arc::new(AtomicBool::new(false));
        let touched = probe.clone();
        let result = manager
            .run_job_with_tenant(JobPayload::default(), || async move {
                touched.store(true, Ordering::SeqCst);
            })
            .await;
        assert!(matches!(result, Err(TenancyError::Validation { .. })));
        assert!(!probe.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn interceptor_hooks_set_and_clear() {
        let manager = TenantContextManager::new();
        manager
            .init_context(async {
                assert!(manager.organization_id().is_none());
                manager
                    .set_context(TenantContext::new("org-1").with_request_id("req-9"))
                    .unwrap();
                assert_eq!(manager.organization_id().as_deref(), Some("org-1"));
                assert_eq!(manager.request_id().as_deref(), Some("req-9"));
                manager.clear().unwrap();
                assert!(manager.organization_id().is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn set_context_outside_scope_fails() {
        let manager = TenantContextManager::new();
        let err = manager.set_context(TenantContext::new("org-1")).unwrap_err();
        assert!(matches!(err, TenancyError::NoActiveScope));
    }
}
