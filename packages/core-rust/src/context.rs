use serde::{Deserialize, Serialize};

/// Tenant identity visible to one call chain.
///
/// `organization_id` is the primary partition key. It must come from an
/// authenticated principal or trusted infrastructure state, never from a
/// request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    /// Owning organization (tenant).
    pub organization_id: String,
    /// Secondary partition within the organization, if the caller has one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub workspace_id: Option<String>,
    /// Correlation id for logs.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
}

impl TenantContext {
    /// Creates a context for the given organization with no workspace or request id.
    #[must_use]
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            workspace_id: None,
            request_id: None,
        }
    }

    #[must_use]
    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns `true` if the organization id is empty or whitespace only.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.organization_id.trim().is_empty()
    }
}

/// Authenticated caller placed into request extensions by the auth layer.
///
/// The scope layer reads tenant identifiers from here and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Unique identifier for the authenticated entity.
    pub id: String,
    /// Organization the principal belongs to.
    pub organization_id: String,
    /// Workspace selected for this session, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub workspace_id: Option<String>,
    /// Roles assigned to this principal for authorization checks.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    /// Builds the tenant context this principal is entitled to.
    #[must_use]
    pub fn tenant_context(&self) -> TenantContext {
        TenantContext {
            organization_id: self.organization_id.clone(),
            workspace_id: self.workspace_id.clone(),
            request_id: None,
        }
    }
}
