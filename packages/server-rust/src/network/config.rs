//! Configuration for the HTTP scope layer.

use axum::http::header::HeaderName;

/// Default correlation header, set on the way in and echoed on the way out.
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Settings for [`TenantScopeLayer`](super::TenantScopeLayer) and
/// [`build_http_layers`](super::build_http_layers).
#[derive(Debug, Clone)]
pub struct ScopeLayerConfig {
    /// Header carrying the request correlation id.
    pub request_id_header: HeaderName,
}

impl Default for ScopeLayerConfig {
    fn default() -> Self {
        Self {
            request_id_header: HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER),
        }
    }
}
