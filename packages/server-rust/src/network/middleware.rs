//! HTTP middleware that establishes the tenant scope for each request.
//!
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::header::HeaderName;
use axum::http::Request;
use tenantscope_core::Principal;
use tower::{Layer, Service, ServiceBuilder};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info_span, Instrument};

use super::config::ScopeLayerConfig;
use crate::context::store::{self, ScopeSlots};

// ---------------------------------------------------------------------------
// TenantScopeLayer
// ---------------------------------------------------------------------------

/// Tower layer running every request inside a fresh tenant scope.
///
/// The organization and workspace come from the authenticated [`Principal`]
/// placed in the request extensions by the authentication layer. Request
/// bodies, query strings and headers other than the request id are never
/// consulted. Requests without a principal run in a scope with no
/// organization, so scoped data access fails with `ContextMissing`.
#[derive(Debug, Clone)]
pub struct TenantScopeLayer {
    request_id_header: HeaderName,
}

impl TenantScopeLayer {
    #[must_use]
    pub fn new(config: &ScopeLayerConfig) -> Self {
        Self {
            request_id_header: config.request_id_header.clone(),
        }
    }
}

impl<S> Layer<S> for TenantScopeLayer {
    type Service = TenantScopeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantScopeService {
            inner,
            request_id_header: self.request_id_header.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TenantScopeService
// ---------------------------------------------------------------------------

/// Service wrapper produced by [`TenantScopeLayer`].
#[derive(Debug, Clone)]
pub struct TenantScopeService<S> {
    inner: S,
    request_id_header: HeaderName,
}

impl<S> TenantScopeService<S> {
    fn slots_for<B>(&self, req: &Request<B>) -> ScopeSlots {
        let request_id = req
            .headers()
            .get(&self.request_id_header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let tenant = req
            .extensions()
            .get::<Principal>()
            .map(Principal::tenant_context)
            .filter(|ctx| !ctx.is_anonymous());
        match tenant {
            Some(ctx) => ScopeSlots {
                request_id,
                ..ScopeSlots::from(ctx)
            },
            None => ScopeSlots {
                request_id,
                ..ScopeSlots::default()
            },
        }
    }
}

impl<S, B> Service<Request<B>> for TenantScopeService<S>
where
    S: Service<Request<B>> + Send,
    S::Future: Send + 'static,
    S::Response: 'static,
    S::Error: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let slots = self.slots_for(&req);
        let span = info_span!(
            "tenant_scope",
            request_id = slots.request_id.as_deref().unwrap_or(""),
            organization_id = slots.organization_id.as_deref().unwrap_or(""),
        );
        debug!(parent: &span, authenticated = slots.organization_id.is_some(), "request scope established");

        // The synchronous part of the inner call sees the scope too.
        let fut = store::sync_scope(slots.clone(), || self.inner.call(req));
        Box::pin(store::scope(slots, fut).instrument(span))
    }
}

// ---------------------------------------------------------------------------
// build_http_layers
// ---------------------------------------------------------------------------

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TenantScopeLayer,
        tower::layer::util::Stack<
            TraceLayer<
                tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
            >,
            tower::layer::util::Stack<SetRequestIdLayer<MakeRequestUuid>, tower::layer::util::Identity>,
        >,
    >,
>;

/// Builds the request-scoping middleware stack.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID v4 request id when the client sent none
/// 2. `Tracing` -- logs request/response with structured trace spans
/// 3. `TenantScope` -- runs the rest of the request inside a tenant scope
/// 4. `PropagateRequestId` -- copies the request id to the response
///
/// Authentication must run outside this stack so the [`Principal`] is in
/// the request extensions by the time `TenantScope` sees the request.
#[must_use]
pub fn build_http_layers(config: &ScopeLayerConfig) -> HttpLayers {
    let header = config.request_id_header.clone();

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(header.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(TenantScopeLayer::new(config))
        .layer(PropagateRequestIdLayer::new(header))
        .into_inner()
}
