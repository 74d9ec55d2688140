use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use gatekeep_application::{AuthorizationGuard, Decision};
use gatekeep_core::{Authenticator, HandlerMetadata, HttpCallContext, Principal};

use crate::adapters::AxumRequest;

/// A guard bound to the metadata of the routes it protects.
pub struct RouteGuard<A: Authenticator> {
    guard: Arc<AuthorizationGuard<A>>,
    metadata: Arc<HandlerMetadata>,
}

impl<A: Authenticator> RouteGuard<A> {
    pub fn new(guard: Arc<AuthorizationGuard<A>>, metadata: HandlerMetadata) -> Self {
        Self {
            guard,
            metadata: Arc::new(metadata),
        }
    }
}

impl<A: Authenticator> Clone for RouteGuard<A> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Middleware for [`axum::middleware::from_fn_with_state`]: lets the request
/// through with its principal attached, or answers 401.
pub async fn require_authorization<A>(
    State(route_guard): State<RouteGuard<A>>,
    request: Request,
    next: Next,
) -> Response
where
    A: Authenticator + 'static,
{
    let mut context = HttpCallContext::new(AxumRequest(request));

    match route_guard
        .guard
        .can_activate(&mut context, &route_guard.metadata)
        .await
    {
        Decision::Allow => next.run(context.into_inner().into()).await,
        Decision::Deny => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        )
            .into_response(),
    }
}

/// Protect every route of `router` with `route_guard`.
pub fn guarded<A, S>(router: Router<S>, route_guard: RouteGuard<A>) -> Router<S>
where
    A: Authenticator + 'static,
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(
        route_guard,
        require_authorization::<A>,
    ))
}

/// Extractor for the principal attached by [`require_authorization`].
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(|| {
                tracing::error!("CurrentPrincipal used on a route without require_authorization");
                StatusCode::UNAUTHORIZED
            })
    }
}
