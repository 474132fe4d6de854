//! HTTP layer: public booking, management, and health routes over axum.

mod auth;
pub mod error;
mod events;
mod manage;
mod public;
pub mod views;

use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::observability::HTTP_REQUESTS_TOTAL;
use crate::salon::SalonManager;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub salons: Arc<SalonManager>,
    /// Bearer token for the management API. `None` locks it entirely.
    pub admin_token: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    let manage = manage::router().route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(public::router())
        .merge(manage)
        .fallback(|| async { ApiError::NotFound("route not found".into()) })
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let response = next.run(request).await;
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}
