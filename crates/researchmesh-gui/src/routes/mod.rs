mod api;
mod health;
mod page;

use api::api_router;
use axum::Router;
use health::health_router;
use page::page_router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use page::SESSION_COOKIE;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(page_router())
        .nest("/health", health_router())
        .nest("/api", api_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
