//! HTTP edge (C9): exposes the core via axum, matching the surface in
//! section 6.

pub mod auth;
pub mod rate_limit;
pub mod routes;
pub mod sse;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::checkpoint::Checkpointer;
use crate::config::AppConfig;
use crate::escalation::EscalationEngine;
use crate::job_queue::JobQueue;
use crate::rate_limiter::RateLimiter;

use self::auth::ApiKeyResolver;

#[derive(Clone)]
pub struct AppState {
    pub escalation: Arc<EscalationEngine>,
    pub job_queue: Arc<JobQueue>,
    pub rate_limiter: Arc<RateLimiter>,
    pub checkpointer: Arc<Checkpointer>,
    pub api_keys: Arc<dyn ApiKeyResolver>,
    pub config: Arc<AppConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/scrape", post(routes::scrape::handle))
        .route("/v1/peel", post(routes::scrape::handle))
        .route("/v1/crawl", post(routes::crawl::create))
        .route("/v1/crawl/{job_id}", get(routes::crawl::poll))
        .route("/v1/batch", post(routes::batch::create))
        .route("/v1/batch/{job_id}", get(routes::batch::poll))
        .route("/v1/map", post(routes::map::handle))
        .route("/v1/watch", get(routes::watch::check).post(routes::watch::create))
        .route("/v1/youtube", post(routes::stubs::youtube))
        .route("/v1/answer", post(routes::stubs::answer))
        .route("/v1/agent", post(routes::stubs::agent))
        .route("/v1/agent/async", post(routes::stubs::agent_async))
        .route("/v1/agent/stream", get(routes::stubs::agent_stream))
        .route("/v1/activity", get(routes::stubs::activity))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce_rate_limit))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(60)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
