//! API route definitions.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;
use super::ws;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors_origins);

    // Tracing layer with request IDs and timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let base = state.config.server.normalized_base_path();

    // Agent hub and host endpoints, all under the base path
    let hub_routes = Router::new()
        .route("/rw/ws/agent", get(ws::agent_ws_handler))
        .route("/rw/ws/agents/{tracking_id}", post(handlers::ws_agents))
        .route("/rw/ws/run/{tracking_id}", post(handlers::ws_run))
        .route("/rw/ws/stats/{tracking_id}", post(handlers::ws_stats))
        .route("/rw/ws/logs/{tracking_id}", post(handlers::ws_logs))
        .route("/rw/ws/check-ids/{tracking_id}", post(handlers::ws_check_ids))
        .route("/machine-specs/{tracking_id}", post(handlers::machine_specs))
        .route("/progress/{tracking_id}", post(handlers::progress));

    let mut router = Router::new().route("/health", get(handlers::health));
    router = if base.is_empty() {
        router.merge(hub_routes)
    } else {
        router.nest(&base, hub_routes)
    };

    // Configured paths; a duplicate would make the router panic
    let mut mounted: HashSet<String> = HashSet::new();
    mounted.insert(format!("{base}/progress"));

    for path in &state.config.scripts.progress_paths {
        let path = path.trim_end_matches('/');
        if !mounted.insert(path.to_string()) {
            continue;
        }
        router = router.route(&format!("{path}/{{tracking_id}}"), post(handlers::progress));
    }

    for route in &state.config.scripts.routes {
        let prefix = route.path.trim_end_matches('/');
        if !mounted.insert(prefix.to_string()) {
            tracing::warn!("Script route {} configured twice, keeping the first", prefix);
            continue;
        }
        let program: Arc<str> = Arc::from(route.program.as_str());
        let path = format!("{prefix}/{{tracking_id}}");
        router = router.route(
            &path,
            post(
                move |State(state): State<AppState>,
                      Path(tracking_id): Path<String>,
                      body: String| {
                    handlers::run_script(state, Arc::clone(&program), tracking_id, body)
                },
            ),
        );
    }

    router.with_state(state).layer(cors).layer(trace_layer)
}

/// Build the CORS layer from the configured origins.
///
/// With no origins configured any origin is allowed, matching the desktop
/// client which talks to the hub from a local renderer.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN];

    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    tracing::info!("CORS: Allowing {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}
