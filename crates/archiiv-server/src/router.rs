use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::ServerConfig;
use crate::handler;
use crate::state::AppState;

/// Build the axum router with all Archiiv endpoints.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let fs = Router::new()
        .route("/root", get(handler::root))
        .route("/stat/:id", get(handler::stat))
        .route("/ls/:id", get(handler::ls))
        .route("/cat/:id/:section", get(handler::cat))
        .route("/upload/:id/:section", post(handler::upload))
        .route("/touch/:id/:name", post(handler::touch))
        .route("/mkdir/:id/:name", post(handler::mkdir))
        .route("/mount/:parent/:child", post(handler::mount))
        .route("/unmount/:parent/:child", post(handler::unmount));

    let protected = Router::new()
        .nest("/fs", fs)
        .route("/auth/whoami", get(handler::whoami))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_login,
        ));

    let router = Router::new()
        .route("/v1/health", get(handler::health))
        .route("/v1/info", get(handler::info))
        .route("/auth/login", post(handler::login))
        .merge(protected)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    let router = if config.permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };
    router.with_state(state)
}
