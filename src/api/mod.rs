//! Read API + streaming endpoint: axum router assembly, grounded on the teacher's
//! `api::mod` (§4.9, §6).

pub mod error;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::ApiState;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::get_health))
        .route("/api/services", get(routes::services::list_services))
        .route("/api/services/:name", get(routes::services::get_service))
        .route(
            "/api/services/:name/check",
            post(routes::services::trigger_check),
        )
        .route("/api/history/:name", get(routes::history::get_history))
        .route("/api/config", get(routes::config::get_config))
        .route(
            "/api/config/services",
            get(routes::config::get_config_services).post(routes::config::post_config_services),
        )
        .route(
            "/api/config/thresholds",
            get(routes::config::get_config_thresholds)
                .post(routes::config::post_config_thresholds),
        )
        .route("/api/config/audio", get(routes::config::get_config_audio))
        .route("/api/alerts", get(routes::alerts::get_alerts))
        .route("/api/alerts/mute/:name", post(routes::alerts::mute_alert))
        .route(
            "/api/alerts/unmute/:name",
            post(routes::alerts::unmute_alert),
        )
        .route("/api/scheduler", get(routes::scheduler::get_scheduler))
        .route("/ws", get(websocket::ws_upgrade))
        // Reads are consumed by a co-deployed but separately served UI; any origin is
        // permitted (§4.9).
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves the router in the background, returning the bound address once
/// the listener is ready (§10 step 6).
pub async fn spawn_api_server(port: u16, state: ApiState) -> anyhow::Result<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    tokio::spawn(async move {
        info!(%bound_addr, "read api listening");
        if let Err(err) = axum::serve(listener, router(state)).await {
            tracing::error!(error = %err, "api server exited");
        }
    });

    Ok(bound_addr)
}
