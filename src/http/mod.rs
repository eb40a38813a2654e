mod checkins;
mod configs;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::db::DbPool;
use crate::engine::sweep::SweeperState;
use crate::engine::CheckInEngine;

/// Shared state for the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub engine: Arc<CheckInEngine>,
    pub sweeper: Arc<SweeperState>,
    pub org_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/checkins", get(checkins::list).post(checkins::create))
        .route("/checkins/pending", get(checkins::list_pending))
        .route("/checkins/statistics", get(checkins::statistics))
        .route("/checkins/feed", get(checkins::feed))
        .route(
            "/checkins/config",
            get(configs::list).post(configs::create),
        )
        .route(
            "/checkins/config/{id}",
            get(configs::get_one)
                .patch(configs::update)
                .delete(configs::delete),
        )
        .route("/checkins/{id}", get(checkins::get_one))
        .route("/checkins/{id}/respond", post(checkins::respond))
        .route("/checkins/{id}/skip", post(checkins::skip))
        .route("/checkins/{id}/escalate", post(checkins::escalate))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Start the API server.
///
/// Returns once the listener stops; send on the watch channel to shut down.
pub async fn serve(
    state: AppState,
    port: u16,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("API shutting down");
        })
        .await?;

    Ok(())
}

/// Health check endpoint, sweeper counters included.
async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pulsecheck",
        "sweeps": state.sweeper.stats(),
    }))
}
