//! Telemetry endpoint polled by the dashboard

use axum::{extract::State, routing::post, Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::TelemetrySnapshot;
use crate::sampler::SharedTelemetry;

/// `POST /` answers with the current snapshot; the request body is ignored.
pub fn router(state: SharedTelemetry) -> Router {
    Router::new()
        .route("/", post(telemetry))
        .with_state(state)
}

async fn telemetry(State(state): State<SharedTelemetry>) -> Json<TelemetrySnapshot> {
    let snapshot = state.snapshot();
    debug!(devices = snapshot.data.len(), "serving snapshot");
    Json(snapshot)
}

/// Serves until `cancel` fires, then drains open connections.
pub async fn serve(
    listener: TcpListener,
    state: SharedTelemetry,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    info!("serving GPX telemetry at http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("telemetry server stopped");
    Ok(())
}
