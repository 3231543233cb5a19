use crate::error::Result;
use crate::model::HealthResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Reports database liveness; fails when no database is configured.
pub async fn ping_handler(State(state): State<AppState>) -> Result<&'static str> {
    state.shortener().ping().await?;
    Ok("ok")
}
