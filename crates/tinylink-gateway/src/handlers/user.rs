use crate::error::Result;
use crate::model::UserUrl;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use tinylink_core::{OwnerId, UrlHash};
use tracing::debug;

/// Lists the live URLs of the calling owner, `204` when there are none.
pub async fn list_user_urls_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Response> {
    let records = state.shortener().list(&owner).await?;
    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let urls: Vec<UserUrl> = records
        .into_iter()
        .map(|record| UserUrl {
            short_url: record.short_url,
            original_url: record.original_url,
        })
        .collect();

    Ok(Json(urls).into_response())
}

/// Accepts a JSON array of hashes and schedules their deletion.
pub async fn delete_user_urls_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    payload: std::result::Result<Json<Vec<String>>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(raw) = payload?;
    let hashes = raw
        .into_iter()
        .map(UrlHash::new)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    debug!(owner = %owner, count = hashes.len(), "delete requested");
    state.shortener().delete(hashes).await?;
    Ok(StatusCode::ACCEPTED)
}
