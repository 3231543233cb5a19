use crate::error::{AppError, Result};
use crate::model::{BatchRequestItem, BatchResponseItem, ShortenRequest, ShortenResponse};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use tinylink_core::{BatchItem, OwnerId, ShortenerError, UrlHash};

/// `POST /` with the URL as a plain-text body.
pub async fn shorten_text_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    body: String,
) -> Result<Response> {
    match state.shortener().shorten(&owner, body).await {
        Ok(shortened) => Ok((StatusCode::CREATED, shortened.short_url).into_response()),
        Err(ShortenerError::Conflict { short_url }) => {
            Ok((StatusCode::CONFLICT, short_url).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// `POST /api/shorten` with `{"url": ...}`.
pub async fn shorten_json_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    payload: std::result::Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;

    let (status, result) = match state.shortener().shorten(&owner, request.url).await {
        Ok(shortened) => (StatusCode::CREATED, shortened.short_url),
        Err(ShortenerError::Conflict { short_url }) => (StatusCode::CONFLICT, short_url),
        Err(e) => return Err(e.into()),
    };

    Ok((status, Json(ShortenResponse { result })).into_response())
}

/// `POST /api/shorten/batch`; correlation ids become the hashes.
pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    payload: std::result::Result<Json<Vec<BatchRequestItem>>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<BatchResponseItem>>)> {
    let Json(request) = payload?;
    if request.is_empty() {
        return Err(AppError::BadRequest("batch cannot be empty".to_string()));
    }

    let items = request
        .into_iter()
        .map(|item| BatchItem {
            correlation_id: item.correlation_id,
            original_url: item.original_url,
        })
        .collect();

    let shortened = state.shortener().shorten_batch(&owner, items).await?;
    let response = shortened
        .into_iter()
        .map(|s| BatchResponseItem {
            correlation_id: s.hash.to_string(),
            short_url: s.short_url,
        })
        .collect();

    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /{hash}`: temporary redirect to the original URL.
pub async fn redirect_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Redirect> {
    let hash = UrlHash::new(hash)?;
    let record = state.shortener().resolve(&hash).await?;
    Ok(Redirect::temporary(&record.original_url))
}
