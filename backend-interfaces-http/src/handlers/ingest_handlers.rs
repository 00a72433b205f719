use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use tracing::error;

use backend_application::commands::{ingest_commands, IngestSummary};
use backend_application::AppState;

use crate::error::HttpError;
use crate::middleware::{authorize, parse_check_in, parse_pings};

#[derive(Debug, Deserialize)]
pub struct CheckInQuery {
    pub user_id: Option<String>,
}

pub async fn ingest_pings(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<IngestSummary>), HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }

    let envelope = parse_pings(&headers, &body).map_err(|err| {
        error!("failed to parse ingest body: {}", err);
        HttpError::BadRequest(err.to_string())
    })?;
    if envelope.pings.is_empty() {
        return Ok((StatusCode::OK, Json(IngestSummary::default())));
    }

    let summary = ingest_commands::ingest_pings(&state, envelope.user_id, envelope.pings).await?;
    Ok((StatusCode::OK, Json(summary)))
}

pub async fn check_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CheckInQuery>,
    body: axum::body::Bytes,
) -> Result<Json<IngestSummary>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let payload = parse_check_in(&headers, &body).map_err(|err| {
        error!("failed to parse check-in body: {}", err);
        HttpError::BadRequest(err.to_string())
    })?;
    let summary = ingest_commands::check_in(&state, query.user_id, payload).await?;
    Ok(Json(summary))
}
