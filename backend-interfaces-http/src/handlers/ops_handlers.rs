use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tokio::time::{timeout, Duration};
use tracing::error;

use backend_application::commands::{place_commands, settings_commands};
use backend_application::queries::settings_queries;
use backend_application::AppState;
use backend_domain::{DetectionSettings, DetectionSettingsDocument, SettingsQuery};

use crate::error::HttpError;
use crate::middleware::authorize;

#[derive(Serialize)]
pub struct ReloadResponse {
    pub places: usize,
}

#[derive(Serialize)]
struct ReadyStatus {
    storage: bool,
    places_indexed: bool,
}

pub async fn get_detection_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SettingsQuery>,
) -> Result<Json<DetectionSettings>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let settings = settings_queries::effective_settings(&state, query.user_id.as_deref()).await;
    Ok(Json(settings))
}

pub async fn update_detection_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DetectionSettingsDocument>,
) -> Result<StatusCode, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    settings_commands::replace_detection_settings(&state, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reload_places(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReloadResponse>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let places = place_commands::reload_places(&state).await?;
    Ok(Json(ReloadResponse { places }))
}

pub async fn health_live() -> StatusCode {
    StatusCode::OK
}

/// Storage must answer within the request timeout; an empty place index
/// is reported but does not fail readiness.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let timeout_secs = state.config.request_timeout_seconds.max(1);
    let timeout_duration = Duration::from_secs(timeout_secs);
    let storage = match timeout(timeout_duration, state.health.check_database()).await {
        Ok(Ok(ok)) => ok,
        Ok(Err(err)) => {
            error!("ready check failed: {}", err);
            false
        }
        Err(_) => {
            error!("ready check timeout after {}s", timeout_secs);
            false
        }
    };
    let places_indexed = state.health.check_place_index().await.unwrap_or(false);
    let status = if storage {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyStatus {
            storage,
            places_indexed,
        }),
    )
}

pub async fn metrics_prometheus(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorize(&state.config, &headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorized".to_string()).into_response();
    }
    let payload = state.metrics.render_prometheus();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    (headers, payload).into_response()
}
