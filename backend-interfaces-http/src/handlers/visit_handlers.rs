use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;

use backend_application::queries::visit_queries;
use backend_application::AppState;
use backend_domain::{CurrentVisitQuery, PlaceVisitEvent, TransitionQuery, VisitQuery, VisitTransitionRow};

use crate::error::HttpError;
use crate::middleware::authorize;

pub async fn list_visits(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VisitQuery>,
) -> Result<Json<Vec<PlaceVisitEvent>>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let visits = visit_queries::list_visits(&state, &query.user_id, query.limit).await?;
    Ok(Json(visits))
}

pub async fn current_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CurrentVisitQuery>,
) -> Result<Json<PlaceVisitEvent>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    visit_queries::current_visit(&state, &query.user_id)
        .await?
        .map(Json)
        .ok_or(HttpError::NotFound)
}

pub async fn list_transitions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TransitionQuery>,
) -> Result<Json<Vec<VisitTransitionRow>>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let rows = visit_queries::list_transitions(
        &state,
        query.user_id.as_deref(),
        query.date,
        query.limit,
    )
    .await?;
    Ok(Json(rows))
}
