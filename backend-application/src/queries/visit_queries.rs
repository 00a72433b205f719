use chrono::Utc;
use tracing::error;

use crate::{AppError, AppState};
use backend_domain::{PlaceVisitEvent, VisitTransitionRow};

const DEFAULT_VISIT_LIMIT: usize = 50;
const MAX_VISIT_LIMIT: usize = 500;
const DEFAULT_TRANSITION_LIMIT: usize = 200;
const MAX_TRANSITION_LIMIT: usize = 2000;

/// Open visit first, then closed visits newest first.
pub async fn list_visits(
    state: &AppState,
    user_id: &str,
    limit: Option<usize>,
) -> Result<Vec<PlaceVisitEvent>, AppError> {
    let user_id = require_user(user_id)?;
    let limit = clamp_limit(limit, DEFAULT_VISIT_LIMIT, MAX_VISIT_LIMIT);
    Ok(state.visit_store.list_visits(user_id, limit).await?)
}

pub async fn current_visit(
    state: &AppState,
    user_id: &str,
) -> Result<Option<PlaceVisitEvent>, AppError> {
    let user_id = require_user(user_id)?;
    let current = state.visit_store.load_user_state(user_id).await?;
    Ok(current.open_visit)
}

/// Transition log for one UTC day (`YYYY-MM-DD`, today when absent).
pub async fn list_transitions(
    state: &AppState,
    user_id: Option<&str>,
    date: Option<String>,
    limit: Option<usize>,
) -> Result<Vec<VisitTransitionRow>, AppError> {
    let date = match date.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) {
        Some(date) => {
            chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest(format!("invalid date '{}'", date)))?;
            date
        }
        None => Utc::now().format("%Y-%m-%d").to_string(),
    };
    let user_id = user_id.map(str::trim).filter(|id| !id.is_empty());
    let limit = clamp_limit(limit, DEFAULT_TRANSITION_LIMIT, MAX_TRANSITION_LIMIT);
    state
        .transition_repo
        .fetch_transitions(&date, user_id, limit)
        .await
        .map_err(|err| {
            error!("transition query failed: {}", err);
            AppError::Internal(err)
        })
}

fn require_user(user_id: &str) -> Result<&str, AppError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("user_id is required".to_string()));
    }
    Ok(trimmed)
}

fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}
