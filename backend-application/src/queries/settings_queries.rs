use std::sync::Arc;

use crate::AppState;
use backend_domain::{DetectionSettings, DetectionSettingsDocument};

pub async fn effective_settings(state: &AppState, user_id: Option<&str>) -> DetectionSettings {
    match user_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(user_id) => state.settings.get(user_id).await,
        None => state.settings.document().await.defaults.clone(),
    }
}

pub async fn settings_document(state: &AppState) -> Arc<DetectionSettingsDocument> {
    state.settings.document().await
}
