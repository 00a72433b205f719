use tracing::info;

use crate::{AppError, AppState};
use backend_domain::DetectionSettingsDocument;

/// Validates and persists a new settings document, then serves it to the
/// next evaluation.
pub async fn replace_detection_settings(
    state: &AppState,
    document: DetectionSettingsDocument,
) -> Result<(), AppError> {
    document
        .validate()
        .map_err(|err| AppError::BadRequest(err.to_string()))?;
    state.settings.replace(document).await?;
    info!("detection settings replaced");
    Ok(())
}
