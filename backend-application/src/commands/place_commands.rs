use tracing::info;

use crate::{AppError, AppState};

/// Re-reads the place catalog; returns the number of indexed places.
pub async fn reload_places(state: &AppState) -> Result<usize, AppError> {
    let count = state.place_index.reload().await?;
    info!("place index reloaded: {} places", count);
    Ok(count)
}
