use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use backend_domain::{
    DetectionSettingsDocument,
    PlaceCatalog,
    PlaceCatalogRepository,
    SettingsRepository,
};

/// Detection settings (YAML) and the place catalog (JSON) kept beside the
/// service config.
pub struct ConfigFileRepository {
    settings_path: String,
    places_path: String,
}

impl ConfigFileRepository {
    pub fn new(settings_path: impl Into<String>, places_path: impl Into<String>) -> Self {
        Self {
            settings_path: settings_path.into(),
            places_path: places_path.into(),
        }
    }
}

async fn ensure_parent(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl SettingsRepository for ConfigFileRepository {
    async fn load_detection_settings(&self) -> anyhow::Result<DetectionSettingsDocument> {
        if !Path::new(&self.settings_path).exists() {
            return Ok(DetectionSettingsDocument::default());
        }
        let content = fs::read_to_string(&self.settings_path).await?;
        if content.trim().is_empty() {
            return Ok(DetectionSettingsDocument::default());
        }
        let document: DetectionSettingsDocument = serde_yaml::from_str(&content)?;
        Ok(document)
    }

    async fn save_detection_settings(&self, document: &DetectionSettingsDocument) -> anyhow::Result<()> {
        ensure_parent(&self.settings_path).await?;
        let content = serde_yaml::to_string(document)?;
        fs::write(&self.settings_path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl PlaceCatalogRepository for ConfigFileRepository {
    async fn load_place_catalog(&self) -> anyhow::Result<PlaceCatalog> {
        if !Path::new(&self.places_path).exists() {
            warn!("place catalog {} not found, no places indexed", self.places_path);
            return Ok(PlaceCatalog::default());
        }
        let content = fs::read_to_string(&self.places_path).await?;
        let catalog: PlaceCatalog = serde_json::from_str(&content)?;
        Ok(catalog)
    }
}
