use std::env;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

use backend_domain::{DbConfig, RuntimeConfig, StorageBackend};

use crate::config::validation::{validate_storage_backend, validate_webhook_url};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
    pub storage_backend: String,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub settings_path: String,
    pub places_path: String,
    pub settings_cache_seconds: u64,
    pub detection_timeout_seconds: u64,
    pub visit_history_limit: usize,
    pub location_buffer_limit: usize,
    pub visit_webhook_url: Option<String>,
    pub visit_webhook_token: Option<String>,
    pub visit_webhook_secret: Option<String>,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3240".to_string(),
            api_token: None,
            storage_backend: "clickhouse".to_string(),
            clickhouse_url: "http://127.0.0.1:8123".to_string(),
            clickhouse_database: "wayfarer".to_string(),
            clickhouse_user: None,
            clickhouse_password: None,
            settings_path: "./detection_settings.yaml".to_string(),
            places_path: "./places.json".to_string(),
            settings_cache_seconds: 30,
            detection_timeout_seconds: 10,
            visit_history_limit: 500,
            location_buffer_limit: 10_000,
            visit_webhook_url: None,
            visit_webhook_token: None,
            visit_webhook_secret: None,
            max_body_bytes: 8 * 1024 * 1024,
            request_timeout_seconds: 15,
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var("WAYFARER_CONFIG").unwrap_or_else(|_| "./config.toml".to_string());
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &str) -> Result<Self> {
        let file_path = Path::new(path);
        let base_dir = file_path.parent();
        let mut config = if file_path.exists() {
            let content = fs::read_to_string(file_path).await?;
            toml::from_str::<AppConfig>(&content)?
        } else {
            warn!("{} not found, using defaults", path);
            AppConfig::default()
        };
        config.apply_env_overrides();
        config.resolve_paths(base_dir);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn normalize(&mut self) {
        self.api_token = non_blank(self.api_token.take());
        self.clickhouse_user = non_blank(self.clickhouse_user.take());
        self.clickhouse_password = non_blank(self.clickhouse_password.take());
        self.visit_webhook_url = non_blank(self.visit_webhook_url.take());
        self.visit_webhook_token = non_blank(self.visit_webhook_token.take());
        self.visit_webhook_secret = non_blank(self.visit_webhook_secret.take());
        self.storage_backend = self.storage_backend.trim().to_lowercase();
        if self.storage_backend.is_empty() {
            self.storage_backend = "clickhouse".to_string();
        }
    }

    fn resolve_paths(&mut self, base_dir: Option<&Path>) {
        let Some(base) = base_dir else {
            return;
        };
        self.settings_path = resolve_path(base, &self.settings_path);
        self.places_path = resolve_path(base, &self.places_path);
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| anyhow!("invalid bind_addr: {}", err))?;
        validate_storage_backend(&self.storage_backend)?;
        if self.settings_path.trim().is_empty() {
            return Err(anyhow!("settings_path must not be empty"));
        }
        if self.places_path.trim().is_empty() {
            return Err(anyhow!("places_path must not be empty"));
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than 0"));
        }
        if self.detection_timeout_seconds == 0 {
            return Err(anyhow!("detection_timeout_seconds must be greater than 0"));
        }
        if self.visit_history_limit == 0 {
            return Err(anyhow!("visit_history_limit must be greater than 0"));
        }
        if let Some(url) = &self.visit_webhook_url {
            validate_webhook_url(url)?;
        }
        Ok(())
    }

    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self.bind_addr.clone(),
            api_token: self.api_token.clone(),
            settings_path: self.settings_path.clone(),
            places_path: self.places_path.clone(),
            settings_cache_seconds: self.settings_cache_seconds,
            detection_timeout_seconds: self.detection_timeout_seconds,
            visit_history_limit: self.visit_history_limit,
            location_buffer_limit: self.location_buffer_limit,
            visit_webhook_url: self.visit_webhook_url.clone(),
            visit_webhook_token: self.visit_webhook_token.clone(),
            visit_webhook_secret: self.visit_webhook_secret.clone(),
            max_body_bytes: self.max_body_bytes,
            request_timeout_seconds: self.request_timeout_seconds,
        }
    }

    pub fn to_db_config(&self) -> DbConfig {
        DbConfig {
            storage_backend: StorageBackend::from(self.storage_backend.as_str()),
            clickhouse_url: self.clickhouse_url.clone(),
            clickhouse_database: self.clickhouse_database.clone(),
            clickhouse_user: self.clickhouse_user.clone(),
            clickhouse_password: self.clickhouse_password.clone(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("WAYFARER_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Ok(value) = env::var("WAYFARER_API_TOKEN") {
            self.api_token = Some(value);
        }
        if let Ok(value) = env::var("WAYFARER_STORAGE_BACKEND") {
            self.storage_backend = value;
        }
        if let Ok(value) = env::var("WAYFARER_CLICKHOUSE_URL") {
            self.clickhouse_url = value;
        }
        if let Ok(value) = env::var("WAYFARER_CLICKHOUSE_DATABASE") {
            self.clickhouse_database = value;
        }
        if let Ok(value) = env::var("WAYFARER_CLICKHOUSE_USER") {
            self.clickhouse_user = Some(value);
        }
        if let Ok(value) = env::var("WAYFARER_CLICKHOUSE_PASSWORD") {
            self.clickhouse_password = Some(value);
        }
        if let Ok(value) = env::var("WAYFARER_SETTINGS_PATH") {
            self.settings_path = value;
        }
        if let Ok(value) = env::var("WAYFARER_PLACES_PATH") {
            self.places_path = value;
        }
        if let Ok(value) = env::var("WAYFARER_SETTINGS_CACHE_SECONDS") {
            self.settings_cache_seconds = value.parse().unwrap_or(self.settings_cache_seconds);
        }
        if let Ok(value) = env::var("WAYFARER_DETECTION_TIMEOUT_SECONDS") {
            self.detection_timeout_seconds =
                value.parse().unwrap_or(self.detection_timeout_seconds);
        }
        if let Ok(value) = env::var("WAYFARER_VISIT_HISTORY_LIMIT") {
            self.visit_history_limit = value.parse().unwrap_or(self.visit_history_limit);
        }
        if let Ok(value) = env::var("WAYFARER_LOCATION_BUFFER_LIMIT") {
            self.location_buffer_limit = value.parse().unwrap_or(self.location_buffer_limit);
        }
        if let Ok(value) = env::var("WAYFARER_VISIT_WEBHOOK_URL") {
            self.visit_webhook_url = Some(value);
        }
        if let Ok(value) = env::var("WAYFARER_VISIT_WEBHOOK_TOKEN") {
            self.visit_webhook_token = Some(value);
        }
        if let Ok(value) = env::var("WAYFARER_VISIT_WEBHOOK_SECRET") {
            self.visit_webhook_secret = Some(value);
        }
        if let Ok(value) = env::var("WAYFARER_MAX_BODY_BYTES") {
            self.max_body_bytes = value.parse().unwrap_or(self.max_body_bytes);
        }
        if let Ok(value) = env::var("WAYFARER_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = value.parse().unwrap_or(self.request_timeout_seconds);
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve_path(base: &Path, value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }
    let path = Path::new(trimmed);
    if path.is_absolute() {
        trimmed.to_string()
    } else {
        base.join(path).to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn blank_optionals_become_none() {
        let mut config = AppConfig {
            api_token: Some("  ".to_string()),
            visit_webhook_url: Some(String::new()),
            visit_webhook_secret: Some("s3cret".to_string()),
            storage_backend: " Memory ".to_string(),
            ..AppConfig::default()
        };
        config.normalize();
        assert!(config.api_token.is_none());
        assert!(config.visit_webhook_url.is_none());
        assert_eq!(config.visit_webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.storage_backend, "memory");
        assert_eq!(config.to_db_config().storage_backend, StorageBackend::Memory);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let mut config = AppConfig {
            places_path: "/srv/places.json".to_string(),
            ..AppConfig::default()
        };
        config.resolve_paths(Some(Path::new("/etc/wayfarer")));
        assert_eq!(
            Path::new(&config.settings_path),
            Path::new("/etc/wayfarer/./detection_settings.yaml")
        );
        assert_eq!(config.places_path, "/srv/places.json");
    }

    #[test]
    fn parses_toml_with_partial_fields() {
        let config: AppConfig = toml::from_str(
            r#"
bind_addr = "0.0.0.0:9000"
storage_backend = "memory"
visit_webhook_url = "https://hooks.example.com/visits"
"#,
        )
        .expect("toml");
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.detection_timeout_seconds, 10);
        config.validate().expect("valid");
    }

    #[test]
    fn rejects_unknown_backend_and_bad_webhook() {
        let config = AppConfig {
            storage_backend: "postgres".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            visit_webhook_url: Some("ftp://example.com".to_string()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
