// Runtime configuration and query DTOs

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
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

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub storage_backend: StorageBackend,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Clickhouse,
    Memory,
}

impl From<&str> for StorageBackend {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => StorageBackend::Memory,
            _ => StorageBackend::Clickhouse,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VisitQuery {
    pub user_id: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentVisitQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TransitionQuery {
    pub user_id: Option<String>,
    pub date: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SettingsQuery {
    pub user_id: Option<String>,
}
