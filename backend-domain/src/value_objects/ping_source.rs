// Ping source value object

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PingSource {
    #[default]
    Tracking,
    CheckIn,
}

impl PingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PingSource::Tracking => "tracking",
            PingSource::CheckIn => "check-in",
        }
    }
}

impl From<&str> for PingSource {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "check-in" | "checkin" | "check_in" | "manual" => PingSource::CheckIn,
            _ => PingSource::Tracking,
        }
    }
}
