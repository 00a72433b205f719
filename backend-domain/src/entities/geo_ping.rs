// Geolocation ping entity
// One timestamped sample handed to the detector; never persisted by it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{GeoPoint, PingSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPing {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    pub timestamp_utc: DateTime<Utc>,
    #[serde(default)]
    pub source: PingSource,
}

impl GeoPing {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Wire shape of a single ping inside an ingest envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PingPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    #[serde(default)]
    pub timestamp_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingEnvelope {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub pings: Vec<PingPayload>,
}
