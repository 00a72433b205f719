// ClickHouse row shapes

use clickhouse::Row;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct LocationRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub recorded_at: OffsetDateTime,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct VisitTransitionRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub event_time: OffsetDateTime,
    pub user_id: String,
    pub visit_id: String,
    pub kind: String,
    pub reason: String,
    pub place_id: String,
    pub place_name: String,
    pub trip_name: String,
    pub region_name: String,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub arrived_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    pub last_seen_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::millis::option")]
    pub ended_at: Option<OffsetDateTime>,
}
