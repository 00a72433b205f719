use anyhow::Result;
use async_trait::async_trait;
use clickhouse::Client;

use backend_domain::{
    to_offset_datetime,
    GeoPing,
    LocationRepository,
    LocationRow,
    VisitTransitionRepository,
    VisitTransitionRow,
};

#[derive(Clone)]
pub struct ClickhouseRepo {
    client: Client,
    database: String,
}

impl ClickhouseRepo {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }
}

pub fn location_row(ping: &GeoPing) -> LocationRow {
    LocationRow {
        recorded_at: to_offset_datetime(ping.timestamp_utc),
        user_id: ping.user_id.clone(),
        latitude: ping.latitude,
        longitude: ping.longitude,
        accuracy_meters: ping.accuracy_meters,
        source: ping.source.as_str().to_string(),
    }
}

#[async_trait]
impl LocationRepository for ClickhouseRepo {
    async fn ensure_schema(&self) -> Result<()> {
        let create_db = format!("CREATE DATABASE IF NOT EXISTS {}", self.database);
        self.client.query(&create_db).execute().await?;

        let create_locations = r#"
CREATE TABLE IF NOT EXISTS location_pings (
    recorded_at DateTime64(3),
    user_id String,
    latitude Float64,
    longitude Float64,
    accuracy_meters Float64,
    source LowCardinality(String)
) ENGINE = MergeTree
PARTITION BY toDate(recorded_at)
ORDER BY (user_id, recorded_at)
TTL toDateTime(recorded_at) + INTERVAL 90 DAY
"#;
        self.client.query(create_locations).execute().await?;

        let create_transitions = r#"
CREATE TABLE IF NOT EXISTS visit_transitions (
    event_time DateTime64(3),
    user_id String,
    visit_id String,
    kind LowCardinality(String),
    reason LowCardinality(String),
    place_id String,
    place_name String,
    trip_name String,
    region_name String,
    arrived_at DateTime64(3),
    last_seen_at DateTime64(3),
    ended_at Nullable(DateTime64(3))
) ENGINE = MergeTree
PARTITION BY toDate(event_time)
ORDER BY (event_time, user_id, visit_id)
TTL toDateTime(event_time) + INTERVAL 365 DAY
"#;
        self.client.query(create_transitions).execute().await?;
        Ok(())
    }

    async fn insert_location(&self, ping: &GeoPing) -> Result<()> {
        let mut insert = self.client.insert("location_pings")?;
        insert.write(&location_row(ping)).await?;
        insert.end().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let _: u8 = self.client.query("SELECT toUInt8(1)").fetch_one().await?;
        Ok(())
    }
}

#[async_trait]
impl VisitTransitionRepository for ClickhouseRepo {
    async fn insert_transitions(&self, rows: &[VisitTransitionRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert("visit_transitions")?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await?;
        Ok(())
    }

    async fn fetch_transitions(
        &self,
        date: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VisitTransitionRow>> {
        let mut sql = String::from(
            "SELECT event_time, user_id, visit_id, kind, reason, place_id, place_name, \
             trip_name, region_name, arrived_at, last_seen_at, ended_at \
             FROM visit_transitions WHERE toDate(event_time) = toDate(?)",
        );
        if user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        sql.push_str(" ORDER BY event_time DESC LIMIT ?");

        let mut query = self.client.query(&sql).bind(date);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }
        let rows = query
            .bind(limit as u64)
            .fetch_all::<VisitTransitionRow>()
            .await?;
        Ok(rows)
    }
}
