use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::commands::detection_commands::{process_ping, PingOutcome};
use crate::{AppError, AppState};
use backend_domain::{GeoPing, GeoPoint, PingPayload, PingSource};

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestSummary {
    pub received: usize,
    pub recorded: usize,
    pub rejected: usize,
    pub location_write_failures: usize,
    pub detection_failures: usize,
    pub transitions: usize,
}

/// Records each ping's raw location, then runs detection on it. Pings are
/// handled oldest first. Fails only when no ping could be recorded.
pub async fn ingest_pings(
    state: &AppState,
    default_user_id: Option<String>,
    payloads: Vec<PingPayload>,
) -> Result<IngestSummary, AppError> {
    let mut pings = payloads
        .into_iter()
        .map(|payload| to_geo_ping(payload, default_user_id.as_deref(), PingSource::Tracking))
        .collect::<Result<Vec<_>, _>>()?;
    pings.sort_by_key(|ping| ping.timestamp_utc);

    let mut summary = IngestSummary {
        received: pings.len(),
        ..IngestSummary::default()
    };
    for ping in &pings {
        state.metrics.record_ping();
        if let Err(err) = state.location_repo.insert_location(ping).await {
            state.metrics.record_location_write_error();
            summary.location_write_failures += 1;
            warn!("failed to record location for {}: {}", ping.user_id, err);
            continue;
        }
        summary.recorded += 1;
        tally(&mut summary, process_ping(state, ping).await);
    }

    if summary.received > 0 && summary.recorded == 0 {
        return Err(AppError::Internal(anyhow::anyhow!(
            "no location could be recorded ({} pings)",
            summary.received
        )));
    }
    Ok(summary)
}

/// A manual check-in goes through the same path as a tracked ping.
pub async fn check_in(
    state: &AppState,
    user_id: Option<String>,
    payload: PingPayload,
) -> Result<IngestSummary, AppError> {
    let ping = to_geo_ping(payload, user_id.as_deref(), PingSource::CheckIn)?;
    state.metrics.record_ping();
    state.location_repo.insert_location(&ping).await.map_err(|err| {
        state.metrics.record_location_write_error();
        AppError::Internal(err)
    })?;
    let mut summary = IngestSummary {
        received: 1,
        recorded: 1,
        ..IngestSummary::default()
    };
    tally(&mut summary, process_ping(state, &ping).await);
    Ok(summary)
}

fn tally(summary: &mut IngestSummary, outcome: PingOutcome) {
    match outcome {
        PingOutcome::Rejected => summary.rejected += 1,
        PingOutcome::Evaluated { transitions } => summary.transitions += transitions.len(),
        PingOutcome::DetectionFailed { .. } => summary.detection_failures += 1,
    }
}

pub fn to_geo_ping(
    payload: PingPayload,
    default_user_id: Option<&str>,
    default_source: PingSource,
) -> Result<GeoPing, AppError> {
    let user_id = payload
        .user_id
        .as_deref()
        .or(default_user_id)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))?
        .to_string();
    if !GeoPoint::new(payload.latitude, payload.longitude).is_valid() {
        return Err(AppError::BadRequest(format!(
            "invalid coordinates ({}, {})",
            payload.latitude, payload.longitude
        )));
    }
    let source = payload
        .source
        .as_deref()
        .map(PingSource::from)
        .unwrap_or(default_source);
    Ok(GeoPing {
        user_id,
        latitude: payload.latitude,
        longitude: payload.longitude,
        accuracy_meters: payload.accuracy_meters,
        timestamp_utc: payload.timestamp_utc.unwrap_or_else(Utc::now),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(user_id: Option<&str>) -> PingPayload {
        PingPayload {
            user_id: user_id.map(str::to_string),
            latitude: 48.8584,
            longitude: 2.2945,
            accuracy_meters: 12.0,
            timestamp_utc: None,
            source: None,
        }
    }

    #[test]
    fn envelope_user_fills_missing_ping_user() {
        let ping = to_geo_ping(payload(None), Some(" alice "), PingSource::Tracking).expect("ping");
        assert_eq!(ping.user_id, "alice");
        assert_eq!(ping.source, PingSource::Tracking);
    }

    #[test]
    fn ping_user_wins_over_envelope() {
        let ping = to_geo_ping(payload(Some("bob")), Some("alice"), PingSource::Tracking).expect("ping");
        assert_eq!(ping.user_id, "bob");
    }

    #[test]
    fn missing_user_is_bad_request() {
        let err = to_geo_ping(payload(Some("  ")), None, PingSource::Tracking).expect_err("no user");
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let mut bad = payload(Some("carol"));
        bad.latitude = 91.0;
        assert!(to_geo_ping(bad, None, PingSource::CheckIn).is_err());
    }
}
