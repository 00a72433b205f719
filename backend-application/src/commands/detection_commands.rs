use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::DetectionError;
use crate::AppState;
use backend_domain::ports::StateStoreError;
use backend_domain::{
    passes_accuracy_gate,
    to_offset_datetime,
    DetectionPass,
    DetectionSettings,
    GeoPing,
    VisitEventKind,
    VisitTransition,
    VisitTransitionRow,
};

/// Attempts per ping before a revision conflict is reported as a failure.
pub const MAX_DETECTION_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum PingOutcome {
    /// Failed the accuracy gate; nothing was read or written.
    Rejected,
    Evaluated { transitions: Vec<VisitTransition> },
    DetectionFailed { reason: String },
}

impl PingOutcome {
    pub fn transitions(&self) -> &[VisitTransition] {
        match self {
            PingOutcome::Evaluated { transitions } => transitions,
            _ => &[],
        }
    }
}

/// Runs visit detection for one ping. Never fails the caller: rejections and
/// detection errors come back as outcomes.
pub async fn process_ping(state: &AppState, ping: &GeoPing) -> PingOutcome {
    let settings = state.settings.get(&ping.user_id).await;
    if !passes_accuracy_gate(ping.accuracy_meters, &settings) {
        state.metrics.record_rejected_ping();
        debug!(
            "ping for {} rejected: accuracy {}m over {}m",
            ping.user_id, ping.accuracy_meters, settings.visited_accuracy_reject_meters
        );
        return PingOutcome::Rejected;
    }

    let timeout_secs = state.config.detection_timeout_seconds.max(1);
    let result = match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        run_detection(state, ping, &settings),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(DetectionError::Timeout(timeout_secs)),
    };

    match result {
        Ok(transitions) => {
            if !transitions.is_empty() {
                record_transitions(state, &transitions).await;
            }
            PingOutcome::Evaluated { transitions }
        }
        Err(err) => {
            state.metrics.record_detection_failure();
            error!("visit detection failed for {}: {}", ping.user_id, err);
            PingOutcome::DetectionFailed {
                reason: err.to_string(),
            }
        }
    }
}

async fn run_detection(
    state: &AppState,
    ping: &GeoPing,
    settings: &DetectionSettings,
) -> Result<Vec<VisitTransition>, DetectionError> {
    let _guard = state.user_locks.acquire(&ping.user_id).await;
    let places = state
        .place_index
        .find_near(
            ping.latitude,
            ping.longitude,
            settings.visited_max_search_radius_meters,
        )
        .await?;

    for attempt in 1..=MAX_DETECTION_ATTEMPTS {
        let current = state.visit_store.load_user_state(&ping.user_id).await?;
        let mut pass = DetectionPass::begin(current);
        pass.sweep(ping.timestamp_utc, settings);
        pass.apply_ping(ping, &places, settings)?;
        pass.check_invariants()?;
        if pass.expired_candidates() > 0 {
            debug!(
                "expired {} stale candidates for {}",
                pass.expired_candidates(),
                ping.user_id
            );
        }

        let (commit, transitions) = pass.into_commit();
        match state.visit_store.commit_user_state(&ping.user_id, commit).await {
            Ok(revision) => {
                debug!("committed visit state for {} at revision {}", ping.user_id, revision);
                // enqueued under the user lock: delivery follows commit order
                state
                    .publish_queue
                    .enqueue(&ping.user_id, transitions.clone())
                    .await;
                return Ok(transitions);
            }
            Err(StateStoreError::Conflict { expected, actual }) => {
                state.metrics.record_state_conflict();
                warn!(
                    "visit state conflict for {} (attempt {}/{}): expected {}, found {}",
                    ping.user_id, attempt, MAX_DETECTION_ATTEMPTS, expected, actual
                );
            }
            Err(StateStoreError::Backend(err)) => return Err(DetectionError::Store(err)),
        }
    }
    Err(DetectionError::Conflict(MAX_DETECTION_ATTEMPTS))
}

async fn record_transitions(state: &AppState, transitions: &[VisitTransition]) {
    for transition in transitions {
        let event = transition.event();
        match transition.kind() {
            VisitEventKind::VisitStart => {
                state.metrics.record_visit_started();
                info!(
                    "visit started: user={} place={} at {}",
                    event.user_id,
                    event.place_name_snapshot.as_deref().unwrap_or("-"),
                    event.arrived_at_utc
                );
            }
            VisitEventKind::VisitEnd => {
                state.metrics.record_visit_ended();
                info!(
                    "visit ended ({}): user={} place={}",
                    transition.end_reason().map(|r| r.as_str()).unwrap_or("-"),
                    event.user_id,
                    event.place_name_snapshot.as_deref().unwrap_or("-")
                );
            }
            VisitEventKind::VisitUpdate => {}
        }
    }

    let rows = transitions.iter().map(transition_row).collect::<Vec<_>>();
    if let Err(err) = state.transition_repo.insert_transitions(&rows).await {
        warn!("failed to record visit transitions: {}", err);
    }
}

pub fn transition_row(transition: &VisitTransition) -> VisitTransitionRow {
    let event = transition.event();
    let event_time = match transition {
        VisitTransition::Started(event) => event.arrived_at_utc,
        VisitTransition::Updated(event) => event.last_seen_at_utc,
        VisitTransition::Ended { event, .. } => event.ended_at_utc.unwrap_or(event.last_seen_at_utc),
    };
    VisitTransitionRow {
        event_time: to_offset_datetime(event_time),
        user_id: event.user_id.clone(),
        visit_id: event.id.clone(),
        kind: transition.kind().as_str().to_string(),
        reason: transition
            .end_reason()
            .map(|reason| reason.as_str().to_string())
            .unwrap_or_default(),
        place_id: event.place_id.clone().unwrap_or_default(),
        place_name: event.place_name_snapshot.clone().unwrap_or_default(),
        trip_name: event.trip_name_snapshot.clone().unwrap_or_default(),
        region_name: event.region_name_snapshot.clone().unwrap_or_default(),
        arrived_at: to_offset_datetime(event.arrived_at_utc),
        last_seen_at: to_offset_datetime(event.last_seen_at_utc),
        ended_at: event.ended_at_utc.map(to_offset_datetime),
    }
}
