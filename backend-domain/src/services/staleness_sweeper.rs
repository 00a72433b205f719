// Staleness sweeper
// Runs first on every accepted ping, scoped to the pinging user

use chrono::{DateTime, Utc};

use crate::entities::{DetectionSettings, PlaceVisitEvent, UserVisitState, VisitTransition};
use crate::services::{CandidateTracker, VisitLifecycle};

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub expired_candidates: usize,
    pub closed_visit: Option<(PlaceVisitEvent, VisitTransition)>,
}

pub fn sweep_stale_state(
    state: &mut UserVisitState,
    now: DateTime<Utc>,
    settings: &DetectionSettings,
) -> SweepOutcome {
    let expired_candidates = CandidateTracker::new(settings).expire(state, now);
    let closed_visit = VisitLifecycle::new(settings).close_if_stale(state, now);
    SweepOutcome {
        expired_candidates,
        closed_visit,
    }
}
