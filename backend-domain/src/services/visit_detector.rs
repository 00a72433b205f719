// Detection pass
// Applies one accepted ping to a user's working state: sweep, then
// candidate accounting and visit transitions

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::entities::{
    DetectionSettings,
    GeoPing,
    PlaceMatch,
    PlaceVisitEvent,
    UserVisitState,
    VisitStateCommit,
    VisitTransition,
};
use crate::services::place_matching::{effective_radius_meters, select_hits};
use crate::services::staleness_sweeper::sweep_stale_state;
use crate::services::{CandidateTracker, VisitLifecycle};
use crate::value_objects::VisitEndReason;

#[derive(Debug)]
pub struct DetectionPass {
    state: UserVisitState,
    closed_visits: Vec<PlaceVisitEvent>,
    transitions: Vec<VisitTransition>,
    expired_candidates: usize,
}

impl DetectionPass {
    pub fn begin(state: UserVisitState) -> Self {
        Self {
            state,
            closed_visits: Vec::new(),
            transitions: Vec::new(),
            expired_candidates: 0,
        }
    }

    pub fn state(&self) -> &UserVisitState {
        &self.state
    }

    pub fn transitions(&self) -> &[VisitTransition] {
        &self.transitions
    }

    pub fn expired_candidates(&self) -> usize {
        self.expired_candidates
    }

    pub fn sweep(&mut self, now: DateTime<Utc>, settings: &DetectionSettings) {
        let outcome = sweep_stale_state(&mut self.state, now, settings);
        self.expired_candidates += outcome.expired_candidates;
        if let Some((closed, transition)) = outcome.closed_visit {
            self.closed_visits.push(closed);
            self.transitions.push(transition);
        }
    }

    /// Attributes the ping to the places it hits.
    ///
    /// A confirmed candidate for another place always takes over: the open
    /// visit is closed as a forced departure, hit or not. Otherwise a hit on
    /// the open place reinforces it and a miss ends it at the ping time.
    /// At most one candidate is promoted per ping: the nearest confirmed.
    pub fn apply_ping(
        &mut self,
        ping: &GeoPing,
        places: &[PlaceMatch],
        settings: &DetectionSettings,
    ) -> Result<()> {
        let now = ping.timestamp_utc;
        let radius = effective_radius_meters(ping.accuracy_meters, settings);
        let hits = select_hits(places, radius);
        let tracker = CandidateTracker::new(settings);
        let lifecycle = VisitLifecycle::new(settings);

        let open_place_id = self
            .state
            .open_visit
            .as_ref()
            .and_then(|visit| visit.place_id.clone());
        let open_hit = open_place_id
            .as_deref()
            .and_then(|id| hits.iter().find(|place| place.place_id == id))
            .cloned();

        let mut promotable: Option<PlaceMatch> = None;
        for place in &hits {
            if open_place_id.as_deref() == Some(place.place_id.as_str()) {
                continue;
            }
            let count = tracker.record_hit(&mut self.state, &place.place_id, now);
            if promotable.is_none() && tracker.is_confirmed(count) {
                promotable = Some(place.clone());
            }
        }

        match (promotable, open_hit) {
            (Some(next), _) => {
                self.close_open(now, VisitEndReason::ForcedDeparture, &lifecycle);
                self.promote(&next, now, &tracker, &lifecycle)?;
            }
            (None, Some(_)) => {
                if let Some(update) = lifecycle.reinforce(&mut self.state, now) {
                    self.transitions.push(update);
                }
            }
            (None, None) => self.close_open(now, VisitEndReason::Departure, &lifecycle),
        }
        Ok(())
    }

    fn close_open(&mut self, now: DateTime<Utc>, reason: VisitEndReason, lifecycle: &VisitLifecycle<'_>) {
        if let Some((closed, transition)) = lifecycle.close(&mut self.state, now, reason) {
            self.closed_visits.push(closed);
            self.transitions.push(transition);
        }
    }

    fn promote(
        &mut self,
        place: &PlaceMatch,
        now: DateTime<Utc>,
        tracker: &CandidateTracker<'_>,
        lifecycle: &VisitLifecycle<'_>,
    ) -> Result<()> {
        tracker.take(&mut self.state, &place.place_id);
        let started = lifecycle.open(&mut self.state, place, now)?;
        self.transitions.push(started);
        Ok(())
    }

    /// Precondition checks run before the pass is committed.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for candidate in &self.state.candidates {
            if candidate.user_id != self.state.user_id {
                return Err(anyhow!("candidate '{}' belongs to another user", candidate.id));
            }
            if !seen.insert(candidate.place_id.as_str()) {
                return Err(anyhow!(
                    "duplicate candidate for place '{}'",
                    candidate.place_id
                ));
            }
        }
        if let Some(open) = &self.state.open_visit {
            if !open.is_open() {
                return Err(anyhow!("open visit '{}' carries an end time", open.id));
            }
            if let Some(place_id) = &open.place_id {
                if seen.contains(place_id.as_str()) {
                    return Err(anyhow!("candidate exists for open place '{}'", place_id));
                }
            }
        }
        if self.closed_visits.iter().any(PlaceVisitEvent::is_open) {
            return Err(anyhow!("closed visit without end time"));
        }
        Ok(())
    }

    pub fn into_commit(self) -> (VisitStateCommit, Vec<VisitTransition>) {
        let commit = VisitStateCommit {
            expected_revision: self.state.revision,
            candidates: self.state.candidates,
            open_visit: self.state.open_visit,
            closed_visits: self.closed_visits,
        };
        (commit, self.transitions)
    }
}
