// Candidate tracker
// Counts in-radius hits per (user, place) until a visit is confirmed

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{DetectionSettings, PlaceVisitCandidate, UserVisitState};

pub struct CandidateTracker<'a> {
    settings: &'a DetectionSettings,
}

impl<'a> CandidateTracker<'a> {
    pub fn new(settings: &'a DetectionSettings) -> Self {
        Self { settings }
    }

    /// Registers a hit for `place_id` and returns the candidate's hit count.
    /// Creates the candidate on the first hit; never creates a second one.
    pub fn record_hit(&self, state: &mut UserVisitState, place_id: &str, now: DateTime<Utc>) -> u32 {
        if let Some(candidate) = state
            .candidates
            .iter_mut()
            .find(|candidate| candidate.place_id == place_id)
        {
            candidate.consecutive_hits = candidate.consecutive_hits.saturating_add(1);
            if now > candidate.last_hit_utc {
                candidate.last_hit_utc = now;
            }
            return candidate.consecutive_hits;
        }
        state.candidates.push(PlaceVisitCandidate {
            id: Uuid::new_v4().to_string(),
            user_id: state.user_id.clone(),
            place_id: place_id.to_string(),
            first_hit_utc: now,
            last_hit_utc: now,
            consecutive_hits: 1,
        });
        1
    }

    pub fn is_confirmed(&self, hits: u32) -> bool {
        hits >= self.settings.visited_required_hits.max(1)
    }

    /// Removes the candidate on promotion.
    pub fn take(&self, state: &mut UserVisitState, place_id: &str) -> Option<PlaceVisitCandidate> {
        let idx = state
            .candidates
            .iter()
            .position(|candidate| candidate.place_id == place_id)?;
        Some(state.candidates.remove(idx))
    }

    /// Drops candidates whose last hit is older than the staleness window.
    pub fn expire(&self, state: &mut UserVisitState, now: DateTime<Utc>) -> usize {
        let window = self.settings.candidate_stale_window();
        let before = state.candidates.len();
        state
            .candidates
            .retain(|candidate| now.signed_duration_since(candidate.last_hit_utc) <= window);
        before - state.candidates.len()
    }
}
