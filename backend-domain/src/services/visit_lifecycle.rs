// Visit lifecycle
// none -> open -> closed; at most one open visit per user

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{DetectionSettings, PlaceMatch, PlaceVisitEvent, UserVisitState, VisitTransition};
use crate::utils::truncate_chars;
use crate::value_objects::VisitEndReason;

pub struct VisitLifecycle<'a> {
    settings: &'a DetectionSettings,
}

impl<'a> VisitLifecycle<'a> {
    pub fn new(settings: &'a DetectionSettings) -> Self {
        Self { settings }
    }

    /// Opens a visit for `place`, freezing its trip/region/place identity.
    /// Fails if the user already has an open visit.
    pub fn open(
        &self,
        state: &mut UserVisitState,
        place: &PlaceMatch,
        now: DateTime<Utc>,
    ) -> Result<VisitTransition> {
        if let Some(open) = &state.open_visit {
            return Err(anyhow!(
                "user '{}' already has open visit '{}'",
                state.user_id,
                open.id
            ));
        }
        let notes = place
            .place_notes_html
            .as_deref()
            .map(|notes| {
                truncate_chars(notes, self.settings.visited_place_notes_snapshot_max_html_chars)
            })
            .filter(|notes| !notes.is_empty());
        let event = PlaceVisitEvent {
            id: Uuid::new_v4().to_string(),
            user_id: state.user_id.clone(),
            place_id: Some(place.place_id.clone()),
            arrived_at_utc: now,
            last_seen_at_utc: now,
            ended_at_utc: None,
            trip_id_snapshot: place.trip_id.clone(),
            trip_name_snapshot: place.trip_name.clone(),
            region_name_snapshot: place.region_name.clone(),
            place_name_snapshot: Some(place.place_name.clone()),
            place_notes_snapshot: notes,
            last_notified_at_utc: Some(now),
        };
        state.open_visit = Some(event.clone());
        Ok(VisitTransition::Started(event))
    }

    /// Advances `last_seen_at_utc`. Returns an update transition when the
    /// throttle since the last notification has elapsed.
    pub fn reinforce(&self, state: &mut UserVisitState, now: DateTime<Utc>) -> Option<VisitTransition> {
        let open = state.open_visit.as_mut()?;
        if now > open.last_seen_at_utc {
            open.last_seen_at_utc = now;
        }
        let due = match open.last_notified_at_utc {
            Some(last) => now.signed_duration_since(last) >= self.settings.visit_update_throttle(),
            None => true,
        };
        if !due {
            return None;
        }
        open.last_notified_at_utc = Some(now);
        Some(VisitTransition::Updated(open.clone()))
    }

    /// Closes the open visit. `ended_at` is never earlier than the last
    /// sighting.
    pub fn close(
        &self,
        state: &mut UserVisitState,
        ended_at: DateTime<Utc>,
        reason: VisitEndReason,
    ) -> Option<(PlaceVisitEvent, VisitTransition)> {
        let mut event = state.open_visit.take()?;
        event.ended_at_utc = Some(ended_at.max(event.last_seen_at_utc));
        let transition = VisitTransition::Ended {
            event: event.clone(),
            reason,
        };
        Some((event, transition))
    }

    /// Closes the open visit at its last sighting if it has not been
    /// reinforced within the visit staleness window.
    pub fn close_if_stale(
        &self,
        state: &mut UserVisitState,
        now: DateTime<Utc>,
    ) -> Option<(PlaceVisitEvent, VisitTransition)> {
        let last_seen = state.open_visit.as_ref()?.last_seen_at_utc;
        if now.signed_duration_since(last_seen) <= self.settings.visit_stale_window() {
            return None;
        }
        self.close(state, last_seen, VisitEndReason::Stale)
    }
}
