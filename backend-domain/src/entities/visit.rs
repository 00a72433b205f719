// Visit entities
// Candidates (unconfirmed arrivals) and visit events (confirmed presence)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{VisitEndReason, VisitEventKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceVisitCandidate {
    pub id: String,
    pub user_id: String,
    pub place_id: String,
    pub first_hit_utc: DateTime<Utc>,
    pub last_hit_utc: DateTime<Utc>,
    pub consecutive_hits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceVisitEvent {
    pub id: String,
    pub user_id: String,
    pub place_id: Option<String>,
    pub arrived_at_utc: DateTime<Utc>,
    pub last_seen_at_utc: DateTime<Utc>,
    pub ended_at_utc: Option<DateTime<Utc>>,
    pub trip_id_snapshot: Option<String>,
    pub trip_name_snapshot: Option<String>,
    pub region_name_snapshot: Option<String>,
    pub place_name_snapshot: Option<String>,
    pub place_notes_snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_at_utc: Option<DateTime<Utc>>,
}

impl PlaceVisitEvent {
    pub fn is_open(&self) -> bool {
        self.ended_at_utc.is_none()
    }
}

/// Per-user working set for one detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserVisitState {
    pub user_id: String,
    pub revision: u64,
    pub candidates: Vec<PlaceVisitCandidate>,
    pub open_visit: Option<PlaceVisitEvent>,
}

impl UserVisitState {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }

    pub fn candidate_for(&self, place_id: &str) -> Option<&PlaceVisitCandidate> {
        self.candidates.iter().find(|c| c.place_id == place_id)
    }
}

/// What a detection pass asks the store to persist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitStateCommit {
    pub expected_revision: u64,
    pub candidates: Vec<PlaceVisitCandidate>,
    pub open_visit: Option<PlaceVisitEvent>,
    pub closed_visits: Vec<PlaceVisitEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisitTransition {
    Started(PlaceVisitEvent),
    Updated(PlaceVisitEvent),
    Ended {
        event: PlaceVisitEvent,
        reason: VisitEndReason,
    },
}

impl VisitTransition {
    pub fn kind(&self) -> VisitEventKind {
        match self {
            VisitTransition::Started(_) => VisitEventKind::VisitStart,
            VisitTransition::Updated(_) => VisitEventKind::VisitUpdate,
            VisitTransition::Ended { .. } => VisitEventKind::VisitEnd,
        }
    }

    pub fn event(&self) -> &PlaceVisitEvent {
        match self {
            VisitTransition::Started(event) | VisitTransition::Updated(event) => event,
            VisitTransition::Ended { event, .. } => event,
        }
    }

    pub fn end_reason(&self) -> Option<VisitEndReason> {
        match self {
            VisitTransition::Ended { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn to_notification(&self, published_at: DateTime<Utc>) -> VisitNotification {
        let event = self.event();
        VisitNotification {
            kind: self.kind(),
            user_id: event.user_id.clone(),
            reason: self.end_reason(),
            visit: event.clone(),
            published_at,
        }
    }
}

/// Payload handed to publishers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitNotification {
    pub kind: VisitEventKind,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<VisitEndReason>,
    pub visit: PlaceVisitEvent,
    pub published_at: DateTime<Utc>,
}

/// Message fanned out to live subscribers of one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitStreamMessage {
    pub user_id: String,
    pub kind: VisitEventKind,
    pub payload: serde_json::Value,
}
