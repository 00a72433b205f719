// Visit notification kind and close reason

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisitEventKind {
    VisitStart,
    VisitUpdate,
    VisitEnd,
}

impl VisitEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitEventKind::VisitStart => "visit-start",
            VisitEventKind::VisitUpdate => "visit-update",
            VisitEventKind::VisitEnd => "visit-end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisitEndReason {
    /// The open place was no longer hit.
    Departure,
    /// Another place was confirmed while this visit was still open.
    ForcedDeparture,
    /// No reinforcing ping within the visit staleness window.
    Stale,
}

impl VisitEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitEndReason::Departure => "departure",
            VisitEndReason::ForcedDeparture => "forced-departure",
            VisitEndReason::Stale => "stale",
        }
    }
}
