use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pings: AtomicU64,
    pings_rejected: AtomicU64,
    location_write_errors: AtomicU64,
    detection_failures: AtomicU64,
    state_conflicts: AtomicU64,
    visits_started: AtomicU64,
    visits_ended: AtomicU64,
    publish_failures: AtomicU64,
}

impl Metrics {
    pub fn record_ping(&self) {
        self.pings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_ping(&self) {
        self.pings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_location_write_error(&self) {
        self.location_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection_failure(&self) {
        self.detection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_conflict(&self) {
        self.state_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_visit_started(&self) {
        self.visits_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_visit_ended(&self) {
        self.visits_ended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn visits_started(&self) -> u64 {
        self.visits_started.load(Ordering::Relaxed)
    }

    pub fn visits_ended(&self) -> u64 {
        self.visits_ended.load(Ordering::Relaxed)
    }

    pub fn pings_rejected(&self) -> u64 {
        self.pings_rejected.load(Ordering::Relaxed)
    }

    pub fn detection_failures(&self) -> u64 {
        self.detection_failures.load(Ordering::Relaxed)
    }

    pub fn state_conflicts(&self) -> u64 {
        self.state_conflicts.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let pings = self.pings.load(Ordering::Relaxed);
        let rejected = self.pings_rejected.load(Ordering::Relaxed);
        let write_errors = self.location_write_errors.load(Ordering::Relaxed);
        let failures = self.detection_failures.load(Ordering::Relaxed);
        let conflicts = self.state_conflicts.load(Ordering::Relaxed);
        let started = self.visits_started.load(Ordering::Relaxed);
        let ended = self.visits_ended.load(Ordering::Relaxed);
        let publish_failures = self.publish_failures.load(Ordering::Relaxed);

        format!(
            "# TYPE wayfarer_pings_total counter\n\
wayfarer_pings_total {}\n\
# TYPE wayfarer_pings_rejected_total counter\n\
wayfarer_pings_rejected_total {}\n\
# TYPE wayfarer_location_write_errors_total counter\n\
wayfarer_location_write_errors_total {}\n\
# TYPE wayfarer_detection_failures_total counter\n\
wayfarer_detection_failures_total {}\n\
# TYPE wayfarer_state_conflicts_total counter\n\
wayfarer_state_conflicts_total {}\n\
# TYPE wayfarer_visits_started_total counter\n\
wayfarer_visits_started_total {}\n\
# TYPE wayfarer_visits_ended_total counter\n\
wayfarer_visits_ended_total {}\n\
# TYPE wayfarer_publish_failures_total counter\n\
wayfarer_publish_failures_total {}\n",
            pings, rejected, write_errors, failures, conflicts, started, ended, publish_failures
        )
    }
}
