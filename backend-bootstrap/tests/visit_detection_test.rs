use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use backend_application::commands::{ingest_pings, process_ping, PingOutcome};
use backend_application::AppState;
use backend_bootstrap::{assemble_state, Ports};
use backend_domain::{
    DetectionSettings,
    DetectionSettingsDocument,
    DetectionSettingsOverride,
    GeoPing,
    PingPayload,
    PingSource,
    PlaceCatalog,
    PlaceCatalogRepository,
    PlaceIndex,
    PlaceMatch,
    PlaceVisitEvent,
    RuntimeConfig,
    SettingsRepository,
    StateStoreError,
    UserVisitState,
    VisitEndReason,
    VisitEventKind,
    VisitStateCommit,
    VisitStateRepository,
    VisitTransition,
};
use backend_infrastructure::{
    CatalogPlaceIndex,
    MemoryLocationRepository,
    MemoryTransitionRepository,
    MemoryVisitStateRepository,
};

const LOUVRE: (f64, f64) = (48.8606, 2.3376);
const METERS_PER_DEGREE_LAT: f64 = 111_194.93;

fn north_of(origin: (f64, f64), meters: f64) -> (f64, f64) {
    (origin.0 + meters / METERS_PER_DEGREE_LAT, origin.1)
}

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn ping(user_id: &str, point: (f64, f64), accuracy: f64, minutes: i64) -> GeoPing {
    GeoPing {
        user_id: user_id.to_string(),
        latitude: point.0,
        longitude: point.1,
        accuracy_meters: accuracy,
        timestamp_utc: at(minutes),
        source: PingSource::Tracking,
    }
}

struct FixedSettings(DetectionSettingsDocument);

#[async_trait]
impl SettingsRepository for FixedSettings {
    async fn load_detection_settings(&self) -> anyhow::Result<DetectionSettingsDocument> {
        Ok(self.0.clone())
    }

    async fn save_detection_settings(&self, _document: &DetectionSettingsDocument) -> anyhow::Result<()> {
        Ok(())
    }
}

struct FixedCatalog(PlaceCatalog);

#[async_trait]
impl PlaceCatalogRepository for FixedCatalog {
    async fn load_place_catalog(&self) -> anyhow::Result<PlaceCatalog> {
        Ok(self.0.clone())
    }
}

struct BrokenIndex;

#[async_trait]
impl PlaceIndex for BrokenIndex {
    async fn find_near(&self, _: f64, _: f64, _: f64) -> anyhow::Result<Vec<PlaceMatch>> {
        anyhow::bail!("spatial index unavailable")
    }

    async fn reload(&self) -> anyhow::Result<usize> {
        Ok(0)
    }

    async fn place_count(&self) -> usize {
        0
    }
}

/// Reports a revision conflict for the first `conflicts` commits.
struct ContendedStore {
    inner: MemoryVisitStateRepository,
    conflicts: AtomicU32,
}

#[async_trait]
impl VisitStateRepository for ContendedStore {
    async fn load_user_state(&self, user_id: &str) -> anyhow::Result<UserVisitState> {
        self.inner.load_user_state(user_id).await
    }

    async fn commit_user_state(
        &self,
        user_id: &str,
        commit: VisitStateCommit,
    ) -> Result<u64, StateStoreError> {
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(StateStoreError::Conflict {
                expected: commit.expected_revision,
                actual: commit.expected_revision + 1,
            });
        }
        self.inner.commit_user_state(user_id, commit).await
    }

    async fn list_visits(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<PlaceVisitEvent>> {
        self.inner.list_visits(user_id, limit).await
    }
}

fn catalog(places: &[(&str, (f64, f64))]) -> PlaceCatalog {
    let entries = places
        .iter()
        .map(|(id, (lat, lon))| {
            serde_json::json!({
                "place_id": id,
                "name": format!("Place {}", id),
                "notes_html": "<p>bring a ticket</p>",
                "latitude": lat,
                "longitude": lon,
            })
        })
        .collect::<Vec<_>>();
    serde_json::from_value(serde_json::json!({
        "trips": [{
            "trip_id": "paris-2024",
            "name": "Paris 2024",
            "regions": [{ "name": "1er", "places": entries }]
        }]
    }))
    .expect("catalog")
}

fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        api_token: None,
        settings_path: "unused.yaml".to_string(),
        places_path: "unused.json".to_string(),
        settings_cache_seconds: 60,
        detection_timeout_seconds: 5,
        visit_history_limit: 100,
        location_buffer_limit: 1000,
        visit_webhook_url: None,
        visit_webhook_token: None,
        visit_webhook_secret: None,
        max_body_bytes: 1024 * 1024,
        request_timeout_seconds: 5,
    }
}

struct Harness {
    state: AppState,
    locations: Arc<MemoryLocationRepository>,
}

async fn harness_with(
    document: DetectionSettingsDocument,
    places: &[(&str, (f64, f64))],
    visit_store: Arc<dyn VisitStateRepository>,
    place_index: Option<Arc<dyn PlaceIndex>>,
) -> Harness {
    let locations = Arc::new(MemoryLocationRepository::new(1000));
    let place_index: Arc<dyn PlaceIndex> = match place_index {
        Some(index) => index,
        None => {
            let index = Arc::new(CatalogPlaceIndex::new(Arc::new(FixedCatalog(catalog(places)))));
            index.reload().await.expect("reload");
            index
        }
    };
    let state = assemble_state(
        runtime_config(),
        Ports {
            location_repo: locations.clone(),
            transition_repo: Arc::new(MemoryTransitionRepository::new(1000)),
            visit_store,
            settings_repo: Arc::new(FixedSettings(document)),
            place_index,
        },
    )
    .expect("state");
    Harness { state, locations }
}

async fn harness(places: &[(&str, (f64, f64))]) -> Harness {
    harness_with(
        DetectionSettingsDocument::default(),
        places,
        Arc::new(MemoryVisitStateRepository::new(100)),
        None,
    )
    .await
}

async fn user_state(state: &AppState, user_id: &str) -> UserVisitState {
    state.visit_store.load_user_state(user_id).await.expect("state")
}

#[tokio::test]
async fn second_hit_at_exact_coordinates_promotes() {
    let h = harness(&[("louvre", LOUVRE)]).await;

    let first = process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 0)).await;
    assert!(first.transitions().is_empty());
    let after_first = user_state(&h.state, "u1").await;
    assert!(after_first.open_visit.is_none());
    assert_eq!(
        after_first.candidate_for("louvre").map(|c| c.consecutive_hits),
        Some(1)
    );

    let second = process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 1)).await;
    assert_eq!(second.transitions().len(), 1);
    assert_eq!(second.transitions()[0].kind(), VisitEventKind::VisitStart);

    let after_second = user_state(&h.state, "u1").await;
    let open = after_second.open_visit.expect("open visit");
    assert_eq!(open.arrived_at_utc, at(1));
    assert_eq!(open.last_seen_at_utc, at(1));
    assert_eq!(open.place_id.as_deref(), Some("louvre"));
    assert_eq!(open.trip_name_snapshot.as_deref(), Some("Paris 2024"));
    assert_eq!(open.region_name_snapshot.as_deref(), Some("1er"));
    assert!(after_second.candidates.is_empty());
    assert_eq!(h.state.metrics.visits_started(), 1);
}

#[tokio::test]
async fn coarse_accuracy_clamps_radius_to_max() {
    let mut document = DetectionSettingsDocument::default();
    document.defaults.visited_accuracy_reject_meters = 300.0;
    document.defaults.visited_max_radius_meters = 100.0;
    let places = [
        ("inside", north_of(LOUVRE, 90.0)),
        ("outside", north_of(LOUVRE, 120.0)),
    ];
    let h = harness_with(
        document,
        &places,
        Arc::new(MemoryVisitStateRepository::new(100)),
        None,
    )
    .await;

    let outcome = process_ping(&h.state, &ping("u1", LOUVRE, 250.0, 0)).await;
    assert!(matches!(outcome, PingOutcome::Evaluated { .. }));
    let state = user_state(&h.state, "u1").await;
    assert!(state.candidate_for("inside").is_some());
    assert!(state.candidate_for("outside").is_none());
}

#[tokio::test]
async fn inaccurate_ping_touches_nothing() {
    let h = harness(&[("louvre", LOUVRE)]).await;
    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 0)).await;
    let before = user_state(&h.state, "u1").await;

    let outcome = process_ping(&h.state, &ping("u1", LOUVRE, 500.0, 1)).await;
    assert_eq!(outcome, PingOutcome::Rejected);
    assert_eq!(user_state(&h.state, "u1").await, before);
    assert_eq!(h.state.metrics.pings_rejected(), 1);
}

#[tokio::test]
async fn one_short_of_required_hits_never_promotes() {
    let document = DetectionSettingsDocument {
        overrides: [(
            "u1".to_string(),
            DetectionSettingsOverride {
                visited_required_hits: Some(3),
                ..DetectionSettingsOverride::default()
            },
        )]
        .into_iter()
        .collect(),
        ..DetectionSettingsDocument::default()
    };
    let h = harness_with(
        document,
        &[("louvre", LOUVRE)],
        Arc::new(MemoryVisitStateRepository::new(100)),
        None,
    )
    .await;

    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 0)).await;
    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 1)).await;
    process_ping(&h.state, &ping("u1", north_of(LOUVRE, 500.0), 10.0, 2)).await;

    let state = user_state(&h.state, "u1").await;
    assert!(state.open_visit.is_none());
    assert_eq!(h.state.metrics.visits_started(), 0);
}

#[tokio::test]
async fn leaving_the_radius_ends_the_visit_at_ping_time() {
    let h = harness(&[("louvre", LOUVRE)]).await;
    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 0)).await;
    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 1)).await;

    let outcome = process_ping(&h.state, &ping("u1", north_of(LOUVRE, 800.0), 10.0, 10)).await;
    let ended = outcome
        .transitions()
        .iter()
        .find(|t| t.kind() == VisitEventKind::VisitEnd)
        .expect("visit end");
    assert_eq!(ended.end_reason(), Some(VisitEndReason::Departure));
    assert_eq!(ended.event().ended_at_utc, Some(at(10)));
    assert!(user_state(&h.state, "u1").await.open_visit.is_none());
}

#[tokio::test]
async fn stale_visit_closes_at_last_sighting_on_any_ping() {
    let h = harness(&[("louvre", LOUVRE)]).await;
    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 0)).await;
    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 1)).await;

    // Two hours later, somewhere else entirely.
    let far = (40.7128, -74.0060);
    let outcome = process_ping(&h.state, &ping("u1", far, 10.0, 121)).await;
    let ended = outcome
        .transitions()
        .iter()
        .find(|t| t.kind() == VisitEventKind::VisitEnd)
        .expect("visit end");
    assert_eq!(ended.end_reason(), Some(VisitEndReason::Stale));
    assert_eq!(ended.event().ended_at_utc, Some(at(1)));

    let visits = h.state.visit_store.list_visits("u1", 10).await.expect("visits");
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].ended_at_utc, Some(at(1)));
}

#[tokio::test]
async fn nearer_confirmed_place_forces_departure() {
    let museum = LOUVRE;
    let garden = north_of(LOUVRE, 70.0);
    let between = north_of(LOUVRE, 50.0);
    let h = harness(&[("museum", museum), ("garden", garden)]).await;

    process_ping(&h.state, &ping("u1", museum, 10.0, 0)).await;
    process_ping(&h.state, &ping("u1", museum, 10.0, 1)).await;
    assert_eq!(
        user_state(&h.state, "u1").await.open_visit.and_then(|v| v.place_id),
        Some("museum".to_string())
    );

    // Accuracy 40 m gives an 80 m radius: both places are hit, garden nearer.
    process_ping(&h.state, &ping("u1", between, 40.0, 2)).await;
    let outcome = process_ping(&h.state, &ping("u1", between, 40.0, 3)).await;

    let kinds = outcome.transitions().iter().map(VisitTransition::kind).collect::<Vec<_>>();
    assert_eq!(kinds, vec![VisitEventKind::VisitEnd, VisitEventKind::VisitStart]);
    assert_eq!(
        outcome.transitions()[0].end_reason(),
        Some(VisitEndReason::ForcedDeparture)
    );

    let state = user_state(&h.state, "u1").await;
    assert_eq!(
        state.open_visit.and_then(|v| v.place_id),
        Some("garden".to_string())
    );
    let visits = h.state.visit_store.list_visits("u1", 10).await.expect("visits");
    assert_eq!(visits.iter().filter(|v| v.is_open()).count(), 1);
}

#[tokio::test]
async fn farther_confirmed_place_still_forces_departure() {
    let museum = LOUVRE;
    let garden = north_of(LOUVRE, 60.0);
    let near_museum = north_of(LOUVRE, 10.0);
    let h = harness(&[("museum", museum), ("garden", garden)]).await;

    process_ping(&h.state, &ping("u1", museum, 10.0, 0)).await;
    process_ping(&h.state, &ping("u1", museum, 10.0, 1)).await;

    // 80 m radius: museum at 10 m stays hit while garden at 50 m accumulates.
    let held = process_ping(&h.state, &ping("u1", near_museum, 40.0, 2)).await;
    assert!(held
        .transitions()
        .iter()
        .all(|t| t.kind() != VisitEventKind::VisitEnd));
    let outcome = process_ping(&h.state, &ping("u1", near_museum, 40.0, 3)).await;

    let kinds = outcome.transitions().iter().map(VisitTransition::kind).collect::<Vec<_>>();
    assert_eq!(kinds, vec![VisitEventKind::VisitEnd, VisitEventKind::VisitStart]);
    assert_eq!(
        outcome.transitions()[0].end_reason(),
        Some(VisitEndReason::ForcedDeparture)
    );
    assert_eq!(
        outcome.transitions()[0].event().place_id.as_deref(),
        Some("museum")
    );
    assert_eq!(
        user_state(&h.state, "u1").await.open_visit.and_then(|v| v.place_id),
        Some("garden".to_string())
    );
}

#[tokio::test]
async fn stream_receives_forced_departure_in_commit_order() {
    let garden = north_of(LOUVRE, 60.0);
    let near_museum = north_of(LOUVRE, 10.0);
    let h = harness(&[("museum", LOUVRE), ("garden", garden)]).await;
    let mut rx = h.state.stream_hub.subscribe("u1").await;

    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 0)).await;
    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 1)).await;
    process_ping(&h.state, &ping("u1", near_museum, 40.0, 2)).await;
    process_ping(&h.state, &ping("u1", near_museum, 40.0, 3)).await;

    let mut received = Vec::new();
    while received.len() < 3 {
        let message = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .expect("delivered in time")
            .expect("message");
        if message.kind != VisitEventKind::VisitUpdate {
            let place = message.payload["visit"]["place_id"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            received.push((message.kind, place));
        }
    }
    assert_eq!(
        received,
        vec![
            (VisitEventKind::VisitStart, "museum".to_string()),
            (VisitEventKind::VisitEnd, "museum".to_string()),
            (VisitEventKind::VisitStart, "garden".to_string()),
        ]
    );
}

#[tokio::test]
async fn revision_conflicts_are_retried() {
    let store = Arc::new(ContendedStore {
        inner: MemoryVisitStateRepository::new(100),
        conflicts: AtomicU32::new(2),
    });
    let h = harness_with(
        DetectionSettingsDocument::default(),
        &[("louvre", LOUVRE)],
        store,
        None,
    )
    .await;

    let outcome = process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 0)).await;
    assert!(matches!(outcome, PingOutcome::Evaluated { .. }));
    assert_eq!(h.state.metrics.state_conflicts(), 2);
    assert!(user_state(&h.state, "u1").await.candidate_for("louvre").is_some());
}

#[tokio::test]
async fn exhausted_retries_fail_detection_but_keep_the_location() {
    let store = Arc::new(ContendedStore {
        inner: MemoryVisitStateRepository::new(100),
        conflicts: AtomicU32::new(10),
    });
    let h = harness_with(
        DetectionSettingsDocument::default(),
        &[("louvre", LOUVRE)],
        store,
        None,
    )
    .await;

    let payload = PingPayload {
        user_id: None,
        latitude: LOUVRE.0,
        longitude: LOUVRE.1,
        accuracy_meters: 10.0,
        timestamp_utc: Some(at(0)),
        source: None,
    };
    let summary = ingest_pings(&h.state, Some("u1".to_string()), vec![payload])
        .await
        .expect("ingest");
    assert_eq!(summary.recorded, 1);
    assert_eq!(summary.detection_failures, 1);
    assert_eq!(h.locations.rows_for("u1").await.len(), 1);
    assert_eq!(h.state.metrics.detection_failures(), 1);
    assert_eq!(h.state.metrics.state_conflicts(), 3);
}

#[tokio::test]
async fn place_index_failure_is_isolated_from_location_log() {
    let h = harness_with(
        DetectionSettingsDocument::default(),
        &[],
        Arc::new(MemoryVisitStateRepository::new(100)),
        Some(Arc::new(BrokenIndex)),
    )
    .await;

    let payload = PingPayload {
        user_id: Some("u1".to_string()),
        latitude: LOUVRE.0,
        longitude: LOUVRE.1,
        accuracy_meters: 10.0,
        timestamp_utc: Some(at(0)),
        source: Some("check-in".to_string()),
    };
    let summary = ingest_pings(&h.state, None, vec![payload]).await.expect("ingest");
    assert_eq!(summary.detection_failures, 1);
    let rows = h.locations.rows_for("u1").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source, "check-in");
}

#[tokio::test]
async fn concurrent_pings_for_one_user_keep_a_single_open_visit() {
    let h = harness(&[("louvre", LOUVRE)]).await;
    let mut tasks = Vec::new();
    for minute in 0..16 {
        let state = h.state.clone();
        tasks.push(tokio::spawn(async move {
            process_ping(&state, &ping("u1", LOUVRE, 10.0, minute)).await
        }));
    }
    for task in tasks {
        let outcome = task.await.expect("join");
        assert!(matches!(outcome, PingOutcome::Evaluated { .. }));
    }

    let state = user_state(&h.state, "u1").await;
    assert!(state.open_visit.is_some());
    assert!(state.candidates.is_empty());
    let visits = h.state.visit_store.list_visits("u1", 50).await.expect("visits");
    assert_eq!(visits.len(), 1);
    assert_eq!(h.state.metrics.visits_started(), 1);
    assert_eq!(h.state.metrics.state_conflicts(), 0);
}

#[tokio::test]
async fn users_are_detected_independently() {
    let h = harness(&[("louvre", LOUVRE)]).await;
    let mut tasks = Vec::new();
    for user in ["ana", "ben", "cleo", "dev"] {
        let state = h.state.clone();
        tasks.push(tokio::spawn(async move {
            process_ping(&state, &ping(user, LOUVRE, 10.0, 0)).await;
            process_ping(&state, &ping(user, LOUVRE, 10.0, 1)).await;
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }
    for user in ["ana", "ben", "cleo", "dev"] {
        let state = user_state(&h.state, user).await;
        assert_eq!(state.open_visit.map(|v| v.user_id), Some(user.to_string()));
    }
    assert_eq!(h.state.metrics.visits_started(), 4);
}

#[tokio::test]
async fn stream_subscribers_receive_visit_start() {
    let h = harness(&[("louvre", LOUVRE)]).await;
    let mut rx = h.state.stream_hub.subscribe("u1").await;

    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 0)).await;
    process_ping(&h.state, &ping("u1", LOUVRE, 10.0, 1)).await;

    let message = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
        .await
        .expect("delivered in time")
        .expect("message");
    assert_eq!(message.kind, VisitEventKind::VisitStart);
    assert_eq!(message.payload["visit"]["place_id"], "louvre");
    assert_eq!(message.payload["kind"], "visit-start");
}

#[tokio::test]
async fn effective_settings_follow_user_overrides() {
    let document = DetectionSettingsDocument {
        overrides: [(
            "walker".to_string(),
            DetectionSettingsOverride {
                visited_required_hits: Some(4),
                ..DetectionSettingsOverride::default()
            },
        )]
        .into_iter()
        .collect(),
        ..DetectionSettingsDocument::default()
    };
    let h = harness_with(
        document,
        &[],
        Arc::new(MemoryVisitStateRepository::new(100)),
        None,
    )
    .await;
    let walker: DetectionSettings = h.state.settings.get("walker").await;
    assert_eq!(walker.visited_required_hits, 4);
    assert_eq!(h.state.settings.get("someone").await.visited_required_hits, 2);
}
