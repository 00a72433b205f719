use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use backend_domain::{
    GeoPing,
    LocationRepository,
    LocationRow,
    PlaceVisitCandidate,
    PlaceVisitEvent,
    StateStoreError,
    UserVisitState,
    VisitStateCommit,
    VisitStateRepository,
    VisitTransitionRepository,
    VisitTransitionRow,
};

use crate::repositories::clickhouse_repo::location_row;

#[derive(Debug, Default)]
struct StoredUser {
    revision: u64,
    candidates: Vec<PlaceVisitCandidate>,
    open_visit: Option<PlaceVisitEvent>,
    /// Newest first.
    closed_visits: VecDeque<PlaceVisitEvent>,
}

/// Process-local visit state with optimistic revision checks. Keeps at most
/// `history_limit` closed visits per user.
pub struct MemoryVisitStateRepository {
    history_limit: usize,
    users: RwLock<HashMap<String, StoredUser>>,
}

impl MemoryVisitStateRepository {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            users: RwLock::new(HashMap::new()),
        }
    }
}

fn check_commit(user_id: &str, commit: &VisitStateCommit) -> Result<()> {
    let mut places = HashSet::new();
    for candidate in &commit.candidates {
        if candidate.user_id != user_id {
            return Err(anyhow!("candidate '{}' belongs to another user", candidate.id));
        }
        if !places.insert(candidate.place_id.as_str()) {
            return Err(anyhow!("duplicate candidate for place '{}'", candidate.place_id));
        }
    }
    if let Some(open) = &commit.open_visit {
        if !open.is_open() {
            return Err(anyhow!("open visit '{}' carries an end time", open.id));
        }
    }
    if commit.closed_visits.iter().any(PlaceVisitEvent::is_open) {
        return Err(anyhow!("closed visit without end time"));
    }
    Ok(())
}

#[async_trait]
impl VisitStateRepository for MemoryVisitStateRepository {
    async fn load_user_state(&self, user_id: &str) -> Result<UserVisitState> {
        let users = self.users.read().await;
        Ok(match users.get(user_id) {
            Some(stored) => UserVisitState {
                user_id: user_id.to_string(),
                revision: stored.revision,
                candidates: stored.candidates.clone(),
                open_visit: stored.open_visit.clone(),
            },
            None => UserVisitState::empty(user_id),
        })
    }

    async fn commit_user_state(
        &self,
        user_id: &str,
        commit: VisitStateCommit,
    ) -> Result<u64, StateStoreError> {
        check_commit(user_id, &commit)?;
        let mut users = self.users.write().await;
        let stored = users.entry(user_id.to_string()).or_default();
        if stored.revision != commit.expected_revision {
            return Err(StateStoreError::Conflict {
                expected: commit.expected_revision,
                actual: stored.revision,
            });
        }
        stored.revision += 1;
        stored.candidates = commit.candidates;
        stored.open_visit = commit.open_visit;
        for closed in commit.closed_visits {
            stored.closed_visits.push_front(closed);
        }
        stored.closed_visits.truncate(self.history_limit);
        Ok(stored.revision)
    }

    async fn list_visits(&self, user_id: &str, limit: usize) -> Result<Vec<PlaceVisitEvent>> {
        let users = self.users.read().await;
        let Some(stored) = users.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(stored
            .open_visit
            .iter()
            .chain(stored.closed_visits.iter())
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Bounded ring of raw locations for the `memory` storage backend.
pub struct MemoryLocationRepository {
    limit: usize,
    rows: RwLock<VecDeque<LocationRow>>,
}

impl MemoryLocationRepository {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            rows: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn rows_for(&self, user_id: &str) -> Vec<LocationRow> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LocationRepository for MemoryLocationRepository {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_location(&self, ping: &GeoPing) -> Result<()> {
        let mut rows = self.rows.write().await;
        rows.push_back(location_row(ping));
        while rows.len() > self.limit {
            rows.pop_front();
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MemoryTransitionRepository {
    limit: usize,
    rows: RwLock<VecDeque<VisitTransitionRow>>,
}

impl MemoryTransitionRepository {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            rows: RwLock::new(VecDeque::new()),
        }
    }
}

fn date_key(value: OffsetDateTime) -> String {
    let date = value.date();
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

#[async_trait]
impl VisitTransitionRepository for MemoryTransitionRepository {
    async fn insert_transitions(&self, rows: &[VisitTransitionRow]) -> Result<()> {
        let mut stored = self.rows.write().await;
        stored.extend(rows.iter().cloned());
        while stored.len() > self.limit {
            stored.pop_front();
        }
        Ok(())
    }

    async fn fetch_transitions(
        &self,
        date: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VisitTransitionRow>> {
        let stored = self.rows.read().await;
        let mut rows = stored
            .iter()
            .filter(|row| date_key(row.event_time) == date)
            .filter(|row| user_id.map(|id| row.user_id == id).unwrap_or(true))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.event_time.cmp(&a.event_time));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn visit(id: &str, user_id: &str, ended: bool) -> PlaceVisitEvent {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        PlaceVisitEvent {
            id: id.to_string(),
            user_id: user_id.to_string(),
            place_id: Some(format!("place-{}", id)),
            arrived_at_utc: at,
            last_seen_at_utc: at,
            ended_at_utc: ended.then_some(at),
            trip_id_snapshot: None,
            trip_name_snapshot: None,
            region_name_snapshot: None,
            place_name_snapshot: None,
            place_notes_snapshot: None,
            last_notified_at_utc: None,
        }
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let store = MemoryVisitStateRepository::new(10);
        let first = store.load_user_state("u1").await.expect("load");
        let second = store.load_user_state("u1").await.expect("load");

        let revision = store
            .commit_user_state(
                "u1",
                VisitStateCommit {
                    expected_revision: first.revision,
                    ..VisitStateCommit::default()
                },
            )
            .await
            .expect("first commit");
        assert_eq!(revision, 1);

        let err = store
            .commit_user_state(
                "u1",
                VisitStateCommit {
                    expected_revision: second.revision,
                    ..VisitStateCommit::default()
                },
            )
            .await
            .expect_err("stale");
        assert!(matches!(
            err,
            StateStoreError::Conflict {
                expected: 0,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn lists_open_then_closed_newest_first_within_history() {
        let store = MemoryVisitStateRepository::new(2);
        for (revision, id) in ["a", "b", "c"].iter().enumerate() {
            store
                .commit_user_state(
                    "u1",
                    VisitStateCommit {
                        expected_revision: revision as u64,
                        closed_visits: vec![visit(id, "u1", true)],
                        ..VisitStateCommit::default()
                    },
                )
                .await
                .expect("commit");
        }
        store
            .commit_user_state(
                "u1",
                VisitStateCommit {
                    expected_revision: 3,
                    open_visit: Some(visit("d", "u1", false)),
                    ..VisitStateCommit::default()
                },
            )
            .await
            .expect("commit");

        let ids = store
            .list_visits("u1", 10)
            .await
            .expect("list")
            .into_iter()
            .map(|v| v.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["d", "c", "b"]);
    }

    #[tokio::test]
    async fn rejects_open_visit_in_closed_list() {
        let store = MemoryVisitStateRepository::new(10);
        let err = store
            .commit_user_state(
                "u1",
                VisitStateCommit {
                    closed_visits: vec![visit("x", "u1", false)],
                    ..VisitStateCommit::default()
                },
            )
            .await
            .expect_err("invalid");
        assert!(matches!(err, StateStoreError::Backend(_)));
    }

    #[tokio::test]
    async fn location_buffer_is_bounded() {
        let repo = MemoryLocationRepository::new(2);
        for minute in 0..3 {
            let ping = GeoPing {
                user_id: "u1".to_string(),
                latitude: 1.0,
                longitude: 2.0,
                accuracy_meters: 5.0,
                timestamp_utc: Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap(),
                source: Default::default(),
            };
            repo.insert_location(&ping).await.expect("insert");
        }
        assert_eq!(repo.len().await, 2);
    }
}
