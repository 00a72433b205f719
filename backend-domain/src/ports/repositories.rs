use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{
    DetectionSettingsDocument,
    GeoPing,
    PlaceCatalog,
    PlaceMatch,
    PlaceVisitEvent,
    UserVisitState,
    VisitStateCommit,
    VisitTransitionRow,
};

/// Raw location log. Written before detection runs.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn ensure_schema(&self) -> anyhow::Result<()>;
    async fn insert_location(&self, ping: &GeoPing) -> anyhow::Result<()>;
    async fn ping(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait VisitTransitionRepository: Send + Sync {
    async fn insert_transitions(&self, rows: &[VisitTransitionRow]) -> anyhow::Result<()>;
    async fn fetch_transitions(
        &self,
        date: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<VisitTransitionRow>>;
}

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("revision conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Per-user candidate and visit storage with optimistic revision checks.
#[async_trait]
pub trait VisitStateRepository: Send + Sync {
    async fn load_user_state(&self, user_id: &str) -> anyhow::Result<UserVisitState>;

    /// Persists `commit` if the stored revision still equals
    /// `commit.expected_revision`; returns the new revision.
    async fn commit_user_state(
        &self,
        user_id: &str,
        commit: VisitStateCommit,
    ) -> Result<u64, StateStoreError>;

    /// Open visit first, then closed visits newest-first.
    async fn list_visits(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<PlaceVisitEvent>>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load_detection_settings(&self) -> anyhow::Result<DetectionSettingsDocument>;
    async fn save_detection_settings(&self, document: &DetectionSettingsDocument) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PlaceCatalogRepository: Send + Sync {
    async fn load_place_catalog(&self) -> anyhow::Result<PlaceCatalog>;
}

/// Read-only spatial lookup over the place catalog.
#[async_trait]
pub trait PlaceIndex: Send + Sync {
    /// Places within `radius_meters` of the point, nearest first.
    async fn find_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> anyhow::Result<Vec<PlaceMatch>>;

    /// Re-reads the backing catalog; returns the number of indexed places.
    async fn reload(&self) -> anyhow::Result<usize>;

    async fn place_count(&self) -> usize;
}
