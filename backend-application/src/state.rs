use std::sync::Arc;

use backend_domain::ports::{
    HealthCheckService,
    LocationRepository,
    PlaceIndex,
    VisitStateRepository,
    VisitTransitionRepository,
};
use backend_domain::RuntimeConfig;

use crate::ops::{SettingsProvider, UserLocks, VisitPublishQueue, VisitStreamHub};
use crate::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: RuntimeConfig,
    pub location_repo: Arc<dyn LocationRepository>,
    pub visit_store: Arc<dyn VisitStateRepository>,
    pub transition_repo: Arc<dyn VisitTransitionRepository>,
    pub settings: Arc<SettingsProvider>,
    pub place_index: Arc<dyn PlaceIndex>,
    /// Per-user ordered delivery to the stream hub and any configured webhook.
    pub publish_queue: Arc<VisitPublishQueue>,
    pub stream_hub: Arc<VisitStreamHub>,
    pub health: Arc<dyn HealthCheckService>,
    pub user_locks: Arc<UserLocks>,
    pub metrics: Arc<Metrics>,
}
