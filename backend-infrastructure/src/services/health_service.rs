use std::sync::Arc;

use async_trait::async_trait;
use backend_domain::ports::{HealthCheckService, LocationRepository, PlaceIndex};

pub struct DefaultHealthService {
    location_repo: Arc<dyn LocationRepository>,
    place_index: Arc<dyn PlaceIndex>,
}

impl DefaultHealthService {
    pub fn new(location_repo: Arc<dyn LocationRepository>, place_index: Arc<dyn PlaceIndex>) -> Self {
        Self {
            location_repo,
            place_index,
        }
    }
}

#[async_trait]
impl HealthCheckService for DefaultHealthService {
    async fn check_database(&self) -> anyhow::Result<bool> {
        self.location_repo.ping().await.map(|_| true)
    }

    /// An empty index is reported, not treated as an error.
    async fn check_place_index(&self) -> anyhow::Result<bool> {
        Ok(self.place_index.place_count().await > 0)
    }
}
