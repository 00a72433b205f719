use async_trait::async_trait;

use crate::value_objects::VisitEventKind;

/// Live notification seam. Implementations may fail; callers treat every
/// failure as best-effort and never let it fail ping processing.
#[async_trait]
pub trait VisitPublisher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn publish(
        &self,
        user_id: &str,
        kind: VisitEventKind,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait HealthCheckService: Send + Sync {
    async fn check_database(&self) -> anyhow::Result<bool>;
    async fn check_place_index(&self) -> anyhow::Result<bool>;
}
