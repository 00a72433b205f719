use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use backend_domain::ports::VisitPublisher;
use backend_domain::VisitEventKind;
use tracing::warn;

/// Publishes to every target; one failing target does not stop the others.
pub struct FanoutPublisher {
    targets: Vec<Arc<dyn VisitPublisher>>,
}

impl FanoutPublisher {
    pub fn new(targets: Vec<Arc<dyn VisitPublisher>>) -> Self {
        Self { targets }
    }

    pub fn target_names(&self) -> Vec<&'static str> {
        self.targets.iter().map(|target| target.name()).collect()
    }
}

#[async_trait]
impl VisitPublisher for FanoutPublisher {
    fn name(&self) -> &'static str {
        "fanout"
    }

    async fn publish(
        &self,
        user_id: &str,
        kind: VisitEventKind,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut failed = Vec::new();
        for target in &self.targets {
            if let Err(err) = target.publish(user_id, kind, payload).await {
                warn!(
                    "publisher '{}' failed for user {} ({}): {}",
                    target.name(),
                    user_id,
                    kind.as_str(),
                    err
                );
                failed.push(target.name());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("publish failed for: {}", failed.join(", ")))
        }
    }
}
