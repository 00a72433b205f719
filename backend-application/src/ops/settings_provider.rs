use std::sync::Arc;
use std::time::{Duration, Instant};

use backend_domain::ports::SettingsRepository;
use backend_domain::{DetectionSettings, DetectionSettingsDocument};
use tokio::sync::RwLock;
use tracing::warn;

struct CachedDocument {
    document: Arc<DetectionSettingsDocument>,
    loaded_at: Instant,
}

/// Read-through cache over the persisted settings document. Each ping gets
/// an owned snapshot, so a reload never changes settings mid-evaluation.
pub struct SettingsProvider {
    repo: Arc<dyn SettingsRepository>,
    ttl: Duration,
    cached: RwLock<Option<CachedDocument>>,
}

impl SettingsProvider {
    pub fn new(repo: Arc<dyn SettingsRepository>, ttl: Duration) -> Self {
        Self {
            repo,
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub async fn get(&self, user_id: &str) -> DetectionSettings {
        self.document().await.resolve(user_id)
    }

    pub async fn document(&self) -> Arc<DetectionSettingsDocument> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.loaded_at.elapsed() < self.ttl {
                    return entry.document.clone();
                }
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(entry) = cached.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return entry.document.clone();
            }
        }
        let document = match self.repo.load_detection_settings().await {
            Ok(document) => match document.validate() {
                Ok(()) => Arc::new(document),
                Err(err) => {
                    warn!("detection settings invalid, keeping previous: {}", err);
                    fallback(cached.as_ref())
                }
            },
            Err(err) => {
                warn!("failed to load detection settings, keeping previous: {}", err);
                fallback(cached.as_ref())
            }
        };
        *cached = Some(CachedDocument {
            document: document.clone(),
            loaded_at: Instant::now(),
        });
        document
    }

    pub async fn replace(&self, document: DetectionSettingsDocument) -> anyhow::Result<()> {
        self.repo.save_detection_settings(&document).await?;
        *self.cached.write().await = Some(CachedDocument {
            document: Arc::new(document),
            loaded_at: Instant::now(),
        });
        Ok(())
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

fn fallback(previous: Option<&CachedDocument>) -> Arc<DetectionSettingsDocument> {
    previous
        .map(|entry| entry.document.clone())
        .unwrap_or_else(|| Arc::new(DetectionSettingsDocument::default()))
}
