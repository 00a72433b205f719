use std::collections::HashMap;

use async_trait::async_trait;
use backend_domain::ports::VisitPublisher;
use backend_domain::{VisitEventKind, VisitStreamMessage};
use tokio::sync::{broadcast, RwLock};

const CHANNEL_BUFFER: usize = 64;

/// Per-user broadcast channels feeding live subscribers.
#[derive(Default)]
pub struct VisitStreamHub {
    channels: RwLock<HashMap<String, broadcast::Sender<VisitStreamMessage>>>,
}

impl VisitStreamHub {
    pub async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<VisitStreamMessage> {
        let mut channels = self.channels.write().await;
        channels
            .entry(normalize_key(user_id))
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(CHANNEL_BUFFER);
                tx
            })
            .subscribe()
    }

    /// Returns the number of receivers reached. Channels nobody listens to
    /// are dropped instead of buffering.
    pub async fn broadcast(&self, message: VisitStreamMessage) -> usize {
        let key = normalize_key(&message.user_id);
        {
            let channels = self.channels.read().await;
            match channels.get(&key) {
                Some(tx) if tx.receiver_count() > 0 => {
                    return tx.send(message).unwrap_or(0);
                }
                None => return 0,
                Some(_) => {}
            }
        }
        let mut channels = self.channels.write().await;
        if channels
            .get(&key)
            .map(|tx| tx.receiver_count() == 0)
            .unwrap_or(false)
        {
            channels.remove(&key);
        }
        0
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[async_trait]
impl VisitPublisher for VisitStreamHub {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn publish(
        &self,
        user_id: &str,
        kind: VisitEventKind,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        self.broadcast(VisitStreamMessage {
            user_id: user_id.to_string(),
            kind,
            payload: payload.clone(),
        })
        .await;
        Ok(())
    }
}

fn normalize_key(user_id: &str) -> String {
    user_id.trim().to_string()
}
