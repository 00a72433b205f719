use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backend_domain::ports::VisitPublisher;
use backend_domain::VisitTransition;
use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::Metrics;

const WORKER_IDLE: Duration = Duration::from_secs(30);

type Workers = Arc<Mutex<HashMap<String, UnboundedSender<Vec<VisitTransition>>>>>;

/// Delivers visit transitions per user in the order they were committed.
///
/// Each user with pending notifications has one worker draining its queue,
/// so a slow publisher delays later notifications instead of overtaking
/// them. A worker that stays idle unregisters itself; the next batch for
/// that user starts a fresh one.
pub struct VisitPublishQueue {
    publisher: Arc<dyn VisitPublisher>,
    metrics: Arc<Metrics>,
    workers: Workers,
    idle_after: Duration,
}

impl VisitPublishQueue {
    pub fn new(publisher: Arc<dyn VisitPublisher>, metrics: Arc<Metrics>) -> Self {
        Self::with_idle_timeout(publisher, metrics, WORKER_IDLE)
    }

    pub fn with_idle_timeout(
        publisher: Arc<dyn VisitPublisher>,
        metrics: Arc<Metrics>,
        idle_after: Duration,
    ) -> Self {
        Self {
            publisher,
            metrics,
            workers: Arc::new(Mutex::new(HashMap::new())),
            idle_after,
        }
    }

    /// Call while holding the user's detection lock: queue order is
    /// delivery order.
    pub async fn enqueue(&self, user_id: &str, transitions: Vec<VisitTransition>) {
        if transitions.is_empty() {
            return;
        }
        let mut workers = self.workers.lock().await;
        let transitions = match workers.get(user_id) {
            Some(sender) => match sender.send(transitions) {
                Ok(()) => return,
                Err(mpsc::error::SendError(transitions)) => transitions,
            },
            None => transitions,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        if sender.send(transitions).is_err() {
            warn!("publish queue for {} closed before start", user_id);
            return;
        }
        workers.insert(user_id.to_string(), sender);
        tokio::spawn(run_worker(
            user_id.to_string(),
            receiver,
            self.workers.clone(),
            self.publisher.clone(),
            self.metrics.clone(),
            self.idle_after,
        ));
    }

    pub async fn active_workers(&self) -> usize {
        self.workers.lock().await.len()
    }
}

async fn run_worker(
    user_id: String,
    mut receiver: UnboundedReceiver<Vec<VisitTransition>>,
    workers: Workers,
    publisher: Arc<dyn VisitPublisher>,
    metrics: Arc<Metrics>,
    idle_after: Duration,
) {
    loop {
        let batch = match tokio::time::timeout(idle_after, receiver.recv()).await {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(_) => {
                // enqueue sends under the same lock, nothing slips in after the check
                let mut registry = workers.lock().await;
                match receiver.try_recv() {
                    Ok(batch) => batch,
                    Err(_) => {
                        registry.remove(&user_id);
                        debug!("publish worker for {} idle, stopping", user_id);
                        break;
                    }
                }
            }
        };
        deliver(publisher.as_ref(), &metrics, batch).await;
    }
}

async fn deliver(publisher: &dyn VisitPublisher, metrics: &Metrics, transitions: Vec<VisitTransition>) {
    for transition in transitions {
        let notification = transition.to_notification(Utc::now());
        let payload = match serde_json::to_value(&notification) {
            Ok(value) => value,
            Err(err) => {
                metrics.record_publish_failure();
                warn!("failed to encode visit notification: {}", err);
                continue;
            }
        };
        if let Err(err) = publisher
            .publish(&notification.user_id, notification.kind, &payload)
            .await
        {
            metrics.record_publish_failure();
            warn!(
                "visit notification {} for {} not delivered: {}",
                notification.kind.as_str(),
                notification.user_id,
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use backend_domain::{PlaceVisitEvent, VisitEndReason, VisitEventKind};

    /// Holds visit-start notifications longer than anything else.
    #[derive(Default)]
    struct SlowStarts {
        delivered: StdMutex<Vec<(String, VisitEventKind, String)>>,
    }

    #[async_trait]
    impl VisitPublisher for SlowStarts {
        fn name(&self) -> &'static str {
            "slow-starts"
        }

        async fn publish(
            &self,
            user_id: &str,
            kind: VisitEventKind,
            payload: &serde_json::Value,
        ) -> anyhow::Result<()> {
            if kind == VisitEventKind::VisitStart {
                tokio::time::sleep(Duration::from_millis(40)).await;
            }
            let visit_id = payload["visit"]["id"].as_str().unwrap_or_default().to_string();
            self.delivered
                .lock()
                .unwrap()
                .push((user_id.to_string(), kind, visit_id));
            Ok(())
        }
    }

    impl SlowStarts {
        fn delivered(&self) -> Vec<(String, VisitEventKind, String)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    fn visit(user_id: &str, id: &str, place_id: &str) -> PlaceVisitEvent {
        let arrived = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        PlaceVisitEvent {
            id: id.to_string(),
            user_id: user_id.to_string(),
            place_id: Some(place_id.to_string()),
            arrived_at_utc: arrived,
            last_seen_at_utc: arrived,
            ended_at_utc: None,
            trip_id_snapshot: None,
            trip_name_snapshot: None,
            region_name_snapshot: None,
            place_name_snapshot: Some(place_id.to_string()),
            place_notes_snapshot: None,
            last_notified_at_utc: None,
        }
    }

    async fn wait_for(publisher: &SlowStarts, count: usize) -> Vec<(String, VisitEventKind, String)> {
        for _ in 0..100 {
            let delivered = publisher.delivered();
            if delivered.len() >= count {
                return delivered;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        publisher.delivered()
    }

    #[tokio::test]
    async fn slow_start_is_not_overtaken_by_later_end() {
        let publisher = Arc::new(SlowStarts::default());
        let queue = VisitPublishQueue::new(publisher.clone(), Arc::new(Metrics::default()));

        let museum = visit("u1", "v1", "museum");
        let mut closed = museum.clone();
        closed.ended_at_utc = Some(museum.arrived_at_utc);
        queue
            .enqueue("u1", vec![VisitTransition::Started(museum)])
            .await;
        queue
            .enqueue(
                "u1",
                vec![
                    VisitTransition::Ended {
                        event: closed,
                        reason: VisitEndReason::ForcedDeparture,
                    },
                    VisitTransition::Started(visit("u1", "v2", "garden")),
                ],
            )
            .await;

        let delivered = wait_for(&publisher, 3).await;
        let order = delivered
            .iter()
            .map(|(_, kind, id)| (*kind, id.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                (VisitEventKind::VisitStart, "v1"),
                (VisitEventKind::VisitEnd, "v1"),
                (VisitEventKind::VisitStart, "v2"),
            ]
        );
    }

    #[tokio::test]
    async fn users_have_separate_workers() {
        let publisher = Arc::new(SlowStarts::default());
        let queue = VisitPublishQueue::new(publisher.clone(), Arc::new(Metrics::default()));

        queue
            .enqueue("u1", vec![VisitTransition::Started(visit("u1", "v1", "museum"))])
            .await;
        queue
            .enqueue("u2", vec![VisitTransition::Started(visit("u2", "v2", "garden"))])
            .await;
        assert_eq!(queue.active_workers().await, 2);

        let delivered = wait_for(&publisher, 2).await;
        assert_eq!(delivered.len(), 2);
    }

    #[tokio::test]
    async fn idle_worker_stops_and_restarts_on_demand() {
        let publisher = Arc::new(SlowStarts::default());
        let queue = VisitPublishQueue::with_idle_timeout(
            publisher.clone(),
            Arc::new(Metrics::default()),
            Duration::from_millis(20),
        );

        queue
            .enqueue("u1", vec![VisitTransition::Started(visit("u1", "v1", "museum"))])
            .await;
        wait_for(&publisher, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.active_workers().await, 0);

        queue
            .enqueue("u1", vec![VisitTransition::Started(visit("u1", "v2", "garden"))])
            .await;
        let delivered = wait_for(&publisher, 2).await;
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[1].2, "v2");
    }

    #[tokio::test]
    async fn empty_batch_starts_no_worker() {
        let queue = VisitPublishQueue::new(
            Arc::new(SlowStarts::default()),
            Arc::new(Metrics::default()),
        );
        queue.enqueue("u1", Vec::new()).await;
        assert_eq!(queue.active_workers().await, 0);
    }
}
