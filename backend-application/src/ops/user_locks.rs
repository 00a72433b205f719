use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per user. Pings for the same user are serialized
/// through the whole read-sweep-update-commit sequence; different users
/// never contend.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                locks.retain(|_, weak| weak.strong_count() > 0);
            }
            match locks.get(user_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(user_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    pub async fn tracked_users(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
