//! Channel-wide turn serialization
//!
//! At most one conversation turn is active at a time. Waiters are admitted in
//! the order they asked.

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::transport::SpeakerId;

#[derive(Default)]
pub struct AttentionLock {
    turn: Mutex<()>,
    holder: SyncMutex<Option<SpeakerId>>,
}

impl AttentionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `speaker` holds the channel's attention
    pub async fn acquire(&self, speaker: &SpeakerId) -> AttentionGuard<'_> {
        let guard = match self.turn.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let current = self.holder();
                info!(
                    "{} waiting for attention (held by {})",
                    speaker,
                    current.as_ref().map_or("unknown", SpeakerId::as_str)
                );
                self.turn.lock().await
            }
        };

        *self.holder.lock() = Some(speaker.clone());
        debug!("Attention granted to {}", speaker);

        AttentionGuard {
            _turn: guard,
            holder: &self.holder,
        }
    }

    /// Speaker whose turn is active, if any
    pub fn holder(&self) -> Option<SpeakerId> {
        self.holder.lock().clone()
    }

    pub fn is_held(&self) -> bool {
        self.turn.try_lock().is_err()
    }
}

/// Releases the attention lock when dropped
pub struct AttentionGuard<'a> {
    _turn: MutexGuard<'a, ()>,
    holder: &'a SyncMutex<Option<SpeakerId>>,
}

impl Drop for AttentionGuard<'_> {
    fn drop(&mut self) {
        if let Some(speaker) = self.holder.lock().take() {
            debug!("Attention released by {}", speaker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_holder_tracking() {
        let lock = AttentionLock::new();
        assert!(!lock.is_held());

        let alice = SpeakerId::from("alice");
        let guard = lock.acquire(&alice).await;
        assert!(lock.is_held());
        assert_eq!(lock.holder(), Some(alice));

        drop(guard);
        assert!(!lock.is_held());
        assert_eq!(lock.holder(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turns_are_serialized_in_order() {
        let lock = Arc::new(AttentionLock::new());
        let order = Arc::new(SyncMutex::new(Vec::new()));

        let first = lock.acquire(&SpeakerId::from("alice")).await;

        let mut waiters = Vec::new();
        for name in ["bob", "carol"] {
            let lock = lock.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                let speaker = SpeakerId::from(name);
                let _guard = lock.acquire(&speaker).await;
                order.lock().push(name);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }));
            // Let the waiter queue up before spawning the next one
            tokio::task::yield_now().await;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(order.lock().is_empty());

        drop(first);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(*order.lock(), vec!["bob", "carol"]);
    }
}
