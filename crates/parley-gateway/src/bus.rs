use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use parley_types::events::DeliveryEvent;

/// In-process publish/subscribe keyed by recipient user id.
///
/// Delivery is best-effort and only to currently-registered subscriptions; a
/// disconnected recipient misses the push and recovers via fetch on reconnect.
/// One user may hold any number of simultaneous subscriptions (tabs, devices).
///
/// The bus is an injectable instance, cheap to clone. A multi-process
/// deployment would swap this for an external broker carrying the same
/// `DeliveryEvent` shape; nothing above the bus would change.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    /// user_id -> live subscriptions, in subscription order
    subscribers: RwLock<HashMap<i64, Vec<Subscription>>>,
    next_id: AtomicU64,
}

struct Subscription {
    id: u64,
    tx: mpsc::UnboundedSender<DeliveryEvent>,
}

/// Handle returned by `subscribe`; pass it back to `unsubscribe` on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken {
    user_id: i64,
    id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register one logical client connection for `user_id`.
    pub async fn subscribe(
        &self,
        user_id: i64,
    ) -> (SubscriptionToken, mpsc::UnboundedReceiver<DeliveryEvent>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner
            .subscribers
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push(Subscription { id, tx });

        debug!("user {} subscribed (token {})", user_id, id);
        (SubscriptionToken { user_id, id }, rx)
    }

    /// Idempotent removal; a token that was already removed is a no-op.
    pub async fn unsubscribe(&self, token: SubscriptionToken) {
        let mut subs = self.inner.subscribers.write().await;
        if let Some(list) = subs.get_mut(&token.user_id) {
            list.retain(|s| s.id != token.id);
            if list.is_empty() {
                subs.remove(&token.user_id);
            }
        }
    }

    /// Deliver `event` to every live subscription for `user_id`, in
    /// subscription order. A failed send (receiver dropped mid-disconnect) is
    /// logged and skipped; it never aborts fan-out to the remaining
    /// subscriptions.
    pub async fn publish(&self, user_id: i64, event: DeliveryEvent) {
        let subs = self.inner.subscribers.read().await;
        let Some(list) = subs.get(&user_id) else {
            return;
        };
        for sub in list {
            if sub.tx.send(event.clone()).is_err() {
                warn!(
                    "dropping event for user {}: subscription {} is gone",
                    user_id, sub.id
                );
            }
        }
    }

    /// Number of live subscriptions for a user.
    pub async fn subscription_count(&self, user_id: i64) -> usize {
        self.inner
            .subscribers
            .read()
            .await
            .get(&user_id)
            .map_or(0, |l| l.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::models::ChatRef;

    fn typing_event() -> DeliveryEvent {
        DeliveryEvent::Typing {
            chat: ChatRef::Direct(1),
            user_id: 7,
            username: "ann".into(),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn fan_out_to_all_subscriptions_of_a_user() {
        let bus = EventBus::new();
        let (_t1, mut rx1) = bus.subscribe(1).await;
        let (_t2, mut rx2) = bus.subscribe(1).await;
        let (_t3, mut rx3) = bus.subscribe(2).await;

        bus.publish(1, typing_event()).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());

        // Exactly once per subscription
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_absent_user_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(42, typing_event()).await;
    }

    #[tokio::test]
    async fn dead_subscription_does_not_block_the_rest() {
        let bus = EventBus::new();
        let (_t1, rx1) = bus.subscribe(1).await;
        let (_t2, mut rx2) = bus.subscribe(1).await;
        drop(rx1);

        bus.publish(1, typing_event()).await;
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let (t1, mut rx1) = bus.subscribe(1).await;
        assert_eq!(bus.subscription_count(1).await, 1);

        bus.unsubscribe(t1).await;
        bus.unsubscribe(t1).await;
        assert_eq!(bus.subscription_count(1).await, 0);

        bus.publish(1, typing_event()).await;
        assert!(rx1.try_recv().is_err());
    }
}
