//! Status-change subscription registry.
//!
//! Generalized from `baton::transport::notifier::ResourceNotifier`'s
//! "notify one subscribed session" shape into "notify every registered
//! callback for a tenant", since a session's status changes are consumed
//! by arbitrary admin-surface/webhook listeners rather than a single SSE
//! channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::session::SessionStatus;

/// Callback invoked on every status change for a tenant.
pub type StatusCallback = Box<dyn Fn(SessionStatus) + Send + Sync>;

/// Registry of status-change subscribers for a single tenant.
///
/// Callbacks fire synchronously in registration order; per spec section
/// 4.3, one callback panicking must not prevent the rest from firing, so
/// each call is wrapped in `catch_unwind`.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, StatusCallback)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback. Returns a subscriber id usable with
    /// `unsubscribe`.
    pub fn subscribe(&self, callback: StatusCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().unwrap().push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.callbacks.lock().unwrap().retain(|(cb_id, _)| *cb_id != id);
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every registered callback with the new status, in order.
    pub fn notify(&self, status: SessionStatus) {
        let callbacks = self.callbacks.lock().unwrap();
        for (id, callback) in callbacks.iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(status)));
            if let Err(_panic) = result {
                tracing::warn!(subscriber_id = id, "status subscriber panicked, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn notify_calls_all_subscribers_in_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        registry.subscribe(Box::new(move |_| o1.lock().unwrap().push(1)));
        let o2 = order.clone();
        registry.subscribe(Box::new(move |_| o2.lock().unwrap().push(2)));

        registry.notify(SessionStatus::Connected);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        let registry = SubscriptionRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let id = registry.subscribe(Box::new(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        registry.notify(SessionStatus::Connected);
        registry.unsubscribe(id);
        registry.notify(SessionStatus::Disconnected);

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panicking_callback_does_not_block_others() {
        let registry = SubscriptionRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        registry.subscribe(Box::new(|_| panic!("boom")));
        let c = count.clone();
        registry.subscribe(Box::new(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        registry.notify(SessionStatus::Failed);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
