//! In-process notification bus for the admin surface.
//!
//! Broadcasts administrative events to registered subscribers, keeps a bounded
//! newest-first history, and hands out RAII subscriptions for live streaming.
//!
//! Delivery semantics:
//! - `publish` updates the history first, then invokes every currently
//!   registered subscriber synchronously in subscription order before
//!   returning, so history and subscriber views agree at return.
//! - Subscribers registered after a publish never see that publish (no replay).
//! - Handlers must be non-blocking; a broken subscriber (e.g. a closed stream
//!   channel) never fails the publisher or its siblings.
//! - Handlers run on a snapshot taken outside the bus locks, so a handler may
//!   unsubscribe (itself included) or publish again without deadlocking.
//!
//! State is process-local: in a multi-instance deployment each process holds
//! an independent bus, which is an accepted scaling limitation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use ops_common::{AdminNotification, NotificationInput, Severity};

/// Bounded history length, oldest entries dropped beyond this.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

type Handler = Arc<dyn Fn(&AdminNotification) + Send + Sync>;

struct SubscriberEntry {
    id: u64,
    handler: Handler,
}

/// Publish/subscribe broadcast with bounded recent history.
pub struct NotificationBus {
    log: Mutex<VecDeque<AdminNotification>>,
    subscribers: Mutex<Vec<SubscriberEntry>>,
    next_subscriber_id: AtomicU64,
    capacity: usize,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
            capacity,
        }
    }

    /// Assigns id and timestamp, stores the notification, then fans it out.
    pub fn publish(&self, input: NotificationInput) -> AdminNotification {
        let notification = AdminNotification {
            id: Uuid::new_v4().to_string(),
            kind: input.kind,
            message: input.message,
            severity: input.severity.unwrap_or(Severity::Info),
            created_at: Utc::now(),
            read: false,
            data: input.data,
        };

        {
            let mut log = self.log.lock();
            log.push_front(notification.clone());
            while log.len() > self.capacity {
                log.pop_back();
            }
        }

        // Snapshot the handlers so none of the bus locks are held during
        // invocation; a handler may unsubscribe or publish again.
        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.lock();
            subscribers.iter().map(|entry| entry.handler.clone()).collect()
        };
        for handler in handlers {
            handler(&notification);
        }

        debug!(
            notification_id = %notification.id,
            kind = %notification.kind,
            "Published admin notification"
        );

        notification
    }

    /// Newest-first history, truncated to `limit`.
    pub fn list(&self, limit: usize) -> Vec<AdminNotification> {
        self.log.lock().iter().take(limit).cloned().collect()
    }

    /// Marks a notification read. Unknown ids are a silent no-op.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut log = self.log.lock();
        match log.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Registers a handler invoked for every future publish.
    ///
    /// The returned `Subscription` deregisters the handler when dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        handler: impl Fn(&AdminNotification) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(SubscriberEntry {
            id,
            handler: Arc::new(handler),
        });
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|entry| entry.id != id);
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability to deregister a subscriber; dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<NotificationBus>,
    id: u64,
}

impl Subscription {
    /// Explicit deregistration; equivalent to dropping the subscription.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(kind: &str) -> NotificationInput {
        NotificationInput::new(kind, "test message")
    }

    #[test]
    fn publish_assigns_id_timestamp_and_default_severity() {
        let bus = NotificationBus::new();
        let published = bus.publish(input("inventory.low"));

        assert_eq!(published.kind, "inventory.low");
        assert_eq!(published.severity, Severity::Info);
        assert!(!published.read);
        assert!(!published.id.is_empty());
    }

    #[test]
    fn subscribers_run_synchronously_in_subscription_order() {
        let bus = Arc::new(NotificationBus::new());
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = order.clone();
            bus.subscribe(move |_| order.lock().push("first"))
        };
        let second = {
            let order = order.clone();
            bus.subscribe(move |_| order.lock().push("second"))
        };

        bus.publish(input("order.created"));

        // Handlers ran exactly once each, in order, before publish returned.
        assert_eq!(*order.lock(), vec!["first", "second"]);

        drop(first);
        drop(second);
    }

    #[test]
    fn late_subscriber_sees_no_replay() {
        let bus = Arc::new(NotificationBus::new());
        bus.publish(input("before"));

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let seen = seen.clone();
            bus.subscribe(move |n| seen.lock().push(n.kind.clone()))
        };

        bus.publish(input("after"));
        assert_eq!(*seen.lock(), vec!["after".to_string()]);
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let bus = Arc::new(NotificationBus::new());
        let seen: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));

        let subscription = {
            let seen = seen.clone();
            bus.subscribe(move |_| *seen.lock() += 1)
        };
        bus.publish(input("one"));
        assert_eq!(bus.subscriber_count(), 1);

        subscription.cancel();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(input("two"));
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn list_is_newest_first_and_truncated() {
        let bus = NotificationBus::new();
        bus.publish(input("a"));
        bus.publish(input("b"));
        bus.publish(input("c"));

        let listed = bus.list(2);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].kind, "c");
        assert_eq!(listed[1].kind, "b");
    }

    #[test]
    fn history_is_bounded_dropping_the_oldest() {
        let bus = NotificationBus::new();
        for i in 0..(DEFAULT_HISTORY_CAPACITY + 1) {
            bus.publish(NotificationInput::new(format!("n-{}", i), "test message"));
        }

        assert_eq!(bus.len(), DEFAULT_HISTORY_CAPACITY);
        let listed = bus.list(DEFAULT_HISTORY_CAPACITY);
        assert_eq!(listed[0].kind, format!("n-{}", DEFAULT_HISTORY_CAPACITY));
        // The very first publish fell off the end.
        assert_eq!(listed.last().unwrap().kind, "n-1");
    }

    #[test]
    fn mark_read_flags_known_ids_and_ignores_unknown() {
        let bus = NotificationBus::new();
        let published = bus.publish(input("order.created"));

        assert!(bus.mark_read(&published.id));
        assert!(bus.list(1)[0].read);

        let before = bus.list(10);
        assert!(!bus.mark_read("no-such-id"));
        let after = bus.list(10);
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].id, after[0].id);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_publish() {
        let bus = Arc::new(NotificationBus::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let subscription = {
            let slot = slot.clone();
            bus.subscribe(move |_| {
                slot.lock().take();
            })
        };
        *slot.lock() = Some(subscription);

        bus.publish(input("order.created"));
        assert_eq!(bus.subscriber_count(), 0);

        // A second publish reaches no one.
        bus.publish(input("order.created"));
        assert!(slot.lock().is_none());
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = Arc::new(NotificationBus::new());
        let _subscription = {
            let bus = bus.clone();
            bus.clone().subscribe(move |n| {
                if n.kind == "order.created" {
                    bus.publish(NotificationInput::new("audit.recorded", "follow-up"));
                }
            })
        };

        bus.publish(input("order.created"));

        let listed = bus.list(2);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].kind, "audit.recorded");
        assert_eq!(listed[1].kind, "order.created");
    }

    #[test]
    fn broken_subscriber_does_not_affect_siblings() {
        let bus = Arc::new(NotificationBus::new());
        let (tx, rx) = std::sync::mpsc::channel::<String>();
        drop(rx); // the stream side went away

        let _dead = bus.subscribe(move |n| {
            let _ = tx.send(n.kind.clone());
        });

        let seen: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let _live = {
            let seen = seen.clone();
            bus.subscribe(move |_| *seen.lock() += 1)
        };

        bus.publish(input("order.created"));
        assert_eq!(*seen.lock(), 1);
    }
}
