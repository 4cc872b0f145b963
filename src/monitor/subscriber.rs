// SPDX-License-Identifier: Apache-2.0

//! Event subscribers.
//!
//! A monitor awaits each matching subscriber in line order before moving on,
//! so a handler that does slow I/O stalls that connection's polling. Such
//! handlers should hand events to their own queue; [`QueueSubscriber`] does
//! exactly that over a bounded channel.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::bounded_channel::{self, BoundedReceiver, BoundedSender, SendError};
use crate::monitor::event::{Event, EventKind};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn on_event(&self, event: &Event) -> Result<(), BoxError>;
}

/// Which events a subscriber is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Kind(EventKind),
    All,
}

impl Subscription {
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            Subscription::Kind(k) => *k == kind,
            Subscription::All => kind != EventKind::Unknown,
        }
    }
}

impl From<EventKind> for Subscription {
    fn from(kind: EventKind) -> Self {
        Subscription::Kind(kind)
    }
}

/// Subscribers in registration order. Cheap to clone.
#[derive(Clone, Default)]
pub struct SubscriberSet {
    entries: Vec<(Subscription, Arc<dyn Subscriber>)>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription, subscriber: Arc<dyn Subscriber>) {
        self.entries.push((subscription, subscriber));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver `event` to every matching subscriber, in registration order.
    ///
    /// Handler errors are logged and never stop delivery to the rest. Returns
    /// the number of handlers that accepted the event.
    pub async fn dispatch(&self, connection_id: &str, event: &Event) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        for (subscription, subscriber) in &self.entries {
            if !subscription.matches(kind) {
                continue;
            }
            match subscriber.on_event(event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(connection_id, kind = %kind, error = %e, "Subscriber failed to handle event");
                }
            }
        }
        delivered
    }
}

/// Behavior of a [`QueueSubscriber`] whose queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Wait for the consumer to make room
    Block,
    /// Drop the event and log a warning
    DropNewest,
}

/// Forwards events into a bounded channel drained by another task.
pub struct QueueSubscriber {
    tx: BoundedSender<Event>,
    mode: QueueMode,
}

impl QueueSubscriber {
    /// A queue that applies backpressure to the monitor when full.
    pub fn new(capacity: usize) -> (Self, BoundedReceiver<Event>) {
        Self::with_mode(capacity, QueueMode::Block)
    }

    /// A queue that drops events instead of blocking the monitor.
    pub fn lossy(capacity: usize) -> (Self, BoundedReceiver<Event>) {
        Self::with_mode(capacity, QueueMode::DropNewest)
    }

    fn with_mode(capacity: usize, mode: QueueMode) -> (Self, BoundedReceiver<Event>) {
        let (tx, rx) = bounded_channel::bounded(capacity.max(1));
        (Self { tx, mode }, rx)
    }
}

#[async_trait]
impl Subscriber for QueueSubscriber {
    async fn on_event(&self, event: &Event) -> Result<(), BoxError> {
        match self.mode {
            QueueMode::Block => self.tx.send(event.clone()).await?,
            QueueMode::DropNewest => match self.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(SendError::Full) => {
                    warn!(kind = %event.kind(), "Event queue full, dropping event");
                }
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }
}

/// Adapts a synchronous closure into a [`Subscriber`].
pub struct FnSubscriber<F> {
    f: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&Event) -> Result<(), BoxError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&Event) -> Result<(), BoxError> + Send + Sync,
{
    async fn on_event(&self, event: &Event) -> Result<(), BoxError> {
        (self.f)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn chat(msg: &str) -> Event {
        Event::Chat(crate::monitor::event::ChatEvent {
            timestamp: "2026.01.31-04.47.53:825".to_string(),
            channel: "Global".to_string(),
            player: "PlayerOne".to_string(),
            steam_id: "76561198000000001".to_string(),
            message: msg.to_string(),
            raw_line: msg.to_string(),
        })
    }

    #[test]
    fn test_subscription_matches() {
        assert!(Subscription::All.matches(EventKind::Death));
        assert!(!Subscription::All.matches(EventKind::Unknown));
        assert!(Subscription::from(EventKind::Chat).matches(EventKind::Chat));
        assert!(!Subscription::Kind(EventKind::Chat).matches(EventKind::Login));
    }

    #[tokio::test]
    async fn test_dispatch_in_order_and_isolates_errors() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut set = SubscriberSet::new();
        set.add(
            Subscription::All,
            Arc::new(FnSubscriber::new(|_e: &Event| Err("boom".into()))),
        );
        let s = seen.clone();
        set.add(
            EventKind::Chat.into(),
            Arc::new(FnSubscriber::new(move |e: &Event| {
                s.lock().unwrap().push(e.raw_line().to_string());
                Ok(())
            })),
        );
        set.add(
            EventKind::Death.into(),
            Arc::new(FnSubscriber::new(|_e: &Event| {
                panic!("death handler must not be called for chat")
            })),
        );

        assert_eq!(set.dispatch("main", &chat("one")).await, 1);
        assert_eq!(set.dispatch("main", &chat("two")).await, 1);
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_queue_subscriber() {
        let (subscriber, mut rx) = QueueSubscriber::new(4);
        subscriber.on_event(&chat("queued")).await.unwrap();
        let event = rx.next().await.unwrap();
        assert_eq!(event.raw_line(), "queued");
    }

    #[tokio::test]
    async fn test_lossy_queue_drops_when_full() {
        let (subscriber, rx) = QueueSubscriber::lossy(1);
        subscriber.on_event(&chat("first")).await.unwrap();
        subscriber.on_event(&chat("second")).await.unwrap();
        let drained = rx.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].raw_line(), "first");
    }

    #[tokio::test]
    async fn test_queue_subscriber_reports_closed_consumer() {
        let (subscriber, rx) = QueueSubscriber::new(1);
        drop(rx);
        assert!(subscriber.on_event(&chat("x")).await.is_err());
    }
}
