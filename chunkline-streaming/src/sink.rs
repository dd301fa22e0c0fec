//! Event sinks.
//!
//! The processor publishes every event to an [`EventSink`]. Sinks are
//! implemented for `Vec<StreamEvent>` (collect in memory), for a tokio
//! `mpsc::Sender` (single consumer) and for [`EventBus`] (per-channel
//! fan-out to any number of subscribers).

use crate::error::{StreamError, StreamResult};
use crate::events::{EventChannel, StreamEvent};
use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Destination for classified events.
#[async_trait]
pub trait EventSink: Send {
    /// Publish one event.
    async fn publish(&mut self, event: StreamEvent) -> StreamResult<()>;
}

#[async_trait]
impl EventSink for Vec<StreamEvent> {
    async fn publish(&mut self, event: StreamEvent) -> StreamResult<()> {
        self.push(event);
        Ok(())
    }
}

#[async_trait]
impl EventSink for mpsc::Sender<StreamEvent> {
    async fn publish(&mut self, event: StreamEvent) -> StreamResult<()> {
        self.send(event)
            .await
            .map_err(|e| StreamError::Send(format!("event receiver dropped: {}", e.0.channel())))
    }
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for &mut T {
    async fn publish(&mut self, event: StreamEvent) -> StreamResult<()> {
        (**self).publish(event).await
    }
}

struct Subscriber {
    channels: Option<HashSet<EventChannel>>,
    tx: mpsc::Sender<StreamEvent>,
}

impl Subscriber {
    fn wants(&self, channel: EventChannel) -> bool {
        self.channels
            .as_ref()
            .map_or(true, |channels| channels.contains(&channel))
    }
}

/// Fan-out of events to per-channel subscribers.
///
/// Each subscriber gets a bounded queue; a slow subscriber applies
/// backpressure to the publisher. Subscribers whose receiver has been
/// dropped are removed on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a single channel.
    pub fn subscribe(&self, channel: EventChannel, capacity: usize) -> mpsc::Receiver<StreamEvent> {
        self.subscribe_many([channel], capacity)
    }

    /// Subscribe to several channels with one queue.
    pub fn subscribe_many(
        &self,
        channels: impl IntoIterator<Item = EventChannel>,
        capacity: usize,
    ) -> mpsc::Receiver<StreamEvent> {
        self.add(Some(channels.into_iter().collect()), capacity)
    }

    /// Subscribe to every channel.
    pub fn subscribe_all(&self, capacity: usize) -> mpsc::Receiver<StreamEvent> {
        self.add(None, capacity)
    }

    fn add(
        &self,
        channels: Option<HashSet<EventChannel>>,
        capacity: usize,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.lock().push(Subscriber { channels, tx });
        rx
    }

    /// Number of registered subscribers, including closed ones not yet pruned.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver an event to every subscriber of its channel.
    ///
    /// Returns the number of subscribers that received it.
    pub async fn send(&self, event: StreamEvent) -> usize {
        let channel = event.channel();
        let targets: Vec<mpsc::Sender<StreamEvent>> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .filter(|s| s.wants(channel))
                .map(|s| s.tx.clone())
                .collect()
        };

        let mut delivered = 0;
        let mut closed = false;
        for tx in targets {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            } else {
                closed = true;
            }
        }

        if closed {
            let mut subscribers = self.subscribers.lock();
            let before = subscribers.len();
            subscribers.retain(|s| !s.tx.is_closed());
            debug!(
                channel = %channel,
                removed = before - subscribers.len(),
                "Pruned closed subscribers"
            );
        }

        delivered
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn publish(&mut self, event: StreamEvent) -> StreamResult<()> {
        self.send(event).await;
        Ok(())
    }
}

/// Adapt a receiver into a [`Stream`] of events.
pub fn receiver_stream(rx: mpsc::Receiver<StreamEvent>) -> impl Stream<Item = StreamEvent> {
    futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((event, rx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkline_core::FragmentKind;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_vec_sink() {
        let mut sink: Vec<StreamEvent> = Vec::new();
        sink.publish(StreamEvent::content("a")).await.unwrap();
        assert_eq!(sink, vec![StreamEvent::content("a")]);
    }

    #[tokio::test]
    async fn test_mpsc_sink_closed() {
        let (mut tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = tx.publish(StreamEvent::content("a")).await.unwrap_err();
        assert!(matches!(err, StreamError::Send(_)));
    }

    #[tokio::test]
    async fn test_bus_routes_by_channel() {
        let bus = EventBus::new();
        let mut content = bus.subscribe(EventChannel::Content, 8);
        let mut changes = bus.subscribe(EventChannel::KindChanged, 8);
        let mut all = bus.subscribe_all(8);

        let mut sink = bus.clone();
        sink.publish(StreamEvent::kind_changed(None, FragmentKind::TextDelta))
            .await
            .unwrap();
        sink.publish(StreamEvent::content("hi")).await.unwrap();
        drop(sink);
        drop(bus);

        assert_eq!(content.recv().await, Some(StreamEvent::content("hi")));
        assert_eq!(content.recv().await, None);
        assert_eq!(
            changes.recv().await,
            Some(StreamEvent::kind_changed(None, FragmentKind::TextDelta))
        );
        assert_eq!(changes.recv().await, None);
        assert_eq!(all.recv().await.map(|e| e.channel()), Some(EventChannel::KindChanged));
        assert_eq!(all.recv().await.map(|e| e.channel()), Some(EventChannel::Content));
    }

    #[tokio::test]
    async fn test_bus_prunes_closed_subscribers() {
        let bus = EventBus::new();
        let kept = bus.subscribe(EventChannel::Content, 4);
        let dropped = bus.subscribe(EventChannel::Content, 4);
        drop(dropped);
        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.send(StreamEvent::content("x")).await;
        assert_eq!(delivered, 1);
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn test_bus_without_subscribers() {
        let mut bus = EventBus::new();
        bus.publish(StreamEvent::content("nobody")).await.unwrap();
        assert_eq!(bus.send(StreamEvent::content("nobody")).await, 0);
    }

    #[tokio::test]
    async fn test_receiver_stream() {
        let bus = EventBus::new();
        let rx = bus.subscribe_many([EventChannel::Content, EventChannel::Reasoning], 8);
        bus.send(StreamEvent::reasoning("think")).await;
        bus.send(StreamEvent::content("say")).await;
        drop(bus);

        let events: Vec<StreamEvent> = receiver_stream(rx).collect().await;
        assert_eq!(
            events,
            vec![StreamEvent::reasoning("think"), StreamEvent::content("say")]
        );
    }
}
