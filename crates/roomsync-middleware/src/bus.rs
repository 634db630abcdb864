//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! The bus is an event *log*: it tells observers what happened. The current
//! value of a published observable lives in a [`StateCell`][crate::StateCell].
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Sightings`] | Merged sighting snapshots, one per real change |
//! | [`Topic::RoomChanges`] | Resolved-room transitions |
//! | [`Topic::SyncStatus`] | Coordinator state changes and mapping-quality updates |
//! | [`Topic::Alerts`] | Abandoned saves and other failures that did not stop the loop |

use roomsync_types::{Event, RoomSyncError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Merged proximity-ranked beacon lists.
    Sightings,
    /// Resolved-room transitions.
    RoomChanges,
    /// Map sync coordinator state and world-mapping quality.
    SyncStatus,
    /// Failures surfaced without interrupting the room loop.
    Alerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    sightings: broadcast::Sender<Event>,
    room_changes: broadcast::Sender<Event>,
    sync_status: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (sightings, _) = broadcast::channel(capacity);
        let (room_changes, _) = broadcast::channel(capacity);
        let (sync_status, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            sightings,
            room_changes,
            sync_status,
            alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`RoomSyncError::Channel`] when nobody is listening on the topic.
    /// Publishers that treat observers as optional use [`publish_best_effort`]
    /// instead.
    ///
    /// [`publish_best_effort`]: Self::publish_best_effort
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, RoomSyncError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| RoomSyncError::Channel(format!("No subscribers for topic {:?}", topic)))
    }

    /// Publish `event`, ignoring the no-subscriber case.
    pub fn publish_best_effort(&self, topic: Topic, event: Event) {
        let _ = self.topic_sender(topic).send(event);
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Sightings => &self.sightings,
            Topic::RoomChanges => &self.room_changes,
            Topic::SyncStatus => &self.sync_status,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
