//! [`RoomManager`] – the sighting-to-room pipeline task.
//!
//! Owns a [`ProximityAggregator`] and a [`RoomResolver`] and drives them from
//! a single task, so neither needs a lock:
//!
//! ```text
//! SightingReport ──► aggregator ──► snapshot ──► resolver ──► room watch
//!                                      │             ▲
//!                                      ▼             │
//!                               Topic::Sightings   lookups (JoinSet)
//! ```
//!
//! Remote lookups run on their own tasks and report back through the same
//! loop. A lookup that errors or exceeds the lookup timeout is recorded as
//! "no room" for that beacon; it is never retried. So is a lookup task that
//! panics or is cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use roomsync_middleware::{EventBus, SightingReport, StateCell, Topic};
use roomsync_perception::{ProximityAggregator, RoomResolver, RoomUpdate};
use roomsync_types::{BeaconIdentity, Event, EventPayload, Room, RoomSyncError, SightingSnapshot};
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::lookup::RoomLookup;

const SOURCE: &str = "roomsync-runtime::pipeline";

/// Messages accepted by the pipeline task.
#[derive(Debug, Clone)]
pub enum PipelineInput {
    Sighting(SightingReport),
    /// The group's region was exited; drop its contribution.
    GroupLost(String),
}

/// Cheap handle for feeding the pipeline and watching its output.
#[derive(Clone)]
pub struct RoomManagerHandle {
    tx: mpsc::Sender<PipelineInput>,
    rooms: watch::Receiver<Option<Room>>,
}

impl RoomManagerHandle {
    pub async fn report_sighting(&self, report: SightingReport) -> Result<(), RoomSyncError> {
        self.send(PipelineInput::Sighting(report)).await
    }

    pub async fn remove_group(&self, group: impl Into<String>) -> Result<(), RoomSyncError> {
        self.send(PipelineInput::GroupLost(group.into())).await
    }

    /// Observer for the resolved room.
    pub fn rooms(&self) -> watch::Receiver<Option<Room>> {
        self.rooms.clone()
    }

    pub fn current_room(&self) -> Option<Room> {
        self.rooms.borrow().clone()
    }

    async fn send(&self, input: PipelineInput) -> Result<(), RoomSyncError> {
        self.tx
            .send(input)
            .await
            .map_err(|_| RoomSyncError::Channel("room pipeline has stopped".to_string()))
    }
}

/// Sighting aggregation, lookup dispatch and room selection.
pub struct RoomManager {
    aggregator: ProximityAggregator,
    resolver: RoomResolver,
    lookup: Arc<dyn RoomLookup>,
    lookup_timeout: Duration,
    bus: EventBus,
    room: StateCell<Option<Room>>,
    /// Beacon behind each running lookup task.
    pending: HashMap<task::Id, BeaconIdentity>,
}

impl RoomManager {
    pub fn new(lookup: Arc<dyn RoomLookup>, lookup_timeout: Duration, bus: EventBus) -> Self {
        Self {
            aggregator: ProximityAggregator::new(),
            resolver: RoomResolver::new(),
            lookup,
            lookup_timeout,
            bus,
            room: StateCell::new(None),
            pending: HashMap::new(),
        }
    }

    /// Start the pipeline task. `capacity` bounds the input queue.
    pub fn spawn(self, capacity: usize) -> (RoomManagerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = RoomManagerHandle {
            tx,
            rooms: self.room.subscribe(),
        };
        (handle, tokio::spawn(self.run(rx)))
    }

    /// Process inputs until every handle is dropped. In-flight lookups are
    /// cancelled on exit.
    async fn run(mut self, mut inputs: mpsc::Receiver<PipelineInput>) {
        let mut lookups: JoinSet<Option<Room>> = JoinSet::new();
        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(PipelineInput::Sighting(report)) => {
                        if let Some(snapshot) = self.aggregator.report_sighting(report.group, report.beacons) {
                            self.observe(snapshot, &mut lookups);
                        }
                    }
                    Some(PipelineInput::GroupLost(group)) => {
                        debug!(%group, "sighting group lost");
                        if let Some(snapshot) = self.aggregator.remove_group(&group) {
                            self.observe(snapshot, &mut lookups);
                        }
                    }
                    None => {
                        debug!("all pipeline handles dropped; stopping");
                        break;
                    }
                },
                Some(joined) = lookups.join_next_with_id() => {
                    let (id, room) = match joined {
                        Ok((id, room)) => (id, room),
                        Err(e) => {
                            warn!(error = %e, "lookup task did not complete; treating beacon as unbound");
                            (e.id(), None)
                        }
                    };
                    if let Some(beacon) = self.pending.remove(&id) {
                        let update = self.resolver.record_lookup(beacon, room);
                        self.publish(update);
                    }
                }
            }
        }
    }

    fn observe(&mut self, snapshot: SightingSnapshot, lookups: &mut JoinSet<Option<Room>>) {
        self.bus.publish_best_effort(
            Topic::Sightings,
            Event::new(SOURCE, EventPayload::Sightings(snapshot.clone())),
        );

        let observation = self.resolver.observe(snapshot);
        for beacon in observation.lookups {
            let lookup = Arc::clone(&self.lookup);
            let timeout = self.lookup_timeout;
            let handle = lookups.spawn(async move {
                match tokio::time::timeout(timeout, lookup.resolve_room(&beacon)).await {
                    Ok(Ok(room)) => room,
                    Ok(Err(e)) => {
                        warn!(%beacon, error = %e, "room lookup failed; treating beacon as unbound");
                        None
                    }
                    Err(_) => {
                        warn!(%beacon, ?timeout, "room lookup timed out; treating beacon as unbound");
                        None
                    }
                }
            });
            self.pending.insert(handle.id(), beacon);
        }
        self.publish(observation.update);
    }

    fn publish(&self, update: Option<RoomUpdate>) {
        let Some(RoomUpdate { previous, current }) = update else {
            return;
        };
        info!(
            from = ?previous.as_ref().map(|r| &r.name),
            to = ?current.as_ref().map(|r| &r.name),
            "room changed"
        );
        self.room.set(current.clone());
        self.bus.publish_best_effort(
            Topic::RoomChanges,
            Event::new(SOURCE, EventPayload::RoomChanged { previous, current }),
        );
    }
}
