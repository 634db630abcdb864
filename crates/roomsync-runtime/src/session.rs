//! [`RoomSession`] – one client's wiring of pipeline, coordinator and bus.
//!
//! ```text
//! SightingSource ─┐
//!                 ├─► RoomManager ──room watch──► MapSyncCoordinator ──► RemoteMapStore
//! report_sighting ┘        │                           │        └──────► TrackingEngine
//!                          └──────────► EventBus ◄─────┘
//! ```
//!
//! Dropping the session aborts every task it started.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use roomsync_middleware::{EventBus, SightingReport, SightingSource, Topic, TrackingEngine};
use roomsync_types::{Event, EventPayload, Room, RoomMapBinding, RoomSyncError, SyncState, WorldMappingStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::coordinator::MapSyncCoordinator;
use crate::lookup::{HttpRoomLookup, RoomLookup};
use crate::map_store::{HttpMapStore, RemoteMapStore};
use crate::pipeline::{RoomManager, RoomManagerHandle};

const SOURCE: &str = "roomsync-runtime::session";
const INPUT_QUEUE_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime settings for a [`RoomSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backend base URL for room lookup and map storage.
    pub backend_url: String,
    /// Bound on each map-store call (slot, transfer, confirm).
    pub request_timeout: Duration,
    /// Bound on a single beacon-to-room lookup.
    pub lookup_timeout: Duration,
    /// Per-topic event bus capacity.
    pub bus_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(30),
            lookup_timeout: Duration::from_secs(10),
            bus_capacity: 256,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

pub struct RoomSession {
    pipeline: RoomManagerHandle,
    coordinator: MapSyncCoordinator,
    engine: Arc<dyn TrackingEngine>,
    bus: EventBus,
    tasks: Vec<JoinHandle<()>>,
}

impl RoomSession {
    /// Wire the given collaborators together and start the session's tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: &SessionConfig,
        lookup: Arc<dyn RoomLookup>,
        store: Arc<dyn RemoteMapStore>,
        engine: Arc<dyn TrackingEngine>,
    ) -> Self {
        let bus = EventBus::new(config.bus_capacity);

        let (pipeline, pipeline_task) =
            RoomManager::new(lookup, config.lookup_timeout, bus.clone()).spawn(INPUT_QUEUE_CAPACITY);
        let coordinator =
            MapSyncCoordinator::new(store, Arc::clone(&engine), bus.clone(), config.request_timeout);
        let coordinator_task = coordinator.spawn(pipeline.rooms());
        let relay_task = tokio::spawn(relay_mapping_status(engine.mapping_status(), bus.clone()));

        info!(backend = %config.backend_url, "room session started");
        Self {
            pipeline,
            coordinator,
            engine,
            bus,
            tasks: vec![pipeline_task, coordinator_task, relay_task],
        }
    }

    /// Start a session against the HTTP backend at `config.backend_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomSyncError::Network`] if an HTTP client cannot be built.
    pub fn connect(config: &SessionConfig, engine: Arc<dyn TrackingEngine>) -> Result<Self, RoomSyncError> {
        let lookup = HttpRoomLookup::new(&config.backend_url, config.lookup_timeout)?;
        let store = HttpMapStore::new(&config.backend_url, config.request_timeout)?;
        Ok(Self::start(config, Arc::new(lookup), Arc::new(store), engine))
    }

    /// Feed one ranging report into the pipeline.
    pub async fn report_sighting(&self, report: SightingReport) -> Result<(), RoomSyncError> {
        self.pipeline.report_sighting(report).await
    }

    /// Drop a source group's contribution.
    pub async fn remove_group(&self, group: impl Into<String>) -> Result<(), RoomSyncError> {
        self.pipeline.remove_group(group).await
    }

    /// Forward every report from `source` into the pipeline until the stream
    /// ends or the session is dropped.
    pub fn attach_source(&mut self, source: Arc<dyn SightingSource>) {
        let pipeline = self.pipeline.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut reports = source.sighting_stream().await;
            while let Some(report) = reports.next().await {
                if pipeline.report_sighting(report).await.is_err() {
                    break;
                }
            }
            debug!("sighting source finished");
        }));
    }

    /// Save the bound room's map now. See [`MapSyncCoordinator::save_now`].
    pub async fn save_now(&self) -> Result<Uuid, RoomSyncError> {
        self.coordinator.save_now().await
    }

    pub fn current_room(&self) -> watch::Receiver<Option<Room>> {
        self.pipeline.rooms()
    }

    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.coordinator.sync_state()
    }

    pub fn mapping_status(&self) -> watch::Receiver<WorldMappingStatus> {
        self.engine.mapping_status()
    }

    pub async fn binding(&self) -> Option<RoomMapBinding> {
        self.coordinator.binding().await
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn relay_mapping_status(mut status: watch::Receiver<WorldMappingStatus>, bus: EventBus) {
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        debug!(status = %current, "world mapping status changed");
        bus.publish_best_effort(
            Topic::SyncStatus,
            Event::new(SOURCE, EventPayload::MappingStatus(current)),
        );
    }
}
