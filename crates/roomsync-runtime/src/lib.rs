//! `roomsync-runtime` – the async side of room-aware map sync.
//!
//! # Modules
//!
//! - [`lookup`] – [`RoomLookup`]: beacon-to-room resolution against the
//!   backend ([`HttpRoomLookup`]) or a fixed table ([`StaticRoomLookup`]).
//! - [`map_store`] – [`RemoteMapStore`]: the presigned-slot map storage
//!   protocol and its HTTP client [`HttpMapStore`].
//! - [`memory_store`] – [`InMemoryMapStore`]: the same protocol in process.
//! - [`pipeline`] – [`RoomManager`]: the task that turns sighting reports
//!   into a resolved room, dispatching lookups as new beacons appear.
//! - [`coordinator`] – [`MapSyncCoordinator`]: saves the map of the room
//!   being left, then fetches and applies the map of the room entered.
//!   Transitions are serialised and rapid changes coalesce.
//! - [`session`] – [`RoomSession`]: wires the above to one
//!   [`EventBus`][roomsync_middleware::EventBus].
//! - [`telemetry`] – [`init_tracing`]: `tracing` subscriber with an optional
//!   OTLP span exporter.

pub mod coordinator;
pub mod lookup;
pub mod map_store;
pub mod memory_store;
pub mod pipeline;
pub mod session;
pub mod telemetry;

pub use coordinator::MapSyncCoordinator;
pub use lookup::{HttpRoomLookup, RoomLookup, StaticRoomLookup};
pub use map_store::{DownloadSlot, HttpMapStore, RemoteMap, RemoteMapStore, UploadSlot};
pub use memory_store::InMemoryMapStore;
pub use pipeline::{PipelineInput, RoomManager, RoomManagerHandle};
pub use session::{RoomSession, SessionConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
