//! `roomsync-perception` – turning noisy beacon sightings into a room.
//!
//! Everything in this crate is synchronous and free of I/O. The async
//! pipeline in `roomsync-runtime` owns one instance of each type and feeds
//! it events one at a time.
//!
//! # Modules
//!
//! - [`proximity`] – [`ProximityAggregator`][proximity::ProximityAggregator]:
//!   merges per-group ranging reports into one proximity-ranked
//!   [`SightingSnapshot`][roomsync_types::SightingSnapshot] and suppresses
//!   no-op updates.
//! - [`resolver`] – [`RoomResolver`][resolver::RoomResolver]: beacon-to-room
//!   cache, lookup de-duplication, and the nearest-rank majority vote with
//!   sticky tie-breaking.

pub mod proximity;
pub mod resolver;

pub use proximity::ProximityAggregator;
pub use resolver::{Observation, RoomResolver, RoomUpdate};
