//! `roomsync-middleware` – plumbing between the sensing layer, the room
//! pipeline, the sync coordinator and whoever is watching.
//!
//! # Modules
//!
//! - [`bus`] – topic-partitioned publish/subscribe event log built on Tokio
//!   broadcast channels.
//! - [`state`] – [`StateCell`]: single-writer observable value with change
//!   notification, used for the published room, sync state and mapping
//!   status.
//! - [`adapter`] – collaborator traits: [`TrackingEngine`] (produces and
//!   applies map blobs) and [`SightingSource`] (streams ranged beacons).
//! - [`sim`] – in-process stand-ins for those collaborators, for headless
//!   runs and tests.

pub mod adapter;
pub mod bus;
pub mod sim;
pub mod state;

pub use adapter::{SightingReport, SightingSource, TrackingEngine};
pub use bus::{EventBus, Topic, TopicReceiver};
pub use sim::{ReplaySightingSource, SimTrackingEngine};
pub use state::StateCell;
