//! Collaborator boundaries.
//!
//! The room pipeline and the sync coordinator never talk to a radio stack or
//! a spatial-tracking engine directly. They see these two traits; platform
//! glue implements them.
//!
//! - [`SightingSource`] – the sensing layer. Yields a [`SightingReport`] each
//!   time a ranging region finishes a pass.
//! - [`TrackingEngine`] – the spatial-tracking engine that produces the
//!   current map blob on request and applies a downloaded one.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use roomsync_types::{RangedBeacon, WorldMappingStatus};
use tokio::sync::watch;

/// One ranging pass of one source group.
///
/// `beacons` is the group's complete current list. It **replaces** whatever
/// the group reported before; it is never a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SightingReport {
    /// Identifier of the ranging region that produced the list.
    pub group: String,
    pub beacons: Vec<RangedBeacon>,
}

impl SightingReport {
    pub fn new(group: impl Into<String>, beacons: Vec<RangedBeacon>) -> Self {
        Self {
            group: group.into(),
            beacons,
        }
    }
}

/// Producer of raw proximity sightings.
#[async_trait]
pub trait SightingSource: Send + Sync {
    /// A live stream of ranging reports. The stream ends when the source
    /// stops ranging.
    async fn sighting_stream(&self) -> BoxStream<'static, SightingReport>;
}

/// The spatial-tracking engine that owns the map blob.
///
/// # Contract
///
/// * `current_map_blob` – serialise the engine's current map. `None` when the
///   engine has nothing worth saving yet. May take a while.
/// * `apply_map_blob` – hand a downloaded map to the engine. Fire and forget;
///   the caller does not wait for relocalisation.
/// * `mapping_status` – observer for the engine's world-mapping quality.
#[async_trait]
pub trait TrackingEngine: Send + Sync {
    async fn current_map_blob(&self) -> Option<Vec<u8>>;

    fn apply_map_blob(&self, blob: Vec<u8>);

    fn mapping_status(&self) -> watch::Receiver<WorldMappingStatus>;
}
