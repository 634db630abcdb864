//! In-process stand-ins for the sensing layer and the tracking engine.
//!
//! These let the full stack run headless (the `roomsync` CLI in offline mode,
//! CI) without a radio or a spatial-tracking engine.
//!
//! # Example
//!
//! ```rust
//! use roomsync_middleware::sim::SimTrackingEngine;
//! use roomsync_middleware::TrackingEngine;
//!
//! let engine = SimTrackingEngine::new().with_current_map(b"map-v1".to_vec());
//! engine.apply_map_blob(b"downloaded".to_vec());
//! assert_eq!(engine.applied_maps(), vec![b"downloaded".to_vec()]);
//! ```

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use roomsync_types::WorldMappingStatus;
use tokio::sync::watch;
use tracing::debug;

use crate::adapter::{SightingReport, SightingSource, TrackingEngine};
use crate::state::StateCell;

// ────────────────────────────────────────────────────────────────────────────
// Tracking engine
// ────────────────────────────────────────────────────────────────────────────

/// A tracking engine that hands out a scripted map and records every map it
/// is asked to apply.
///
/// Applying a map also makes it the current map, so a save after a fetch
/// uploads what was downloaded unless the script replaced it in between.
#[derive(Debug, Default)]
pub struct SimTrackingEngine {
    current: Mutex<Option<Vec<u8>>>,
    applied: Mutex<Vec<Vec<u8>>>,
    status: StateCell<WorldMappingStatus>,
}

impl SimTrackingEngine {
    /// An engine with no map and [`WorldMappingStatus::NotAvailable`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: start with `blob` as the current map.
    pub fn with_current_map(self, blob: Vec<u8>) -> Self {
        self.set_current_map(Some(blob));
        self
    }

    /// Replace (or clear) the map returned by the next save.
    pub fn set_current_map(&self, blob: Option<Vec<u8>>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = blob;
    }

    /// Every map applied so far, oldest first.
    pub fn applied_maps(&self) -> Vec<Vec<u8>> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Report a new mapping quality to observers.
    pub fn set_mapping_status(&self, status: WorldMappingStatus) {
        if self.status.set(status) {
            debug!(%status, "sim mapping status changed");
        }
    }
}

#[async_trait]
impl TrackingEngine for SimTrackingEngine {
    async fn current_map_blob(&self) -> Option<Vec<u8>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply_map_blob(&self, blob: Vec<u8>) {
        debug!(bytes = blob.len(), "sim engine applying map");
        self.set_current_map(Some(blob.clone()));
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(blob);
    }

    fn mapping_status(&self) -> watch::Receiver<WorldMappingStatus> {
        self.status.subscribe()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sighting source
// ────────────────────────────────────────────────────────────────────────────

/// A sighting source that replays a fixed list of reports, then ends.
#[derive(Debug, Clone, Default)]
pub struct ReplaySightingSource {
    reports: Vec<SightingReport>,
}

impl ReplaySightingSource {
    pub fn new(reports: Vec<SightingReport>) -> Self {
        Self { reports }
    }
}

#[async_trait]
impl SightingSource for ReplaySightingSource {
    async fn sighting_stream(&self) -> BoxStream<'static, SightingReport> {
        stream::iter(self.reports.clone()).boxed()
    }
}
