//! Beacon-to-room lookup.
//!
//! [`RoomLookup`] is the remote service that knows which room a beacon is
//! mounted in. [`HttpRoomLookup`] talks to the backend:
//!
//! ```text
//! POST {base}/ibeacon/getRoom   {"uuid": .., "major": .., "minor": ..}
//!   200 {"id": .., "name": ..}  -> Some(room)
//!   any other status            -> None (no room bound)
//! ```
//!
//! [`StaticRoomLookup`] answers from a fixed table and backs offline mode.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use roomsync_types::{BeaconIdentity, Room, RoomSyncError};
use tracing::{debug, instrument};

/// Resolves a beacon identity to the room it is bound to.
#[async_trait]
pub trait RoomLookup: Send + Sync {
    /// `Ok(None)` when the service has no room for this beacon; `Err` when
    /// the service could not be asked at all.
    async fn resolve_room(&self, beacon: &BeaconIdentity) -> Result<Option<Room>, RoomSyncError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Backend room lookup over HTTP.
pub struct HttpRoomLookup {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRoomLookup {
    /// Create a lookup client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomSyncError::Network`] if the HTTP client cannot be built
    /// (e.g. no TLS backend available).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RoomSyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoomSyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Reuse an existing client.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl RoomLookup for HttpRoomLookup {
    #[instrument(skip(self), fields(beacon = %beacon))]
    async fn resolve_room(&self, beacon: &BeaconIdentity) -> Result<Option<Room>, RoomSyncError> {
        let url = format!("{}/ibeacon/getRoom", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(beacon)
            .send()
            .await
            .map_err(|e| RoomSyncError::LookupFailure(e.to_string()))?;

        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "no room bound to beacon");
            return Ok(None);
        }

        let room: Room = response
            .json()
            .await
            .map_err(|e| RoomSyncError::LookupFailure(format!("malformed room body: {e}")))?;
        Ok(Some(room))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Static table
// ─────────────────────────────────────────────────────────────────────────────

/// Answers lookups from a fixed beacon-to-room table.
#[derive(Debug, Clone, Default)]
pub struct StaticRoomLookup {
    table: HashMap<BeaconIdentity, Room>,
}

impl StaticRoomLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: bind `beacon` to `room`.
    pub fn with_binding(mut self, beacon: BeaconIdentity, room: Room) -> Self {
        self.table.insert(beacon, room);
        self
    }
}

impl FromIterator<(BeaconIdentity, Room)> for StaticRoomLookup {
    fn from_iter<I: IntoIterator<Item = (BeaconIdentity, Room)>>(iter: I) -> Self {
        Self {
            table: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RoomLookup for StaticRoomLookup {
    async fn resolve_room(&self, beacon: &BeaconIdentity) -> Result<Option<Room>, RoomSyncError> {
        Ok(self.table.get(beacon).cloned())
    }
}
