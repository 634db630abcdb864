//! [`RemoteMapStore`] – presigned-URL exchanges with the map backend.
//!
//! Saving a room's map is three calls:
//!
//! ```text
//! GET  {base}/room/{id}/ARWorldMap/getPresignedUploadUrl     -> {"url", "uuid"}
//! PUT  {url}                                                 raw blob, expects 200
//! POST {base}/room/{id}/ARWorldMap/presignedUploadConfirmation {"old_uuid", "uuid"}, expects 200
//! ```
//!
//! Loading it is two:
//!
//! ```text
//! GET  {base}/room/{id}/ARWorldMap   -> {"url", "uuid"}, 404 when never saved
//! GET  {url}                         -> raw blob
//! ```
//!
//! `old_uuid` is the version the client last reconciled against (`null` on
//! the first save), which lets the backend reject a confirmation that would
//! clobber someone else's save.
//!
//! The client never retries. Every request carries the client's timeout and
//! fails with [`RoomSyncError::Network`]; unreadable bodies fail with
//! [`RoomSyncError::Decode`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use roomsync_types::{MapVersion, Room, RoomSyncError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Slots
// ─────────────────────────────────────────────────────────────────────────────

/// Where to PUT a new map, and the version it will become once confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSlot {
    pub url: String,
    pub version: Uuid,
}

/// Where to GET a room's current map, and that map's version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSlot {
    pub url: String,
    pub version: Uuid,
}

/// A downloaded map together with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMap {
    pub blob: Vec<u8>,
    pub version: Uuid,
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Remote persistence of per-room map blobs.
#[async_trait]
pub trait RemoteMapStore: Send + Sync {
    /// Reserve an upload destination for `room`.
    async fn request_upload_slot(&self, room: &Room) -> Result<UploadSlot, RoomSyncError>;

    /// Transfer `blob` to the reserved destination.
    async fn upload_blob(&self, slot: &UploadSlot, blob: Vec<u8>) -> Result<(), RoomSyncError>;

    /// Make the uploaded blob the room's current map.
    async fn confirm_upload(
        &self,
        room: &Room,
        old_version: MapVersion,
        new_version: Uuid,
    ) -> Result<(), RoomSyncError>;

    /// Locate the room's current map. `Ok(None)` when no map was ever saved.
    async fn fetch_map(&self, room: &Room) -> Result<Option<DownloadSlot>, RoomSyncError>;

    /// Download the blob behind a [`DownloadSlot`].
    async fn download_blob(&self, slot: &DownloadSlot) -> Result<Vec<u8>, RoomSyncError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PresignedResponse {
    url: String,
    uuid: Uuid,
}

#[derive(Serialize)]
struct ConfirmRequest {
    old_uuid: Option<Uuid>,
    uuid: Uuid,
}

/// Room ids appear upper-case in backend routes.
fn room_path(room: &Room) -> String {
    format!("room/{:X}/ARWorldMap", room.id.hyphenated())
}

fn network(call: &str, e: reqwest::Error) -> RoomSyncError {
    RoomSyncError::Network(format!("{call}: {e}"))
}

fn bad_status(call: &str, status: StatusCode) -> RoomSyncError {
    RoomSyncError::Network(format!("{call} returned HTTP {status}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpMapStore
// ─────────────────────────────────────────────────────────────────────────────

/// [`RemoteMapStore`] backed by the HTTP API described in the module docs.
pub struct HttpMapStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMapStore {
    /// Create a store client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomSyncError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RoomSyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoomSyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn endpoint(&self, room: &Room, suffix: &str) -> String {
        format!("{}/{}{}", self.base_url, room_path(room), suffix)
    }

    async fn presigned(&self, call: &str, url: &str) -> Result<Option<PresignedResponse>, RoomSyncError> {
        let response = self.client.get(url).send().await.map_err(|e| network(call, e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(bad_status(call, status));
        }
        let body = response
            .json::<PresignedResponse>()
            .await
            .map_err(|e| RoomSyncError::Decode(format!("{call}: {e}")))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl RemoteMapStore for HttpMapStore {
    #[instrument(skip(self, room), fields(room = %room.name))]
    async fn request_upload_slot(&self, room: &Room) -> Result<UploadSlot, RoomSyncError> {
        let call = "request_upload_slot";
        let url = self.endpoint(room, "/getPresignedUploadUrl");
        let body = self
            .presigned(call, &url)
            .await?
            .ok_or_else(|| bad_status(call, StatusCode::NOT_FOUND))?;
        debug!(version = %body.uuid, "upload slot issued");
        Ok(UploadSlot {
            url: body.url,
            version: body.uuid,
        })
    }

    #[instrument(skip(self, slot, blob), fields(version = %slot.version, bytes = blob.len()))]
    async fn upload_blob(&self, slot: &UploadSlot, blob: Vec<u8>) -> Result<(), RoomSyncError> {
        let call = "upload_blob";
        let response = self
            .client
            .put(&slot.url)
            .body(blob)
            .send()
            .await
            .map_err(|e| network(call, e))?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(bad_status(call, status)),
        }
    }

    #[instrument(skip(self, room), fields(room = %room.name))]
    async fn confirm_upload(
        &self,
        room: &Room,
        old_version: MapVersion,
        new_version: Uuid,
    ) -> Result<(), RoomSyncError> {
        let call = "confirm_upload";
        let url = self.endpoint(room, "/presignedUploadConfirmation");
        let response = self
            .client
            .post(&url)
            .json(&ConfirmRequest {
                old_uuid: old_version,
                uuid: new_version,
            })
            .send()
            .await
            .map_err(|e| network(call, e))?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(bad_status(call, status)),
        }
    }

    #[instrument(skip(self, room), fields(room = %room.name))]
    async fn fetch_map(&self, room: &Room) -> Result<Option<DownloadSlot>, RoomSyncError> {
        let url = self.endpoint(room, "");
        Ok(self
            .presigned("fetch_map", &url)
            .await?
            .map(|body| DownloadSlot {
                url: body.url,
                version: body.uuid,
            }))
    }

    #[instrument(skip(self, slot), fields(version = %slot.version))]
    async fn download_blob(&self, slot: &DownloadSlot) -> Result<Vec<u8>, RoomSyncError> {
        let call = "download_blob";
        let response = self
            .client
            .get(&slot.url)
            .send()
            .await
            .map_err(|e| network(call, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(bad_status(call, status));
        }
        let bytes = response.bytes().await.map_err(|e| network(call, e))?;
        debug!(bytes = bytes.len(), "map downloaded");
        Ok(bytes.to_vec())
    }
}
