//! [`InMemoryMapStore`] – a process-local [`RemoteMapStore`].
//!
//! Follows the same slot protocol as the HTTP backend, including the
//! optimistic version check on confirmation, so it can stand in for the
//! backend in offline mode and in tests. Slot URLs use a `mem://` scheme and
//! are only meaningful to the store that issued them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use roomsync_types::{MapVersion, Room, RoomSyncError};
use tracing::debug;
use uuid::Uuid;

use crate::map_store::{DownloadSlot, RemoteMapStore, UploadSlot};

#[derive(Debug)]
struct StoredMap {
    version: Uuid,
    blob: Vec<u8>,
}

#[derive(Debug)]
struct PendingUpload {
    room: Uuid,
    blob: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Inner {
    maps: HashMap<Uuid, StoredMap>,
    pending: HashMap<Uuid, PendingUpload>,
}

/// In-process map store with presigned-slot semantics.
#[derive(Debug, Default)]
pub struct InMemoryMapStore {
    inner: Mutex<Inner>,
}

impl InMemoryMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `blob` as `room`'s current map without going through the slot
    /// protocol. Returns the new version.
    pub fn seed(&self, room: &Room, blob: Vec<u8>) -> Uuid {
        let version = Uuid::new_v4();
        self.lock().maps.insert(room.id, StoredMap { version, blob });
        version
    }

    /// Current version of `room`'s map.
    pub fn version_of(&self, room: &Room) -> MapVersion {
        self.lock().maps.get(&room.id).map(|m| m.version)
    }

    /// Current blob of `room`'s map.
    pub fn blob_of(&self, room: &Room) -> Option<Vec<u8>> {
        self.lock().maps.get(&room.id).map(|m| m.blob.clone())
    }

    /// Upload slots issued but not yet confirmed.
    pub fn pending_uploads(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteMapStore for InMemoryMapStore {
    async fn request_upload_slot(&self, room: &Room) -> Result<UploadSlot, RoomSyncError> {
        let version = Uuid::new_v4();
        self.lock().pending.insert(
            version,
            PendingUpload {
                room: room.id,
                blob: None,
            },
        );
        Ok(UploadSlot {
            url: format!("mem://upload/{version}"),
            version,
        })
    }

    async fn upload_blob(&self, slot: &UploadSlot, blob: Vec<u8>) -> Result<(), RoomSyncError> {
        let mut inner = self.lock();
        let pending = inner
            .pending
            .get_mut(&slot.version)
            .ok_or_else(|| RoomSyncError::Network(format!("unknown upload slot {}", slot.url)))?;
        pending.blob = Some(blob);
        Ok(())
    }

    async fn confirm_upload(
        &self,
        room: &Room,
        old_version: MapVersion,
        new_version: Uuid,
    ) -> Result<(), RoomSyncError> {
        let mut inner = self.lock();
        // A slot is consumed by its confirmation whether or not it succeeds.
        let pending = inner.pending.remove(&new_version);
        let current = inner.maps.get(&room.id).map(|m| m.version);
        if current != old_version {
            return Err(RoomSyncError::Network(format!(
                "version conflict for room {}: expected {:?}, found {:?}",
                room.id, old_version, current
            )));
        }
        let blob = match pending {
            Some(PendingUpload {
                room: slot_room,
                blob: Some(blob),
            }) if slot_room == room.id => blob,
            _ => {
                return Err(RoomSyncError::Network(format!(
                    "no completed upload {new_version} for room {}",
                    room.id
                )));
            }
        };
        debug!(room = %room.name, version = %new_version, "map confirmed");
        inner.maps.insert(
            room.id,
            StoredMap {
                version: new_version,
                blob,
            },
        );
        Ok(())
    }

    async fn fetch_map(&self, room: &Room) -> Result<Option<DownloadSlot>, RoomSyncError> {
        Ok(self.lock().maps.get(&room.id).map(|m| DownloadSlot {
            url: format!("mem://download/{}/{}", room.id, m.version),
            version: m.version,
        }))
    }

    async fn download_blob(&self, slot: &DownloadSlot) -> Result<Vec<u8>, RoomSyncError> {
        self.lock()
            .maps
            .values()
            .find(|m| m.version == slot.version)
            .map(|m| m.blob.clone())
            .ok_or_else(|| RoomSyncError::Network(format!("stale download slot {}", slot.url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(name: &str) -> Room {
        Room::new(Uuid::new_v4(), name)
    }

    async fn save(store: &InMemoryMapStore, room: &Room, old: MapVersion, blob: &[u8]) -> Result<Uuid, RoomSyncError> {
        let slot = store.request_upload_slot(room).await?;
        store.upload_blob(&slot, blob.to_vec()).await?;
        store.confirm_upload(room, old, slot.version).await?;
        Ok(slot.version)
    }

    #[tokio::test]
    async fn confirmed_version_is_what_fetch_returns() {
        let store = InMemoryMapStore::new();
        let lab = room("Lab");

        let v1 = save(&store, &lab, None, b"one").await.expect("first save");
        let slot = store.fetch_map(&lab).await.unwrap().expect("saved");
        assert_eq!(slot.version, v1);
        assert_eq!(store.download_blob(&slot).await.unwrap(), b"one");

        let v2 = save(&store, &lab, Some(v1), b"two").await.expect("second save");
        let slot = store.fetch_map(&lab).await.unwrap().expect("saved");
        assert_eq!(slot.version, v2);
        assert_eq!(store.blob_of(&lab), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn stale_old_version_is_rejected() {
        let store = InMemoryMapStore::new();
        let lab = room("Lab");
        let v1 = save(&store, &lab, None, b"one").await.unwrap();

        let result = save(&store, &lab, None, b"clobber").await;
        assert!(matches!(result, Err(RoomSyncError::Network(_))));
        assert_eq!(store.version_of(&lab), Some(v1));
    }

    #[tokio::test]
    async fn conflicting_confirm_releases_the_slot() {
        let store = InMemoryMapStore::new();
        let lab = room("Lab");
        let v1 = save(&store, &lab, None, b"one").await.unwrap();
        assert_eq!(store.pending_uploads(), 0);

        let slot = store.request_upload_slot(&lab).await.unwrap();
        store.upload_blob(&slot, b"clobber".to_vec()).await.unwrap();
        assert_eq!(store.pending_uploads(), 1);

        assert!(store.confirm_upload(&lab, None, slot.version).await.is_err());
        assert_eq!(store.pending_uploads(), 0);
        assert_eq!(store.version_of(&lab), Some(v1));

        // The consumed slot cannot be confirmed later with the right version.
        assert!(store.confirm_upload(&lab, Some(v1), slot.version).await.is_err());
        assert_eq!(store.version_of(&lab), Some(v1));
    }

    #[tokio::test]
    async fn confirm_without_upload_is_rejected() {
        let store = InMemoryMapStore::new();
        let lab = room("Lab");
        let slot = store.request_upload_slot(&lab).await.unwrap();
        let result = store.confirm_upload(&lab, None, slot.version).await;
        assert!(result.is_err());
        assert!(store.version_of(&lab).is_none());
    }

    #[tokio::test]
    async fn unsaved_room_fetches_none() {
        let store = InMemoryMapStore::new();
        assert!(store.fetch_map(&room("Empty")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn superseded_download_slot_fails() {
        let store = InMemoryMapStore::new();
        let lab = room("Lab");
        let v1 = store.seed(&lab, b"one".to_vec());
        let old_slot = store.fetch_map(&lab).await.unwrap().unwrap();
        save(&store, &lab, Some(v1), b"two").await.unwrap();

        assert!(store.download_blob(&old_slot).await.is_err());
    }
}
