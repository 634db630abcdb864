//! [`MapSyncCoordinator`] – save-before-switch map synchronisation.
//!
//! Whenever the resolved room changes from `prev` to `next` the coordinator:
//!
//! 1. **Saves** `prev`'s map: asks the [`TrackingEngine`] for the current
//!    blob, reserves an upload slot, uploads, and confirms against the
//!    version it last reconciled with. Nothing to save is logged and skipped;
//!    any other failure is published as [`SyncState::Failed`] plus an
//!    [`EventPayload::SaveFailed`] alert. Neither stops the switch.
//! 2. **Fetches** `next`'s map and hands it to the engine. A room that was
//!    never saved binds with no version and nothing is applied.
//! 3. **Binds** `next` at the fetched version.
//!
//! # Serialisation
//!
//! Transitions never overlap. The binding lives behind an async mutex held
//! for a whole transition, and explicit saves ([`MapSyncCoordinator::save_now`])
//! take the same mutex. Room changes arrive on a `watch` channel, which keeps
//! only the latest value: targets that come and go while a transition is in
//! flight are never visited. A target that supersedes the in-flight one
//! during its save step replaces it before the fetch starts.
//!
//! Every store and engine call is bounded by the configured call timeout; an
//! expiry is a [`RoomSyncError::Network`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use roomsync_middleware::{EventBus, StateCell, Topic, TrackingEngine};
use roomsync_types::{Event, EventPayload, MapVersion, Room, RoomMapBinding, RoomSyncError, SyncState};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::map_store::{RemoteMap, RemoteMapStore};

const SOURCE: &str = "roomsync-runtime::coordinator";

struct Inner {
    store: Arc<dyn RemoteMapStore>,
    engine: Arc<dyn TrackingEngine>,
    bus: EventBus,
    state: StateCell<SyncState>,
    binding: Mutex<Option<RoomMapBinding>>,
    call_timeout: Duration,
}

/// Drives map save/fetch on room changes. Clone it cheaply; clones share
/// state.
#[derive(Clone)]
pub struct MapSyncCoordinator {
    inner: Arc<Inner>,
}

impl MapSyncCoordinator {
    pub fn new(
        store: Arc<dyn RemoteMapStore>,
        engine: Arc<dyn TrackingEngine>,
        bus: EventBus,
        call_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                engine,
                bus,
                state: StateCell::new(SyncState::Idle),
                binding: Mutex::new(None),
                call_timeout,
            }),
        }
    }

    /// Observer for the coordinator's state.
    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.inner.state.get()
    }

    /// The current binding. Waits for an in-flight transition to finish.
    pub async fn binding(&self) -> Option<RoomMapBinding> {
        self.inner.binding.lock().await.clone()
    }

    /// Run [`run`][Self::run] on a new task.
    pub fn spawn(&self, rooms: watch::Receiver<Option<Room>>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(rooms))
    }

    /// React to resolved-room changes until the sender is dropped.
    ///
    /// The value present at call time counts as the first change. `None`
    /// (no room resolved) leaves the current binding alone.
    pub async fn run(self, mut rooms: watch::Receiver<Option<Room>>) {
        let mut target = rooms.borrow_and_update().clone();
        loop {
            if let Some(room) = target.take() {
                self.transition(room, &mut rooms).await;
            }
            if rooms.changed().await.is_err() {
                debug!("room source closed; coordinator stopping");
                break;
            }
            target = rooms.borrow_and_update().clone();
        }
    }

    /// Switch to `room` right now, outside the watch loop.
    pub async fn switch_to(&self, room: Room) {
        // A receiver that never changes: no coalescing.
        let (_tx, mut rx) = watch::channel(None);
        self.transition(room, &mut rx).await;
    }

    /// Save the currently bound room's map and advance its version.
    ///
    /// Waits for any in-flight transition, and blocks transitions while
    /// running.
    ///
    /// # Errors
    ///
    /// * [`RoomSyncError::NotBound`] – no room has been bound yet.
    /// * [`RoomSyncError::NoMapAvailable`] – the engine has nothing to save.
    ///   This is not reported as [`SyncState::Failed`].
    /// * [`RoomSyncError::Network`] / [`RoomSyncError::Decode`] – a remote
    ///   step failed; the version is unchanged.
    pub async fn save_now(&self) -> Result<Uuid, RoomSyncError> {
        let mut guard = self.inner.binding.lock().await;
        let binding = guard.as_mut().ok_or(RoomSyncError::NotBound)?;

        let result = self.save(binding).await;
        match &result {
            Ok(_) => {}
            Err(RoomSyncError::NoMapAvailable) => {
                info!(room = %binding.room.name, "nothing to save");
            }
            Err(e) => {
                warn!(room = %binding.room.name, error = %e, "explicit save failed");
                self.set_state(SyncState::Failed {
                    reason: e.to_string(),
                });
            }
        }
        self.set_state(SyncState::Bound {
            room: binding.room.clone(),
            version: binding.version,
        });
        result
    }

    // -------------------------------------------------------------------------
    // Transition
    // -------------------------------------------------------------------------

    #[instrument(skip_all, fields(to = %next.name))]
    async fn transition(&self, next: Room, rooms: &mut watch::Receiver<Option<Room>>) {
        let mut guard = self.inner.binding.lock().await;
        if guard.as_ref().is_some_and(|b| b.room == next) {
            return;
        }

        if let Some(current) = guard.as_mut() {
            self.save_before_leaving(current).await;
        }

        let latest = if rooms.has_changed().unwrap_or(false) {
            rooms.borrow_and_update().clone()
        } else {
            None
        };
        let mut next = next;
        if let Some(latest) = latest
            && latest != next
        {
            debug!(superseded = %next.name, by = %latest.name, "newer target arrived during save");
            next = latest;
        }

        if let Some(current) = guard.as_ref()
            && current.room == next
        {
            self.set_state(SyncState::Bound {
                room: current.room.clone(),
                version: current.version,
            });
            return;
        }

        let version = self.fetch_and_apply(&next).await;
        info!(room = %next.name, version = ?version, "room bound");
        *guard = Some(RoomMapBinding {
            version,
            room: next.clone(),
        });
        self.set_state(SyncState::Bound {
            room: next,
            version,
        });
    }

    async fn save_before_leaving(&self, binding: &mut RoomMapBinding) {
        match self.save(binding).await {
            Ok(_) => {}
            Err(RoomSyncError::NoMapAvailable) => {
                warn!(room = %binding.room.name, "no map to save before leaving room");
            }
            Err(e) => {
                warn!(room = %binding.room.name, error = %e, "save before switch abandoned");
                let reason = e.to_string();
                self.set_state(SyncState::Failed {
                    reason: reason.clone(),
                });
                self.inner.bus.publish_best_effort(
                    Topic::Alerts,
                    Event::new(
                        SOURCE,
                        EventPayload::SaveFailed {
                            room: binding.room.clone(),
                            reason,
                        },
                    ),
                );
            }
        }
    }

    /// Upload + confirm. Updates `binding.version` only on full success.
    async fn save(&self, binding: &mut RoomMapBinding) -> Result<Uuid, RoomSyncError> {
        self.set_state(SyncState::Saving {
            room: binding.room.clone(),
        });

        let blob = tokio::time::timeout(self.inner.call_timeout, self.inner.engine.current_map_blob())
            .await
            .ok()
            .flatten()
            .ok_or(RoomSyncError::NoMapAvailable)?;

        let store = &self.inner.store;
        let slot = self
            .bounded("request_upload_slot", store.request_upload_slot(&binding.room))
            .await?;
        self.bounded("upload_blob", store.upload_blob(&slot, blob)).await?;
        self.bounded(
            "confirm_upload",
            store.confirm_upload(&binding.room, binding.version, slot.version),
        )
        .await?;

        info!(
            room = %binding.room.name,
            old = ?binding.version,
            new = %slot.version,
            "map saved"
        );
        binding.version = Some(slot.version);
        Ok(slot.version)
    }

    async fn fetch_and_apply(&self, room: &Room) -> MapVersion {
        self.set_state(SyncState::Fetching { room: room.clone() });
        match self.fetch(room).await {
            Ok(Some(remote)) => {
                self.inner.engine.apply_map_blob(remote.blob);
                Some(remote.version)
            }
            Ok(None) => {
                info!(room = %room.name, "room has no saved map");
                None
            }
            Err(e) => {
                warn!(room = %room.name, error = %e, "map fetch failed; binding without a version");
                let reason = e.to_string();
                self.set_state(SyncState::Failed {
                    reason: reason.clone(),
                });
                self.inner.bus.publish_best_effort(
                    Topic::Alerts,
                    Event::new(
                        SOURCE,
                        EventPayload::FetchFailed {
                            room: room.clone(),
                            reason,
                        },
                    ),
                );
                None
            }
        }
    }

    async fn fetch(&self, room: &Room) -> Result<Option<RemoteMap>, RoomSyncError> {
        let store = &self.inner.store;
        let Some(slot) = self.bounded("fetch_map", store.fetch_map(room)).await? else {
            return Ok(None);
        };
        let blob = self.bounded("download_blob", store.download_blob(&slot)).await?;
        Ok(Some(RemoteMap {
            blob,
            version: slot.version,
        }))
    }

    async fn bounded<T>(
        &self,
        call: &str,
        fut: impl Future<Output = Result<T, RoomSyncError>>,
    ) -> Result<T, RoomSyncError> {
        match tokio::time::timeout(self.inner.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RoomSyncError::Network(format!(
                "{call} timed out after {:?}",
                self.inner.call_timeout
            ))),
        }
    }

    fn set_state(&self, state: SyncState) {
        if self.inner.state.set(state.clone()) {
            self.inner
                .bus
                .publish_best_effort(Topic::SyncStatus, Event::new(SOURCE, EventPayload::SyncState(state)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_store::{DownloadSlot, UploadSlot};
    use crate::memory_store::InMemoryMapStore;
    use async_trait::async_trait;
    use roomsync_middleware::SimTrackingEngine;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::{Notify, mpsc};

    // ── Scripted store ───────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        UploadSlot(String),
        Upload(Uuid),
        Confirm { room: String, old: MapVersion, new: Uuid },
        Fetch(String),
        Download(Uuid),
    }

    /// Records every call in order. Optionally fails uploads, holds the
    /// first upload-slot request until released, and serves fixed maps.
    #[derive(Default)]
    struct ScriptedStore {
        calls: StdMutex<Vec<Call>>,
        fail_upload: bool,
        maps: StdMutex<Vec<(Room, Uuid, Vec<u8>)>>,
        hold_upload_slot: Option<Arc<Notify>>,
        slot_requested: Option<mpsc::UnboundedSender<()>>,
    }

    impl ScriptedStore {
        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn fetches(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Fetch(name) => Some(name),
                    _ => None,
                })
                .collect()
        }

        fn with_map(self, room: &Room, version: Uuid, blob: &[u8]) -> Self {
            self.maps.lock().unwrap().push((room.clone(), version, blob.to_vec()));
            self
        }
    }

    #[async_trait]
    impl RemoteMapStore for ScriptedStore {
        async fn request_upload_slot(&self, room: &Room) -> Result<UploadSlot, RoomSyncError> {
            self.record(Call::UploadSlot(room.name.clone()));
            if let Some(tx) = &self.slot_requested {
                let _ = tx.send(());
            }
            if let Some(gate) = &self.hold_upload_slot {
                gate.notified().await;
            }
            Ok(UploadSlot {
                url: "mem://slot".into(),
                version: Uuid::new_v4(),
            })
        }

        async fn upload_blob(&self, slot: &UploadSlot, _blob: Vec<u8>) -> Result<(), RoomSyncError> {
            self.record(Call::Upload(slot.version));
            if self.fail_upload {
                return Err(RoomSyncError::Network("upload returned HTTP 500".into()));
            }
            Ok(())
        }

        async fn confirm_upload(
            &self,
            room: &Room,
            old_version: MapVersion,
            new_version: Uuid,
        ) -> Result<(), RoomSyncError> {
            self.record(Call::Confirm {
                room: room.name.clone(),
                old: old_version,
                new: new_version,
            });
            Ok(())
        }

        async fn fetch_map(&self, room: &Room) -> Result<Option<DownloadSlot>, RoomSyncError> {
            self.record(Call::Fetch(room.name.clone()));
            Ok(self
                .maps
                .lock()
                .unwrap()
                .iter()
                .find(|(r, _, _)| r == room)
                .map(|(_, version, _)| DownloadSlot {
                    url: "mem://map".into(),
                    version: *version,
                }))
        }

        async fn download_blob(&self, slot: &DownloadSlot) -> Result<Vec<u8>, RoomSyncError> {
            self.record(Call::Download(slot.version));
            self.maps
                .lock()
                .unwrap()
                .iter()
                .find(|(_, v, _)| *v == slot.version)
                .map(|(_, _, blob)| blob.clone())
                .ok_or_else(|| RoomSyncError::Network("missing".into()))
        }
    }

    fn room(name: &str) -> Room {
        Room::new(Uuid::new_v4(), name)
    }

    fn coordinator(store: Arc<dyn RemoteMapStore>, engine: Arc<SimTrackingEngine>) -> MapSyncCoordinator {
        MapSyncCoordinator::new(store, engine, EventBus::default(), Duration::from_secs(2))
    }

    async fn wait_bound(rx: &mut watch::Receiver<SyncState>, room: &Room) {
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| matches!(s, SyncState::Bound { room: r, .. } if r == room)),
        )
        .await
        .expect("bound in time")
        .expect("coordinator alive");
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_room_is_fetched_without_saving() {
        let lab = room("Lab");
        let v = Uuid::new_v4();
        let store = Arc::new(ScriptedStore::default().with_map(&lab, v, b"lab-map"));
        let engine = Arc::new(SimTrackingEngine::new().with_current_map(b"fresh".to_vec()));
        let coord = coordinator(store.clone(), engine.clone());

        coord.switch_to(lab.clone()).await;

        assert_eq!(store.calls(), vec![Call::Fetch("Lab".into()), Call::Download(v)]);
        assert_eq!(engine.applied_maps(), vec![b"lab-map".to_vec()]);
        assert_eq!(coord.binding().await, Some(RoomMapBinding { version: Some(v), room: lab.clone() }));
        assert_eq!(coord.state(), SyncState::Bound { room: lab, version: Some(v) });
    }

    #[tokio::test]
    async fn switch_saves_previous_room_before_fetching_next() {
        let (a, b) = (room("A"), room("B"));
        let v = Uuid::new_v4();
        let store = Arc::new(ScriptedStore::default().with_map(&a, v, b"a-map"));
        let engine = Arc::new(SimTrackingEngine::new());
        let coord = coordinator(store.clone(), engine.clone());

        coord.switch_to(a.clone()).await;
        engine.set_current_map(Some(b"a-edited".to_vec()));
        coord.switch_to(b.clone()).await;

        let calls = store.calls();
        let Call::Upload(v2) = calls[3].clone() else {
            panic!("expected upload, got {calls:?}");
        };
        assert_eq!(
            calls[2..],
            [
                Call::UploadSlot("A".into()),
                Call::Upload(v2),
                Call::Confirm { room: "A".into(), old: Some(v), new: v2 },
                Call::Fetch("B".into()),
            ]
        );
        assert_eq!(coord.binding().await, Some(RoomMapBinding { version: None, room: b }));
    }

    #[tokio::test]
    async fn failed_save_does_not_block_the_fetch() {
        let (a, b) = (room("A"), room("B"));
        let v = Uuid::new_v4();
        let store = Arc::new(ScriptedStore {
            fail_upload: true,
            ..ScriptedStore::default()
        }
        .with_map(&a, v, b"a-map"));
        let engine = Arc::new(SimTrackingEngine::new().with_current_map(b"a-edited".to_vec()));
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        let coord = MapSyncCoordinator::new(store.clone(), engine, bus, Duration::from_secs(2));

        coord.switch_to(a.clone()).await;
        coord.switch_to(b.clone()).await;

        let calls = store.calls();
        assert!(matches!(calls[2], Call::UploadSlot(_)));
        assert!(matches!(calls[3], Call::Upload(_)));
        assert_eq!(calls[4], Call::Fetch("B".into()), "no confirm after a failed upload");
        assert_eq!(coord.state(), SyncState::Bound { room: b, version: None });

        let event = alerts.try_recv().expect("save failure must be published");
        assert!(matches!(event.payload, EventPayload::SaveFailed { room, .. } if room == a));
    }

    #[tokio::test]
    async fn nothing_to_save_skips_upload() {
        let (a, b) = (room("A"), room("B"));
        let store = Arc::new(ScriptedStore::default());
        let engine = Arc::new(SimTrackingEngine::new());
        let coord = coordinator(store.clone(), engine);

        coord.switch_to(a).await;
        coord.switch_to(b).await;

        assert_eq!(store.calls(), vec![Call::Fetch("A".into()), Call::Fetch("B".into())]);
    }

    #[tokio::test]
    async fn room_without_saved_map_binds_with_no_version_and_no_apply() {
        let empty = room("Empty");
        let store = Arc::new(ScriptedStore::default());
        let engine = Arc::new(SimTrackingEngine::new());
        let coord = coordinator(store, engine.clone());

        coord.switch_to(empty.clone()).await;

        assert!(engine.applied_maps().is_empty());
        assert_eq!(coord.state(), SyncState::Bound { room: empty, version: None });
    }

    #[tokio::test]
    async fn same_room_is_not_a_transition() {
        let lab = room("Lab");
        let store = Arc::new(ScriptedStore::default());
        let coord = coordinator(store.clone(), Arc::new(SimTrackingEngine::new()));

        coord.switch_to(lab.clone()).await;
        coord.switch_to(lab).await;

        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn rapid_changes_during_save_coalesce_to_latest_room() {
        let (a, b, c) = (room("A"), room("B"), room("C"));
        let gate = Arc::new(Notify::new());
        let (slot_tx, mut slot_rx) = mpsc::unbounded_channel();
        let store = Arc::new(ScriptedStore {
            hold_upload_slot: Some(gate.clone()),
            slot_requested: Some(slot_tx),
            ..ScriptedStore::default()
        });
        let engine = Arc::new(SimTrackingEngine::new().with_current_map(b"a-map".to_vec()));
        let coord = coordinator(store.clone(), engine);
        let mut state = coord.sync_state();

        let (rooms_tx, rooms_rx) = watch::channel(Some(a.clone()));
        let task = coord.spawn(rooms_rx);
        wait_bound(&mut state, &a).await;

        rooms_tx.send(Some(b.clone())).unwrap();
        // A's save is now parked inside request_upload_slot.
        slot_rx.recv().await.expect("upload slot requested");
        rooms_tx.send(Some(c.clone())).unwrap();
        gate.notify_one();

        wait_bound(&mut state, &c).await;
        assert_eq!(store.fetches(), vec!["A".to_string(), "C".to_string()]);

        drop(rooms_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn returning_to_the_room_being_left_skips_the_fetch() {
        let (a, b) = (room("A"), room("B"));
        let gate = Arc::new(Notify::new());
        let (slot_tx, mut slot_rx) = mpsc::unbounded_channel();
        let store = Arc::new(ScriptedStore {
            hold_upload_slot: Some(gate.clone()),
            slot_requested: Some(slot_tx),
            ..ScriptedStore::default()
        });
        let engine = Arc::new(SimTrackingEngine::new().with_current_map(b"a-map".to_vec()));
        let coord = coordinator(store.clone(), engine);
        let mut state = coord.sync_state();

        let (rooms_tx, rooms_rx) = watch::channel(Some(a.clone()));
        let task = coord.spawn(rooms_rx);
        wait_bound(&mut state, &a).await;

        rooms_tx.send(Some(b)).unwrap();
        slot_rx.recv().await.expect("upload slot requested");
        rooms_tx.send(Some(a.clone())).unwrap();
        gate.notify_one();

        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| matches!(s, SyncState::Bound { room, version: Some(_) } if *room == a)),
        )
        .await
        .expect("rebound in time")
        .expect("coordinator alive");
        drop(rooms_tx);
        task.await.unwrap();

        let calls = store.calls();
        let Some(Call::Upload(saved)) = calls.iter().find(|c| matches!(c, Call::Upload(_))).cloned() else {
            panic!("expected an upload, got {calls:?}");
        };
        assert_eq!(store.fetches(), vec!["A".to_string()]);
        assert!(!calls.contains(&Call::Fetch("B".into())));
        assert_eq!(coord.binding().await, Some(RoomMapBinding { version: Some(saved), room: a.clone() }));
        assert_eq!(coord.state(), SyncState::Bound { room: a, version: Some(saved) });
    }

    #[tokio::test]
    async fn none_room_keeps_current_binding() {
        let a = room("A");
        let store = Arc::new(ScriptedStore::default());
        let coord = coordinator(store.clone(), Arc::new(SimTrackingEngine::new()));
        let mut state = coord.sync_state();

        let (rooms_tx, rooms_rx) = watch::channel(Some(a.clone()));
        let task = coord.spawn(rooms_rx);
        wait_bound(&mut state, &a).await;

        rooms_tx.send(None).unwrap();
        drop(rooms_tx);
        task.await.unwrap();

        assert_eq!(coord.binding().await.map(|b| b.room), Some(a));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn explicit_save_advances_version_in_place() {
        let lab = room("Lab");
        let store = Arc::new(InMemoryMapStore::new());
        let engine = Arc::new(SimTrackingEngine::new().with_current_map(b"v1".to_vec()));
        let coord = coordinator(store.clone(), engine.clone());

        assert_eq!(coord.save_now().await, Err(RoomSyncError::NotBound));

        coord.switch_to(lab.clone()).await;
        let v1 = coord.save_now().await.expect("first save");
        engine.set_current_map(Some(b"v2".to_vec()));
        let v2 = coord.save_now().await.expect("second save");

        assert_ne!(v1, v2);
        assert_eq!(store.version_of(&lab), Some(v2));
        assert_eq!(store.blob_of(&lab), Some(b"v2".to_vec()));
        assert_eq!(coord.binding().await.and_then(|b| b.version), Some(v2));
    }

    #[tokio::test]
    async fn explicit_save_surfaces_errors() {
        let lab = room("Lab");
        let store = Arc::new(ScriptedStore {
            fail_upload: true,
            ..ScriptedStore::default()
        });
        let engine = Arc::new(SimTrackingEngine::new().with_current_map(b"map".to_vec()));
        let coord = coordinator(store, engine.clone());
        coord.switch_to(lab.clone()).await;

        assert!(matches!(coord.save_now().await, Err(RoomSyncError::Network(_))));
        assert_eq!(coord.state(), SyncState::Bound { room: lab, version: None });

        engine.set_current_map(None);
        assert_eq!(coord.save_now().await, Err(RoomSyncError::NoMapAvailable));
    }

    #[tokio::test]
    async fn explicit_save_with_nothing_to_save_is_not_a_failure() {
        let lab = room("Lab");
        let bus = EventBus::default();
        let mut status = bus.subscribe_to(Topic::SyncStatus);
        let coord = MapSyncCoordinator::new(
            Arc::new(ScriptedStore::default()),
            Arc::new(SimTrackingEngine::new()),
            bus,
            Duration::from_secs(2),
        );
        coord.switch_to(lab.clone()).await;

        assert_eq!(coord.save_now().await, Err(RoomSyncError::NoMapAvailable));
        assert_eq!(coord.state(), SyncState::Bound { room: lab, version: None });

        let mut states = Vec::new();
        while let Ok(event) = status.try_recv() {
            if let EventPayload::SyncState(state) = event.payload {
                states.push(state);
            }
        }
        assert!(!states.is_empty());
        assert!(
            !states.iter().any(|s| matches!(s, SyncState::Failed { .. })),
            "unexpected failure in {states:?}"
        );
    }

    #[tokio::test]
    async fn saved_version_round_trips_through_the_store() {
        let (a, b) = (room("A"), room("B"));
        let store = Arc::new(InMemoryMapStore::new());
        let engine = Arc::new(SimTrackingEngine::new().with_current_map(b"a-map".to_vec()));
        let coord = coordinator(store.clone(), engine.clone());

        coord.switch_to(a.clone()).await;
        coord.switch_to(b).await;
        let saved = store.version_of(&a).expect("A saved on leave");

        coord.switch_to(a.clone()).await;
        assert_eq!(coord.binding().await, Some(RoomMapBinding { version: Some(saved), room: a }));
        assert_eq!(engine.applied_maps().last(), Some(&b"a-map".to_vec()));
    }

    #[tokio::test]
    async fn stalled_store_call_times_out() {
        struct Stalled;

        #[async_trait]
        impl RemoteMapStore for Stalled {
            async fn request_upload_slot(&self, _: &Room) -> Result<UploadSlot, RoomSyncError> {
                std::future::pending().await
            }
            async fn upload_blob(&self, _: &UploadSlot, _: Vec<u8>) -> Result<(), RoomSyncError> {
                std::future::pending().await
            }
            async fn confirm_upload(&self, _: &Room, _: MapVersion, _: Uuid) -> Result<(), RoomSyncError> {
                std::future::pending().await
            }
            async fn fetch_map(&self, _: &Room) -> Result<Option<DownloadSlot>, RoomSyncError> {
                std::future::pending().await
            }
            async fn download_blob(&self, _: &DownloadSlot) -> Result<Vec<u8>, RoomSyncError> {
                std::future::pending().await
            }
        }

        let lab = room("Lab");
        let coord = MapSyncCoordinator::new(
            Arc::new(Stalled),
            Arc::new(SimTrackingEngine::new()),
            EventBus::default(),
            Duration::from_millis(50),
        );
        coord.switch_to(lab.clone()).await;
        assert_eq!(coord.state(), SyncState::Bound { room: lab, version: None });
    }
}
