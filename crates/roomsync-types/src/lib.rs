use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity triple broadcast by a short-range beacon.
///
/// Serialises as `{"uuid": .., "major": .., "minor": ..}`, which is also the
/// body of the remote room lookup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeaconIdentity {
    /// Namespace UUID shared by every beacon of a deployment.
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
}

impl BeaconIdentity {
    pub fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self { uuid, major, minor }
    }
}

impl fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.uuid, self.major, self.minor)
    }
}

/// Coarse distance bucket assigned by the sensing layer.
///
/// Variants are declared nearest first, so the derived `Ord` sorts
/// `Immediate < Near < Far < Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProximityRank {
    Immediate,
    Near,
    Far,
    Unknown,
}

impl ProximityRank {
    /// Every rank, nearest to farthest.
    pub const ALL: [ProximityRank; 4] = [
        ProximityRank::Immediate,
        ProximityRank::Near,
        ProximityRank::Far,
        ProximityRank::Unknown,
    ];
}

impl fmt::Display for ProximityRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProximityRank::Immediate => "immediate",
            ProximityRank::Near => "near",
            ProximityRank::Far => "far",
            ProximityRank::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for ProximityRank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(ProximityRank::Immediate),
            "near" => Ok(ProximityRank::Near),
            "far" => Ok(ProximityRank::Far),
            "unknown" => Ok(ProximityRank::Unknown),
            other => Err(format!("unknown proximity rank '{other}'")),
        }
    }
}

/// A single beacon as ranged by the sensing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangedBeacon {
    pub identity: BeaconIdentity,
    pub rank: ProximityRank,
}

impl RangedBeacon {
    pub fn new(identity: BeaconIdentity, rank: ProximityRank) -> Self {
        Self { identity, rank }
    }
}

/// Merged view of every currently ranged beacon, bucketed by proximity.
///
/// The representation is canonical: buckets are keyed in rank order, each
/// bucket is sorted and de-duplicated, and empty buckets are absent. Two
/// snapshots built from the same beacons therefore compare equal regardless
/// of the order in which sightings arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightingSnapshot {
    buckets: BTreeMap<ProximityRank, Vec<BeaconIdentity>>,
}

impl SightingSnapshot {
    /// An empty snapshot (nothing in range).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the canonical snapshot from an unordered set of ranged beacons.
    pub fn from_ranged<I>(ranged: I) -> Self
    where
        I: IntoIterator<Item = RangedBeacon>,
    {
        let mut buckets: BTreeMap<ProximityRank, Vec<BeaconIdentity>> = BTreeMap::new();
        for beacon in ranged {
            buckets.entry(beacon.rank).or_default().push(beacon.identity);
        }
        for bucket in buckets.values_mut() {
            bucket.sort();
            bucket.dedup();
        }
        Self { buckets }
    }

    /// Beacons ranged at `rank` (empty slice when the bucket is absent).
    pub fn beacons(&self, rank: ProximityRank) -> &[BeaconIdentity] {
        self.buckets.get(&rank).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty buckets, nearest first.
    pub fn ranks(&self) -> impl Iterator<Item = (ProximityRank, &[BeaconIdentity])> {
        self.buckets.iter().map(|(rank, beacons)| (*rank, beacons.as_slice()))
    }

    /// Every beacon across all ranks, nearest first.
    pub fn all_beacons(&self) -> impl Iterator<Item = &BeaconIdentity> {
        self.buckets.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of (rank, beacon) entries.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// A physical room, the unit of spatial identity.
///
/// Equality, hashing and ordering use `id` only; `name` is display data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
}

impl Room {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl PartialEq for Room {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Room {}

impl Hash for Room {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Room {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Room {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Version token of the last persisted map for a room. `None` means the room
/// has never been saved.
pub type MapVersion = Option<Uuid>;

/// What the sync coordinator last reconciled against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMapBinding {
    pub version: MapVersion,
    pub room: Room,
}

/// Lifecycle of the map sync coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    /// No room has been bound yet.
    #[default]
    Idle,
    /// Uploading the map of `room` before leaving it.
    Saving { room: Room },
    /// Downloading the map of `room` after entering it.
    Fetching { room: Room },
    /// Reconciled with `room` at `version`.
    Bound { room: Room, version: MapVersion },
    /// The last save or fetch step failed.
    Failed { reason: String },
}

/// World-mapping quality reported by the tracking engine. Passed through to
/// observers unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WorldMappingStatus {
    #[default]
    NotAvailable,
    Limited,
    Extending,
    Mapped,
}

impl fmt::Display for WorldMappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorldMappingStatus::NotAvailable => "not available",
            WorldMappingStatus::Limited => "limited",
            WorldMappingStatus::Extending => "extending",
            WorldMappingStatus::Mapped => "mapped",
        };
        f.write_str(label)
    }
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"roomsync-runtime::coordinator"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current UTC time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A new merged sighting snapshot.
    Sightings(SightingSnapshot),
    /// The resolved room changed.
    RoomChanged {
        previous: Option<Room>,
        current: Option<Room>,
    },
    /// The sync coordinator changed state.
    SyncState(SyncState),
    /// An automatic save was abandoned; the room switch went ahead anyway.
    SaveFailed { room: Room, reason: String },
    /// Fetching the map of a newly entered room failed; the room was bound
    /// without a version.
    FetchFailed { room: Room, reason: String },
    /// The tracking engine reported a new mapping quality.
    MappingStatus(WorldMappingStatus),
}

/// Error type shared by every roomsync crate.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomSyncError {
    #[error("Room lookup failed: {0}")]
    LookupFailure(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No map available")]
    NoMapAvailable,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No room is currently bound")]
    NotBound,

    #[error("Channel error: {0}")]
    Channel(String),
}
