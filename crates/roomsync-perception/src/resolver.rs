//! Room resolution.
//!
//! [`RoomResolver`] owns the beacon-to-room cache and decides which room the
//! client is in from the latest [`SightingSnapshot`].
//!
//! # Cache
//!
//! Each beacon is looked up remotely at most once per session. The cache
//! maps a beacon to `Some(room)`, or to `None` when the lookup came back
//! empty or failed. A beacon with no entry has not been answered yet; if it
//! also sits in the in-flight set, a lookup is already on its way and a
//! second one is never requested. Entries are never evicted or overwritten.
//!
//! # Selection
//!
//! 1. If any sighted beacon has no cache entry, stop: partial data never
//!    produces a room.
//! 2. Walk the ranks nearest first. The first rank whose beacons resolve to
//!    at least one room provides the candidates; farther ranks are ignored.
//! 3. The most frequent candidate wins.
//! 4. On a tie, the previously selected room is kept if it is among the
//!    tied rooms; otherwise the room with the lowest id wins.
//! 5. No candidates at all resolves to no room.
//!
//! An update is reported only when the selected room differs from the
//! current one.

use std::collections::{BTreeMap, HashMap, HashSet};

use roomsync_types::{BeaconIdentity, ProximityRank, Room, SightingSnapshot};
use tracing::{debug, trace};

/// A change of the resolved room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomUpdate {
    pub previous: Option<Room>,
    pub current: Option<Room>,
}

/// Result of feeding a new snapshot to the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Beacons the caller must now look up. Each is marked in flight and will
    /// not be returned again until answered via
    /// [`RoomResolver::record_lookup`].
    pub lookups: Vec<BeaconIdentity>,
    /// Set when the snapshot alone changed the resolved room.
    pub update: Option<RoomUpdate>,
}

/// Beacon-to-room cache plus the room selection state machine.
#[derive(Debug, Default)]
pub struct RoomResolver {
    cache: HashMap<BeaconIdentity, Option<Room>>,
    in_flight: HashSet<BeaconIdentity>,
    snapshot: SightingSnapshot,
    /// Last room actually selected; only used to break ties.
    last_computed: Option<Room>,
    current: Option<Room>,
}

impl RoomResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `snapshot` as the new view of the world.
    pub fn observe(&mut self, snapshot: SightingSnapshot) -> Observation {
        let mut lookups = Vec::new();
        for beacon in snapshot.all_beacons() {
            if !self.cache.contains_key(beacon) && self.in_flight.insert(*beacon) {
                lookups.push(*beacon);
            }
        }
        if !lookups.is_empty() {
            debug!(count = lookups.len(), "new beacons need a room lookup");
        }
        self.snapshot = snapshot;
        Observation {
            lookups,
            update: self.compute_room(),
        }
    }

    /// Store the answer of a lookup and re-run selection.
    ///
    /// `room` is `None` both for "no room bound to this beacon" and for a
    /// failed lookup. An answer for a beacon that already has an entry is
    /// ignored.
    pub fn record_lookup(&mut self, beacon: BeaconIdentity, room: Option<Room>) -> Option<RoomUpdate> {
        self.in_flight.remove(&beacon);
        match self.cache.get(&beacon) {
            Some(_) => trace!(%beacon, "duplicate lookup answer ignored"),
            None => {
                debug!(%beacon, room = ?room.as_ref().map(|r| &r.name), "beacon resolved");
                self.cache.insert(beacon, room);
            }
        }
        self.compute_room()
    }

    /// Re-run room selection against the current snapshot and cache.
    pub fn compute_room(&mut self) -> Option<RoomUpdate> {
        let selected = self.select_room()?;
        if let Some(room) = &selected {
            self.last_computed = Some(room.clone());
        }
        if selected == self.current {
            return None;
        }
        let previous = std::mem::replace(&mut self.current, selected.clone());
        debug!(
            from = ?previous.as_ref().map(|r| &r.name),
            to = ?selected.as_ref().map(|r| &r.name),
            "resolved room changed"
        );
        Some(RoomUpdate {
            previous,
            current: selected,
        })
    }

    /// The currently resolved room.
    pub fn current_room(&self) -> Option<&Room> {
        self.current.as_ref()
    }

    /// Cache lookup: `None` = never answered, `Some(None)` = no room bound.
    pub fn cached(&self, beacon: &BeaconIdentity) -> Option<Option<&Room>> {
        self.cache.get(beacon).map(Option::as_ref)
    }

    /// Number of beacons with a cache entry.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of lookups handed out but not yet answered.
    pub fn lookups_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// `None` when data is incomplete, `Some(selection)` otherwise.
    fn select_room(&self) -> Option<Option<Room>> {
        if let Some(missing) = self.snapshot.all_beacons().find(|b| !self.cache.contains_key(b)) {
            trace!(beacon = %missing, "waiting for lookups before resolving");
            return None;
        }

        let candidates: Vec<&Room> = ProximityRank::ALL
            .iter()
            .map(|rank| {
                self.snapshot
                    .beacons(*rank)
                    .iter()
                    .filter_map(|b| self.cache.get(b).and_then(Option::as_ref))
                    .collect::<Vec<_>>()
            })
            .find(|rooms| !rooms.is_empty())
            .unwrap_or_default();

        let mut frequency: BTreeMap<&Room, usize> = BTreeMap::new();
        for room in candidates {
            *frequency.entry(room).or_default() += 1;
        }
        let Some(max) = frequency.values().copied().max() else {
            return Some(None);
        };

        // BTreeMap iterates by room id, so `first` is the lowest id.
        let tied: Vec<&Room> = frequency
            .iter()
            .filter(|(_, count)| **count == max)
            .map(|(room, _)| *room)
            .collect();

        let chosen = match &self.last_computed {
            Some(last) if tied.len() > 1 && tied.contains(&last) => last,
            _ => tied[0],
        };
        Some(Some(chosen.clone()))
    }
}
