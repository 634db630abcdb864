//! Proximity aggregation.
//!
//! The sensing layer ranges several regions independently and reports each
//! region's full beacon list whenever a pass completes. [`ProximityAggregator`]
//! keeps the latest list per region (source group), flattens them, and
//! buckets the result by [`ProximityRank`].
//!
//! Each report **replaces** the group's previous contribution. There is no
//! incremental patching: a beacon missing from a group's new list is gone.
//!
//! A merged snapshot is only handed back when it differs, as a value, from
//! the last one handed back. Reordered or duplicated reports therefore cost
//! downstream nothing.
//!
//! # Example
//!
//! ```rust
//! use roomsync_perception::proximity::ProximityAggregator;
//! use roomsync_types::{BeaconIdentity, ProximityRank, RangedBeacon};
//! use uuid::Uuid;
//!
//! let beacon = BeaconIdentity::new(Uuid::nil(), 1, 7);
//! let mut aggregator = ProximityAggregator::new();
//!
//! let first = aggregator.report_sighting("lobby", vec![RangedBeacon::new(beacon, ProximityRank::Near)]);
//! assert!(first.is_some());
//!
//! // Same content again: suppressed.
//! let again = aggregator.report_sighting("lobby", vec![RangedBeacon::new(beacon, ProximityRank::Near)]);
//! assert!(again.is_none());
//! ```

use std::collections::HashMap;

use roomsync_types::{ProximityRank, RangedBeacon, SightingSnapshot};
use tracing::trace;

/// Merges per-group ranging reports into one [`SightingSnapshot`].
#[derive(Debug, Default)]
pub struct ProximityAggregator {
    groups: HashMap<String, Vec<RangedBeacon>>,
    /// Last snapshot handed back to the caller. Starts empty, so an empty
    /// first report is itself a no-op.
    published: SightingSnapshot,
}

impl ProximityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `group`'s contribution with `beacons`.
    ///
    /// Returns the new merged snapshot if it differs from the previously
    /// returned one, `None` otherwise.
    pub fn report_sighting(
        &mut self,
        group: impl Into<String>,
        beacons: Vec<RangedBeacon>,
    ) -> Option<SightingSnapshot> {
        let group = group.into();
        trace!(%group, count = beacons.len(), "sighting report");
        self.groups.insert(group, beacons);
        self.republish()
    }

    /// Drop `group`'s contribution entirely (the region was left).
    ///
    /// Same change-suppression rule as [`report_sighting`][Self::report_sighting].
    pub fn remove_group(&mut self, group: &str) -> Option<SightingSnapshot> {
        self.groups.remove(group)?;
        self.republish()
    }

    /// The last snapshot handed back.
    pub fn snapshot(&self) -> &SightingSnapshot {
        &self.published
    }

    /// Number of groups currently contributing (including empty ones).
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn republish(&mut self) -> Option<SightingSnapshot> {
        let merged = SightingSnapshot::from_ranged(self.groups.values().flatten().copied());
        if merged == self.published {
            return None;
        }
        trace!(
            immediate = merged.beacons(ProximityRank::Immediate).len(),
            near = merged.beacons(ProximityRank::Near).len(),
            far = merged.beacons(ProximityRank::Far).len(),
            unknown = merged.beacons(ProximityRank::Unknown).len(),
            "merged snapshot changed"
        );
        self.published = merged.clone();
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_types::BeaconIdentity;
    use uuid::Uuid;

    fn beacon(minor: u16) -> BeaconIdentity {
        BeaconIdentity::new(Uuid::from_u128(1), 100, minor)
    }

    fn ranged(minor: u16, rank: ProximityRank) -> RangedBeacon {
        RangedBeacon::new(beacon(minor), rank)
    }

    #[test]
    fn empty_first_report_is_suppressed() {
        let mut agg = ProximityAggregator::new();
        assert!(agg.report_sighting("a", vec![]).is_none());
        assert_eq!(agg.group_count(), 1);
    }

    #[test]
    fn identical_report_is_suppressed() {
        let mut agg = ProximityAggregator::new();
        let report = vec![ranged(1, ProximityRank::Near), ranged(2, ProximityRank::Far)];
        assert!(agg.report_sighting("a", report.clone()).is_some());
        assert!(agg.report_sighting("a", report).is_none());
    }

    #[test]
    fn reordered_report_is_suppressed() {
        let mut agg = ProximityAggregator::new();
        agg.report_sighting("a", vec![ranged(1, ProximityRank::Near), ranged(2, ProximityRank::Near)]);
        let again =
            agg.report_sighting("a", vec![ranged(2, ProximityRank::Near), ranged(1, ProximityRank::Near)]);
        assert!(again.is_none());
    }

    #[test]
    fn report_replaces_previous_group_contribution() {
        let mut agg = ProximityAggregator::new();
        agg.report_sighting("a", vec![ranged(1, ProximityRank::Near), ranged(2, ProximityRank::Near)]);

        let snapshot = agg
            .report_sighting("a", vec![ranged(2, ProximityRank::Immediate)])
            .expect("contents changed");
        assert!(snapshot.beacons(ProximityRank::Near).is_empty());
        assert_eq!(snapshot.beacons(ProximityRank::Immediate), &[beacon(2)]);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn groups_are_merged_by_rank() {
        let mut agg = ProximityAggregator::new();
        agg.report_sighting("a", vec![ranged(1, ProximityRank::Near)]);
        let snapshot = agg
            .report_sighting("b", vec![ranged(2, ProximityRank::Near), ranged(3, ProximityRank::Far)])
            .expect("new group adds beacons");

        assert_eq!(snapshot.beacons(ProximityRank::Near), &[beacon(1), beacon(2)]);
        assert_eq!(snapshot.beacons(ProximityRank::Far), &[beacon(3)]);
        assert_eq!(agg.snapshot(), &snapshot);
    }

    #[test]
    fn new_group_with_already_seen_beacons_is_suppressed() {
        let mut agg = ProximityAggregator::new();
        agg.report_sighting("a", vec![ranged(1, ProximityRank::Near)]);
        assert!(agg.report_sighting("b", vec![ranged(1, ProximityRank::Near)]).is_none());
    }

    #[test]
    fn removing_group_drops_its_beacons() {
        let mut agg = ProximityAggregator::new();
        agg.report_sighting("a", vec![ranged(1, ProximityRank::Near)]);
        agg.report_sighting("b", vec![ranged(2, ProximityRank::Far)]);

        let snapshot = agg.remove_group("b").expect("beacon 2 disappeared");
        assert!(snapshot.beacons(ProximityRank::Far).is_empty());
        assert!(agg.remove_group("b").is_none(), "unknown group is a no-op");
    }

    #[test]
    fn never_emits_two_consecutive_identical_snapshots() {
        let mut agg = ProximityAggregator::new();
        let script: Vec<(&str, Vec<RangedBeacon>)> = vec![
            ("a", vec![ranged(1, ProximityRank::Near)]),
            ("a", vec![ranged(1, ProximityRank::Near)]),
            ("b", vec![ranged(1, ProximityRank::Near)]),
            ("b", vec![ranged(2, ProximityRank::Far)]),
            ("a", vec![]),
            ("a", vec![]),
            ("b", vec![ranged(2, ProximityRank::Far), ranged(2, ProximityRank::Far)]),
            ("b", vec![]),
            ("c", vec![]),
            ("a", vec![ranged(3, ProximityRank::Immediate), ranged(1, ProximityRank::Near)]),
            ("a", vec![ranged(1, ProximityRank::Near), ranged(3, ProximityRank::Immediate)]),
        ];

        let mut last: Option<SightingSnapshot> = None;
        let mut emitted = 0;
        for (group, beacons) in script {
            if let Some(snapshot) = agg.report_sighting(group, beacons) {
                assert_ne!(last.as_ref(), Some(&snapshot), "duplicate emission");
                last = Some(snapshot);
                emitted += 1;
            }
        }
        assert_eq!(emitted, 5);
    }
}
