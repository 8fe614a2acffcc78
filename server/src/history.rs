//! Per-actor rewind history: a time-bounded, newest-first sequence of
//! hit-volume snapshots recorded once per authoritative tick, plus the
//! floor-semantics lookup that maps a client-reported timestamp to the
//! snapshot the verifier should test against.

use crate::geometry::{VolumeId, VolumeSnapshot};
use log::debug;
use shared::ActorId;
use std::collections::{HashMap, VecDeque};

/// Maximum age, in seconds, of retained history. Claims older than this are
/// unverifiable by policy.
pub const MAX_REWIND_WINDOW: f64 = 3.0;

/// Immutable capture of every hit-volume transform of one actor at one
/// server timestamp. `volumes` may hold fewer entries than the live volume
/// set if a volume was transiently unavailable at capture time; that is
/// tolerated everywhere downstream.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub owner: ActorId,
    pub timestamp: f64,
    pub volumes: HashMap<VolumeId, VolumeSnapshot>,
}

/// Bounded history of one actor's snapshots, newest first.
///
/// Only the owning actor's authoritative tick appends. The deque gives
/// O(1) push-front and pop-back, which matters because recording runs
/// every tick for every live character; the only linear walk left is the
/// floor scan in [`RewindHistory::locate`], bounded by tick rate times the
/// rewind window.
#[derive(Debug)]
pub struct RewindHistory {
    owner: ActorId,
    max_rewind_window: f64,
    snapshots: VecDeque<Snapshot>,
}

impl RewindHistory {
    pub fn new(owner: ActorId, max_rewind_window: f64) -> Self {
        Self {
            owner,
            max_rewind_window,
            snapshots: VecDeque::new(),
        }
    }

    /// Appends a snapshot taken at `now` and prunes entries older than the
    /// rewind window. The most recent entry is never pruned, so a history
    /// that has recorded once is never left empty.
    pub fn record(&mut self, now: f64, volumes: HashMap<VolumeId, VolumeSnapshot>) {
        self.snapshots.push_front(Snapshot {
            owner: self.owner,
            timestamp: now,
            volumes,
        });

        while self.snapshots.len() >= 2 {
            let span = match (self.snapshots.front(), self.snapshots.back()) {
                (Some(newest), Some(oldest)) => newest.timestamp - oldest.timestamp,
                _ => break,
            };
            if span <= self.max_rewind_window {
                break;
            }
            self.snapshots.pop_back();
        }
    }

    /// Finds the snapshot matching `query_time` under floor semantics: the
    /// newest sample at or before the query time.
    ///
    /// Rejections: an empty history, or a query older than the oldest
    /// retained sample. Queries at or past the newest sample clamp to the
    /// newest, which covers zero-latency and future-stamped claims.
    ///
    /// This is deliberately a floor, not an interpolation between the two
    /// bracketing samples: it trades up to one tick of positional error
    /// for never having to blend orientations and extents. Tests pin the
    /// policy down so a change to interpolation cannot slip in silently.
    pub fn locate(&self, query_time: f64) -> Option<&Snapshot> {
        let newest = self.snapshots.front()?;
        let oldest = self.snapshots.back()?;

        if query_time < oldest.timestamp {
            debug!(
                "rewind rejected for actor {}: claim at {:.3}s precedes oldest sample {:.3}s",
                self.owner, query_time, oldest.timestamp
            );
            return None;
        }
        if query_time >= newest.timestamp {
            return Some(newest);
        }

        // Scan newest to oldest for the first sample at or before the
        // query time. The oldest entry is the floor of last resort.
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.timestamp <= query_time)
            .or(Some(oldest))
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn window(&self) -> f64 {
        self.max_rewind_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn volumes_at(z: f32) -> HashMap<VolumeId, VolumeSnapshot> {
        let mut volumes = HashMap::new();
        volumes.insert(
            crate::geometry::HEAD,
            VolumeSnapshot {
                center: Vec3::new(0.0, 1.7, z),
                orientation: Quat::IDENTITY,
                half_extents: Vec3::splat(0.12),
            },
        );
        volumes
    }

    fn history_with_samples(times: &[f64]) -> RewindHistory {
        let mut history = RewindHistory::new(1, MAX_REWIND_WINDOW);
        for &t in times {
            history.record(t, volumes_at(t as f32));
        }
        history
    }

    #[test]
    fn test_record_keeps_newest_first() {
        let history = history_with_samples(&[10.0, 10.1, 10.2]);

        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().timestamp, 10.2);
        assert_eq!(history.oldest().unwrap().timestamp, 10.0);
    }

    #[test]
    fn test_pruning_bound_holds_after_every_record() {
        let mut history = RewindHistory::new(1, 3.0);

        for i in 0..600 {
            let now = i as f64 * 0.05;
            history.record(now, volumes_at(0.0));

            let span = history.latest().unwrap().timestamp - history.oldest().unwrap().timestamp;
            assert!(span <= 3.0, "window bound violated at t={}: span={}", now, span);
            assert!(!history.is_empty());
        }
    }

    #[test]
    fn test_pruning_never_empties_history() {
        let mut history = RewindHistory::new(1, 1.0);

        // Two samples much farther apart than the window: the older one is
        // pruned, the newest survives alone.
        history.record(0.0, volumes_at(0.0));
        history.record(100.0, volumes_at(1.0));

        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().timestamp, 100.0);
    }

    #[test]
    fn test_locate_empty_history_rejects() {
        let history = RewindHistory::new(1, MAX_REWIND_WINDOW);
        assert!(history.locate(10.0).is_none());
    }

    #[test]
    fn test_locate_exact_match() {
        let history = history_with_samples(&[10.0, 10.1, 10.2]);

        let snapshot = history.locate(10.1).unwrap();
        assert_eq!(snapshot.timestamp, 10.1);
    }

    #[test]
    fn test_locate_between_samples_floors() {
        let history = history_with_samples(&[10.0, 10.1, 10.2]);

        // 10.05 sits between 10.0 and 10.1; floor semantics pick 10.0.
        let snapshot = history.locate(10.05).unwrap();
        assert_eq!(snapshot.timestamp, 10.0);
    }

    #[test]
    fn test_locate_clamps_to_latest() {
        let history = history_with_samples(&[10.0, 10.1, 10.2]);

        let snapshot = history.locate(10.5).unwrap();
        assert_eq!(snapshot.timestamp, 10.2);

        let snapshot = history.locate(10.2).unwrap();
        assert_eq!(snapshot.timestamp, 10.2);
    }

    #[test]
    fn test_locate_rejects_too_old() {
        let history = history_with_samples(&[10.0, 10.1, 10.2]);
        assert!(history.locate(9.9).is_none());
    }

    #[test]
    fn test_locate_at_oldest_returns_oldest() {
        let history = history_with_samples(&[10.0, 10.1, 10.2]);

        let snapshot = history.locate(10.0).unwrap();
        assert_eq!(snapshot.timestamp, 10.0);
    }

    #[test]
    fn test_locate_does_not_mutate() {
        let history = history_with_samples(&[10.0, 10.1, 10.2]);

        let _ = history.locate(10.05);
        let _ = history.locate(9.0);
        let _ = history.locate(11.0);

        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().timestamp, 10.2);
        assert_eq!(history.oldest().unwrap().timestamp, 10.0);
    }

    #[test]
    fn test_snapshot_owner_is_recorded() {
        let mut history = RewindHistory::new(7, MAX_REWIND_WINDOW);
        history.record(1.0, volumes_at(0.0));
        assert_eq!(history.latest().unwrap().owner, 7);
    }
}
