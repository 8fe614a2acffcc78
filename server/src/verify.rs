//! Hit reconciliation against rewound geometry.
//!
//! A verified claim runs freeze, query, restore as one unit: the target's
//! live volumes are captured as a baseline, overwritten with the historical
//! snapshot, queried once on the dedicated hit-test channel, then restored.
//! Restoration lives in a guard's `Drop`, so every exit path, early returns
//! and panics unwinding through the query included, puts the live geometry
//! back exactly as it was. No caller can ever observe the target half-moved
//! into the past.

use crate::geometry::{CollisionMask, GeometrySource, RayHit, VolumeId, VolumeSnapshot, WorldQuery};
use crate::history::{RewindHistory, Snapshot};
use glam::Vec3;
use log::debug;
use shared::ActorId;
use std::collections::HashMap;

/// Scoped substitution of one actor's live volumes with a historical
/// snapshot. While the guard lives, the actor's volumes block the rewind
/// hit-test channel at their historical transforms; dropping it restores
/// the baseline transforms and disables the channel again.
///
/// This is the critical section of lag compensation: nothing else may read
/// or write the target's live transforms between `freeze` and the guard's
/// drop.
pub struct FrozenTarget<'a, G: GeometrySource> {
    geometry: &'a mut G,
    target: ActorId,
    baseline: HashMap<VolumeId, VolumeSnapshot>,
}

impl<'a, G: GeometrySource> FrozenTarget<'a, G> {
    /// Captures the live baseline of `snapshot.owner` and writes the
    /// snapshot's transforms over it. Returns `None` when the actor is
    /// unknown to the geometry source, leaving it untouched.
    ///
    /// A volume present in the snapshot but gone from the live character is
    /// skipped; a live volume absent from the snapshot keeps its live
    /// transform. Collision is enabled for every live volume so the
    /// subsequent query sees the whole rewound silhouette.
    pub fn freeze(geometry: &'a mut G, snapshot: &Snapshot) -> Option<Self> {
        let target = snapshot.owner;
        let baseline = geometry.all_volumes(target)?;

        for (&id, volume) in &snapshot.volumes {
            let applied = geometry.set_volume_transform(
                target,
                id,
                volume.center,
                volume.orientation,
                volume.half_extents,
            );
            if !applied {
                debug!("volume {} vanished from actor {}, skipping", id, target);
            }
        }
        for &id in baseline.keys() {
            geometry.set_collision_enabled(target, id, true);
        }

        Some(Self {
            geometry,
            target,
            baseline,
        })
    }

    pub fn target(&self) -> ActorId {
        self.target
    }

    /// Single ray-segment query against the rewind hit-test channel.
    pub fn raycast(&self, start: Vec3, end: Vec3) -> Option<RayHit>
    where
        G: WorldQuery,
    {
        self.geometry
            .raycast(start, end, CollisionMask::RewindHitVolume)
    }
}

impl<G: GeometrySource> Drop for FrozenTarget<'_, G> {
    fn drop(&mut self) {
        for (&id, volume) in &self.baseline {
            self.geometry.set_volume_transform(
                self.target,
                id,
                volume.center,
                volume.orientation,
                volume.half_extents,
            );
            self.geometry.set_collision_enabled(self.target, id, false);
        }
    }
}

/// Re-tests a client-reported hit against the target's geometry as it was
/// at `claimed_time`, returning the authoritative decision.
///
/// Fail-safe by construction: a missing actor, an empty history, or a
/// claim older than the rewind window all yield `false` without touching
/// any live geometry. Ambiguous input never grants a hit.
pub fn verify_hit<G>(
    geometry: &mut G,
    history: &RewindHistory,
    claimed_time: f64,
    ray_start: Vec3,
    ray_end: Vec3,
) -> bool
where
    G: GeometrySource + WorldQuery,
{
    let snapshot = match history.locate(claimed_time) {
        Some(snapshot) => snapshot,
        None => return false,
    };

    let frozen = match FrozenTarget::freeze(geometry, snapshot) {
        Some(frozen) => frozen,
        None => {
            debug!(
                "rewind target {} missing from geometry source",
                snapshot.owner
            );
            return false;
        }
    };

    frozen
        .raycast(ray_start, ray_end)
        .map(|hit| hit.actor == frozen.target())
        .unwrap_or(false)
}
