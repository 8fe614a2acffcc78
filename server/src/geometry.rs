//! Hit-volume geometry: named oriented boxes attached to character
//! skeletons, the traits the rewind verifier talks to, and the concrete
//! in-memory world implementing them.
//!
//! Two collision masks keep concerns apart: `Visibility` is the always-on
//! channel the non-rewind fast path traces against, while `RewindHitVolume`
//! only responds for volumes explicitly enabled during a verification pass.

use glam::{Quat, Vec3};
use shared::ActorId;
use std::collections::HashMap;

/// Stable identifier for one named hit-volume (a skeletal bone tag). The
/// set of valid ids is fixed per character archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(pub &'static str);

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

pub const HEAD: VolumeId = VolumeId("head");
pub const UPPER_TORSO: VolumeId = VolumeId("upper_torso");
pub const LOWER_TORSO: VolumeId = VolumeId("lower_torso");
pub const PELVIS: VolumeId = VolumeId("pelvis");

/// Hit-volumes exposed by the humanoid archetype.
pub const HUMANOID_VOLUMES: [VolumeId; 4] = [HEAD, UPPER_TORSO, LOWER_TORSO, PELVIS];

/// One oriented bounding box at a point in time. Immutable once captured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSnapshot {
    pub center: Vec3,
    pub orientation: Quat,
    pub half_extents: Vec3,
}

/// Collision channel a ray query is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionMask {
    /// Always-on channel used by the non-rewind fast path.
    Visibility,
    /// Dedicated hit-test channel; volumes only block while enabled.
    RewindHitVolume,
}

/// First blocking intersection returned by a ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub actor: ActorId,
    pub volume: VolumeId,
    pub point: Vec3,
}

/// Owner of the live hit-volume transforms of every actor. Writes apply
/// immediately, so a query issued right after a write observes it.
pub trait GeometrySource {
    /// Current transforms of every volume the actor exposes, or `None` if
    /// the actor is unknown.
    fn all_volumes(&self, actor: ActorId) -> Option<HashMap<VolumeId, VolumeSnapshot>>;

    /// Overwrites one volume's world transform. Returns false when the
    /// actor or volume does not exist; callers treat that as a skip, never
    /// as a fault.
    fn set_volume_transform(
        &mut self,
        actor: ActorId,
        volume: VolumeId,
        center: Vec3,
        orientation: Quat,
        half_extents: Vec3,
    ) -> bool;

    /// Toggles a volume's participation in the rewind hit-test channel.
    fn set_collision_enabled(&mut self, actor: ActorId, volume: VolumeId, enabled: bool);
}

/// Ray-segment queries against the live world.
pub trait WorldQuery {
    /// Returns the nearest blocking intersection along the segment, if any,
    /// restricted to the given collision mask.
    fn raycast(&self, start: Vec3, end: Vec3, mask: CollisionMask) -> Option<RayHit>;
}

#[derive(Debug, Clone)]
struct HitVolume {
    shape: VolumeSnapshot,
    collision_enabled: bool,
}

/// In-memory geometry source and ray-query world. Stores each actor's named
/// hit-volumes; the game state rewrites their transforms every tick from
/// the authoritative player pose.
#[derive(Debug, Default)]
pub struct World {
    actors: HashMap<ActorId, HashMap<VolumeId, HitVolume>>,
}

impl World {
    pub fn new() -> Self {
        Self {
            actors: HashMap::new(),
        }
    }

    /// Registers an actor with its archetype's volume set. Volumes start
    /// with rewind collision disabled.
    pub fn add_actor(
        &mut self,
        actor: ActorId,
        volumes: impl IntoIterator<Item = (VolumeId, VolumeSnapshot)>,
    ) {
        let volumes = volumes
            .into_iter()
            .map(|(id, shape)| {
                (
                    id,
                    HitVolume {
                        shape,
                        collision_enabled: false,
                    },
                )
            })
            .collect();
        self.actors.insert(actor, volumes);
    }

    pub fn remove_actor(&mut self, actor: ActorId) {
        self.actors.remove(&actor);
    }

    pub fn contains_actor(&self, actor: ActorId) -> bool {
        self.actors.contains_key(&actor)
    }
}

impl GeometrySource for World {
    fn all_volumes(&self, actor: ActorId) -> Option<HashMap<VolumeId, VolumeSnapshot>> {
        self.actors.get(&actor).map(|volumes| {
            volumes
                .iter()
                .map(|(id, volume)| (*id, volume.shape))
                .collect()
        })
    }

    fn set_volume_transform(
        &mut self,
        actor: ActorId,
        volume: VolumeId,
        center: Vec3,
        orientation: Quat,
        half_extents: Vec3,
    ) -> bool {
        match self.actors.get_mut(&actor).and_then(|v| v.get_mut(&volume)) {
            Some(hit_volume) => {
                hit_volume.shape = VolumeSnapshot {
                    center,
                    orientation,
                    half_extents,
                };
                true
            }
            None => false,
        }
    }

    fn set_collision_enabled(&mut self, actor: ActorId, volume: VolumeId, enabled: bool) {
        if let Some(hit_volume) = self.actors.get_mut(&actor).and_then(|v| v.get_mut(&volume)) {
            hit_volume.collision_enabled = enabled;
        }
    }
}

impl WorldQuery for World {
    fn raycast(&self, start: Vec3, end: Vec3, mask: CollisionMask) -> Option<RayHit> {
        let mut nearest: Option<(f32, RayHit)> = None;

        for (&actor, volumes) in &self.actors {
            for (&id, volume) in volumes {
                let blocks = match mask {
                    CollisionMask::Visibility => true,
                    CollisionMask::RewindHitVolume => volume.collision_enabled,
                };
                if !blocks {
                    continue;
                }

                if let Some(t) = ray_obb_entry(start, end, &volume.shape) {
                    let closer = nearest.map(|(best, _)| t < best).unwrap_or(true);
                    if closer {
                        let point = start + (end - start) * t;
                        nearest = Some((
                            t,
                            RayHit {
                                actor,
                                volume: id,
                                point,
                            },
                        ));
                    }
                }
            }
        }

        nearest.map(|(_, hit)| hit)
    }
}

/// Slab test for a ray segment against an oriented box. Returns the entry
/// parameter in [0, 1] along `start..end`, or `None` on a miss. Segments
/// starting inside the box report t = 0.
pub fn ray_obb_entry(start: Vec3, end: Vec3, obb: &VolumeSnapshot) -> Option<f32> {
    // Move the segment into the box's local frame so the test reduces to
    // an axis-aligned slab intersection.
    let inverse = obb.orientation.conjugate();
    let local_start = inverse * (start - obb.center);
    let local_end = inverse * (end - obb.center);
    let direction = local_end - local_start;

    let mut t_enter = 0.0f32;
    let mut t_exit = 1.0f32;

    for axis in 0..3 {
        let origin = local_start[axis];
        let delta = direction[axis];
        let half = obb.half_extents[axis];

        if delta.abs() < f32::EPSILON {
            // Segment parallel to this slab: either always inside or never.
            if origin.abs() > half {
                return None;
            }
            continue;
        }

        let inv = 1.0 / delta;
        let mut t0 = (-half - origin) * inv;
        let mut t1 = (half - origin) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }

        t_enter = t_enter.max(t0);
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return None;
        }
    }

    Some(t_enter)
}
