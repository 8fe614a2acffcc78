//! Authoritative game state: player simulation, skeleton pose to
//! hit-volume sync, per-tick history recording, and the entry point that
//! turns an incoming hit claim into a verified boolean.

use crate::geometry::{
    CollisionMask, GeometrySource, VolumeId, VolumeSnapshot, World, WorldQuery, HEAD, LOWER_TORSO,
    PELVIS, UPPER_TORSO,
};
use crate::history::{RewindHistory, Snapshot, MAX_REWIND_WINDOW};
use crate::verify::verify_hit;
use glam::{Quat, Vec3};
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    separate_players, ActorId, InputState, Player, ARENA_HALF_EXTENT, GRAVITY, JUMP_VELOCITY,
    MAX_RAY_LENGTH, PLAYER_RADIUS, PLAYER_SPEED,
};
use std::collections::HashMap;

/// Optional hook invoked with every freshly recorded snapshot. Purely for
/// observation (debug draw, metrics); correctness never depends on it.
pub type SnapshotObserver = Box<dyn Fn(&Snapshot) + Send>;

/// Bone-local offsets and extents of the humanoid hit-volume stack,
/// ordered feet-up. Offsets are from the player's feet position.
const HUMANOID_LAYOUT: [(VolumeId, Vec3, Vec3); 4] = [
    (PELVIS, Vec3::new(0.0, 0.90, 0.0), Vec3::new(0.18, 0.12, 0.16)),
    (LOWER_TORSO, Vec3::new(0.0, 1.15, 0.0), Vec3::new(0.19, 0.14, 0.15)),
    (UPPER_TORSO, Vec3::new(0.0, 1.45, 0.0), Vec3::new(0.21, 0.18, 0.16)),
    (HEAD, Vec3::new(0.0, 1.75, 0.0), Vec3::new(0.12, 0.14, 0.12)),
];

/// World-space hit-volumes for a player pose. The whole stack yaws with
/// the character about its feet.
pub fn humanoid_volumes(position: Vec3, yaw: f32) -> Vec<(VolumeId, VolumeSnapshot)> {
    let orientation = Quat::from_rotation_y(yaw);
    HUMANOID_LAYOUT
        .iter()
        .map(|&(id, offset, half_extents)| {
            (
                id,
                VolumeSnapshot {
                    center: position + orientation * offset,
                    orientation,
                    half_extents,
                },
            )
        })
        .collect()
}

pub struct GameState {
    pub tick: u32,
    pub players: HashMap<ActorId, Player>,
    world: World,
    histories: HashMap<ActorId, RewindHistory>,
    rewind_enabled: bool,
    snapshot_observer: Option<SnapshotObserver>,
}

impl GameState {
    pub fn new(rewind_enabled: bool) -> Self {
        Self {
            tick: 0,
            players: HashMap::new(),
            world: World::new(),
            histories: HashMap::new(),
            rewind_enabled,
            snapshot_observer: None,
        }
    }

    /// Whether incoming hit claims are verified against rewound geometry
    /// (true) or against live geometry only (false). Fixed at construction;
    /// the switch itself is owned by server configuration.
    pub fn rewind_enabled(&self) -> bool {
        self.rewind_enabled
    }

    pub fn set_snapshot_observer(&mut self, observer: SnapshotObserver) {
        self.snapshot_observer = Some(observer);
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Spawns a player at a scattered arena position.
    pub fn add_player(&mut self, client_id: ActorId) {
        let mut rng = rand::thread_rng();
        let spawn = Vec3::new(
            rng.gen_range(-ARENA_HALF_EXTENT * 0.5..ARENA_HALF_EXTENT * 0.5),
            0.0,
            rng.gen_range(-ARENA_HALF_EXTENT * 0.5..ARENA_HALF_EXTENT * 0.5),
        );
        self.add_player_at(client_id, spawn);
    }

    /// Spawns a player at an exact position. Creates the live hit-volume
    /// set and an empty rewind history; the history owns its window from
    /// here on and is discarded with the player.
    pub fn add_player_at(&mut self, client_id: ActorId, position: Vec3) {
        let player = Player::new(client_id, position);
        self.world
            .add_actor(client_id, humanoid_volumes(player.position, player.yaw));
        self.histories
            .insert(client_id, RewindHistory::new(client_id, MAX_REWIND_WINDOW));

        info!(
            "Added player {} at ({:.1}, {:.1}, {:.1})",
            client_id, player.position.x, player.position.y, player.position.z
        );
        self.players.insert(client_id, player);
    }

    pub fn remove_player(&mut self, client_id: &ActorId) {
        self.players.remove(client_id);
        self.world.remove_actor(*client_id);
        self.histories.remove(client_id);
        info!("Removed player {}", client_id);
    }

    pub fn history(&self, actor: ActorId) -> Option<&RewindHistory> {
        self.histories.get(&actor)
    }

    pub fn apply_input(&mut self, client_id: ActorId, input: &InputState, _dt: f32) {
        if let Some(player) = self.players.get_mut(&client_id) {
            player.yaw = input.yaw;

            let wish = Vec3::new(input.move_x, 0.0, input.move_z);
            let wish = if wish.length_squared() > 1.0 {
                wish.normalize()
            } else {
                wish
            };
            let rotated = Quat::from_rotation_y(player.yaw) * wish;
            player.velocity.x = rotated.x * PLAYER_SPEED;
            player.velocity.z = rotated.z * PLAYER_SPEED;

            if input.jump && player.on_ground {
                player.velocity.y = JUMP_VELOCITY;
                player.on_ground = false;
            }
        }
    }

    /// Integrates player motion, resolves player overlap, and pushes the
    /// resulting poses into the live hit-volumes. Runs once per tick before
    /// histories are recorded, so the recorded transforms are the same ones
    /// any fast-path query would see this tick.
    pub fn update_physics(&mut self, dt: f32) {
        for player in self.players.values_mut() {
            if !player.on_ground {
                player.velocity.y -= GRAVITY * dt;
            }

            player.position += player.velocity * dt;

            let bound = ARENA_HALF_EXTENT - PLAYER_RADIUS;
            player.position.x = player.position.x.clamp(-bound, bound);
            player.position.z = player.position.z.clamp(-bound, bound);

            if player.position.y <= 0.0 {
                player.position.y = 0.0;
                player.velocity.y = 0.0;
                player.on_ground = true;
            }
        }

        self.resolve_player_overlap();
        self.sync_volumes();
    }

    fn resolve_player_overlap(&mut self) {
        let player_ids: Vec<ActorId> = self.players.keys().cloned().collect();

        for i in 0..player_ids.len() {
            for j in (i + 1)..player_ids.len() {
                let id1 = player_ids[i];
                let id2 = player_ids[j];

                if let (Some(p1), Some(p2)) = (
                    self.players.get(&id1).cloned(),
                    self.players.get(&id2).cloned(),
                ) {
                    let mut player1 = p1;
                    let mut player2 = p2;

                    separate_players(&mut player1, &mut player2);

                    self.players.insert(id1, player1);
                    self.players.insert(id2, player2);
                }
            }
        }
    }

    /// Writes every player's current pose into the live geometry source.
    fn sync_volumes(&mut self) {
        for player in self.players.values() {
            for (id, volume) in humanoid_volumes(player.position, player.yaw) {
                self.world.set_volume_transform(
                    player.id,
                    id,
                    volume.center,
                    volume.orientation,
                    volume.half_extents,
                );
            }
        }
    }

    /// Records one snapshot per live player at server time `now`. Called
    /// exactly once per authoritative tick; this server is the single
    /// authority, so there is no non-authoritative copy that could record.
    pub fn record_histories(&mut self, now: f64) {
        for (&id, history) in &mut self.histories {
            if let Some(volumes) = self.world.all_volumes(id) {
                history.record(now, volumes);
                if let (Some(observer), Some(snapshot)) =
                    (self.snapshot_observer.as_ref(), history.latest())
                {
                    observer(snapshot);
                }
            }
        }
    }

    /// Authoritative decision on a client hit claim.
    ///
    /// Rewind mode relocates the target's volumes to `claimed_time` before
    /// the trace; otherwise the claim is tested against live geometry on
    /// the always-on visibility channel. Either way an unverifiable claim
    /// (unknown target, self-shot, over-long or degenerate ray, stale
    /// timestamp) is denied rather than guessed at.
    pub fn verify_hit_claim(
        &mut self,
        shooter: ActorId,
        target: ActorId,
        claimed_time: f64,
        ray_start: Vec3,
        ray_end: Vec3,
    ) -> bool {
        if shooter == target {
            warn!("player {} claimed a hit on itself, denied", shooter);
            return false;
        }
        if !claimed_time.is_finite() {
            warn!(
                "player {} sent a non-finite claim timestamp, denied",
                shooter
            );
            return false;
        }
        let ray = ray_end - ray_start;
        if !ray.is_finite() || ray.length_squared() > MAX_RAY_LENGTH * MAX_RAY_LENGTH {
            warn!("player {} sent an invalid claim ray, denied", shooter);
            return false;
        }
        if !self.players.contains_key(&target) {
            debug!("claim by {} on missing actor {}, denied", shooter, target);
            return false;
        }

        if self.rewind_enabled {
            let history = match self.histories.get(&target) {
                Some(history) => history,
                None => return false,
            };
            verify_hit(&mut self.world, history, claimed_time, ray_start, ray_end)
        } else {
            self.world
                .raycast(ray_start, ray_end, CollisionMask::Visibility)
                .map(|hit| hit.actor == target)
                .unwrap_or(false)
        }
    }
}
