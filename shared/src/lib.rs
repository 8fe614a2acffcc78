use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const GRAVITY: f32 = 19.6;
pub const PLAYER_SPEED: f32 = 5.5;
pub const JUMP_VELOCITY: f32 = 6.0;
pub const ARENA_HALF_EXTENT: f32 = 30.0;
pub const PLAYER_RADIUS: f32 = 0.4;
pub const EYE_HEIGHT: f32 = 1.6;
pub const MAX_RAY_LENGTH: f32 = 1000.0;
pub const PROTOCOL_VERSION: u32 = 1;

/// Opaque handle for a server-controlled actor. Doubles as the client id
/// assigned on connect, so hit claims can name their target directly.
pub type ActorId = u32;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        move_x: f32,
        move_z: f32,
        yaw: f32,
        jump: bool,
    },
    /// Client-reported hit: "at `claimed_time` on the server clock I had
    /// `target` under my crosshair along this ray". The server re-tests the
    /// claim against rewound geometry before confirming anything.
    HitClaim {
        target: ActorId,
        claimed_time: f64,
        ray_start: Vec3,
        ray_end: Vec3,
    },
    Disconnect,

    Connected {
        client_id: ActorId,
    },
    GameState {
        tick: u32,
        /// Server clock in seconds, the time base clients must use when
        /// stamping hit claims.
        server_time: f64,
        timestamp: u64,
        last_processed_input: HashMap<ActorId, u32>,
        players: Vec<Player>,
    },
    /// Broadcast once a hit claim has been verified. Presentation side
    /// effect only (ragdoll, hit marker); carries no damage semantics.
    HitConfirmed {
        shooter: ActorId,
        target: ActorId,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: ActorId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub on_ground: bool,
}

impl Player {
    pub fn new(id: ActorId, position: Vec3) -> Self {
        Self {
            id,
            position,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            on_ground: true,
        }
    }

    /// World-space eye position, the origin clients trace their shots from.
    pub fn eye_position(&self) -> Vec3 {
        self.position + Vec3::new(0.0, EYE_HEIGHT, 0.0)
    }

    /// Horizontal facing direction derived from yaw (rotation about +Y,
    /// yaw 0 looks down +Z).
    pub fn forward(&self) -> Vec3 {
        Vec3::new(self.yaw.sin(), 0.0, self.yaw.cos())
    }
}

/// Returns true when two player cylinders overlap in the ground plane.
pub fn players_overlap(a: &Player, b: &Player) -> bool {
    let dx = b.position.x - a.position.x;
    let dz = b.position.z - a.position.z;
    let min_distance = 2.0 * PLAYER_RADIUS;
    dx * dx + dz * dz < min_distance * min_distance
}

/// Pushes two overlapping players apart along the line between their
/// centers, splitting the correction evenly. Coincident players are split
/// along X so the separation is always finite.
pub fn separate_players(a: &mut Player, b: &mut Player) {
    if !players_overlap(a, b) {
        return;
    }

    let dx = b.position.x - a.position.x;
    let dz = b.position.z - a.position.z;
    let distance = (dx * dx + dz * dz).sqrt();
    let min_distance = 2.0 * PLAYER_RADIUS;

    if distance < 0.001 {
        a.position.x -= PLAYER_RADIUS;
        b.position.x += PLAYER_RADIUS;
        return;
    }

    let nx = dx / distance;
    let nz = dz / distance;
    let push = (min_distance - distance) / 2.0;

    a.position.x -= nx * push;
    a.position.z -= nz * push;
    b.position.x += nx * push;
    b.position.z += nz * push;

    let bound = ARENA_HALF_EXTENT - PLAYER_RADIUS;
    a.position.x = a.position.x.clamp(-bound, bound);
    a.position.z = a.position.z.clamp(-bound, bound);
    b.position.x = b.position.x.clamp(-bound, bound);
    b.position.z = b.position.z.clamp(-bound, bound);
}

#[derive(Debug, Clone)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub move_x: f32,
    pub move_z: f32,
    pub yaw: f32,
    pub jump: bool,
}
