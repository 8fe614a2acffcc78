//! # Authoritative Shooter Server with Server-Side Rewind
//!
//! This library implements the server half of a lag-compensated multiplayer
//! shooter. The server owns the canonical simulation; clients only ever
//! report what they observed, and every consequential decision, above all
//! whether a shot landed, is re-derived here.
//!
//! ## Why rewind
//!
//! A client aims at what it sees, and what it sees is the past: by the time
//! a shot packet reaches the server, the target has kept moving for half a
//! round trip plus interpolation delay. Testing the shot against live
//! geometry would punish every player for their own latency. Instead the
//! server keeps a short, bounded history of every character's hit-volume
//! transforms and re-tests each claim against the geometry as it stood at
//! the instant the client reports having observed.
//!
//! The flow per claim: locate the historical snapshot matching the claimed
//! timestamp, substitute it for the target's live volumes, run one ray
//! query on a dedicated collision channel, restore the live volumes, and
//! return the boolean verdict. Restoration is unconditional; a claim can
//! never leave a target stuck in its own past.
//!
//! ## Trust model
//!
//! The claim is client-provided input and treated as hostile until proven
//! benign. The defenses, in order of application:
//! - per-client claim rate budget (`client_manager`);
//! - structural validation of the ray and timestamp (`game`);
//! - the rewind window itself: claims older than the retained history are
//!   unverifiable and denied (`history`);
//! - the re-test against server-recorded geometry (`verify`).
//!
//! Anything ambiguous degrades to "hit not confirmed". There is no error
//! path in this pipeline that can grant a kill.
//!
//! ## Module organization
//!
//! - `geometry`: named oriented hit-volumes, the `GeometrySource` and
//!   `WorldQuery` traits, and the concrete `World` with ray-OBB queries.
//! - `history`: per-actor bounded snapshot history and the floor-semantics
//!   timestamp locator.
//! - `verify`: the freeze/query/restore verifier built on a scoped guard.
//! - `game`: player simulation, pose-to-volume sync, per-tick recording,
//!   and claim validation.
//! - `client_manager`: connection lifecycle, input buffering, claim
//!   budgets.
//! - `network`: tokio UDP transport and the main tick loop.
//! - `utils`: the monotonic server clock shared by recording and
//!   verification.
//!
//! ## Scheduling model
//!
//! All simulation, recording, and verification runs inside one serialized
//! tick loop (`network::Server::run`). A `verify` never observes a history
//! mid-record, and nothing reads a target's live transforms while a claim
//! has them temporarily rewound. If this loop is ever parallelized across
//! actors, the freeze/query/restore section in `verify` is the region that
//! must become a per-target critical section.

pub mod client_manager;
pub mod game;
pub mod geometry;
pub mod history;
pub mod network;
pub mod utils;
pub mod verify;
