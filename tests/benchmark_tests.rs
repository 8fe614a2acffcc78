//! Performance benchmarks for critical rewind systems

use glam::{Quat, Vec3};
use server::game::GameState;
use server::geometry::{ray_obb_entry, VolumeSnapshot, WorldQuery, UPPER_TORSO};
use server::history::{RewindHistory, MAX_REWIND_WINDOW};
use shared::InputState;
use std::time::Instant;

const DT: f32 = 1.0 / 60.0;

/// Benchmarks snapshot recording with pruning
#[test]
fn benchmark_history_recording() {
    let mut state = GameState::new(true);
    state.add_player_at(1, Vec3::ZERO);

    let iterations = 100_000;
    let start = Instant::now();

    let mut now = 0.0f64;
    for _ in 0..iterations {
        now += DT as f64;
        state.record_histories(now);
    }

    let duration = start.elapsed();
    println!(
        "History recording: {} iterations in {:?} ({:.2} µs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // The prune keeps the buffer bounded regardless of run length.
    assert!(state.history(1).unwrap().len() <= 200);
    // Should complete in under 2 seconds for 100k iterations
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the timestamp locator over a full-window history
#[test]
fn benchmark_snapshot_lookup() {
    let mut history = RewindHistory::new(1, MAX_REWIND_WINDOW);

    for tick in 0..180 {
        let volumes = [(
            UPPER_TORSO,
            VolumeSnapshot {
                center: Vec3::new(tick as f32 * 0.01, 1.45, 0.0),
                orientation: Quat::IDENTITY,
                half_extents: Vec3::new(0.21, 0.18, 0.16),
            },
        )]
        .into_iter()
        .collect();
        history.record(tick as f64 * DT as f64, volumes);
    }

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        // Spread queries across the window, oldest queries scan furthest.
        let t = (i % 180) as f64 * DT as f64;
        let _ = history.locate(t);
    }

    let duration = start.elapsed();
    println!(
        "Snapshot lookup: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 500ms for 100k lookups
    assert!(duration.as_millis() < 500);
}

/// Benchmarks ray-OBB intersection
#[test]
fn benchmark_ray_obb() {
    let obb = VolumeSnapshot {
        center: Vec3::new(0.0, 1.45, 10.0),
        orientation: Quat::from_rotation_y(0.7),
        half_extents: Vec3::new(0.21, 0.18, 0.16),
    };
    let start_point = Vec3::new(0.0, 1.45, 0.0);
    let end_point = Vec3::new(0.0, 1.45, 20.0);

    let iterations = 1_000_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = ray_obb_entry(start_point, end_point, &obb);
    }

    let duration = start.elapsed();
    println!(
        "Ray-OBB entry: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 1 second for 1M intersections
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the full claim verification path on a populated arena
#[test]
fn benchmark_hit_verification() {
    let mut state = GameState::new(true);
    state.add_player_at(1, Vec3::new(0.0, 0.0, -6.0));
    for id in 2..=16 {
        let angle = id as f32 * 0.4;
        state.add_player_at(id, Vec3::new(angle.cos() * 8.0, 0.0, angle.sin() * 8.0));
    }

    // Fill the histories with a second of movement.
    let mut now = 0.0f64;
    for seq in 1..=60u32 {
        for id in 2..=16 {
            let input = InputState {
                sequence: seq,
                timestamp: seq as u64,
                move_x: 1.0,
                move_z: 0.0,
                yaw: 0.0,
                jump: false,
            };
            state.apply_input(id, &input, DT);
        }
        state.update_physics(DT);
        now += DT as f64;
        state.record_histories(now);
    }

    let ray_start = Vec3::new(0.0, 1.6, -5.0);
    let ray_end = Vec3::new(0.0, 1.6, 35.0);

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let claimed = now - (i % 30) as f64 * DT as f64;
        let _ = state.verify_hit_claim(1, 2, claimed, ray_start, ray_end);
    }

    let duration = start.elapsed();
    println!(
        "Hit verification: {} iterations in {:?} ({:.2} µs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds for 10k claims
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks world raycast against many actors on the always-on channel
#[test]
fn benchmark_world_raycast() {
    let mut state = GameState::new(true);
    for id in 1..=32 {
        let angle = id as f32 * 0.2;
        state.add_player_at(id, Vec3::new(angle.cos() * 10.0, 0.0, angle.sin() * 10.0));
    }
    state.update_physics(DT);

    let ray_start = Vec3::new(-15.0, 1.5, 0.0);
    let ray_end = Vec3::new(15.0, 1.5, 0.0);

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = state
            .world()
            .raycast(ray_start, ray_end, server::geometry::CollisionMask::Visibility);
    }

    let duration = start.elapsed();
    println!(
        "World raycast (32 actors): {} iterations in {:?} ({:.2} µs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 3 seconds for 100k casts
    assert!(duration.as_millis() < 3000);
}
