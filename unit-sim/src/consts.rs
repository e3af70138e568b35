//! Normative constants (spec §6). Kept in one file, named after the prose
//! they come from, so a tuning change touches one place.

use sphere_math::Vec3;

pub const TICK_RATE_HZ: u32 = 20;
pub const PHYSICS_HZ: u32 = 60;
pub const PHYSICS_SUB_STEPS: u32 = 3;
pub const GRAVITY_MAGNITUDE: f32 = 9.81;

pub const MOVE_SPEED: f32 = 5.0;
pub const CUBOID_HALF_EXTENTS: Vec3 = Vec3::new(0.3, 0.25, 0.5);

pub const SETTLE_LINEAR_THRESHOLD: f32 = 0.1;
pub const SETTLE_ANGULAR_THRESHOLD: f32 = 0.1;
pub const SETTLE_DURATION_TICKS: u32 = 100;

pub const ROLLOVER_THRESHOLD_DEG: f32 = 25.0;
pub const SLOPE_DEBOUNCE_TICKS: u32 = 3;
pub const SLOPE_IMPULSE_STRENGTH: f32 = 5.0;

pub const COLLISION_IMPULSE_STRENGTH: f32 = 5.0;
pub const REENTRY_COOLDOWN_TICKS: u32 = 20;

pub const TAKEOVER_TILT_DEG: f32 = 15.0;
pub const TAKEOVER_LINVEL_THRESHOLD: f32 = 0.5;
pub const TAKEOVER_ANGVEL_THRESHOLD: f32 = 0.3;
pub const TAKEOVER_DEBOUNCE_TICKS: u32 = 5;

/// ~1s at [`TICK_RATE_HZ`]. Open question (spec §9 OQ2): kept at the default;
/// a room may override it via [`crate::unit::UnitTuning`], but the default
/// itself must never change.
pub const BLEND_DURATION_TICKS: u32 = 20;
/// Per-tick decay factor applied to the captured Rapier-exit tangent
/// velocity while blending down.
pub const BLEND_VELOCITY_DECAY: f32 = 0.92;

pub const SPRING_GAIN: f32 = 0.4;
pub const MAX_CORRECTION_STEP: f32 = 0.05;

pub const MAX_WAYPOINTS: usize = 32;
pub const MAX_SEGMENT_LENGTH: f32 = 200.0;
pub const MANIFEST_MAX_UNITS: usize = 200;

pub const MAX_PATCHES: usize = 64;

pub const PHYSICS_EVENT_MAX_RADIUS: f32 = 50.0;
pub const PHYSICS_EVENT_MAX_IMPULSE: f32 = 20.0;
pub const PHYSICS_EVENT_MAX_AFFECTED: usize = 16;

pub const MINE_DEFAULT_TRIGGER_RADIUS: f32 = 1.5;
pub const MINE_DEFAULT_UPWARD_IMPULSE: f32 = 8.0;
pub const MINE_DEFAULT_RADIAL_IMPULSE: f32 = 5.0;
pub const MINE_DEFAULT_BLAST_RADIUS: f32 = 6.0;

pub const CMD_BATCH_MAX: usize = 50;
pub const QUEUE_MAX: usize = 500;

/// Tolerance for the takeover-readiness grounding check. Not a spec-named
/// constant; picked small relative to the cuboid half-height.
pub const GROUNDING_EPS: f32 = 0.05;
/// Outward pre-snap offset applied by `enter_dynamic` so the cuboid cannot
/// start intersecting the terrain mesh it was resting on.
pub const PRE_SNAP_OFFSET: f32 = 0.05;
pub const DYNAMIC_LINEAR_DAMPING: f32 = 0.2;
pub const DYNAMIC_ANGULAR_DAMPING: f32 = 0.2;

/// `cos(TAKEOVER_TILT_DEG)` precomputed since it's checked every tick.
pub fn takeover_tilt_cos() -> f32 {
    TAKEOVER_TILT_DEG.to_radians().cos()
}

pub fn rollover_threshold_rad() -> f32 {
    ROLLOVER_THRESHOLD_DEG.to_radians()
}
