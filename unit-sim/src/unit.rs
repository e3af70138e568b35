//! The headless per-unit hybrid state machine (spec §4.5). A unit normally
//! moves by tangent-plane kinematic math; gameplay events hand it to a
//! rigid-body solver, which later hands it back under a takeover-readiness
//! gate with a cross-faded orientation blend.
//!
//! Grounded on `onx2-av/shared/src/collision/kinematic.rs` and
//! `collision/ground.rs` (kinematic-vs-ground proximity handling, tangent
//! velocity bookkeeping), adapted from flat ground to the spherical
//! tangent-plane math in [`sphere_math`]; the WASD-to-world-space input
//! convention follows `doctorsolana-fistforce/shared/src/movement.rs`.

use serde::{Deserialize, Serialize};
use sphere_math::{Quat, TangentFrame, Vec3};
use physics_world::{ColliderHandle, PhysicsWorld, RigidBodyHandle};
use physics_world::rapier3d::prelude::RigidBodyType;
use terrain_field::TerrainField;

use crate::consts::*;
use crate::ids::{Slot, UnitId};
use crate::snapshot::UnitSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementMode {
    Grounded,
    Airborne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhysicsMode {
    Kinematic,
    Dynamic,
    Settled,
}

/// Boolean WASD bitset, already sanitized by the game server before it
/// reaches a unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveInput {
    pub fn is_zero(self) -> bool {
        !self.forward && !self.backward && !self.left && !self.right
    }
}

#[derive(Debug, Clone)]
pub struct PathState {
    pub waypoints: Vec<Vec3>,
    pub index: usize,
    pub closed: bool,
}

/// Configurable overrides for the two open-question tunables (spec §9 OQ2
/// and the per-room `SET_ROLLOVER_THRESHOLD` admin command). Defaults must
/// never change.
#[derive(Debug, Clone, Copy)]
pub struct UnitTuning {
    pub blend_duration_ticks: u32,
    pub rollover_threshold_rad: f32,
}

impl Default for UnitTuning {
    fn default() -> Self {
        UnitTuning {
            blend_duration_ticks: BLEND_DURATION_TICKS,
            rollover_threshold_rad: rollover_threshold_rad(),
        }
    }
}

/// Outcome of draining a `DYNAMIC` unit's state against the rigid body each
/// tick, reported to the room so it can decide whether to call
/// `settle_dynamic`. A unit mid-blend-down drives its own `exit_dynamic`
/// call from inside `update_position` and never reports `ReadyToSettle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicOutcome {
    Continue,
    ReadyToSettle,
}

pub struct Unit {
    pub id: UnitId,
    pub owner_slot: Slot,
    pub controller_slot: Option<Slot>,
    pub model_index: u32,

    pub position: Vec3,
    pub velocity: Vec3,
    pub heading: f32,
    pub speed: f32,
    pub orientation: Quat,
    pub hp: i32,

    pub movement_mode: MovementMode,
    pub altitude: f32,
    pub vertical_velocity: f32,

    pub path: Option<PathState>,

    pub physics_mode: PhysicsMode,
    pub rigid_body: Option<RigidBodyHandle>,

    blending_down: bool,
    blend_factor: f32,
    inherited_tangent_velocity: Vec3,

    settle_ticks: u32,
    slope_debounce_ticks: u32,
    reentry_cooldown_ticks: u32,
    takeover_ready_ticks: u32,

    captured_exit_quat: Quat,
    orientation_blend_remaining: u32,

    tuning: UnitTuning,
}

impl Unit {
    /// `up` is the terrain normal at `position` — the caller (room) is
    /// expected to have already placed `position` on the surface.
    pub fn new(id: UnitId, owner_slot: Slot, model_index: u32, position: Vec3, up: Vec3) -> Self {
        Unit {
            id,
            owner_slot,
            controller_slot: None,
            model_index,
            position,
            velocity: Vec3::ZERO,
            heading: 0.0,
            speed: 0.0,
            orientation: canonical_orientation(up, 0.0),
            hp: 100,
            movement_mode: MovementMode::Grounded,
            altitude: 0.0,
            vertical_velocity: 0.0,
            path: None,
            physics_mode: PhysicsMode::Kinematic,
            rigid_body: None,
            blending_down: false,
            blend_factor: 0.0,
            inherited_tangent_velocity: Vec3::ZERO,
            settle_ticks: 0,
            slope_debounce_ticks: 0,
            reentry_cooldown_ticks: 0,
            takeover_ready_ticks: 0,
            captured_exit_quat: Quat::IDENTITY,
            orientation_blend_remaining: 0,
            tuning: UnitTuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: UnitTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Applies a tuning override to an already-spawned unit (the
    /// `SET_ROLLOVER_THRESHOLD` admin command, spec §4.7).
    pub fn set_tuning(&mut self, tuning: UnitTuning) {
        self.tuning = tuning;
    }

    pub fn tuning(&self) -> UnitTuning {
        self.tuning
    }

    pub fn is_blending_down(&self) -> bool {
        self.blending_down
    }

    // ---- input --------------------------------------------------------

    /// Ignored while `SETTLED`; ignored while `DYNAMIC` until the
    /// takeover-ready counter has debounced, at which point blend-down
    /// begins and WASD is processed as normal kinematic input from then on.
    pub fn apply_input(&mut self, input: MoveInput, physics: &PhysicsWorld, up: Vec3) {
        match self.physics_mode {
            PhysicsMode::Settled => return,
            PhysicsMode::Dynamic => {
                if !self.blending_down {
                    if self.takeover_ready_ticks < TAKEOVER_DEBOUNCE_TICKS {
                        return;
                    }
                    self.begin_blend_down(physics, up);
                }
            }
            PhysicsMode::Kinematic => {}
        }

        if !input.is_zero() {
            self.path = None;
        }

        let fwd = (input.forward as i32 - input.backward as i32) as f32;
        let right = (input.right as i32 - input.left as i32) as f32;
        let len = (fwd * fwd + right * right).sqrt();

        if len <= f32::EPSILON {
            self.velocity = Vec3::ZERO;
            self.speed = 0.0;
            return;
        }

        let fwd = fwd / len;
        let right = right / len;
        let frame = TangentFrame::from_normal(up);
        self.velocity = (frame.forward.scale(fwd) + frame.right.scale(right)).scale(MOVE_SPEED);
        self.heading = right.atan2(fwd);
        self.speed = self.velocity.length();
    }

    fn begin_blend_down(&mut self, physics: &PhysicsWorld, up: Vec3) {
        self.blending_down = true;
        self.blend_factor = 1.0;
        if let Some(body) = self.rigid_body {
            let linvel = physics.body_linvel(body).unwrap_or(Vec3::ZERO);
            self.inherited_tangent_velocity = linvel.project_onto_plane(up);
        }
    }

    // ---- per-tick advance ----------------------------------------------

    pub fn update_position(&mut self, dt: f32, physics: &mut PhysicsWorld, terrain: &TerrainField) {
        match self.physics_mode {
            PhysicsMode::Settled => return,
            PhysicsMode::Dynamic => {
                if self.blending_down {
                    self.advance_blend_down(dt, physics, terrain);
                }
                return;
            }
            PhysicsMode::Kinematic => {}
        }

        let up_before = self.position.normalize();
        if self.path.is_some() {
            self.advance_path(dt, up_before);
        } else if self.movement_mode == MovementMode::Airborne {
            self.vertical_velocity -= GRAVITY_MAGNITUDE * dt;
        }

        self.position = self.position + self.velocity.scale(dt);

        if self.movement_mode == MovementMode::Airborne {
            self.altitude += self.vertical_velocity * dt;
            if self.altitude <= 0.0 {
                self.altitude = 0.0;
                self.vertical_velocity = 0.0;
                self.movement_mode = MovementMode::Grounded;
            }
        }

        let up = self.position.normalize();
        let ideal_radius = terrain.radius_at(up) + CUBOID_HALF_EXTENTS.y + self.altitude;
        let moving = self.velocity.length_squared() > 1.0e-6;

        if moving || self.movement_mode == MovementMode::Airborne {
            self.position = up.scale(ideal_radius);
        } else {
            let current_radius = self.position.length();
            let correction =
                ((ideal_radius - current_radius) * SPRING_GAIN).clamp(-MAX_CORRECTION_STEP, MAX_CORRECTION_STEP);
            self.position = up.scale(current_radius + correction);
        }

        self.update_orientation(up);
    }

    fn advance_path(&mut self, dt: f32, up: Vec3) {
        let step = MOVE_SPEED * dt;

        let Some(path) = self.path.as_mut() else { return };
        if path.index >= path.waypoints.len() {
            self.path = None;
            self.velocity = Vec3::ZERO;
            self.speed = 0.0;
            return;
        }

        let target = path.waypoints[path.index];
        let planar_to_target = (target - self.position).project_onto_plane(up);
        if planar_to_target.length() <= step {
            path.index += 1;
            if path.index >= path.waypoints.len() {
                if path.closed {
                    path.index = 0;
                } else {
                    self.path = None;
                    self.velocity = Vec3::ZERO;
                    self.speed = 0.0;
                    return;
                }
            }
        }

        if let Some(path) = self.path.as_ref() {
            let target = path.waypoints[path.index];
            let dir = (target - self.position).project_onto_plane(up).normalize();
            self.velocity = dir.scale(MOVE_SPEED);
            let frame = TangentFrame::from_normal(up);
            self.heading = dir.dot(frame.right).atan2(dir.dot(frame.forward));
            self.speed = self.velocity.length();
        }
    }

    fn update_orientation(&mut self, up: Vec3) {
        if self.orientation_blend_remaining > 0 {
            let total = self.tuning.blend_duration_ticks.max(1) as f32;
            let elapsed = total - self.orientation_blend_remaining as f32;
            let t = ((elapsed + 1.0) / total).clamp(0.0, 1.0);
            let target = canonical_orientation(up, self.heading);
            self.orientation = self.captured_exit_quat.slerp(target, t);
            self.orientation_blend_remaining -= 1;
        } else {
            self.orientation = canonical_orientation(up, self.heading);
        }
    }

    // ---- dynamic lifecycle ----------------------------------------------

    /// Requires a rigid-body handle already attached to this unit.
    pub fn enter_dynamic(&mut self, physics: &mut PhysicsWorld, impulse: Option<Vec3>) {
        let Some(body) = self.rigid_body else {
            tracing::error!(unit = self.id.0, "enter_dynamic called without a rigid body");
            return;
        };

        self.path = None;
        self.velocity = Vec3::ZERO;
        self.speed = 0.0;

        physics.set_body_type(body, RigidBodyType::Dynamic);
        physics.set_gravity_scale(body, 0.0);
        for collider in self.colliders(physics) {
            physics.set_sensor(collider, false);
        }
        physics.set_damping(body, DYNAMIC_LINEAR_DAMPING, DYNAMIC_ANGULAR_DAMPING);
        physics.enable_ccd(body, true);

        let up = self.position.normalize();
        self.position = up.scale(self.position.length() + PRE_SNAP_OFFSET);

        physics.set_position(body, self.position);
        physics.set_rotation(body, self.orientation);
        physics.set_linvel(body, Vec3::ZERO);
        physics.set_angvel(body, Vec3::ZERO);
        if let Some(impulse) = impulse {
            physics.apply_impulse(body, impulse);
        }

        self.physics_mode = PhysicsMode::Dynamic;
        self.blending_down = false;
        self.takeover_ready_ticks = 0;
        self.settle_ticks = 0;
    }

    /// Reads final position/rotation from the body, adopts tangent velocity,
    /// switches back to kinematic. Does **not** snap to terrain — preserves
    /// landing precision.
    pub fn exit_dynamic(&mut self, physics: &mut PhysicsWorld) {
        let Some(body) = self.rigid_body else { return };

        let position = physics.body_position(body).unwrap_or(self.position);
        let rotation = physics.body_rotation(body).unwrap_or(self.orientation);
        let linvel = physics.body_linvel(body).unwrap_or(Vec3::ZERO);

        self.position = position;
        let up = position.normalize();
        let tangent_velocity = linvel.project_onto_plane(up);
        self.velocity = tangent_velocity;
        self.speed = tangent_velocity.length();

        physics.set_body_type(body, RigidBodyType::KinematicPositionBased);
        physics.set_linvel(body, Vec3::ZERO);
        for collider in self.colliders(physics) {
            physics.set_sensor(collider, true);
        }
        physics.set_damping(body, 0.0, 0.0);
        physics.enable_ccd(body, false);

        self.physics_mode = PhysicsMode::Kinematic;
        self.blending_down = false;
        self.reentry_cooldown_ticks = REENTRY_COOLDOWN_TICKS;

        self.captured_exit_quat = rotation;
        self.orientation_blend_remaining = self.tuning.blend_duration_ticks;

        self.heading = if self.speed > 1.0e-3 {
            let frame = TangentFrame::from_normal(up);
            let dir = tangent_velocity.normalize();
            dir.dot(frame.right).atan2(dir.dot(frame.forward))
        } else {
            let forward_tangent = rotation.forward().project_onto_plane(up).normalize();
            let frame = TangentFrame::from_normal(up);
            forward_tangent.dot(frame.right).atan2(forward_tangent.dot(frame.forward))
        };
    }

    /// Like `exit_dynamic` but leaves `physics_mode = SETTLED`, preserves
    /// the tumble orientation, and never starts an orientation blend.
    pub fn settle_dynamic(&mut self, physics: &mut PhysicsWorld) {
        let Some(body) = self.rigid_body else { return };

        self.position = physics.body_position(body).unwrap_or(self.position);
        self.orientation = physics.body_rotation(body).unwrap_or(self.orientation);
        self.velocity = Vec3::ZERO;
        self.speed = 0.0;

        physics.set_body_type(body, RigidBodyType::KinematicPositionBased);
        physics.set_linvel(body, Vec3::ZERO);
        for collider in self.colliders(physics) {
            physics.set_sensor(collider, true);
        }
        physics.set_damping(body, 0.0, 0.0);
        physics.enable_ccd(body, false);

        self.physics_mode = PhysicsMode::Settled;
        self.blending_down = false;
    }

    fn advance_blend_down(&mut self, _dt: f32, physics: &mut PhysicsWorld, terrain: &TerrainField) {
        let Some(body) = self.rigid_body else { return };

        self.inherited_tangent_velocity = self.inherited_tangent_velocity.scale(BLEND_VELOCITY_DECAY);
        let blended = self.velocity.scale(1.0 - self.blend_factor)
            + self.inherited_tangent_velocity.scale(self.blend_factor);

        self.position = self.position + blended.scale(1.0 / TICK_RATE_HZ as f32);

        let up = self.position.normalize();
        let ideal_radius = terrain.radius_at(up) + CUBOID_HALF_EXTENTS.y;
        let current_radius = self.position.length();
        let correction =
            ((ideal_radius - current_radius) * SPRING_GAIN).clamp(-MAX_CORRECTION_STEP, MAX_CORRECTION_STEP);
        self.position = up.scale(current_radius + correction);

        physics.set_position(body, self.position);
        physics.set_linvel(body, Vec3::ZERO);

        self.update_orientation(up);

        self.blend_factor -= 1.0 / self.tuning.blend_duration_ticks.max(1) as f32;
        if self.blend_factor <= 0.0 {
            self.exit_dynamic(physics);
        }
    }

    /// Called once per tick for every `DYNAMIC` unit after the physics
    /// world has stepped. Tracks both the settle counters and the
    /// takeover-readiness gate; the room decides whether to call
    /// `settle_dynamic` from the returned outcome.
    pub fn sync_from_rigid_body(&mut self, physics: &PhysicsWorld, terrain: &TerrainField) -> DynamicOutcome {
        let Some(body) = self.rigid_body else { return DynamicOutcome::Continue };
        let Some(position) = physics.body_position(body) else { return DynamicOutcome::Continue };
        let rotation = physics.body_rotation(body).unwrap_or(self.orientation);
        let linvel = physics.body_linvel(body).unwrap_or(Vec3::ZERO);
        let angvel = physics.body_angvel(body).unwrap_or(Vec3::ZERO);

        self.position = position;
        self.orientation = rotation;

        let up = position.normalize();
        let terrain_radius = terrain.radius_at(up);
        let grounded = (position.length() - (terrain_radius + CUBOID_HALF_EXTENTS.y)).abs() <= GROUNDING_EPS;
        let terrain_normal = terrain.normal_at(position);
        let oriented = rotation.up().dot(terrain_normal) >= takeover_tilt_cos();
        let slow = linvel.length() <= TAKEOVER_LINVEL_THRESHOLD && angvel.length() <= TAKEOVER_ANGVEL_THRESHOLD;

        if grounded && oriented && slow {
            self.takeover_ready_ticks += 1;
        } else {
            self.takeover_ready_ticks = 0;
        }

        if linvel.length() <= SETTLE_LINEAR_THRESHOLD && angvel.length() <= SETTLE_ANGULAR_THRESHOLD {
            self.settle_ticks += 1;
        } else {
            self.settle_ticks = 0;
        }

        if self.settle_ticks >= SETTLE_DURATION_TICKS && !self.blending_down {
            DynamicOutcome::ReadyToSettle
        } else {
            DynamicOutcome::Continue
        }
    }

    fn colliders(&self, physics: &PhysicsWorld) -> Vec<ColliderHandle> {
        match self.rigid_body {
            Some(body) => physics.colliders_of_body(body).collect(),
            None => Vec::new(),
        }
    }

    // ---- slope rollover --------------------------------------------------

    /// Per-tick check, only meaningful while `KINEMATIC` and out of
    /// reentry cooldown. Returns a down-slope impulse once the tilt has
    /// exceeded the threshold for `SLOPE_DEBOUNCE_TICKS` consecutive ticks;
    /// the caller is expected to call `enter_dynamic` with it.
    pub fn check_slope_rollover(&mut self) -> Option<Vec3> {
        if self.physics_mode != PhysicsMode::Kinematic {
            return None;
        }
        if self.reentry_cooldown_ticks > 0 {
            self.reentry_cooldown_ticks -= 1;
            return None;
        }

        let up = self.position.normalize();
        let local_up = self.orientation.up();
        let tilt = local_up.dot(up).clamp(-1.0, 1.0).acos();

        if tilt > self.tuning.rollover_threshold_rad {
            self.slope_debounce_ticks += 1;
            if self.slope_debounce_ticks >= SLOPE_DEBOUNCE_TICKS {
                self.slope_debounce_ticks = 0;
                return Some((-up).scale(SLOPE_IMPULSE_STRENGTH));
            }
        } else {
            self.slope_debounce_ticks = 0;
        }
        None
    }

    // ---- snapshot ----------------------------------------------------

    pub fn state_label(&self) -> &'static str {
        match self.physics_mode {
            PhysicsMode::Settled => "SETTLED",
            PhysicsMode::Dynamic if self.blending_down => "BLEND_DOWN",
            PhysicsMode::Dynamic => "DYNAMIC",
            PhysicsMode::Kinematic => match self.movement_mode {
                MovementMode::Airborne => "AIRBORNE",
                MovementMode::Grounded => "GROUNDED",
            },
        }
    }

    pub fn to_snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            id: self.id,
            owner_slot: self.owner_slot,
            model_index: self.model_index,
            px: self.position.x,
            py: self.position.y,
            pz: self.position.z,
            qx: self.orientation.x,
            qy: self.orientation.y,
            qz: self.orientation.z,
            qw: self.orientation.w,
            heading: self.heading,
            speed: self.speed,
            state: self.state_label(),
            hp: self.hp,
            mode: self.movement_mode,
            physics_mode: self.physics_mode,
            altitude: self.altitude,
        }
    }
}

/// Rotates the tangent frame's forward axis by `heading` around `up`, then
/// builds a look-rotation from it — the shared target orientation used by
/// both the steady-state kinematic case and the orientation-blend target.
fn canonical_orientation(up: Vec3, heading: f32) -> Quat {
    let frame = TangentFrame::from_normal(up);
    let heading_forward = Quat::from_axis_angle(up, heading).rotate_vector(frame.forward);
    Quat::look_rotation(heading_forward, up)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_unit() -> Unit {
        let up = Vec3::Y;
        Unit::new(UnitId(1), Slot(0), 0, up.scale(60.0), up)
    }

    #[test]
    fn diagonal_input_has_same_speed_as_axis_aligned() {
        let physics = PhysicsWorld::new(physics_world::PhysicsConfig::default());
        let mut a = flat_unit();
        let mut b = flat_unit();
        a.apply_input(
            MoveInput { forward: true, backward: false, left: false, right: false },
            &physics,
            Vec3::Y,
        );
        b.apply_input(
            MoveInput { forward: true, backward: false, left: false, right: true },
            &physics,
            Vec3::Y,
        );
        assert!((a.speed - b.speed).abs() < 1.0e-5);
    }

    #[test]
    fn settled_unit_ignores_input() {
        let physics = PhysicsWorld::new(physics_world::PhysicsConfig::default());
        let mut unit = flat_unit();
        unit.physics_mode = PhysicsMode::Settled;
        unit.apply_input(
            MoveInput { forward: true, ..Default::default() },
            &physics,
            Vec3::Y,
        );
        assert_eq!(unit.velocity, Vec3::ZERO);
    }

    #[test]
    fn dynamic_unit_ignores_input_before_takeover_debounce() {
        let physics = PhysicsWorld::new(physics_world::PhysicsConfig::default());
        let mut unit = flat_unit();
        unit.physics_mode = PhysicsMode::Dynamic;
        unit.takeover_ready_ticks = TAKEOVER_DEBOUNCE_TICKS - 1;
        unit.apply_input(
            MoveInput { forward: true, ..Default::default() },
            &physics,
            Vec3::Y,
        );
        assert!(!unit.is_blending_down());
    }

    #[test]
    fn dynamic_unit_begins_blend_down_after_takeover_debounce() {
        let physics = PhysicsWorld::new(physics_world::PhysicsConfig::default());
        let mut unit = flat_unit();
        unit.physics_mode = PhysicsMode::Dynamic;
        unit.takeover_ready_ticks = TAKEOVER_DEBOUNCE_TICKS;
        unit.apply_input(
            MoveInput { forward: true, ..Default::default() },
            &physics,
            Vec3::Y,
        );
        assert!(unit.is_blending_down());
    }

    #[test]
    fn slope_rollover_fires_after_debounce() {
        let mut unit = flat_unit();
        unit.orientation = Quat::from_axis_angle(Vec3::X, 60f32.to_radians());
        let mut impulse = None;
        for _ in 0..SLOPE_DEBOUNCE_TICKS {
            impulse = unit.check_slope_rollover();
        }
        assert!(impulse.is_some());
    }

    #[test]
    fn slope_rollover_resets_below_threshold() {
        let mut unit = flat_unit();
        unit.orientation = Quat::IDENTITY;
        assert!(unit.check_slope_rollover().is_none());
        assert_eq!(unit.slope_debounce_ticks, 0);
    }
}
