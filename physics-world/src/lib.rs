//! Wrapper over `rapier3d` (spec §4.3): zero global gravity, spherical
//! gravity applied per dynamic body before every internal sub-step, fixed
//! timestep, and a collision event queue drained once per room tick.
//!
//! Grounded on `onx2-av/shared/src/rapier_world.rs` (headless `rapier3d` +
//! `nalgebra` pairing) and the plain `PhysicsPipeline::step` wiring used
//! across the pack's non-Bevy Rapier integrations.

mod conv;

pub use rapier3d;

use rapier3d::crossbeam::channel::{Receiver, Sender, unbounded};
use rapier3d::prelude::*;
use sphere_math::{Quat, Vec3};
use thiserror::Error;

pub use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};

/// Every tunable named by spec §4.3/§6, with a `Default` matching the
/// normative constants (60 Hz physics, 3 sub-steps, standard gravity
/// magnitude).
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub physics_hz: u32,
    pub sub_steps: u32,
    pub gravity_magnitude: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            physics_hz: 60,
            sub_steps: 3,
            gravity_magnitude: 9.81,
        }
    }
}

/// Non-fatal construction errors. Calling any method after [`PhysicsWorld::shutdown`]
/// is a caller bug, not a recoverable error, and panics instead (spec §7).
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("a trimesh collider can only be attached to a fixed rigid body")]
    TrimeshRequiresFixedBody,
    #[error("unknown rigid-body handle")]
    UnknownBody,
}

/// One observed collision-start/stop pair, keyed by the two collider handles
/// involved. The room resolves each handle to a unit/obstacle/mine via
/// [`PhysicsWorld::get_body_by_collider_handle`].
#[derive(Debug, Clone, Copy)]
pub enum CollisionEventKind {
    Started(ColliderHandle, ColliderHandle),
    Stopped(ColliderHandle, ColliderHandle),
}

/// Owns the full Rapier scene. Exclusively owned by its creating room; there
/// is deliberately no `Arc`/`Mutex` here (spec §5 — the physics world has a
/// single owner, the room's tick task).
pub struct PhysicsWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    config: PhysicsConfig,
    collision_send: Sender<CollisionEvent>,
    collision_recv: Receiver<CollisionEvent>,
    contact_force_send: Sender<ContactForceEvent>,
    contact_force_recv: Receiver<ContactForceEvent>,
    shut_down: bool,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = 1.0 / config.physics_hz as f32;

        let (collision_send, collision_recv) = unbounded();
        let (contact_force_send, contact_force_recv) = unbounded();

        PhysicsWorld {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            config,
            collision_send,
            collision_recv,
            contact_force_send,
            contact_force_recv,
            shut_down: false,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    fn check_alive(&self) {
        assert!(
            !self.shut_down,
            "PhysicsShutDown: method called on a PhysicsWorld after shutdown()"
        );
    }

    // ---- body lifecycle --------------------------------------------------

    pub fn create_dynamic_body(&mut self, position: Vec3) -> RigidBodyHandle {
        self.check_alive();
        let rb = RigidBodyBuilder::dynamic()
            .translation(conv::to_na_vector(position))
            .gravity_scale(0.0)
            .build();
        self.bodies.insert(rb)
    }

    pub fn create_kinematic_body(&mut self, position: Vec3) -> RigidBodyHandle {
        self.check_alive();
        let rb = RigidBodyBuilder::kinematic_position_based()
            .translation(conv::to_na_vector(position))
            .build();
        self.bodies.insert(rb)
    }

    pub fn create_fixed_body(&mut self, position: Vec3) -> RigidBodyHandle {
        self.check_alive();
        let rb = RigidBodyBuilder::fixed()
            .translation(conv::to_na_vector(position))
            .build();
        self.bodies.insert(rb)
    }

    /// Removes a body and all of its colliders/joints. Safe to call on
    /// obstacle/terrain-patch teardown.
    pub fn remove_body(&mut self, body: RigidBodyHandle) {
        self.check_alive();
        self.bodies.remove(
            body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    // ---- colliders ---------------------------------------------------

    pub fn attach_ball_collider(
        &mut self,
        body: RigidBodyHandle,
        radius: f32,
        enable_collision_events: bool,
    ) -> ColliderHandle {
        self.check_alive();
        let mut builder = ColliderBuilder::ball(radius);
        if enable_collision_events {
            builder = builder.active_events(ActiveEvents::COLLISION_EVENTS);
        }
        self.colliders
            .insert_with_parent(builder.build(), body, &mut self.bodies)
    }

    pub fn attach_cuboid_collider(
        &mut self,
        body: RigidBodyHandle,
        half_extents: Vec3,
        enable_collision_events: bool,
    ) -> ColliderHandle {
        self.check_alive();
        let mut builder =
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z);
        if enable_collision_events {
            builder = builder.active_events(ActiveEvents::COLLISION_EVENTS);
        }
        self.colliders
            .insert_with_parent(builder.build(), body, &mut self.bodies)
    }

    /// Attaches a trimesh collider. `body` must be fixed — moving trimeshes
    /// are not supported by this wrapper (matches spec §4.3, terrain patches
    /// are always fixed bodies).
    pub fn attach_trimesh_collider(
        &mut self,
        body: RigidBodyHandle,
        vertices: &[Vec3],
        indices: &[[u32; 3]],
    ) -> Result<ColliderHandle, PhysicsError> {
        self.check_alive();
        let Some(rb) = self.bodies.get(body) else {
            return Err(PhysicsError::UnknownBody);
        };
        if !rb.is_fixed() {
            return Err(PhysicsError::TrimeshRequiresFixedBody);
        }
        let points: Vec<Point<f32>> = vertices
            .iter()
            .map(|v| Point::new(v.x, v.y, v.z))
            .collect();
        let collider = ColliderBuilder::trimesh(points, indices.to_vec())
            .map_err(|_| PhysicsError::TrimeshRequiresFixedBody)?
            .build();
        Ok(self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies))
    }

    pub fn set_collision_events_enabled(&mut self, collider: ColliderHandle, enabled: bool) {
        self.check_alive();
        if let Some(c) = self.colliders.get_mut(collider) {
            c.set_active_events(if enabled {
                ActiveEvents::COLLISION_EVENTS
            } else {
                ActiveEvents::empty()
            });
        }
    }

    pub fn set_sensor(&mut self, collider: ColliderHandle, is_sensor: bool) {
        self.check_alive();
        if let Some(c) = self.colliders.get_mut(collider) {
            c.set_sensor(is_sensor);
        }
    }

    pub fn colliders_of_body<'a>(
        &'a self,
        body: RigidBodyHandle,
    ) -> impl Iterator<Item = ColliderHandle> + 'a {
        self.bodies
            .get(body)
            .map(|rb| rb.colliders().to_vec())
            .unwrap_or_default()
            .into_iter()
    }

    // ---- body state --------------------------------------------------

    pub fn set_body_type(&mut self, body: RigidBodyHandle, kind: RigidBodyType) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_body_type(kind, true);
        }
    }

    pub fn set_gravity_scale(&mut self, body: RigidBodyHandle, scale: f32) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_gravity_scale(scale, true);
        }
    }

    pub fn set_damping(&mut self, body: RigidBodyHandle, linear: f32, angular: f32) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_linear_damping(linear);
            rb.set_angular_damping(angular);
        }
    }

    pub fn enable_ccd(&mut self, body: RigidBodyHandle, enabled: bool) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.enable_ccd(enabled);
        }
    }

    pub fn set_position(&mut self, body: RigidBodyHandle, position: Vec3) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_translation(conv::to_na_vector(position), true);
        }
    }

    pub fn set_next_kinematic_position(&mut self, body: RigidBodyHandle, position: Vec3, rotation: Quat) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            let iso = Isometry::from_parts(
                conv::to_na_translation(position),
                conv::to_na_rotation(rotation),
            );
            rb.set_next_kinematic_position(iso);
        }
    }

    pub fn set_rotation(&mut self, body: RigidBodyHandle, rotation: Quat) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_rotation(conv::to_na_rotation(rotation), true);
        }
    }

    pub fn set_linvel(&mut self, body: RigidBodyHandle, v: Vec3) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_linvel(conv::to_na_vector(v), true);
        }
    }

    pub fn set_angvel(&mut self, body: RigidBodyHandle, v: Vec3) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_angvel(conv::to_na_vector(v), true);
        }
    }

    pub fn apply_impulse(&mut self, body: RigidBodyHandle, impulse: Vec3) {
        self.check_alive();
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.apply_impulse(conv::to_na_vector(impulse), true);
        }
    }

    pub fn body_position(&self, body: RigidBodyHandle) -> Option<Vec3> {
        self.check_alive();
        self.bodies
            .get(body)
            .map(|rb| conv::from_na_vector(&rb.translation()))
    }

    pub fn body_rotation(&self, body: RigidBodyHandle) -> Option<Quat> {
        self.check_alive();
        self.bodies
            .get(body)
            .map(|rb| conv::from_na_rotation(rb.rotation()))
    }

    pub fn body_linvel(&self, body: RigidBodyHandle) -> Option<Vec3> {
        self.check_alive();
        self.bodies
            .get(body)
            .map(|rb| conv::from_na_vector(rb.linvel()))
    }

    pub fn body_angvel(&self, body: RigidBodyHandle) -> Option<Vec3> {
        self.check_alive();
        self.bodies
            .get(body)
            .map(|rb| conv::from_na_vector(rb.angvel()))
    }

    pub fn get_body_by_collider_handle(&self, collider: ColliderHandle) -> Option<RigidBodyHandle> {
        self.check_alive();
        self.colliders.get(collider).and_then(|c| c.parent())
    }

    // ---- stepping ------------------------------------------------------

    /// Runs `sub_steps` internal solver steps. Before every internal step,
    /// applies spherical gravity to every dynamic body: bodies within an
    /// epsilon of the planet's center are skipped so the force direction
    /// never divides by (near) zero.
    pub fn step(&mut self) {
        self.check_alive();
        let zero_gravity = nalgebra::Vector3::zeros();
        let event_handler =
            ChannelEventCollector::new(self.collision_send.clone(), self.contact_force_send.clone());

        for _ in 0..self.config.sub_steps {
            self.apply_spherical_gravity();

            self.physics_pipeline.step(
                &zero_gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                None,
                &(),
                &event_handler,
            );
        }
    }

    fn apply_spherical_gravity(&mut self) {
        const ORIGIN_EPS: f32 = 1.0e-4;
        let magnitude = self.config.gravity_magnitude;
        for (_, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            let position = *body.translation();
            let distance = position.norm();
            if distance <= ORIGIN_EPS {
                continue;
            }
            let direction = -position / distance;
            let force = direction * magnitude * body.mass();
            body.add_force(force, true);
        }
    }

    /// Drains every collision event queued since the last call and invokes
    /// `callback` once per event, in arrival order.
    pub fn drain_collision_events(&mut self, mut callback: impl FnMut(CollisionEventKind)) {
        self.check_alive();
        while let Ok(event) = self.collision_recv.try_recv() {
            match event {
                CollisionEvent::Started(h1, h2, _flags) => {
                    callback(CollisionEventKind::Started(h1, h2));
                }
                CollisionEvent::Stopped(h1, h2, _flags) => {
                    callback(CollisionEventKind::Stopped(h1, h2));
                }
            }
        }
        // Contact-force events are not currently surfaced to callers; drain
        // so the channel doesn't grow unbounded.
        while self.contact_force_recv.try_recv().is_ok() {}
    }

    /// Idempotent. Frees every underlying resource; every other method
    /// panics if called afterward.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.bodies = RigidBodySet::new();
        self.colliders = ColliderSet::new();
        self.island_manager = IslandManager::new();
        self.impulse_joints = ImpulseJointSet::new();
        self.multibody_joints = MultibodyJointSet::new();
        self.shut_down = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_body_falls_toward_origin() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        let start = Vec3::new(0.0, 60.0, 0.0);
        let body = world.create_dynamic_body(start);
        world.attach_ball_collider(body, 0.5, false);

        for _ in 0..10 {
            world.step();
        }

        let pos = world.body_position(body).unwrap();
        assert!(pos.length() < start.length(), "body should fall toward the origin");
        // Should move strictly along the initial radial direction (straight down).
        let direction = pos.normalize();
        let initial_direction = start.normalize();
        assert!(direction.dot(initial_direction) > 0.99);
    }

    #[test]
    fn body_at_origin_is_skipped_by_gravity() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        let body = world.create_dynamic_body(Vec3::ZERO);
        world.attach_ball_collider(body, 0.5, false);
        world.step();
        let v = world.body_linvel(body).unwrap();
        assert!(v.is_finite());
    }

    #[test]
    #[should_panic(expected = "PhysicsShutDown")]
    fn method_after_shutdown_panics() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        world.shutdown();
        world.create_dynamic_body(Vec3::ZERO);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        world.shutdown();
        world.shutdown();
        assert!(world.is_shut_down());
    }

    #[test]
    fn trimesh_requires_fixed_body() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        let body = world.create_dynamic_body(Vec3::ZERO);
        let verts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let result = world.attach_trimesh_collider(body, &verts, &[[0, 1, 2]]);
        assert!(matches!(result, Err(PhysicsError::TrimeshRequiresFixedBody)));
    }
}
