//! Per-tick orchestration (spec §4.7): composes the terrain field, the
//! physics world and terrain collider manager, the command queue, and every
//! unit/obstacle/mine a room owns.
//!
//! `config.physics_enabled` gates whether the *per-tick* physics machinery
//! runs (stepping the world, draining collision events, managing terrain
//! patches) — the room still owns a real [`PhysicsWorld`] either way, since
//! every unit's rigid body is attached at spawn regardless of the toggle
//! and the hybrid state machine's `enter_dynamic`/`exit_dynamic` depend on
//! it existing. `TOGGLE_RAPIER` flips this flag at runtime without tearing
//! anything down.

use std::collections::HashMap;

use physics_world::{ColliderHandle, CollisionEventKind, PhysicsWorld, RigidBodyHandle};
use protocol::ManifestUnit;
use sphere_math::Vec3;
use terrain_colliders::TerrainColliderManager;
use terrain_field::TerrainField;
use thiserror::Error;
use unit_sim::{
    CollisionOutcome, CollisionService, DynamicOutcome, MoveInput, MovementMode, PathState, PhysicsEventService,
    PhysicsMode, Unit, UnitTuning,
};

use crate::config::RoomConfig;
use crate::ids::{MineId, ObstacleHandle, RoomId, Slot, UnitId};
use crate::queue::{Command, CommandPayload, CommandQueue};
use crate::snapshot::{RoomSnapshot, SNAPSHOT_VERSION};

/// `WAITING -> RUNNING -> ENDED`, monotonic (spec §3 `Room`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomLifecycle {
    Waiting,
    Running,
    Ended,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("manifest accepted only while the room is WAITING")]
    NotWaiting,
    #[error("manifest exceeds the maximum of {max} units")]
    ManifestTooLarge { max: usize },
    #[error("no unit with id {0:?} in this room")]
    UnknownUnit(UnitId),
}

#[derive(Debug, Clone)]
pub struct Player {
    pub user_id: String,
    pub display_name: String,
}

pub struct Obstacle {
    pub handle: ObstacleHandle,
    pub body: RigidBodyHandle,
    pub position: Vec3,
    pub radius: f32,
}

pub struct Mine {
    pub id: MineId,
    pub position: Vec3,
    pub trigger_radius: f32,
    pub upward_impulse: f32,
    pub radial_impulse: f32,
    pub blast_radius: f32,
    pub collider: Option<ColliderHandle>,
    pub body: Option<RigidBodyHandle>,
}

/// What a collider handle resolves back to, so the collision-event drain
/// and the proximity passes in spec §4.7 step 5 share one lookup.
#[derive(Debug, Clone, Copy)]
enum EntityRef {
    Unit(UnitId),
    Obstacle(ObstacleHandle),
    Mine(MineId),
}

/// Every `CMD_ADMIN` action named in spec §4.8, already validated into a
/// typed shape by `game-server`'s ingress boundary. The `enable_physics ==
/// true` dev gate lives in `game-server`'s dispatch, not here — by the time
/// a `Room` sees an `AdminCommand` it is authorized to run it.
#[derive(Debug, Clone)]
pub enum AdminCommand {
    TriggerExplosion { unit_id: Option<UnitId>, center: Option<Vec3>, radius: f32, strength: f32 },
    PlaceMine {
        position: Vec3,
        trigger_radius: Option<f32>,
        upward_impulse: Option<f32>,
        radial_impulse: Option<f32>,
        blast_radius: Option<f32>,
    },
    SpawnRock { position: Vec3, radius: f32 },
    ToggleUnitPhysics { unit_id: UnitId, enable: bool },
    DropTest { unit_id: UnitId, altitude: f32 },
    SetAltitude { unit_id: UnitId, altitude: f32 },
    ToggleRapier { enable: bool },
    SetRolloverThreshold { degrees: f32 },
}

pub struct Room {
    pub id: RoomId,
    config: RoomConfig,
    lifecycle: RoomLifecycle,

    queue: CommandQueue,
    units: Vec<Unit>,
    players: HashMap<Slot, Player>,
    obstacles: Vec<Obstacle>,
    mines: Vec<Mine>,
    collider_owner: HashMap<ColliderHandle, EntityRef>,

    terrain: TerrainField,
    physics: PhysicsWorld,
    terrain_colliders: TerrainColliderManager,

    next_obstacle_handle: u32,
    next_mine_id: u32,
    next_guest_unit_id: u32,
    default_tuning: UnitTuning,

    resource_exhaustion_count: u64,
}

impl Room {
    pub fn new(id: RoomId, config: RoomConfig) -> Self {
        let terrain = TerrainField::new(config.terrain);
        let physics = PhysicsWorld::new(config.physics);
        let terrain_colliders = TerrainColliderManager::new(config.terrain_colliders, &terrain);

        Room {
            id,
            config,
            lifecycle: RoomLifecycle::Waiting,
            queue: CommandQueue::new(),
            units: Vec::new(),
            players: HashMap::new(),
            obstacles: Vec::new(),
            mines: Vec::new(),
            collider_owner: HashMap::new(),
            terrain,
            physics,
            terrain_colliders,
            next_obstacle_handle: 0,
            next_mine_id: 0,
            next_guest_unit_id: 1_000_000,
            default_tuning: UnitTuning::default(),
            resource_exhaustion_count: 0,
        }
    }

    pub fn lifecycle(&self) -> RoomLifecycle {
        self.lifecycle
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    pub fn mine_count(&self) -> usize {
        self.mines.len()
    }

    pub fn resource_exhaustion_count(&self) -> u64 {
        self.resource_exhaustion_count
    }

    pub fn physics_enabled(&self) -> bool {
        self.config.physics_enabled
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn register_player(&mut self, slot: Slot, player: Player) {
        self.players.insert(slot, player);
    }

    pub fn player(&self, slot: Slot) -> Option<&Player> {
        self.players.get(&slot)
    }

    pub fn find_unit_owned_by_slot(&self, slot: Slot) -> Option<UnitId> {
        self.units.iter().find(|u| u.owner_slot == slot).map(|u| u.id)
    }

    // ---- lifecycle -----------------------------------------------------

    /// Host-provided manifest creation (spec §4.8 `SPAWN_MANIFEST`).
    /// Rejected outside `WAITING`.
    pub fn create_units_from_manifest(&mut self, manifest_units: &[ManifestUnit]) -> Result<(), RoomError> {
        if self.lifecycle != RoomLifecycle::Waiting {
            return Err(RoomError::NotWaiting);
        }
        if manifest_units.len() > unit_sim::consts::MANIFEST_MAX_UNITS {
            return Err(RoomError::ManifestTooLarge { max: unit_sim::consts::MANIFEST_MAX_UNITS });
        }
        for mu in manifest_units {
            let position = match (mu.px, mu.py, mu.pz) {
                (Some(x), Some(y), Some(z)) => Vec3::new(x, y, z),
                _ => {
                    let dir = Vec3::Y;
                    dir.scale(self.terrain.radius_at(dir))
                }
            };
            self.spawn_unit(UnitId(mu.id), Slot(mu.owner_slot), mu.model_index, position);
        }
        Ok(())
    }

    /// Starts the room (`WAITING -> RUNNING`). The physics world and
    /// terrain-collider manager are already built in [`Room::new`]; this
    /// method stays `async` to mirror spec §4.8/§5's "starting awaits
    /// physics initialization" at the call site, so swapping in a solver
    /// with a genuine async init step would not change this signature.
    pub async fn start(&mut self) -> Result<(), RoomError> {
        if self.lifecycle != RoomLifecycle::Waiting {
            return Err(RoomError::NotWaiting);
        }
        self.lifecycle = RoomLifecycle::Running;
        Ok(())
    }

    /// Immediate and idempotent: clears state to `ENDED`, frees physics and
    /// collider resources. Subsequent ticks on an ended room must no-op.
    pub fn stop(&mut self) {
        if self.lifecycle == RoomLifecycle::Ended {
            return;
        }
        self.terrain_colliders.destroy_all(&mut self.physics);
        self.physics.shutdown();
        self.lifecycle = RoomLifecycle::Ended;
    }

    /// Lazily maps a guest slot's first `MOVE_INPUT` to a default unit if
    /// the manifest did not already supply one for that slot (spec §9 OQ1).
    pub fn ensure_guest_unit(&mut self, slot: Slot, model_index: u32) -> UnitId {
        if let Some(unit) = self.units.iter().find(|u| u.owner_slot == slot) {
            return unit.id;
        }
        let id = UnitId(self.next_guest_unit_id);
        self.next_guest_unit_id += 1;
        let dir = Vec3::Y;
        let position = dir.scale(self.terrain.radius_at(dir));
        self.spawn_unit(id, slot, model_index, position);
        id
    }

    fn spawn_unit(&mut self, id: UnitId, owner_slot: Slot, model_index: u32, position: Vec3) -> usize {
        let up = self.terrain.normal_at(position);
        let mut unit = Unit::new(id, owner_slot, model_index, position, up).with_tuning(self.default_tuning);

        let body = self.physics.create_kinematic_body(position);
        let collider = self.physics.attach_cuboid_collider(body, unit_sim::consts::CUBOID_HALF_EXTENTS, true);
        unit.rigid_body = Some(body);
        self.collider_owner.insert(collider, EntityRef::Unit(id));

        let idx = self.units.partition_point(|u| u.id < id);
        self.units.insert(idx, unit);
        idx
    }

    fn find_unit_index(&self, id: UnitId) -> Option<usize> {
        let idx = self.units.partition_point(|u| u.id < id);
        if idx < self.units.len() && self.units[idx].id == id {
            Some(idx)
        } else {
            None
        }
    }

    fn find_unit_owned_by(&self, slot: Slot) -> Option<usize> {
        self.units.iter().position(|u| u.owner_slot == slot || u.controller_slot == Some(slot))
    }

    // ---- command ingestion ----------------------------------------------

    pub fn enqueue_command(&mut self, source_slot: Slot, scheduled_tick: Option<u64>, payload: CommandPayload) {
        if self.lifecycle != RoomLifecycle::Running {
            tracing::debug!(room = %self.id, "dropping command: room is not RUNNING");
            return;
        }
        if self.queue.len() >= unit_sim::consts::QUEUE_MAX {
            self.resource_exhaustion_count += 1;
            tracing::warn!(room = %self.id, "command queue at capacity, dropping command");
            return;
        }
        self.queue.push(source_slot, scheduled_tick, payload);
    }

    // ---- per-tick orchestration ------------------------------------------

    /// Drives one fixed-timestep advance (spec §4.7 steps 1-6). No-ops on
    /// a room that is not `RUNNING`.
    pub fn on_sim_tick(&mut self, dt: f32, tick: u64) -> Option<RoomSnapshot> {
        if self.lifecycle != RoomLifecycle::Running {
            return None;
        }

        let commands = self.queue.flush(tick);
        for command in commands {
            self.route_command(command);
        }

        if self.config.physics_enabled {
            for unit in self.units.iter() {
                if unit.physics_mode == PhysicsMode::Kinematic {
                    if let Some(body) = unit.rigid_body {
                        self.physics.set_next_kinematic_position(body, unit.position, unit.orientation);
                    }
                }
            }
        }

        for unit in self.units.iter_mut() {
            unit.update_position(dt, &mut self.physics, &self.terrain);
        }

        if self.config.physics_enabled {
            self.physics.step();

            let mut events = Vec::new();
            self.physics.drain_collision_events(|event| events.push(event));

            for unit in self.units.iter_mut() {
                if unit.physics_mode == PhysicsMode::Dynamic
                    && unit.sync_from_rigid_body(&self.physics, &self.terrain) == DynamicOutcome::ReadyToSettle
                {
                    unit.settle_dynamic(&mut self.physics);
                }
            }

            let mut rollover_impulses = Vec::new();
            for (index, unit) in self.units.iter_mut().enumerate() {
                if unit.physics_mode == PhysicsMode::Kinematic {
                    if let Some(impulse) = unit.check_slope_rollover() {
                        rollover_impulses.push((index, impulse));
                    }
                }
            }
            for (index, impulse) in rollover_impulses {
                self.units[index].enter_dynamic(&mut self.physics, Some(impulse));
            }

            self.resolve_collision_events(events);

            let contact_radius = self.config.kinematic_contact_radius;
            let kinematic_outcomes = CollisionService::check_kinematic_collisions(&self.units, contact_radius);
            self.apply_collision_outcomes(kinematic_outcomes);

            let obstacle_pairs: Vec<(Vec3, f32)> = self.obstacles.iter().map(|o| (o.position, o.radius)).collect();
            let obstacle_outcomes = CollisionService::check_obstacle_collisions(&self.units, &obstacle_pairs);
            self.apply_collision_outcomes(obstacle_outcomes);

            let mine_pairs: Vec<(Vec3, f32)> = self.mines.iter().map(|m| (m.position, m.trigger_radius)).collect();
            let mine_outcomes = CollisionService::check_mine_contacts(&self.units, &mine_pairs);
            self.apply_collision_outcomes(mine_outcomes);

            let dynamic_positions: Vec<Vec3> = self
                .units
                .iter()
                .filter(|u| u.physics_mode == PhysicsMode::Dynamic)
                .map(|u| u.position)
                .collect();
            for position in &dynamic_positions {
                self.terrain_colliders.ensure_patches_around(
                    &mut self.physics,
                    &self.terrain,
                    *position,
                    self.config.terrain_colliders.patch_size,
                );
            }
            self.terrain_colliders
                .evict_distant(&mut self.physics, &dynamic_positions, self.config.patch_eviction_distance);
        }

        Some(self.build_snapshot(tick))
    }

    fn route_command(&mut self, command: Command) {
        match command.payload {
            CommandPayload::MoveInput { unit_id, forward, backward, left, right } => {
                let index = match unit_id {
                    Some(id) => self.find_unit_index(id),
                    None => self.find_unit_owned_by(command.source_slot),
                };
                let Some(index) = index else {
                    tracing::debug!(slot = command.source_slot.0, "MOVE_INPUT: no matching unit");
                    return;
                };
                let unit = &self.units[index];
                let authorized = unit.controller_slot == Some(command.source_slot)
                    || (unit.controller_slot.is_none() && unit.owner_slot == command.source_slot);
                if !authorized {
                    tracing::debug!(unit = unit.id.0, slot = command.source_slot.0, "MOVE_INPUT: authority mismatch");
                    return;
                }
                let up = unit.position.normalize();
                self.units[index].apply_input(MoveInput { forward, backward, left, right }, &self.physics, up);
            }
            CommandPayload::PathData { unit_id, waypoints, closed } => {
                let Some(index) = self.find_unit_index(unit_id) else {
                    tracing::debug!(unit = unit_id.0, "PATH_DATA: unknown unit");
                    return;
                };
                let unit = &mut self.units[index];
                if unit.owner_slot != command.source_slot && unit.controller_slot != Some(command.source_slot) {
                    tracing::debug!(unit = unit.id.0, "PATH_DATA: authority mismatch");
                    return;
                }
                unit.path = Some(PathState { waypoints, index: 0, closed });
            }
        }
    }

    fn resolve(&self, handle: ColliderHandle) -> Option<EntityRef> {
        self.collider_owner.get(&handle).copied()
    }

    fn resolve_collision_events(&mut self, events: Vec<CollisionEventKind>) {
        let mut outcomes = Vec::new();
        for event in events {
            let CollisionEventKind::Started(h1, h2) = event else { continue };
            let (Some(r1), Some(r2)) = (self.resolve(h1), self.resolve(h2)) else { continue };
            match (r1, r2) {
                (EntityRef::Unit(a), EntityRef::Unit(b)) => {
                    if let (Some(ia), Some(ib)) = (self.find_unit_index(a), self.find_unit_index(b)) {
                        outcomes.push(CollisionOutcome::KinematicCollision { a: ia, b: ib });
                    }
                }
                (EntityRef::Unit(u), EntityRef::Obstacle(o)) | (EntityRef::Obstacle(o), EntityRef::Unit(u)) => {
                    if let (Some(iu), Some(io)) =
                        (self.find_unit_index(u), self.obstacles.iter().position(|x| x.handle == o))
                    {
                        outcomes.push(CollisionOutcome::ObstacleCollision { unit: iu, obstacle_index: io });
                    }
                }
                (EntityRef::Unit(u), EntityRef::Mine(m)) | (EntityRef::Mine(m), EntityRef::Unit(u)) => {
                    if let (Some(iu), Some(im)) = (self.find_unit_index(u), self.mines.iter().position(|x| x.id == m))
                    {
                        outcomes.push(CollisionOutcome::MineDetonation { unit: iu, mine_index: im });
                    }
                }
                _ => {}
            }
        }
        self.apply_collision_outcomes(outcomes);
    }

    fn apply_collision_outcomes(&mut self, outcomes: Vec<CollisionOutcome>) {
        for outcome in outcomes {
            match outcome {
                CollisionOutcome::KinematicCollision { a, b } => {
                    if a >= self.units.len() || b >= self.units.len() {
                        continue;
                    }
                    if self.units[a].physics_mode != PhysicsMode::Kinematic
                        || self.units[b].physics_mode != PhysicsMode::Kinematic
                    {
                        continue;
                    }
                    let dir = self.units[a].position - self.units[b].position;
                    let strength = unit_sim::consts::COLLISION_IMPULSE_STRENGTH;
                    for result in PhysicsEventService::directed_impulse(&[a], dir, strength) {
                        self.apply_impulse_outcome(result.unit_index, result.impulse);
                    }
                    for result in PhysicsEventService::directed_impulse(&[b], -dir, strength) {
                        self.apply_impulse_outcome(result.unit_index, result.impulse);
                    }
                }
                CollisionOutcome::ObstacleCollision { unit, obstacle_index } => {
                    if unit >= self.units.len() || obstacle_index >= self.obstacles.len() {
                        continue;
                    }
                    if self.units[unit].physics_mode != PhysicsMode::Kinematic {
                        continue;
                    }
                    let dir = self.units[unit].position - self.obstacles[obstacle_index].position;
                    let strength = unit_sim::consts::COLLISION_IMPULSE_STRENGTH;
                    for result in PhysicsEventService::directed_impulse(&[unit], dir, strength) {
                        self.apply_impulse_outcome(result.unit_index, result.impulse);
                    }
                }
                CollisionOutcome::MineDetonation { unit, mine_index } => {
                    if unit >= self.units.len() || mine_index >= self.mines.len() {
                        continue;
                    }
                    self.detonate_mine(mine_index, unit);
                }
            }
        }
    }

    fn apply_impulse_outcome(&mut self, unit_index: usize, impulse: Vec3) {
        let Some(unit) = self.units.get_mut(unit_index) else { return };
        match unit.physics_mode {
            PhysicsMode::Kinematic => unit.enter_dynamic(&mut self.physics, Some(impulse)),
            PhysicsMode::Dynamic => {
                if let Some(body) = unit.rigid_body {
                    self.physics.apply_impulse(body, impulse);
                }
            }
            PhysicsMode::Settled => {}
        }
    }

    fn detonate_mine(&mut self, mine_index: usize, triggering_unit: usize) {
        let mine = self.mines.remove(mine_index);
        if let Some(body) = mine.body {
            self.physics.remove_body(body);
        }
        if let Some(collider) = mine.collider {
            self.collider_owner.remove(&collider);
        }

        let results = PhysicsEventService::radial_impulse(&self.units, mine.position, mine.blast_radius, mine.radial_impulse);
        for result in results {
            self.apply_impulse_outcome(result.unit_index, result.impulse);
        }
        if let Some(unit) = self.units.get(triggering_unit) {
            let up = unit.position.normalize();
            self.apply_impulse_outcome(triggering_unit, up.scale(mine.upward_impulse));
        }
    }

    fn build_snapshot(&self, tick: u64) -> RoomSnapshot {
        RoomSnapshot {
            version: SNAPSHOT_VERSION,
            tick,
            server_time_ms: 0,
            units: self.units.iter().map(Unit::to_snapshot).collect(),
        }
    }

    // ---- admin ops -------------------------------------------------------

    pub fn apply_admin(&mut self, command: AdminCommand) -> Result<(), RoomError> {
        match command {
            AdminCommand::TriggerExplosion { unit_id, center, radius, strength } => {
                let center = match (unit_id, center) {
                    (Some(id), _) => {
                        let Some(idx) = self.find_unit_index(id) else { return Err(RoomError::UnknownUnit(id)) };
                        self.units[idx].position
                    }
                    (None, Some(c)) => c,
                    (None, None) => return Ok(()),
                };
                let results = PhysicsEventService::radial_impulse(&self.units, center, radius, strength);
                for result in results {
                    self.apply_impulse_outcome(result.unit_index, result.impulse);
                }
                Ok(())
            }
            AdminCommand::PlaceMine { position, trigger_radius, upward_impulse, radial_impulse, blast_radius } => {
                if self.mines.len() >= self.config.max_mines {
                    self.resource_exhaustion_count += 1;
                    tracing::warn!(room = %self.id, "mine cap reached, ignoring PLACE_MINE");
                    return Ok(());
                }
                let id = MineId(self.next_mine_id);
                self.next_mine_id += 1;
                let radius_for_trigger = trigger_radius.unwrap_or(unit_sim::consts::MINE_DEFAULT_TRIGGER_RADIUS);
                let body = self.physics.create_fixed_body(position);
                let collider = self.physics.attach_ball_collider(body, radius_for_trigger, true);
                self.physics.set_sensor(collider, true);
                self.collider_owner.insert(collider, EntityRef::Mine(id));
                self.mines.push(Mine {
                    id,
                    position,
                    trigger_radius: radius_for_trigger,
                    upward_impulse: upward_impulse.unwrap_or(unit_sim::consts::MINE_DEFAULT_UPWARD_IMPULSE),
                    radial_impulse: radial_impulse.unwrap_or(unit_sim::consts::MINE_DEFAULT_RADIAL_IMPULSE),
                    blast_radius: blast_radius.unwrap_or(unit_sim::consts::MINE_DEFAULT_BLAST_RADIUS),
                    collider: Some(collider),
                    body: Some(body),
                });
                Ok(())
            }
            AdminCommand::SpawnRock { position, radius } => {
                if self.obstacles.len() >= self.config.max_obstacles {
                    self.resource_exhaustion_count += 1;
                    tracing::warn!(room = %self.id, "obstacle cap reached, ignoring SPAWN_ROCK");
                    return Ok(());
                }
                let body = self.physics.create_fixed_body(position);
                let collider = self.physics.attach_ball_collider(body, radius, true);
                let handle = ObstacleHandle(self.next_obstacle_handle);
                self.next_obstacle_handle += 1;
                self.collider_owner.insert(collider, EntityRef::Obstacle(handle));
                self.obstacles.push(Obstacle { handle, body, position, radius });
                Ok(())
            }
            AdminCommand::ToggleUnitPhysics { unit_id, enable } => {
                let Some(idx) = self.find_unit_index(unit_id) else { return Err(RoomError::UnknownUnit(unit_id)) };
                let unit = &mut self.units[idx];
                if enable && unit.physics_mode == PhysicsMode::Kinematic {
                    unit.enter_dynamic(&mut self.physics, None);
                } else if !enable && unit.physics_mode == PhysicsMode::Dynamic {
                    unit.exit_dynamic(&mut self.physics);
                }
                Ok(())
            }
            AdminCommand::DropTest { unit_id, altitude } => {
                let Some(idx) = self.find_unit_index(unit_id) else { return Err(RoomError::UnknownUnit(unit_id)) };
                let unit = &mut self.units[idx];
                unit.altitude = altitude.max(0.0);
                unit.vertical_velocity = 0.0;
                unit.movement_mode = MovementMode::Airborne;
                Ok(())
            }
            AdminCommand::SetAltitude { unit_id, altitude } => {
                let Some(idx) = self.find_unit_index(unit_id) else { return Err(RoomError::UnknownUnit(unit_id)) };
                self.units[idx].altitude = altitude.max(0.0);
                Ok(())
            }
            AdminCommand::ToggleRapier { enable } => {
                self.config.physics_enabled = enable;
                Ok(())
            }
            AdminCommand::SetRolloverThreshold { degrees } => {
                self.default_tuning.rollover_threshold_rad = degrees.to_radians();
                for unit in self.units.iter_mut() {
                    let mut tuning = unit.tuning();
                    tuning.rollover_threshold_rad = self.default_tuning.rollover_threshold_rad;
                    unit.set_tuning(tuning);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_unit(id: u32, slot: u32, py: f32) -> ManifestUnit {
        ManifestUnit { id, owner_slot: slot, model_index: 0, px: Some(0.0), py: Some(py), pz: Some(0.0) }
    }

    async fn spawned_room(config: RoomConfig) -> Room {
        let mut room = Room::new(RoomId("r1".into()), config);
        room.create_units_from_manifest(&[manifest_unit(1, 0, 60.0)]).unwrap();
        room.start().await.unwrap();
        room
    }

    #[tokio::test]
    async fn scenario_host_spawn_tick_snaps_to_flat_terrain() {
        let mut room = spawned_room(RoomConfig::flat_no_physics()).await;
        let snapshot = room.on_sim_tick(1.0 / 20.0, 1).unwrap();
        assert_eq!(snapshot.units.len(), 1);
        let unit = &snapshot.units[0];
        assert_eq!(unit.id, UnitId(1));
        assert_eq!(unit.physics_mode, unit_sim::PhysicsMode::Kinematic);
        assert!((unit.py - (60.0 + unit_sim::consts::CUBOID_HALF_EXTENTS.y)).abs() < 1.0e-3);
    }

    #[tokio::test]
    async fn guest_move_input_moves_unit_northward() {
        let mut room = spawned_room(RoomConfig::flat_no_physics()).await;
        let guest = room.ensure_guest_unit(Slot(1), 0);
        room.enqueue_command(
            Slot(1),
            None,
            CommandPayload::MoveInput { unit_id: Some(guest), forward: true, backward: false, left: false, right: false },
        );
        let before = room.units().iter().find(|u| u.id == guest).unwrap().position;
        room.on_sim_tick(1.0 / 20.0, 1);
        let after = room.units().iter().find(|u| u.id == guest).unwrap().position;
        assert!(before.distance(after) > 0.0);
    }

    // The `enable_physics == true` admin dev gate itself lives in
    // game-server's dispatch (spec §4.8, §8 scenario 6) — a `Room` executes
    // whatever `AdminCommand` it is handed. What a physics-disabled room
    // must still guarantee on its own is that a mine can never carry a unit
    // into DYNAMIC while the per-tick physics machinery is switched off.
    #[tokio::test]
    async fn mine_does_not_detonate_a_unit_into_dynamic_without_physics() {
        let mut room = spawned_room(RoomConfig::flat_no_physics()).await;
        let unit_position = room.units()[0].position;
        let _ = room.apply_admin(AdminCommand::PlaceMine {
            position: unit_position,
            trigger_radius: None,
            upward_impulse: None,
            radial_impulse: None,
            blast_radius: None,
        });
        room.on_sim_tick(1.0 / 20.0, 1);
        assert_eq!(room.units()[0].physics_mode, unit_sim::PhysicsMode::Kinematic);
    }

    #[tokio::test]
    async fn manifest_round_trip_preserves_ids_and_owner_slots() {
        let mut room = Room::new(RoomId("r1".into()), RoomConfig::flat_no_physics());
        let manifest = vec![manifest_unit(1, 0, 60.0), manifest_unit(2, 1, 60.0)];
        room.create_units_from_manifest(&manifest).unwrap();
        for mu in &manifest {
            let snap = room.units().iter().find(|u| u.id == UnitId(mu.id)).unwrap().to_snapshot();
            assert_eq!(snap.id, UnitId(mu.id));
            assert_eq!(snap.owner_slot, Slot(mu.owner_slot));
        }
    }

    #[tokio::test]
    async fn manifest_outside_waiting_is_rejected() {
        let mut room = spawned_room(RoomConfig::flat_no_physics()).await;
        let result = room.create_units_from_manifest(&[manifest_unit(9, 0, 60.0)]);
        assert!(matches!(result, Err(RoomError::NotWaiting)));
    }

    #[tokio::test]
    async fn explosion_flow_pushes_outer_unit_into_dynamic_and_skips_center() {
        let mut room = Room::new(RoomId("r1".into()), RoomConfig::flat_no_physics());
        let manifest = vec![manifest_unit(1, 0, 60.0), ManifestUnit { id: 2, owner_slot: 1, model_index: 0, px: Some(3.0), py: Some(60.0), pz: Some(0.0) }];
        room.create_units_from_manifest(&manifest).unwrap();
        room.start().await.unwrap();
        room.on_sim_tick(1.0 / 20.0, 1);
        let center = room.units().iter().find(|u| u.id == UnitId(1)).unwrap().position;
        room.apply_admin(AdminCommand::TriggerExplosion {
            unit_id: Some(UnitId(1)),
            center: None,
            radius: 8.0,
            strength: 6.0,
        })
        .unwrap();
        let _ = center;
        assert_eq!(room.units().iter().find(|u| u.id == UnitId(1)).unwrap().physics_mode, unit_sim::PhysicsMode::Kinematic);
        assert_eq!(room.units().iter().find(|u| u.id == UnitId(2)).unwrap().physics_mode, unit_sim::PhysicsMode::Dynamic);
    }
}
