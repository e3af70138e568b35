//! `RoomConfig` (spec §4.7 **[EXPANDED]**): every per-room tunable named by
//! spec §6, with `Default` equal to the normative constants. A config
//! struct with `Default` mirrors the teacher's `GameConfig.json`-driven
//! `AppState.configs` — here it is threaded through `Room::new` instead of
//! read from a shared map, since each room may run its own preset (e.g. the
//! steep-terrain scenario preset in spec §8 scenario 4).

use physics_world::PhysicsConfig;
use terrain_colliders::TerrainColliderConfig;
use terrain_field::TerrainConfig;

#[derive(Debug, Clone, Copy)]
pub struct RoomConfig {
    pub tick_rate_hz: u32,
    pub physics_enabled: bool,
    pub max_obstacles: usize,
    pub max_mines: usize,
    /// How many ticks between state-hash samples (spec §6, default 60).
    pub state_hash_sample_interval: u64,
    /// Radius used by the kinematic-kinematic and unit-obstacle proximity
    /// passes (spec §4.7 step 5) to detect a contact the solver's event
    /// stream may have missed.
    pub kinematic_contact_radius: f32,
    /// `evict_distant`'s distance argument; default `3 * patch_size`.
    pub patch_eviction_distance: f32,
    pub terrain: TerrainConfig,
    pub physics: PhysicsConfig,
    pub terrain_colliders: TerrainColliderConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        let terrain_colliders = TerrainColliderConfig::default();
        RoomConfig {
            tick_rate_hz: unit_sim::consts::TICK_RATE_HZ,
            physics_enabled: true,
            max_obstacles: 64,
            max_mines: 32,
            state_hash_sample_interval: 60,
            kinematic_contact_radius: unit_sim::consts::CUBOID_HALF_EXTENTS.z * 2.0,
            patch_eviction_distance: terrain_colliders.patch_size * 3.0,
            terrain: TerrainConfig::default(),
            physics: PhysicsConfig::default(),
            terrain_colliders,
        }
    }
}

impl RoomConfig {
    /// Mirrors spec §8 scenario 1/6: flat terrain, physics disabled.
    pub fn flat_no_physics() -> Self {
        RoomConfig {
            physics_enabled: false,
            terrain: TerrainConfig::flat_preset(),
            ..RoomConfig::default()
        }
    }

    /// Mirrors spec §8 scenario 4: steep terrain so slope-rollover is
    /// reachable in a short test.
    pub fn steep_terrain() -> Self {
        RoomConfig {
            terrain: TerrainConfig::steep_preset(),
            ..RoomConfig::default()
        }
    }
}
