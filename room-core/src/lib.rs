//! Per-room state and orchestration (spec §4.7): composes `sphere-math`,
//! `terrain-field`, `physics-world`, `terrain-colliders`, and `unit-sim`
//! into the single mutable owner of one room's simulation.

pub mod config;
pub mod handle;
pub mod ids;
pub mod queue;
pub mod room;
pub mod sim_loop;
pub mod snapshot;

pub use config::RoomConfig;
pub use handle::{RoomHandle, RoomHandleError};
pub use ids::{MineId, ObstacleHandle, RoomId, Slot, UnitId};
pub use queue::{Command, CommandPayload, CommandQueue};
pub use room::{AdminCommand, Mine, Obstacle, Player, Room, RoomError, RoomLifecycle};
pub use sim_loop::SimLoop;
pub use snapshot::{RoomSnapshot, SNAPSHOT_VERSION, state_hash};
