//! Room-scoped identifiers. `Slot` and `UnitId` are re-exported from
//! `unit-sim` so room-core, unit-sim, and game-server all share the same
//! newtypes rather than each minting their own.

use serde::{Deserialize, Serialize};

pub use unit_sim::{Slot, UnitId};

/// A room's human-chosen identifier (the host's announced id), not a
/// database key — rooms live only in the process's `rooms` map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for a standing obstacle (spec §3). Monotonic within a room,
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObstacleHandle(pub u32);

/// Monotonic mine id, consumed on first trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MineId(pub u32);
