//! Newtype identifiers shared by every crate that touches a unit. Kept
//! distinct types (rather than bare integers) so a slot can never be passed
//! where a unit id is expected, matching spec §3's "arenas + handles" design
//! note.

use serde::{Deserialize, Serialize};

/// A player's seat in a room, `0 ..= max_slot`. Slot 0 is always the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u32);

impl Slot {
    pub const HOST: Slot = Slot(0);
}

/// Stable, room-unique unit id. Host-assigned via manifest, or server-issued
/// via the room's monotonic counter for lazily-created guest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);
