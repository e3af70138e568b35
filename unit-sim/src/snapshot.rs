//! Wire-shaped per-unit snapshot (spec §3, §6 `SERVER_SNAPSHOT.units[]`).
//!
//! Deliberately flat `f32` fields rather than re-exporting `sphere_math`'s
//! `Vec3`/`Quat` with a derived `Serialize` — `sphere-math` stays
//! dependency-free, and the wire shape is the protocol's contract, not an
//! implementation detail of the math library.

use serde::Serialize;

use crate::ids::{Slot, UnitId};
use crate::unit::{MovementMode, PhysicsMode};

#[derive(Debug, Clone, Serialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub owner_slot: Slot,
    pub model_index: u32,
    pub px: f32,
    pub py: f32,
    pub pz: f32,
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
    pub qw: f32,
    pub heading: f32,
    pub speed: f32,
    pub state: &'static str,
    pub hp: i32,
    pub mode: MovementMode,
    pub physics_mode: PhysicsMode,
    pub altitude: f32,
}
