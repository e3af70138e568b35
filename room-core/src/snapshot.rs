//! Room-level snapshot and the state-hash determinism probe (spec §3 `Snapshot`,
//! §6 "State hash").

use unit_sim::UnitSnapshot;

#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub version: u32,
    pub tick: u64,
    pub server_time_ms: u64,
    pub units: Vec<UnitSnapshot>,
}

pub const SNAPSHOT_VERSION: u32 = 1;

/// Version 1 rolling XOR/multiply hash over `tick`, then for each unit in id
/// order `{id, floor(px*1000), floor(py*1000), floor(pz*1000), hp}`,
/// force-truncated to 32-bit unsigned, emitted as hex (spec §6).
///
/// `units` must already be in id order — the caller (room) iterates units in
/// deterministic id order for every physics-consuming pass, so this
/// function does not re-sort.
pub fn state_hash(tick: u64, units: &[UnitSnapshot]) -> String {
    let mut h: u32 = 0x9e3779b9u32 ^ (tick as u32) ^ ((tick >> 32) as u32);
    for unit in units {
        h ^= unit.id.0;
        h = h.wrapping_mul(0x01000193);
        h ^= (unit.px * 1000.0).floor() as i64 as u32;
        h = h.wrapping_mul(0x01000193);
        h ^= (unit.py * 1000.0).floor() as i64 as u32;
        h = h.wrapping_mul(0x01000193);
        h ^= (unit.pz * 1000.0).floor() as i64 as u32;
        h = h.wrapping_mul(0x01000193);
        h ^= unit.hp as u32;
        h = h.wrapping_mul(0x01000193);
    }
    format!("{h:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use unit_sim::{MovementMode, PhysicsMode, Slot, UnitId};

    fn snap(id: u32, px: f32) -> UnitSnapshot {
        UnitSnapshot {
            id: UnitId(id),
            owner_slot: Slot(0),
            model_index: 0,
            px,
            py: 60.0,
            pz: 0.0,
            qx: 0.0,
            qy: 0.0,
            qz: 0.0,
            qw: 1.0,
            heading: 0.0,
            speed: 0.0,
            state: "GROUNDED",
            hp: 100,
            mode: MovementMode::Grounded,
            physics_mode: PhysicsMode::Kinematic,
            altitude: 0.0,
        }
    }

    #[test]
    fn hashing_the_same_state_twice_yields_the_same_value() {
        let units = vec![snap(1, 0.0), snap(2, 5.0)];
        assert_eq!(state_hash(10, &units), state_hash(10, &units));
    }

    #[test]
    fn different_positions_yield_different_hashes() {
        let a = vec![snap(1, 0.0)];
        let b = vec![snap(1, 1.0)];
        assert_ne!(state_hash(10, &a), state_hash(10, &b));
    }
}
