//! Deterministic, pure gameplay event services (spec §4.5/§8): radial and
//! directed impulses, kinematic-kinematic and unit-obstacle proximity
//! checks, and mine contact detection. Every function here is NaN-defensive
//! and order-independent of its *inputs*' order as long as callers iterate
//! units/obstacles/mines in id order, per spec §5's ordering guarantee.
//!
//! Grounded on `onx2-av/shared/src/collision/kinematic.rs`'s
//! proximity-pair-scan shape, generalized from a flat grid to spherical
//! distance.

use sphere_math::Vec3;

use crate::consts::{
    CUBOID_HALF_EXTENTS, PHYSICS_EVENT_MAX_AFFECTED, PHYSICS_EVENT_MAX_IMPULSE, PHYSICS_EVENT_MAX_RADIUS,
};
use crate::unit::{PhysicsMode, Unit};

/// One unit's share of an impulse event, indexed into the caller's unit
/// slice so the service itself never needs unit ids.
#[derive(Debug, Clone, Copy)]
pub struct ImpulseResult {
    pub unit_index: usize,
    pub impulse: Vec3,
}

/// Proximity/contact outcomes the room turns into `enter_dynamic` calls or
/// mine consumption. Variant shape matches spec §9's tagged-union design
/// note (`{Radial, Directed, KinematicCollision, ObstacleCollision,
/// MineDetonation}`).
#[derive(Debug, Clone, Copy)]
pub enum CollisionOutcome {
    KinematicCollision { a: usize, b: usize },
    ObstacleCollision { unit: usize, obstacle_index: usize },
    MineDetonation { unit: usize, mine_index: usize },
}

pub struct PhysicsEventService;

impl PhysicsEventService {
    /// Impulse falls off linearly from `strength` at the center to zero at
    /// `radius`. A unit exactly at `center` is skipped (zero-direction
    /// guard) rather than producing a NaN-direction impulse.
    pub fn radial_impulse(units: &[Unit], center: Vec3, radius: f32, strength: f32) -> Vec<ImpulseResult> {
        if !center.is_finite() || !radius.is_finite() || !strength.is_finite() {
            return Vec::new();
        }
        let radius = radius.clamp(0.0, PHYSICS_EVENT_MAX_RADIUS);
        let strength = strength.clamp(0.0, PHYSICS_EVENT_MAX_IMPULSE);

        let mut results = Vec::new();
        for (index, unit) in units.iter().enumerate() {
            if results.len() >= PHYSICS_EVENT_MAX_AFFECTED {
                break;
            }
            let offset = unit.position - center;
            let dist = offset.length();
            if dist <= 1.0e-6 || dist > radius {
                continue;
            }
            let falloff = 1.0 - dist / radius;
            let impulse = offset.scale(1.0 / dist).scale(strength * falloff);
            if !impulse.is_finite() {
                continue;
            }
            results.push(ImpulseResult { unit_index: index, impulse });
        }
        results
    }

    /// Every named unit receives the same impulse along `direction`.
    pub fn directed_impulse(unit_indices: &[usize], direction: Vec3, strength: f32) -> Vec<ImpulseResult> {
        if !direction.is_finite() || !strength.is_finite() || direction.length_squared() <= 1.0e-12 {
            return Vec::new();
        }
        let dir = direction.normalize();
        let strength = strength.clamp(0.0, PHYSICS_EVENT_MAX_IMPULSE);
        unit_indices
            .iter()
            .take(PHYSICS_EVENT_MAX_AFFECTED)
            .map(|&unit_index| ImpulseResult { unit_index, impulse: dir.scale(strength) })
            .collect()
    }
}

pub struct CollisionService;

impl CollisionService {
    /// Proximity pass for kinematic-kinematic contacts, layered alongside
    /// the rigid-body event stream (spec §9 OQ3) because kinematic bodies
    /// are not guaranteed to emit solver contact events against each other.
    pub fn check_kinematic_collisions(units: &[Unit], contact_radius: f32) -> Vec<CollisionOutcome> {
        let mut outcomes = Vec::new();
        for i in 0..units.len() {
            if units[i].physics_mode != PhysicsMode::Kinematic {
                continue;
            }
            for j in (i + 1)..units.len() {
                if units[j].physics_mode != PhysicsMode::Kinematic {
                    continue;
                }
                let dist = units[i].position.distance(units[j].position);
                if dist.is_finite() && dist <= contact_radius {
                    outcomes.push(CollisionOutcome::KinematicCollision { a: i, b: j });
                }
            }
        }
        outcomes
    }

    pub fn check_obstacle_collisions(
        units: &[Unit],
        obstacles: &[(Vec3, f32)],
    ) -> Vec<CollisionOutcome> {
        let mut outcomes = Vec::new();
        for (unit_index, unit) in units.iter().enumerate() {
            if unit.physics_mode != PhysicsMode::Kinematic {
                continue;
            }
            for (obstacle_index, &(position, radius)) in obstacles.iter().enumerate() {
                let dist = unit.position.distance(position);
                if dist.is_finite() && dist <= radius + CUBOID_HALF_EXTENTS.z {
                    outcomes.push(CollisionOutcome::ObstacleCollision { unit: unit_index, obstacle_index });
                }
            }
        }
        outcomes
    }

    pub fn check_mine_contacts(units: &[Unit], mines: &[(Vec3, f32)]) -> Vec<CollisionOutcome> {
        let mut outcomes = Vec::new();
        for (unit_index, unit) in units.iter().enumerate() {
            for (mine_index, &(position, trigger_radius)) in mines.iter().enumerate() {
                let dist = unit.position.distance(position);
                if dist.is_finite() && dist <= trigger_radius {
                    outcomes.push(CollisionOutcome::MineDetonation { unit: unit_index, mine_index });
                }
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Slot, UnitId};

    fn unit_at(id: u32, pos: Vec3) -> Unit {
        Unit::new(UnitId(id), Slot(0), 0, pos, Vec3::Y)
    }

    #[test]
    fn radial_impulse_skips_unit_at_exact_center() {
        let units = vec![unit_at(1, Vec3::new(5.0, 60.0, 0.0))];
        let results = PhysicsEventService::radial_impulse(&units, Vec3::new(5.0, 60.0, 0.0), 8.0, 6.0);
        assert!(results.is_empty());
    }

    #[test]
    fn radial_impulse_skips_units_outside_radius() {
        let units = vec![unit_at(1, Vec3::new(0.0, 60.0, 0.0)), unit_at(2, Vec3::new(100.0, 60.0, 0.0))];
        let results = PhysicsEventService::radial_impulse(&units, Vec3::new(0.0, 60.0, 0.0), 8.0, 6.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].unit_index, 0);
    }

    #[test]
    fn radial_impulse_rejects_nan_inputs() {
        let units = vec![unit_at(1, Vec3::new(1.0, 60.0, 0.0))];
        let results = PhysicsEventService::radial_impulse(&units, Vec3::new(f32::NAN, 60.0, 0.0), 8.0, 6.0);
        assert!(results.is_empty());
    }

    #[test]
    fn kinematic_collision_detects_close_pair() {
        let units = vec![unit_at(1, Vec3::new(60.0, 0.0, 0.0)), unit_at(2, Vec3::new(60.5, 0.0, 0.0))];
        let outcomes = CollisionService::check_kinematic_collisions(&units, 1.0);
        assert_eq!(outcomes.len(), 1);
    }

    #[test]
    fn mine_contact_detects_unit_within_trigger_radius() {
        let units = vec![unit_at(1, Vec3::new(60.0, 0.0, 0.0))];
        let mines = vec![(Vec3::new(60.5, 0.0, 0.0), 1.5)];
        let outcomes = CollisionService::check_mine_contacts(&units, &mines);
        assert_eq!(outcomes.len(), 1);
    }
}
