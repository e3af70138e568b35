//! Just-in-time terrain collider manager (spec §4.4): generates trimesh
//! patches only where dynamic bodies live, with a hard patch cap,
//! distance-based eviction, and a deformation-invalidation hook.
//!
//! Grounded on `onx2-av/shared/src/rapier_world.rs`'s shape-to-collider
//! construction and fixed-body ownership model, retargeted from static DB
//! rows to lazily generated spherical terrain tiles.

use std::collections::HashMap;

use physics_world::{PhysicsWorld, RigidBodyHandle};
use sphere_math::{Quat, TangentFrame, Vec3};
use terrain_field::TerrainField;

/// Quantized spherical coordinate identifying one patch. Two positions
/// within the same angular tile always map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchKey {
    pub i_lat: i32,
    pub i_lon: i32,
}

/// Owned by the manager; destroyed on eviction or invalidation.
pub struct Patch {
    pub key: PatchKey,
    pub body: RigidBodyHandle,
    pub center: Vec3,
    pub vertex_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct TerrainColliderConfig {
    pub patch_size: f32,
    pub max_patches: usize,
    pub grid_step: f32,
}

impl Default for TerrainColliderConfig {
    fn default() -> Self {
        TerrainColliderConfig {
            patch_size: 16.0,
            max_patches: 64,
            grid_step: 2.0,
        }
    }
}

pub struct TerrainColliderManager {
    patches: HashMap<PatchKey, Patch>,
    config: TerrainColliderConfig,
    terrain_radius: f32,
}

impl TerrainColliderManager {
    pub fn new(config: TerrainColliderConfig, terrain: &TerrainField) -> Self {
        TerrainColliderManager {
            patches: HashMap::new(),
            terrain_radius: terrain.config().base_radius,
            config,
        }
    }

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    fn angular_patch_size(&self) -> f32 {
        self.config.patch_size / self.terrain_radius
    }

    fn key_for_dir(&self, dir: Vec3) -> PatchKey {
        let angular = self.angular_patch_size();
        let lat = dir.y.clamp(-1.0, 1.0).asin();
        let lon = dir.z.atan2(dir.x);
        PatchKey {
            i_lat: (lat / angular).floor() as i32,
            i_lon: (lon / angular).floor() as i32,
        }
    }

    fn center_dir_for_key(&self, key: PatchKey) -> Vec3 {
        let angular = self.angular_patch_size();
        let lat = (key.i_lat as f32 + 0.5) * angular;
        let lon = (key.i_lon as f32 + 0.5) * angular;
        Vec3::new(lat.cos() * lon.cos(), lat.sin(), lat.cos() * lon.sin())
    }

    /// Generates every missing patch in the angular coverage disk around
    /// `position` out to `radius`. Generation halts at [`TerrainColliderConfig::max_patches`]
    /// — any patches still missing when the cap is hit are simply not
    /// created this call (spec §7: resource-exhaustion truncates, never
    /// aborts the tick).
    pub fn ensure_patches_around(
        &mut self,
        physics: &mut PhysicsWorld,
        terrain: &TerrainField,
        position: Vec3,
        radius: f32,
    ) {
        let dir = position.normalize();
        let angular = self.angular_patch_size();
        let angular_radius = radius / self.terrain_radius;
        let span = (angular_radius / angular).ceil() as i32 + 1;
        let center_key = self.key_for_dir(dir);

        'outer: for d_lat in -span..=span {
            for d_lon in -span..=span {
                if self.patches.len() >= self.config.max_patches {
                    tracing::debug!(
                        max_patches = self.config.max_patches,
                        "terrain patch cap reached, halting generation"
                    );
                    break 'outer;
                }
                let key = PatchKey {
                    i_lat: center_key.i_lat + d_lat,
                    i_lon: center_key.i_lon + d_lon,
                };
                if self.patches.contains_key(&key) {
                    continue;
                }
                let key_center = self.center_dir_for_key(key);
                let angular_dist = dir.dot(key_center).clamp(-1.0, 1.0).acos();
                if angular_dist > angular_radius + angular {
                    continue;
                }
                self.generate_patch(physics, terrain, key);
            }
        }
    }

    fn generate_patch(&mut self, physics: &mut PhysicsWorld, terrain: &TerrainField, key: PatchKey) {
        let center_dir = self.center_dir_for_key(key);
        let center = terrain.surface_point(center_dir);
        let (vertices, indices) =
            generate_patch_mesh(terrain, center_dir, self.config.patch_size, self.config.grid_step);

        let body = physics.create_fixed_body(Vec3::ZERO);
        // Vertices are already world-space (generated around the true
        // spherical center), so the fixed body sits at the world origin and
        // the trimesh is given in world coordinates directly.
        match physics.attach_trimesh_collider(body, &vertices, &indices) {
            Ok(_) => {
                self.patches.insert(
                    key,
                    Patch {
                        key,
                        body,
                        center,
                        vertex_count: vertices.len(),
                    },
                );
            }
            Err(err) => {
                tracing::error!(?err, ?key, "failed to attach terrain patch collider");
                physics.remove_body(body);
            }
        }
    }

    /// Destroys any patch whose world center is farther than `max_distance`
    /// from every position in `active_positions`.
    pub fn evict_distant(&mut self, physics: &mut PhysicsWorld, active_positions: &[Vec3], max_distance: f32) {
        let to_remove: Vec<PatchKey> = self
            .patches
            .values()
            .filter(|patch| {
                active_positions
                    .iter()
                    .all(|p| p.distance(patch.center) > max_distance)
            })
            .map(|patch| patch.key)
            .collect();

        for key in to_remove {
            if let Some(patch) = self.patches.remove(&key) {
                physics.remove_body(patch.body);
            }
        }
    }

    /// Destroys any patch whose center lies within `radius + patch_size *
    /// sqrt(2)` of `center` — the deformation-invalidation hook.
    pub fn invalidate_region(&mut self, physics: &mut PhysicsWorld, center: Vec3, radius: f32) {
        let threshold = radius + self.config.patch_size * std::f32::consts::SQRT_2;
        let to_remove: Vec<PatchKey> = self
            .patches
            .values()
            .filter(|patch| patch.center.distance(center) <= threshold)
            .map(|patch| patch.key)
            .collect();

        for key in to_remove {
            if let Some(patch) = self.patches.remove(&key) {
                physics.remove_body(patch.body);
            }
        }
    }

    pub fn destroy_all(&mut self, physics: &mut PhysicsWorld) {
        for (_, patch) in self.patches.drain() {
            physics.remove_body(patch.body);
        }
    }
}

/// Builds a `gridW x gridW` mesh centered on `center_dir`, winding triangles
/// so normals face outward from the planet center. Pure and independent of
/// the manager's caching policy so it is unit-testable on its own.
pub fn generate_patch_mesh(
    terrain: &TerrainField,
    center_dir: Vec3,
    patch_size: f32,
    grid_step: f32,
) -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let terrain_radius = terrain.config().base_radius;
    let half_extent = patch_size / 2.0;
    let grid_w = ((2.0 * half_extent / grid_step).floor() as usize).max(1) + 1;

    let frame = TangentFrame::from_normal(center_dir);
    let idx = |iu: usize, iv: usize| -> usize { iv * grid_w + iu };

    let mut vertices = Vec::with_capacity(grid_w * grid_w);
    for iv in 0..grid_w {
        for iu in 0..grid_w {
            let u = -half_extent + iu as f32 * grid_step;
            let v = -half_extent + iv as f32 * grid_step;
            let ang_u = u / terrain_radius;
            let ang_v = v / terrain_radius;

            let rotated_u = Quat::from_axis_angle(frame.forward, ang_u).rotate_vector(center_dir);
            let dir = Quat::from_axis_angle(frame.right, ang_v)
                .rotate_vector(rotated_u)
                .normalize();

            vertices.push(dir.scale(terrain.radius_at(dir)));
        }
    }

    // Determine winding once: a right-handed (u, v) grid should produce an
    // outward normal, but the tangent-frame handedness can flip depending on
    // `center_dir`, so check the first cell and flip every triangle
    // consistently if needed.
    let probe_normal = (vertices[idx(1, 0)] - vertices[idx(0, 0)])
        .cross(vertices[idx(0, 1)] - vertices[idx(0, 0)]);
    let flip = probe_normal.dot(center_dir) < 0.0;

    let mut indices = Vec::with_capacity((grid_w - 1) * (grid_w - 1) * 2);
    for iv in 0..grid_w - 1 {
        for iu in 0..grid_w - 1 {
            let a = idx(iu, iv) as u32;
            let b = idx(iu + 1, iv) as u32;
            let c = idx(iu, iv + 1) as u32;
            let d = idx(iu + 1, iv + 1) as u32;

            if flip {
                indices.push([a, c, b]);
                indices.push([b, c, d]);
            } else {
                indices.push([a, b, c]);
                indices.push([b, d, c]);
            }
        }
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use physics_world::PhysicsConfig;
    use terrain_field::TerrainConfig;

    #[test]
    fn patch_mesh_winds_outward() {
        let terrain = TerrainField::new(TerrainConfig::flat_preset());
        let (vertices, indices) = generate_patch_mesh(&terrain, Vec3::Y, 16.0, 4.0);
        assert!(!indices.is_empty());
        for tri in &indices {
            let a = vertices[tri[0] as usize];
            let b = vertices[tri[1] as usize];
            let c = vertices[tri[2] as usize];
            let normal = (b - a).cross(c - a);
            assert!(normal.dot(Vec3::Y) > 0.0, "triangle should face outward");
        }
    }

    #[test]
    fn patch_count_stays_under_cap() {
        let terrain = TerrainField::new(TerrainConfig::default());
        let config = TerrainColliderConfig {
            patch_size: 8.0,
            max_patches: 4,
            grid_step: 2.0,
        };
        let mut manager = TerrainColliderManager::new(config, &terrain);
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());

        manager.ensure_patches_around(&mut physics, &terrain, terrain.surface_point(Vec3::Y), 200.0);
        assert!(manager.patch_count() <= 4);
    }

    #[test]
    fn ensure_then_evict_far_leaves_no_patches() {
        let terrain = TerrainField::new(TerrainConfig::flat_preset());
        let config = TerrainColliderConfig::default();
        let mut manager = TerrainColliderManager::new(config, &terrain);
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());

        let p = terrain.surface_point(Vec3::Y);
        manager.ensure_patches_around(&mut physics, &terrain, p, 8.0);
        assert!(manager.patch_count() > 0);

        let far = terrain.surface_point(Vec3::new(1.0, 0.0, 0.0)).scale(1000.0);
        manager.evict_distant(&mut physics, &[far], 1.0);
        assert_eq!(manager.patch_count(), 0);
    }

    #[test]
    fn invalidate_region_removes_overlapping_patch() {
        let terrain = TerrainField::new(TerrainConfig::flat_preset());
        let config = TerrainColliderConfig::default();
        let mut manager = TerrainColliderManager::new(config, &terrain);
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());

        let p = terrain.surface_point(Vec3::Y);
        manager.ensure_patches_around(&mut physics, &terrain, p, 4.0);
        assert!(manager.patch_count() > 0);

        manager.invalidate_region(&mut physics, p, 1.0);
        assert_eq!(manager.patch_count(), 0);
    }
}
