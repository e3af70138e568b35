//! Deterministic procedural scalar height field over the unit sphere
//! (spec §4.2). No randomness, no time, no I/O — every sample is a pure
//! function of `(x, y, z)` and the seed baked into [`TerrainConfig`].

use noise::{NoiseFn, Perlin};
use sphere_math::{TangentFrame, Vec3};

/// Fixed seed for the base noise generators. Deterministic by construction —
/// never derived from wall-clock time or an RNG.
pub const WORLD_SEED: u32 = 42;

/// Epsilon used by [`TerrainField::normal_at`] to sample neighboring surface
/// points.
pub const NORMAL_SAMPLE_EPS: f32 = 0.01;

/// Per-octave-band sampling parameters (continent / mountains / detail each
/// get their own band).
#[derive(Debug, Clone, Copy)]
pub struct NoiseBand {
    pub scale: f32,
    pub octaves: u32,
    pub persistence: f32,
}

impl NoiseBand {
    pub const fn new(scale: f32, octaves: u32, persistence: f32) -> Self {
        NoiseBand {
            scale,
            octaves,
            persistence,
        }
    }
}

/// Which combinator a [`NoiseBand`] sample is run through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseMode {
    /// Raw signed noise in `[-1, 1]`.
    Plain,
    /// `1 - |n|`, raised to `power` — produces sharp ridges.
    Ridged { power: f32 },
    /// `|n| * 2 - 1` — produces rolling "billowy" shapes.
    Billow,
}

/// Every tunable named by spec §4.2, with a `Default` matching a modest
/// rolling-hills preset.
#[derive(Debug, Clone, Copy)]
pub struct TerrainConfig {
    pub seed: u32,
    pub base_radius: f32,
    pub height_multiplier: f32,
    pub continent: NoiseBand,
    pub mountains: NoiseBand,
    pub detail: NoiseBand,
    pub ridged_power: f32,
    pub domain_warp_octaves: u32,
    pub domain_warp_strength: f32,
    /// Exponent applied to the combined, clamped-to-[0,1] height signal
    /// before scaling — the "erosion shaping factor" from spec §4.2. Values
    /// above 1 carve sharper valleys; values below 1 round off peaks.
    pub erosion_power: f32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        TerrainConfig {
            seed: WORLD_SEED,
            base_radius: 60.0,
            height_multiplier: 4.0,
            continent: NoiseBand::new(0.5, 4, 0.5),
            mountains: NoiseBand::new(1.5, 5, 0.5),
            detail: NoiseBand::new(6.0, 3, 0.45),
            ridged_power: 2.0,
            domain_warp_octaves: 2,
            domain_warp_strength: 0.15,
            erosion_power: 1.2,
        }
    }
}

impl TerrainConfig {
    /// A steeper preset used by scenario tests that need slope-rollover
    /// (spec §8 scenario 4) reachable quickly.
    pub fn steep_preset() -> Self {
        TerrainConfig {
            height_multiplier: 30.0,
            mountains: NoiseBand::new(0.8, 5, 0.6),
            ..TerrainConfig::default()
        }
    }

    /// A flat preset (`height_multiplier = 0`) used by scenario 1.
    pub fn flat_preset() -> Self {
        TerrainConfig {
            height_multiplier: 0.0,
            ..TerrainConfig::default()
        }
    }
}

/// Procedural height field. Holds only the Perlin generators derived from
/// the seed; sampling is otherwise pure. Intentionally `Sync` + cheap to
/// share behind an `Arc` across a room's terrain-collider manager and every
/// unit's per-tick terrain query.
pub struct TerrainField {
    config: TerrainConfig,
    continent_noise: Perlin,
    mountain_noise: Perlin,
    detail_noise: Perlin,
    warp_noise_x: Perlin,
    warp_noise_y: Perlin,
    warp_noise_z: Perlin,
}

impl TerrainField {
    pub fn new(config: TerrainConfig) -> Self {
        TerrainField {
            continent_noise: Perlin::new(config.seed),
            mountain_noise: Perlin::new(config.seed.wrapping_add(1000)),
            detail_noise: Perlin::new(config.seed.wrapping_add(2000)),
            warp_noise_x: Perlin::new(config.seed.wrapping_add(3000)),
            warp_noise_y: Perlin::new(config.seed.wrapping_add(4000)),
            warp_noise_z: Perlin::new(config.seed.wrapping_add(5000)),
            config,
        }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Applies `domain_warp_octaves` rounds of cross-axis warp: each axis is
    /// nudged by noise sampled from the *other two* axes, so the resulting
    /// field has no visible grid alignment.
    pub fn apply_domain_warp(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        let mut wx = x;
        let mut wy = y;
        let mut wz = z;
        let strength = self.config.domain_warp_strength as f64;
        for octave in 0..self.config.domain_warp_octaves {
            let freq = 1.0 + octave as f64 * 0.5;
            let dx = self.warp_noise_x.get([wy * freq, wz * freq]) * strength;
            let dy = self.warp_noise_y.get([wz * freq, wx * freq]) * strength;
            let dz = self.warp_noise_z.get([wx * freq, wy * freq]) * strength;
            wx += dx;
            wy += dy;
            wz += dz;
        }
        (wx, wy, wz)
    }

    /// Samples one octave band at `(x, y, z)` using fractal sum-of-octaves,
    /// then runs the result through `mode`.
    pub fn sample_noise(&self, generator: &Perlin, x: f64, y: f64, z: f64, band: NoiseBand, mode: NoiseMode) -> f32 {
        let (wx, wy, wz) = self.apply_domain_warp(x, y, z);
        let mut amplitude = 1.0f64;
        let mut frequency = band.scale as f64;
        let mut sum = 0.0f64;
        let mut norm = 0.0f64;
        for _ in 0..band.octaves {
            let n = generator.get([wx * frequency, wy * frequency, wz * frequency]);
            sum += n * amplitude;
            norm += amplitude;
            amplitude *= band.persistence as f64;
            frequency *= 2.0;
        }
        let n = if norm > 0.0 { (sum / norm) as f32 } else { 0.0 };
        match mode {
            NoiseMode::Plain => n,
            NoiseMode::Ridged { power } => (1.0 - n.abs()).max(0.0).powf(power),
            NoiseMode::Billow => n.abs() * 2.0 - 1.0,
        }
    }

    /// Combines continent + 0.5*mountains + detail, applies the erosion
    /// shaping factor, and scales by `height_multiplier`.
    pub fn get_height(&self, x: f64, y: f64, z: f64) -> f32 {
        let continent = self.sample_noise(
            &self.continent_noise,
            x,
            y,
            z,
            self.config.continent,
            NoiseMode::Plain,
        );
        let mountains = self.sample_noise(
            &self.mountain_noise,
            x,
            y,
            z,
            self.config.mountains,
            NoiseMode::Ridged {
                power: self.config.ridged_power,
            },
        );
        let detail = self.sample_noise(
            &self.detail_noise,
            x,
            y,
            z,
            self.config.detail,
            NoiseMode::Billow,
        );

        let combined = continent + 0.5 * mountains + detail;
        // Map the roughly [-2, 2] combined signal into [0, 1] before shaping,
        // then back out, so `erosion_power` has a well-defined domain.
        let normalized = ((combined / 2.5) * 0.5 + 0.5).clamp(0.0, 1.0);
        let eroded = normalized.powf(self.config.erosion_power);
        let shaped = (eroded - 0.5) * 2.0 * 2.5;

        shaped * self.config.height_multiplier
    }

    /// `base_radius + get_height(dir)`. `dir` need not be normalized; it is
    /// normalized internally.
    pub fn radius_at(&self, dir: Vec3) -> f32 {
        let d = dir.normalize();
        self.config.base_radius + self.get_height(d.x as f64, d.y as f64, d.z as f64)
    }

    /// World-space point on the surface along `dir`.
    pub fn surface_point(&self, dir: Vec3) -> Vec3 {
        let d = dir.normalize();
        d.scale(self.radius_at(d))
    }

    /// Builds a tangent frame at `normalize(pos)`, samples three neighboring
    /// surface points at [`NORMAL_SAMPLE_EPS`], and returns the normalized
    /// cross of the two surface-space edges.
    pub fn normal_at(&self, pos: Vec3) -> Vec3 {
        let up = pos.normalize();
        let frame = TangentFrame::from_normal(up);

        let center = self.surface_point(up);
        let p_forward = self.surface_point(up + frame.forward.scale(NORMAL_SAMPLE_EPS));
        let p_right = self.surface_point(up + frame.right.scale(NORMAL_SAMPLE_EPS));

        let edge_forward = p_forward - center;
        let edge_right = p_right - center;
        let normal = edge_right.cross(edge_forward).normalize();

        // Guard against degenerate cross products right at the poles, where
        // `frame.forward` itself already used the fallback axis: if the
        // computed normal isn't roughly aligned with `up`, prefer `up`.
        if normal.dot(up) < 0.0 {
            return up;
        }
        normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_preset_height_is_zero_everywhere() {
        let field = TerrainField::new(TerrainConfig::flat_preset());
        for dir in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 1.0, 1.0)] {
            let d = dir.normalize();
            assert_eq!(field.get_height(d.x as f64, d.y as f64, d.z as f64), 0.0);
            assert_eq!(field.radius_at(dir), field.config().base_radius);
        }
    }

    #[test]
    fn height_is_bit_stable_across_invocations() {
        let field = TerrainField::new(TerrainConfig::default());
        let dir = Vec3::new(0.3, 0.8, -0.2);
        let a = field.get_height(dir.x as f64, dir.y as f64, dir.z as f64);
        let b = field.get_height(dir.x as f64, dir.y as f64, dir.z as f64);
        assert_eq!(a, b);
    }

    #[test]
    fn radius_at_is_finite_near_poles() {
        let field = TerrainField::new(TerrainConfig::default());
        let r = field.radius_at(Vec3::Y);
        assert!(r.is_finite());
        let n = field.normal_at(Vec3::Y.scale(field.config().base_radius));
        assert!(n.is_finite());
        assert!(n.dot(Vec3::Y) > 0.0);
    }

    #[test]
    fn normal_at_points_outward() {
        let field = TerrainField::new(TerrainConfig::default());
        for dir in [
            Vec3::X,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.2, -0.5, 0.8),
        ] {
            let d = dir.normalize();
            let pos = field.surface_point(d);
            let n = field.normal_at(pos);
            assert!(n.dot(d) > 0.0, "normal should face outward for {:?}", d);
        }
    }
}
