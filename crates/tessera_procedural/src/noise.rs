//! # Simplex Noise Implementation
//!
//! Deterministic noise for terrain classification.
//!
//! ## Determinism Guarantee
//!
//! Given the same `WorldSeed`, this implementation produces exactly the same
//! values on any platform, in any call order. There is no hidden mutable
//! state: the permutation table is built once from the seed and only read.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// World seed for deterministic generation.
///
/// All procedural generation derives from this seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldSeed(u64);

impl WorldSeed {
    /// Creates a new world seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Returns the raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives a sub-seed for a specific purpose (e.g., structure placement).
    ///
    /// Uses a hash function to create independent streams from one seed.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        let mut hash = self.0;
        hash ^= purpose;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }
}

impl Default for WorldSeed {
    fn default() -> Self {
        Self(42)
    }
}

/// Pre-computed permutation table for noise.
struct PermutationTable {
    /// 512-entry permutation table (256 entries, doubled for overflow handling).
    perm: [u8; 512],
}

impl PermutationTable {
    /// 12 gradient vectors for 2D simplex.
    const GRADIENTS: [[i8; 2]; 12] = [
        [1, 0], [1, 1], [0, 1], [-1, 1],
        [-1, 0], [-1, -1], [0, -1], [1, -1],
        [1, 0], [0, 1], [-1, 0], [0, -1],
    ];

    /// Seed purpose for the Fisher-Yates shuffle.
    const SHUFFLE_STREAM: u64 = 0x7e55_e7a5;

    /// Creates a new permutation table from a seed.
    fn new(seed: WorldSeed) -> Self {
        let mut perm = [0u8; 512];

        for (i, slot) in perm.iter_mut().take(256).enumerate() {
            *slot = i as u8;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed.derive(Self::SHUFFLE_STREAM).value());
        for i in (1..256).rev() {
            let j = rng.gen_range(0..=i);
            perm.swap(i, j);
        }

        for i in 0..256 {
            perm[256 + i] = perm[i];
        }

        Self { perm }
    }

    #[inline]
    fn get(&self, index: usize) -> u8 {
        self.perm[index & 511]
    }

    #[inline]
    fn gradient(hash: u8) -> [i8; 2] {
        Self::GRADIENTS[(hash % 12) as usize]
    }
}

/// 2D Simplex noise generator.
///
/// Produces smooth, continuous noise values in the range [-1, 1].
pub struct SimplexNoise {
    perm_table: PermutationTable,
}

impl SimplexNoise {
    /// Skewing factor for 2D simplex grid, (sqrt(3) - 1) / 2.
    const F2: f64 = 0.366_025_403_784_439;
    /// Unskewing factor for 2D simplex grid, (3 - sqrt(3)) / 6.
    const G2: f64 = 0.211_324_865_405_187;

    /// Creates a new simplex noise generator from a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            perm_table: PermutationTable::new(seed),
        }
    }

    /// Samples 2D simplex noise at the given coordinates.
    ///
    /// # Returns
    ///
    /// A value in the range [-1, 1].
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let skew = (x + y) * Self::F2;
        let i = fast_floor(x + skew);
        let j = fast_floor(y + skew);

        let unskew = f64::from(i.wrapping_add(j)) * Self::G2;
        let x0 = x - (f64::from(i) - unskew);
        let y0 = y - (f64::from(j) - unskew);

        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - f64::from(i1) + Self::G2;
        let y1 = y0 - f64::from(j1) + Self::G2;
        let x2 = x0 - 1.0 + 2.0 * Self::G2;
        let y2 = y0 - 1.0 + 2.0 * Self::G2;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let (i1, j1) = (i1 as usize, j1 as usize);

        let gi0 = self.perm_table.get(ii + self.perm_table.get(jj) as usize);
        let gi1 = self.perm_table.get(ii + i1 + self.perm_table.get(jj + j1) as usize);
        let gi2 = self.perm_table.get(ii + 1 + self.perm_table.get(jj + 1) as usize);

        let n0 = Self::contribution(x0, y0, gi0);
        let n1 = Self::contribution(x1, y1, gi1);
        let n2 = Self::contribution(x2, y2, gi2);

        // 70.0 normalizes the sum to [-1, 1]
        (70.0 * (n0 + n1 + n2)).clamp(-1.0, 1.0)
    }

    #[inline]
    fn contribution(x: f64, y: f64, gradient_index: u8) -> f64 {
        let t = 0.5 - x * x - y * y;
        if t < 0.0 {
            0.0
        } else {
            let grad = PermutationTable::gradient(gradient_index);
            let t2 = t * t;
            t2 * t2 * (x * f64::from(grad[0]) + y * f64::from(grad[1]))
        }
    }

    /// Generates octaved (fractal) noise.
    ///
    /// # Arguments
    ///
    /// * `x`, `y` - Coordinates
    /// * `octaves` - Number of noise layers (at least 1 is always sampled)
    /// * `persistence` - Amplitude decay per octave (typically 0.5)
    /// * `lacunarity` - Frequency increase per octave (typically 2.0)
    ///
    /// # Returns
    ///
    /// A value in the range [-1, 1].
    #[must_use]
    pub fn octaved(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_amplitude = 0.0;

        for _ in 0..octaves.max(1) {
            total += self.sample(x * frequency, y * frequency) * amplitude;
            max_amplitude += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        total / max_amplitude
    }
}

/// Largest value the unit-interval mapping may return.
const UNIT_MAX: f64 = 1.0 - f64::EPSILON;

/// Sampling parameters for a [`NoiseField`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    /// Cells per noise period; larger means smoother terrain.
    pub scale: f64,
    /// Shift applied to both axes before scaling.
    pub offset: f64,
    /// Number of fractal octaves.
    pub octaves: u32,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            scale: 10.0,
            offset: 0.0,
            octaves: 1,
        }
    }
}

/// Seeded scalar field over integer world cells with values in [0, 1).
///
/// ```rust,ignore
/// let field = NoiseField::new(WorldSeed::new(42), NoiseSettings::default());
/// let v = field.sample(16, -3);
/// assert!((0.0..1.0).contains(&v));
/// ```
pub struct NoiseField {
    noise: SimplexNoise,
    settings: NoiseSettings,
}

impl NoiseField {
    /// Fractal amplitude decay per octave.
    const PERSISTENCE: f64 = 0.5;
    /// Fractal frequency growth per octave.
    const LACUNARITY: f64 = 2.0;

    /// Creates a field for `seed` with the given sampling parameters.
    #[must_use]
    pub fn new(seed: WorldSeed, settings: NoiseSettings) -> Self {
        Self {
            noise: SimplexNoise::new(seed),
            settings,
        }
    }

    /// Returns the sampling parameters.
    #[must_use]
    pub const fn settings(&self) -> &NoiseSettings {
        &self.settings
    }

    /// Samples the field at a world cell using the configured scale.
    #[inline]
    #[must_use]
    pub fn sample(&self, world_x: i32, world_y: i32) -> f64 {
        self.sample_scaled(world_x, world_y, self.settings.scale)
    }

    /// Samples the field at a world cell with an explicit scale.
    #[must_use]
    pub fn sample_scaled(&self, world_x: i32, world_y: i32, scale: f64) -> f64 {
        let x = (f64::from(world_x) + self.settings.offset) / scale;
        let y = (f64::from(world_y) + self.settings.offset) / scale;
        let raw = self
            .noise
            .octaved(x, y, self.settings.octaves, Self::PERSISTENCE, Self::LACUNARITY);
        ((raw + 1.0) * 0.5).clamp(0.0, UNIT_MAX)
    }
}

/// One-shot sample of the field for `seed` at a world cell.
///
/// Builds the permutation table on every call; hold a [`NoiseField`] when
/// sampling more than a handful of cells.
#[must_use]
pub fn sample(seed: WorldSeed, world_x: i32, world_y: i32, scale: f64) -> f64 {
    NoiseField::new(seed, NoiseSettings::default()).sample_scaled(world_x, world_y, scale)
}

/// Fast floor function.
#[inline]
fn fast_floor(x: f64) -> i32 {
    let xi = x as i32;
    if x < f64::from(xi) { xi - 1 } else { xi }
}
