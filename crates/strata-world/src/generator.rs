//! Terrain generators: fill a chunk's raw voxel array from its coordinates
//! and the world seed.
//!
//! Generators run on the main thread or on the generation pool, so they must
//! be `Send + Sync` and deterministic for a given `(cx, cz, seed)`.

use noise::{NoiseFn, Simplex};
use strata_voxel::{BlockId, CHUNK_D, CHUNK_H, CHUNK_W, Voxel, voxel_index};

/// Fills a freshly allocated, all-air chunk.
pub trait TerrainGenerator: Send + Sync {
    fn generate(&self, voxels: &mut [Voxel], cx: i32, cz: i32, seed: u64);
}

/// Horizontal layers stacked from y = 0 upward; air above.
#[derive(Clone, Debug)]
pub struct FlatGenerator {
    layers: Vec<(BlockId, usize)>,
}

impl FlatGenerator {
    /// `layers` is a list of `(block, thickness)` pairs, bottom first.
    pub fn new(layers: Vec<(BlockId, usize)>) -> Self {
        Self { layers }
    }

    /// Total thickness of all layers, clamped to the world height.
    pub fn surface(&self) -> usize {
        self.layers
            .iter()
            .map(|&(_, n)| n)
            .sum::<usize>()
            .min(CHUNK_H)
    }
}

impl TerrainGenerator for FlatGenerator {
    fn generate(&self, voxels: &mut [Voxel], _cx: i32, _cz: i32, _seed: u64) {
        let mut y = 0;
        for &(block, thickness) in &self.layers {
            for _ in 0..thickness {
                if y >= CHUNK_H {
                    return;
                }
                let start = voxel_index(0, y, 0);
                voxels[start..start + CHUNK_W * CHUNK_D].fill(Voxel::new(block, 0));
                y += 1;
            }
        }
    }
}

/// Block ids used by [`NoiseGenerator`].
#[derive(Clone, Copy, Debug)]
pub struct TerrainPalette {
    pub stone: BlockId,
    pub dirt: BlockId,
    pub grass: BlockId,
    pub bedrock: BlockId,
}

/// Parameters of the fBm heightmap.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    /// Number of octaves composited per sample.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Frequency of the lowest octave, in cycles per voxel.
    pub base_frequency: f64,
    /// Amplitude of the lowest octave, in voxels.
    pub amplitude: f64,
    /// Mean surface height.
    pub base_height: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 0.01,
            amplitude: 24.0,
            base_height: 64.0,
        }
    }
}

/// Rolling terrain from multi-octave simplex noise: bedrock floor, stone,
/// a few layers of dirt and a grass top.
#[derive(Clone, Debug)]
pub struct NoiseGenerator {
    palette: TerrainPalette,
    params: HeightmapParams,
}

impl NoiseGenerator {
    pub fn new(palette: TerrainPalette, params: HeightmapParams) -> Self {
        Self { palette, params }
    }

    /// Surface height of world column `(x, z)`.
    pub fn surface_height(&self, noise: &Simplex, x: f64, z: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            total += noise.get([x * frequency, z * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        (self.params.base_height + total).clamp(1.0, (CHUNK_H - 1) as f64)
    }
}

impl TerrainGenerator for NoiseGenerator {
    fn generate(&self, voxels: &mut [Voxel], cx: i32, cz: i32, seed: u64) {
        let noise = Simplex::new(seed as u32);
        let p = self.palette;
        for lz in 0..CHUNK_D {
            for lx in 0..CHUNK_W {
                let wx = (cx * CHUNK_W as i32 + lx as i32) as f64;
                let wz = (cz * CHUNK_D as i32 + lz as i32) as f64;
                let surface = self.surface_height(&noise, wx, wz) as usize;
                for y in 0..=surface {
                    let id = if y == 0 {
                        p.bedrock
                    } else if y == surface {
                        p.grass
                    } else if y + 4 > surface {
                        p.dirt
                    } else {
                        p.stone
                    };
                    voxels[voxel_index(lx, y, lz)] = Voxel::new(id, 0);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
