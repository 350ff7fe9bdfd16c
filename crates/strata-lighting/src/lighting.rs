//! World lighting: one [`LightSolver`] per channel plus the passes that seed
//! them when chunks appear and when blocks change.
//!
//! Chunks are lit in two steps. [`prebuild_sky_light`] runs as soon as a chunk
//! has voxels and fills straight-down sky columns; it needs no neighbours.
//! Once the chunk and its eight neighbours are resident,
//! [`Lighting::build_sky_light`] and [`Lighting::on_chunk_loaded`] spread
//! light sideways, including across the borders to and from the neighbours.

use strata_voxel::{
    BlockId, BlockRegistry, CHUNK_D, CHUNK_H, CHUNK_W, Chunk, ChunkMatrix, LightChannel, MAX_LIGHT,
};

use crate::solver::{LightSolver, NEIGHBORS_6};

/// Fills each column with full sky light from the top down to the first
/// voxel that blocks sky light, and records that height as the chunk's
/// highest point.
pub fn prebuild_sky_light(chunk: &mut Chunk, registry: &BlockRegistry) {
    let mut highest = 0;
    for z in 0..CHUNK_D {
        for x in 0..CHUNK_W {
            for y in (0..CHUNK_H).rev() {
                if !registry.is_sky_light_passing(chunk.get(x, y, z).id) {
                    highest = highest.max(y as i32);
                    break;
                }
                chunk.lightmap.set(x, y, z, LightChannel::Sky, MAX_LIGHT);
            }
        }
    }
    chunk.set_highest_point(highest);
}

/// The four channel solvers.
#[derive(Debug)]
pub struct Lighting {
    solvers: [LightSolver; 4],
}

impl Lighting {
    pub fn new() -> Self {
        Self {
            solvers: LightChannel::ALL.map(LightSolver::new),
        }
    }

    pub fn solver(&self, channel: LightChannel) -> &LightSolver {
        &self.solvers[channel.index()]
    }

    pub fn solver_mut(&mut self, channel: LightChannel) -> &mut LightSolver {
        &mut self.solvers[channel.index()]
    }

    /// Returns `true` when no channel has queued work.
    pub fn is_idle(&self) -> bool {
        self.solvers.iter().all(LightSolver::is_idle)
    }

    /// Solves every channel. Returns the total number of cells written.
    pub fn solve_all(&mut self, matrix: &mut ChunkMatrix, registry: &BlockRegistry) -> usize {
        self.solvers
            .iter_mut()
            .map(|solver| solver.solve(matrix, registry))
            .sum()
    }

    fn add_current_all(&mut self, matrix: &mut ChunkMatrix, x: i32, y: i32, z: i32) {
        for solver in &mut self.solvers {
            solver.add_current(matrix, x, y, z);
        }
    }

    /// Spreads the pre-pass sky columns of chunk `(cx, cz)` sideways into
    /// overhangs and caves.
    pub fn build_sky_light(
        &mut self,
        matrix: &mut ChunkMatrix,
        registry: &BlockRegistry,
        cx: i32,
        cz: i32,
    ) {
        let Some(chunk) = matrix.get_chunk(cx, cz) else {
            return;
        };
        let top = (chunk.highest_point() + 1).min(CHUNK_H as i32 - 1);
        let (ox, oz) = (cx * CHUNK_W as i32, cz * CHUNK_D as i32);
        let (w, d) = (CHUNK_W as i32, CHUNK_D as i32);

        // Full-sky cells below the chunk's top, including the ring of
        // neighbour cells facing it, feed light sideways under overhangs.
        let mut seeds = Vec::new();
        for z in -1..=d {
            for x in -1..=w {
                let corner = (x == -1 || x == w) && (z == -1 || z == d);
                if corner {
                    continue;
                }
                for y in 0..=top {
                    if matrix.get_light(ox + x, y, oz + z, LightChannel::Sky) == Some(MAX_LIGHT) {
                        seeds.push((ox + x, y, oz + z));
                    }
                }
            }
        }

        let sky = &mut self.solvers[LightChannel::Sky.index()];
        for (x, y, z) in seeds {
            sky.add(matrix, x, y, z, MAX_LIGHT);
        }
        sky.solve(matrix, registry);
    }

    /// Seeds the emitters of chunk `(cx, cz)` (when `seed_emission` is set),
    /// its border cells and the facing border cells of its edge neighbours,
    /// then solves every channel.
    pub fn on_chunk_loaded(
        &mut self,
        matrix: &mut ChunkMatrix,
        registry: &BlockRegistry,
        cx: i32,
        cz: i32,
        seed_emission: bool,
    ) {
        let Some(chunk) = matrix.get_chunk(cx, cz) else {
            return;
        };
        let (ox, oz) = (cx * CHUNK_W as i32, cz * CHUNK_D as i32);

        let mut emitters = Vec::new();
        if seed_emission {
            for (index, voxel) in chunk.voxels().iter().enumerate() {
                let def = registry.get(voxel.id);
                if def.is_emissive() {
                    let x = (index % CHUNK_W) as i32;
                    let z = ((index / CHUNK_W) % CHUNK_D) as i32;
                    let y = (index / (CHUNK_W * CHUNK_D)) as i32;
                    emitters.push((ox + x, y, oz + z, def.emission));
                }
            }
        }
        for (x, y, z, emission) in emitters {
            for (channel, value) in emission.into_iter().enumerate() {
                self.solvers[channel].add(matrix, x, y, z, value);
            }
        }

        let (w, d) = (CHUNK_W as i32, CHUNK_D as i32);
        for y in 0..CHUNK_H as i32 {
            for z in -1..=d {
                for x in -1..=w {
                    let inner_edge = x == 0 || x == w - 1 || z == 0 || z == d - 1;
                    let outer_ring = x == -1 || x == w || z == -1 || z == d;
                    let corner = (x == -1 || x == w) && (z == -1 || z == d);
                    if (inner_edge || outer_ring) && !corner {
                        self.add_current_all(matrix, ox + x, y, oz + z);
                    }
                }
            }
        }

        let written = self.solve_all(matrix, registry);
        tracing::trace!("chunk ({cx}, {cz}) light pass wrote {written} cells");
    }

    /// Re-synchronizes light around world voxel `(x, y, z)` after its block
    /// became `id`. Every channel is solved before returning.
    pub fn on_block_set(
        &mut self,
        matrix: &mut ChunkMatrix,
        registry: &BlockRegistry,
        x: i32,
        y: i32,
        z: i32,
        id: BlockId,
    ) {
        let def = registry.get(id);
        for channel in [LightChannel::Red, LightChannel::Green, LightChannel::Blue] {
            self.solvers[channel.index()].remove(matrix, x, y, z);
        }

        let sky = LightChannel::Sky.index();
        if !def.light_passing {
            self.solvers[sky].remove(matrix, x, y, z);
        }
        if !def.sky_light_passing {
            if let Some((chunk, _, ly, _)) = matrix.chunk_by_voxel_mut(x, y, z) {
                chunk.raise_highest_point(ly as i32);
            }
            self.solvers[sky].remove(matrix, x, y, z);
            // The column below only carried sky light passing through.
            let mut below = y - 1;
            while let Some(voxel) = matrix.get_voxel(x, below, z) {
                if !registry.is_sky_light_passing(voxel.id) {
                    break;
                }
                self.solvers[sky].remove(matrix, x, below, z);
                below -= 1;
            }
        }
        self.solve_all(matrix, registry);

        if def.light_passing {
            for (dx, dy, dz) in NEIGHBORS_6 {
                self.add_current_all(matrix, x + dx, y + dy, z + dz);
            }
            let open_sky = y + 1 >= CHUNK_H as i32
                || matrix.get_light(x, y + 1, z, LightChannel::Sky) == Some(MAX_LIGHT);
            if def.sky_light_passing && open_sky {
                let mut below = y;
                while let Some(voxel) = matrix.get_voxel(x, below, z) {
                    if !registry.is_sky_light_passing(voxel.id) {
                        break;
                    }
                    self.solvers[sky].add(matrix, x, below, z, MAX_LIGHT);
                    below -= 1;
                }
            }
        }

        if def.is_emissive() {
            let emission = def.emission;
            for (channel, value) in emission.into_iter().enumerate() {
                self.solvers[channel].add(matrix, x, y, z, value);
            }
        }

        self.solve_all(matrix, registry);
    }
}

impl Default for Lighting {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
