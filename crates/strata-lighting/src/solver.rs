//! Dual-queue flood fill for a single light channel.
//!
//! A [`LightSolver`] keeps two FIFO queues of work items. Removals erode light
//! outward from cleared cells; any neighbour that turns out to be lit by a
//! different source is handed to the spread queue so it refills the erased
//! area once erosion finishes. Spreads decay by exactly 1 per step and only
//! enter light-passing voxels. Neighbour lookups go through the
//! [`ChunkMatrix`], so propagation crosses chunk borders transparently; cells
//! in absent chunks or outside the world height behave as opaque.

use std::collections::VecDeque;

use strata_voxel::{BlockRegistry, ChunkMatrix, LightChannel, MODIFIED, UNSAVED};

/// Flags set on every chunk whose light map is written: it needs re-meshing
/// and its stored light map is stale.
const LIGHT_CHANGED: u8 = MODIFIED | UNSAVED;

/// The six axis-aligned neighbour offsets.
pub(crate) const NEIGHBORS_6: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// A lit cell whose light still has to reach its neighbours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpreadJob {
    pub pos: [i32; 3],
    pub light: u8,
}

/// A cleared cell whose former light still has to be erased from its neighbours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovalJob {
    pub pos: [i32; 3],
    pub prior_light: u8,
}

/// Flood-fill state for one channel.
#[derive(Debug)]
pub struct LightSolver {
    channel: LightChannel,
    spread: VecDeque<SpreadJob>,
    removal: VecDeque<RemovalJob>,
}

impl LightSolver {
    pub fn new(channel: LightChannel) -> Self {
        Self {
            channel,
            spread: VecDeque::new(),
            removal: VecDeque::new(),
        }
    }

    pub fn channel(&self) -> LightChannel {
        self.channel
    }

    /// Returns `true` when both queues are empty.
    pub fn is_idle(&self) -> bool {
        self.spread.is_empty() && self.removal.is_empty()
    }

    /// Number of queued jobs (spread, removal).
    pub fn pending(&self) -> (usize, usize) {
        (self.spread.len(), self.removal.len())
    }

    /// Sets the cell to `value` and queues it for spreading.
    ///
    /// Values of 0 and 1 cannot spread and are ignored, as are cells that are
    /// not resident.
    pub fn add(&mut self, matrix: &mut ChunkMatrix, x: i32, y: i32, z: i32, value: u8) {
        if value <= 1 {
            return;
        }
        let Some((chunk, lx, ly, lz)) = matrix.chunk_by_voxel_mut(x, y, z) else {
            return;
        };
        chunk.lightmap.set(lx, ly, lz, self.channel, value);
        chunk.set_flags(LIGHT_CHANGED);
        self.spread.push_back(SpreadJob {
            pos: [x, y, z],
            light: value,
        });
    }

    /// Queues the cell's current value for spreading.
    pub fn add_current(&mut self, matrix: &mut ChunkMatrix, x: i32, y: i32, z: i32) {
        if let Some(value) = matrix.get_light(x, y, z, self.channel) {
            self.add(matrix, x, y, z, value);
        }
    }

    /// Clears the cell and queues its former value for erosion.
    pub fn remove(&mut self, matrix: &mut ChunkMatrix, x: i32, y: i32, z: i32) {
        let Some((chunk, lx, ly, lz)) = matrix.chunk_by_voxel_mut(x, y, z) else {
            return;
        };
        let prior_light = chunk.lightmap.get(lx, ly, lz, self.channel);
        if prior_light == 0 {
            return;
        }
        chunk.lightmap.set(lx, ly, lz, self.channel, 0);
        chunk.set_flags(LIGHT_CHANGED);
        self.removal.push_back(RemovalJob {
            pos: [x, y, z],
            prior_light,
        });
    }

    /// Drains the removal queue, then the spread queue.
    ///
    /// Returns the number of cells written. Calling `solve` on an idle solver
    /// writes nothing.
    pub fn solve(&mut self, matrix: &mut ChunkMatrix, registry: &BlockRegistry) -> usize {
        let channel = self.channel;
        let mut written = 0;

        while let Some(job) = self.removal.pop_front() {
            let [x, y, z] = job.pos;
            for (dx, dy, dz) in NEIGHBORS_6 {
                let (nx, ny, nz) = (x + dx, y + dy, z + dz);
                let Some((chunk, lx, ly, lz)) = matrix.chunk_by_voxel_mut(nx, ny, nz) else {
                    continue;
                };
                let light = chunk.lightmap.get(lx, ly, lz, channel);
                if light != 0 && light == job.prior_light - 1 {
                    chunk.lightmap.set(lx, ly, lz, channel, 0);
                    chunk.set_flags(LIGHT_CHANGED);
                    written += 1;
                    self.removal.push_back(RemovalJob {
                        pos: [nx, ny, nz],
                        prior_light: light,
                    });

                    let emission = registry.emission(chunk.get(lx, ly, lz).id, channel.index());
                    if emission > 1 {
                        chunk.lightmap.set(lx, ly, lz, channel, emission);
                        written += 1;
                        self.spread.push_back(SpreadJob {
                            pos: [nx, ny, nz],
                            light: emission,
                        });
                    }
                } else if light >= job.prior_light {
                    self.spread.push_back(SpreadJob {
                        pos: [nx, ny, nz],
                        light,
                    });
                }
            }
        }

        while let Some(job) = self.spread.pop_front() {
            if job.light <= 1 {
                continue;
            }
            let [x, y, z] = job.pos;
            for (dx, dy, dz) in NEIGHBORS_6 {
                let (nx, ny, nz) = (x + dx, y + dy, z + dz);
                let Some((chunk, lx, ly, lz)) = matrix.chunk_by_voxel_mut(nx, ny, nz) else {
                    continue;
                };
                if !registry.is_light_passing(chunk.get(lx, ly, lz).id) {
                    continue;
                }
                let light = chunk.lightmap.get(lx, ly, lz, channel);
                if light + 2 <= job.light {
                    chunk.lightmap.set(lx, ly, lz, channel, job.light - 1);
                    chunk.set_flags(LIGHT_CHANGED);
                    written += 1;
                    self.spread.push_back(SpreadJob {
                        pos: [nx, ny, nz],
                        light: job.light - 1,
                    });
                }
            }
        }

        written
    }

    /// Drops all queued work without touching the light field.
    pub fn clear(&mut self) {
        self.spread.clear();
        self.removal.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use strata_voxel::{BlockDef, Chunk, IgnoreEvictions};

    fn open_matrix() -> ChunkMatrix {
        let mut matrix = ChunkMatrix::new(3, 3, -1, -1);
        for cz in -1..=1 {
            for cx in -1..=1 {
                matrix.put_chunk(Box::new(Chunk::new(cx, cz)));
            }
        }
        matrix
    }

    fn red(matrix: &ChunkMatrix, x: i32, y: i32, z: i32) -> u8 {
        matrix.get_light(x, y, z, LightChannel::Red).unwrap_or(0)
    }

    #[test]
    fn test_add_ignores_weak_values() {
        let registry = BlockRegistry::new();
        let mut matrix = open_matrix();
        let mut solver = LightSolver::new(LightChannel::Red);
        solver.add(&mut matrix, 0, 10, 0, 1);
        assert!(solver.is_idle());
        assert_eq!(solver.solve(&mut matrix, &registry), 0);
        assert_eq!(red(&matrix, 0, 10, 0), 0);
    }

    #[test]
    fn test_spread_decays_by_one() {
        let registry = BlockRegistry::new();
        let mut matrix = open_matrix();
        let mut solver = LightSolver::new(LightChannel::Red);
        solver.add(&mut matrix, 0, 64, 0, 15);
        solver.solve(&mut matrix, &registry);

        assert_eq!(red(&matrix, 0, 64, 0), 15);
        assert_eq!(red(&matrix, 1, 64, 0), 14);
        assert_eq!(red(&matrix, -1, 64, 0), 14);
        assert_eq!(red(&matrix, 0, 60, 0), 11);
        assert_eq!(red(&matrix, 3, 64, 4), 8);
        assert_eq!(red(&matrix, 14, 64, 0), 1);
        assert_eq!(red(&matrix, 15, 64, 0), 0);
        assert!(solver.is_idle());
    }

    #[test]
    fn test_solve_twice_is_noop() {
        let registry = BlockRegistry::new();
        let mut matrix = open_matrix();
        let mut solver = LightSolver::new(LightChannel::Green);
        solver.add(&mut matrix, 5, 30, 5, 12);
        assert!(solver.solve(&mut matrix, &registry) > 0);
        assert_eq!(solver.solve(&mut matrix, &registry), 0);
    }

    #[test]
    fn test_opaque_and_absent_cells_block() {
        let mut registry = BlockRegistry::new();
        let stone = registry.register(BlockDef::solid("base:stone")).unwrap();
        let mut matrix = ChunkMatrix::new(2, 1, 0, 0);
        matrix.put_chunk(Box::new(Chunk::new(0, 0)));
        for y in 0..256 {
            for z in 0..16 {
                matrix.set_voxel(4, y, z, stone, 0);
            }
        }

        let mut solver = LightSolver::new(LightChannel::Red);
        solver.add(&mut matrix, 2, 64, 8, 15);
        solver.solve(&mut matrix, &registry);
        assert_eq!(red(&matrix, 3, 64, 8), 14);
        assert_eq!(red(&matrix, 4, 64, 8), 0);
        assert_eq!(red(&matrix, 5, 64, 8), 0);
        // Chunk (1, 0) is not resident.
        assert!(matrix.get_light(16, 64, 8, LightChannel::Red).is_none());
    }

    #[test]
    fn test_remove_single_source_leaves_no_light() {
        let registry = BlockRegistry::new();
        let mut matrix = open_matrix();
        let mut solver = LightSolver::new(LightChannel::Blue);
        solver.add(&mut matrix, 3, 100, -2, 15);
        solver.solve(&mut matrix, &registry);
        assert_eq!(
            matrix.get_light(10, 100, -2, LightChannel::Blue),
            Some(8)
        );

        solver.remove(&mut matrix, 3, 100, -2);
        solver.solve(&mut matrix, &registry);
        for chunk in matrix.iter() {
            for y in 85..=115 {
                for z in 0..16 {
                    for x in 0..16 {
                        assert_eq!(chunk.lightmap.get(x, y, z, LightChannel::Blue), 0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_remove_refills_from_surviving_source() {
        let registry = BlockRegistry::new();
        let mut matrix = open_matrix();
        let mut solver = LightSolver::new(LightChannel::Red);
        solver.add(&mut matrix, 0, 64, 0, 15);
        solver.add(&mut matrix, 6, 64, 0, 10);
        solver.solve(&mut matrix, &registry);
        assert_eq!(red(&matrix, 6, 64, 0), 10);

        solver.remove(&mut matrix, 0, 64, 0);
        solver.solve(&mut matrix, &registry);
        assert_eq!(red(&matrix, 0, 64, 0), 4);
        assert_eq!(red(&matrix, 6, 64, 0), 10);
        assert_eq!(red(&matrix, 3, 64, 0), 7);
        assert_eq!(red(&matrix, -3, 64, 0), 1);
        assert_eq!(red(&matrix, -4, 64, 0), 0);
    }

    #[test]
    fn test_removal_reseeds_emitters() {
        let mut registry = BlockRegistry::new();
        let lamp = registry
            .register(BlockDef::transparent("base:lamp").with_emission(6, 0, 0))
            .unwrap();
        let mut matrix = open_matrix();
        matrix.set_voxel(1, 64, 0, lamp, 0);

        let mut solver = LightSolver::new(LightChannel::Red);
        solver.add(&mut matrix, 0, 64, 0, 15);
        solver.solve(&mut matrix, &registry);
        assert_eq!(red(&matrix, 1, 64, 0), 14);

        solver.remove(&mut matrix, 0, 64, 0);
        solver.solve(&mut matrix, &registry);
        assert_eq!(red(&matrix, 1, 64, 0), 6);
        assert_eq!(red(&matrix, 0, 64, 0), 5);
        assert_eq!(red(&matrix, 5, 64, 0), 2);
    }

    #[test]
    fn test_every_written_chunk_is_flagged() {
        let registry = BlockRegistry::new();
        let mut matrix = open_matrix();
        let mut solver = LightSolver::new(LightChannel::Red);
        solver.add(&mut matrix, 14, 64, 8, 15);
        solver.solve(&mut matrix, &registry);
        assert_eq!(red(&matrix, 16, 64, 8), 13);
        for chunk in matrix.iter_mut() {
            chunk.clear_flags(LIGHT_CHANGED);
        }

        // Clearing the source alone flags its chunk.
        solver.remove(&mut matrix, 14, 64, 8);
        assert!(matrix.get_chunk(0, 0).unwrap().has_flags(LIGHT_CHANGED));
        assert!(!matrix.get_chunk(1, 0).unwrap().has_flags(LIGHT_CHANGED));

        // Erosion reaches the east neighbour, which only held spread light.
        solver.solve(&mut matrix, &registry);
        assert_eq!(red(&matrix, 16, 64, 8), 0);
        assert!(matrix.get_chunk(1, 0).unwrap().has_flags(LIGHT_CHANGED));
        // Light never reached the far corner.
        assert!(!matrix.get_chunk(-1, -1).unwrap().has_flags(LIGHT_CHANGED));
    }

    #[test]
    fn test_light_crosses_chunk_border_after_translate() {
        let registry = BlockRegistry::new();
        let mut matrix = open_matrix();
        matrix.translate(1, 0, &mut IgnoreEvictions);
        let mut solver = LightSolver::new(LightChannel::Sky);
        solver.add(&mut matrix, 15, 200, 3, 15);
        solver.solve(&mut matrix, &registry);
        assert_eq!(matrix.get_light(16, 200, 3, LightChannel::Sky), Some(14));
        assert_eq!(matrix.get_light(28, 200, 3, LightChannel::Sky), Some(2));
    }
}
