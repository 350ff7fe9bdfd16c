//! Fixed-size voxel chunks with an embedded light map and lifecycle flags.
//!
//! A chunk spans `CHUNK_W × CHUNK_H × CHUNK_D` voxels. Only x and z are
//! chunked; every chunk covers the full world height.

use crate::lightmap::LightMap;
use crate::registry::{AIR, BlockId, BlockRegistry};

/// Chunk width (x) in voxels.
pub const CHUNK_W: usize = 16;
/// Chunk height (y) in voxels; also the world height.
pub const CHUNK_H: usize = 256;
/// Chunk depth (z) in voxels.
pub const CHUNK_D: usize = 16;
/// Number of voxels in a chunk.
pub const CHUNK_VOL: usize = CHUNK_W * CHUNK_H * CHUNK_D;
/// Length of a serialized voxel buffer (ids plane + states plane).
pub const CHUNK_DATA_LEN: usize = CHUNK_VOL * 2;

/// Flag: voxel data came from disk or the generator.
pub const LOADED: u8 = 0b0000_0001;
/// Flag: light data came from disk.
pub const LOADED_LIGHTS: u8 = 0b0000_0010;
/// Flag: full lighting pass complete, chunk is mesh-ready.
pub const LIGHTED: u8 = 0b0000_0100;
/// Flag: chunk needs re-meshing.
pub const MODIFIED: u8 = 0b0000_1000;
/// Flag: chunk changed since it was last written.
pub const UNSAVED: u8 = 0b0001_0000;

/// Converts `(x, y, z)` local coordinates to a linear index (x varies fastest, then z).
#[inline]
pub fn voxel_index(x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < CHUNK_W && y < CHUNK_H && z < CHUNK_D);
    (y * CHUNK_D + z) * CHUNK_W + x
}

/// A single voxel cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Voxel {
    /// Block id, resolved through the [`BlockRegistry`].
    pub id: BlockId,
    /// Auxiliary state bits (rotation and the like).
    pub states: u8,
}

impl Voxel {
    pub const AIR: Voxel = Voxel { id: AIR, states: 0 };

    pub fn new(id: BlockId, states: u8) -> Self {
        Self { id, states }
    }
}

/// A column of voxels with its light map.
#[derive(Clone, Debug)]
pub struct Chunk {
    cx: i32,
    cz: i32,
    voxels: Box<[Voxel]>,
    pub lightmap: LightMap,
    flags: u8,
    highest_point: i32,
}

impl Chunk {
    /// Creates an all-air, dark, unloaded chunk at chunk coordinates `(cx, cz)`.
    pub fn new(cx: i32, cz: i32) -> Self {
        Self {
            cx,
            cz,
            voxels: vec![Voxel::AIR; CHUNK_VOL].into_boxed_slice(),
            lightmap: LightMap::new(),
            flags: 0,
            highest_point: 0,
        }
    }

    pub fn cx(&self) -> i32 {
        self.cx
    }

    pub fn cz(&self) -> i32 {
        self.cz
    }

    /// Returns the voxel at local `(x, y, z)`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Voxel {
        self.voxels[voxel_index(x, y, z)]
    }

    /// Writes the voxel at local `(x, y, z)` without touching any flag or
    /// the highest point.
    ///
    /// Callers editing a resident chunk should go through the chunk matrix so
    /// neighbor mesh flags are maintained.
    pub fn set(&mut self, x: usize, y: usize, z: usize, voxel: Voxel) {
        self.voxels[voxel_index(x, y, z)] = voxel;
    }

    /// Raw voxel storage in [`voxel_index`] order.
    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    /// Mutable raw voxel storage, handed to terrain generators.
    pub fn voxels_mut(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    /// Topmost y of a non-sky-passing voxel, as last computed by the sky
    /// pre-pass or [`Chunk::update_heights`] and raised by later edits.
    pub fn highest_point(&self) -> i32 {
        self.highest_point
    }

    pub fn set_highest_point(&mut self, y: i32) {
        self.highest_point = y;
    }

    /// Raises `highest_point` to `y` if it is lower.
    pub fn raise_highest_point(&mut self, y: i32) {
        self.highest_point = self.highest_point.max(y);
    }

    /// Recomputes `highest_point` as the topmost voxel that blocks sky light.
    pub fn update_heights(&mut self, registry: &BlockRegistry) {
        self.highest_point = 0;
        for y in (0..CHUNK_H).rev() {
            let start = voxel_index(0, y, 0);
            let layer = &self.voxels[start..start + CHUNK_W * CHUNK_D];
            if layer.iter().any(|v| !registry.is_sky_light_passing(v.id)) {
                self.highest_point = y as i32;
                return;
            }
        }
    }

    // -- flags ---------------------------------------------------------------

    /// Returns the raw flag bits.
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Returns `true` if every bit of `flags` is set.
    pub fn has_flags(&self, flags: u8) -> bool {
        self.flags & flags == flags
    }

    pub fn set_flags(&mut self, flags: u8) {
        self.flags |= flags;
    }

    pub fn clear_flags(&mut self, flags: u8) {
        self.flags &= !flags;
    }

    pub fn is_loaded(&self) -> bool {
        self.has_flags(LOADED)
    }

    pub fn is_loaded_lights(&self) -> bool {
        self.has_flags(LOADED_LIGHTS)
    }

    pub fn is_lighted(&self) -> bool {
        self.has_flags(LIGHTED)
    }

    pub fn is_modified(&self) -> bool {
        self.has_flags(MODIFIED)
    }

    pub fn is_unsaved(&self) -> bool {
        self.has_flags(UNSAVED)
    }

    // -- serialization -------------------------------------------------------

    /// Serializes voxel data into [`CHUNK_DATA_LEN`] bytes: all ids, then all states.
    pub fn encode_voxels(&self) -> Vec<u8> {
        let mut buf = vec![0u8; CHUNK_DATA_LEN];
        let (ids, states) = buf.split_at_mut(CHUNK_VOL);
        for (i, voxel) in self.voxels.iter().enumerate() {
            ids[i] = voxel.id;
            states[i] = voxel.states;
        }
        buf
    }

    /// Replaces voxel data with a buffer produced by [`Chunk::encode_voxels`].
    ///
    /// Ids unknown to `registry` are replaced with its fallback id. Returns the
    /// number of substituted voxels, or `None` if the buffer has the wrong
    /// length (the chunk is left untouched).
    pub fn decode_voxels(&mut self, data: &[u8], registry: &BlockRegistry) -> Option<usize> {
        if data.len() != CHUNK_DATA_LEN {
            return None;
        }
        let (ids, states) = data.split_at(CHUNK_VOL);
        let fallback = registry.fallback();
        let mut substituted = 0;
        for (i, voxel) in self.voxels.iter_mut().enumerate() {
            let mut id = ids[i];
            if !registry.contains(id) {
                id = fallback;
                substituted += 1;
            }
            *voxel = Voxel::new(id, states[i]);
        }
        Some(substituted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
