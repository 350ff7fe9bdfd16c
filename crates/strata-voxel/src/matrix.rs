//! The sliding window of resident chunks.
//!
//! [`ChunkMatrix`] is a dense `width × depth` array of optional chunks plus an
//! area offset: slot `(x, z)` holds world chunk `(x + offset_x, z + offset_z)`.
//! Moving the viewer shifts the array contents instead of rehashing, and
//! chunks that fall off the edge are reported to an [`EvictionListener`].

use crate::chunk::{CHUNK_D, CHUNK_H, CHUNK_W, Chunk, MODIFIED, UNSAVED, Voxel, voxel_index};
use crate::eviction::EvictionListener;
use crate::lightmap::LightChannel;
use crate::registry::{BlockId, BlockRegistry};

/// Converts world voxel coordinates to `(cx, cz, lx, ly, lz)`.
///
/// Returns `None` if `y` is outside the world height.
pub fn voxel_to_chunk(x: i32, y: i32, z: i32) -> Option<(i32, i32, usize, usize, usize)> {
    if y < 0 || y >= CHUNK_H as i32 {
        return None;
    }
    let cx = x.div_euclid(CHUNK_W as i32);
    let cz = z.div_euclid(CHUNK_D as i32);
    let lx = x.rem_euclid(CHUNK_W as i32) as usize;
    let lz = z.rem_euclid(CHUNK_D as i32) as usize;
    Some((cx, cz, lx, y as usize, lz))
}

/// Owns every resident chunk inside a movable rectangular window.
pub struct ChunkMatrix {
    width: u32,
    depth: u32,
    area_offset_x: i32,
    area_offset_z: i32,
    chunks: Vec<Option<Box<Chunk>>>,
}

impl ChunkMatrix {
    /// Creates an empty matrix whose slot `(0, 0)` maps to chunk `(offset_x, offset_z)`.
    pub fn new(width: u32, depth: u32, offset_x: i32, offset_z: i32) -> Self {
        let mut chunks = Vec::new();
        chunks.resize_with((width * depth) as usize, || None);
        Self {
            width,
            depth,
            area_offset_x: offset_x,
            area_offset_z: offset_z,
            chunks,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Chunk coordinates mapped to slot `(0, 0)`.
    pub fn area_offset(&self) -> (i32, i32) {
        (self.area_offset_x, self.area_offset_z)
    }

    /// Chunk coordinates of the window's logical center.
    pub fn center(&self) -> (i32, i32) {
        (
            self.area_offset_x + (self.width / 2) as i32,
            self.area_offset_z + (self.depth / 2) as i32,
        )
    }

    fn slot_index(&self, cx: i32, cz: i32) -> Option<usize> {
        let x = cx - self.area_offset_x;
        let z = cz - self.area_offset_z;
        if x < 0 || z < 0 || x >= self.width as i32 || z >= self.depth as i32 {
            return None;
        }
        Some((z as u32 * self.width + x as u32) as usize)
    }

    /// Returns `true` if chunk `(cx, cz)` lies inside the window (resident or not).
    pub fn in_bounds(&self, cx: i32, cz: i32) -> bool {
        self.slot_index(cx, cz).is_some()
    }

    /// Chunk stored at slot `(x, z)`.
    pub fn slot(&self, x: u32, z: u32) -> Option<&Chunk> {
        if x >= self.width || z >= self.depth {
            return None;
        }
        self.chunks[(z * self.width + x) as usize].as_deref()
    }

    pub fn get_chunk(&self, cx: i32, cz: i32) -> Option<&Chunk> {
        let index = self.slot_index(cx, cz)?;
        self.chunks[index].as_deref()
    }

    pub fn get_chunk_mut(&mut self, cx: i32, cz: i32) -> Option<&mut Chunk> {
        let index = self.slot_index(cx, cz)?;
        self.chunks[index].as_deref_mut()
    }

    /// Chunk owning world voxel `(x, y, z)` plus the voxel's local coordinates.
    pub fn chunk_by_voxel(&self, x: i32, y: i32, z: i32) -> Option<(&Chunk, usize, usize, usize)> {
        let (cx, cz, lx, ly, lz) = voxel_to_chunk(x, y, z)?;
        Some((self.get_chunk(cx, cz)?, lx, ly, lz))
    }

    pub fn chunk_by_voxel_mut(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
    ) -> Option<(&mut Chunk, usize, usize, usize)> {
        let (cx, cz, lx, ly, lz) = voxel_to_chunk(x, y, z)?;
        Some((self.get_chunk_mut(cx, cz)?, lx, ly, lz))
    }

    /// Voxel at world `(x, y, z)`, or `None` outside the resident window or world height.
    pub fn get_voxel(&self, x: i32, y: i32, z: i32) -> Option<&Voxel> {
        let (chunk, lx, ly, lz) = self.chunk_by_voxel(x, y, z)?;
        Some(&chunk.voxels()[voxel_index(lx, ly, lz)])
    }

    /// Light channel value at world `(x, y, z)`.
    pub fn get_light(&self, x: i32, y: i32, z: i32, channel: LightChannel) -> Option<u8> {
        let (chunk, lx, ly, lz) = self.chunk_by_voxel(x, y, z)?;
        Some(chunk.lightmap.get(lx, ly, lz, channel))
    }

    /// Returns `true` if light may enter world voxel `(x, y, z)`. Voxels in
    /// absent chunks are opaque.
    pub fn is_light_passing(&self, x: i32, y: i32, z: i32, registry: &BlockRegistry) -> bool {
        self.get_voxel(x, y, z)
            .is_some_and(|v| registry.is_light_passing(v.id))
    }

    /// Writes a voxel and marks the owning chunk unsaved and modified.
    ///
    /// Edge-adjacent neighbor chunks are marked modified when the voxel lies
    /// on their shared boundary. Returns `false` if the voxel is not resident.
    pub fn set_voxel(&mut self, x: i32, y: i32, z: i32, id: BlockId, states: u8) -> bool {
        let Some((cx, cz, lx, ly, lz)) = voxel_to_chunk(x, y, z) else {
            return false;
        };
        let Some(chunk) = self.get_chunk_mut(cx, cz) else {
            return false;
        };
        chunk.set(lx, ly, lz, Voxel::new(id, states));
        chunk.set_flags(UNSAVED | MODIFIED);

        let mut neighbors = Vec::with_capacity(2);
        if lx == 0 {
            neighbors.push((cx - 1, cz));
        }
        if lx == CHUNK_W - 1 {
            neighbors.push((cx + 1, cz));
        }
        if lz == 0 {
            neighbors.push((cx, cz - 1));
        }
        if lz == CHUNK_D - 1 {
            neighbors.push((cx, cz + 1));
        }
        for (nx, nz) in neighbors {
            if let Some(neighbor) = self.get_chunk_mut(nx, nz) {
                neighbor.set_flags(MODIFIED);
            }
        }
        true
    }

    /// Inserts a chunk into the slot matching its coordinates.
    ///
    /// Returns `false` (dropping the chunk) if it lies outside the window.
    /// Any chunk already in that slot is replaced.
    pub fn put_chunk(&mut self, chunk: Box<Chunk>) -> bool {
        let Some(index) = self.slot_index(chunk.cx(), chunk.cz()) else {
            return false;
        };
        self.chunks[index] = Some(chunk);
        true
    }

    /// Number of resident chunks in the 3×3 neighborhood centered on `(cx, cz)`.
    pub fn surrounding(&self, cx: i32, cz: i32) -> usize {
        let mut count = 0;
        for dz in -1..=1 {
            for dx in -1..=1 {
                if self.get_chunk(cx + dx, cz + dz).is_some() {
                    count += 1;
                }
            }
        }
        count
    }

    /// Moves the window so the chunk containing world voxel column `(x, z)`
    /// becomes its center.
    pub fn recenter(&mut self, x: i32, z: i32, listener: &mut dyn EvictionListener) {
        let cx = x.div_euclid(CHUNK_W as i32);
        let cz = z.div_euclid(CHUNK_D as i32);
        let (center_x, center_z) = self.center();
        if cx != center_x || cz != center_z {
            self.translate(cx - center_x, cz - center_z, listener);
        }
    }

    /// Shifts the window by `(dx, dz)` chunks, evicting chunks that fall outside.
    pub fn translate(&mut self, dx: i32, dz: i32, listener: &mut dyn EvictionListener) {
        if dx == 0 && dz == 0 {
            return;
        }
        let (w, d) = (self.width as i32, self.depth as i32);
        let mut moved: Vec<Option<Box<Chunk>>> = Vec::new();
        moved.resize_with(self.chunks.len(), || None);

        for (index, slot) in self.chunks.iter_mut().enumerate() {
            let Some(chunk) = slot.take() else {
                continue;
            };
            let x = index as i32 % w;
            let z = index as i32 / w;
            let (nx, nz) = (x - dx, z - dz);
            if nx < 0 || nz < 0 || nx >= w || nz >= d {
                listener.chunk_evicted(&chunk);
                continue;
            }
            moved[(nz * w + nx) as usize] = Some(chunk);
        }

        self.chunks = moved;
        self.area_offset_x += dx;
        self.area_offset_z += dz;
    }

    /// Changes the window size. Chunks in the overlapping area are kept;
    /// chunks that no longer fit are evicted through `listener`.
    pub fn resize(&mut self, width: u32, depth: u32, listener: &mut dyn EvictionListener) {
        if width == self.width && depth == self.depth {
            return;
        }
        let shrink_x = self.width.saturating_sub(width) as i32;
        let shrink_z = self.depth.saturating_sub(depth) as i32;
        if shrink_x > 0 || shrink_z > 0 {
            // Push the trailing rows/columns out through the normal eviction
            // path, then slide back; nothing else can leave on the way back.
            self.translate(-shrink_x, -shrink_z, listener);
            self.translate(shrink_x, shrink_z, listener);
        }

        let mut resized: Vec<Option<Box<Chunk>>> = Vec::new();
        resized.resize_with((width * depth) as usize, || None);
        for z in 0..self.depth.min(depth) {
            for x in 0..self.width.min(width) {
                let old = (z * self.width + x) as usize;
                resized[(z * width + x) as usize] = self.chunks[old].take();
            }
        }
        debug_assert!(self.chunks.iter().all(Option::is_none));

        self.chunks = resized;
        self.width = width;
        self.depth = depth;
    }

    /// Number of resident chunks.
    pub fn loaded_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    /// Iterates over resident chunks in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter_map(|c| c.as_deref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.chunks.iter_mut().filter_map(|c| c.as_deref_mut())
    }

    /// Removes every resident chunk without notifying anyone.
    pub fn take_all(&mut self) -> Vec<Box<Chunk>> {
        self.chunks.iter_mut().filter_map(Option::take).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
