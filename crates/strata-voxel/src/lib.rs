//! Voxel storage for the strata world core: block registry, chunks with
//! packed light maps, the run-length codec, region files and the sliding
//! chunk matrix.

pub mod chunk;
pub mod codec;
pub mod content;
pub mod eviction;
pub mod lightmap;
pub mod matrix;
pub mod region;
pub mod registry;

pub use chunk::{
    CHUNK_D, CHUNK_DATA_LEN, CHUNK_H, CHUNK_VOL, CHUNK_W, Chunk, LIGHTED, LOADED, LOADED_LIGHTS,
    MODIFIED, UNSAVED, Voxel, voxel_index,
};
pub use codec::CodecError;
pub use content::{ContentIndices, ContentLut};
pub use eviction::{EvictionListener, EvictionLog, IgnoreEvictions};
pub use lightmap::{LightChannel, LightMap, MAX_LIGHT};
pub use matrix::{ChunkMatrix, voxel_to_chunk};
pub use region::{REGION_SIZE, RegionError, RegionStore, region_coords};
pub use registry::{AIR, BEDROCK, BlockDef, BlockId, BlockRegistry, RegistryError};
