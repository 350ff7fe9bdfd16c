//! World streaming and persistence: terrain generation, the background
//! generation pool, world directory files and the frame-budgeted streaming
//! controller.

pub mod controller;
pub mod error;
pub mod files;
pub mod generator;
pub mod pool;

pub use controller::{StreamingController, StreamingSettings, UpdateStats};
pub use error::WorldError;
pub use files::{ENGINE_VERSION, PlayerState, WorldFiles, WorldInfo};
pub use generator::{FlatGenerator, HeightmapParams, NoiseGenerator, TerrainGenerator, TerrainPalette};
pub use pool::{GeneratedChunk, GenerationPool, GenerationTask};
