//! Block registry: maps compact [`BlockId`] values to [`BlockDef`] lighting and
//! collision properties.
//!
//! The registry is built once during world startup and passed by reference to
//! everything that needs block properties. Air is always ID 0 and bedrock is
//! always ID 1; bedrock doubles as the substitute for ids that no longer
//! resolve after a content change.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Block id stored in every voxel cell.
pub type BlockId = u8;

/// Id of the air block.
pub const AIR: BlockId = 0;

/// Id of the bedrock block, used as the fallback for unknown ids.
pub const BEDROCK: BlockId = 1;

/// Full descriptor for a block type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDef {
    /// Content identifier (e.g. "base:stone").
    pub name: String,
    /// Light of any channel may spread through this block.
    pub light_passing: bool,
    /// Sky light passes straight down through this block without decay.
    pub sky_light_passing: bool,
    /// Emitted light per colour channel (R, G, B), each `0..=15`.
    pub emission: [u8; 3],
    /// Entities collide with this block.
    pub obstacle: bool,
}

impl BlockDef {
    /// Creates an opaque, non-emissive obstacle block.
    pub fn solid(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            light_passing: false,
            sky_light_passing: false,
            emission: [0; 3],
            obstacle: true,
        }
    }

    /// Creates a light-passing block that does not collide.
    pub fn transparent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            light_passing: true,
            sky_light_passing: true,
            emission: [0; 3],
            obstacle: false,
        }
    }

    /// Returns a copy of this definition with the given emission.
    pub fn with_emission(mut self, r: u8, g: u8, b: u8) -> Self {
        self.emission = [r.min(15), g.min(15), b.min(15)];
        self
    }

    /// Returns `true` if any colour channel emits light.
    pub fn is_emissive(&self) -> bool {
        self.emission.iter().any(|&e| e > 0)
    }
}

/// Errors that can occur during block registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A block with the same name has already been registered.
    #[error("duplicate block name: {0}")]
    DuplicateName(String),
    /// All 256 id slots have been consumed.
    #[error("block registry is full (max 256 blocks)")]
    RegistryFull,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps [`BlockId`] → [`BlockDef`] with O(1) lookup by id and by name.
#[derive(Clone, Debug)]
pub struct BlockRegistry {
    /// Dense array where `index == id`.
    blocks: Vec<BlockDef>,
    /// Reverse lookup: name → id.
    name_to_id: HashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Creates a registry with air (0) and bedrock (1) pre-registered.
    pub fn new() -> Self {
        let mut registry = Self {
            blocks: Vec::new(),
            name_to_id: HashMap::new(),
        };
        registry.push(BlockDef::transparent("core:air"));
        registry.push(BlockDef::solid("core:bedrock"));
        registry
    }

    /// Registers a new block and returns its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken, or
    /// [`RegistryError::RegistryFull`] once 256 blocks exist.
    pub fn register(&mut self, def: BlockDef) -> Result<BlockId, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.blocks.len() > BlockId::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }
        Ok(self.push(def))
    }

    fn push(&mut self, def: BlockDef) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.name_to_id.insert(def.name.clone(), id);
        self.blocks.push(def);
        id
    }

    /// Returns the definition for `id`, or the fallback definition if `id`
    /// is not registered.
    pub fn get(&self, id: BlockId) -> &BlockDef {
        self.blocks
            .get(id as usize)
            .unwrap_or(&self.blocks[BEDROCK as usize])
    }

    /// Returns `true` if `id` resolves to a registered block.
    pub fn contains(&self, id: BlockId) -> bool {
        (id as usize) < self.blocks.len()
    }

    /// Returns the id for a named block, or `None` if not found.
    pub fn lookup_by_name(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    /// Id substituted for voxels whose id does not resolve.
    pub fn fallback(&self) -> BlockId {
        BEDROCK
    }

    /// Returns the total number of registered blocks (including air and bedrock).
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if only the built-in blocks are registered.
    pub fn is_empty(&self) -> bool {
        self.blocks.len() <= 2
    }

    /// Iterates over block names in id order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|def| def.name.as_str())
    }

    pub fn is_light_passing(&self, id: BlockId) -> bool {
        self.get(id).light_passing
    }

    pub fn is_sky_light_passing(&self, id: BlockId) -> bool {
        self.get(id).sky_light_passing
    }

    /// Emission of `id` on a colour channel (0 = R, 1 = G, 2 = B). The sky
    /// channel (3) never has emitters.
    pub fn emission(&self, id: BlockId, channel: usize) -> u8 {
        self.get(id).emission.get(channel).copied().unwrap_or(0)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
