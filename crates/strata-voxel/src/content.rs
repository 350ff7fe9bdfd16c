//! Saved block-name tables and id remapping for worlds written by another
//! content set.
//!
//! A world stores the names of the blocks it was saved with, in id order. On
//! load the saved names are looked up in the current [`BlockRegistry`] and a
//! [`ContentLut`] rewrites every stored id to the current one.

use serde::{Deserialize, Serialize};

use crate::registry::{BlockId, BlockRegistry};

/// Block names in id order, as persisted next to a world.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentIndices {
    pub blocks: Vec<String>,
}

impl ContentIndices {
    /// Snapshot of the names currently registered.
    pub fn from_registry(registry: &BlockRegistry) -> Self {
        Self {
            blocks: registry.names().map(str::to_owned).collect(),
        }
    }
}

/// Lookup table from saved block ids to current block ids.
#[derive(Clone, Debug)]
pub struct ContentLut {
    table: Vec<BlockId>,
    fallback: BlockId,
    missing: Vec<String>,
}

impl ContentLut {
    /// Builds the table. Saved names that no longer exist map to the
    /// registry's fallback block and are listed in [`ContentLut::missing`].
    pub fn new(saved: &ContentIndices, registry: &BlockRegistry) -> Self {
        let fallback = registry.fallback();
        let mut missing = Vec::new();
        let table = saved
            .blocks
            .iter()
            .map(|name| {
                registry.lookup_by_name(name).unwrap_or_else(|| {
                    missing.push(name.clone());
                    fallback
                })
            })
            .collect();
        Self {
            table,
            fallback,
            missing,
        }
    }

    /// Current id for the saved id `id`. Ids beyond the saved table map to the fallback.
    pub fn remap(&self, id: BlockId) -> BlockId {
        self.table
            .get(id as usize)
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Rewrites a plane of saved ids in place, e.g. the id half of a
    /// serialized voxel buffer before it is decoded.
    pub fn remap_ids(&self, ids: &mut [u8]) {
        for id in ids {
            *id = self.remap(*id);
        }
    }

    /// Returns `true` if every saved id maps to itself, so chunks need no conversion.
    pub fn is_identity(&self) -> bool {
        self.missing.is_empty() && self.table.iter().enumerate().all(|(i, &id)| i == id as usize)
    }

    /// Saved names with no current counterpart.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }
}
