//! Notifications for chunks leaving the resident window.
//!
//! The chunk matrix reports every chunk it drops through an
//! [`EvictionListener`] right before the chunk is freed. Mesh caches release
//! their buffers there; the streaming controller writes unsaved chunks back to
//! the region stores.

use crate::chunk::Chunk;

/// Receives chunks evicted from the chunk matrix.
pub trait EvictionListener {
    /// Called exactly once per evicted chunk, before it is dropped.
    fn chunk_evicted(&mut self, chunk: &Chunk);
}

impl<F: FnMut(&Chunk)> EvictionListener for F {
    fn chunk_evicted(&mut self, chunk: &Chunk) {
        self(chunk)
    }
}

/// Listener that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreEvictions;

impl EvictionListener for IgnoreEvictions {
    fn chunk_evicted(&mut self, _chunk: &Chunk) {}
}

/// Records the coordinates of evicted chunks, oldest first.
#[derive(Clone, Debug, Default)]
pub struct EvictionLog {
    evicted: Vec<(i32, i32)>,
}

impl EvictionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinates recorded since the last [`EvictionLog::drain`].
    pub fn evicted(&self) -> &[(i32, i32)] {
        &self.evicted
    }

    /// Takes every recorded coordinate.
    pub fn drain(&mut self) -> Vec<(i32, i32)> {
        std::mem::take(&mut self.evicted)
    }
}

impl EvictionListener for EvictionLog {
    fn chunk_evicted(&mut self, chunk: &Chunk) {
        self.evicted.push((chunk.cx(), chunk.cz()));
    }
}
