//! Per-voxel light storage: four 4-bit channels packed into one `u16`.
//!
//! Channel `i` occupies bits `[4i, 4i + 4)`: red, green, blue, then sky.

use crate::chunk::{CHUNK_VOL, voxel_index};

/// One of the four light channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightChannel {
    Red = 0,
    Green = 1,
    Blue = 2,
    Sky = 3,
}

impl LightChannel {
    /// All channels in storage order.
    pub const ALL: [LightChannel; 4] = [
        LightChannel::Red,
        LightChannel::Green,
        LightChannel::Blue,
        LightChannel::Sky,
    ];

    /// Bit index of the channel's lowest bit.
    fn shift(self) -> u16 {
        (self as u16) * 4
    }

    /// Index into per-channel tables (0..4).
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Maximum value of any channel.
pub const MAX_LIGHT: u8 = 15;

/// Light words for every voxel of a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LightMap {
    map: Box<[u16]>,
}

impl LightMap {
    /// Creates a fully dark light map.
    pub fn new() -> Self {
        Self {
            map: vec![0u16; CHUNK_VOL].into_boxed_slice(),
        }
    }

    /// Returns the channel value at local `(x, y, z)`.
    pub fn get(&self, x: usize, y: usize, z: usize, channel: LightChannel) -> u8 {
        ((self.map[voxel_index(x, y, z)] >> channel.shift()) & 0xF) as u8
    }

    /// Sets the channel value at local `(x, y, z)`. Values above 15 are clamped.
    pub fn set(&mut self, x: usize, y: usize, z: usize, channel: LightChannel, value: u8) {
        let index = voxel_index(x, y, z);
        let shift = channel.shift();
        let value = u16::from(value.min(MAX_LIGHT));
        self.map[index] = (self.map[index] & !(0xF << shift)) | (value << shift);
    }

    pub fn get_r(&self, x: usize, y: usize, z: usize) -> u8 {
        self.get(x, y, z, LightChannel::Red)
    }

    pub fn get_g(&self, x: usize, y: usize, z: usize) -> u8 {
        self.get(x, y, z, LightChannel::Green)
    }

    pub fn get_b(&self, x: usize, y: usize, z: usize) -> u8 {
        self.get(x, y, z, LightChannel::Blue)
    }

    pub fn get_s(&self, x: usize, y: usize, z: usize) -> u8 {
        self.get(x, y, z, LightChannel::Sky)
    }

    /// Returns the raw packed word at local `(x, y, z)`.
    pub fn word(&self, x: usize, y: usize, z: usize) -> u16 {
        self.map[voxel_index(x, y, z)]
    }

    /// Resets every channel of every voxel to 0.
    pub fn clear(&mut self) {
        self.map.fill(0);
    }

    /// Serializes the map into `CHUNK_VOL * 2` bytes: every low byte in voxel
    /// order, then every high byte.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; CHUNK_VOL * 2];
        let (low, high) = buf.split_at_mut(CHUNK_VOL);
        for (i, &word) in self.map.iter().enumerate() {
            let [lo, hi] = word.to_le_bytes();
            low[i] = lo;
            high[i] = hi;
        }
        buf
    }

    /// Replaces the map with the contents of a buffer produced by [`LightMap::encode`].
    ///
    /// Returns `false` and leaves the map unchanged if the buffer has the wrong length.
    pub fn decode(&mut self, data: &[u8]) -> bool {
        if data.len() != CHUNK_VOL * 2 {
            return false;
        }
        let (low, high) = data.split_at(CHUNK_VOL);
        for (i, word) in self.map.iter_mut().enumerate() {
            *word = u16::from_le_bytes([low[i], high[i]]);
        }
        true
    }
}

impl Default for LightMap {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
