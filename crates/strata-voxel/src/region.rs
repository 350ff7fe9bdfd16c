//! Region files: compressed chunk blobs grouped 32×32 per file.
//!
//! A [`RegionStore`] keeps an in-memory cache of [`WorldRegion`]s keyed by
//! region coordinate and lazily falls back to the region file on disk.
//!
//! ## Binary Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 10 | Magic bytes `b"STRATA-RGN"` |
//! | 10 | 1 | Format version (`u8`, currently 1) |
//! | 11 | 1 | Reserved (0) |
//! | 12 | … | Records: `u32` BE length + compressed bytes, one per present slot |
//! | end − 4096 | 4096 | 1024 × `u32` BE record offsets, slot `z * 32 + x`, 0 = absent |
//!
//! Files are named `"{rx}_{rz}.bin"` and are always rewritten whole.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::codec::{self, CodecError};

/// Chunks per region edge.
pub const REGION_SIZE: i32 = 32;

/// Chunk slots per region.
pub const REGION_VOL: usize = (REGION_SIZE * REGION_SIZE) as usize;

/// Magic bytes identifying a region file.
pub const REGION_MAGIC: [u8; 10] = *b"STRATA-RGN";

/// Current region format version.
pub const REGION_FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = REGION_MAGIC.len() + 2;
const TABLE_LEN: usize = REGION_VOL * 4;

/// Errors raised by region storage.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// A stored chunk could not be located, read or decompressed.
    #[error("corrupt data for chunk ({x}, {z}): {reason}")]
    CorruptChunkData {
        /// Chunk x coordinate.
        x: i32,
        /// Chunk z coordinate.
        z: i32,
        /// What was wrong with the record.
        reason: String,
    },
    /// A region file could not be opened for reading.
    #[error("failed to open region file {}: {source}", path.display())]
    Io {
        /// Region file path.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A region could not be written during flush. In-memory data is kept.
    #[error("failed to write region file {}: {source}", path.display())]
    RegionWriteFailure {
        /// Region file path.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Splits chunk coordinates into `(rx, rz, slot_index)`.
pub fn region_coords(x: i32, z: i32) -> (i32, i32, usize) {
    let rx = x.div_euclid(REGION_SIZE);
    let rz = z.div_euclid(REGION_SIZE);
    let lx = x.rem_euclid(REGION_SIZE);
    let lz = z.rem_euclid(REGION_SIZE);
    (rx, rz, (lz * REGION_SIZE + lx) as usize)
}

// ---------------------------------------------------------------------------
// WorldRegion
// ---------------------------------------------------------------------------

/// In-memory contents of one region: optional compressed blob per chunk slot.
#[derive(Debug)]
pub struct WorldRegion {
    chunks: Vec<Option<Box<[u8]>>>,
    unsaved: bool,
}

impl WorldRegion {
    /// Creates an empty, clean region.
    pub fn new() -> Self {
        Self {
            chunks: vec![None; REGION_VOL],
            unsaved: false,
        }
    }

    /// Compressed blob stored in `slot`, if any.
    pub fn get(&self, slot: usize) -> Option<&[u8]> {
        self.chunks[slot].as_deref()
    }

    /// Stores a compressed blob and marks the region unsaved.
    pub fn put(&mut self, slot: usize, blob: Box<[u8]>) {
        self.chunks[slot] = Some(blob);
        self.unsaved = true;
    }

    pub fn is_unsaved(&self) -> bool {
        self.unsaved
    }

    /// Number of slots holding data.
    pub fn len(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Option::is_none)
    }

    /// Serializes every present slot into the region file layout.
    fn serialize(&self) -> Vec<u8> {
        let body: usize = self.chunks.iter().flatten().map(|b| b.len() + 4).sum();
        let mut buf = Vec::with_capacity(HEADER_LEN + body + TABLE_LEN);
        buf.extend_from_slice(&REGION_MAGIC);
        buf.push(REGION_FORMAT_VERSION);
        buf.push(0);

        let mut offsets = [0u32; REGION_VOL];
        for (slot, blob) in self.chunks.iter().enumerate() {
            let Some(blob) = blob else {
                continue;
            };
            offsets[slot] = buf.len() as u32;
            buf.extend_from_slice(&(blob.len() as u32).to_be_bytes());
            buf.extend_from_slice(blob);
        }
        for offset in offsets {
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        buf
    }
}

impl Default for WorldRegion {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Region file reader
// ---------------------------------------------------------------------------

fn invalid(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}

/// An opened region file with its offset table loaded.
struct RegionFile {
    file: File,
    body_end: u64,
    offsets: Vec<u32>,
}

impl RegionFile {
    /// Opens and validates a region file. Returns `Ok(None)` if it does not exist.
    fn open(path: &Path) -> io::Result<Option<Self>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len < (HEADER_LEN + TABLE_LEN) as u64 {
            return Err(invalid("region file shorter than header and offset table"));
        }

        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header)?;
        if header[..REGION_MAGIC.len()] != REGION_MAGIC {
            return Err(invalid("invalid region magic"));
        }
        if header[REGION_MAGIC.len()] != REGION_FORMAT_VERSION {
            return Err(invalid("unsupported region format version"));
        }

        file.seek(SeekFrom::End(-(TABLE_LEN as i64)))?;
        let mut table = vec![0u8; TABLE_LEN];
        file.read_exact(&mut table)?;
        let offsets = table
            .chunks_exact(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Some(Self {
            file,
            body_end: len - TABLE_LEN as u64,
            offsets,
        }))
    }

    /// Reads the compressed record of `slot`, or `None` if the slot is empty.
    fn read_slot(&mut self, slot: usize) -> io::Result<Option<Box<[u8]>>> {
        let offset = u64::from(self.offsets[slot]);
        if offset == 0 {
            return Ok(None);
        }
        if offset < HEADER_LEN as u64 || offset + 4 > self.body_end {
            return Err(invalid("chunk offset outside region body"));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut len_buf = [0u8; 4];
        self.file.read_exact(&mut len_buf)?;
        let len = u64::from(u32::from_be_bytes(len_buf));
        if offset + 4 + len > self.body_end {
            return Err(invalid("chunk record runs past region body"));
        }
        let mut blob = vec![0u8; len as usize];
        self.file.read_exact(&mut blob)?;
        Ok(Some(blob.into_boxed_slice()))
    }
}

// ---------------------------------------------------------------------------
// RegionStore
// ---------------------------------------------------------------------------

/// Cache of compressed chunk blobs backed by a directory of region files.
#[derive(Debug)]
pub struct RegionStore {
    directory: PathBuf,
    decoded_len: usize,
    regions: FxHashMap<(i32, i32), WorldRegion>,
}

impl RegionStore {
    /// Creates a store over `directory`. Every chunk blob decodes to `decoded_len` bytes.
    ///
    /// The directory is created lazily on the first flush.
    pub fn new(directory: impl Into<PathBuf>, decoded_len: usize) -> Self {
        Self {
            directory: directory.into(),
            decoded_len,
            regions: FxHashMap::default(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding region `(rx, rz)`.
    pub fn region_path(&self, rx: i32, rz: i32) -> PathBuf {
        self.directory.join(format!("{rx}_{rz}.bin"))
    }

    /// Returns the decompressed data of chunk `(x, z)`, or `None` if it was never stored.
    ///
    /// # Errors
    ///
    /// [`RegionError::CorruptChunkData`] if the record is malformed or does not
    /// decompress to the expected length; [`RegionError::Io`] if the region
    /// file exists but cannot be opened.
    pub fn get(&self, x: i32, z: i32) -> Result<Option<Vec<u8>>, RegionError> {
        let (rx, rz, slot) = region_coords(x, z);
        if let Some(blob) = self.regions.get(&(rx, rz)).and_then(|r| r.get(slot)) {
            return self.decode(x, z, blob).map(Some);
        }

        let path = self.region_path(rx, rz);
        let corrupt = |e: io::Error| RegionError::CorruptChunkData {
            x,
            z,
            reason: e.to_string(),
        };
        let file = match RegionFile::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => return Err(corrupt(e)),
            Err(source) => return Err(RegionError::Io { path, source }),
        };
        let Some(mut file) = file else {
            return Ok(None);
        };
        match file.read_slot(slot).map_err(corrupt)? {
            Some(blob) => self.decode(x, z, &blob).map(Some),
            None => Ok(None),
        }
    }

    fn decode(&self, x: i32, z: i32, blob: &[u8]) -> Result<Vec<u8>, RegionError> {
        codec::decode(blob, self.decoded_len).map_err(|e: CodecError| {
            RegionError::CorruptChunkData {
                x,
                z,
                reason: e.to_string(),
            }
        })
    }

    /// Compresses `data` into the cached region of chunk `(x, z)` and marks it unsaved.
    pub fn put(&mut self, x: i32, z: i32, data: &[u8]) {
        debug_assert_eq!(data.len(), self.decoded_len);
        let (rx, rz, slot) = region_coords(x, z);
        let blob = codec::encode(data).into_boxed_slice();
        self.regions.entry((rx, rz)).or_default().put(slot, blob);
    }

    /// Compressed size of chunk `(x, z)` in the cache.
    pub fn compressed_len(&self, x: i32, z: i32) -> Option<usize> {
        let (rx, rz, slot) = region_coords(x, z);
        self.regions
            .get(&(rx, rz))
            .and_then(|r| r.get(slot))
            .map(<[u8]>::len)
    }

    /// Returns `true` if region `(rx, rz)` has changes not yet flushed.
    pub fn is_unsaved(&self, rx: i32, rz: i32) -> bool {
        self.regions.get(&(rx, rz)).is_some_and(WorldRegion::is_unsaved)
    }

    /// Number of regions held in memory.
    pub fn cached_regions(&self) -> usize {
        self.regions.len()
    }

    /// Writes every unsaved region to disk and returns how many were written.
    ///
    /// Regions are attempted independently; a region that fails keeps its
    /// unsaved flag so a later flush retries it. The first failure is returned.
    pub fn flush(&mut self) -> Result<usize, RegionError> {
        let mut dirty: Vec<(i32, i32)> = self
            .regions
            .iter()
            .filter(|(_, region)| region.is_unsaved())
            .map(|(&key, _)| key)
            .collect();
        if dirty.is_empty() {
            return Ok(0);
        }
        dirty.sort_unstable();

        fs::create_dir_all(&self.directory).map_err(|source| RegionError::RegionWriteFailure {
            path: self.directory.clone(),
            source,
        })?;

        let mut written = 0;
        let mut first_error = None;
        for (rx, rz) in dirty {
            match self.write_region(rx, rz) {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!("region ({rx}, {rz}) not saved: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::debug!("flushed {written} regions to {}", self.directory.display());
                Ok(written)
            }
        }
    }

    fn write_region(&mut self, rx: i32, rz: i32) -> Result<(), RegionError> {
        let path = self.region_path(rx, rz);
        let Some(region) = self.regions.get_mut(&(rx, rz)) else {
            return Ok(());
        };
        let write_failure = |source: io::Error| RegionError::RegionWriteFailure {
            path: path.clone(),
            source,
        };

        // The file is rewritten whole: pull in every slot we do not hold yet.
        if region.chunks.iter().any(Option::is_none) {
            match RegionFile::open(&path) {
                Ok(Some(mut file)) => {
                    for slot in 0..REGION_VOL {
                        if region.chunks[slot].is_some() {
                            continue;
                        }
                        match file.read_slot(slot) {
                            Ok(blob) => region.chunks[slot] = blob,
                            Err(e) => tracing::warn!(
                                "dropping unreadable slot {slot} of region ({rx}, {rz}): {e}"
                            ),
                        }
                    }
                }
                Ok(None) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    tracing::warn!("overwriting corrupt region file {}: {e}", path.display());
                }
                Err(e) => return Err(write_failure(e)),
            }
        }

        let bytes = region.serialize();
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, &bytes).map_err(write_failure)?;
        fs::rename(&tmp, &path).map_err(write_failure)?;
        region.unsaved = false;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const LEN: usize = 4096;

    fn pattern(seed: u8) -> Vec<u8> {
        let mut data = vec![0u8; LEN];
        for (i, b) in data.iter_mut().enumerate().take(LEN / 2) {
            *b = seed.wrapping_add((i / 64) as u8);
        }
        data
    }

    #[test]
    fn test_region_coords_negative() {
        assert_eq!(region_coords(0, 0), (0, 0, 0));
        assert_eq!(region_coords(31, 0), (0, 0, 31));
        assert_eq!(region_coords(32, 1), (1, 0, 32));
        assert_eq!(region_coords(-1, -1), (-1, -1, 1023));
        assert_eq!(region_coords(-32, -33), (-1, -2, 31 * 32));
    }

    #[test]
    fn test_get_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RegionStore::new(dir.path(), LEN);
        assert!(store.get(3, 4).unwrap().is_none());

        store.put(3, 4, &pattern(1));
        assert_eq!(store.get(3, 4).unwrap(), Some(pattern(1)));
        assert!(store.is_unsaved(0, 0));
        assert!(store.compressed_len(3, 4).unwrap() < LEN);
    }

    #[test]
    fn test_persistence_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let coords = [(0, 0), (5, 7), (-1, -1), (33, -40), (31, 31)];
        {
            let mut store = RegionStore::new(dir.path(), LEN);
            for (i, &(x, z)) in coords.iter().enumerate() {
                store.put(x, z, &pattern(i as u8));
            }
            assert_eq!(store.flush().unwrap(), 3);
            assert!(!store.is_unsaved(0, 0));
        }

        let store = RegionStore::new(dir.path(), LEN);
        for (i, &(x, z)) in coords.iter().enumerate() {
            assert_eq!(store.get(x, z).unwrap(), Some(pattern(i as u8)), "chunk ({x}, {z})");
        }
        assert!(store.get(1, 0).unwrap().is_none());
        assert!(store.get(-2, -1).unwrap().is_none());
        assert!(store.get(500, 500).unwrap().is_none());
    }

    #[test]
    fn test_partial_write_preserves_siblings() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = RegionStore::new(dir.path(), LEN);
            store.put(5, 5, &pattern(55));
            store.flush().unwrap();
        }
        {
            let mut store = RegionStore::new(dir.path(), LEN);
            store.put(3, 3, &pattern(33));
            store.flush().unwrap();
        }
        let store = RegionStore::new(dir.path(), LEN);
        assert_eq!(store.get(5, 5).unwrap(), Some(pattern(55)));
        assert_eq!(store.get(3, 3).unwrap(), Some(pattern(33)));
    }

    #[test]
    fn test_overwrite_replaces_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RegionStore::new(dir.path(), LEN);
        store.put(1, 1, &pattern(1));
        store.flush().unwrap();
        store.put(1, 1, &pattern(2));
        store.flush().unwrap();

        let reopened = RegionStore::new(dir.path(), LEN);
        assert_eq!(reopened.get(1, 1).unwrap(), Some(pattern(2)));
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RegionStore::new(dir.path(), LEN);
        store.put(2, 1, &vec![0u8; LEN]);
        store.flush().unwrap();

        let bytes = std::fs::read(store.region_path(0, 0)).unwrap();
        assert_eq!(&bytes[..10], b"STRATA-RGN");
        assert_eq!(bytes[10], REGION_FORMAT_VERSION);
        assert_eq!(bytes[11], 0);
        let blob_len = u32::from_be_bytes(bytes[12..16].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), HEADER_LEN + 4 + blob_len + TABLE_LEN);

        let table = &bytes[bytes.len() - TABLE_LEN..];
        let slot = 32 + 2;
        let offset = u32::from_be_bytes(table[slot * 4..slot * 4 + 4].try_into().unwrap());
        assert_eq!(offset as usize, HEADER_LEN);
        assert!(table[..slot * 4].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flush_without_changes_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RegionStore::new(dir.path().join("never"), LEN);
        assert_eq!(store.flush().unwrap(), 0);
        assert!(!dir.path().join("never").exists());
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegionStore::new(dir.path(), LEN);
        std::fs::write(store.region_path(0, 0), vec![0xAB; HEADER_LEN + TABLE_LEN]).unwrap();
        assert!(matches!(
            store.get(0, 0),
            Err(RegionError::CorruptChunkData { x: 0, z: 0, .. })
        ));
    }

    #[test]
    fn test_truncated_record_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RegionStore::new(dir.path(), LEN);
        store.put(0, 0, &pattern(9));
        store.flush().unwrap();

        // Inflate the stored length so the record runs past the body.
        let path = store.region_path(0, 0);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[12..16].copy_from_slice(&u32::MAX.to_be_bytes());
        std::fs::write(&path, bytes).unwrap();

        let reopened = RegionStore::new(dir.path(), LEN);
        assert!(matches!(
            reopened.get(0, 0),
            Err(RegionError::CorruptChunkData { .. })
        ));
    }

    #[test]
    fn test_wrong_decoded_length_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RegionStore::new(dir.path(), LEN);
        store.put(0, 0, &pattern(3));
        store.flush().unwrap();

        let other = RegionStore::new(dir.path(), LEN * 2);
        assert!(matches!(
            other.get(0, 0),
            Err(RegionError::CorruptChunkData { .. })
        ));
    }

    #[test]
    fn test_write_failure_keeps_region_unsaved() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut store = RegionStore::new(&blocker, LEN);
        store.put(0, 0, &pattern(4));
        assert!(matches!(
            store.flush(),
            Err(RegionError::RegionWriteFailure { .. })
        ));
        assert!(store.is_unsaved(0, 0));
        assert_eq!(store.get(0, 0).unwrap(), Some(pattern(4)));
    }
}
