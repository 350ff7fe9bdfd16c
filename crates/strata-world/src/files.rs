//! On-disk layout of a world directory.
//!
//! ```text
//! <world>/
//!   regions/{rx}_{rz}.bin   voxel regions
//!   lights/{rx}_{rz}.bin    light regions
//!   world.json              WorldInfo
//!   player.json             PlayerState
//!   indices.json            ContentIndices
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_voxel::{CHUNK_DATA_LEN, ContentIndices, RegionStore};

use crate::error::WorldError;

pub const REGIONS_DIR: &str = "regions";
pub const LIGHTS_DIR: &str = "lights";
pub const WORLD_FILE: &str = "world.json";
pub const PLAYER_FILE: &str = "player.json";
pub const INDICES_FILE: &str = "indices.json";

/// Engine version written into new world metadata.
pub const ENGINE_VERSION: (u16, u16, u16) = (0, 1, 0);

/// World-level metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldInfo {
    pub name: String,
    pub seed: u64,
    /// Time of day in `[0, 1)`; 0.5 is noon.
    pub daytime: f32,
    /// Day fractions advanced per second.
    pub daytime_speed: f32,
    pub engine_version: (u16, u16, u16),
}

impl Default for WorldInfo {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            seed: 0,
            daytime: 10.0 / 24.0,
            daytime_speed: 1.0 / 1440.0,
            engine_version: ENGINE_VERSION,
        }
    }
}

impl WorldInfo {
    pub fn new(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            seed,
            ..Self::default()
        }
    }

    /// Advances the time of day by `dt` seconds, wrapping at midnight.
    pub fn advance(&mut self, dt: f32) {
        self.daytime = (self.daytime + dt * self.daytime_speed).rem_euclid(1.0);
    }
}

/// Saved viewer state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerState {
    pub position: [f32; 3],
    pub yaw: f32,
    pub pitch: f32,
    pub flight: bool,
    pub noclip: bool,
}

/// Paths and metadata I/O for one world directory.
#[derive(Clone, Debug)]
pub struct WorldFiles {
    directory: PathBuf,
}

impl WorldFiles {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn regions_dir(&self) -> PathBuf {
        self.directory.join(REGIONS_DIR)
    }

    pub fn lights_dir(&self) -> PathBuf {
        self.directory.join(LIGHTS_DIR)
    }

    /// Region store for voxel data.
    pub fn voxel_store(&self) -> RegionStore {
        RegionStore::new(self.regions_dir(), CHUNK_DATA_LEN)
    }

    /// Region store for light maps.
    pub fn light_store(&self) -> RegionStore {
        RegionStore::new(self.lights_dir(), CHUNK_DATA_LEN)
    }

    /// Creates the world directory and its region subdirectories.
    pub fn create_dirs(&self) -> Result<(), WorldError> {
        for dir in [self.regions_dir(), self.lights_dir()] {
            fs::create_dir_all(&dir).map_err(|source| WorldError::Io { path: dir, source })?;
        }
        Ok(())
    }

    pub fn read_world_info(&self) -> Result<Option<WorldInfo>, WorldError> {
        read_json(&self.directory.join(WORLD_FILE))
    }

    pub fn write_world_info(&self, info: &WorldInfo) -> Result<(), WorldError> {
        write_json(&self.directory.join(WORLD_FILE), info)
    }

    pub fn read_player(&self) -> Result<Option<PlayerState>, WorldError> {
        read_json(&self.directory.join(PLAYER_FILE))
    }

    pub fn write_player(&self, player: &PlayerState) -> Result<(), WorldError> {
        write_json(&self.directory.join(PLAYER_FILE), player)
    }

    pub fn read_indices(&self) -> Result<Option<ContentIndices>, WorldError> {
        read_json(&self.directory.join(INDICES_FILE))
    }

    pub fn write_indices(&self, indices: &ContentIndices) -> Result<(), WorldError> {
        write_json(&self.directory.join(INDICES_FILE), indices)
    }
}

/// Reads a JSON file. A missing file is `Ok(None)`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, WorldError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(WorldError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| WorldError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), WorldError> {
    let io_error = |source: io::Error| WorldError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = serde_json::to_string_pretty(value).map_err(|source| WorldError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text).map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path().join("fresh"));
        assert!(files.read_world_info().unwrap().is_none());
        assert!(files.read_player().unwrap().is_none());
        assert!(files.read_indices().unwrap().is_none());
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        files.create_dirs().unwrap();
        assert!(files.regions_dir().is_dir());
        assert!(files.lights_dir().is_dir());

        let info = WorldInfo::new("alpha", 1234);
        let player = PlayerState {
            position: [1.5, 70.0, -3.25],
            yaw: 0.5,
            pitch: -0.25,
            flight: true,
            noclip: false,
        };
        let indices = ContentIndices {
            blocks: vec!["core:air".into(), "core:bedrock".into()],
        };
        files.write_world_info(&info).unwrap();
        files.write_player(&player).unwrap();
        files.write_indices(&indices).unwrap();

        assert_eq!(files.read_world_info().unwrap(), Some(info));
        assert_eq!(files.read_player().unwrap(), Some(player));
        assert_eq!(files.read_indices().unwrap(), Some(indices));
    }

    #[test]
    fn test_partial_world_info_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(WORLD_FILE), r#"{ "name": "old", "seed": 9 }"#).unwrap();
        let info = WorldFiles::new(dir.path()).read_world_info().unwrap().unwrap();
        assert_eq!(info.name, "old");
        assert_eq!(info.seed, 9);
        assert_eq!(info.engine_version, ENGINE_VERSION);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PLAYER_FILE), "{ not json").unwrap();
        let err = WorldFiles::new(dir.path()).read_player().unwrap_err();
        assert!(matches!(err, WorldError::Json { .. }));
    }

    #[test]
    fn test_daytime_wraps() {
        let mut info = WorldInfo::new("w", 0);
        info.daytime = 0.99;
        info.daytime_speed = 0.01;
        info.advance(2.0);
        assert!((info.daytime - 0.01).abs() < 1e-4);
    }
}
