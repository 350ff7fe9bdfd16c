//! Configuration sections, defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the configuration inside its directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub chunks: ChunksConfig,
    pub streaming: StreamingConfig,
    pub world: WorldConfig,
    pub debug: DebugConfig,
}

/// Size of the resident chunk window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunksConfig {
    /// Width and depth of the chunk matrix, in chunks.
    pub load_distance: u32,
    /// Border of matrix slots that are never filled.
    pub padding: u32,
}

/// Per-frame streaming budget and background generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Wall-clock budget of one update, in milliseconds.
    pub max_duration_ms: u64,
    /// Upper bound on chunks created or lit per update.
    pub max_work_per_frame: u32,
    /// Generation worker threads; 0 generates on the calling thread.
    pub worker_threads: usize,
}

/// Which world to open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    pub name: String,
    /// Seed for newly created worlds. Existing worlds keep their saved seed.
    pub seed: u64,
    /// Directory holding the world's regions and metadata.
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g. "debug", "info", "warn").
    pub log_level: String,
}

impl Default for ChunksConfig {
    fn default() -> Self {
        Self {
            load_distance: 16,
            padding: 1,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 8,
            max_work_per_frame: 16,
            worker_threads: 0,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            seed: 0,
            directory: PathBuf::from("worlds").join("world"),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for strata, falling back to the working directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("strata"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_error)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })
    }

    /// Re-reads the file. Returns `Some(new_config)` if it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = read_config(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Matrix padding clamped so at least one slot row stays fillable.
    pub fn effective_padding(&self) -> u32 {
        let max = self.chunks.load_distance.saturating_sub(1) / 2;
        self.chunks.padding.min(max)
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
