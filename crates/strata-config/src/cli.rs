//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// strata command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "strata", about = "Voxel world streaming and lighting")]
pub struct CliArgs {
    /// World directory.
    #[arg(long)]
    pub world: Option<PathBuf>,

    /// Seed used when the world is created.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Chunk window width and depth.
    #[arg(long)]
    pub load_distance: Option<u32>,

    /// Generation worker threads (0 = generate inline).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Number of update frames to run.
    #[arg(long, default_value_t = 600)]
    pub frames: u32,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.world {
            self.world.directory = dir.clone();
        }
        if let Some(seed) = args.seed {
            self.world.seed = seed;
        }
        if let Some(distance) = args.load_distance {
            self.chunks.load_distance = distance;
        }
        if let Some(workers) = args.workers {
            self.streaming.worker_threads = workers;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
