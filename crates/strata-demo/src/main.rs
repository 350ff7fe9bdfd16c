//! Headless demo: opens (or creates) a world, walks a viewer across it while
//! chunks stream in and get lit, places a lamp, and saves.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p strata-demo -- --world /tmp/strata --frames 300`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::Parser;
use strata_config::{CliArgs, Config, default_config_dir};
use strata_voxel::{BlockDef, BlockId, BlockRegistry, Chunk, LightChannel, RegistryError};
use strata_world::{
    HeightmapParams, NoiseGenerator, PlayerState, StreamingController, StreamingSettings,
    TerrainPalette, WorldFiles, WorldInfo,
};
use tracing::{info, warn};

/// Simulated frame length.
const FRAME: Duration = Duration::from_millis(16);

/// Viewer walking speed in voxels per frame.
const WALK_SPEED: f32 = 0.75;

struct Blocks {
    registry: BlockRegistry,
    palette: TerrainPalette,
    lamp: BlockId,
}

fn register_blocks() -> Result<Blocks, RegistryError> {
    let mut registry = BlockRegistry::new();
    let stone = registry.register(BlockDef::solid("base:stone"))?;
    let dirt = registry.register(BlockDef::solid("base:dirt"))?;
    let grass = registry.register(BlockDef::solid("base:grass"))?;
    registry.register(BlockDef::transparent("base:glass"))?;
    let lamp = registry.register(BlockDef::solid("base:lamp").with_emission(15, 12, 8))?;
    let palette = TerrainPalette {
        stone,
        dirt,
        grass,
        bedrock: strata_voxel::BEDROCK,
    };
    Ok(Blocks {
        registry,
        palette,
        lamp,
    })
}

fn streaming_settings(config: &Config, seed: u64) -> StreamingSettings {
    StreamingSettings {
        load_distance: config.chunks.load_distance,
        padding: config.effective_padding(),
        max_work_per_frame: config.streaming.max_work_per_frame,
        worker_threads: config.streaming.worker_threads,
        seed,
    }
}

/// Highest non-air voxel at or below the chunk's highest point, if the column is resident.
fn surface_y(controller: &StreamingController, x: i32, z: i32) -> Option<i32> {
    let (chunk, lx, _, lz) = controller.matrix().chunk_by_voxel(x, 0, z)?;
    (0..=chunk.highest_point())
        .rev()
        .find(|&y| chunk.get(lx, y as usize, lz).id != strata_voxel::AIR)
}

fn run(config: &Config, frames: u32) -> Result<(), Box<dyn std::error::Error>> {
    let blocks = register_blocks()?;

    let files = WorldFiles::new(&config.world.directory);
    files.create_dirs()?;
    let mut info = match files.read_world_info()? {
        Some(info) => {
            info!("opened world '{}' (seed {})", info.name, info.seed);
            info
        }
        None => {
            info!("creating world '{}'", config.world.name);
            WorldInfo::new(config.world.name.clone(), config.world.seed)
        }
    };
    let mut player = files.read_player()?.unwrap_or_default();

    let generator = Arc::new(NoiseGenerator::new(
        blocks.palette,
        HeightmapParams::default(),
    ));
    let settings = streaming_settings(config, info.seed);
    let mut controller =
        StreamingController::new(&files, blocks.registry, generator, settings)?;

    let evicted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&evicted);
    controller.set_eviction_listener(Box::new(move |_: &Chunk| {
        counter.fetch_add(1, Ordering::Relaxed);
    }));

    let budget = Duration::from_millis(config.streaming.max_duration_ms);
    let mut lighted = 0;
    for frame in 0..frames {
        player.position[0] += WALK_SPEED;
        controller.recenter(player.position[0] as f64, player.position[2] as f64);
        let stats = controller.update(budget);
        lighted += stats.lighted;
        info.advance(FRAME.as_secs_f32());

        if frame % 60 == 0 {
            info!(
                "frame {frame}: {} chunks resident, {} pending, {lighted} lit, {} evicted",
                controller.matrix().loaded_count(),
                controller.pending_count(),
                evicted.load(Ordering::Relaxed),
            );
        }
    }

    let (x, z) = (player.position[0].floor() as i32, player.position[2].floor() as i32);
    match surface_y(&controller, x, z) {
        Some(y) if controller.set_block(x, y + 1, z, blocks.lamp, 0) => {
            player.position[1] = (y + 2) as f32;
            let beside = |channel| controller.matrix().get_light(x + 3, y + 1, z, channel);
            info!(
                "lamp at ({x}, {}, {z}); light 3 blocks away: r={:?} g={:?} b={:?} sky={:?}",
                y + 1,
                beside(LightChannel::Red),
                beside(LightChannel::Green),
                beside(LightChannel::Blue),
                beside(LightChannel::Sky),
            );
        }
        _ => warn!("viewer column ({x}, {z}) is not loaded, skipping lamp"),
    }

    let regions = controller.save(&files, &info, &player)?;
    info!(
        "saved {regions} region files to {}",
        files.directory().display()
    );
    Ok(())
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    strata_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(&config, args.frames) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
