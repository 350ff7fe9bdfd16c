//! Frame-budgeted chunk streaming.
//!
//! Each call to [`StreamingController::update`] performs up to
//! `max_work_per_frame` units of work, nearest first: either the full light
//! pass of one chunk whose 3×3 neighbourhood is resident, or the creation of
//! one missing chunk (region load, else terrain generation) followed by its
//! sky pre-pass. The loop stops early once the time spent so far plus twice
//! the expected cost of another iteration would overrun the frame budget.
//!
//! Chunks leaving the window are written back to the region caches; nothing
//! touches disk until [`StreamingController::save`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use strata_lighting::{Lighting, prebuild_sky_light};
use strata_voxel::{
    BlockId, BlockRegistry, CHUNK_VOL, Chunk, ChunkMatrix, ContentIndices, ContentLut,
    EvictionListener, LIGHTED, LOADED, LOADED_LIGHTS, MODIFIED, RegionError, RegionStore, UNSAVED,
};

use crate::error::WorldError;
use crate::files::{PlayerState, WorldFiles, WorldInfo};
use crate::generator::TerrainGenerator;
use crate::pool::{GeneratedChunk, GenerationPool, GenerationTask};

/// Streaming parameters, usually taken from the `chunks` and `streaming`
/// configuration sections.
#[derive(Clone, Debug)]
pub struct StreamingSettings {
    /// Matrix width and depth in chunks.
    pub load_distance: u32,
    /// Border rows and columns of the matrix that are never filled.
    pub padding: u32,
    /// Upper bound on work units per [`StreamingController::update`].
    pub max_work_per_frame: u32,
    /// Background generation threads; 0 generates on the calling thread.
    pub worker_threads: usize,
    pub seed: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            load_distance: 16,
            padding: 1,
            max_work_per_frame: 16,
            worker_threads: 0,
            seed: 0,
        }
    }
}

/// What one [`StreamingController::update`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Work units performed.
    pub iterations: u32,
    /// Chunks read from the region store.
    pub loaded: u32,
    /// Chunks generated on the calling thread.
    pub generated: u32,
    /// Chunks handed to the generation pool.
    pub queued: u32,
    /// Pool results inserted into the matrix.
    pub received: u32,
    /// Chunks that completed the full light pass.
    pub lighted: u32,
    pub elapsed: Duration,
}

enum Work {
    Light(i32, i32),
    Create(i32, i32),
}

/// Writes evicted chunks back to the region caches and forwards them to an
/// optional external listener.
struct WriteBack<'a> {
    voxels: &'a mut RegionStore,
    lights: &'a mut RegionStore,
    external: Option<&'a mut (dyn EvictionListener + 'static)>,
}

impl EvictionListener for WriteBack<'_> {
    fn chunk_evicted(&mut self, chunk: &Chunk) {
        let (cx, cz) = (chunk.cx(), chunk.cz());
        if chunk.is_unsaved() {
            self.voxels.put(cx, cz, &chunk.encode_voxels());
            if keeps_lights(chunk) {
                self.lights.put(cx, cz, &chunk.lightmap.encode());
            }
            tracing::trace!("wrote back evicted chunk ({cx}, {cz})");
        }
        if let Some(external) = self.external.as_deref_mut() {
            external.chunk_evicted(chunk);
        }
    }
}

/// Whether a chunk's light map is worth storing: it finished the full pass
/// in this session, or it was read back from a previous one and must not go
/// stale on disk.
fn keeps_lights(chunk: &Chunk) -> bool {
    chunk.is_lighted() || chunk.is_loaded_lights()
}

/// Owns the resident chunks, the lighting state and both region stores.
pub struct StreamingController {
    registry: BlockRegistry,
    generator: Arc<dyn TerrainGenerator>,
    matrix: ChunkMatrix,
    lighting: Lighting,
    voxel_regions: RegionStore,
    light_regions: RegionStore,
    settings: StreamingSettings,
    content_lut: Option<ContentLut>,
    pool: Option<GenerationPool>,
    pending: FxHashSet<(i32, i32)>,
    eviction_listener: Option<Box<dyn EvictionListener>>,
    avg_cost: Duration,
}

impl StreamingController {
    /// Opens the world in `files` centred on chunk (0, 0).
    ///
    /// If the world was saved with a different block set, stored ids are
    /// remapped by name on load.
    pub fn new(
        files: &WorldFiles,
        registry: BlockRegistry,
        generator: Arc<dyn TerrainGenerator>,
        settings: StreamingSettings,
    ) -> Result<Self, WorldError> {
        let content_lut = match files.read_indices()? {
            Some(saved) => {
                let lut = ContentLut::new(&saved, &registry);
                for name in lut.missing() {
                    tracing::warn!("block '{name}' is no longer registered, using fallback");
                }
                (!lut.is_identity()).then_some(lut)
            }
            None => None,
        };

        let pool = if settings.worker_threads > 0 {
            let threads = GenerationPool::default_thread_count(settings.worker_threads);
            Some(
                GenerationPool::new(Arc::clone(&generator), threads, 64, 128)
                    .map_err(WorldError::Workers)?,
            )
        } else {
            None
        };

        let size = settings.load_distance.max(1);
        let half = (size / 2) as i32;
        Ok(Self {
            registry,
            generator,
            matrix: ChunkMatrix::new(size, size, -half, -half),
            lighting: Lighting::new(),
            voxel_regions: files.voxel_store(),
            light_regions: files.light_store(),
            settings,
            content_lut,
            pool,
            pending: FxHashSet::default(),
            eviction_listener: None,
            avg_cost: Duration::ZERO,
        })
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn matrix(&self) -> &ChunkMatrix {
        &self.matrix
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    pub fn settings(&self) -> &StreamingSettings {
        &self.settings
    }

    /// Chunks handed to the generation pool and not yet inserted.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Receives every chunk evicted from the matrix after it was written back.
    pub fn set_eviction_listener(&mut self, listener: Box<dyn EvictionListener>) {
        self.eviction_listener = Some(listener);
    }

    /// Sets the padding; takes effect on the next update.
    pub fn set_padding(&mut self, padding: u32) {
        self.settings.padding = padding;
    }

    // -- streaming -----------------------------------------------------------

    /// Runs streaming work until `max_duration` is used up, nothing is left
    /// to do, or `max_work_per_frame` units have run.
    pub fn update(&mut self, max_duration: Duration) -> UpdateStats {
        let start = Instant::now();
        let mut stats = UpdateStats {
            received: self.receive_generated(),
            ..UpdateStats::default()
        };
        let mut total = start.elapsed();

        for _ in 0..self.settings.max_work_per_frame {
            let iteration_start = Instant::now();
            let Some(work) = self.find_work() else {
                break;
            };
            let progressed = match work {
                Work::Light(cx, cz) => {
                    self.light_chunk(cx, cz);
                    stats.lighted += 1;
                    true
                }
                Work::Create(cx, cz) => self.create_chunk(cx, cz, &mut stats),
            };
            if !progressed {
                break;
            }
            stats.iterations += 1;

            let cost = iteration_start.elapsed();
            self.avg_cost = (self.avg_cost + cost) / 2;
            total += cost;
            if total + self.avg_cost.max(cost) * 2 > max_duration {
                break;
            }
        }

        stats.elapsed = start.elapsed();
        stats
    }

    /// Picks the next unit of work: the first loaded, unlit chunk with a full
    /// 3×3 neighbourhood, else the missing chunk nearest the matrix centre.
    fn find_work(&self) -> Option<Work> {
        let (w, d) = (self.matrix.width(), self.matrix.depth());
        let pad = self.settings.padding;
        if w <= pad * 2 || d <= pad * 2 {
            return None;
        }
        let (ox, oz) = self.matrix.area_offset();
        let (center_x, center_z) = ((w / 2) as i64, (d / 2) as i64);

        let mut nearest: Option<(i64, i32, i32)> = None;
        for z in pad..d - pad {
            for x in pad..w - pad {
                let (cx, cz) = (x as i32 + ox, z as i32 + oz);
                match self.matrix.slot(x, z) {
                    Some(chunk) => {
                        if chunk.is_loaded()
                            && !chunk.is_lighted()
                            && self.matrix.surrounding(cx, cz) == 9
                        {
                            return Some(Work::Light(cx, cz));
                        }
                    }
                    None if !self.pending.contains(&(cx, cz)) => {
                        let (dx, dz) = (x as i64 - center_x, z as i64 - center_z);
                        let dist = dx * dx + dz * dz;
                        if nearest.is_none_or(|(best, _, _)| dist < best) {
                            nearest = Some((dist, cx, cz));
                        }
                    }
                    None => {}
                }
            }
        }
        nearest.map(|(_, cx, cz)| Work::Create(cx, cz))
    }

    /// Loads or generates chunk `(cx, cz)`. Returns `false` if no progress
    /// was possible (generation queue full).
    fn create_chunk(&mut self, cx: i32, cz: i32, stats: &mut UpdateStats) -> bool {
        let mut chunk = Box::new(Chunk::new(cx, cz));
        if self.load_voxels(&mut chunk) {
            self.load_lights(&mut chunk);
            stats.loaded += 1;
        } else if let Some(pool) = &self.pool {
            let task = GenerationTask {
                cx,
                cz,
                seed: self.settings.seed,
            };
            if pool.submit(task).is_err() {
                return false;
            }
            self.pending.insert((cx, cz));
            stats.queued += 1;
            return true;
        } else {
            self.generator
                .generate(chunk.voxels_mut(), cx, cz, self.settings.seed);
            chunk.set_flags(UNSAVED);
            stats.generated += 1;
        }
        self.insert_chunk(chunk);
        true
    }

    /// Finishes a chunk with voxel data and places it in the matrix.
    fn insert_chunk(&mut self, mut chunk: Box<Chunk>) {
        chunk.set_flags(LOADED);
        if chunk.is_loaded_lights() {
            chunk.update_heights(&self.registry);
        } else {
            prebuild_sky_light(&mut chunk, &self.registry);
        }
        let (cx, cz) = (chunk.cx(), chunk.cz());
        if !self.matrix.put_chunk(chunk) {
            tracing::debug!("chunk ({cx}, {cz}) left the window before insertion");
        }
    }

    fn load_voxels(&mut self, chunk: &mut Chunk) -> bool {
        let (cx, cz) = (chunk.cx(), chunk.cz());
        let mut data = match self.voxel_regions.get(cx, cz) {
            Ok(Some(data)) => data,
            Ok(None) => return false,
            Err(e @ RegionError::CorruptChunkData { .. }) => {
                tracing::warn!("regenerating chunk ({cx}, {cz}): {e}");
                return false;
            }
            Err(e) => {
                tracing::warn!("cannot read chunk ({cx}, {cz}), regenerating: {e}");
                return false;
            }
        };
        if let Some(lut) = &self.content_lut {
            lut.remap_ids(&mut data[..CHUNK_VOL]);
        }
        match chunk.decode_voxels(&data, &self.registry) {
            Some(0) => true,
            Some(substituted) => {
                tracing::warn!(
                    "chunk ({cx}, {cz}) had {substituted} voxels with unknown block ids"
                );
                true
            }
            None => false,
        }
    }

    fn load_lights(&mut self, chunk: &mut Chunk) {
        let (cx, cz) = (chunk.cx(), chunk.cz());
        match self.light_regions.get(cx, cz) {
            Ok(Some(data)) => {
                if chunk.lightmap.decode(&data) {
                    chunk.set_flags(LOADED_LIGHTS);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("relighting chunk ({cx}, {cz}): {e}"),
        }
    }

    /// Inserts chunks finished by the generation pool.
    fn receive_generated(&mut self) -> u32 {
        let Some(pool) = &self.pool else {
            return 0;
        };
        let results: Vec<GeneratedChunk> = pool.drain_results();
        let mut received = 0;
        for generated in results {
            let (cx, cz) = (generated.cx, generated.cz);
            if !self.pending.remove(&(cx, cz)) || !self.matrix.in_bounds(cx, cz) {
                continue;
            }
            let mut chunk = Box::new(Chunk::new(cx, cz));
            chunk.voxels_mut().copy_from_slice(&generated.voxels);
            chunk.set_flags(UNSAVED);
            self.insert_chunk(chunk);
            received += 1;
        }
        received
    }

    /// Full light pass for a chunk whose neighbours are all resident.
    fn light_chunk(&mut self, cx: i32, cz: i32) {
        let loaded_lights = self
            .matrix
            .get_chunk(cx, cz)
            .is_some_and(Chunk::is_loaded_lights);
        if !loaded_lights {
            self.lighting
                .build_sky_light(&mut self.matrix, &self.registry, cx, cz);
        }
        self.lighting
            .on_chunk_loaded(&mut self.matrix, &self.registry, cx, cz, !loaded_lights);
        if let Some(chunk) = self.matrix.get_chunk_mut(cx, cz) {
            chunk.set_flags(LIGHTED | MODIFIED);
            if !loaded_lights {
                chunk.set_flags(UNSAVED);
            }
        }
        tracing::trace!("lighted chunk ({cx}, {cz})");
    }

    // -- viewer and edits ----------------------------------------------------

    /// Moves the window so the viewer's chunk is at its centre.
    pub fn recenter(&mut self, x: f64, z: f64) {
        let mut write_back = WriteBack {
            voxels: &mut self.voxel_regions,
            lights: &mut self.light_regions,
            external: self.eviction_listener.as_deref_mut(),
        };
        self.matrix
            .recenter(x.floor() as i32, z.floor() as i32, &mut write_back);
        self.cancel_outside();
    }

    /// Changes the window size, evicting chunks that no longer fit.
    pub fn resize(&mut self, width: u32, depth: u32) {
        let mut write_back = WriteBack {
            voxels: &mut self.voxel_regions,
            lights: &mut self.light_regions,
            external: self.eviction_listener.as_deref_mut(),
        };
        self.matrix
            .resize(width.max(1), depth.max(1), &mut write_back);
        self.cancel_outside();
    }

    fn cancel_outside(&mut self) {
        let matrix = &self.matrix;
        let pool = self.pool.as_ref();
        self.pending.retain(|&(cx, cz)| {
            let keep = matrix.in_bounds(cx, cz);
            if !keep && let Some(pool) = pool {
                pool.cancel(cx, cz);
            }
            keep
        });
    }

    /// Places a block and re-lights around it. Returns `false` if the voxel
    /// is not resident.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: BlockId, states: u8) -> bool {
        if !self.matrix.set_voxel(x, y, z, id, states) {
            return false;
        }
        self.lighting
            .on_block_set(&mut self.matrix, &self.registry, x, y, z, id);
        true
    }

    // -- persistence ---------------------------------------------------------

    /// Writes every unsaved resident chunk to the region caches and flushes
    /// both region stores. Returns the number of region files written.
    ///
    /// On failure the cached regions stay unsaved and a later call retries.
    pub fn save_chunks(&mut self) -> Result<usize, WorldError> {
        let mut written_chunks = 0;
        for chunk in self.matrix.iter_mut() {
            if !chunk.is_unsaved() {
                continue;
            }
            let (cx, cz) = (chunk.cx(), chunk.cz());
            self.voxel_regions.put(cx, cz, &chunk.encode_voxels());
            if keeps_lights(chunk) {
                self.light_regions.put(cx, cz, &chunk.lightmap.encode());
            }
            chunk.clear_flags(UNSAVED);
            written_chunks += 1;
        }
        let voxel_files = self.voxel_regions.flush();
        let light_files = self.light_regions.flush();
        let regions = voxel_files? + light_files?;
        tracing::debug!("stored {written_chunks} chunks in {regions} region files");
        Ok(regions)
    }

    /// Saves chunks, world metadata, player state and the block index table.
    pub fn save(
        &mut self,
        files: &WorldFiles,
        info: &WorldInfo,
        player: &PlayerState,
    ) -> Result<usize, WorldError> {
        files.create_dirs()?;
        let regions = self.save_chunks()?;
        files.write_world_info(info)?;
        files.write_player(player)?;
        files.write_indices(&ContentIndices::from_registry(&self.registry))?;
        tracing::info!("saved world '{}' ({regions} region files)", info.name);
        Ok(regions)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FlatGenerator;
    use std::cell::RefCell;
    use std::rc::Rc;
    use strata_voxel::{AIR, BlockDef, LightChannel, voxel_index};

    const SURFACE: i32 = 4;

    fn registry() -> (BlockRegistry, BlockId, BlockId) {
        let mut registry = BlockRegistry::new();
        let stone = registry.register(BlockDef::solid("base:stone")).unwrap();
        let lamp = registry
            .register(BlockDef::solid("base:lamp").with_emission(15, 10, 0))
            .unwrap();
        (registry, stone, lamp)
    }

    fn controller(files: &WorldFiles, load_distance: u32, worker_threads: usize) -> StreamingController {
        let (registry, stone, _) = registry();
        let generator = Arc::new(FlatGenerator::new(vec![
            (strata_voxel::BEDROCK, 1),
            (stone, SURFACE as usize - 1),
        ]));
        let settings = StreamingSettings {
            load_distance,
            padding: 0,
            max_work_per_frame: 1000,
            worker_threads,
            seed: 5,
        };
        StreamingController::new(files, registry, generator, settings).unwrap()
    }

    fn run_until_settled(controller: &mut StreamingController) {
        for _ in 0..5000 {
            let stats = controller.update(Duration::from_secs(60));
            if stats.iterations == 0 && stats.received == 0 && controller.pending_count() == 0 {
                return;
            }
            if stats.iterations == 0 {
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        panic!("streaming never settled");
    }

    #[test]
    fn test_update_fills_and_lights_window() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let mut controller = controller(&files, 5, 0);
        run_until_settled(&mut controller);

        let matrix = controller.matrix();
        assert_eq!(matrix.loaded_count(), 25);
        // Only chunks with all eight neighbours get the full pass.
        let lighted = matrix.iter().filter(|c| c.is_lighted()).count();
        assert_eq!(lighted, 9);
        assert!(matrix.get_chunk(0, 0).unwrap().is_lighted());
        assert!(!matrix.get_chunk(-2, -2).unwrap().is_lighted());

        assert_eq!(matrix.get_voxel(3, SURFACE - 1, 3).map(|v| v.id), Some(2));
        assert_eq!(matrix.get_light(3, SURFACE, 3, LightChannel::Sky), Some(15));
        assert_eq!(matrix.get_light(3, SURFACE - 1, 3, LightChannel::Sky), Some(0));
    }

    #[test]
    fn test_update_respects_work_limit() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let mut controller = controller(&files, 5, 0);
        controller.settings.max_work_per_frame = 3;
        let stats = controller.update(Duration::from_secs(60));
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.generated, 3);
        assert_eq!(controller.matrix().loaded_count(), 3);
        // Nearest first: the centre chunk is created before anything else.
        assert!(controller.matrix().get_chunk(0, 0).is_some());
    }

    #[test]
    fn test_zero_budget_still_makes_progress() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let mut controller = controller(&files, 5, 0);
        let stats = controller.update(Duration::ZERO);
        assert_eq!(stats.iterations, 1);
    }

    #[test]
    fn test_padding_leaves_border_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let mut controller = controller(&files, 5, 0);
        controller.set_padding(1);
        run_until_settled(&mut controller);
        assert_eq!(controller.matrix().loaded_count(), 9);
        assert!(controller.matrix().get_chunk(-2, 0).is_none());
        assert_eq!(controller.matrix().iter().filter(|c| c.is_lighted()).count(), 1);
    }

    #[test]
    fn test_set_block_relights() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let mut controller = controller(&files, 5, 0);
        run_until_settled(&mut controller);
        let lamp = controller.registry().lookup_by_name("base:lamp").unwrap();

        assert!(controller.set_block(8, SURFACE, 8, lamp, 0));
        let matrix = controller.matrix();
        assert_eq!(matrix.get_light(8, SURFACE, 8, LightChannel::Red), Some(15));
        assert_eq!(matrix.get_light(10, SURFACE, 8, LightChannel::Red), Some(13));
        assert_eq!(matrix.get_light(10, SURFACE, 8, LightChannel::Green), Some(8));
        assert_eq!(matrix.get_light(8, SURFACE - 1, 8, LightChannel::Sky), Some(0));
        assert!(matrix.get_chunk(0, 0).unwrap().is_unsaved());

        assert!(controller.set_block(8, SURFACE, 8, AIR, 0));
        let matrix = controller.matrix();
        assert_eq!(matrix.get_light(10, SURFACE, 8, LightChannel::Red), Some(0));
        assert_eq!(matrix.get_light(8, SURFACE, 8, LightChannel::Sky), Some(15));

        assert!(!controller.set_block(1000, SURFACE, 0, lamp, 0));
    }

    #[test]
    fn test_recenter_writes_back_evicted_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let mut controller = controller(&files, 3, 0);
        run_until_settled(&mut controller);

        let evicted = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&evicted);
        controller.set_eviction_listener(Box::new(move |chunk: &Chunk| {
            sink.borrow_mut().push((chunk.cx(), chunk.cz()));
        }));

        // Viewer moves one chunk east (x in [16, 32)).
        controller.recenter(20.5, 8.0);
        let mut evicted = evicted.borrow().clone();
        evicted.sort_unstable();
        assert_eq!(evicted, vec![(-1, -1), (-1, 0), (-1, 1)]);
        assert!(controller.voxel_regions.get(-1, 0).unwrap().is_some());
        // The evicted chunk never had the full light pass.
        assert!(controller.light_regions.get(-1, 0).unwrap().is_none());
        // Centre chunk (0, 0) was lighted and is still resident.
        assert!(controller.matrix().get_chunk(0, 0).unwrap().is_lighted());
    }

    #[test]
    fn test_save_and_reload_world() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let info = WorldInfo::new("test", 5);
        let player = PlayerState::default();

        {
            let mut controller = controller(&files, 3, 0);
            run_until_settled(&mut controller);
            let lamp = controller.registry().lookup_by_name("base:lamp").unwrap();
            assert!(controller.set_block(2, SURFACE, 2, lamp, 0));
            let regions = controller.save(&files, &info, &player).unwrap();
            // Four voxel regions around the origin, one light region for chunk (0, 0).
            assert_eq!(regions, 5);
            assert!(controller.matrix().iter().all(|c| !c.is_unsaved()));
            assert_eq!(controller.save_chunks().unwrap(), 0);
        }

        assert_eq!(files.read_world_info().unwrap(), Some(info));
        assert!(files.read_indices().unwrap().is_some());

        let mut controller = controller(&files, 3, 0);
        let stats = controller.update(Duration::from_secs(60));
        assert_eq!(stats.loaded, 9);
        assert_eq!(stats.generated, 0);
        let matrix = controller.matrix();
        let lamp = controller.registry().lookup_by_name("base:lamp").unwrap();
        assert_eq!(matrix.get_voxel(2, SURFACE, 2).map(|v| v.id), Some(lamp));
        let centre = matrix.get_chunk(0, 0).unwrap();
        assert!(centre.is_loaded_lights());
        assert_eq!(centre.lightmap.get(3, SURFACE as usize, 2, LightChannel::Red), 14);
        assert!(!matrix.get_chunk(1, 1).unwrap().is_loaded_lights());
    }

    #[test]
    fn test_removed_lamp_stays_dark_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let info = WorldInfo::new("test", 5);
        let player = PlayerState::default();
        let red = |controller: &StreamingController, x| {
            controller
                .matrix()
                .get_light(x, SURFACE, 8, LightChannel::Red)
        };

        {
            let mut controller = controller(&files, 5, 0);
            run_until_settled(&mut controller);
            let lamp = controller.registry().lookup_by_name("base:lamp").unwrap();
            // Next to the east border, so light spills into chunk (1, 0).
            assert!(controller.set_block(14, SURFACE, 8, lamp, 0));
            assert_eq!(red(&controller, 16), Some(13));
            controller.save(&files, &info, &player).unwrap();

            assert!(controller.set_block(14, SURFACE, 8, AIR, 0));
            assert_eq!(red(&controller, 16), Some(0));
            // The neighbour only lost light, but its stored map is now stale.
            assert!(controller.matrix().get_chunk(1, 0).unwrap().is_unsaved());
            controller.save(&files, &info, &player).unwrap();
        }

        let mut controller = controller(&files, 5, 0);
        run_until_settled(&mut controller);
        assert!(controller.matrix().get_chunk(1, 0).unwrap().is_loaded_lights());
        for x in 0..32 {
            assert_eq!(red(&controller, x), Some(0), "residual red light at x = {x}");
        }
    }

    #[test]
    fn test_corrupt_chunk_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        {
            let mut store = files.voxel_store();
            store.put(0, 0, &vec![7u8; strata_voxel::CHUNK_DATA_LEN]);
            store.flush().unwrap();
        }
        // Drop the record bytes so its length prefix runs past the region body.
        let path = files.voxel_store().region_path(0, 0);
        let bytes = std::fs::read(&path).unwrap();
        let mut broken = bytes[..16].to_vec();
        broken.extend_from_slice(&bytes[bytes.len() - 4096..]);
        std::fs::write(&path, broken).unwrap();

        let mut controller = controller(&files, 1, 0);
        let stats = controller.update(Duration::from_secs(60));
        assert_eq!(stats.generated, 1);
        let chunk = controller.matrix().get_chunk(0, 0).unwrap();
        assert!(chunk.is_unsaved());
        assert_eq!(chunk.voxels()[voxel_index(0, 0, 0)].id, strata_voxel::BEDROCK);
    }

    #[test]
    fn test_content_change_remaps_ids() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        {
            let mut controller = controller(&files, 1, 0);
            run_until_settled(&mut controller);
            controller
                .save(&files, &WorldInfo::default(), &PlayerState::default())
                .unwrap();
        }

        // Same blocks, different registration order.
        let mut registry = BlockRegistry::new();
        let lamp = registry
            .register(BlockDef::solid("base:lamp").with_emission(15, 10, 0))
            .unwrap();
        let stone = registry.register(BlockDef::solid("base:stone")).unwrap();
        assert_ne!(stone, 2);
        let generator = Arc::new(FlatGenerator::new(vec![(lamp, 1)]));
        let settings = StreamingSettings {
            load_distance: 1,
            padding: 0,
            ..StreamingSettings::default()
        };
        let mut controller =
            StreamingController::new(&files, registry, generator, settings).unwrap();
        let stats = controller.update(Duration::from_secs(60));
        assert_eq!(stats.loaded, 1);
        assert_eq!(
            controller.matrix().get_voxel(0, SURFACE - 1, 0).map(|v| v.id),
            Some(stone)
        );
    }

    #[test]
    fn test_background_generation() {
        let dir = tempfile::tempdir().unwrap();
        let files = WorldFiles::new(dir.path());
        let mut controller = controller(&files, 3, 2);
        let stats = controller.update(Duration::from_secs(60));
        assert_eq!(stats.queued, 9);
        assert_eq!(stats.generated, 0);
        run_until_settled(&mut controller);
        assert_eq!(controller.matrix().loaded_count(), 9);
        assert!(controller.matrix().get_chunk(0, 0).unwrap().is_lighted());
    }
}
