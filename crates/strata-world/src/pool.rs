//! Background terrain generation on a fixed thread pool.
//!
//! Only the generator runs off the main thread: workers receive chunk
//! coordinates and send back owned voxel buffers through bounded channels.
//! The chunk matrix and region caches never leave the controller's thread.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use dashmap::DashMap;
use strata_voxel::{CHUNK_VOL, Voxel};

use crate::generator::TerrainGenerator;

/// A request to generate a single chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationTask {
    pub cx: i32,
    pub cz: i32,
    pub seed: u64,
}

/// A generated voxel buffer ready for insertion on the main thread.
#[derive(Debug)]
pub struct GeneratedChunk {
    pub cx: i32,
    pub cz: i32,
    /// `CHUNK_VOL` voxels in `voxel_index` order.
    pub voxels: Box<[Voxel]>,
    /// Generation time in microseconds.
    pub generation_time_us: u64,
}

struct QueuedTask {
    task: GenerationTask,
    cancelled: Arc<AtomicBool>,
}

/// Runs a [`TerrainGenerator`] on worker threads.
pub struct GenerationPool {
    task_sender: Sender<QueuedTask>,
    result_receiver: Receiver<GeneratedChunk>,
    active_tasks: Arc<DashMap<(i32, i32), Arc<AtomicBool>>>,
    in_flight: Arc<AtomicU64>,
}

impl GenerationPool {
    /// Spawns `thread_count` workers. At most `max_queued` tasks wait for a
    /// worker; at most `result_capacity` finished chunks wait to be drained.
    pub fn new(
        generator: Arc<dyn TerrainGenerator>,
        thread_count: usize,
        max_queued: usize,
        result_capacity: usize,
    ) -> io::Result<Self> {
        let (task_sender, task_receiver) = bounded::<QueuedTask>(max_queued);
        let (result_sender, result_receiver) = bounded::<GeneratedChunk>(result_capacity);
        let in_flight = Arc::new(AtomicU64::new(0));

        for index in 0..thread_count {
            let receiver = task_receiver.clone();
            let sender = result_sender.clone();
            let in_flight = Arc::clone(&in_flight);
            let generator = Arc::clone(&generator);

            std::thread::Builder::new()
                .name(format!("chunk-gen-{index}"))
                .spawn(move || {
                    while let Ok(queued) = receiver.recv() {
                        if queued.cancelled.load(Ordering::Relaxed) {
                            in_flight.fetch_sub(1, Ordering::Relaxed);
                            continue;
                        }

                        let GenerationTask { cx, cz, seed } = queued.task;
                        let start = Instant::now();
                        let mut voxels = vec![Voxel::AIR; CHUNK_VOL].into_boxed_slice();
                        generator.generate(&mut voxels, cx, cz, seed);
                        let elapsed = start.elapsed().as_micros() as u64;

                        if !queued.cancelled.load(Ordering::Relaxed) {
                            let _ = sender.send(GeneratedChunk {
                                cx,
                                cz,
                                voxels,
                                generation_time_us: elapsed,
                            });
                        }
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })?;
        }
        tracing::debug!("started {thread_count} chunk generation workers");

        Ok(Self {
            task_sender,
            result_receiver,
            active_tasks: Arc::new(DashMap::new()),
            in_flight,
        })
    }

    /// Worker count for `requested` threads; 0 picks one per spare core.
    pub fn default_thread_count(requested: usize) -> usize {
        if requested > 0 {
            return requested;
        }
        num_cpus::get().saturating_sub(2).max(1)
    }

    /// Queues a task. Returns the task back if the queue is full.
    pub fn submit(&self, task: GenerationTask) -> Result<(), GenerationTask> {
        let key = (task.cx, task.cz);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active_tasks.insert(key, Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        self.task_sender
            .try_send(QueuedTask { task, cancelled })
            .map_err(|e| {
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                self.active_tasks.remove(&key);
                e.into_inner().task
            })
    }

    /// Cancels a queued or running task. Finished chunks already in the result
    /// channel are still delivered.
    pub fn cancel(&self, cx: i32, cz: i32) {
        if let Some((_, cancelled)) = self.active_tasks.remove(&(cx, cz)) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// Takes every finished chunk without blocking.
    pub fn drain_results(&self) -> Vec<GeneratedChunk> {
        let mut results = Vec::new();
        while let Ok(chunk) = self.result_receiver.try_recv() {
            self.active_tasks.remove(&(chunk.cx, chunk.cz));
            results.push(chunk);
        }
        results
    }

    /// Tasks queued or executing.
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn is_pending(&self, cx: i32, cz: i32) -> bool {
        self.active_tasks.contains_key(&(cx, cz))
    }
}
