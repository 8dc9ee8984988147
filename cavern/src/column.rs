//! The cave generator facade used by the host, tying the noise services, the master
//! carver and the precalculator together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::DVec3;
use tracing::{debug, info};

use crate::buffer::BlockChangeBuffer;
use crate::carve::{ColumnBundle, ColumnContext, ColumnOutcome, ColumnReport, CarveError, GateRoller, MasterCarver};
use crate::config::{CaveConfig, CavernSettings, ConfigHandle};
use crate::field::MAX_CHUNK_SIZE;
use crate::host::{BiomeClassifier, FixedBiome, FluidRegistry, MemoryFluidRegistry, VoxelSink, WorldView};
use crate::noise::{DensityFieldSampler, NoiseGeneratorPool, NoiseKind, PoolLimits};
use crate::precalc::{CaveMapPrecalculator, PrecomputeError};


/// The host services the generator reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub world: Arc<dyn WorldView>,
    pub biome: Arc<dyn BiomeClassifier>,
    pub fluids: Arc<dyn FluidRegistry>,
}

impl Collaborators {

    /// Collaborators with a temperate biome everywhere and an in-memory fluid registry.
    pub fn new(world: Arc<dyn WorldView>) -> Self {
        Self {
            world,
            biome: Arc::new(FixedBiome::default()),
            fluids: Arc::new(MemoryFluidRegistry::new()),
        }
    }

    pub fn with_biome(mut self, biome: Arc<dyn BiomeClassifier>) -> Self {
        self.biome = biome;
        self
    }

    pub fn with_fluids(mut self, fluids: Arc<dyn FluidRegistry>) -> Self {
        self.fluids = fluids;
        self
    }

}


/// Everything needed to carve or precompute any column, shared between the foreground
/// generator and the precompute workers.
pub(crate) struct ColumnEngine {
    collab: Collaborators,
    sampler: DensityFieldSampler,
    master: MasterCarver,
    config: ConfigHandle,
    chunk_size: usize,
    noise_seed: i64,
}

impl ColumnEngine {

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Check that columns can be carved with the engine's chunk size and world height.
    pub fn validate(&self) -> Result<(), CarveError> {
        let height = self.collab.world.height();
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE || height <= 0 {
            return Err(CarveError::InvalidColumn { chunk_size: self.chunk_size, height });
        }
        Ok(())
    }

    /// Run the given function with the context of a column, built from a fresh snapshot
    /// of the configuration.
    fn with_context<R>(&self, cx: i32, cz: i32, func: impl FnOnce(&ColumnContext<'_>) -> R) -> R {

        let config = self.config.snapshot();
        let size = self.chunk_size as i32;
        let biome = self.collab.biome.classify(cx * size + size / 2, cz * size + size / 2);

        func(&ColumnContext {
            cx,
            cz,
            world: &*self.collab.world,
            biome,
            config: &config,
            sampler: &self.sampler,
            fluids: &*self.collab.fluids,
            gate: GateRoller::new(config.gate_mode, self.noise_seed),
            size: self.chunk_size,
        })

    }

    pub fn precompute(&self, cx: i32, cz: i32) -> Result<ColumnBundle, CarveError> {
        self.validate()?;
        self.with_context(cx, cz, |ctx| self.master.precompute(ctx))
    }

    pub fn carve(&self, cx: i32, cz: i32, bundle: Option<&ColumnBundle>, collect_fresh: bool) -> Result<ColumnOutcome, CarveError> {
        self.validate()?;
        Ok(self.with_context(cx, cz, |ctx| self.master.carve_column(ctx, bundle, collect_fresh)))
    }

}


/// Options of a single column generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// On a cache miss, store the freshly sampled fields in the precompute cache.
    pub store_fresh: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { store_fresh: true }
    }
}


/// The cave generator of a world.
pub struct CaveGenerator {
    engine: Arc<ColumnEngine>,
    precalc: CaveMapPrecalculator,
    carved_voxels: AtomicUsize,
}

impl CaveGenerator {

    /// Build the generator, its noise pool, sampler and precompute workers. The noise
    /// seed and the sampling mode are taken from the configuration at this point.
    pub fn new(collab: Collaborators, settings: CavernSettings, config: ConfigHandle) -> Self {

        let snapshot = config.snapshot();
        let world = &collab.world;

        let size = settings.chunk_size.max(1) as i32;
        let segments = (world.height().max(1) + size - 1) / size;
        let limits = PoolLimits::from_workload(
            settings.worker_threads + 1,
            NoiseKind::ALL.len(),
            segments as usize,
            settings.pool_safety_factor);

        let noise_seed = match snapshot.seed_override {
            0 => world.seed(),
            seed => seed,
        };

        let pool = Arc::new(NoiseGeneratorPool::with_all_kinds(limits));
        let sampler = DensityFieldSampler::new(pool, noise_seed, world.sea_level())
            .with_mode(snapshot.sampling)
            .with_cache_limits(settings.grid_cache_limit, settings.sparse_cache_limit);

        info!("cave generator with seed {noise_seed}, chunk size {}, {} workers, pool limits {}/{}",
            settings.chunk_size, settings.worker_threads, limits.soft, limits.hard);

        let engine = Arc::new(ColumnEngine {
            collab,
            sampler,
            master: MasterCarver::default(),
            config,
            chunk_size: settings.chunk_size,
            noise_seed,
        });

        Self {
            precalc: CaveMapPrecalculator::new(Arc::clone(&engine), &settings),
            engine,
            carved_voxels: AtomicUsize::new(0),
        }

    }

    /// Build a generator with default settings and configuration.
    pub fn with_defaults(collab: Collaborators) -> Self {
        Self::new(collab, CavernSettings::default(), ConfigHandle::new(CaveConfig::default()))
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &Arc<ColumnEngine> {
        &self.engine
    }

    #[inline]
    pub fn precalc(&self) -> &CaveMapPrecalculator {
        &self.precalc
    }

    #[inline]
    pub fn sampler(&self) -> &DensityFieldSampler {
        &self.engine.sampler
    }

    #[inline]
    pub fn noise_seed(&self) -> i64 {
        self.engine.noise_seed
    }

    /// Carve the column and write its voxels to the sink, using the precomputed fields
    /// when cached and storing the fresh ones otherwise.
    pub fn generate_column(&self, cx: i32, cz: i32, sink: &mut dyn VoxelSink) -> Result<ColumnReport, CarveError> {
        self.generate_column_with(cx, cz, sink, GenerateOptions::default())
    }

    pub fn generate_column_with(&self, cx: i32, cz: i32, sink: &mut dyn VoxelSink, options: GenerateOptions) -> Result<ColumnReport, CarveError> {

        let cached = self.precalc.get(cx, cz);
        let outcome = self.engine.carve(cx, cz, cached.as_deref(), options.store_fresh)?;

        if let Some(fresh) = outcome.fresh {
            self.precalc.store(fresh);
        }

        Ok(self.apply(outcome.buffer, outcome.report, sink))

    }

    /// Drop anything cached for the column, carve it from fresh noise and store the
    /// fresh fields back in the cache.
    pub fn regenerate_column(&self, cx: i32, cz: i32, sink: &mut dyn VoxelSink) -> Result<ColumnReport, CarveError> {
        self.precalc.invalidate_column(cx, cz);
        let outcome = self.engine.carve(cx, cz, None, true)?;
        if let Some(fresh) = outcome.fresh {
            self.precalc.store(fresh);
        }
        debug!("regenerated column {cx}/{cz}");
        Ok(self.apply(outcome.buffer, outcome.report, sink))
    }

    fn apply(&self, buffer: BlockChangeBuffer, report: ColumnReport, sink: &mut dyn VoxelSink) -> ColumnReport {
        let carved = buffer.apply(sink);
        self.carved_voxels.store(carved, Ordering::Relaxed);
        debug!("column {}/{} carved {carved} voxels, cache hit: {}", report.cx, report.cz, report.cache_hit);
        report
    }

    /// Synchronously compute and cache the fields of a column.
    pub fn precompute_column(&self, cx: i32, cz: i32) -> Result<(), PrecomputeError> {
        self.precalc.precompute_column(cx, cz).map(|_| ())
    }

    pub fn invalidate_column(&self, cx: i32, cz: i32) {
        self.precalc.invalidate_column(cx, cz);
    }

    /// Update the tracked player position, queuing background precomputation of the
    /// columns around it. Returns the number of queued columns.
    pub fn track_player(&self, pos: DVec3) -> usize {
        self.precalc.track_player(pos)
    }

    /// Precompute the area around the spawn and wait for it to be complete.
    pub fn warm_spawn(&self, center: DVec3) -> usize {
        self.precalc.warm_spawn(center)
    }

    /// Carved voxels written by the last generation pass.
    pub fn carved_voxel_count(&self) -> usize {
        self.carved_voxels.load(Ordering::Relaxed)
    }

}
