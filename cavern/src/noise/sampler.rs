//! Density field sampler, evaluates pooled noise generators over a cubic chunk region
//! or at single points.
//!
//! In coarse mode a grid of `(size / 8)^3` points is evaluated, one every 8 voxels along
//! each axis, and the full resolution field is reconstructed by trilinear interpolation.
//! This is lossy compared to the direct mode, but values at voxels lying on the coarse
//! grid are exactly the directly evaluated ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::collections::HashMap;
use std::cell::RefCell;

use glam::{DVec3, IVec3};
use indexmap::IndexMap;

use crate::field::{ChunkOrigin, calc_index, MAX_CHUNK_SIZE};

use super::{NoiseGeneratorPool, NoiseKind, NoiseError, InvalidParameter};


/// Distance in voxels between two coarse grid samples.
pub const COARSE_STRIDE: usize = 8;

/// A shared, immutable cubic noise grid, indexed with [`calc_index`].
pub type NoiseGrid = Arc<[f32]>;


/// Strategy used to fill a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Coarse grid plus trilinear interpolation.
    #[default]
    Coarse,
    /// Every voxel evaluated directly, used as a reference.
    Direct,
}


/// Key of the LRU of full grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GridKey {
    origin: IVec3,
    size: usize,
    kind: NoiseKind,
    seed: i64,
}

/// Key of the per-thread cache of coarse grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SparseKey {
    sampler: u64,
    origin: IVec3,
    sparse: usize,
    /// Bits of the per-axis steps, xz then y.
    step: (u64, u64),
    seed: i64,
}

thread_local! {
    /// Coarse grids computed by the current thread. Keys include the id of the sampler
    /// so that separate samplers never observe each other's entries.
    static SPARSE_CACHE: RefCell<HashMap<SparseKey, Arc<[f32]>>> = RefCell::new(HashMap::new());
}

static NEXT_SAMPLER_ID: AtomicU64 = AtomicU64::new(0);


/// Samples noise fields with deterministic seeding derived from the world seed.
pub struct DensityFieldSampler {
    pool: Arc<NoiseGeneratorPool>,
    /// Unique id, part of the thread-local cache keys.
    id: u64,
    world_seed: i64,
    sea_level: i32,
    mode: SamplingMode,
    /// Recently used grids of the heavily reused kinds, most recent last.
    grid_cache: Mutex<IndexMap<GridKey, NoiseGrid>>,
    grid_cache_limit: usize,
    sparse_cache_limit: usize,
}

impl DensityFieldSampler {

    pub fn new(pool: Arc<NoiseGeneratorPool>, world_seed: i64, sea_level: i32) -> Self {
        Self {
            pool,
            id: NEXT_SAMPLER_ID.fetch_add(1, Ordering::Relaxed),
            world_seed,
            sea_level,
            mode: SamplingMode::Coarse,
            grid_cache: Mutex::new(IndexMap::new()),
            grid_cache_limit: 1000,
            sparse_cache_limit: 100,
        }
    }

    pub fn with_mode(mut self, mode: SamplingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the entry limits of the grid LRU and of the per-thread coarse cache.
    pub fn with_cache_limits(mut self, grid: usize, sparse: usize) -> Self {
        self.grid_cache_limit = grid;
        self.sparse_cache_limit = sparse;
        self
    }

    #[inline]
    pub fn pool(&self) -> &NoiseGeneratorPool {
        &self.pool
    }

    #[inline]
    pub fn world_seed(&self) -> i64 {
        self.world_seed
    }

    #[inline]
    pub fn sea_level(&self) -> i32 {
        self.sea_level
    }

    #[inline]
    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Effective seed of a sample: world seed, plus the kind's offset, plus the caller's
    /// own seed.
    #[inline]
    pub fn effective_seed(&self, kind: NoiseKind, call_seed: i64) -> i64 {
        self.world_seed
            .wrapping_add(kind.params().seed_offset)
            .wrapping_add(call_seed)
    }

    /// Number of grids currently held by the LRU.
    pub fn cached_grids(&self) -> usize {
        self.grid_cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sample a whole cubic region. The voxel `v` of the region is evaluated at noise
    /// coordinates `(origin + v) * (xz_scale, y_scale, xz_scale) * frequency`, a zero Y
    /// scale therefore gives the same XZ plane on every layer.
    pub fn sample_grid(&self,
        kind: NoiseKind,
        origin: ChunkOrigin,
        xz_scale: f32,
        y_scale: f32,
        call_seed: i64,
    ) -> Result<NoiseGrid, NoiseError> {

        let size = origin.size;
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(InvalidParameter::ChunkSize(size).into());
        }

        let frequency = kind.params().frequency;
        if !frequency.is_finite() || frequency <= 0.0 || frequency > 1.0 {
            return Err(InvalidParameter::Frequency(frequency).into());
        }

        if !xz_scale.is_finite() || !y_scale.is_finite() {
            return Err(InvalidParameter::Scale { xz: xz_scale, y: y_scale }.into());
        }

        if !self.pool.is_registered(kind) {
            return Err(NoiseError::Configuration(kind));
        }

        let seed = self.effective_seed(kind, call_seed);
        let key = GridKey { origin: origin.pos, size, kind, seed };

        if kind.is_grid_cached() {
            let mut cache = self.grid_cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(index) = cache.get_index_of(&key) {
                let last = cache.len() - 1;
                cache.move_index(index, last);
                return Ok(Arc::clone(&cache[last]));
            }
        }

        let step = DVec3::new(
            xz_scale as f64 * frequency as f64,
            y_scale as f64 * frequency as f64,
            xz_scale as f64 * frequency as f64,
        );

        let mut values = match self.mode {
            SamplingMode::Coarse => self.interpolate(kind, origin, step, seed)?,
            SamplingMode::Direct => self.direct(kind, origin, step, seed)?,
        };

        self.apply_deep_scale(kind, origin, &mut values);
        let grid: NoiseGrid = values.into();

        if kind.is_grid_cached() && self.grid_cache_limit > 0 {
            let mut cache = self.grid_cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.insert(key, Arc::clone(&grid));
            while cache.len() > self.grid_cache_limit {
                cache.shift_remove_index(0);
            }
        }

        Ok(grid)

    }

    /// Sample a single point at world coordinates, without any grid or cache.
    pub fn sample_point(&self, kind: NoiseKind, x: i32, y: i32, z: i32, call_seed: i64) -> Result<f32, NoiseError> {

        let frequency = kind.params().frequency as f64;
        let seed = self.effective_seed(kind, call_seed);
        let pos = DVec3::new(x as f64 * frequency, y as f64 * frequency, z as f64 * frequency);

        let value = self.pool.rent(kind)?.point(seed, pos);
        Ok(value * self.deep_factor(kind, y))

    }

    #[inline]
    fn deep_factor(&self, kind: NoiseKind, world_y: i32) -> f32 {
        if world_y < self.sea_level { kind.deep_scale() } else { 1.0 }
    }

    fn apply_deep_scale(&self, kind: NoiseKind, origin: ChunkOrigin, values: &mut [f32]) {

        if kind.deep_scale() == 1.0 {
            return;
        }

        let layer = origin.size * origin.size;
        for (y, chunk) in values.chunks_mut(layer).enumerate() {
            let factor = self.deep_factor(kind, origin.pos.y + y as i32);
            if factor != 1.0 {
                chunk.iter_mut().for_each(|v| *v *= factor);
            }
        }

    }

    fn direct(&self, kind: NoiseKind, origin: ChunkOrigin, step: DVec3, seed: i64) -> Result<Vec<f32>, NoiseError> {
        let size = origin.size;
        let mut values = vec![0.0; size * size * size];
        self.pool.rent(kind)?.grid(seed, origin.pos.as_dvec3(), 1.0, step, [size; 3], &mut values);
        Ok(values)
    }

    /// Get the coarse grid, from this thread's cache if possible.
    fn coarse(&self, kind: NoiseKind, origin: ChunkOrigin, sparse: usize, step: DVec3, seed: i64) -> Result<Arc<[f32]>, NoiseError> {

        let key = SparseKey {
            sampler: self.id,
            origin: origin.pos,
            sparse,
            step: (step.x.to_bits(), step.y.to_bits()),
            seed,
        };

        if let Some(hit) = SPARSE_CACHE.with(|cache| cache.borrow().get(&key).cloned()) {
            return Ok(hit);
        }

        let mut values = vec![0.0; sparse * sparse * sparse];
        self.pool.rent(kind)?.grid(seed, origin.pos.as_dvec3(), COARSE_STRIDE as f64, step, [sparse; 3], &mut values);
        let values: Arc<[f32]> = values.into();

        SPARSE_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            if cache.len() >= self.sparse_cache_limit {
                cache.clear();
            }
            if self.sparse_cache_limit > 0 {
                cache.insert(key, Arc::clone(&values));
            }
        });

        Ok(values)

    }

    fn interpolate(&self, kind: NoiseKind, origin: ChunkOrigin, step: DVec3, seed: i64) -> Result<Vec<f32>, NoiseError> {

        let size = origin.size;
        let sparse = (size / COARSE_STRIDE).max(1);
        let coarse = self.coarse(kind, origin, sparse, step, seed)?;

        // Lower and upper coarse indices and the weight along one axis, identical for
        // the three axes.
        let axis: Vec<(usize, usize, f32)> = (0..size)
            .map(|v| {
                let f = v as f32 / COARSE_STRIDE as f32;
                let i0 = (f.floor() as usize).min(sparse - 1);
                let i1 = (i0 + 1).min(sparse - 1);
                (i0, i1, f - i0 as f32)
            })
            .collect();

        let at = |x: usize, y: usize, z: usize| coarse[(y * sparse + z) * sparse + x];

        let mut values = vec![0.0; size * size * size];
        for (y, &(y0, y1, ty)) in axis.iter().enumerate() {
            for (z, &(z0, z1, tz)) in axis.iter().enumerate() {
                for (x, &(x0, x1, tx)) in axis.iter().enumerate() {
                    let c00 = lerp(at(x0, y0, z0), at(x1, y0, z0), tx);
                    let c10 = lerp(at(x0, y1, z0), at(x1, y1, z0), tx);
                    let c01 = lerp(at(x0, y0, z1), at(x1, y0, z1), tx);
                    let c11 = lerp(at(x0, y1, z1), at(x1, y1, z1), tx);
                    let c0 = lerp(c00, c10, ty);
                    let c1 = lerp(c01, c11, ty);
                    values[calc_index(size, x, y, z)] = lerp(c0, c1, tz);
                }
            }
        }

        Ok(values)

    }

}

#[inline]
fn lerp(from: f32, to: f32, factor: f32) -> f32 {
    from + (to - from) * factor
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::noise::PoolLimits;

    fn sampler(mode: SamplingMode) -> DensityFieldSampler {
        let pool = Arc::new(NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(4, 8)));
        DensityFieldSampler::new(pool, 12345, 64).with_mode(mode)
    }

    #[test]
    fn seed_derivation() {
        let sampler = sampler(SamplingMode::Coarse);
        assert_eq!(sampler.effective_seed(NoiseKind::Cheese, 0), 12345 + 6);
        assert_eq!(sampler.effective_seed(NoiseKind::CaveEntrance, 3), 12345 + 18 + 3);
    }

    #[test]
    fn invalid_parameters() {
        let sampler = sampler(SamplingMode::Coarse);
        let zero = ChunkOrigin::new(IVec3::ZERO, 0);
        let huge = ChunkOrigin::new(IVec3::ZERO, 513);
        let ok = ChunkOrigin::new(IVec3::ZERO, 16);
        assert_eq!(sampler.sample_grid(NoiseKind::Pillar, zero, 1.0, 1.0, 0).unwrap_err(),
            NoiseError::InvalidParameter(InvalidParameter::ChunkSize(0)));
        assert_eq!(sampler.sample_grid(NoiseKind::Pillar, huge, 1.0, 1.0, 0).unwrap_err(),
            NoiseError::InvalidParameter(InvalidParameter::ChunkSize(513)));
        assert!(matches!(sampler.sample_grid(NoiseKind::Pillar, ok, f32::NAN, 1.0, 0),
            Err(NoiseError::InvalidParameter(InvalidParameter::Scale { .. }))));
    }

    #[test]
    fn unregistered_kind_propagates() {
        let pool = Arc::new(NoiseGeneratorPool::new([NoiseKind::Cheese], PoolLimits::fixed(1, 1)));
        let sampler = DensityFieldSampler::new(pool, 0, 64);
        let origin = ChunkOrigin::new(IVec3::ZERO, 8);
        assert_eq!(sampler.sample_grid(NoiseKind::Canyon, origin, 1.0, 1.0, 0).unwrap_err(),
            NoiseError::Configuration(NoiseKind::Canyon));
        assert_eq!(sampler.sample_point(NoiseKind::Canyon, 0, 0, 0, 0).unwrap_err(),
            NoiseError::Configuration(NoiseKind::Canyon));
    }

    #[test]
    fn coarse_matches_direct_on_coarse_points() {

        let coarse = sampler(SamplingMode::Coarse);
        let direct = sampler(SamplingMode::Direct);

        // The sea level cuts through the region so that deep scaling is involved.
        let origin = ChunkOrigin::new(IVec3::new(-64, 48, 96), 32);
        for kind in [NoiseKind::Cheese, NoiseKind::Pillar, NoiseKind::Spaghetti2D] {

            let a = coarse.sample_grid(kind, origin, 1.0, 1.0, 7).unwrap();
            let b = direct.sample_grid(kind, origin, 1.0, 1.0, 7).unwrap();
            assert_eq!(a.len(), 32 * 32 * 32);

            let mut max_error = 0.0f32;
            for y in 0..32 {
                for z in 0..32 {
                    for x in 0..32 {
                        let index = calc_index(32, x, y, z);
                        if x % 8 == 0 && y % 8 == 0 && z % 8 == 0 {
                            assert_eq!(a[index], b[index], "{kind} at {x}/{y}/{z}");
                            let point = coarse.sample_point(kind,
                                origin.pos.x + x as i32,
                                origin.pos.y + y as i32,
                                origin.pos.z + z as i32, 7).unwrap();
                            assert_eq!(a[index], point);
                        }
                        max_error = max_error.max((a[index] - b[index]).abs());
                    }
                }
            }

            assert!(max_error < 2.0, "{kind} error {max_error}");

        }

    }

    #[test]
    fn zero_y_scale_gives_planes() {
        let sampler = sampler(SamplingMode::Coarse);
        let origin = ChunkOrigin::new(IVec3::new(0, 96, 0), 16);
        let grid = sampler.sample_grid(NoiseKind::Canyon, origin, 1.0, 0.0, 0).unwrap();
        for y in 1..16 {
            for z in 0..16 {
                for x in 0..16 {
                    assert_eq!(grid[calc_index(16, x, y, z)], grid[calc_index(16, x, 0, z)]);
                }
            }
        }
    }

    #[test]
    fn grid_lru() {

        let pool = Arc::new(NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(2, 2)));
        let sampler = DensityFieldSampler::new(pool, 1, 64).with_cache_limits(2, 0);
        let origin = |x: i32| ChunkOrigin::new(IVec3::new(x, 0, 0), 8);

        let first = sampler.sample_grid(NoiseKind::Cheese, origin(0), 1.0, 1.0, 0).unwrap();
        let again = sampler.sample_grid(NoiseKind::Cheese, origin(0), 1.0, 1.0, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // Not a cached kind.
        let a = sampler.sample_grid(NoiseKind::Pillar, origin(0), 1.0, 1.0, 0).unwrap();
        let b = sampler.sample_grid(NoiseKind::Pillar, origin(0), 1.0, 1.0, 0).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);

        sampler.sample_grid(NoiseKind::Cheese, origin(8), 1.0, 1.0, 0).unwrap();
        // Touch the first one so that the second is the least recently used.
        sampler.sample_grid(NoiseKind::Cheese, origin(0), 1.0, 1.0, 0).unwrap();
        sampler.sample_grid(NoiseKind::Cheese, origin(16), 1.0, 1.0, 0).unwrap();
        assert_eq!(sampler.cached_grids(), 2);

        let kept = sampler.sample_grid(NoiseKind::Cheese, origin(0), 1.0, 1.0, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &kept));

    }

    #[test]
    fn independent_samplers_agree() {
        let a = sampler(SamplingMode::Coarse);
        let b = sampler(SamplingMode::Coarse);
        let origin = ChunkOrigin::new(IVec3::new(32, 0, -32), 32);
        assert_eq!(
            a.sample_grid(NoiseKind::VeinGap, origin, 0.8, 0.4, 3).unwrap(),
            b.sample_grid(NoiseKind::VeinGap, origin, 0.8, 0.4, 3).unwrap(),
        );
    }

}
