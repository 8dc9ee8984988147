//! Probabilistic repair of one-voxel gaps between carved regions.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use glam::IVec3;

use crate::field::{ChunkOrigin, VoxelCaveMask};
use crate::noise::{DensityFieldSampler, NoiseError, NoiseKind};


/// Bridging noise samples above this value carve their gap.
pub const DEFAULT_BRIDGE_THRESHOLD: f32 = 0.8;


/// A noise field evaluated at the world position of a gap.
pub trait BridgeNoise {
    fn sample(&self, pos: IVec3) -> Result<f32, NoiseError>;
}

impl<F: Fn(IVec3) -> f32> BridgeNoise for F {
    #[inline]
    fn sample(&self, pos: IVec3) -> Result<f32, NoiseError> {
        Ok(self(pos))
    }
}


/// Bridging noise backed by the cheese noise, separately seeded and sampled on a grid
/// ten times coarser than the world. Samples are memoized per coarse cell.
pub struct SamplerBridge<'a> {
    sampler: &'a DensityFieldSampler,
    memo: RefCell<HashMap<IVec3, f32>>,
}

impl<'a> SamplerBridge<'a> {

    const KIND: NoiseKind = NoiseKind::Cheese;
    const SEED: i64 = 3;
    /// Width of a memoized cell, in voxels.
    const CELL: i32 = 10;

    pub fn new(sampler: &'a DensityFieldSampler) -> Self {
        Self { sampler, memo: RefCell::new(HashMap::new()) }
    }

}

impl BridgeNoise for SamplerBridge<'_> {

    fn sample(&self, pos: IVec3) -> Result<f32, NoiseError> {

        let cell = pos.div_euclid(IVec3::splat(Self::CELL));
        if let Some(&value) = self.memo.borrow().get(&cell) {
            return Ok(value);
        }

        let value = self.sampler.sample_point(Self::KIND, cell.x, cell.y, cell.z, Self::SEED)?;
        self.memo.borrow_mut().insert(cell, value);
        Ok(value)

    }

}


/// Fills uncarved voxels lying exactly between two carved voxels, in any of the 26
/// directions, when the bridging noise at the gap is high enough.
#[derive(Debug, Clone, Copy)]
pub struct CaveConnector {
    pub threshold: f32,
}

impl Default for CaveConnector {
    fn default() -> Self {
        Self { threshold: DEFAULT_BRIDGE_THRESHOLD }
    }
}

impl CaveConnector {

    /// Find every gap of the mask, local coordinates sorted by Y, Z then X.
    pub fn find_gaps(mask: &VoxelCaveMask) -> BTreeSet<(usize, usize, usize)> {

        let mut gaps = BTreeSet::new();

        for (x, y, z) in mask.iter_carved() {
            let pos = IVec3::new(x as i32, y as i32, z as i32);
            for dy in -1..=1 {
                for dz in -1..=1 {
                    for dx in -1..=1 {
                        let dir = IVec3::new(dx, dy, dz);
                        if dir == IVec3::ZERO {
                            continue;
                        }
                        let mid = pos + dir;
                        if mask.get_signed(pos + dir * 2) && !mask.get_signed(mid) {
                            gaps.insert((mid.y as usize, mid.z as usize, mid.x as usize));
                        }
                    }
                }
            }
        }

        gaps

    }

    /// Carve the gaps of the mask whose bridging noise exceeds the threshold. Gaps are
    /// searched before any of them is carved, so a bridge never creates another one in
    /// the same pass. Returns the number of carved gaps.
    pub fn connect(&self, mask: &mut VoxelCaveMask, origin: ChunkOrigin, noise: &dyn BridgeNoise) -> Result<usize, NoiseError> {

        let mut bridges = Vec::new();
        for (y, z, x) in Self::find_gaps(mask) {
            if noise.sample(origin.world(x, y, z))? > self.threshold {
                bridges.push((x, y, z));
            }
        }

        for &(x, y, z) in &bridges {
            mask.set(x, y, z, true);
        }

        Ok(bridges.len())

    }

}


#[cfg(test)]
mod tests {

    use std::sync::Arc;

    use crate::noise::{NoiseGeneratorPool, PoolLimits};

    use super::*;

    #[test]
    fn bridges_a_single_gap() {

        let mut mask = VoxelCaveMask::new(8);
        mask.set(2, 3, 3, true);
        mask.set(4, 3, 3, true);

        let origin = ChunkOrigin::new(IVec3::new(16, 0, -8), 8);
        let high = |_pos: IVec3| 0.9f32;
        assert_eq!(CaveConnector::default().connect(&mut mask, origin, &high).unwrap(), 1);

        assert!(mask.get(2, 3, 3) && mask.get(3, 3, 3) && mask.get(4, 3, 3));
        assert_eq!(mask.count(), 3);

    }

    #[test]
    fn low_noise_leaves_gap() {
        let mut mask = VoxelCaveMask::new(8);
        mask.set(2, 2, 2, true);
        mask.set(4, 4, 4, true);
        let low = |_pos: IVec3| 0.8f32;
        let origin = ChunkOrigin::new(IVec3::ZERO, 8);
        assert_eq!(CaveConnector::default().connect(&mut mask, origin, &low).unwrap(), 0);
        assert!(!mask.get(3, 3, 3));
    }

    #[test]
    fn diagonal_gaps_and_world_positions() {

        let mut mask = VoxelCaveMask::new(8);
        mask.set(1, 1, 1, true);
        mask.set(3, 3, 3, true);
        // Not a gap, the voxels are adjacent.
        mask.set(6, 6, 6, true);
        mask.set(7, 6, 6, true);

        assert_eq!(CaveConnector::find_gaps(&mask).into_iter().collect::<Vec<_>>(), vec![(2, 2, 2)]);

        let origin = ChunkOrigin::new(IVec3::new(100, 0, 0), 8);
        let only_at = |pos: IVec3| if pos == IVec3::new(102, 2, 2) { 1.0f32 } else { 0.0 };
        assert_eq!(CaveConnector::default().connect(&mut mask, origin, &only_at).unwrap(), 1);
        assert!(mask.get(2, 2, 2));

    }

    #[test]
    fn sampler_bridge_memoizes_cells() {
        let pool = Arc::new(NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(2, 4)));
        let sampler = DensityFieldSampler::new(pool, 42, 64);
        let bridge = SamplerBridge::new(&sampler);
        let a = bridge.sample(IVec3::new(11, 70, 12)).unwrap();
        let b = bridge.sample(IVec3::new(19, 79, 15)).unwrap();
        assert_eq!(a, b);
        assert_eq!(bridge.memo.borrow().len(), 1);
        assert_eq!(a, sampler.sample_point(NoiseKind::Cheese, 1, 7, 1, 3).unwrap());
    }

    #[test]
    fn sampler_bridge_cells_across_zero() {
        let pool = Arc::new(NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(2, 4)));
        let sampler = DensityFieldSampler::new(pool, 42, 64);
        let bridge = SamplerBridge::new(&sampler);
        for x in [-11, -10, -1, 0, 9] {
            bridge.sample(IVec3::new(x, 0, 0)).unwrap();
        }
        let memo = bridge.memo.borrow();
        assert_eq!(memo.len(), 3);
        for x in [-2, -1, 0] {
            assert!(memo.contains_key(&IVec3::new(x, 0, 0)));
        }
    }

}
