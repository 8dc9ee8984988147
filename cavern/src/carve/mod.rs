//! Cave carvers and the orchestration turning their outputs into carved voxels.
//!
//! Every carver style writes a contribution field for one cubic segment, where negative
//! values mean "carve". The [`MasterCarver`] folds the contributions of the styles that
//! pass their gates with an element-wise minimum, thresholds the result and repairs
//! small gaps with the [`CaveConnector`].

use std::cell::RefCell;

use thiserror::Error;

use crate::noise::{DensityFieldSampler, NoiseError, NoiseGrid, NoiseKind};
use crate::host::{BiomeTag, FluidRegistry, WorldView};
use crate::field::{calc_index, ChunkOrigin, DensityField, VoxelCaveMask};
use crate::config::CaveConfig;

pub mod shape;
pub mod gate;
pub mod bundle;
pub mod connect;
pub mod master;

pub mod cheese;
pub mod spaghetti;
pub mod vein;
pub mod dense;
pub mod thermal;
pub mod canyon;
pub mod river;
pub mod underground;
pub mod pillar;
pub mod entrance;

pub use bundle::{BundleKey, ColumnBundle};
pub use connect::{CaveConnector, BridgeNoise, SamplerBridge};
pub use gate::GateRoller;
pub use master::{MasterCarver, ColumnContext, ColumnOutcome, ColumnReport, SegmentReport};


/// Blended densities strictly below this value are carved.
pub const CARVE_THRESHOLD: f32 = 0.0;


/// Errors of a carving pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CarveError {
    #[error("noise: {0}")]
    Noise(#[from] NoiseError),
    #[error("invalid parameter: chunk size {chunk_size} with world height {height}")]
    InvalidColumn { chunk_size: usize, height: i32 },
}


/// A cave style, turning noise into a contribution for one segment.
pub trait Carver: Send + Sync {

    /// The primary noise kind of this style, also used for its flags and gates.
    fn kind(&self) -> NoiseKind;

    /// Write this style's contribution into the given field, initially all solid. A
    /// value below zero carves the voxel.
    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError>;

}


/// Everything a carver may read while carving one segment.
pub struct CarveContext<'a> {
    pub origin: ChunkOrigin,
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub world: &'a dyn WorldView,
    pub sea_level: i32,
    pub height: i32,
    pub biome: BiomeTag,
    pub config: &'a CaveConfig,
    pub sampler: &'a DensityFieldSampler,
    pub fluids: &'a dyn FluidRegistry,
    /// Precomputed primary fields of this column, if cached.
    bundle: Option<&'a ColumnBundle>,
    /// Collects freshly sampled primary fields to warm the cache.
    fresh: Option<&'a RefCell<ColumnBundle>>,
    /// Voxels already carved by river styles in this segment.
    rivers: Option<&'a VoxelCaveMask>,
}

impl<'a> CarveContext<'a> {

    #[inline]
    pub fn size(&self) -> usize {
        self.origin.size
    }

    #[inline]
    pub fn rivers(&self) -> Option<&'a VoxelCaveMask> {
        self.rivers
    }

    /// The primary field of a style for this segment, taken from the cached bundle when
    /// available.
    pub fn primary(&self, kind: NoiseKind) -> Result<NoiseGrid, NoiseError> {

        let key = BundleKey::new(kind, self.origin.pos.y);
        if let Some(grid) = self.bundle.and_then(|bundle| bundle.get(key)) {
            return Ok(NoiseGrid::clone(grid));
        }

        let grid = bundle::sample_primary(self.sampler, kind, self.origin)?;
        if let Some(fresh) = self.fresh {
            fresh.borrow_mut().insert(key, NoiseGrid::clone(&grid));
        }

        Ok(grid)

    }

    /// Any other field of this segment.
    #[inline]
    pub fn sample(&self, kind: NoiseKind, call_seed: i64, xz_scale: f32, y_scale: f32) -> Result<NoiseGrid, NoiseError> {
        self.sampler.sample_grid(kind, self.origin, xz_scale, y_scale, call_seed)
    }

    /// Depth weight of a local layer, 0 at the world top and 1 at its bottom.
    #[inline]
    pub fn depth_weight(&self, y: usize) -> f32 {
        1.0 - (self.origin.pos.y + y as i32) as f32 / self.height as f32
    }

    #[inline]
    pub fn world_y(&self, y: usize) -> i32 {
        self.origin.pos.y + y as i32
    }

    /// River probability multiplier of this column's biome.
    pub fn wet_multiplier(&self) -> f32 {
        match self.biome {
            BiomeTag::Wet => self.config.wet_biome_river_multiplier,
            _ => 1.0,
        }
    }

    #[inline]
    pub fn threshold_bias(&self, kind: NoiseKind) -> f32 {
        self.config.threshold_bias(kind)
    }

}


/// Value at a local column of a field sampled with a zero Y scale, every layer holds
/// the same XZ plane.
#[inline]
pub fn plane(grid: &[f32], size: usize, x: usize, z: usize) -> f32 {
    grid[calc_index(size, x, 0, z)]
}

/// Ridged transform of a noise value, -1 along the zero crossings of the noise and
/// growing away from them, used to shape path centerlines.
#[inline]
pub fn ridge(value: f32) -> f32 {
    value.abs() * 2.0 - 1.0
}

/// The carvers in registration order, surface styles first, then underground styles
/// with rivers, canyons and pillars last.
pub fn default_carvers() -> Vec<Box<dyn Carver>> {
    vec![
        Box::new(river::SurfaceRiverCarver),
        Box::new(cheese::CheeseCarver),
        Box::new(spaghetti::Spaghetti2DCarver),
        Box::new(spaghetti::Spaghetti3DCarver),
        Box::new(vein::VeinGapCarver),
        Box::new(dense::DenseCaveCarver),
        Box::new(thermal::ThermalLakeCarver),
        Box::new(canyon::CanyonCarver),
        Box::new(underground::UndergroundRiverCarver),
        Box::new(river::LavaRiverCarver),
        Box::new(pillar::PillarCarver),
    ]
}




#[cfg(test)]
mod tests {

    use glam::IVec3;

    use super::*;
    use super::testing::Fixture;

    #[test]
    fn ridge_range() {
        assert_eq!(ridge(0.0), -1.0);
        assert_eq!(ridge(0.5), 0.0);
        assert_eq!(ridge(-1.0), 1.0);
    }

    #[test]
    fn registration_order() {
        let kinds: Vec<_> = default_carvers().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds.first(), Some(&NoiseKind::SurfaceRiver));
        let position = |kind| kinds.iter().position(|&k| k == kind).unwrap();
        assert!(position(NoiseKind::Canyon) < position(NoiseKind::UndergroundRiver));
        assert!(position(NoiseKind::UndergroundRiver) < position(NoiseKind::Pillar));
        assert!(position(NoiseKind::LavaRiver) < position(NoiseKind::Pillar));
        assert_eq!(kinds.last(), Some(&NoiseKind::Pillar));
    }

    #[test]
    fn context_primary_collects_fresh_fields() {
        let fixture = Fixture::new(CaveConfig::default());
        let origin = ChunkOrigin::new(IVec3::new(0, 64, 0), 16);
        let fresh = RefCell::new(ColumnBundle::new(0, 0));
        let mut ctx = fixture.context(origin);
        ctx.fresh = Some(&fresh);
        let grid = ctx.primary(NoiseKind::Cheese).unwrap();
        assert_eq!(fresh.borrow().get(BundleKey::new(NoiseKind::Cheese, 64)), Some(&grid));

        // A cached bundle takes precedence over sampling.
        let mut cached = ColumnBundle::new(0, 0);
        let fake: NoiseGrid = vec![0.25; 16 * 16 * 16].into();
        cached.insert(BundleKey::new(NoiseKind::Cheese, 64), NoiseGrid::clone(&fake));
        let mut ctx = fixture.context(origin);
        ctx.bundle = Some(&cached);
        assert_eq!(ctx.primary(NoiseKind::Cheese).unwrap(), fake);
    }

    #[test]
    fn depth_weight_and_wet_multiplier() {
        let fixture = Fixture::new(CaveConfig::default());
        let mut ctx = fixture.context(ChunkOrigin::new(IVec3::new(0, 128, 0), 32));
        assert_eq!(ctx.depth_weight(0), 0.5);
        assert_eq!(ctx.wet_multiplier(), 1.0);
        ctx.biome = BiomeTag::Wet;
        assert_eq!(ctx.wet_multiplier(), 1.5);
    }

}
