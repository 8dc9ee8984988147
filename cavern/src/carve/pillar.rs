//! Pillar halls, tall chambers stretched vertically so that unbroken columns of rock
//! remain between their voids.

use glam::IVec3;

use crate::field::{DensityField, VoxelCaveMask};
use crate::noise::NoiseKind;

use super::shape::{carve_shape, shape_density, ShapeParams};
use super::{CarveContext, CarveError, Carver};


const PARAMS: ShapeParams = ShapeParams::new(-0.15, -0.2);
const VARIATION: f32 = 0.03;
/// Horizontal distance to a river voxel when pillars follow rivers.
const RIVER_REACH: i32 = 2;


/// World layers where pillar halls may be carved.
#[inline]
fn in_pillar_band(wy: i32) -> bool {
    wy < 16 || (32..64).contains(&wy)
}

/// Return true if a river voxel lies within the horizontal reach of the given voxel, on
/// the same layer.
fn near_river(rivers: &VoxelCaveMask, x: usize, y: usize, z: usize) -> bool {
    let (x, y, z) = (x as i32, y as i32, z as i32);
    (-RIVER_REACH..=RIVER_REACH).any(|dz| {
        (-RIVER_REACH..=RIVER_REACH).any(|dx| rivers.get_signed(IVec3::new(x + dx, y, z + dz)))
    })
}


pub struct PillarCarver;

impl Carver for PillarCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::Pillar
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let rivers = if ctx.config.pillars_follow_rivers {
            match ctx.rivers() {
                Some(rivers) if rivers.count() > 0 => Some(rivers),
                _ => return Ok(()),
            }
        } else {
            None
        };

        let a = ctx.primary(NoiseKind::Pillar)?;
        let b = ctx.sample(NoiseKind::Pillar, 1, 15.0, 0.3)?;
        let variation = ctx.sample(NoiseKind::Pillar, 2, 0.05, 0.05)?;

        carve_shape(ctx, out, PARAMS, ctx.threshold_bias(NoiseKind::Pillar), |x, y, z, i| {
            if !in_pillar_band(ctx.world_y(y)) {
                return None;
            }
            if rivers.is_some_and(|rivers| !near_river(rivers, x, y, z)) {
                return None;
            }
            Some((shape_density(a[i], b[i]), variation[i] * VARIATION))
        });

        Ok(())

    }

}
