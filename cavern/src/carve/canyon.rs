//! Canyons, deep narrow cuts following the zero lines of an XZ noise around the sea level.

use crate::field::DensityField;
use crate::noise::NoiseKind;

use super::shape::{carve_shape, shape_density, ShapeParams};
use super::{plane, ridge, CarveContext, CarveError, Carver};


/// Positive depth factor, canyons narrow as they go down.
const PARAMS: ShapeParams = ShapeParams::new(-0.6, 0.3);
const ROTATION_VARIATION: f32 = 0.05;
/// Canyons are cut within this distance of the sea level.
const SEA_BAND: i32 = 48;


pub struct CanyonCarver;

impl Carver for CanyonCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::Canyon
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let size = ctx.size();
        let a = ctx.primary(NoiseKind::Canyon)?;
        let b = ctx.sample(NoiseKind::Canyon, 1, 1.0, 0.5)?;
        let rotation = ctx.sample(NoiseKind::CanyonRotation, 0, 1.0, 1.0)?;

        let bottom = ctx.sea_level - SEA_BAND;
        let top = ctx.sea_level + SEA_BAND;

        carve_shape(ctx, out, PARAMS, ctx.threshold_bias(NoiseKind::Canyon), |x, y, z, i| {
            let wy = ctx.world_y(y);
            if wy < bottom || wy > top {
                return None;
            }
            let density = shape_density(ridge(plane(&a, size, x, z)), ridge(b[i]));
            Some((density, rotation[i] * ROTATION_VARIATION))
        });

        Ok(())

    }

}
