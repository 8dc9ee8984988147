//! Vein gaps, thin flattened fissures stretched along the horizontal plane.

use crate::field::DensityField;
use crate::noise::NoiseKind;

use super::shape::{carve_shape, shape_density, ShapeParams};
use super::{CarveContext, CarveError, Carver};


const PARAMS: ShapeParams = ShapeParams::new(-0.25, -0.2);
const VARIATION: f32 = 0.03;


pub struct VeinGapCarver;

impl Carver for VeinGapCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::VeinGap
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        // The primary field is stretched twice as much vertically.
        let a = ctx.primary(NoiseKind::VeinGap)?;
        let b = ctx.sample(NoiseKind::VeinGap, 1, 0.8, 0.4)?;
        let variation = ctx.sample(NoiseKind::VeinGap, 2, 0.05, 0.05)?;

        carve_shape(ctx, out, PARAMS, ctx.threshold_bias(NoiseKind::VeinGap), |_, _, _, i| {
            Some((shape_density(a[i], b[i]), variation[i] * VARIATION))
        });

        Ok(())

    }

}
