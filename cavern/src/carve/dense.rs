//! Dense cave networks, many small chambers blended with the thermal lake field.

use crate::field::DensityField;
use crate::noise::NoiseKind;

use super::shape::{carve_shape, shape_density_scaled, ShapeParams};
use super::{CarveContext, CarveError, Carver};


const PARAMS: ShapeParams = ShapeParams::new(-0.05, -0.3);
const DENSE_WEIGHT: f32 = 0.7;
const THERMAL_WEIGHT: f32 = 0.3;
const VARIATION: f32 = 0.2;
const RADIUS_MODULATION: f32 = 0.25;


pub struct DenseCaveCarver;

impl Carver for DenseCaveCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::DenseCave
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let dense = ctx.primary(NoiseKind::DenseCave)?;
        let thermal = ctx.sample(NoiseKind::ThermalLake, 0, 1.0, 1.0)?;
        let b = ctx.sample(NoiseKind::DenseCave, 1, 1.0, 1.0)?;
        let variation = ctx.sample(NoiseKind::DenseCave, 2, 2.0, 2.0)?;
        let radius_h = ctx.sample(NoiseKind::DenseCaveRadiusHorizontal, 0, 1.0, 1.0)?;
        let radius_v = ctx.sample(NoiseKind::DenseCaveRadiusVertical, 0, 1.0, 1.0)?;

        carve_shape(ctx, out, PARAMS, ctx.threshold_bias(NoiseKind::DenseCave), |_, _, _, i| {
            let a = dense[i] * DENSE_WEIGHT + thermal[i] * THERMAL_WEIGHT;
            let factor_h = 1.0 + radius_h[i] * RADIUS_MODULATION;
            let factor_v = 1.0 + radius_v[i] * RADIUS_MODULATION;
            Some((shape_density_scaled(a, b[i], factor_h, factor_v), variation[i] * VARIATION))
        });

        Ok(())

    }

}


#[cfg(test)]
mod tests {

    use glam::IVec3;

    use crate::config::CaveConfig;
    use crate::field::ChunkOrigin;
    use super::super::testing::{carved, Fixture};

    use super::*;

    #[test]
    fn negative_bias_carves_nothing() {
        let mut config = CaveConfig::only(&[NoiseKind::DenseCave]);
        config.dense_cave.threshold_bias = -3.0;
        let fixture = Fixture::new(config);
        let origin = ChunkOrigin::new(IVec3::new(96, 0, 32), 32);
        let mut out = DensityField::solid(32);
        DenseCaveCarver.carve(&fixture.context(origin), &mut out).unwrap();
        assert_eq!(carved(&out), 0);
    }

}
