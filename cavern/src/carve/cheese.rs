//! Cheese caverns, large open chambers whose extent is modulated by two radius fields.

use crate::field::DensityField;
use crate::noise::NoiseKind;

use super::shape::{carve_shape, shape_density_scaled, ShapeParams};
use super::{CarveContext, CarveError, Carver};


const PARAMS: ShapeParams = ShapeParams::new(0.0, -0.3);
const VARIATION: f32 = 0.1;
const RADIUS_MODULATION: f32 = 0.2;


pub struct CheeseCarver;

impl Carver for CheeseCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::Cheese
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let a = ctx.primary(NoiseKind::Cheese)?;
        let b = ctx.sample(NoiseKind::Cheese, 1, 1.0, 1.0)?;
        let variation = ctx.sample(NoiseKind::Cheese, 2, 4.0, 4.0)?;
        let radius_h = ctx.sample(NoiseKind::CheeseRadiusHorizontal, 0, 1.0, 1.0)?;
        let radius_v = ctx.sample(NoiseKind::CheeseRadiusVertical, 0, 1.0, 1.0)?;

        carve_shape(ctx, out, PARAMS, ctx.threshold_bias(NoiseKind::Cheese), |_, _, _, i| {
            let factor_h = 1.0 + radius_h[i] * RADIUS_MODULATION;
            let factor_v = 1.0 + radius_v[i] * RADIUS_MODULATION;
            Some((shape_density_scaled(a[i], b[i], factor_h, factor_v), variation[i] * VARIATION))
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
    fn deterministic_and_top_layers_solid() {

        let mut config = CaveConfig::only(&[NoiseKind::Cheese]);
        config.cheese.threshold_bias = 0.3;
        let fixture = Fixture::new(config);

        // The top of this segment reaches the layers that are never carved.
        let origin = ChunkOrigin::new(IVec3::new(0, 224, 32), 32);
        let mut first = DensityField::solid(32);
        let mut second = DensityField::solid(32);
        CheeseCarver.carve(&fixture.context(origin), &mut first).unwrap();
        CheeseCarver.carve(&fixture.context(origin), &mut second).unwrap();
        assert_eq!(first, second);

        for y in 7..32 {
            for z in 0..32 {
                for x in 0..32 {
                    assert_eq!(first.get(x, y, z), 1.0);
                }
            }
        }

        assert!(carved(&first) <= 7 * 32 * 32);

    }

    #[test]
    fn golden_count_at_origin() {

        // Recorded for the fixture seed 20240611, sea level 110 and world height 256.
        let mut config = CaveConfig::only(&[NoiseKind::Cheese]);
        config.cheese.probability = 1.0;
        config.cheese.threshold_bias = 0.0;
        let fixture = Fixture::new(config);

        let origin = ChunkOrigin::new(IVec3::ZERO, 32);
        let mut out = DensityField::solid(32);
        CheeseCarver.carve(&fixture.context(origin), &mut out).unwrap();
        assert_eq!(carved(&out), 22224);

        let layer = |y: usize| (0..32 * 32).filter(|&i| out.get(i % 32, y, i / 32) < 0.0).count();
        assert_eq!(layer(0), 529);
        assert_eq!(layer(31), 621);

    }

    #[test]
    fn huge_bias_carves_everything_below_the_top() {
        let mut config = CaveConfig::only(&[NoiseKind::Cheese]);
        config.cheese.threshold_bias = 3.0;
        let fixture = Fixture::new(config);
        let origin = ChunkOrigin::new(IVec3::new(-32, 0, 0), 32);
        let mut out = DensityField::solid(32);
        CheeseCarver.carve(&fixture.context(origin), &mut out).unwrap();
        assert_eq!(carved(&out), 32 * 32 * 32);
    }

}
