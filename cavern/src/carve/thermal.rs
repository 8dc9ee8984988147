//! Thermal lakes, flat basins in a band below the sea level whose floors fill with water.

use crate::field::DensityField;
use crate::host::FluidKind;
use crate::noise::NoiseKind;

use super::shape::{carve_shape, shape_density, ShapeParams};
use super::{CarveContext, CarveError, Carver};


const PARAMS: ShapeParams = ShapeParams::new(0.0, -0.3);
const VARIATION: f32 = 0.05;
/// Lakes lie between these depths below the sea level.
const BAND_BOTTOM: i32 = 48;
const BAND_TOP: i32 = 16;
/// Carved voxels with solid ground within this many blocks below are flooded.
const FLOOD_DEPTH: usize = 2;


pub struct ThermalLakeCarver;

impl Carver for ThermalLakeCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::ThermalLake
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let a = ctx.primary(NoiseKind::ThermalLake)?;
        let b = ctx.sample(NoiseKind::ThermalLake, 1, 1.0, 1.0)?;
        let variation = ctx.sample(NoiseKind::ThermalLake, 2, 2.0, 2.0)?;

        let bottom = ctx.sea_level - BAND_BOTTOM;
        let top = ctx.sea_level - BAND_TOP;

        let carved = carve_shape(ctx, out, PARAMS, ctx.threshold_bias(NoiseKind::ThermalLake), |_, y, _, i| {
            let wy = ctx.world_y(y);
            (wy >= bottom && wy <= top).then(|| (shape_density(a[i], b[i]), variation[i] * VARIATION))
        });

        if carved == 0 {
            return Ok(());
        }

        let size = ctx.size();
        for y in 0..size {
            for z in 0..size {
                for x in 0..size {
                    if out.get(x, y, z) >= 0.0 {
                        continue;
                    }
                    // Voxels under the segment count as solid.
                    let grounded = (1..=FLOOD_DEPTH).any(|d| y < d || out.get(x, y - d, z) >= 0.0);
                    if grounded {
                        ctx.fluids.mark_fluid(ctx.origin.world(x, y, z), FluidKind::Water);
                    }
                }
            }
        }

        Ok(())

    }

}


#[cfg(test)]
mod tests {

    use glam::IVec3;

    use crate::config::CaveConfig;
    use crate::field::ChunkOrigin;
    use crate::host::FluidRegistry;
    use super::super::testing::{carved, Fixture};

    use super::*;

    #[test]
    fn lakes_stay_in_band_and_flood_their_floor() {

        let mut config = CaveConfig::only(&[NoiseKind::ThermalLake]);
        config.thermal_lake.threshold_bias = 3.0;
        let fixture = Fixture::new(config);

        // Band is [62, 94] with a sea level at 110.
        let origin = ChunkOrigin::new(IVec3::new(0, 64, 0), 32);
        let mut out = DensityField::solid(32);
        ThermalLakeCarver.carve(&fixture.context(origin), &mut out).unwrap();

        assert_eq!(carved(&out), 31 * 32 * 32);
        for z in 0..32 {
            for x in 0..32 {
                assert_eq!(out.get(x, 31, z), 1.0);
            }
        }

        // Everything is carved, so only the two bottom layers have solid ground below.
        assert_eq!(fixture.fluids.len(), 2 * 32 * 32);
        assert_eq!(fixture.fluids.fluid(IVec3::new(5, 65, 7)), Some(FluidKind::Water));
        assert_eq!(fixture.fluids.fluid(IVec3::new(5, 66, 7)), None);

        let origin = ChunkOrigin::new(IVec3::new(0, 128, 0), 32);
        let mut out = DensityField::solid(32);
        ThermalLakeCarver.carve(&fixture.context(origin), &mut out).unwrap();
        assert_eq!(carved(&out), 0);

    }

}
