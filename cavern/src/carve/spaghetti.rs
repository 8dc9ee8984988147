//! Spaghetti tunnels. The 2D variant follows ridge lines of an XZ noise at a wandering
//! elevation, the 3D variant threads through the whole volume.

use crate::field::DensityField;
use crate::noise::NoiseKind;

use super::shape::{carve_shape, shape_density, ShapeParams};
use super::{plane, ridge, CarveContext, CarveError, Carver};


const PARAMS_2D: ShapeParams = ShapeParams::new(-0.6, -0.1);
const PARAMS_3D: ShapeParams = ShapeParams::new(-0.2, -0.25);

/// Tunnel centers wander this many blocks around their mean elevation.
const CENTER_SPREAD: f32 = 24.0;
/// Mean tunnel elevation, relative to the sea level.
const CENTER_DEPTH: i32 = 32;
const THICKNESS_MIN: f32 = 2.0;
const THICKNESS_SPREAD: f32 = 2.0;
const THICKNESS_VARIATION: f32 = 0.1;


/// Threshold variation from the roughness noise, rough walls where it is strong.
#[inline]
fn roughness(r: f32) -> f32 {
    (-0.05 - 0.05 * r) * (-0.4 + r.abs())
}


pub struct Spaghetti2DCarver;

impl Carver for Spaghetti2DCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::Spaghetti2D
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let size = ctx.size();
        let a = ctx.primary(NoiseKind::Spaghetti2D)?;
        let b = ctx.sample(NoiseKind::Spaghetti2D, 1, 1.0, 0.0)?;
        let center = ctx.sample(NoiseKind::Spaghetti2D, 2, 0.5, 0.0)?;
        let thickness = ctx.sample(NoiseKind::Spaghetti2D, 3, 2.0, 0.0)?;
        let rough = ctx.sample(NoiseKind::SpaghettiRoughness, 0, 1.0, 1.0)?;

        let mean = (ctx.sea_level - CENTER_DEPTH) as f32;

        carve_shape(ctx, out, PARAMS_2D, ctx.threshold_bias(NoiseKind::Spaghetti2D), |x, y, z, i| {
            let center_y = mean + plane(&center, size, x, z) * CENTER_SPREAD;
            let half = THICKNESS_MIN + (plane(&thickness, size, x, z) + 1.0) * THICKNESS_SPREAD;
            if (ctx.world_y(y) as f32 - center_y).abs() > half {
                return None;
            }
            let density = shape_density(ridge(plane(&a, size, x, z)), ridge(plane(&b, size, x, z)));
            Some((density, roughness(rough[i])))
        });

        Ok(())

    }

}


pub struct Spaghetti3DCarver;

impl Carver for Spaghetti3DCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::Spaghetti3D
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let a = ctx.primary(NoiseKind::Spaghetti3D)?;
        let b = ctx.sample(NoiseKind::Spaghetti3D, 1, 1.0, 1.0)?;
        let thickness = ctx.sample(NoiseKind::Spaghetti3D, 2, 2.0, 2.0)?;
        let rough = ctx.sample(NoiseKind::SpaghettiRoughness, 1, 1.0, 1.0)?;

        carve_shape(ctx, out, PARAMS_3D, ctx.threshold_bias(NoiseKind::Spaghetti3D), |_, _, _, i| {
            let variation = thickness[i] * THICKNESS_VARIATION + roughness(rough[i]);
            Some((shape_density(a[i], b[i]), variation))
        });

        Ok(())

    }

}
