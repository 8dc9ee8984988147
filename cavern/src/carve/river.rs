//! Surface rivers winding across the terrain and lava rivers flowing deep underground.

use tracing::debug;

use crate::field::DensityField;
use crate::host::FluidKind;
use crate::noise::NoiseKind;

use super::shape::{carve_shape, shape_density, ShapeParams};
use super::{plane, ridge, CarveContext, CarveError, Carver};


/// Surface rivers only carve segments based in this world Y range.
const SURFACE_SEGMENT_MIN: i32 = 100;
const SURFACE_SEGMENT_MAX: i32 = 150;
/// Blocks carved below the top of a surface river channel.
const SURFACE_DEPTH: i32 = 2;

const LAVA_PARAMS: ShapeParams = ShapeParams::new(-0.5, 0.0);
/// Mean lava floor below the sea level, and its spread.
const LAVA_FLOOR_DEPTH: i32 = 60;
const LAVA_FLOOR_SPREAD: f32 = 6.0;
/// Channel height above the floor, and the lava-filled layers.
const LAVA_CHANNEL_HEIGHT: i32 = 4;
const LAVA_FILL_HEIGHT: i32 = 2;


/// A single river crossing the column along X, its center winding in Z. The channel is
/// cut right under the terrain surface and its bottom is filled with water.
pub struct SurfaceRiverCarver;

impl Carver for SurfaceRiverCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::SurfaceRiver
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let y_base = ctx.origin.pos.y;
        if !(SURFACE_SEGMENT_MIN..=SURFACE_SEGMENT_MAX).contains(&y_base) {
            return Ok(());
        }

        let size = ctx.size();
        let s = size as i32;
        let noise = ctx.primary(NoiseKind::SurfaceRiver)?;

        let presence = plane(&noise, size, 0, 0);
        if presence * ctx.wet_multiplier() <= ctx.config.surface_river.probability {
            return Ok(());
        }

        let min_width = *ctx.config.surface_river_width.start();
        let max_width = *ctx.config.surface_river_width.end();
        let width = (min_width + presence * (max_width - min_width)).clamp(min_width, max_width) as i32;
        let half = (width / 2).min((s - 1) / 2);

        for x in 0..size {

            let winding = plane(&noise, size, x, 0);
            let center = ((s / 2) as f32 + winding * (s / 4) as f32) as i32;
            let center = center.clamp(half, s - half - 1);

            for z in (center - half)..=(center + half) {

                // Channel layers relative to the segment, before clipping.
                let pos = ctx.origin.world(x, 0, z as usize);
                let top = ctx.world.surface_height(pos.x, pos.z) - y_base;
                let bottom = top - SURFACE_DEPTH;
                if top < 0 || bottom > s - 1 {
                    continue;
                }

                for y in bottom.max(0)..=top.min(s - 1) {
                    out.set(x, y as usize, z as usize, -1.0);
                }

                // The floor may lie in the segment below.
                if bottom >= 0 {
                    ctx.fluids.mark_fluid(ctx.origin.world(x, bottom as usize, z as usize), FluidKind::Water);
                }

            }

        }

        debug!("surface river in column {}/{} at y {y_base} with width {width}", ctx.chunk_x, ctx.chunk_z);
        Ok(())

    }

}


/// Lava rivers follow ridge lines at a wandering floor far below the sea level.
pub struct LavaRiverCarver;

impl Carver for LavaRiverCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::LavaRiver
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let size = ctx.size();
        let a = ctx.primary(NoiseKind::LavaRiver)?;
        let b = ctx.sample(NoiseKind::LavaRiver, 1, 1.0, 0.5)?;
        let floor = ctx.sample(NoiseKind::LavaRiver, 2, 1.0, 0.0)?;

        let mean_floor = ctx.sea_level - LAVA_FLOOR_DEPTH;
        let floor_at = |x, z| mean_floor + (plane(&floor, size, x, z) * LAVA_FLOOR_SPREAD).round() as i32;

        let carved = carve_shape(ctx, out, LAVA_PARAMS, ctx.threshold_bias(NoiseKind::LavaRiver), |x, y, z, i| {
            let wy = ctx.world_y(y);
            let floor_y = floor_at(x, z);
            if wy < floor_y || wy > floor_y + LAVA_CHANNEL_HEIGHT {
                return None;
            }
            Some((shape_density(ridge(plane(&a, size, x, z)), ridge(b[i])), 0.0))
        });

        if carved == 0 {
            return Ok(());
        }

        for z in 0..size {
            for x in 0..size {
                let fill_top = floor_at(x, z) + LAVA_FILL_HEIGHT;
                for y in 0..size {
                    if ctx.world_y(y) >= fill_top {
                        break;
                    }
                    if out.get(x, y, z) < 0.0 {
                        ctx.fluids.mark_fluid(ctx.origin.world(x, y, z), FluidKind::Lava);
                    }
                }
            }
        }

        Ok(())

    }

}
