//! Cave entrances. Not a carver by itself: after blending, caves above the sea level
//! are sealed progressively toward the surface, except where the entrance noise is
//! negative and lets them break through.

use crate::field::{calc_index, DensityField};
use crate::noise::NoiseKind;

use super::{CarveContext, CarveError};


#[derive(Debug, Clone, Copy, Default)]
pub struct CaveEntranceStage;

impl CaveEntranceStage {

    /// Sealing weight of a world layer, 0 up to the sea level and 1 at the world top.
    pub fn seal_weight(wy: i32, sea_level: i32, height: i32) -> f32 {
        if height <= sea_level {
            return 0.0;
        }
        ((wy - sea_level) as f32 / (height - sea_level) as f32).max(0.0)
    }

    /// Add the sealing of this segment into the blended field, returns the number of
    /// voxels that changed.
    pub fn apply(&self, ctx: &CarveContext<'_>, field: &mut DensityField) -> Result<usize, CarveError> {

        let size = ctx.size();
        if ctx.world_y(size - 1) <= ctx.sea_level {
            return Ok(0);
        }

        let entrance = ctx.primary(NoiseKind::CaveEntrance)?;
        let mut changed = 0;

        for y in 0..size {
            let weight = Self::seal_weight(ctx.world_y(y), ctx.sea_level, ctx.height);
            if weight <= 0.0 {
                continue;
            }
            for z in 0..size {
                for x in 0..size {
                    let seal = (entrance[calc_index(size, x, y, z)] * weight).max(0.0);
                    if seal > 0.0 {
                        field.add(x, y, z, seal);
                        changed += 1;
                    }
                }
            }
        }

        Ok(changed)

    }

}
