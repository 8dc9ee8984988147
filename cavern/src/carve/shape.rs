//! The threshold pattern shared by every noise-shaped carver.
//!
//! Two independently seeded copies of a noise are offset and combined with a minimum,
//! giving elongated connected shapes instead of isolated blobs. The result is compared
//! against a threshold depending on depth and on a small variation field.

use crate::field::DensityField;

use super::CarveContext;


/// Offset added to the first shape noise before doubling it.
pub const BIAS_A: f32 = 0.47;
/// Offset added to the second shape noise.
pub const BIAS_B: f32 = 0.27;
/// Layers whose depth weight is below this value are never carved.
pub const MIN_DEPTH_WEIGHT: f32 = 0.1;


/// Per-style threshold constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeParams {
    pub base_threshold: f32,
    /// Multiplied by the depth weight and subtracted from the base threshold, negative
    /// factors therefore carve more at depth.
    pub depth_factor: f32,
}

impl ShapeParams {

    pub const fn new(base_threshold: f32, depth_factor: f32) -> Self {
        Self { base_threshold, depth_factor }
    }

    #[inline]
    pub fn threshold(&self, y_weight: f32, variation: f32) -> f32 {
        self.base_threshold - y_weight * self.depth_factor + variation
    }

}


/// Canonical shape density in `[-1, 1]`.
#[inline]
pub fn shape_density(a: f32, b: f32) -> f32 {
    shape_density_scaled(a, b, 1.0, 1.0)
}

/// Shape density where both terms are multiplied by radius modulation factors.
#[inline]
pub fn shape_density_scaled(a: f32, b: f32, a_factor: f32, b_factor: f32) -> f32 {
    (((a + BIAS_A) * 2.0 * a_factor).min((b + BIAS_B) * b_factor)).clamp(-1.0, 1.0)
}

/// Contribution written to the shared field, negative exactly when the density is
/// below the threshold.
#[inline]
pub fn contribution(density: f32, threshold: f32) -> f32 {
    (density - threshold).clamp(-1.0, 1.0)
}


/// Run the canonical pattern over a whole segment. The evaluation function receives
/// local coordinates and the flat index, and returns the density and the threshold
/// variation of the voxel, or none to leave it solid. Returns the carved count.
pub fn carve_shape<F>(ctx: &CarveContext<'_>, out: &mut DensityField, params: ShapeParams, bias: f32, mut eval: F) -> usize
where
    F: FnMut(usize, usize, usize, usize) -> Option<(f32, f32)>,
{

    let size = ctx.size();
    let mut carved = 0;

    for y in 0..size {

        let y_weight = ctx.depth_weight(y);
        if y_weight < MIN_DEPTH_WEIGHT {
            continue;
        }

        for z in 0..size {
            for x in 0..size {
                let index = crate::field::calc_index(size, x, y, z);
                if let Some((density, variation)) = eval(x, y, z, index) {
                    let value = contribution(density, params.threshold(y_weight, variation) + bias);
                    if value < 0.0 {
                        carved += 1;
                    }
                    out.set(x, y, z, value);
                }
            }
        }

    }

    carved

}
