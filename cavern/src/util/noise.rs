//! Perlin and fractal noise generators.

use glam::DVec3;

use super::JavaRandom;


/// A 3D Perlin noise generator.
#[derive(Debug, Clone)]
pub struct PerlinNoise {
    /// All permutations used by Perlin noise algorithm.
    permutations: Box<[u16; 512]>,
    /// Offset applied to all position given to the generator.
    offset: DVec3,
}

impl PerlinNoise {

    /// Create a new perlin noise initialized with the given RNG.
    pub fn new(rand: &mut JavaRandom) -> Self {

        let offset = rand.next_dvec3() * 256.0;
        let mut permutations = Box::new(std::array::from_fn::<u16, 512, _>(|i| {
            if i < 256 {
                i as u16
            } else {
                0
            }
        }));

        for index in 0usize..256 {
            let permutation_index = rand.next_int_bounded(256 - index as i32) as usize + index;
            permutations.swap(index, permutation_index);
            permutations[index + 256] = permutations[index];
        }

        Self {
            permutations,
            offset,
        }

    }

    /// Get the noise value at given 3D coordinates, roughly in `[-1, 1]`.
    pub fn gen_3d_point(&self, pos: DVec3) -> f64 {

        let mut pos = pos + self.offset;
        let pos_floor = pos.floor();
        pos -= pos_floor;
        let factor = pos * pos * pos * (pos * (pos * 6.0 - 15.0) + 10.0);

        // NOTE: Casting through i64 keeps the wrap well defined for huge coordinates.
        let x_index = (pos_floor.x as i64 & 255) as usize;
        let y_index = (pos_floor.y as i64 & 255) as usize;
        let z_index = (pos_floor.z as i64 & 255) as usize;

        let perm = &self.permutations[..];
        let a = perm[x_index] as usize + y_index;
        let a0 = perm[a] as usize + z_index;
        let a1 = perm[a + 1] as usize + z_index;
        let b = perm[x_index + 1] as usize + y_index;
        let b0 = perm[b] as usize + z_index;
        let b1 = perm[b + 1] as usize + z_index;

        lerp(factor.z,
            lerp(factor.y,
                lerp(factor.x,
                    grad(perm[a0], pos),
                    grad(perm[b0], pos - DVec3::new(1.0, 0.0, 0.0))),
                lerp(factor.x,
                    grad(perm[a1], pos - DVec3::new(0.0, 1.0, 0.0)),
                    grad(perm[b1], pos - DVec3::new(1.0, 1.0, 0.0)))),
            lerp(factor.y,
                lerp(factor.x,
                    grad(perm[a0 + 1], pos - DVec3::new(0.0, 0.0, 1.0)),
                    grad(perm[b0 + 1], pos - DVec3::new(1.0, 0.0, 1.0))),
                lerp(factor.x,
                    grad(perm[a1 + 1], pos - DVec3::new(0.0, 1.0, 1.0)),
                    grad(perm[b1 + 1], pos - DVec3::new(1.0, 1.0, 1.0)))))

    }

}

#[inline]
fn lerp(factor: f64, from: f64, to: f64) -> f64 {
    from + factor * (to - from)
}

#[inline]
fn grad(value: u16, pos: DVec3) -> f64 {
    let value = value & 15;
    let a = if value < 8 { pos.x } else { pos.y };
    let b = if value < 4 { pos.y } else if value != 12 && value != 14 { pos.z } else { pos.x };
    (if value & 1 == 0 { a } else { -a }) + (if value & 2 == 0 { b } else { -b })
}


/// Fractal Brownian motion over Perlin octaves. Each octave multiplies the frequency by
/// the lacunarity and the amplitude by the gain, the sum is then divided by the total
/// amplitude so that the output keeps the range of a single octave.
#[derive(Debug, Clone)]
pub struct FractalNoise {
    /// One generator per octave, each with its own permutation table.
    octaves: Box<[PerlinNoise]>,
    lacunarity: f64,
    gain: f64,
    /// Inverse of the summed octave amplitudes.
    bounding: f64,
}

impl FractalNoise {

    /// Create a fractal generator, all octaves are drawn from one stream seeded with the
    /// given seed, so the same seed always gives the same generator.
    pub fn new(seed: i64, octaves: u32, lacunarity: f64, gain: f64) -> Self {

        let mut rand = JavaRandom::new(seed);
        let octaves = octaves.max(1);

        let mut amp = 1.0;
        let mut total = 0.0;
        for _ in 0..octaves {
            total += amp;
            amp *= gain;
        }

        Self {
            octaves: (0..octaves)
                .map(|_| PerlinNoise::new(&mut rand))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            lacunarity,
            gain,
            bounding: if total > 0.0 { 1.0 / total } else { 1.0 },
        }

    }

    /// Get the noise value at given 3D coordinates, already multiplied by frequency.
    pub fn gen_3d_point(&self, pos: DVec3) -> f64 {
        let mut ret = 0.0;
        let mut freq = 1.0;
        let mut amp = 1.0;
        for octave in &self.octaves[..] {
            ret += octave.gen_3d_point(pos * freq) * amp;
            freq *= self.lacunarity;
            amp *= self.gain;
        }
        ret * self.bounding
    }

    /// Evaluate a regular grid of `dims` points where the point `(i, j, k)` is located at
    /// `(start + (i, j, k) * stride) * step`. Values are written x-fastest, then z, then
    /// y, that is `(y * dims.z + z) * dims.x + x`.
    pub fn gen_3d_grid(&self, start: DVec3, stride: f64, step: DVec3, dims: [usize; 3], out: &mut [f32]) {

        let [x_dim, y_dim, z_dim] = dims;
        debug_assert_eq!(out.len(), x_dim * y_dim * z_dim);

        for y in 0..y_dim {
            let py = (start.y + y as f64 * stride) * step.y;
            for z in 0..z_dim {
                let pz = (start.z + z as f64 * stride) * step.z;
                for x in 0..x_dim {
                    let px = (start.x + x as f64 * stride) * step.x;
                    out[(y * z_dim + z) * x_dim + x] = self.gen_3d_point(DVec3::new(px, py, pz)) as f32;
                }
            }
        }

    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn perlin_bounded() {
        let mut rand = JavaRandom::new(0);
        let perlin = PerlinNoise::new(&mut rand);
        for i in 0..200 {
            let pos = DVec3::new(i as f64 * 0.37, i as f64 * -0.11, i as f64 * 0.73);
            let v = perlin.gen_3d_point(pos);
            assert!(v.abs() <= 1.1, "{v}");
        }
    }

    #[test]
    fn fractal_deterministic_and_bounded() {
        let a = FractalNoise::new(77, 8, 2.0, 1.0);
        let b = FractalNoise::new(77, 8, 2.0, 1.0);
        let c = FractalNoise::new(78, 8, 2.0, 1.0);
        let mut differs = false;
        for i in 0..100 {
            let pos = DVec3::new(i as f64 * 0.31, 3.5, i as f64 * -0.17);
            let va = a.gen_3d_point(pos);
            assert_eq!(va, b.gen_3d_point(pos));
            assert!(va.abs() <= 1.1);
            differs |= va != c.gen_3d_point(pos);
        }
        assert!(differs);
    }

    #[test]
    fn grid_matches_points() {
        let noise = FractalNoise::new(5, 3, 2.0, 0.5);
        let start = DVec3::new(-16.0, 32.0, 48.0);
        let step = DVec3::splat(0.015);
        let mut out = vec![0.0; 4 * 3 * 2];
        noise.gen_3d_grid(start, 8.0, step, [4, 3, 2], &mut out);
        for y in 0..3 {
            for z in 0..2 {
                for x in 0..4 {
                    let pos = (start + DVec3::new(x as f64, y as f64, z as f64) * 8.0) * step;
                    assert_eq!(out[(y * 2 + z) * 4 + x], noise.gen_3d_point(pos) as f32);
                }
            }
        }
    }

}
