//! Linear congruential pseudo-random generator used for noise permutations and for the
//! per-segment carver gate draws.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{UNIX_EPOCH, SystemTime};
use std::num::Wrapping;

use glam::DVec3;


const MULTIPLIER: Wrapping<i64> = Wrapping(0x5DEECE66D);
const ADDEND: Wrapping<i64> = Wrapping(0xB);
const MASK: Wrapping<i64> = Wrapping((1 << 48) - 1);

const DOUBLE_DIV: f64 = (1u64 << 53) as f64;


#[inline]
fn initial_scramble(seed: i64) -> Wrapping<i64> {
    (Wrapping(seed) ^ MULTIPLIER) & MASK
}


/// Generate a new, non-reproducible seed. Successive calls never return the same value
/// within a process, this is the source of unseeded gate draws.
pub fn gen_seed() -> i64 {
    static SEED: AtomicI64 = AtomicI64::new(8682522807148012);
    let mut current = SEED.load(Ordering::Relaxed);
    loop {
        let next = current.wrapping_mul(181783497276652981);
        match SEED.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => {
                return match SystemTime::now().duration_since(UNIX_EPOCH) {
                    Ok(d) => next ^ (d.as_nanos() as i64),
                    Err(_) => next
                };
            }
            Err(old) => current = old
        }
    }
}

/// Mix a world seed with a column position, a segment base and a salt into a single
/// seed. Neighbouring columns and segments get unrelated streams.
pub fn column_seed(world_seed: i64, cx: i32, cz: i32, y_base: i32, salt: i64) -> i64 {
    let mut rand = JavaRandom::new(world_seed);
    let x_mul = rand.next_long() | 1;
    let z_mul = rand.next_long() | 1;
    let y_mul = rand.next_long() | 1;
    (cx as i64).wrapping_mul(x_mul)
        ^ (cz as i64).wrapping_mul(z_mul)
        ^ (y_base as i64).wrapping_mul(y_mul)
        ^ world_seed
        ^ salt.wrapping_mul(0x9E3779B97F4A7C15u64 as i64)
}


#[derive(Debug, Clone)]
pub struct JavaRandom {
    seed: Wrapping<i64>
}

impl Default for JavaRandom {
    fn default() -> Self {
        Self::new_seeded()
    }
}

impl JavaRandom {

    #[inline]
    pub fn new(seed: i64) -> JavaRandom {
        JavaRandom { seed: initial_scramble(seed) }
    }

    #[inline]
    pub fn new_seeded() -> JavaRandom {
        Self::new(gen_seed())
    }

    #[inline]
    pub fn set_seed(&mut self, seed: i64) {
        self.seed = initial_scramble(seed);
    }

    fn next_blank(&mut self) {
        self.seed = (self.seed * MULTIPLIER + ADDEND) & MASK;
    }

    #[inline]
    fn next(&mut self, bits: u8) -> i32 {
        self.next_blank();
        (self.seed.0 as u64 >> (48 - bits)) as i32
    }

    pub fn next_int_bounded(&mut self, bound: i32) -> i32 {

        if (bound & -bound) == bound {
            (((bound as i64).wrapping_mul(self.next(31) as i64)) >> 31) as i32
        } else {

            let mut bits;
            let mut val;

            loop {
                bits = self.next(31);
                val = bits.rem_euclid(bound);
                if bits - val + (bound - 1) >= 0 {
                    break;
                }
            }

            val

        }

    }

    pub fn next_long(&mut self) -> i64 {
        ((self.next(32) as i64) << 32).wrapping_add(self.next(32) as i64)
    }

    /// Get the next pseudo-random double-precision float in `[0, 1)`.
    pub fn next_double(&mut self) -> f64 {
        let high = (self.next(26) as i64) << 27;
        let low = self.next(27) as i64;
        (high.wrapping_add(low) as f64) / DOUBLE_DIV
    }

    /// Get the next pseudo-random double-precision float vector, x, y and z.
    pub fn next_dvec3(&mut self) -> DVec3 {
        DVec3 {
            x: self.next_double(),
            y: self.next_double(),
            z: self.next_double(),
        }
    }

    /// Get the next pseudo-random float in `[-1, 1)`, used to fill synthetic fields.
    pub fn next_signed(&mut self) -> f32 {
        (self.next_double() * 2.0 - 1.0) as f32
    }

}
