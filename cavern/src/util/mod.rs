//! Random and noise utilities.

mod rand;
mod noise;

pub use rand::{JavaRandom, gen_seed, column_seed};
pub use noise::{PerlinNoise, FractalNoise};
