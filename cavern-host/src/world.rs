//! In-memory world used by the host: rolling hills above the sea and a sink counting
//! what the carvers write.

use std::collections::HashMap;

use glam::{DVec3, IVec2, IVec3};

use cavern::host::{BlockId, VoxelSink, WorldView, AIR};
use cavern::util::FractalNoise;


/// A world whose surface is a low frequency fractal noise.
pub struct HillsWorld {
    seed: i64,
    sea_level: i32,
    height: i32,
    hills: FractalNoise,
}

impl HillsWorld {

    pub fn new(seed: i64) -> Self {
        Self {
            seed,
            sea_level: 64,
            height: 256,
            hills: FractalNoise::new(seed ^ 0x5EED, 4, 2.0, 0.5),
        }
    }

}

impl WorldView for HillsWorld {

    fn seed(&self) -> i64 {
        self.seed
    }

    fn sea_level(&self) -> i32 {
        self.sea_level
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn surface_height(&self, x: i32, z: i32) -> i32 {
        let n = self.hills.gen_3d_point(DVec3::new(x as f64 * 0.004, 0.0, z as f64 * 0.004));
        (self.sea_level + 40 + (n * 60.0) as i32).clamp(1, self.height - 1)
    }

}


/// Sink keeping the number of carved voxels of every column it received.
#[derive(Debug, Default)]
pub struct CountingSink {
    chunk_size: i32,
    carved: HashMap<IVec2, usize>,
    writes: usize,
    commits: usize,
}

impl CountingSink {

    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size as i32, ..Self::default() }
    }

    pub fn total_carved(&self) -> usize {
        self.carved.values().sum()
    }

    pub fn columns(&self) -> usize {
        self.carved.len()
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

}

impl VoxelSink for CountingSink {

    fn set_voxel(&mut self, pos: IVec3, block: BlockId) {
        self.writes += 1;
        if block == AIR {
            let column = IVec2::new(pos.x.div_euclid(self.chunk_size), pos.z.div_euclid(self.chunk_size));
            *self.carved.entry(column).or_default() += 1;
        }
    }

    fn commit(&mut self) {
        self.commits += 1;
    }

}
