//! Noise kinds with their fixed fractal parameters, the generator pool and the density
//! field sampler built on top of it.

use std::fmt;

use thiserror::Error;

mod pool;
mod sampler;

pub use pool::{NoiseGeneratorPool, NoiseHandle, NoiseLease, PoolLimits};
pub use sampler::{DensityFieldSampler, SamplingMode, NoiseGrid, COARSE_STRIDE};


/// Frequency shared by every noise kind.
pub const BASE_FREQUENCY: f32 = 0.015;


/// Identity of a noise field. Every carver style owns one primary kind, some styles also
/// read auxiliary kinds for radius or roughness modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NoiseKind {
    SurfaceRiver,
    UndergroundRiver,
    LavaRiver,
    Canyon,
    DenseCave,
    Cheese,
    ThermalLake,
    VeinGap,
    Spaghetti2D,
    Pillar,
    CheeseRadiusHorizontal,
    CheeseRadiusVertical,
    SpaghettiRoughness,
    Spaghetti3D,
    CanyonRotation,
    DenseCaveRadiusHorizontal,
    DenseCaveRadiusVertical,
    CaveEntrance,
}

/// Fixed parameters of a fractal noise kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseParams {
    pub octaves: u32,
    pub lacunarity: f64,
    pub gain: f64,
    pub frequency: f32,
    /// Added to the world seed to derive the kind's seed.
    pub seed_offset: i64,
}

impl NoiseParams {

    const fn new(octaves: u32, gain: f64, seed_offset: i64) -> Self {
        Self { octaves, lacunarity: 2.0, gain, frequency: BASE_FREQUENCY, seed_offset }
    }

}

impl NoiseKind {

    pub const ALL: [NoiseKind; 18] = [
        NoiseKind::SurfaceRiver,
        NoiseKind::UndergroundRiver,
        NoiseKind::LavaRiver,
        NoiseKind::Canyon,
        NoiseKind::DenseCave,
        NoiseKind::Cheese,
        NoiseKind::ThermalLake,
        NoiseKind::VeinGap,
        NoiseKind::Spaghetti2D,
        NoiseKind::Pillar,
        NoiseKind::CheeseRadiusHorizontal,
        NoiseKind::CheeseRadiusVertical,
        NoiseKind::SpaghettiRoughness,
        NoiseKind::Spaghetti3D,
        NoiseKind::CanyonRotation,
        NoiseKind::DenseCaveRadiusHorizontal,
        NoiseKind::DenseCaveRadiusVertical,
        NoiseKind::CaveEntrance,
    ];

    /// Fractal parameters of this kind, constant for the life of the process.
    pub const fn params(self) -> NoiseParams {
        match self {
            NoiseKind::SurfaceRiver => NoiseParams::new(4, 0.5, 1),
            NoiseKind::UndergroundRiver => NoiseParams::new(4, 0.5, 2),
            NoiseKind::LavaRiver => NoiseParams::new(4, 0.5, 3),
            NoiseKind::Canyon => NoiseParams::new(4, 0.5, 4),
            NoiseKind::DenseCave => NoiseParams::new(5, 0.5, 5),
            NoiseKind::Cheese => NoiseParams::new(8, 1.0, 6),
            NoiseKind::ThermalLake => NoiseParams::new(5, 0.5, 7),
            NoiseKind::VeinGap => NoiseParams::new(3, 0.5, 8),
            NoiseKind::Spaghetti2D => NoiseParams::new(4, 0.5, 9),
            NoiseKind::Pillar => NoiseParams::new(3, 0.5, 10),
            NoiseKind::CheeseRadiusHorizontal => NoiseParams::new(2, 0.5, 11),
            NoiseKind::CheeseRadiusVertical => NoiseParams::new(2, 0.5, 12),
            NoiseKind::SpaghettiRoughness => NoiseParams::new(2, 0.5, 13),
            NoiseKind::Spaghetti3D => NoiseParams::new(4, 0.5, 14),
            NoiseKind::CanyonRotation => NoiseParams::new(2, 0.5, 15),
            NoiseKind::DenseCaveRadiusHorizontal => NoiseParams::new(2, 0.5, 16),
            NoiseKind::DenseCaveRadiusVertical => NoiseParams::new(2, 0.5, 17),
            NoiseKind::CaveEntrance => NoiseParams::new(3, 0.5, 18),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            NoiseKind::SurfaceRiver => "SurfaceRiver",
            NoiseKind::UndergroundRiver => "UndergroundRiver",
            NoiseKind::LavaRiver => "LavaRiver",
            NoiseKind::Canyon => "Canyon",
            NoiseKind::DenseCave => "DenseCave",
            NoiseKind::Cheese => "Cheese",
            NoiseKind::ThermalLake => "ThermalLake",
            NoiseKind::VeinGap => "VeinGap",
            NoiseKind::Spaghetti2D => "Spaghetti2D",
            NoiseKind::Pillar => "Pillar",
            NoiseKind::CheeseRadiusHorizontal => "CheeseRadiusHorizontal",
            NoiseKind::CheeseRadiusVertical => "CheeseRadiusVertical",
            NoiseKind::SpaghettiRoughness => "SpaghettiRoughness",
            NoiseKind::Spaghetti3D => "Spaghetti3D",
            NoiseKind::CanyonRotation => "CanyonRotation",
            NoiseKind::DenseCaveRadiusHorizontal => "DenseCaveRadiusHorizontal",
            NoiseKind::DenseCaveRadiusVertical => "DenseCaveRadiusVertical",
            NoiseKind::CaveEntrance => "CaveEntrance",
        }
    }

    /// Multiplier applied to samples taken below sea level, 1.0 for unscaled kinds.
    pub const fn deep_scale(self) -> f32 {
        match self {
            NoiseKind::Cheese => 1.5,
            NoiseKind::Spaghetti2D | NoiseKind::Spaghetti3D => 1.1,
            NoiseKind::LavaRiver | NoiseKind::Canyon | NoiseKind::ThermalLake => 1.2,
            _ => 1.0,
        }
    }

    /// Kinds whose full grids are reused heavily across a column and are therefore kept
    /// in the sampler's LRU.
    pub const fn is_grid_cached(self) -> bool {
        matches!(self, NoiseKind::Cheese | NoiseKind::VeinGap | NoiseKind::Spaghetti3D)
    }

    /// Kinds carving water or lava channels, their masks restrict later pillars.
    pub const fn is_river(self) -> bool {
        matches!(self, NoiseKind::SurfaceRiver | NoiseKind::UndergroundRiver | NoiseKind::LavaRiver)
    }

}

impl fmt::Display for NoiseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}


/// Errors raised while renting generators or sampling fields.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoiseError {
    /// The kind has not been registered in the pool, this is a programming error.
    #[error("configuration: noise kind {0} is not registered")]
    Configuration(NoiseKind),
    #[error("invalid parameter: {0}")]
    InvalidParameter(#[from] InvalidParameter),
}

/// Detail of an out-of-range sampling parameter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidParameter {
    #[error("chunk size {0} is outside of [1, 512]")]
    ChunkSize(usize),
    #[error("frequency {0} is not finite or outside of (0, 1]")]
    Frequency(f32),
    #[error("scale ({xz}, {y}) is not finite")]
    Scale { xz: f32, y: f32 },
}
