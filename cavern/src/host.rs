//! Interfaces to the surrounding host: voxel writes, world queries, biome classification
//! and the fluid registry, with simple in-memory implementations.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use glam::IVec3;


/// Numeric identifier of a block kind in the host.
pub type BlockId = u16;

/// The block written for carved voxels.
pub const AIR: BlockId = 0;


/// Destination of the voxel writes of one generation pass.
pub trait VoxelSink {

    fn set_voxel(&mut self, pos: IVec3, block: BlockId);

    /// Called once after the last write of a pass.
    fn commit(&mut self);

}

/// World level queries needed by the carvers.
pub trait WorldView: Send + Sync {

    fn seed(&self) -> i64;

    fn sea_level(&self) -> i32;

    /// Height of the world, the column covers `0..height`.
    fn height(&self) -> i32;

    /// Y of the terrain surface at the given column.
    fn surface_height(&self, x: i32, z: i32) -> i32;

    /// Return true if the block at this position is a liquid, river walks stop there.
    fn is_liquid(&self, pos: IVec3) -> bool {
        let _ = pos;
        false
    }

}


/// Coarse biome tag, only used as a probability multiplier input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BiomeTag {
    Wet,
    Frozen,
    Hot,
    Temperate,
}

/// Classify columns into coarse biome tags.
pub trait BiomeClassifier: Send + Sync {
    fn classify(&self, x: i32, z: i32) -> BiomeTag;
}

/// Classifier returning the same tag everywhere.
#[derive(Debug, Clone, Copy)]
pub struct FixedBiome(pub BiomeTag);

impl Default for FixedBiome {
    fn default() -> Self {
        Self(BiomeTag::Temperate)
    }
}

impl BiomeClassifier for FixedBiome {
    fn classify(&self, _x: i32, _z: i32) -> BiomeTag {
        self.0
    }
}

/// Classifier deriving the tag from a climate function returning the rainfall, in
/// `[0, 1]`, and the temperature in degrees.
pub struct ClimateBiomeClassifier<F> {
    climate: F,
}

impl<F> ClimateBiomeClassifier<F>
where
    F: Fn(i32, i32) -> (f32, f32) + Send + Sync,
{

    pub fn new(climate: F) -> Self {
        Self { climate }
    }

}

impl<F> BiomeClassifier for ClimateBiomeClassifier<F>
where
    F: Fn(i32, i32) -> (f32, f32) + Send + Sync,
{
    fn classify(&self, x: i32, z: i32) -> BiomeTag {
        let (rainfall, temperature) = (self.climate)(x, z);
        if rainfall > 0.8 {
            BiomeTag::Wet
        } else if temperature < 0.0 {
            BiomeTag::Frozen
        } else if temperature > 20.0 {
            BiomeTag::Hot
        } else {
            BiomeTag::Temperate
        }
    }
}


/// Fluid placed in carved channels by the river carvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FluidKind {
    Water,
    Lava,
}

/// Registry of fluids to place, consumed by an external fluid placement pass.
pub trait FluidRegistry: Send + Sync {

    fn mark_fluid(&self, pos: IVec3, kind: FluidKind);

    fn fluid(&self, pos: IVec3) -> Option<FluidKind>;

}

/// Fluid registry backed by a locked map.
#[derive(Debug, Default)]
pub struct MemoryFluidRegistry {
    fluids: Mutex<HashMap<IVec3, FluidKind>>,
}

impl MemoryFluidRegistry {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fluids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every registered fluid, returning them.
    pub fn drain(&self) -> Vec<(IVec3, FluidKind)> {
        self.fluids.lock().unwrap_or_else(PoisonError::into_inner).drain().collect()
    }

}

impl FluidRegistry for MemoryFluidRegistry {

    fn mark_fluid(&self, pos: IVec3, kind: FluidKind) {
        self.fluids.lock().unwrap_or_else(PoisonError::into_inner).insert(pos, kind);
    }

    fn fluid(&self, pos: IVec3) -> Option<FluidKind> {
        self.fluids.lock().unwrap_or_else(PoisonError::into_inner).get(&pos).copied()
    }

}


/// A world with a constant surface height, useful for tests and headless hosts.
#[derive(Debug, Clone)]
pub struct FlatWorld {
    pub seed: i64,
    pub sea_level: i32,
    pub height: i32,
    pub surface: i32,
    /// Positions reported as liquid.
    pub liquids: HashSet<IVec3>,
}

impl FlatWorld {

    pub fn new(seed: i64, sea_level: i32, height: i32, surface: i32) -> Self {
        Self { seed, sea_level, height, surface, liquids: HashSet::new() }
    }

}

impl WorldView for FlatWorld {

    fn seed(&self) -> i64 {
        self.seed
    }

    fn sea_level(&self) -> i32 {
        self.sea_level
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn surface_height(&self, _x: i32, _z: i32) -> i32 {
        self.surface
    }

    fn is_liquid(&self, pos: IVec3) -> bool {
        self.liquids.contains(&pos)
    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn climate_classification() {
        let classifier = ClimateBiomeClassifier::new(|x, _z| match x {
            0 => (0.9, 10.0),
            1 => (0.5, -5.0),
            2 => (0.5, 30.0),
            _ => (0.5, 15.0),
        });
        assert_eq!(classifier.classify(0, 0), BiomeTag::Wet);
        assert_eq!(classifier.classify(1, 0), BiomeTag::Frozen);
        assert_eq!(classifier.classify(2, 0), BiomeTag::Hot);
        assert_eq!(classifier.classify(3, 0), BiomeTag::Temperate);
        assert_eq!(FixedBiome::default().classify(9, 9), BiomeTag::Temperate);
    }

    #[test]
    fn fluid_registry() {
        let registry = MemoryFluidRegistry::new();
        assert!(registry.is_empty());
        registry.mark_fluid(IVec3::new(1, 2, 3), FluidKind::Water);
        registry.mark_fluid(IVec3::new(1, 2, 3), FluidKind::Lava);
        assert_eq!(registry.fluid(IVec3::new(1, 2, 3)), Some(FluidKind::Lava));
        assert_eq!(registry.fluid(IVec3::ZERO), None);
        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
    }

}
