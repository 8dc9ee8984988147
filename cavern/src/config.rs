//! Carver feature flags and probabilities, plus the engine settings fixed at startup.
//!
//! The carver configuration may be replaced at any time by the surrounding host through
//! a [`ConfigHandle`], every generation pass reads one consistent snapshot of it.

use std::ops::RangeInclusive;
use std::sync::{Arc, RwLock, PoisonError};
use std::thread;

use crate::noise::{NoiseKind, SamplingMode};


/// How the per-segment "should this carver run" draws are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateMode {
    /// Draws are seeded from the world seed, column, segment and kind, regenerating a
    /// column reproduces the same carver set.
    #[default]
    Seeded,
    /// Draws come from a process-wide source, the carver set varies between runs.
    Unseeded,
    /// Every draw passes, only the enable flags matter.
    AlwaysPass,
}


/// Enable flag and probability of one carver style.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleToggle {
    pub enabled: bool,
    /// Probability in `[0, 1]` that the style runs for a given segment.
    pub probability: f32,
    /// Added to the style's carving threshold, positive values carve more.
    pub threshold_bias: f32,
}

impl StyleToggle {

    pub const fn new(probability: f32) -> Self {
        Self { enabled: true, probability, threshold_bias: 0.0 }
    }

    pub const fn disabled() -> Self {
        Self { enabled: false, probability: 0.0, threshold_bias: 0.0 }
    }

}


/// Feature flags, probabilities and ranges of every carver style.
#[derive(Debug, Clone, PartialEq)]
pub struct CaveConfig {
    pub surface_river: StyleToggle,
    pub cheese: StyleToggle,
    pub spaghetti_2d: StyleToggle,
    pub spaghetti_3d: StyleToggle,
    pub vein_gap: StyleToggle,
    pub dense_cave: StyleToggle,
    pub thermal_lake: StyleToggle,
    pub canyon: StyleToggle,
    pub underground_river: StyleToggle,
    pub lava_river: StyleToggle,
    pub pillar: StyleToggle,
    pub cave_entrance: StyleToggle,
    /// River probability multiplier applied in wet biomes.
    pub wet_biome_river_multiplier: f32,
    /// Underground river half width range, in blocks.
    pub river_width: RangeInclusive<f32>,
    /// Surface river half width range, in blocks.
    pub surface_river_width: RangeInclusive<f32>,
    /// Maximum number of underground river sources walked per segment.
    pub river_sources: usize,
    /// When set, pillars only carve next to voxels already carved by a river.
    pub pillars_follow_rivers: bool,
    /// Replaces the world seed for noise when not zero.
    pub seed_override: i64,
    pub gate_mode: GateMode,
    pub sampling: SamplingMode,
    /// Log per-segment decisions at debug level.
    pub verbose: bool,
}

impl Default for CaveConfig {
    fn default() -> Self {
        Self {
            surface_river: StyleToggle::new(0.1),
            cheese: StyleToggle::new(0.02),
            spaghetti_2d: StyleToggle::new(0.05),
            spaghetti_3d: StyleToggle::new(0.05),
            vein_gap: StyleToggle::new(0.05),
            dense_cave: StyleToggle::new(0.07),
            thermal_lake: StyleToggle::new(0.04),
            canyon: StyleToggle::new(0.03),
            underground_river: StyleToggle::new(0.06),
            lava_river: StyleToggle::new(0.01),
            pillar: StyleToggle::new(0.03),
            cave_entrance: StyleToggle::new(0.5),
            wet_biome_river_multiplier: 1.5,
            river_width: 2.0..=5.0,
            surface_river_width: 3.0..=6.0,
            river_sources: 2,
            pillars_follow_rivers: false,
            seed_override: 0,
            gate_mode: GateMode::Seeded,
            sampling: SamplingMode::Coarse,
            verbose: false,
        }
    }
}

impl CaveConfig {

    /// A configuration where every style is disabled.
    pub fn none() -> Self {
        let mut config = Self::default();
        for kind in NoiseKind::ALL {
            if let Some(toggle) = config.toggle_mut(kind) {
                *toggle = StyleToggle::disabled();
            }
        }
        config
    }

    /// A configuration where only the given styles run, on every segment.
    pub fn only(kinds: &[NoiseKind]) -> Self {
        let mut config = Self::none();
        config.gate_mode = GateMode::AlwaysPass;
        for &kind in kinds {
            if let Some(toggle) = config.toggle_mut(kind) {
                *toggle = StyleToggle::new(1.0);
            }
        }
        config
    }

    /// Toggle of the style whose primary noise is the given kind, none for auxiliary
    /// kinds that are not carvers by themselves.
    pub fn toggle(&self, kind: NoiseKind) -> Option<&StyleToggle> {
        Some(match kind {
            NoiseKind::SurfaceRiver => &self.surface_river,
            NoiseKind::Cheese => &self.cheese,
            NoiseKind::Spaghetti2D => &self.spaghetti_2d,
            NoiseKind::Spaghetti3D => &self.spaghetti_3d,
            NoiseKind::VeinGap => &self.vein_gap,
            NoiseKind::DenseCave => &self.dense_cave,
            NoiseKind::ThermalLake => &self.thermal_lake,
            NoiseKind::Canyon => &self.canyon,
            NoiseKind::UndergroundRiver => &self.underground_river,
            NoiseKind::LavaRiver => &self.lava_river,
            NoiseKind::Pillar => &self.pillar,
            NoiseKind::CaveEntrance => &self.cave_entrance,
            _ => return None,
        })
    }

    pub fn toggle_mut(&mut self, kind: NoiseKind) -> Option<&mut StyleToggle> {
        Some(match kind {
            NoiseKind::SurfaceRiver => &mut self.surface_river,
            NoiseKind::Cheese => &mut self.cheese,
            NoiseKind::Spaghetti2D => &mut self.spaghetti_2d,
            NoiseKind::Spaghetti3D => &mut self.spaghetti_3d,
            NoiseKind::VeinGap => &mut self.vein_gap,
            NoiseKind::DenseCave => &mut self.dense_cave,
            NoiseKind::ThermalLake => &mut self.thermal_lake,
            NoiseKind::Canyon => &mut self.canyon,
            NoiseKind::UndergroundRiver => &mut self.underground_river,
            NoiseKind::LavaRiver => &mut self.lava_river,
            NoiseKind::Pillar => &mut self.pillar,
            NoiseKind::CaveEntrance => &mut self.cave_entrance,
            _ => return None,
        })
    }

    /// Return true if the style of this kind is enabled.
    pub fn is_enabled(&self, kind: NoiseKind) -> bool {
        self.toggle(kind).is_some_and(|toggle| toggle.enabled)
    }

    /// Threshold bias of the style of this kind, zero for auxiliary kinds.
    pub fn threshold_bias(&self, kind: NoiseKind) -> f32 {
        self.toggle(kind).map_or(0.0, |toggle| toggle.threshold_bias)
    }

}


/// Shared, replaceable carver configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<CaveConfig>>>,
}

impl ConfigHandle {

    pub fn new(config: CaveConfig) -> Self {
        Self { inner: Arc::new(RwLock::new(Arc::new(config))) }
    }

    /// Get the current configuration, it stays valid even if replaced meanwhile.
    pub fn snapshot(&self) -> Arc<CaveConfig> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the configuration, passes already running keep their snapshot.
    pub fn replace(&self, config: CaveConfig) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

}


/// Engine settings, fixed when the generator is built.
#[derive(Debug, Clone, PartialEq)]
pub struct CavernSettings {
    /// Edge length of a cubic segment.
    pub chunk_size: usize,
    /// Radius, in chunk columns, of the area precomputed around the tracked position.
    pub precompute_radius: i32,
    /// Maximum number of cached column bundles.
    pub max_cached_columns: usize,
    /// Number of background precompute workers.
    pub worker_threads: usize,
    /// Multiplier of the noise pool's soft size giving its hard ceiling.
    pub pool_safety_factor: usize,
    /// Entries of the sampler's grid LRU.
    pub grid_cache_limit: usize,
    /// Entries of each thread's coarse grid cache.
    pub sparse_cache_limit: usize,
}

impl Default for CavernSettings {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            precompute_radius: 5,
            max_cached_columns: 100,
            worker_threads: default_worker_threads(),
            pool_safety_factor: 2,
            grid_cache_limit: 1000,
            sparse_cache_limit: 100,
        }
    }
}

/// Leave two cores to the host, but always have one worker.
pub fn default_worker_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(2))
        .unwrap_or(1)
        .max(1)
}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn defaults() {
        let config = CaveConfig::default();
        assert_eq!(config.cheese.probability, 0.02);
        assert_eq!(config.surface_river.probability, 0.1);
        assert_eq!(config.lava_river.probability, 0.01);
        assert_eq!(config.wet_biome_river_multiplier, 1.5);
        assert_eq!(config.river_width, 2.0..=5.0);
        assert_eq!(config.gate_mode, GateMode::Seeded);
        assert!(config.toggle(NoiseKind::CheeseRadiusVertical).is_none());
        assert!(CavernSettings::default().worker_threads >= 1);
    }

    #[test]
    fn only_enables_given_styles() {
        let config = CaveConfig::only(&[NoiseKind::Cheese]);
        assert!(config.is_enabled(NoiseKind::Cheese));
        assert_eq!(config.cheese.probability, 1.0);
        assert!(!config.is_enabled(NoiseKind::Pillar));
        assert!(!config.is_enabled(NoiseKind::CaveEntrance));
        assert_eq!(config.gate_mode, GateMode::AlwaysPass);
    }

    #[test]
    fn handle_snapshot_survives_replace() {
        let handle = ConfigHandle::new(CaveConfig::default());
        let before = handle.snapshot();
        handle.replace(CaveConfig::none());
        assert!(before.is_enabled(NoiseKind::Cheese));
        assert!(!handle.snapshot().is_enabled(NoiseKind::Cheese));
        let clone = handle.clone();
        clone.replace(CaveConfig::default());
        assert!(handle.snapshot().is_enabled(NoiseKind::Cheese));
    }

}
