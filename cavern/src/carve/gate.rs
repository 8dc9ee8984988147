//! Per-segment decision of which styles run.

use crate::config::{CaveConfig, GateMode};
use crate::util::{JavaRandom, column_seed};
use crate::noise::NoiseKind;


/// Surface rivers only run for segments based within this distance of the sea level.
const SURFACE_RIVER_SEA_BAND: i32 = 20;
/// Cave entrances only run for segments based within this distance of the sea level.
const ENTRANCE_SEA_BAND: i32 = 50;
/// Lava rivers only run for segments based at least this far below the sea level.
const LAVA_SEA_DEPTH: i32 = 50;


/// Return true if the segment starting at `y_base` lies in the vertical band where the
/// style is allowed at all.
pub fn segment_allows(kind: NoiseKind, y_base: i32, sea_level: i32) -> bool {
    match kind {
        NoiseKind::SurfaceRiver => (y_base - sea_level).abs() <= SURFACE_RIVER_SEA_BAND,
        NoiseKind::CaveEntrance => (y_base - sea_level).abs() <= ENTRANCE_SEA_BAND,
        NoiseKind::LavaRiver => y_base <= sea_level - LAVA_SEA_DEPTH,
        _ => true,
    }
}


/// Draws the stochastic gates of the styles.
#[derive(Debug, Clone, Copy)]
pub struct GateRoller {
    mode: GateMode,
    world_seed: i64,
}

impl GateRoller {

    pub fn new(mode: GateMode, world_seed: i64) -> Self {
        Self { mode, world_seed }
    }

    #[inline]
    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Draw a value in `[0, 1)` for the style in the given segment.
    pub fn roll(&self, kind: NoiseKind, cx: i32, cz: i32, y_base: i32) -> f64 {
        match self.mode {
            GateMode::Seeded => {
                let seed = column_seed(self.world_seed, cx, cz, y_base, kind.params().seed_offset);
                JavaRandom::new(seed).next_double()
            }
            GateMode::Unseeded => JavaRandom::new_seeded().next_double(),
            GateMode::AlwaysPass => 0.0,
        }
    }

    /// Return true if the style runs in the given segment: it must be enabled, allowed
    /// in this band, and its draw must fall below its probability.
    pub fn passes(&self, config: &CaveConfig, kind: NoiseKind, cx: i32, cz: i32, y_base: i32, sea_level: i32) -> bool {

        let Some(toggle) = config.toggle(kind) else {
            return false;
        };

        if !toggle.enabled || !segment_allows(kind, y_base, sea_level) {
            return false;
        }

        match self.mode {
            GateMode::AlwaysPass => true,
            _ => toggle.probability >= 1.0 || self.roll(kind, cx, cz, y_base) < toggle.probability as f64,
        }

    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn bands() {
        assert!(segment_allows(NoiseKind::SurfaceRiver, 96, 110));
        assert!(!segment_allows(NoiseKind::SurfaceRiver, 64, 110));
        assert!(segment_allows(NoiseKind::CaveEntrance, 64, 110));
        assert!(!segment_allows(NoiseKind::CaveEntrance, 32, 110));
        assert!(segment_allows(NoiseKind::LavaRiver, 32, 110));
        assert!(!segment_allows(NoiseKind::LavaRiver, 64, 110));
        assert!(segment_allows(NoiseKind::Cheese, 224, 110));
    }

    #[test]
    fn seeded_rolls_are_reproducible() {
        let a = GateRoller::new(GateMode::Seeded, 5);
        let b = GateRoller::new(GateMode::Seeded, 5);
        for cx in -4..4 {
            assert_eq!(a.roll(NoiseKind::Cheese, cx, 2, 32), b.roll(NoiseKind::Cheese, cx, 2, 32));
        }
    }

    #[test]
    fn seeded_rolls_follow_probability() {
        let roller = GateRoller::new(GateMode::Seeded, 1234);
        let mut config = CaveConfig::default();
        config.canyon.probability = 0.3;
        let mut passed = 0;
        for cx in 0..50 {
            for cz in 0..50 {
                if roller.passes(&config, NoiseKind::Canyon, cx, cz, 0, 110) {
                    passed += 1;
                }
            }
        }
        // 2500 draws at 30%, far enough from the bounds for any reasonable stream.
        assert!((500..1000).contains(&passed), "{passed}");
    }

    #[test]
    fn flags_and_modes() {
        let mut config = CaveConfig::none();
        let always = GateRoller::new(GateMode::AlwaysPass, 0);
        assert!(!always.passes(&config, NoiseKind::Cheese, 0, 0, 0, 110));
        config.cheese.enabled = true;
        config.cheese.probability = 0.0;
        assert!(always.passes(&config, NoiseKind::Cheese, 0, 0, 0, 110));
        let seeded = GateRoller::new(GateMode::Seeded, 0);
        assert!(!seeded.passes(&config, NoiseKind::Cheese, 0, 0, 0, 110));
        assert!(!always.passes(&config, NoiseKind::CheeseRadiusVertical, 0, 0, 0, 110));
        config.lava_river = crate::config::StyleToggle::new(1.0);
        assert!(!always.passes(&config, NoiseKind::LavaRiver, 0, 0, 96, 110));
    }

}
