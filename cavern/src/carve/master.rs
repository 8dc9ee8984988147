//! Orchestration of the carvers over a chunk column.

use std::cell::RefCell;

use tracing::{debug, warn};

use crate::buffer::BlockChangeBuffer;
use crate::config::CaveConfig;
use crate::field::{ChunkOrigin, DensityField, VoxelCaveMask};
use crate::host::{BiomeTag, FluidRegistry, WorldView, AIR};
use crate::noise::{DensityFieldSampler, NoiseKind};

use super::bundle::{sample_primary, BundleKey, ColumnBundle};
use super::connect::{CaveConnector, SamplerBridge};
use super::entrance::CaveEntranceStage;
use super::gate::{segment_allows, GateRoller};
use super::{default_carvers, CarveContext, CarveError, Carver, CARVE_THRESHOLD};


/// Collaborators and settings shared by every segment of one column pass.
pub struct ColumnContext<'a> {
    pub cx: i32,
    pub cz: i32,
    pub world: &'a dyn WorldView,
    pub biome: BiomeTag,
    pub config: &'a CaveConfig,
    pub sampler: &'a DensityFieldSampler,
    pub fluids: &'a dyn FluidRegistry,
    pub gate: GateRoller,
    pub size: usize,
}

impl ColumnContext<'_> {

    /// Base Y of every segment of the column, bottom first.
    pub fn segment_bases(&self) -> Vec<i32> {
        let size = self.size as i32;
        let height = self.world.height();
        (0..).map(|i| i * size).take_while(|&y| y < height).collect()
    }

    #[inline]
    fn origin(&self, y_base: i32) -> ChunkOrigin {
        ChunkOrigin::of_segment(self.cx, self.cz, y_base, self.size)
    }

    fn passes(&self, kind: NoiseKind, y_base: i32) -> bool {
        self.gate.passes(self.config, kind, self.cx, self.cz, y_base, self.world.sea_level())
    }

    /// Return true if the style is enabled and allowed in this segment, without drawing.
    fn allows(&self, kind: NoiseKind, y_base: i32) -> bool {
        self.config.is_enabled(kind) && segment_allows(kind, y_base, self.world.sea_level())
    }

}


/// What happened in one segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentReport {
    pub y_base: i32,
    /// Voxels carved in this segment, bridges included.
    pub carved: usize,
    /// Bridges carved by the connector.
    pub bridged: usize,
    /// Styles that contributed, in registration order.
    pub ran: Vec<NoiseKind>,
    /// Styles that failed and were skipped.
    pub failed: Vec<NoiseKind>,
}

/// What happened in a column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnReport {
    pub cx: i32,
    pub cz: i32,
    pub segments: Vec<SegmentReport>,
    /// Total carved voxels written to the sink.
    pub carved: usize,
    /// True if the primary fields came from a precomputed bundle.
    pub cache_hit: bool,
}

/// Result of carving a column, the changes are not yet applied.
#[derive(Debug)]
pub struct ColumnOutcome {
    pub buffer: BlockChangeBuffer,
    pub report: ColumnReport,
    /// Primary fields sampled during the pass, when requested and not cached.
    pub fresh: Option<ColumnBundle>,
}


/// Runs the registered carvers over each segment of a column, blends their output,
/// seals entrances, thresholds and bridges the result into a block change buffer.
pub struct MasterCarver {
    carvers: Vec<Box<dyn Carver>>,
    entrance: CaveEntranceStage,
    connector: CaveConnector,
}

impl Default for MasterCarver {
    fn default() -> Self {
        Self::with_carvers(default_carvers())
    }
}

impl MasterCarver {

    /// Create a master carver running the given carvers in order.
    pub fn with_carvers(carvers: Vec<Box<dyn Carver>>) -> Self {
        Self {
            carvers,
            entrance: CaveEntranceStage,
            connector: CaveConnector::default(),
        }
    }

    pub fn with_connector(mut self, connector: CaveConnector) -> Self {
        self.connector = connector;
        self
    }

    /// Kinds whose primary fields may end up in a bundle, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = NoiseKind> + '_ {
        self.carvers.iter().map(|carver| carver.kind()).chain(std::iter::once(NoiseKind::CaveEntrance))
    }

    /// Sample the primary field of every style passing its gate, in every segment.
    pub fn precompute(&self, ctx: &ColumnContext<'_>) -> Result<ColumnBundle, CarveError> {

        let mut bundle = ColumnBundle::new(ctx.cx, ctx.cz);

        for y_base in ctx.segment_bases() {
            let origin = ctx.origin(y_base);
            for kind in self.kinds() {
                if ctx.passes(kind, y_base) {
                    bundle.insert(BundleKey::new(kind, y_base), sample_primary(ctx.sampler, kind, origin)?);
                }
            }
        }

        Ok(bundle)

    }

    /// Carve the whole column. With a bundle, a style runs exactly when its key is
    /// present, otherwise the gates are drawn and, if `collect_fresh` is set, the
    /// sampled primary fields are returned to warm the cache.
    pub fn carve_column(&self, ctx: &ColumnContext<'_>, bundle: Option<&ColumnBundle>, collect_fresh: bool) -> ColumnOutcome {

        let fresh = (bundle.is_none() && collect_fresh).then(|| RefCell::new(ColumnBundle::new(ctx.cx, ctx.cz)));
        let height = ctx.world.height();

        let mut buffer = BlockChangeBuffer::new();
        let mut segments = Vec::new();

        for y_base in ctx.segment_bases() {

            let origin = ctx.origin(y_base);
            let (mask, mut report) = self.carve_segment(ctx, origin, bundle, fresh.as_ref());

            for (x, y, z) in mask.iter_carved() {
                let pos = origin.world(x, y, z);
                if pos.y < height {
                    buffer.set(pos, AIR);
                    report.carved += 1;
                }
            }

            if ctx.config.verbose {
                debug!("column {}/{} segment {y_base}: ran {:?}, carved {}, bridged {}",
                    ctx.cx, ctx.cz, report.ran, report.carved, report.bridged);
            }

            segments.push(report);

        }

        let report = ColumnReport {
            cx: ctx.cx,
            cz: ctx.cz,
            segments,
            carved: buffer.carved_count(),
            cache_hit: bundle.is_some(),
        };

        ColumnOutcome {
            buffer,
            report,
            fresh: fresh.map(RefCell::into_inner),
        }

    }

    /// Carve one segment into its final mask. Failing styles are logged and skipped.
    fn carve_segment(&self,
        ctx: &ColumnContext<'_>,
        origin: ChunkOrigin,
        bundle: Option<&ColumnBundle>,
        fresh: Option<&RefCell<ColumnBundle>>,
    ) -> (VoxelCaveMask, SegmentReport) {

        let y_base = origin.pos.y;
        // A cached bundle records the draws, the current flags still apply.
        let runs = |kind| match bundle {
            Some(bundle) => ctx.allows(kind, y_base) && bundle.contains(BundleKey::new(kind, y_base)),
            None => ctx.passes(kind, y_base),
        };

        let mut report = SegmentReport { y_base, ..Default::default() };
        let mut blended = DensityField::solid(ctx.size);
        let mut rivers = VoxelCaveMask::new(ctx.size);

        for carver in &self.carvers {

            let kind = carver.kind();
            if !runs(kind) {
                continue;
            }

            let mut out = DensityField::solid(ctx.size);
            let result = carver.carve(&self.context(ctx, origin, bundle, fresh, Some(&rivers)), &mut out);

            match result {
                Ok(()) => {
                    blended.min_with(&out);
                    if kind.is_river() {
                        rivers.union_with(&VoxelCaveMask::from_field(&out, CARVE_THRESHOLD));
                    }
                    report.ran.push(kind);
                }
                Err(e) => {
                    warn!("carver {kind} failed in column {}/{} at y {y_base}: {e}", ctx.cx, ctx.cz);
                    report.failed.push(kind);
                }
            }

        }

        if runs(NoiseKind::CaveEntrance) {
            let entrance_ctx = self.context(ctx, origin, bundle, fresh, None);
            match self.entrance.apply(&entrance_ctx, &mut blended) {
                Ok(_) => report.ran.push(NoiseKind::CaveEntrance),
                Err(e) => {
                    warn!("cave entrances failed in column {}/{} at y {y_base}: {e}", ctx.cx, ctx.cz);
                    report.failed.push(NoiseKind::CaveEntrance);
                }
            }
        }

        let mut mask = VoxelCaveMask::from_field(&blended, CARVE_THRESHOLD);
        if mask.count() > 0 {
            match self.connector.connect(&mut mask, origin, &SamplerBridge::new(ctx.sampler)) {
                Ok(bridged) => report.bridged = bridged,
                Err(e) => warn!("connector failed in column {}/{} at y {y_base}: {e}", ctx.cx, ctx.cz),
            }
        }

        (mask, report)

    }

    fn context<'a>(&self,
        ctx: &ColumnContext<'a>,
        origin: ChunkOrigin,
        bundle: Option<&'a ColumnBundle>,
        fresh: Option<&'a RefCell<ColumnBundle>>,
        rivers: Option<&'a VoxelCaveMask>,
    ) -> CarveContext<'a> {
        CarveContext {
            origin,
            chunk_x: ctx.cx,
            chunk_z: ctx.cz,
            world: ctx.world,
            sea_level: ctx.world.sea_level(),
            height: ctx.world.height(),
            biome: ctx.biome,
            config: ctx.config,
            sampler: ctx.sampler,
            fluids: ctx.fluids,
            bundle,
            fresh,
            rivers,
        }
    }

}


#[cfg(test)]
mod tests {

    use std::sync::Arc;

    use crate::config::GateMode;
    use crate::host::{FlatWorld, MemoryFluidRegistry};
    use crate::noise::{NoiseError, NoiseGeneratorPool, PoolLimits};

    use super::*;

    struct Collab {
        world: FlatWorld,
        sampler: DensityFieldSampler,
        fluids: MemoryFluidRegistry,
    }

    impl Collab {

        fn new(height: i32) -> Self {
            let world = FlatWorld::new(77, 110, height, 180);
            let pool = Arc::new(NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(8, 16)));
            let sampler = DensityFieldSampler::new(pool, world.seed, world.sea_level);
            Self { world, sampler, fluids: MemoryFluidRegistry::new() }
        }

        fn context<'a>(&'a self, config: &'a CaveConfig, cx: i32, cz: i32) -> ColumnContext<'a> {
            ColumnContext {
                cx,
                cz,
                world: &self.world,
                biome: BiomeTag::Temperate,
                config,
                sampler: &self.sampler,
                fluids: &self.fluids,
                gate: GateRoller::new(config.gate_mode, self.world.seed),
                size: 32,
            }
        }

    }

    /// Carves everything, or fails.
    struct FixedCarver(NoiseKind, Option<f32>);

    impl Carver for FixedCarver {

        fn kind(&self) -> NoiseKind {
            self.0
        }

        fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {
            let Some(value) = self.1 else {
                return Err(NoiseError::Configuration(self.0).into());
            };
            let size = ctx.size();
            for y in 0..size {
                for z in 0..size {
                    for x in 0..size {
                        out.set(x, y, z, value);
                    }
                }
            }
            Ok(())
        }

    }

    #[test]
    fn segments_cover_the_height() {
        let collab = Collab::new(100);
        let config = CaveConfig::none();
        let bases = collab.context(&config, 0, 0).segment_bases();
        assert_eq!(bases, vec![0, 32, 64, 96]);
    }

    #[test]
    fn failing_carver_does_not_blank_the_column() {

        let collab = Collab::new(64);
        let config = CaveConfig::only(&[NoiseKind::Cheese, NoiseKind::VeinGap]);
        let master = MasterCarver::with_carvers(vec![
            Box::new(FixedCarver(NoiseKind::Cheese, None)),
            Box::new(FixedCarver(NoiseKind::VeinGap, Some(-0.5))),
        ]);

        let outcome = master.carve_column(&collab.context(&config, 1, 2), None, false);
        assert_eq!(outcome.report.carved, 2 * 32 * 32 * 32);
        assert_eq!(outcome.buffer.get(glam::IVec3::new(32, 5, 64)), Some(AIR));
        for segment in &outcome.report.segments {
            assert_eq!(segment.failed, vec![NoiseKind::Cheese]);
            assert_eq!(segment.ran, vec![NoiseKind::VeinGap]);
        }

    }

    #[test]
    fn blend_takes_the_minimum() {

        let collab = Collab::new(32);
        let config = CaveConfig::only(&[NoiseKind::Cheese, NoiseKind::VeinGap]);

        // A solid style never fills what another carved.
        let master = MasterCarver::with_carvers(vec![
            Box::new(FixedCarver(NoiseKind::Cheese, Some(-0.2))),
            Box::new(FixedCarver(NoiseKind::VeinGap, Some(0.9))),
        ]);
        let outcome = master.carve_column(&collab.context(&config, 0, 0), None, false);
        assert_eq!(outcome.report.carved, 32 * 32 * 32);

        // Nothing is carved at exactly the threshold.
        let master = MasterCarver::with_carvers(vec![Box::new(FixedCarver(NoiseKind::Cheese, Some(0.0)))]);
        let outcome = master.carve_column(&collab.context(&config, 0, 0), None, false);
        assert_eq!(outcome.report.carved, 0);
        assert!(outcome.buffer.is_empty());

    }

    #[test]
    fn writes_stop_at_world_height() {
        let collab = Collab::new(40);
        let config = CaveConfig::only(&[NoiseKind::Cheese]);
        let master = MasterCarver::with_carvers(vec![Box::new(FixedCarver(NoiseKind::Cheese, Some(-1.0)))]);
        let outcome = master.carve_column(&collab.context(&config, 0, 0), None, false);
        assert_eq!(outcome.report.carved, 40 * 32 * 32);
        assert_eq!(outcome.report.segments[1].carved, 8 * 32 * 32);
    }

    #[test]
    fn bundle_decides_which_styles_run() {

        let collab = Collab::new(256);
        let mut config = CaveConfig::default();
        config.gate_mode = GateMode::Seeded;
        let master = MasterCarver::default();
        let ctx = collab.context(&config, 4, -7);

        let bundle = master.precompute(&ctx).unwrap();
        let cached = master.carve_column(&ctx, Some(&bundle), true);
        assert!(cached.report.cache_hit);
        assert!(cached.fresh.is_none());

        for segment in &cached.report.segments {
            for kind in &segment.ran {
                assert!(bundle.contains(BundleKey::new(*kind, segment.y_base)));
            }
        }

        // Seeded gates draw the same styles again, so the fresh pass is identical.
        let fresh = master.carve_column(&ctx, None, true);
        assert!(!fresh.report.cache_hit);
        assert_eq!(fresh.report.segments, cached.report.segments);
        let collected = fresh.fresh.unwrap();
        for key in collected.keys() {
            assert!(bundle.contains(key));
        }

    }

    #[test]
    fn disabled_style_skipped_despite_bundle() {

        let collab = Collab::new(64);
        let mut config = CaveConfig::only(&[NoiseKind::Cheese]);
        config.cheese.threshold_bias = 3.0;
        let master = MasterCarver::default();

        let bundle = master.precompute(&collab.context(&config, 0, 0)).unwrap();
        assert!(bundle.contains(BundleKey::new(NoiseKind::Cheese, 0)));
        let before = master.carve_column(&collab.context(&config, 0, 0), Some(&bundle), false);
        assert!(before.report.carved > 0);

        // The style was turned off after the bundle was computed.
        let reloaded = CaveConfig::none();
        let after = master.carve_column(&collab.context(&reloaded, 0, 0), Some(&bundle), false);
        assert!(after.report.cache_hit);
        assert_eq!(after.report.carved, 0);
        assert!(after.report.segments.iter().all(|segment| segment.ran.is_empty()));

    }

}
