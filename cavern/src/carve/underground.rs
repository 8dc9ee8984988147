//! Underground rivers, tunnels walked downhill from sources under mountains.
//!
//! Unlike the other styles, rivers are not a threshold over a noise volume. Sources are
//! picked on the primary XZ plane, then each one is walked toward the lowest noise of
//! its neighbours, one block down per step, carving a short cylinder at every node.

use std::cmp::Ordering;

use glam::IVec3;
use tracing::trace;

use crate::field::DensityField;
use crate::host::FluidKind;
use crate::noise::NoiseKind;

use super::{plane, CarveContext, CarveError, Carver};


/// Minimum weighted noise of a source column.
const SOURCE_THRESHOLD: f32 = 0.1;
/// Terrain must rise this high above the sea level for a tunnel to run under it.
const MOUNTAIN_CLEARANCE: i32 = 30;
/// Tunnels start this far below the surface, and no higher than this above the sea.
const SOURCE_DEPTH: i32 = 10;
const SOURCE_MAX_ABOVE_SEA: i32 = 20;
const TUNNEL_HEIGHT: i32 = 3;
const STEP_BUDGET: u32 = 100;


/// A river source, local to the segment.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Source {
    pos: IVec3,
    flow: f32,
}

/// Progress of the river walk of one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RiverState {
    FindSources,
    WalkPath { node: IVec3, width: i32, step: u32 },
    Terminate,
}


pub struct UndergroundRiverCarver;

impl Carver for UndergroundRiverCarver {

    fn kind(&self) -> NoiseKind {
        NoiseKind::UndergroundRiver
    }

    fn carve(&self, ctx: &CarveContext<'_>, out: &mut DensityField) -> Result<(), CarveError> {

        let noise = ctx.primary(NoiseKind::UndergroundRiver)?;
        let walk = RiverWalk { ctx, noise: &noise };

        let mut sources = Vec::new();
        let mut state = RiverState::FindSources;

        loop {
            state = match state {
                RiverState::FindSources => {
                    sources = walk.find_sources();
                    sources.reverse();
                    walk.start(sources.pop())
                }
                RiverState::WalkPath { node, width, step } => {
                    walk.carve_section(out, node, width);
                    match walk.next_node(node) {
                        Some(next) if step + 1 < STEP_BUDGET && !walk.is_liquid(node) => {
                            RiverState::WalkPath { node: next, width, step: step + 1 }
                        }
                        _ => {
                            trace!("river walk ended at {node} after {} steps", step + 1);
                            walk.start(sources.pop())
                        }
                    }
                }
                RiverState::Terminate => break,
            };
        }

        Ok(())

    }

}


/// Shared state of the walks of one segment.
struct RiverWalk<'a, 'b> {
    ctx: &'a CarveContext<'b>,
    noise: &'a [f32],
}

impl RiverWalk<'_, '_> {

    fn size(&self) -> i32 {
        self.ctx.size() as i32
    }

    fn noise_at(&self, x: i32, z: i32) -> f32 {
        plane(self.noise, self.ctx.size(), x as usize, z as usize)
    }

    fn surface_at(&self, x: i32, z: i32) -> i32 {
        let pos = self.ctx.origin.pos;
        self.ctx.world.surface_height(pos.x + x, pos.z + z)
    }

    fn under_mountain(&self, x: i32, z: i32) -> bool {
        self.surface_at(x, z) > self.ctx.sea_level + MOUNTAIN_CLEARANCE
    }

    fn is_liquid(&self, node: IVec3) -> bool {
        self.ctx.world.is_liquid(self.ctx.origin.pos + node)
    }

    /// Sources of this segment, strongest first, limited to the configured count.
    fn find_sources(&self) -> Vec<Source> {

        let size = self.size();
        let wet = self.ctx.wet_multiplier();
        let mut sources = Vec::new();

        for z in 0..size {
            for x in 0..size {

                let flow = self.noise_at(x, z);
                if flow * wet <= SOURCE_THRESHOLD || !self.under_mountain(x, z) {
                    continue;
                }

                let tunnel_y = (self.surface_at(x, z) - SOURCE_DEPTH).min(self.ctx.sea_level + SOURCE_MAX_ABOVE_SEA);
                let local_y = tunnel_y - self.ctx.origin.pos.y;
                if (0..size).contains(&local_y) {
                    sources.push(Source { pos: IVec3::new(x, local_y, z), flow });
                }

            }
        }

        sources.sort_by(|a, b| {
            b.flow.partial_cmp(&a.flow)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.pos.to_array().cmp(&b.pos.to_array()))
        });
        sources.truncate(self.ctx.config.river_sources);
        sources

    }

    /// State walking from the given source, or terminate if there is none left.
    fn start(&self, source: Option<Source>) -> RiverState {
        match source {
            Some(source) => {
                let min = *self.ctx.config.river_width.start();
                let max = *self.ctx.config.river_width.end();
                let width = (min + (max - min) * source.flow).clamp(min, max) as i32;
                RiverState::WalkPath { node: source.pos, width, step: 0 }
            }
            None => RiverState::Terminate,
        }
    }

    /// Carve the cylinder of a node, its lowest ring is filled with water.
    fn carve_section(&self, out: &mut DensityField, node: IVec3, width: i32) {

        let size = self.size();

        for dy in 0..TUNNEL_HEIGHT {
            let y = node.y + dy;
            if !(0..size).contains(&y) {
                continue;
            }
            for dz in -width..=width {
                for dx in -width..=width {
                    let (x, z) = (node.x + dx, node.z + dz);
                    if dx * dx + dz * dz > width * width || !(0..size).contains(&x) || !(0..size).contains(&z) {
                        continue;
                    }
                    out.set(x as usize, y as usize, z as usize, -1.0);
                    if dy == 0 {
                        let pos = self.ctx.origin.world(x as usize, y as usize, z as usize);
                        self.ctx.fluids.mark_fluid(pos, FluidKind::Water);
                    }
                }
            }
        }

    }

    /// The lowest-noise neighbour under a mountain, one block lower.
    fn next_node(&self, node: IVec3) -> Option<IVec3> {

        let size = self.size();
        let mut best: Option<(f32, IVec3)> = None;

        for dx in -1..=1 {
            for dz in -1..=1 {
                let (x, z) = (node.x + dx, node.z + dz);
                if (dx == 0 && dz == 0) || !(0..size).contains(&x) || !(0..size).contains(&z) {
                    continue;
                }
                let noise = self.noise_at(x, z);
                if best.is_some_and(|(lowest, _)| noise >= lowest) || !self.under_mountain(x, z) {
                    continue;
                }
                best = Some((noise, IVec3::new(x, (node.y - 1).max(0), z)));
            }
        }

        best.map(|(_, next)| next)

    }

}


#[cfg(test)]
mod tests {

    use crate::config::CaveConfig;
    use crate::field::ChunkOrigin;
    use crate::host::FluidRegistry;
    use super::super::testing::{carved, Fixture};

    use super::*;

    /// Find a segment origin whose primary plane has at least one source.
    fn origin_with_source(fixture: &Fixture) -> ChunkOrigin {
        (0..64)
            .map(|i| ChunkOrigin::new(IVec3::new(i * 32, 128, -i * 32), 32))
            .find(|&origin| {
                let ctx = fixture.context(origin);
                let noise = ctx.primary(NoiseKind::UndergroundRiver).unwrap();
                noise.iter().any(|&n| n > SOURCE_THRESHOLD)
            })
            .expect("no river source in 64 segments")
    }

    #[test]
    fn rivers_flood_their_floor() {

        let fixture = Fixture::new(CaveConfig::only(&[NoiseKind::UndergroundRiver]));
        let origin = origin_with_source(&fixture);

        let mut out = DensityField::solid(32);
        UndergroundRiverCarver.carve(&fixture.context(origin), &mut out).unwrap();
        assert!(carved(&out) > 0);
        assert!(!fixture.fluids.is_empty());

        // Sources start at sea level + 20, rivers only go down from there.
        for (pos, kind) in fixture.fluids.drain() {
            assert_eq!(kind, FluidKind::Water);
            assert!(pos.y <= 130);
            let (x, y, z) = origin.local(pos).unwrap();
            assert!(out.get(x, y, z) < 0.0);
        }

    }

    #[test]
    fn no_river_without_mountains() {
        let mut fixture = Fixture::new(CaveConfig::only(&[NoiseKind::UndergroundRiver]));
        let origin = origin_with_source(&fixture);
        fixture.world.surface = 130;
        let mut out = DensityField::solid(32);
        UndergroundRiverCarver.carve(&fixture.context(origin), &mut out).unwrap();
        assert_eq!(carved(&out), 0);
        assert!(fixture.fluids.is_empty());
    }

    #[test]
    fn liquid_stops_the_walk() {

        let mut config = CaveConfig::only(&[NoiseKind::UndergroundRiver]);
        config.river_sources = 1;
        let mut fixture = Fixture::new(config);
        let origin = origin_with_source(&fixture);

        let ctx = fixture.context(origin);
        let noise = ctx.primary(NoiseKind::UndergroundRiver).unwrap();
        let source = RiverWalk { ctx: &ctx, noise: &noise }.find_sources()[0];
        drop(ctx);

        let mut free = DensityField::solid(32);
        UndergroundRiverCarver.carve(&fixture.context(origin), &mut free).unwrap();

        fixture.world.liquids.insert(origin.pos + source.pos);
        let mut blocked = DensityField::solid(32);
        UndergroundRiverCarver.carve(&fixture.context(origin), &mut blocked).unwrap();

        assert!(carved(&blocked) > 0);
        assert!(carved(&blocked) <= carved(&free));

        // Only the source section is carved, at most 5 blocks away from its center.
        for y in 0..32 {
            for z in 0..32 {
                for x in 0..32 {
                    if blocked.get(x, y, z) < 0.0 {
                        let d = IVec3::new(x as i32, 0, z as i32) - IVec3::new(source.pos.x, 0, source.pos.z);
                        assert!(d.length_squared() <= 25);
                        assert!(fixture.fluids.fluid(origin.pos + IVec3::new(x as i32, source.pos.y, z as i32)).is_some());
                    }
                }
            }
        }

    }

}
