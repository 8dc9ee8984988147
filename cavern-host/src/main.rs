//! A headless host carving caves in an in-memory world while a simulated player walks
//! through it, logging what the generator and its precalculator do.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DVec3;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cavern::host::MemoryFluidRegistry;
use cavern::{CaveConfig, CaveGenerator, CavernSettings, Collaborators, ConfigHandle};

pub mod config;
pub mod world;

use world::{CountingSink, HillsWorld};


/// Target duration of one walk step.
const STEP_DURATION: Duration = Duration::from_millis(50);
/// Number of walk steps before the host stops by itself.
const STEP_COUNT: u32 = 200;
/// Blocks walked at each step.
const STEP_LENGTH: f64 = 6.0;
/// Radius, in columns, generated around the player at each step.
const VIEW_RADIUS: i32 = 2;


pub fn main() {

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || handler_running.store(false, Ordering::Relaxed)) {
        warn!("failed to install interrupt handler: {e}");
    }

    let mut settings = CavernSettings::default();
    if let Some(workers) = config::workers() {
        settings.worker_threads = workers;
    }

    let mut cave_config = CaveConfig::default();
    cave_config.verbose = config::verbose();

    let fluids = Arc::new(MemoryFluidRegistry::new());
    let collab = Collaborators::new(Arc::new(HillsWorld::new(config::seed())))
        .with_fluids(fluids.clone());

    let chunk_size = settings.chunk_size as i32;
    let generator = CaveGenerator::new(collab, settings, ConfigHandle::new(cave_config));

    let spawn = DVec3::new(0.0, 100.0, 0.0);
    let start = Instant::now();
    let warmed = generator.warm_spawn(spawn);
    info!("spawn area of {warmed} columns ready in {:?}", start.elapsed());

    let mut sink = CountingSink::new(chunk_size as usize);
    let mut pos = spawn;
    let mut generated = HashSet::new();

    for step in 0..STEP_COUNT {

        if !running.load(Ordering::Relaxed) {
            info!("interrupted at step {step}");
            break;
        }

        let step_start = Instant::now();

        // Walk along a slow spiral so that new columns keep entering the radius.
        let angle = step as f64 * 0.05;
        pos += DVec3::new(angle.cos(), 0.0, angle.sin()) * STEP_LENGTH;
        generator.track_player(pos);

        let cx = (pos.x / chunk_size as f64).floor() as i32;
        let cz = (pos.z / chunk_size as f64).floor() as i32;
        for dz in -VIEW_RADIUS..=VIEW_RADIUS {
            for dx in -VIEW_RADIUS..=VIEW_RADIUS {
                let (x, z) = (cx + dx, cz + dz);
                if !generated.insert((x, z)) {
                    continue;
                }
                if let Err(e) = generator.generate_column(x, z, &mut sink) {
                    error!("failed to generate column {x}/{z}: {e}");
                }
            }
        }

        if let Some(missing) = STEP_DURATION.checked_sub(step_start.elapsed()) {
            std::thread::sleep(missing);
        }

    }

    let stats = generator.precalc().stats();
    info!("generated {} columns in {} passes, {} writes, {} carved voxels in {} columns, {} fluids placed",
        generated.len(), sink.commits(), sink.writes(), sink.total_carved(), sink.columns(), fluids.len());
    info!("precalc: {} cached, {} computed, {} failed, {} hits, {} misses, {} evicted",
        generator.precalc().len(), stats.computed, stats.failed, stats.hits, stats.misses, stats.evicted);

}
