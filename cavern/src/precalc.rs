//! Background precomputation of column bundles around tracked positions.
//!
//! A fixed set of workers share one request queue for columns entering the radius of
//! the tracked position. Each worker also owns a warmup queue, used to split the spawn
//! area between all workers and wait on a barrier until every slice is done. Results
//! go into a bounded cache evicting the columns farthest from the tracked position.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;

use crossbeam_channel::{select, unbounded, Receiver, RecvError, Sender};
use glam::{DVec2, DVec3, IVec2};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::carve::{CarveError, ColumnBundle};
use crate::column::ColumnEngine;
use crate::config::CavernSettings;


/// Errors of a column precomputation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrecomputeError {
    #[error("carve: {0}")]
    Carve(#[from] CarveError),
    #[error("worker panicked: {0}")]
    Panicked(String),
}


/// Handle to the precompute workers and their cache. Dropping it disconnects the
/// queues and the workers exit after their current column.
pub struct CaveMapPrecalculator {
    shared: Arc<Shared>,
    /// Queue shared by all workers for on-demand columns.
    request_sender: Sender<PrecalcRequest>,
    /// One warmup queue per worker.
    warmup_senders: Vec<Sender<WarmupSlice>>,
}

/// State shared between the handle and the workers.
struct Shared {
    engine: Arc<ColumnEngine>,
    radius: i32,
    max_cached: usize,
    state: RwLock<CacheState>,
    stats: Stats,
}

/// A column to precompute, the ticket identifies this particular request.
#[derive(Debug, Clone, Copy)]
struct PrecalcRequest {
    cx: i32,
    cz: i32,
    ticket: u64,
}

/// The columns of the spawn area given to one worker, ticketed like requests.
struct WarmupSlice {
    columns: Vec<PrecalcRequest>,
    barrier: Arc<Barrier>,
}

struct PrecalcWorker {
    shared: Arc<Shared>,
    request_receiver: Receiver<PrecalcRequest>,
    warmup_receiver: Receiver<WarmupSlice>,
}

#[derive(Debug, Default)]
struct Stats {
    computed: AtomicU64,
    failed: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evicted: AtomicU64,
}

/// Counters of the precalculator since its creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecalcStats {
    pub computed: u64,
    pub failed: u64,
    pub hits: u64,
    pub misses: u64,
    pub evicted: u64,
}


/// The cached bundles and in-flight markers.
#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<(i32, i32), Arc<ColumnBundle>>,
    /// Columns being computed, with the ticket of the request in flight.
    in_progress: HashMap<(i32, i32), u64>,
    next_ticket: u64,
    /// Last tracked position, in chunk column coordinates.
    tracked: Option<DVec2>,
    /// Block position of the last tracking update that queued columns.
    last_trigger: Option<DVec3>,
}

impl CacheState {

    /// Mark a column in progress if it is neither cached nor already in flight.
    fn begin(&mut self, key: (i32, i32)) -> Option<u64> {
        if self.entries.contains_key(&key) || self.in_progress.contains_key(&key) {
            return None;
        }
        self.next_ticket += 1;
        self.in_progress.insert(key, self.next_ticket);
        Some(self.next_ticket)
    }

    /// Return true if the ticket is still the one in flight for this column.
    fn is_current(&self, key: (i32, i32), ticket: u64) -> bool {
        self.in_progress.get(&key) == Some(&ticket)
    }

    /// Insert an entry, then evict the farthest entries until the bound holds. Returns
    /// the evicted keys.
    fn insert(&mut self, key: (i32, i32), bundle: Arc<ColumnBundle>, max: usize) -> Vec<(i32, i32)> {

        self.in_progress.remove(&key);
        self.entries.insert(key, bundle);

        let mut evicted = Vec::new();
        while self.entries.len() > max {
            match self.farthest() {
                Some(far) => {
                    self.entries.remove(&far);
                    evicted.push(far);
                }
                None => break,
            }
        }

        evicted

    }

    /// The entry farthest from the tracked position, ties broken by the greatest key.
    fn farthest(&self) -> Option<(i32, i32)> {
        let tracked = self.tracked.unwrap_or(DVec2::ZERO);
        self.entries.keys()
            .map(|&(cx, cz)| (DVec2::new(cx as f64, cz as f64).distance_squared(tracked), (cx, cz)))
            .max_by(|(da, ka), (db, kb)| da.total_cmp(db).then(ka.cmp(kb)))
            .map(|(_, key)| key)
    }

}


impl CaveMapPrecalculator {

    /// Start the workers, at least one.
    pub(crate) fn new(engine: Arc<ColumnEngine>, settings: &CavernSettings) -> Self {

        let (request_sender, request_receiver) = unbounded();

        let shared = Arc::new(Shared {
            engine,
            radius: settings.precompute_radius.max(0),
            max_cached: settings.max_cached_columns.max(1),
            state: RwLock::new(CacheState::default()),
            stats: Stats::default(),
        });

        let workers = settings.worker_threads.max(1);
        let mut warmup_senders = Vec::with_capacity(workers);

        for i in 0..workers {

            let (warmup_sender, warmup_receiver) = unbounded();
            warmup_senders.push(warmup_sender);

            let worker = PrecalcWorker {
                shared: Arc::clone(&shared),
                request_receiver: request_receiver.clone(),
                warmup_receiver,
            };

            thread::Builder::new()
                .name(format!("Cave Precompute Worker #{i}"))
                .spawn(move || worker.run())
                .expect("failed to spawn precompute worker");

        }

        Self {
            shared,
            request_sender,
            warmup_senders,
        }

    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.warmup_senders.len()
    }

    /// Get the cached bundle of a column, counting hits and misses.
    pub fn get(&self, cx: i32, cz: i32) -> Option<Arc<ColumnBundle>> {
        let bundle = self.shared.read_state().entries.get(&(cx, cz)).cloned();
        let counter = if bundle.is_some() { &self.shared.stats.hits } else { &self.shared.stats.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        bundle
    }

    pub fn contains(&self, cx: i32, cz: i32) -> bool {
        self.shared.read_state().entries.contains_key(&(cx, cz))
    }

    pub fn is_in_progress(&self, cx: i32, cz: i32) -> bool {
        self.shared.read_state().in_progress.contains_key(&(cx, cz))
    }

    pub fn len(&self) -> usize {
        self.shared.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PrecalcStats {
        let stats = &self.shared.stats;
        PrecalcStats {
            computed: stats.computed.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            hits: stats.hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
            evicted: stats.evicted.load(Ordering::Relaxed),
        }
    }

    /// Store a bundle computed elsewhere, any request in flight for it is superseded.
    pub fn store(&self, bundle: ColumnBundle) {
        let key = bundle.chunk();
        self.shared.insert(key, Arc::new(bundle));
    }

    /// Drop the cached bundle of a column and forget any request in flight for it, a
    /// late result of that request is discarded.
    pub fn invalidate_column(&self, cx: i32, cz: i32) {
        let mut state = self.shared.write_state();
        state.entries.remove(&(cx, cz));
        state.in_progress.remove(&(cx, cz));
    }

    /// Compute and cache a column on the calling thread.
    pub fn precompute_column(&self, cx: i32, cz: i32) -> Result<Arc<ColumnBundle>, PrecomputeError> {
        let bundle = Arc::new(self.shared.compute(cx, cz)?);
        self.shared.insert((cx, cz), Arc::clone(&bundle));
        Ok(bundle)
    }

    /// Update the tracked position and queue every column of the radius around it that
    /// is neither cached nor in flight. Nothing happens until the position moves more
    /// than two chunks from the last update that queued columns. Returns the number of
    /// queued columns.
    pub fn track_player(&self, pos: DVec3) -> usize {

        let size = self.shared.engine.chunk_size() as f64;
        let center = chunk_of(pos, size);

        let keys = {

            let mut state = self.shared.write_state();
            state.tracked = Some(center.as_dvec2());

            if let Some(last) = state.last_trigger {
                let moved = DVec2::new(pos.x - last.x, pos.z - last.z).length();
                if moved <= size * 2.0 {
                    return 0;
                }
            }

            state.last_trigger = Some(pos);

            self.shared.columns_around(center)
                .filter_map(|key| state.begin(key).map(|ticket| (key, ticket)))
                .collect::<Vec<_>>()

        };

        for &((cx, cz), ticket) in &keys {
            // Workers only disconnect when this handle is dropped.
            let _ = self.request_sender.send(PrecalcRequest { cx, cz, ticket });
        }

        if !keys.is_empty() {
            debug!("queued {} columns around {center}", keys.len());
        }

        keys.len()

    }

    /// Precompute every column of the radius around the given position that is neither
    /// cached nor in flight, split between all workers, and return once all of them are
    /// done. Returns the number of columns computed this way.
    pub fn warm_spawn(&self, center: DVec3) -> usize {

        let size = self.shared.engine.chunk_size() as f64;
        let center = chunk_of(center, size);

        let columns = {
            let mut state = self.shared.write_state();
            state.tracked = Some(center.as_dvec2());
            self.shared.columns_around(center)
                .filter_map(|(cx, cz)| state.begin((cx, cz)).map(|ticket| PrecalcRequest { cx, cz, ticket }))
                .collect::<Vec<_>>()
        };

        let workers = self.warmup_senders.len();
        let mut slices = vec![Vec::new(); workers];
        for (i, request) in columns.iter().enumerate() {
            slices[i % workers].push(*request);
        }

        let barrier = Arc::new(Barrier::new(workers + 1));
        for (sender, columns) in self.warmup_senders.iter().zip(slices) {
            let slice = WarmupSlice { columns: columns.clone(), barrier: Arc::clone(&barrier) };
            if sender.send(slice).is_err() {
                // The worker is gone and will never reach the barrier.
                error!("precompute worker disconnected, spawn warmup aborted");
                let mut state = self.shared.write_state();
                for request in &columns {
                    if state.is_current((request.cx, request.cz), request.ticket) {
                        state.in_progress.remove(&(request.cx, request.cz));
                    }
                }
                return 0;
            }
        }

        barrier.wait();
        info!("warmed {} columns around spawn column {center}", columns.len());
        columns.len()

    }

}


impl Shared {

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Columns within the Euclidean radius of the center column.
    fn columns_around(&self, center: IVec2) -> impl Iterator<Item = (i32, i32)> {
        let radius = self.radius;
        (-radius..=radius)
            .flat_map(move |dz| (-radius..=radius).map(move |dx| (dx, dz)))
            .filter(move |&(dx, dz)| dx * dx + dz * dz <= radius * radius)
            .map(move |(dx, dz)| (center.x + dx, center.y + dz))
    }

    /// Compute a bundle, catching panics so that a worker survives them.
    fn compute(&self, cx: i32, cz: i32) -> Result<ColumnBundle, PrecomputeError> {

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.engine.precompute(cx, cz)));
        let result = match result {
            Ok(result) => result.map_err(PrecomputeError::from),
            Err(payload) => {
                let message = payload.downcast_ref::<&str>().map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(PrecomputeError::Panicked(message))
            }
        };

        match &result {
            Ok(_) => self.stats.computed.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.failed.fetch_add(1, Ordering::Relaxed),
        };

        result

    }

    fn insert(&self, key: (i32, i32), bundle: Arc<ColumnBundle>) {
        let evicted = self.write_state().insert(key, bundle, self.max_cached);
        if !evicted.is_empty() {
            self.stats.evicted.fetch_add(evicted.len() as u64, Ordering::Relaxed);
            debug!("evicted {} cached columns", evicted.len());
        }
    }

}


impl PrecalcWorker {

    fn run(self) {
        while let Ok(true) = self.handle() { }
    }

    /// Handle one message, return Ok(false) or an error to stop the worker.
    fn handle(&self) -> Result<bool, RecvError> {
        Ok(select! {
            recv(self.request_receiver) -> request => self.handle_request(request?),
            recv(self.warmup_receiver) -> slice => self.handle_warmup(slice?),
        })
    }

    fn handle_request(&self, request: PrecalcRequest) -> bool {
        self.precompute(request);
        true
    }

    fn handle_warmup(&self, slice: WarmupSlice) -> bool {
        for &request in &slice.columns {
            self.precompute(request);
        }
        slice.barrier.wait();
        true
    }

    /// Compute the column of a request and cache it, unless the request has been
    /// superseded meanwhile.
    fn precompute(&self, request: PrecalcRequest) {

        let key = (request.cx, request.cz);
        if !self.shared.read_state().is_current(key, request.ticket) {
            return;
        }

        let result = self.shared.compute(request.cx, request.cz);

        let mut state = self.shared.write_state();
        if !state.is_current(key, request.ticket) {
            debug!("discarding superseded result of column {}/{}", request.cx, request.cz);
            return;
        }

        match result {
            Ok(bundle) => {
                let evicted = state.insert(key, Arc::new(bundle), self.shared.max_cached);
                self.shared.stats.evicted.fetch_add(evicted.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                state.in_progress.remove(&key);
                error!("failed to precompute column {}/{}: {e}", request.cx, request.cz);
            }
        }

    }

}


/// Chunk column containing a block position.
fn chunk_of(pos: DVec3, size: f64) -> IVec2 {
    IVec2::new((pos.x / size).floor() as i32, (pos.z / size).floor() as i32)
}
