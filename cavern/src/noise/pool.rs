//! A bounded pool of fractal noise generators per noise kind.
//!
//! Generators are expensive to set up (one permutation table per octave and seed) and
//! are not meant to be used by two threads at once, so each worker rents its own handle
//! and gives it back when done. The number of handles ever created for a kind is capped
//! by a hard ceiling, past that point renting blocks until another worker restores one.
//! Numeric evaluation itself goes through a single gate owned by the pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::DVec3;

use tracing::warn;

use crate::util::FractalNoise;

use super::{NoiseError, NoiseKind, NoiseParams};


/// Number of seeds a handle keeps set up before discarding the oldest one.
const PREPARED_SEEDS: usize = 8;


/// Soft and hard bounds on the number of live handles per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Creating a handle past this count logs a one-time warning for the kind.
    pub soft: usize,
    /// No more handles than this are ever created for a kind.
    pub hard: usize,
}

impl PoolLimits {

    /// Compute the limits from the expected workload: every worker thread may sample
    /// every kind for every vertical segment of a column at the same time, the hard
    /// ceiling adds the safety factor on top of it.
    pub fn from_workload(threads: usize, kinds: usize, segments: usize, safety_factor: usize) -> Self {
        let soft = threads.max(1) * kinds.max(1) * segments.max(1);
        Self {
            soft,
            hard: soft * safety_factor.max(1),
        }
    }

    pub fn fixed(soft: usize, hard: usize) -> Self {
        let hard = hard.max(1);
        Self { soft: soft.min(hard), hard }
    }

}


/// A noise evaluator bound to the parameters of exactly one kind.
#[derive(Debug)]
pub struct NoiseHandle {
    kind: NoiseKind,
    params: NoiseParams,
    /// Generators already set up for recently used seeds, oldest first.
    prepared: Vec<(i64, FractalNoise)>,
}

impl NoiseHandle {

    fn new(kind: NoiseKind) -> Self {
        Self {
            kind,
            params: kind.params(),
            prepared: Vec::with_capacity(PREPARED_SEEDS),
        }
    }

    #[inline]
    pub fn kind(&self) -> NoiseKind {
        self.kind
    }

    /// Get the generator for the given seed, setting it up if needed.
    fn prepare(&mut self, seed: i64) -> &FractalNoise {

        if let Some(index) = self.prepared.iter().position(|(s, _)| *s == seed) {
            return &self.prepared[index].1;
        }

        if self.prepared.len() >= PREPARED_SEEDS {
            self.prepared.remove(0);
        }

        let noise = FractalNoise::new(seed, self.params.octaves, self.params.lacunarity, self.params.gain);
        self.prepared.push((seed, noise));
        let last = self.prepared.len() - 1;
        &self.prepared[last].1

    }

}


/// Per-kind bookkeeping, idle handles wait in an unbounded channel.
struct KindSlot {
    idle_sender: Sender<NoiseHandle>,
    idle_receiver: Receiver<NoiseHandle>,
    /// Number of handles ever created for this kind, they are never destroyed.
    live: AtomicUsize,
    overflow_warned: AtomicBool,
}

/// The noise generator pool, shared by reference between all sampling threads.
pub struct NoiseGeneratorPool {
    slots: HashMap<NoiseKind, KindSlot>,
    limits: PoolLimits,
    /// Serializes numeric evaluation when present.
    eval_gate: Option<Mutex<()>>,
}

impl NoiseGeneratorPool {

    /// Create a pool accepting only the given kinds.
    pub fn new(kinds: impl IntoIterator<Item = NoiseKind>, limits: PoolLimits) -> Self {

        let slots = kinds.into_iter()
            .map(|kind| {
                let (idle_sender, idle_receiver) = unbounded();
                (kind, KindSlot {
                    idle_sender,
                    idle_receiver,
                    live: AtomicUsize::new(0),
                    overflow_warned: AtomicBool::new(false),
                })
            })
            .collect();

        Self {
            slots,
            limits,
            eval_gate: Some(Mutex::new(())),
        }

    }

    /// Create a pool accepting every known kind.
    pub fn with_all_kinds(limits: PoolLimits) -> Self {
        Self::new(NoiseKind::ALL, limits)
    }

    /// Choose whether evaluation calls are serialized behind the pool's gate, they are
    /// by default.
    pub fn with_serialized_eval(mut self, serialized: bool) -> Self {
        self.eval_gate = serialized.then(|| Mutex::new(()));
        self
    }

    #[inline]
    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    #[inline]
    pub fn is_registered(&self, kind: NoiseKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Number of handles created so far for the kind.
    pub fn live(&self, kind: NoiseKind) -> usize {
        self.slots.get(&kind).map_or(0, |slot| slot.live.load(Ordering::Acquire))
    }

    /// Number of handles currently waiting to be rented for the kind.
    pub fn idle(&self, kind: NoiseKind) -> usize {
        self.slots.get(&kind).map_or(0, |slot| slot.idle_receiver.len())
    }

    /// Rent a handle for the given kind. An idle handle is returned if any, else a new
    /// one is created if the hard ceiling allows it, else this blocks until a handle of
    /// this kind is restored by another thread.
    pub fn rent(&self, kind: NoiseKind) -> Result<NoiseLease<'_>, NoiseError> {

        let slot = self.slots.get(&kind).ok_or(NoiseError::Configuration(kind))?;

        if let Ok(handle) = slot.idle_receiver.try_recv() {
            return Ok(NoiseLease::new(self, handle));
        }

        let mut live = slot.live.load(Ordering::Acquire);
        while live < self.limits.hard {
            match slot.live.compare_exchange_weak(live, live + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    if live + 1 > self.limits.soft && !slot.overflow_warned.swap(true, Ordering::Relaxed) {
                        warn!("noise pool for {kind} exceeded its soft size of {}, creating overflow generators up to {}",
                            self.limits.soft, self.limits.hard);
                    }
                    return Ok(NoiseLease::new(self, NoiseHandle::new(kind)));
                }
                Err(actual) => live = actual,
            }
        }

        let handle = slot.idle_receiver.recv()
            .expect("pool owns both ends of its idle channel");

        Ok(NoiseLease::new(self, handle))

    }

    /// Give a handle back to the pool, it is routed to the slot of its own kind.
    pub fn restore(&self, handle: NoiseHandle) {
        if let Some(slot) = self.slots.get(&handle.kind) {
            // The receiver lives as long as the pool, this cannot fail.
            let _ = slot.idle_sender.send(handle);
        }
    }

    fn enter_eval(&self) -> Option<MutexGuard<'_, ()>> {
        self.eval_gate.as_ref().map(|gate| gate.lock().unwrap_or_else(PoisonError::into_inner))
    }

}


/// A rented handle, restored to its pool when dropped.
pub struct NoiseLease<'p> {
    pool: &'p NoiseGeneratorPool,
    handle: Option<NoiseHandle>,
}

impl<'p> NoiseLease<'p> {

    fn new(pool: &'p NoiseGeneratorPool, handle: NoiseHandle) -> Self {
        Self { pool, handle: Some(handle) }
    }

    #[inline]
    fn handle_mut(&mut self) -> &mut NoiseHandle {
        self.handle.as_mut().expect("handle is only taken on drop or detach")
    }

    pub fn kind(&self) -> NoiseKind {
        self.handle.as_ref().expect("handle is only taken on drop or detach").kind
    }

    /// Evaluate a single point, the position is given in noise space.
    pub fn point(&mut self, seed: i64, pos: DVec3) -> f32 {
        let pool = self.pool;
        let noise = self.handle_mut().prepare(seed);
        let _gate = pool.enter_eval();
        noise.gen_3d_point(pos) as f32
    }

    /// Evaluate a regular grid, see [`FractalNoise::gen_3d_grid`] for the layout.
    pub fn grid(&mut self, seed: i64, start: DVec3, stride: f64, step: DVec3, dims: [usize; 3], out: &mut [f32]) {
        let pool = self.pool;
        let noise = self.handle_mut().prepare(seed);
        let _gate = pool.enter_eval();
        noise.gen_3d_grid(start, stride, step, dims, out);
    }

    /// Detach the handle from this lease, the caller becomes responsible for giving it
    /// back through [`NoiseGeneratorPool::restore`].
    pub fn detach(mut self) -> NoiseHandle {
        self.handle.take().expect("handle is only taken on drop or detach")
    }

}

impl Drop for NoiseLease<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.restore(handle);
        }
    }
}


#[cfg(test)]
mod tests {

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use std::thread;

    use super::*;

    #[test]
    fn unregistered_kind() {
        let pool = NoiseGeneratorPool::new([NoiseKind::Cheese], PoolLimits::fixed(1, 2));
        assert!(pool.is_registered(NoiseKind::Cheese));
        match pool.rent(NoiseKind::Pillar) {
            Err(NoiseError::Configuration(NoiseKind::Pillar)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("renting an unregistered kind should fail"),
        }
    }

    #[test]
    fn eval_serialized_by_default() {
        let pool = NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(1, 2));
        assert!(pool.enter_eval().is_some());
        let pool = pool.with_serialized_eval(false);
        assert!(pool.enter_eval().is_none());
    }

    #[test]
    fn handles_are_recycled() {
        let pool = NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(2, 4));
        for _ in 0..10 {
            let mut lease = pool.rent(NoiseKind::Cheese).unwrap();
            assert_eq!(lease.kind(), NoiseKind::Cheese);
            lease.point(1, DVec3::new(0.5, 0.5, 0.5));
        }
        assert_eq!(pool.live(NoiseKind::Cheese), 1);
        assert_eq!(pool.idle(NoiseKind::Cheese), 1);
        assert_eq!(pool.live(NoiseKind::Pillar), 0);
    }

    #[test]
    fn detach_and_restore() {
        let pool = NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(1, 1));
        let handle = pool.rent(NoiseKind::VeinGap).unwrap().detach();
        assert_eq!(pool.idle(NoiseKind::VeinGap), 0);
        assert_eq!(handle.kind(), NoiseKind::VeinGap);
        pool.restore(handle);
        assert_eq!(pool.idle(NoiseKind::VeinGap), 1);
        drop(pool.rent(NoiseKind::VeinGap).unwrap());
        assert_eq!(pool.live(NoiseKind::VeinGap), 1);
    }

    #[test]
    fn same_seed_same_value_across_handles() {
        let pool = NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(2, 2));
        let mut a = pool.rent(NoiseKind::Canyon).unwrap();
        let mut b = pool.rent(NoiseKind::Canyon).unwrap();
        let pos = DVec3::new(1.25, -3.5, 7.75);
        assert_eq!(a.point(99, pos), b.point(99, pos));
        assert_eq!(pool.live(NoiseKind::Canyon), 2);
    }

    #[test]
    fn rent_blocks_at_ceiling() {
        let pool = NoiseGeneratorPool::with_all_kinds(PoolLimits::fixed(1, 1));
        let first = pool.rent(NoiseKind::Pillar).unwrap();
        thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                let lease = pool.rent(NoiseKind::Pillar).unwrap();
                lease.kind()
            });
            thread::sleep(Duration::from_millis(50));
            assert!(!waiter.is_finished());
            drop(first);
            assert_eq!(waiter.join().unwrap(), NoiseKind::Pillar);
        });
        assert_eq!(pool.live(NoiseKind::Pillar), 1);
    }

    #[test]
    fn concurrent_rent_respects_hard_ceiling() {

        let limits = PoolLimits::fixed(2, 4);
        let pool = NoiseGeneratorPool::with_all_kinds(limits);
        let outstanding = AtomicUsize::new(0);
        let max_outstanding = AtomicUsize::new(0);

        thread::scope(|scope| {
            for worker in 0..16 {
                let pool = &pool;
                let outstanding = &outstanding;
                let max_outstanding = &max_outstanding;
                scope.spawn(move || {
                    for i in 0..50 {
                        let mut lease = pool.rent(NoiseKind::Spaghetti3D).unwrap();
                        let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                        max_outstanding.fetch_max(now, Ordering::SeqCst);
                        assert!(pool.live(NoiseKind::Spaghetti3D) <= limits.hard);
                        lease.point(worker, DVec3::new(i as f64, 0.0, 0.0));
                        outstanding.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert!(pool.live(NoiseKind::Spaghetti3D) <= limits.hard);
        assert!(max_outstanding.load(Ordering::SeqCst) <= limits.hard);
        assert_eq!(pool.idle(NoiseKind::Spaghetti3D), pool.live(NoiseKind::Spaghetti3D));

    }

    #[test]
    fn workload_limits() {
        let limits = PoolLimits::from_workload(6, 18, 8, 2);
        assert_eq!(limits.soft, 6 * 18 * 8);
        assert_eq!(limits.hard, 6 * 18 * 8 * 2);
    }

}
