//! Fault scheduler (C14, §4.14).
//!
//! A single deterministic counter, per §9's determinism note - per-connection
//! counters would desync from externally observable packet counts. Delay,
//! drop, close-after-write, and chunked-write faults are exactly §4.14's
//! four; the duplicate-response fault is supplemented (§2 of SPEC_FULL)
//! since duplicate-frame tolerance is a named testable property of DPI
//! engines and falls out of the same counter for free.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::Mutex as AsyncMutex;

/// Fault-injection schedule, configured once at server startup.
#[derive(Debug, Clone, Copy)]
pub struct FaultConfig {
    /// Base latency applied to every eligible response.
    pub base_delay: Duration,
    /// Upper bound of additional random jitter.
    pub jitter: Duration,
    /// Every Nth response additionally incurs `spike_delay` (0 disables).
    pub spike_every_n: u64,
    /// Extra delay applied on a spike tick.
    pub spike_delay: Duration,
    /// Every Nth response is dropped outright (0 disables).
    pub drop_every_n: u64,
    /// Additional random drop probability, independent of `drop_every_n`.
    pub drop_pct: f64,
    /// Every Nth response closes the transport after writing (0 disables).
    pub close_every_n: u64,
    /// Every Nth response is written twice (0 disables).
    pub duplicate_every_n: u64,
    /// Split each response write into chunks of a random size in
    /// `[chunk_min, chunk_max]` rather than one write.
    pub chunk_writes: bool,
    /// Minimum chunk size in bytes when `chunk_writes` is set.
    pub chunk_min: usize,
    /// Maximum chunk size in bytes when `chunk_writes` is set.
    pub chunk_max: usize,
    /// RNG seed; deterministic across a run so scenarios are reproducible.
    pub seed: u64,
}

impl Default for FaultConfig {
    /// All faults disabled - a freshly configured server is a faithful
    /// strict-ODVA responder until a scenario opts into chaos.
    fn default() -> Self {
        Self {
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            spike_every_n: 0,
            spike_delay: Duration::ZERO,
            drop_every_n: 0,
            drop_pct: 0.0,
            close_every_n: 0,
            duplicate_every_n: 0,
            chunk_writes: false,
            chunk_min: 1,
            chunk_max: 1,
            seed: 0,
        }
    }
}

/// What to do with one encoded response, decided for a single counter tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultDecision {
    /// How long to sleep the response thread before writing anything.
    pub delay: Duration,
    /// Discard the encoded response entirely; nothing is written.
    pub drop: bool,
    /// Close the transport after writing whatever bytes remain.
    pub close_after: bool,
    /// Write the encoded response bytes a second time immediately after
    /// the first.
    pub duplicate: bool,
    /// If set, split the write into chunks of this size instead of one.
    pub chunk_size: Option<usize>,
}

impl FaultDecision {
    /// The no-op decision: send once, no delay, no drop, no close.
    #[must_use]
    pub fn pass_through() -> Self {
        Self { delay: Duration::ZERO, drop: false, close_after: false, duplicate: false, chunk_size: None }
    }
}

/// Deterministic fault scheduler. `decide` is the only mutating operation;
/// everything else about a response's framing is unaffected.
pub struct FaultScheduler {
    config: FaultConfig,
    counter: AtomicU64,
    rng: AsyncMutex<ChaCha8Rng>,
}

impl FaultScheduler {
    /// Build a scheduler from a config, seeding its RNG.
    #[must_use]
    pub fn new(config: FaultConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self { config, counter: AtomicU64::new(0), rng: AsyncMutex::new(rng) }
    }

    /// Decide the fault outcome for the next eligible response, advancing
    /// the shared counter by one.
    pub async fn decide(&self) -> FaultDecision {
        let tick = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut rng = self.rng.lock().await;

        let mut delay = self.config.base_delay;
        if self.config.jitter > Duration::ZERO {
            let jitter_ms = rng.gen_range(0..=self.config.jitter.as_millis().max(1) as u64);
            delay += Duration::from_millis(jitter_ms);
        }
        if self.config.spike_every_n > 0 && tick % self.config.spike_every_n == 0 {
            delay += self.config.spike_delay;
        }

        let counter_drop = self.config.drop_every_n > 0 && tick % self.config.drop_every_n == 0;
        let random_drop = self.config.drop_pct > 0.0 && rng.gen_bool(self.config.drop_pct.clamp(0.0, 1.0));
        let drop = counter_drop || random_drop;

        let close_after = self.config.close_every_n > 0 && tick % self.config.close_every_n == 0;
        let duplicate = self.config.duplicate_every_n > 0 && tick % self.config.duplicate_every_n == 0;

        let chunk_size = self.config.chunk_writes.then(|| {
            let lo = self.config.chunk_min.max(1);
            let hi = self.config.chunk_max.max(lo);
            rng.gen_range(lo..=hi)
        });

        FaultDecision { delay, drop, close_after, duplicate, chunk_size }
    }

    /// Total responses this scheduler has been asked to decide on.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Split `bytes` into chunks of `chunk_size`, for feeding to repeated
/// `write_all` calls that simulate a DPI-hostile TCP segmentation.
#[must_use]
pub fn chunk_bytes(bytes: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if chunk_size == 0 {
        return vec![bytes];
    }
    bytes.chunks(chunk_size.max(1)).collect()
}
