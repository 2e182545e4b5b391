//! Two-tier admission control.
//!
//! A single global [`TokenBucket`] guards aggregate throughput and a registry
//! of per-identifier buckets (one per client IP) guards fairness. A request is
//! admitted only when both tiers admit it.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::WaitError;
use crate::metrics::IDENTIFIER_BUCKETS;

/// How often [`TwoTierLimiter::wait`] retries admission.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Capacity/refill-rate counter with lazy, whole-token refill.
pub struct TokenBucket {
    capacity: u64,
    refill_rate: u64, // tokens per second
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(capacity: u64, refill_rate: u64) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token if available. A denial leaves the bucket untouched.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());

        if state.tokens > 0 {
            state.tokens -= 1;
            return true;
        }
        false
    }

    // Only whole tokens are added. `last_refill` moves only when at least one
    // token was added, so a sub-token remainder keeps accruing across calls
    // until it crosses the next whole token.
    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        let tokens_to_add = (elapsed * self.refill_rate as f64) as u64;

        if tokens_to_add > 0 {
            state.tokens = self.capacity.min(state.tokens.saturating_add(tokens_to_add));
            state.last_refill = now;
        }
    }

    /// Returns one token to the bucket, never exceeding capacity.
    pub fn give_back(&self) {
        let mut state = self.state.lock();
        if state.tokens < self.capacity {
            state.tokens += 1;
        }
    }

    /// Current token count, without refilling.
    pub fn tokens(&self) -> u64 {
        self.state.lock().tokens
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn last_refill(&self) -> Instant {
        self.state.lock().last_refill
    }
}

/// Concurrent map from client identifier to its own bucket.
///
/// `get_or_create` is atomic: concurrent first lookups for the same
/// identifier all receive the same bucket.
pub struct BucketRegistry {
    buckets: DashMap<String, Arc<TokenBucket>>,
    capacity: u64,
    refill_rate: u64,
}

impl BucketRegistry {
    pub fn new(capacity: u64, refill_rate: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_rate,
        }
    }

    pub fn get_or_create(&self, identifier: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(identifier) {
            return Arc::clone(bucket.value());
        }

        // entry() holds the shard write lock, so only one bucket is ever inserted
        let entry = self
            .buckets
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.capacity, self.refill_rate)));
        Arc::clone(entry.value())
    }

    /// Removes buckets that have not refilled within `idle`. Returns how many were evicted.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;

        self.buckets.retain(|_, bucket| {
            let keep = now.saturating_duration_since(bucket.last_refill()) < idle;
            if !keep {
                evicted += 1;
            }
            keep
        });

        evicted
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.buckets.contains_key(identifier)
    }
}

/// Limiter settings. Rates are tokens per second, bursts are bucket capacities.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub global_rate: u64,
    pub global_burst: u64,
    pub identifier_rate: u64,
    pub identifier_burst: u64,
    pub idle_threshold: Duration,
    pub sweep_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            global_rate: 100,
            global_burst: 100,
            identifier_rate: 10,
            identifier_burst: 10,
            idle_threshold: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Global bucket plus per-identifier buckets, with compensation when the
/// second tier rejects a request the first tier already admitted.
pub struct TwoTierLimiter {
    global: TokenBucket,
    identifiers: BucketRegistry,
    idle_threshold: Duration,
    sweep_interval: Duration,
}

impl TwoTierLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            global: TokenBucket::new(config.global_burst, config.global_rate),
            identifiers: BucketRegistry::new(config.identifier_burst, config.identifier_rate),
            idle_threshold: config.idle_threshold,
            sweep_interval: config.sweep_interval,
        }
    }

    pub fn allow(&self, identifier: &str) -> bool {
        if !self.global.allow() {
            debug!(identifier, "denied by global limit");
            return false;
        }

        let bucket = self.identifiers.get_or_create(identifier);
        if !bucket.allow() {
            // the global token was taken for a request that will not run
            self.global.give_back();
            debug!(identifier, "denied by per-identifier limit");
            return false;
        }

        true
    }

    /// Polls [`allow`](Self::allow) until it admits or `cancel` fires.
    pub async fn wait(&self, identifier: &str, cancel: &CancellationToken) -> Result<(), WaitError> {
        loop {
            if self.allow(identifier) {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(WaitError::Canceled),
                _ = sleep(WAIT_POLL_INTERVAL) => {}
            }
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub async fn wait_timeout(&self, identifier: &str, timeout: Duration) -> Result<(), WaitError> {
        let cancel = CancellationToken::new();
        tokio::time::timeout(timeout, self.wait(identifier, &cancel))
            .await
            .map_err(|_| WaitError::DeadlineExceeded)?
    }

    /// Evicts identifier buckets idle for longer than the configured threshold.
    pub fn sweep(&self) -> usize {
        let evicted = self.identifiers.evict_idle(self.idle_threshold);
        IDENTIFIER_BUCKETS.set(self.identifiers.len() as f64);
        evicted
    }

    /// Starts the recurring eviction sweep.
    ///
    /// The task only holds a weak reference: it ends when the returned handle
    /// is dropped or shut down, or when the limiter itself is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            info!(interval = ?period, "identifier bucket sweeper started");
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let evicted = limiter.sweep();
                if evicted > 0 {
                    debug!(
                        evicted,
                        remaining = limiter.tracked_identifiers(),
                        "evicted idle identifier buckets"
                    );
                }
            }
            debug!("identifier bucket sweeper stopped");
        });

        SweeperHandle {
            cancel,
            task: Some(task),
        }
    }

    /// Global tokens currently available.
    pub fn global_tokens(&self) -> u64 {
        self.global.tokens()
    }

    pub fn global_capacity(&self) -> u64 {
        self.global.capacity()
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_tracked(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }
}

/// Owns the sweeper task. Dropping it stops the task.
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stops the sweeper and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
