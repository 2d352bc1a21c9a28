//! Progressive admission control: per-key window counting with
//! escalating block durations.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::Request;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::escalation;
use crate::key_generator::KeyStrategy;
use crate::response::BlockMessage;
use crate::store::{KeyValueStore, MemoryStore};

/// Limiter options. The defaults describe a general-purpose API gate:
/// 15 requests per minute, 20 minute first block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Length of one counting window.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Requests allowed per window before the key is blocked.
    pub max_requests: u32,
    /// Block duration for a first-time violation.
    #[serde(with = "humantime_serde")]
    pub initial_block: Duration,
    /// Body template for 429 responses.
    pub message: BlockMessage,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 15,
            initial_block: Duration::from_secs(20 * 60),
            message: BlockMessage::default(),
        }
    }
}

/// Counting state for one key inside the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestWindow {
    pub count: u32,
    pub window_start: u64,
    pub reset_at: u64,
}

/// One past violation: the block duration it earned and when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    pub duration_ms: u64,
    pub at: u64,
}

/// Block state for one key, including the violation history that drives
/// escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub unblock_at: u64,
    pub block_count: u32,
    pub last_block_ms: u64,
    pub history: Vec<BlockEvent>,
}

impl BlockRecord {
    /// True while requests from the key must be rejected.
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms < self.unblock_at
    }

    /// True when any history entry can still influence escalation.
    fn history_is_relevant(&self, now_ms: u64) -> bool {
        self.history
            .iter()
            .any(|event| escalation::within_history_window(event.at, now_ms))
    }
}

/// Outcome of one admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed; quota headers describe the current window.
    Allowed { remaining: u32, reset_at: u64 },
    /// Request is rejected; the key stays blocked for `retry_ms` more
    /// milliseconds.
    Limited { retry_ms: u64, unblock_at: u64 },
}

/// Predicate that exempts a request from limiting.
pub type SkipFn = dyn Fn(&Request) -> bool + Send + Sync;

/// The admission controller. One instance owns a window store and a block
/// store and gates requests against both.
pub struct ProgressiveRateLimiter {
    config: RateLimiterConfig,
    key_strategy: KeyStrategy,
    skip: Option<Arc<SkipFn>>,
    instance_id: Uuid,
    windows: Arc<dyn KeyValueStore<RequestWindow>>,
    blocks: Arc<dyn KeyValueStore<BlockRecord>>,
    // serializes the read-check-increment-write sequence so concurrent
    // requests for one key cannot both slip past the quota
    admission: Mutex<()>,
}

impl ProgressiveRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    /// Build a limiter over caller-supplied stores.
    pub fn with_stores(
        config: RateLimiterConfig,
        windows: Arc<dyn KeyValueStore<RequestWindow>>,
        blocks: Arc<dyn KeyValueStore<BlockRecord>>,
    ) -> Self {
        Self {
            config,
            key_strategy: KeyStrategy::ClientIp,
            skip: None,
            instance_id: Uuid::new_v4(),
            windows,
            blocks,
            admission: Mutex::new(()),
        }
    }

    /// Limiter keyed by the authenticated user when one is present.
    pub fn user_scoped(config: RateLimiterConfig) -> Self {
        Self::new(config).with_key_strategy(KeyStrategy::UserOrIp)
    }

    /// Limiter whose quotas are tracked independently under `label`.
    pub fn endpoint_scoped(label: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self::new(config).with_key_strategy(KeyStrategy::Scoped {
            label: label.into(),
            inner: Box::new(KeyStrategy::ClientIp),
        })
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn with_skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(skip));
        self
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn should_skip(&self, request: &Request) -> bool {
        self.skip.as_ref().map(|skip| skip(request)).unwrap_or(false)
    }

    pub fn key_for(&self, request: &Request) -> String {
        self.key_strategy.derive(request)
    }

    /// Admission decision for `key` at the current wall-clock time.
    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, epoch_ms())
    }

    /// Admission decision at an explicit timestamp.
    pub fn admit_at(&self, key: &str, now_ms: u64) -> Admission {
        let _guard = lock(&self.admission);

        if let Some(block) = self.blocks.get(key) {
            if block.is_active(now_ms) {
                debug!(key, unblock_at = block.unblock_at, "rejected, key still blocked");
                return Admission::Limited {
                    retry_ms: block.unblock_at - now_ms,
                    unblock_at: block.unblock_at,
                };
            }
            // Expired: the key is unblocked, but its history keeps feeding
            // escalation until it ages out.
            if !block.history_is_relevant(now_ms) {
                self.blocks.delete(key);
                debug!(key, "expired block evicted");
            }
        }

        let mut window = match self.windows.get(key) {
            Some(window) if now_ms < window.reset_at => window,
            _ => {
                debug!(key, "starting new window");
                RequestWindow {
                    count: 0,
                    window_start: now_ms,
                    reset_at: now_ms + self.window_ms(),
                }
            }
        };

        window.count += 1;

        if window.count > self.config.max_requests {
            return self.block(key, now_ms, window.count);
        }

        let admission = Admission::Allowed {
            remaining: self.config.max_requests - window.count,
            reset_at: window.reset_at,
        };
        self.windows.set(key, window);
        admission
    }

    /// Record the violation that pushed `key` over quota and block it.
    fn block(&self, key: &str, now_ms: u64, count: u32) -> Admission {
        let prior = self.blocks.get(key);
        let mut history = prior
            .as_ref()
            .map(|block| block.history.clone())
            .unwrap_or_default();

        let duration_ms =
            escalation::next_block_duration(&history, now_ms, self.initial_block_ms());

        history.push(BlockEvent {
            duration_ms,
            at: now_ms,
        });
        history.retain(|event| escalation::within_history_window(event.at, now_ms));

        let record = BlockRecord {
            unblock_at: now_ms + duration_ms,
            block_count: prior.map(|block| block.block_count).unwrap_or(0) + 1,
            last_block_ms: duration_ms,
            history,
        };

        warn!(
            key,
            count,
            block_ms = duration_ms,
            violations = record.block_count,
            "quota exceeded, blocking key"
        );

        self.windows.delete(key);
        let admission = Admission::Limited {
            retry_ms: duration_ms,
            unblock_at: record.unblock_at,
        };
        self.blocks.set(key, record);
        admission
    }

    /// Drop expired windows and dead blocks. Returns the removal counts
    /// for the sweeper's log line.
    pub fn sweep(&self) -> (usize, usize) {
        self.sweep_at(epoch_ms())
    }

    pub fn sweep_at(&self, now_ms: u64) -> (usize, usize) {
        let _guard = lock(&self.admission);

        let mut windows_removed = 0;
        for (key, window) in self.windows.entries() {
            if window.reset_at < now_ms {
                self.windows.delete(&key);
                windows_removed += 1;
            }
        }

        let mut blocks_removed = 0;
        for (key, block) in self.blocks.entries() {
            if !block.is_active(now_ms) && !block.history_is_relevant(now_ms) {
                self.blocks.delete(&key);
                blocks_removed += 1;
            }
        }

        (windows_removed, blocks_removed)
    }

    fn window_ms(&self) -> u64 {
        self.config.window.as_millis() as u64
    }

    fn initial_block_ms(&self) -> u64 {
        self.config.initial_block.as_millis() as u64
    }
}

/// Milliseconds since the unix epoch.
pub(crate) fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
