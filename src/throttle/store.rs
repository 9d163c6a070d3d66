use super::clock::{Clock, SystemClock};
use crate::spec::{Scope, ThrottleRate};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Checks between two lazy sweeps unless configured otherwise
pub const DEFAULT_SWEEP_EVERY: u64 = 1024;

/// Outcome of charging one request against a rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Counted; `remaining` requests are left in the current window
    Allowed { remaining: u32 },
    /// Not counted; the window resets after `retry_after`
    Denied { retry_after: Duration },
}

impl ThrottleDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed { .. })
    }
}

/// Shared rate-limit counters keyed by (endpoint, scope, client)
///
/// Implementations must make the check-and-increment atomic per key: two
/// concurrent calls for the same key never both take the last slot.
pub trait ThrottleStore: Send + Sync {
    fn check(
        &self,
        endpoint: &str,
        scope: Scope,
        client_key: &str,
        rate: &ThrottleRate,
    ) -> ThrottleDecision;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ThrottleKey {
    endpoint: String,
    scope: Scope,
    client: String,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start_ms: u64,
    period_ms: u64,
    count: u32,
}

impl Window {
    fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.period_ms)
    }
}

/// Fixed-window counters in a sharded `DashMap`
///
/// Windows are aligned to multiples of the period on the clock's timeline,
/// so every client of a `10/minute` rate resets on the minute boundary.
/// Denied requests are not counted. Expired windows are evicted by
/// [`sweep`](Self::sweep), which also runs lazily every `sweep_every` checks.
pub struct InMemoryThrottleStore {
    windows: DashMap<ThrottleKey, Window>,
    clock: Arc<dyn Clock>,
    sweep_every: u64,
    checks: AtomicU64,
}

impl Default for InMemoryThrottleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryThrottleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
            sweep_every: DEFAULT_SWEEP_EVERY,
            checks: AtomicU64::new(0),
        }
    }

    /// Run a sweep every `n` checks; `0` disables lazy sweeping
    #[must_use]
    pub fn sweep_every(mut self, n: u64) -> Self {
        self.sweep_every = n;
        self
    }

    /// Evict every window that has fully elapsed; returns how many were dropped
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.windows.len();
        self.windows.retain(|_, w| now < w.end_ms());
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.windows.len(), "Throttle windows swept");
        }
        evicted
    }

    /// Number of live counters
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl ThrottleStore for InMemoryThrottleStore {
    fn check(
        &self,
        endpoint: &str,
        scope: Scope,
        client_key: &str,
        rate: &ThrottleRate,
    ) -> ThrottleDecision {
        let now = self.clock.now_ms();
        let period_ms = rate.window().as_millis() as u64;
        let start_ms = now - now % period_ms;

        let key = ThrottleKey {
            endpoint: endpoint.to_string(),
            scope,
            client: client_key.to_string(),
        };

        let decision = {
            // Shard lock held only inside this block
            let mut window = self.windows.entry(key).or_insert(Window {
                start_ms,
                period_ms,
                count: 0,
            });
            if window.start_ms != start_ms || window.period_ms != period_ms {
                *window = Window {
                    start_ms,
                    period_ms,
                    count: 0,
                };
            }
            if window.count >= rate.count {
                ThrottleDecision::Denied {
                    retry_after: Duration::from_millis(window.end_ms().saturating_sub(now)),
                }
            } else {
                window.count += 1;
                ThrottleDecision::Allowed {
                    remaining: rate.count - window.count,
                }
            }
        };

        if self.sweep_every > 0 {
            let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
            if n % self.sweep_every == 0 {
                self.sweep();
            }
        }

        decision
    }
}
