//! Process-wide byte-rate ceiling (`speed_limit_kbps`, spec §5/§6).
//!
//! Grounded on `scheduler::budget::GlobalConnectionBudget`'s atomic
//! reserve/release counter, generalized from "connections in use" to
//! "bytes consumed in the current 100ms tick": every segment worker calls
//! [`RateLimiter::throttle`] before counting a chunk's bytes toward its own
//! progress, and the limiter sleeps the caller until the next tick if the
//! shared budget for the current tick is exhausted. A disabled limiter
//! (`kbps == 0`) never sleeps.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

/// Shared token-bucket ceiling on total bytes read across every active
/// segment worker, process-wide. Cheap to clone; every clone shares the
/// same counters.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    /// Bytes allowed per 100ms tick; 0 means unlimited.
    bytes_per_tick: u64,
    /// Tick index (ms since limiter creation / 100) the counter below belongs to.
    current_tick: AtomicU64,
    /// Bytes already spent in `current_tick`. Can go negative conceptually
    /// but we saturate at 0 on a tick rollover instead.
    spent_this_tick: AtomicI64,
    epoch: std::time::Instant,
}

impl RateLimiter {
    /// Builds a limiter enforcing `kbps` KiB/s, or unlimited when `kbps == 0`.
    pub fn new(kbps: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                bytes_per_tick: kbps.saturating_mul(1024) / (1000 / TICK.as_millis() as u64).max(1),
                current_tick: AtomicU64::new(0),
                spent_this_tick: AtomicI64::new(0),
                epoch: std::time::Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.inner.bytes_per_tick == 0
    }

    /// Accounts for `len` bytes just read, sleeping until the next tick if
    /// that would exceed the current tick's allowance. A disabled limiter
    /// returns immediately.
    pub async fn throttle(&self, len: u64) {
        if self.is_unlimited() || len == 0 {
            return;
        }
        loop {
            let now_tick = (self.inner.epoch.elapsed().as_millis() / TICK.as_millis()) as u64;
            let prev_tick = self.inner.current_tick.swap(now_tick, Ordering::AcqRel);
            if prev_tick != now_tick {
                self.inner.spent_this_tick.store(0, Ordering::Release);
            }

            let spent = self
                .inner
                .spent_this_tick
                .fetch_add(len as i64, Ordering::AcqRel);
            if spent + len as i64 <= self.inner.bytes_per_tick as i64 {
                return;
            }
            // Over budget for this tick: undo the optimistic add and wait.
            self.inner
                .spent_this_tick
                .fetch_sub(len as i64, Ordering::AcqRel);
            tokio::time::sleep(TICK).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_when_zero_kbps() {
        let limiter = RateLimiter::new(0);
        assert!(limiter.is_unlimited());
    }

    #[test]
    fn bytes_per_tick_scales_with_kbps() {
        let limiter = RateLimiter::new(100); // 100 KiB/s -> 10 KiB per 100ms tick
        assert_eq!(limiter.inner.bytes_per_tick, 100 * 1024 / 10);
    }

    #[tokio::test]
    async fn throttle_does_not_block_under_budget() {
        let limiter = RateLimiter::new(1_000_000); // generous
        let start = std::time::Instant::now();
        limiter.throttle(1024).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn throttle_is_a_noop_when_unlimited() {
        let limiter = RateLimiter::unlimited();
        let start = std::time::Instant::now();
        limiter.throttle(u64::MAX / 2).await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_sleeps_when_tick_budget_exhausted() {
        let limiter = RateLimiter::new(10); // 10 KiB/s -> 1024 bytes/tick
        limiter.throttle(1024).await; // exactly fills the first tick
        let start = tokio::time::Instant::now();
        limiter.throttle(1).await; // must wait for the next tick
        assert!(tokio::time::Instant::now() >= start + TICK);
    }
}
