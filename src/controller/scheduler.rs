//! Refresh scheduling for the poll loop
//!
//! The loop awaits one tick between iterations instead of busy-polling.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};

#[async_trait]
pub trait RefreshScheduler: Send + Sync {
    /// Resolve at the next refresh tick
    async fn next_tick(&self);
}

/// Fixed-rate ticks, the headless stand-in for a display refresh
pub struct IntervalScheduler {
    period: Duration,
    interval: Mutex<Option<Interval>>,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RefreshScheduler for IntervalScheduler {
    async fn next_tick(&self) {
        let mut guard = self.interval.lock().await;
        // Created lazily so the timer is registered on the runtime that polls it
        let interval = guard.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(
                tokio::time::Instant::now() + self.period,
                self.period,
            );
            // A slow detector delays the next tick instead of causing a burst
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}

/// Yields once to the runtime; used where no pacing is wanted
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

#[async_trait]
impl RefreshScheduler for ImmediateScheduler {
    async fn next_tick(&self) {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticks_at_period() {
        let scheduler = IntervalScheduler::new(Duration::from_millis(16));
        let start = tokio::time::Instant::now();

        scheduler.next_tick().await;
        scheduler.next_tick().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(32));
        assert!(elapsed < Duration::from_millis(48));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped() {
        let scheduler = IntervalScheduler::new(Duration::ZERO);
        let start = tokio::time::Instant::now();

        scheduler.next_tick().await;
        scheduler.next_tick().await;

        assert_eq!(start.elapsed(), Duration::from_millis(2));
    }
}
