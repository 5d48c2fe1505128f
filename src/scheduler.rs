//! Periodic refresh trigger
//!
//! A stoppable repeating tick. While stopped, `tick` never resolves, so it can sit
//! in a `select!` next to other event sources without a special case.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

pub struct RefreshScheduler {
    period: Duration,
    interval: Option<Interval>,
}

impl RefreshScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Begin ticking one period from now. No-op if already running.
    pub fn start(&mut self) {
        if self.interval.is_some() {
            return;
        }
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        // A slow refresh must not cause a burst of catch-up ticks
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        debug!(period_ms = self.period.as_millis() as u64, "Refresh scheduler started");
    }

    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!("Refresh scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_start() {
        let mut scheduler = RefreshScheduler::new(Duration::from_secs(5));
        scheduler.start();
        assert!(scheduler.is_running());

        let started = Instant::now();
        scheduler.tick().await;
        assert!(started.elapsed() >= Duration::from_secs(5));
        scheduler.tick().await;
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_scheduler_never_ticks() {
        let mut scheduler = RefreshScheduler::new(Duration::from_millis(10));
        assert!(!scheduler.is_running());

        let waited = tokio::time::timeout(Duration::from_secs(60), scheduler.tick()).await;
        assert!(waited.is_err());

        scheduler.start();
        scheduler.stop();
        assert!(!scheduler.is_running());
        let waited = tokio::time::timeout(Duration::from_secs(60), scheduler.tick()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let mut scheduler = RefreshScheduler::new(Duration::from_secs(1));
        scheduler.start();
        tokio::time::advance(Duration::from_millis(600)).await;
        scheduler.start();

        let started = Instant::now();
        scheduler.tick().await;
        // second start kept the original schedule
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
