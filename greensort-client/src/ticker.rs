//! Fixed-cadence capture loop

use crate::channel::FrameChannel;
use crate::source::FrameSource;
use greensort_core::TransportConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickerStats {
    pub ticks: u64,
    /// Frames handed to an open channel
    pub offered: u64,
    /// Frames dropped because the channel was not open
    pub dropped: u64,
}

/// Pushes one frame per tick into the channel without waiting for results
pub struct FrameTicker {
    interval: Duration,
}

impl FrameTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(Duration::from_millis(config.frame_interval_ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `shutdown` resolves or the source runs dry
    pub async fn run<S, F>(&self, source: &mut S, channel: &FrameChannel, shutdown: F) -> TickerStats
    where
        S: FrameSource + ?Sized,
        F: Future<Output = ()>,
    {
        let mut stats = TickerStats::default();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {}
            }
            stats.ticks += 1;

            let frame = match source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("Frame source exhausted after {} ticks", stats.ticks);
                    break;
                }
                Err(e) => {
                    warn!("Frame source failed: {}", e);
                    continue;
                }
            };

            match channel.send_frame(frame) {
                Ok(_) => stats.offered += 1,
                Err(e) if e.is_transient() => stats.dropped += 1,
                Err(e) => warn!("Frame not sent: {}", e),
            }
        }
        stats
    }
}
