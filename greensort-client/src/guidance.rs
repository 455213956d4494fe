//! Guidance shown for the live channel
//!
//! Feeds server results into a [`GuidanceDebouncer`], restarting it for each
//! new connection. The clock is read when an event is delivered, never ahead
//! of time.

use crate::channel::ChannelEvent;
use greensort_api::ServerMessage;
use greensort_core::PresentationConfig;
use greensort_eye::{GuidanceDebouncer, PresentationChange};
use tokio::time::Instant;

pub struct GuidanceView {
    debouncer: GuidanceDebouncer,
    generation: u64,
    started: Instant,
}

impl GuidanceView {
    pub fn new(config: PresentationConfig) -> Self {
        Self {
            debouncer: GuidanceDebouncer::new(config),
            generation: 0,
            started: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Generation whose results are currently shown
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn debouncer(&self) -> &GuidanceDebouncer {
        &self.debouncer
    }

    /// Apply one channel event; results from older connections are ignored
    pub fn on_channel_event(&mut self, event: &ChannelEvent) -> Option<PresentationChange> {
        match event {
            ChannelEvent::Opened { generation } => {
                self.generation = *generation;
                self.debouncer.reset()
            }
            ChannelEvent::Message {
                generation,
                message: ServerMessage::Result(result),
            } if *generation == self.generation => {
                let now_ms = self.now_ms();
                self.debouncer.on_event(&result.event, now_ms)
            }
            _ => None,
        }
    }

    /// Apply due show delays and hold expiries
    pub fn tick(&mut self) -> Option<PresentationChange> {
        let now_ms = self.now_ms();
        self.debouncer.tick(now_ms)
    }
}
