use greensort_api::MetricTotals;
use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, mirrored into the `metrics` facade
#[derive(Default)]
pub struct Metrics {
    sessions_opened: AtomicU64,
    active_sessions: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    frames_rejected: AtomicU64,
    confirmations: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        let active = self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("greensort_active_sessions").set(active as f64);
    }

    pub fn session_closed(&self) {
        let active = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .map(|prev| prev.saturating_sub(1))
            .unwrap_or(0);
        gauge!("greensort_active_sessions").set(active as f64);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        counter!("greensort_frames_received_total").increment(1);
    }

    pub fn frames_dropped(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
        counter!("greensort_frames_dropped_total").increment(count);
    }

    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
        counter!("greensort_frames_rejected_total").increment(1);
    }

    pub fn confirmation(&self) {
        self.confirmations.fetch_add(1, Ordering::Relaxed);
        counter!("greensort_confirmations_total").increment(1);
    }

    pub fn record_inference(&self, duration_ms: f64) {
        histogram!("greensort_inference_ms").record(duration_ms);
    }

    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    pub fn totals(&self) -> MetricTotals {
        MetricTotals {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
        }
    }

    /// Totals in Prometheus text exposition format
    pub fn prometheus_text(&self) -> String {
        let t = self.totals();
        format!(
            "# HELP greensort_active_sessions Open realtime sessions\n\
             # TYPE greensort_active_sessions gauge\n\
             greensort_active_sessions {}\n\
             # HELP greensort_frames_received_total Frames received\n\
             # TYPE greensort_frames_received_total counter\n\
             greensort_frames_received_total {}\n\
             # HELP greensort_frames_dropped_total Frames superseded before processing\n\
             # TYPE greensort_frames_dropped_total counter\n\
             greensort_frames_dropped_total {}\n\
             # HELP greensort_frames_rejected_total Malformed or oversized frames\n\
             # TYPE greensort_frames_rejected_total counter\n\
             greensort_frames_rejected_total {}\n\
             # HELP greensort_confirmations_total Stable detections confirmed\n\
             # TYPE greensort_confirmations_total counter\n\
             greensort_confirmations_total {}\n",
            self.active_sessions(),
            t.frames_received,
            t.frames_dropped,
            t.frames_rejected,
            t.confirmations
        )
    }
}
