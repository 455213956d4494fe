//! Per-connection realtime pipeline
//!
//! decode -> inference (with timeout, fail-open) -> filter -> stabilizer.
//! One [`RealtimeSession`] exists per live connection and is dropped with
//! it, so no engine state survives a reconnect.

use crate::error::VisionError;
use crate::frame::{DecodedFrame, FrameDecoder};
use crate::inference::InferenceAdapter;
use crate::processing::{BoxSmoother, DetectionFilter};
use crate::stabilizer::Stabilizer;
use greensort_core::{
    BinCategory, BoundingBox, Detection, EnginePhase, FrameDiagnostics, FrameResult,
    GreensortConfig, Guidance, Locale, StableEvent, WasteClass,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TIMING_WINDOW: usize = 30;

/// Current best guess for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestGuess {
    pub class: WasteClass,
    pub confidence: f32,
    /// Smoothed while stable, raw otherwise
    pub bbox: Option<BoundingBox>,
    pub bin: BinCategory,
    /// Present only while a class is stable
    pub guidance: Option<Guidance>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub processing_ms: f32,
    pub avg_ms: f32,
    pub fps: f32,
    pub low_light: bool,
    /// Detections returned by the adapter before filtering
    pub raw_count: usize,
    /// Frames dropped for this session so far
    pub dropped: u64,
}

/// Everything produced for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub frame_id: u64,
    pub timestamp_ms: u64,
    /// Filtered detections with raw boxes, descending confidence
    pub detections: Vec<Detection>,
    /// Highest confidence per class before filtering
    pub all_predictions: BTreeMap<WasteClass, f32>,
    pub event: StableEvent,
    pub phase: EnginePhase,
    pub stable: bool,
    pub best: Option<BestGuess>,
    pub metadata: FrameMetadata,
}

pub struct RealtimeSession {
    stabilizer: Stabilizer,
    smoother: BoxSmoother,
    filter: DetectionFilter,
    decoder: FrameDecoder,
    adapter: Arc<dyn InferenceAdapter>,
    inference_timeout: Duration,
    locale: Locale,
    last_frame_id: Option<u64>,
    started: Instant,
    timings: VecDeque<f32>,
    arrivals: VecDeque<u64>,
    frames_processed: u64,
    dropped: u64,
}

impl RealtimeSession {
    /// Build a session from a configuration snapshot
    pub fn new(config: &GreensortConfig, adapter: Arc<dyn InferenceAdapter>) -> Self {
        Self {
            stabilizer: Stabilizer::new(config.stabilizer.clone()),
            smoother: BoxSmoother::new(config.stabilizer.smoothing.clone()),
            filter: DetectionFilter::new(config.filter.clone(), config.server.reference_size),
            decoder: FrameDecoder::from_config(config.server.max_frame_bytes, &config.inference),
            adapter,
            inference_timeout: Duration::from_millis(config.inference.timeout_ms),
            locale: config.presentation.locale,
            last_frame_id: None,
            started: Instant::now(),
            timings: VecDeque::with_capacity(TIMING_WINDOW),
            arrivals: VecDeque::with_capacity(TIMING_WINDOW),
            frames_processed: 0,
            dropped: 0,
        }
    }

    /// Decode, infer and stabilize one frame message
    pub async fn handle_frame(
        &mut self,
        frame_id: Option<u64>,
        payload: &str,
    ) -> Result<FrameOutcome, VisionError> {
        let frame_id = self.accept_frame_id(frame_id)?;
        let started = Instant::now();

        let frame = self.decoder.decode(payload)?;
        let detections = self.run_inference(&frame).await;
        let timestamp_ms = self.started.elapsed().as_millis() as u64;
        let processing_ms = started.elapsed().as_secs_f32() * 1000.0;

        Ok(self.process_detections(frame_id, timestamp_ms, detections, frame.low_light, processing_ms))
    }

    /// Claim a frame id, rejecting ids at or below the last one seen
    pub fn accept_frame_id(&mut self, requested: Option<u64>) -> Result<u64, VisionError> {
        let id = match (requested, self.last_frame_id) {
            (Some(id), Some(last)) if id <= last => {
                return Err(VisionError::StaleFrame { frame_id: id, last });
            }
            (Some(id), _) => id,
            (None, Some(last)) => last + 1,
            (None, None) => 1,
        };
        self.last_frame_id = Some(id);
        Ok(id)
    }

    /// Adapter call bounded by the inference timeout; failures yield no detections
    pub async fn run_inference(&self, frame: &DecodedFrame) -> Vec<Detection> {
        match tokio::time::timeout(self.inference_timeout, self.adapter.infer(frame)).await {
            Ok(Ok(detections)) => detections,
            Ok(Err(e)) => {
                warn!("Inference failed ({}): {}", self.adapter.name(), e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Inference timed out after {:?} ({})",
                    self.inference_timeout,
                    self.adapter.name()
                );
                Vec::new()
            }
        }
    }

    /// Filter raw detections, advance the engine and assemble the outcome
    pub fn process_detections(
        &mut self,
        frame_id: u64,
        timestamp_ms: u64,
        raw: Vec<Detection>,
        low_light: bool,
        processing_ms: f32,
    ) -> FrameOutcome {
        let raw_count = raw.len();
        let all_predictions = all_predictions(&raw);
        let detections = self.filter.apply(raw);

        let frame = FrameResult::new(frame_id, timestamp_ms, detections)
            .with_diagnostics(FrameDiagnostics { processing_ms, low_light });
        let event = self.stabilizer.process(&frame);
        match event {
            StableEvent::Confirmed { class, confidence } => {
                info!("Confirmed {} ({:.2}) at frame {}", class, confidence, frame_id);
            }
            StableEvent::Lost { class } => info!("Lost {} at frame {}", class, frame_id),
            _ => debug!("Frame {}: {:?}", frame_id, event),
        }

        let best = self.best_guess(&frame.detections);
        self.record_timing(timestamp_ms, processing_ms);

        FrameOutcome {
            frame_id,
            timestamp_ms,
            all_predictions,
            event,
            phase: self.stabilizer.phase(),
            stable: self.stabilizer.is_stable(),
            best,
            metadata: FrameMetadata {
                processing_ms,
                avg_ms: self.average_ms(),
                fps: self.fps(),
                low_light,
                raw_count,
                dropped: self.dropped,
            },
            detections: frame.detections,
        }
    }

    fn best_guess(&mut self, detections: &[Detection]) -> Option<BestGuess> {
        let Some(class) = self.stabilizer.stable_class() else {
            self.smoother.reset();
            return detections.first().map(|d| BestGuess {
                class: d.class,
                confidence: d.confidence,
                bbox: Some(d.bbox),
                bin: d.bin_category(),
                guidance: None,
            });
        };

        let (confidence, bbox) = match detections.iter().find(|d| d.class == class) {
            Some(d) => (d.confidence, Some(self.smoother.smooth(d))),
            None => (
                self.stabilizer
                    .state()
                    .representative_confidence(class)
                    .unwrap_or(0.0),
                self.smoother.last(class),
            ),
        };

        Some(BestGuess {
            class,
            confidence,
            bbox,
            bin: class.bin_category(),
            guidance: Some(Guidance::for_class(class, self.locale)),
        })
    }

    fn record_timing(&mut self, timestamp_ms: u64, processing_ms: f32) {
        self.frames_processed += 1;
        self.timings.push_back(processing_ms);
        self.arrivals.push_back(timestamp_ms);
        while self.timings.len() > TIMING_WINDOW {
            self.timings.pop_front();
        }
        while self.arrivals.len() > TIMING_WINDOW {
            self.arrivals.pop_front();
        }
    }

    pub fn average_ms(&self) -> f32 {
        if self.timings.is_empty() {
            return 0.0;
        }
        self.timings.iter().sum::<f32>() / self.timings.len() as f32
    }

    /// Processed frames per second over the timing window
    pub fn fps(&self) -> f32 {
        match (self.arrivals.front(), self.arrivals.back()) {
            (Some(first), Some(last)) if last > first => {
                (self.arrivals.len() - 1) as f32 * 1000.0 / (last - first) as f32
            }
            _ => 0.0,
        }
    }

    /// Restart the engine from `Idle` without closing the connection
    pub fn reset(&mut self) {
        self.stabilizer.reset();
        self.smoother.reset();
        self.timings.clear();
        self.arrivals.clear();
        info!("Session engine reset");
    }

    pub fn record_dropped(&mut self, count: u64) {
        self.dropped += count;
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn phase(&self) -> EnginePhase {
        self.stabilizer.phase()
    }

    pub fn stable_class(&self) -> Option<WasteClass> {
        self.stabilizer.stable_class()
    }
}

fn all_predictions(raw: &[Detection]) -> BTreeMap<WasteClass, f32> {
    let mut out: BTreeMap<WasteClass, f32> = BTreeMap::new();
    for d in raw.iter().filter(|d| d.has_valid_confidence()) {
        let entry = out.entry(d.class).or_insert(d.confidence);
        if d.confidence > *entry {
            *entry = d.confidence;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{NullAdapter, ScriptedAdapter};
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_payload() -> String {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(4, 4, Rgb([150, 150, 150]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        STANDARD.encode(out.into_inner())
    }

    fn battery(confidence: f32) -> Detection {
        Detection::new(WasteClass::Battery, confidence, BoundingBox::new(100.0, 100.0, 200.0, 200.0))
    }

    fn session(adapter: Arc<dyn InferenceAdapter>) -> RealtimeSession {
        RealtimeSession::new(&GreensortConfig::default(), adapter)
    }

    struct FailingAdapter;

    #[async_trait]
    impl InferenceAdapter for FailingAdapter {
        fn name(&self) -> &str {
            "failing"
        }

        async fn infer(&self, _frame: &DecodedFrame) -> Result<Vec<Detection>, VisionError> {
            Err(VisionError::Inference("model crashed".to_string()))
        }
    }

    struct SlowAdapter;

    #[async_trait]
    impl InferenceAdapter for SlowAdapter {
        fn name(&self) -> &str {
            "slow"
        }

        async fn infer(&self, _frame: &DecodedFrame) -> Result<Vec<Detection>, VisionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![battery(0.99)])
        }
    }

    #[test]
    fn test_frame_ids_are_monotonic() {
        let mut s = session(Arc::new(NullAdapter));
        assert_eq!(s.accept_frame_id(None).unwrap(), 1);
        assert_eq!(s.accept_frame_id(Some(5)).unwrap(), 5);
        assert!(matches!(
            s.accept_frame_id(Some(5)),
            Err(VisionError::StaleFrame { frame_id: 5, last: 5 })
        ));
        assert!(s.accept_frame_id(Some(3)).is_err());
        assert_eq!(s.accept_frame_id(None).unwrap(), 6);
    }

    #[test]
    fn test_confirmation_carries_guidance() {
        let mut s = session(Arc::new(NullAdapter));
        let mut last = None;
        for id in 1..=5 {
            last = Some(s.process_detections(id, id * 100, vec![battery(0.9)], false, 3.0));
        }
        let outcome = last.unwrap();
        assert!(outcome.event.is_confirmed());
        assert!(outcome.stable);
        let best = outcome.best.unwrap();
        assert_eq!(best.bin, BinCategory::Hazardous);
        assert!(best.guidance.unwrap().hazard_warning);
        assert_eq!(outcome.metadata.raw_count, 1);
        assert!((outcome.metadata.fps - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_unstable_best_guess_has_no_guidance() {
        let mut s = session(Arc::new(NullAdapter));
        let outcome = s.process_detections(1, 0, vec![battery(0.9)], false, 1.0);
        assert!(!outcome.stable);
        let best = outcome.best.unwrap();
        assert!(best.guidance.is_none());
        assert_eq!(best.bbox, Some(battery(0.9).bbox));
    }

    #[test]
    fn test_all_predictions_before_filtering() {
        let mut s = session(Arc::new(NullAdapter));
        let tiny = Detection::new(WasteClass::Paper, 0.7, BoundingBox::new(0.0, 0.0, 5.0, 5.0));
        let outcome = s.process_detections(1, 0, vec![tiny, battery(0.6), battery(0.8)], true, 1.0);
        assert_eq!(outcome.detections.len(), 2);
        assert_eq!(outcome.all_predictions.get(&WasteClass::Paper), Some(&0.7));
        assert_eq!(outcome.all_predictions.get(&WasteClass::Battery), Some(&0.8));
        assert!(outcome.metadata.low_light);
    }

    #[tokio::test]
    async fn test_handle_frame_end_to_end() {
        let adapter = Arc::new(ScriptedAdapter::constant(vec![battery(0.95)]));
        let mut s = session(adapter);
        let payload = png_payload();
        let mut events = Vec::new();
        for _ in 0..5 {
            events.push(s.handle_frame(None, &payload).await.unwrap().event);
        }
        assert!(events[4].is_confirmed());
        assert_eq!(s.frames_processed(), 5);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_rejected_without_state_change() {
        let mut s = session(Arc::new(NullAdapter));
        let err = s.handle_frame(None, "%%%").await.unwrap_err();
        assert!(err.is_frame_rejection());
        assert_eq!(s.phase(), EnginePhase::Idle);
        assert_eq!(s.frames_processed(), 0);
    }

    #[tokio::test]
    async fn test_inference_failure_fails_open() {
        let mut s = session(Arc::new(FailingAdapter));
        let outcome = s.handle_frame(Some(1), &png_payload()).await.unwrap();
        assert!(outcome.detections.is_empty());
        assert_eq!(outcome.event, StableEvent::NoSignal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inference_timeout_fails_open() {
        let mut s = session(Arc::new(SlowAdapter));
        let outcome = s.handle_frame(Some(1), &png_payload()).await.unwrap();
        assert!(outcome.detections.is_empty());
    }

    #[test]
    fn test_reset_restarts_engine() {
        let mut s = session(Arc::new(NullAdapter));
        for id in 1..=5 {
            s.process_detections(id, id * 100, vec![battery(0.9)], false, 1.0);
        }
        assert_eq!(s.stable_class(), Some(WasteClass::Battery));
        s.reset();
        assert_eq!(s.phase(), EnginePhase::Idle);
        assert_eq!(s.stable_class(), None);
    }
}
