// Frame-by-frame scenarios through the stabilizer, the session pipeline and
// the guidance debouncer

use greensort_core::{
    BoundingBox, Detection, EnginePhase, FastPathPolicy, FrameResult, GreensortConfig,
    PresentationConfig, StabilizerConfig, StableEvent, WasteClass,
};
use greensort_eye::{
    GuidanceDebouncer, NullAdapter, Phase, PresentationChange, RealtimeSession, Stabilizer,
};
use std::sync::Arc;

fn det(class: WasteClass, confidence: f32) -> Detection {
    Detection::new(class, confidence, BoundingBox::new(200.0, 150.0, 300.0, 260.0))
}

fn frame(id: u64, ts: u64, detections: Vec<Detection>) -> FrameResult {
    FrameResult::new(id, ts, detections)
}

#[test]
fn test_battery_scenario() {
    let mut s = Stabilizer::new(StabilizerConfig::default());
    let mut id = 0;
    let mut next = |s: &mut Stabilizer, d: Vec<Detection>| {
        id += 1;
        s.process(&frame(id, id * 100, d))
    };

    // 0.80 clears the default threshold but not the battery one
    for _ in 0..3 {
        assert_eq!(next(&mut s, vec![det(WasteClass::Battery, 0.80)]), StableEvent::NoSignal);
    }
    for i in 1..=4 {
        assert_eq!(
            next(&mut s, vec![det(WasteClass::Battery, 0.90)]),
            StableEvent::StillAccumulating { class: WasteClass::Battery, progress: i, target: 5 }
        );
    }
    match next(&mut s, vec![det(WasteClass::Battery, 0.90)]) {
        StableEvent::Confirmed { class, confidence } => {
            assert_eq!(class, WasteClass::Battery);
            assert!((confidence - 0.90).abs() < 1e-6);
        }
        other => panic!("Expected Confirmed, got {:?}", other),
    }
}

#[test]
fn test_alternating_classes_never_confirm() {
    let mut s = Stabilizer::new(StabilizerConfig::default());
    for id in 1..=40u64 {
        let class = if id % 2 == 0 { WasteClass::Plastic } else { WasteClass::Glass };
        let event = s.process(&frame(id, id * 100, vec![det(class, 0.9)]));
        assert!(!event.is_confirmed(), "frame {} confirmed {:?}", id, event);
    }
}

#[test]
fn test_dominant_class_survives_interruption() {
    let mut s = Stabilizer::new(StabilizerConfig::default());
    let sequence = [
        WasteClass::Plastic,
        WasteClass::Plastic,
        WasteClass::Glass,
        WasteClass::Plastic,
        WasteClass::Plastic,
        WasteClass::Plastic,
        WasteClass::Plastic,
    ];
    let events: Vec<_> = sequence
        .iter()
        .enumerate()
        .map(|(i, c)| s.process(&frame(i as u64 + 1, (i as u64 + 1) * 100, vec![det(*c, 0.9)])))
        .collect();

    // support 1, 2, 1, 2, 3, 4, 5
    assert!(matches!(
        events[2],
        StableEvent::StillAccumulating { class: WasteClass::Plastic, progress: 1, .. }
    ));
    assert!(matches!(events[6], StableEvent::Confirmed { class: WasteClass::Plastic, .. }));
}

#[test]
fn test_grace_period_expiry_loses_immediately() {
    let mut s = Stabilizer::new(StabilizerConfig::default());
    for id in 1..=5u64 {
        s.process(&frame(id, id * 100, vec![det(WasteClass::Metal, 0.9)]));
    }
    assert!(s.is_stable());

    // first miss arrives two seconds after the last detection
    let event = s.process(&frame(6, 2500, vec![]));
    assert_eq!(event, StableEvent::Lost { class: WasteClass::Metal });
    assert_eq!(s.state().phase, Phase::Idle);
    assert_eq!(s.phase(), EnginePhase::Idle);
}

#[test]
fn test_fast_path_replaces_candidate() {
    let mut config = StabilizerConfig::default();
    config.fast_path.enabled = true;
    let mut s = Stabilizer::new(config);

    for id in 1..=3u64 {
        s.process(&frame(id, id * 100, vec![det(WasteClass::Plastic, 0.9)]));
    }
    let event = s.process(&frame(4, 400, vec![det(WasteClass::Battery, 0.97)]));
    assert_eq!(
        event,
        StableEvent::StillAccumulating { class: WasteClass::Battery, progress: 1, target: 5 }
    );

    // below the fast-path floor the usual penalty applies
    let mut s = Stabilizer::new(StabilizerConfig {
        fast_path: FastPathPolicy { enabled: true, ..Default::default() },
        ..Default::default()
    });
    for id in 1..=3u64 {
        s.process(&frame(id, id * 100, vec![det(WasteClass::Plastic, 0.9)]));
    }
    let event = s.process(&frame(4, 400, vec![det(WasteClass::Battery, 0.90)]));
    assert_eq!(
        event,
        StableEvent::StillAccumulating { class: WasteClass::Plastic, progress: 2, target: 5 }
    );
}

#[test]
fn test_session_drives_guidance_timeline() {
    let mut session = RealtimeSession::new(&GreensortConfig::default(), Arc::new(NullAdapter));
    let mut debouncer = GuidanceDebouncer::new(PresentationConfig::default());
    let mut changes = Vec::new();

    // one second of battery at 10 fps, then four seconds of nothing
    for id in 1..=50u64 {
        let ts = id * 100;
        let raw = if id <= 10 { vec![det(WasteClass::Battery, 0.93)] } else { vec![] };
        let outcome = session.process_detections(id, ts, raw, false, 1.0);
        if let Some(change) = debouncer.on_event(&outcome.event, ts) {
            changes.push((ts, change));
        }
        if let Some(change) = debouncer.tick(ts + 50) {
            changes.push((ts + 50, change));
        }
    }

    assert_eq!(changes.len(), 2, "{:?}", changes);
    match &changes[0] {
        (ts, PresentationChange::Show { guidance, hazard_modal }) => {
            assert_eq!(*ts, 550);
            assert_eq!(guidance.class, WasteClass::Battery);
            assert!(*hazard_modal);
        }
        other => panic!("Expected Show, got {:?}", other),
    }
    match &changes[1] {
        (ts, PresentationChange::Hide { class }) => {
            assert_eq!(*class, WasteClass::Battery);
            // last support at frame 10 (1000 ms) plus the 3000 ms hold
            assert_eq!(*ts, 4000);
        }
        other => panic!("Expected Hide, got {:?}", other),
    }
}
