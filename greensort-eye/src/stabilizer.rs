//! Temporal stabilization of per-frame classifications
//!
//! A tagged-union state machine driven by one pure function,
//! [`transition`]. Each call consumes one [`FrameResult`] and yields the next
//! state plus exactly one [`StableEvent`]. Entering `Stable` needs
//! `streak_target` agreeing frames; leaving it needs `miss_budget` unsupported
//! frames or a detection gap longer than `grace_period_ms`.

use greensort_core::{EnginePhase, FrameResult, StableEvent, StabilizerConfig, WasteClass};
use std::collections::VecDeque;
use tracing::debug;

/// A class collecting support towards confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub class: WasteClass,
    pub support: u32,
    /// Consecutive frames without any qualifying detection
    pub misses: u32,
}

impl Candidate {
    fn new(class: WasteClass) -> Self {
        Self { class, support: 1, misses: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Accumulating(Candidate),
    Stable {
        class: WasteClass,
    },
    /// Stable class unsupported for `misses` frames; a different class may be
    /// building support meanwhile
    Decaying {
        class: WasteClass,
        misses: u32,
        challenger: Option<Candidate>,
    },
}

impl Phase {
    pub fn kind(&self) -> EnginePhase {
        match self {
            Phase::Idle => EnginePhase::Idle,
            Phase::Accumulating(_) => EnginePhase::Accumulating,
            Phase::Stable { .. } => EnginePhase::Stable,
            Phase::Decaying { .. } => EnginePhase::Decaying,
        }
    }

    pub fn stable_class(&self) -> Option<WasteClass> {
        match self {
            Phase::Stable { class } | Phase::Decaying { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Class currently accumulating support, if any
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Phase::Accumulating(c) => Some(c),
            Phase::Decaying { challenger, .. } => challenger.as_ref(),
            _ => None,
        }
    }
}

/// Top-1 detection of a frame that passed its class threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vote {
    pub class: WasteClass,
    pub confidence: f32,
}

/// Per-session engine state; discarded with the session
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizationState {
    pub phase: Phase,
    /// One slot per frame, `None` where nothing qualified
    pub history: VecDeque<Option<Vote>>,
    /// Timestamp of the last frame with a qualifying detection
    pub last_detection_time: Option<u64>,
}

impl Default for StabilizationState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            history: VecDeque::new(),
            last_detection_time: None,
        }
    }
}

impl StabilizationState {
    pub fn current_stable_class(&self) -> Option<WasteClass> {
        self.phase.stable_class()
    }

    /// Mean confidence of `class` across the history window
    pub fn representative_confidence(&self, class: WasteClass) -> Option<f32> {
        let (sum, count) = self
            .history
            .iter()
            .flatten()
            .filter(|v| v.class == class)
            .fold((0.0f32, 0u32), |(s, n), v| (s + v.confidence, n + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f32)
        }
    }

    fn push_history(&mut self, vote: Option<Vote>, window: usize) {
        self.history.push_back(vote);
        while self.history.len() > window.max(1) {
            self.history.pop_front();
        }
    }
}

/// Top-ranked detection if it meets its class threshold
pub fn qualifying_vote(config: &StabilizerConfig, frame: &FrameResult) -> Option<Vote> {
    let top = frame.top()?;
    if top.confidence >= config.threshold_for(top.class) {
        Some(Vote { class: top.class, confidence: top.confidence })
    } else {
        None
    }
}

/// Advance the engine by one frame
pub fn transition(
    config: &StabilizerConfig,
    mut state: StabilizationState,
    frame: &FrameResult,
) -> (StabilizationState, StableEvent) {
    let vote = qualifying_vote(config, frame);
    state.push_history(vote, config.history_window);

    let grace_expired = match state.last_detection_time {
        Some(t) => frame.timestamp_ms.saturating_sub(t) > config.grace_period_ms,
        None => true,
    };
    if vote.is_some() {
        state.last_detection_time = Some(frame.timestamp_ms);
    }

    let target = config.streak_target;
    let (phase, event) = match (state.phase, vote) {
        (Phase::Idle, None) => (Phase::Idle, StableEvent::NoSignal),

        (Phase::Idle, Some(v)) => advance(config, &state, Candidate::new(v.class), v),

        (Phase::Accumulating(c), None) => {
            let c = Candidate { misses: c.misses + 1, ..c };
            if c.misses >= config.miss_budget {
                (Phase::Idle, StableEvent::NoSignal)
            } else {
                (
                    Phase::Accumulating(c),
                    StableEvent::StillAccumulating { class: c.class, progress: c.support, target },
                )
            }
        }

        (Phase::Accumulating(c), Some(v)) => advance(config, &state, vote_for(config, c, v), v),

        (Phase::Stable { class }, Some(v)) if v.class == class => {
            (Phase::Stable { class }, holding(&state, class, v))
        }

        (Phase::Stable { class }, Some(v)) => {
            decay(config, &state, class, 0, Some(Candidate::new(v.class)), Some(v), false)
        }

        (Phase::Stable { class }, None) => {
            decay(config, &state, class, 0, None, None, grace_expired)
        }

        (Phase::Decaying { class, .. }, Some(v)) if v.class == class => {
            (Phase::Stable { class }, holding(&state, class, v))
        }

        (Phase::Decaying { class, misses, challenger }, Some(v)) => {
            let challenger = match challenger {
                Some(c) => vote_for(config, c, v),
                None => Candidate::new(v.class),
            };
            decay(config, &state, class, misses, Some(challenger), Some(v), false)
        }

        (Phase::Decaying { class, misses, challenger }, None) => {
            let challenger = challenger
                .map(|c| Candidate { misses: c.misses + 1, ..c })
                .filter(|c| c.misses < config.miss_budget);
            decay(config, &state, class, misses, challenger, None, grace_expired)
        }
    };

    if phase.kind() != state.phase.kind() {
        debug!("Stabilizer {:?} -> {:?} ({:?})", state.phase.kind(), phase.kind(), event);
    }
    state.phase = phase;
    (state, event)
}

/// Apply one qualifying vote to the current candidate
fn vote_for(config: &StabilizerConfig, candidate: Candidate, vote: Vote) -> Candidate {
    if vote.class == candidate.class {
        return Candidate {
            support: candidate.support.saturating_add(1),
            misses: 0,
            ..candidate
        };
    }

    if config.fast_path.applies(vote.class, vote.confidence) {
        return Candidate::new(vote.class);
    }

    let support = candidate.support.saturating_sub(config.switch_penalty);
    if support == 0 {
        Candidate::new(vote.class)
    } else {
        Candidate { support, ..candidate }
    }
}

/// Promote the candidate or report its progress
fn advance(
    config: &StabilizerConfig,
    state: &StabilizationState,
    candidate: Candidate,
    vote: Vote,
) -> (Phase, StableEvent) {
    if candidate.support >= config.streak_target {
        let confidence = state
            .representative_confidence(candidate.class)
            .unwrap_or(vote.confidence);
        (
            Phase::Stable { class: candidate.class },
            StableEvent::Confirmed { class: candidate.class, confidence },
        )
    } else {
        (
            Phase::Accumulating(candidate),
            StableEvent::StillAccumulating {
                class: candidate.class,
                progress: candidate.support,
                target: config.streak_target,
            },
        )
    }
}

fn holding(state: &StabilizationState, class: WasteClass, vote: Vote) -> StableEvent {
    StableEvent::Holding {
        class,
        confidence: state.representative_confidence(class).unwrap_or(vote.confidence),
    }
}

/// One more unsupported frame for the stable class
///
/// A challenger that reaches the streak target is promoted before the miss
/// budget is checked. On loss a surviving challenger keeps its support.
fn decay(
    config: &StabilizerConfig,
    state: &StabilizationState,
    class: WasteClass,
    misses: u32,
    challenger: Option<Candidate>,
    vote: Option<Vote>,
    grace_expired: bool,
) -> (Phase, StableEvent) {
    if let (Some(c), Some(v)) = (challenger, vote) {
        if c.class == v.class && c.support >= config.streak_target {
            return advance(config, state, c, v);
        }
    }

    let misses = misses + 1;
    if grace_expired || misses >= config.miss_budget {
        let phase = match challenger {
            Some(c) => Phase::Accumulating(c),
            None => Phase::Idle,
        };
        return (phase, StableEvent::Lost { class });
    }

    (
        Phase::Decaying { class, misses, challenger },
        StableEvent::Decaying { class, misses, miss_budget: config.miss_budget },
    )
}

/// Owning wrapper around [`transition`] for one session
#[derive(Debug, Clone)]
pub struct Stabilizer {
    config: StabilizerConfig,
    state: StabilizationState,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            state: StabilizationState::default(),
        }
    }

    /// Feed one frame and return the event it produced
    pub fn process(&mut self, frame: &FrameResult) -> StableEvent {
        let state = std::mem::take(&mut self.state);
        let (next, event) = transition(&self.config, state, frame);
        self.state = next;
        event
    }

    /// Drop all accumulated state and return to `Idle`
    pub fn reset(&mut self) {
        self.state = StabilizationState::default();
    }

    pub fn state(&self) -> &StabilizationState {
        &self.state
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn phase(&self) -> EnginePhase {
        self.state.phase.kind()
    }

    pub fn stable_class(&self) -> Option<WasteClass> {
        self.state.current_stable_class()
    }

    /// A class is held, including the grace band
    pub fn is_stable(&self) -> bool {
        self.phase().holds_class()
    }
}
