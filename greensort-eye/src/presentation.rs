//! Consumer-side guidance debouncing
//!
//! Layered on top of the engine's own hysteresis: guidance appears
//! `show_delay_ms` after a confirmation and stays up for at least
//! `min_hold_ms` after the engine last supported the class. Time is passed in
//! explicitly so the debouncer stays deterministic.

use greensort_core::{Guidance, Locale, PresentationConfig, StableEvent, WasteClass};

/// A visible change the consumer should render
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationChange {
    Show {
        guidance: Guidance,
        /// Hazardous bin: raise the modal warning as well
        hazard_modal: bool,
    },
    Hide {
        class: WasteClass,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceState {
    Hidden,
    Pending {
        class: WasteClass,
        since_ms: u64,
    },
    Visible {
        class: WasteClass,
        last_support_ms: u64,
        /// Newer confirmation waiting out its show delay
        next: Option<(WasteClass, u64)>,
    },
}

#[derive(Debug, Clone)]
pub struct GuidanceDebouncer {
    config: PresentationConfig,
    state: GuidanceState,
}

impl GuidanceDebouncer {
    pub fn new(config: PresentationConfig) -> Self {
        Self {
            config,
            state: GuidanceState::Hidden,
        }
    }

    pub fn state(&self) -> GuidanceState {
        self.state
    }

    pub fn locale(&self) -> Locale {
        self.config.locale
    }

    /// Class whose guidance is currently on screen
    pub fn visible_class(&self) -> Option<WasteClass> {
        match self.state {
            GuidanceState::Visible { class, .. } => Some(class),
            _ => None,
        }
    }

    /// Feed an engine event, then apply any due timer
    pub fn on_event(&mut self, event: &StableEvent, now_ms: u64) -> Option<PresentationChange> {
        self.state = match (self.state, *event) {
            (GuidanceState::Hidden, StableEvent::Confirmed { class, .. }) => {
                GuidanceState::Pending { class, since_ms: now_ms }
            }

            (GuidanceState::Pending { class: pending, .. }, StableEvent::Confirmed { class, .. })
                if pending != class =>
            {
                GuidanceState::Pending { class, since_ms: now_ms }
            }

            (GuidanceState::Pending { class: pending, .. }, StableEvent::Lost { class })
                if pending == class =>
            {
                GuidanceState::Hidden
            }

            (
                GuidanceState::Visible { class, next, .. },
                StableEvent::Confirmed { class: c, .. } | StableEvent::Holding { class: c, .. },
            ) if c == class => GuidanceState::Visible { class, last_support_ms: now_ms, next },

            (
                GuidanceState::Visible { class, last_support_ms, .. },
                StableEvent::Confirmed { class: c, .. },
            ) => GuidanceState::Visible {
                class,
                last_support_ms,
                next: Some((c, now_ms)),
            },

            (GuidanceState::Visible { class, last_support_ms, next: Some((n, _)) }, StableEvent::Lost { class: lost })
                if lost == n =>
            {
                GuidanceState::Visible { class, last_support_ms, next: None }
            }

            (state, _) => state,
        };

        self.tick(now_ms)
    }

    /// Apply elapsed show delays and hold expiries
    pub fn tick(&mut self, now_ms: u64) -> Option<PresentationChange> {
        match self.state {
            GuidanceState::Pending { class, since_ms }
                if now_ms.saturating_sub(since_ms) >= self.config.show_delay_ms =>
            {
                self.state = GuidanceState::Visible { class, last_support_ms: now_ms, next: None };
                Some(self.show(class))
            }

            GuidanceState::Visible { next: Some((class, since_ms)), .. }
                if now_ms.saturating_sub(since_ms) >= self.config.show_delay_ms =>
            {
                self.state = GuidanceState::Visible { class, last_support_ms: now_ms, next: None };
                Some(self.show(class))
            }

            GuidanceState::Visible { class, last_support_ms, next: None }
                if now_ms.saturating_sub(last_support_ms) >= self.config.min_hold_ms =>
            {
                self.state = GuidanceState::Hidden;
                Some(PresentationChange::Hide { class })
            }

            _ => None,
        }
    }

    /// Drop everything, e.g. when the session restarts
    pub fn reset(&mut self) -> Option<PresentationChange> {
        let hidden = self.visible_class().map(|class| PresentationChange::Hide { class });
        self.state = GuidanceState::Hidden;
        hidden
    }

    fn show(&self, class: WasteClass) -> PresentationChange {
        let guidance = Guidance::for_class(class, self.config.locale);
        let hazard_modal = guidance.hazard_warning;
        PresentationChange::Show { guidance, hazard_modal }
    }
}
