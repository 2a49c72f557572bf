//! Open/close lifecycle of the chat panel.
//!
//! The machine only decides; the engine schedules the returned cue timeline
//! and reports back with [`PanelMachine::settle`]. Every transition bumps a
//! generation counter so a timer from an older transition can never settle a
//! newer one.

use std::time::Duration;

use chatsync_shared::constants::{
    PANEL_BODY_HIDE_MS, PANEL_BODY_REVEAL_MS, PANEL_CHROME_SWAP_MS, PANEL_SETTLE_MS,
};
use chatsync_shared::PanelState;

use crate::surface::PanelCue;

const OPEN_TIMELINE: &[(u64, PanelCue)] = &[
    (0, PanelCue::Widen),
    (PANEL_BODY_REVEAL_MS, PanelCue::ShowBody),
    (PANEL_BODY_REVEAL_MS, PanelCue::ShowAssistant),
    (PANEL_CHROME_SWAP_MS, PanelCue::HideBubble),
    (PANEL_CHROME_SWAP_MS, PanelCue::ShowCloseButton),
];

const CLOSE_TIMELINE: &[(u64, PanelCue)] = &[
    (PANEL_BODY_HIDE_MS, PanelCue::HideBody),
    (PANEL_BODY_REVEAL_MS, PanelCue::Narrow),
    (PANEL_CHROME_SWAP_MS, PanelCue::HideCloseButton),
    (PANEL_CHROME_SWAP_MS, PanelCue::ShowBubble),
];

/// A started transition: cues to apply at their offsets, then settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelTransition {
    pub generation: u64,
    pub target: PanelState,
    pub cues: &'static [(u64, PanelCue)],
    pub settle_after: Duration,
}

impl PanelTransition {
    /// Cues due at the moment the transition starts.
    pub fn immediate_cues(&self) -> impl Iterator<Item = PanelCue> + '_ {
        self.cues
            .iter()
            .filter(|(at, _)| *at == 0)
            .map(|(_, cue)| *cue)
    }

    /// Cues to deliver later, with their offsets from the start.
    pub fn delayed_cues(&self) -> impl Iterator<Item = (Duration, PanelCue)> + '_ {
        self.cues
            .iter()
            .filter(|(at, _)| *at > 0)
            .map(|(at, cue)| (Duration::from_millis(*at), *cue))
    }
}

#[derive(Debug, Default)]
pub struct PanelMachine {
    state: PanelState,
    generation: u64,
}

impl PanelMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start opening. `None` unless the panel is fully closed.
    pub fn open(&mut self) -> Option<PanelTransition> {
        if self.state != PanelState::Closed {
            return None;
        }
        Some(self.begin(PanelState::Opening, PanelState::Opened, OPEN_TIMELINE))
    }

    /// Start closing. `None` unless the panel is fully open.
    pub fn close(&mut self) -> Option<PanelTransition> {
        if self.state != PanelState::Opened {
            return None;
        }
        Some(self.begin(PanelState::Closing, PanelState::Closed, CLOSE_TIMELINE))
    }

    fn begin(
        &mut self,
        via: PanelState,
        target: PanelState,
        cues: &'static [(u64, PanelCue)],
    ) -> PanelTransition {
        self.state = via;
        self.generation += 1;
        PanelTransition {
            generation: self.generation,
            target,
            cues,
            settle_after: Duration::from_millis(PANEL_SETTLE_MS),
        }
    }

    /// Finish the transition tagged `generation`. Returns the settled state,
    /// or `None` if the tag is stale or nothing is in flight.
    pub fn settle(&mut self, generation: u64) -> Option<PanelState> {
        if generation != self.generation {
            return None;
        }
        let settled = match self.state {
            PanelState::Opening => PanelState::Opened,
            PanelState::Closing => PanelState::Closed,
            PanelState::Opened | PanelState::Closed => return None,
        };
        self.state = settled;
        Some(settled)
    }

    /// Whether a cue tagged `generation` still belongs to the running transition.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state.is_transitioning()
    }
}
