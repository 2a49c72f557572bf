//! Posting session and conversation mode.
//!
//! A session is "on" between the visitor posting a message and an operator
//! answering it; only then is periodic polling worth its backend load. The
//! flag lives in the persisted read-state so a reload in the same browser
//! resumes polling. The mode is never persisted: it is observed from every
//! snapshot and only remembered to detect transitions.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use chatsync_shared::{ChatError, MessageId, Mode};
use chatsync_store::{ReadState, ReadStateStore};

/// Result of comparing a snapshot's mode with the last one seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeObservation {
    /// No snapshot had been seen yet.
    First(Mode),
    Unchanged(Mode),
    Changed { from: Mode, to: Mode },
}

impl ModeObservation {
    pub fn mode(&self) -> Mode {
        match *self {
            Self::First(mode) | Self::Unchanged(mode) => mode,
            Self::Changed { to, .. } => to,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    /// Content must be rebuilt on first sight and on every change.
    pub fn needs_rebuild(&self) -> bool {
        !matches!(self, Self::Unchanged(_))
    }
}

pub struct SessionController {
    read_state: ReadStateStore,
    mode: Option<Mode>,
}

impl SessionController {
    pub fn new(read_state: ReadStateStore) -> Self {
        Self {
            read_state,
            mode: None,
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn observe_mode(&mut self, mode: Mode) -> ModeObservation {
        let observation = match self.mode {
            None => ModeObservation::First(mode),
            Some(previous) if previous == mode => ModeObservation::Unchanged(mode),
            Some(previous) => ModeObservation::Changed {
                from: previous,
                to: mode,
            },
        };
        if observation.is_change() {
            info!(?observation, "conversation mode changed");
        }
        self.mode = Some(mode);
        observation
    }

    pub fn is_active(&self) -> Result<bool, ChatError> {
        Ok(self.read_state.is_session_on()?)
    }

    /// Turn the session on. The timestamp is diagnostic; the polling
    /// ceiling is measured by the scheduler itself.
    pub fn start(&self, now: DateTime<Utc>) -> Result<(), ChatError> {
        self.read_state.set_session_on(now)?;
        debug!(started_at = %now, "posting session on");
        Ok(())
    }

    pub fn end(&self) -> Result<(), ChatError> {
        self.read_state.set_session_off()?;
        debug!("posting session off");
        Ok(())
    }

    pub fn acknowledged(&self) -> Result<Option<MessageId>, ChatError> {
        Ok(self.read_state.last_acknowledged()?)
    }

    pub fn acknowledge(&self, id: MessageId) -> Result<bool, ChatError> {
        Ok(self.read_state.advance_acknowledged(id)?)
    }

    pub fn read_state(&self) -> Result<ReadState, ChatError> {
        Ok(self.read_state.load()?)
    }
}
