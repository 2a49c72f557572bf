//! Periodic re-polling while a posting session is active.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Owns the single polling timer.
///
/// Ticks are delivered as messages into the engine's command channel so all
/// state stays on the engine task. Restarting replaces the running timer
/// and resets the lifetime ceiling.
pub struct PollScheduler {
    interval: Duration,
    max_lifetime: Duration,
    handle: Option<JoinHandle<()>>,
}

impl PollScheduler {
    pub fn new(interval: Duration, max_lifetime: Duration) -> Self {
        Self {
            interval,
            max_lifetime,
            handle: None,
        }
    }

    /// Start a fresh loop, cancelling the previous one first.
    pub fn restart<T, F>(&mut self, tx: mpsc::Sender<T>, make_tick: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        self.cancel();

        let interval = self.interval;
        let max_lifetime = self.max_lifetime;
        let started = Instant::now();

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(started + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let at = ticker.tick().await;
                if at.duration_since(started) > max_lifetime {
                    debug!(
                        lifetime_secs = max_lifetime.as_secs(),
                        "Polling loop reached its ceiling"
                    );
                    break;
                }
                if tx.send(make_tick()).await.is_err() {
                    break;
                }
            }
        }));

        debug!(interval_secs = interval.as_secs(), "Polling loop started");
    }

    /// Stop the loop. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                if was_running {
                    debug!("Polling loop cancelled");
                }
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// In-flight token for conversation fetches.
///
/// A regular poll is refused while another fetch is outstanding. A forced
/// one supersedes it: the older fetch still completes, but its result no
/// longer matches the current token and is dropped.
#[derive(Debug, Default)]
pub struct PollGate {
    next: u64,
    in_flight: Option<u64>,
}

impl PollGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for a regular poll, unless a fetch is outstanding.
    pub fn try_begin(&mut self) -> Option<u64> {
        if self.in_flight.is_some() {
            return None;
        }
        Some(self.supersede())
    }

    /// Claim the slot unconditionally, orphaning any outstanding fetch.
    pub fn supersede(&mut self) -> u64 {
        self.next += 1;
        self.in_flight = Some(self.next);
        self.next
    }

    /// Close the fetch tagged `token`. False means it was superseded.
    pub fn complete(&mut self, token: u64) -> bool {
        if self.in_flight == Some(token) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}
