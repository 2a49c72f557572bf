//! Cross-tab signalling.
//!
//! A [`BroadcastHub`] stands for the same-origin broadcast primitive: every
//! tab that joins it gets a [`TabBus`] that can publish control signals and
//! receive the ones published by its siblings. Delivery order is the order of
//! the underlying `tokio::sync::broadcast` channel; nothing is acknowledged.
//!
//! A tab never receives its own signals, so an `Opened` broadcast cannot bounce
//! back and re-trigger the transition that produced it. A tab without a hub
//! uses [`TabBus::detached`], which publishes nowhere and never yields.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use chatsync_shared::constants::BUS_BUFFER_CAPACITY;
use chatsync_shared::{TabId, TabSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BusEnvelope {
    origin: TabId,
    signal: TabSignal,
}

/// One broadcast channel shared by all tabs of an origin.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    name: String,
    sender: broadcast::Sender<BusEnvelope>,
}

impl BroadcastHub {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, BUS_BUFFER_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            sender,
        }
    }

    /// Attach a tab. Signals published before joining are not replayed.
    pub fn join(&self, tab: TabId) -> TabBus {
        debug!(channel = %self.name, tab = %tab.short(), "tab joined bus");
        TabBus {
            tab,
            link: Some(BusLink {
                sender: self.sender.clone(),
                receiver: self.sender.subscribe(),
            }),
        }
    }

    pub fn tab_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug)]
struct BusLink {
    sender: broadcast::Sender<BusEnvelope>,
    receiver: broadcast::Receiver<BusEnvelope>,
}

/// A single tab's end of the bus.
#[derive(Debug)]
pub struct TabBus {
    tab: TabId,
    link: Option<BusLink>,
}

impl TabBus {
    /// Single-tab fallback when no broadcast primitive exists.
    pub fn detached(tab: TabId) -> Self {
        Self { tab, link: None }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Fire-and-forget. Having no sibling listening is not an error.
    pub fn publish(&self, signal: TabSignal) {
        let Some(link) = &self.link else {
            return;
        };
        let envelope = BusEnvelope {
            origin: self.tab,
            signal,
        };
        if link.sender.send(envelope).is_ok() {
            debug!(tab = %self.tab.short(), signal = signal.as_wire(), "signal published");
        }
    }

    /// Wait for the next signal from another tab.
    ///
    /// Returns `None` once the hub is gone; the bus is detached at that point
    /// and later calls never complete.
    pub async fn recv(&mut self) -> Option<TabSignal> {
        loop {
            let Some(link) = self.link.as_mut() else {
                return std::future::pending().await;
            };

            match link.receiver.recv().await {
                Ok(envelope) if envelope.origin == self.tab => continue,
                Ok(envelope) => return Some(envelope.signal),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(tab = %self.tab.short(), skipped, "bus receiver lagged, signals dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!(tab = %self.tab.short(), "bus closed, continuing as a single tab");
                    self.link = None;
                    return None;
                }
            }
        }
    }
}
