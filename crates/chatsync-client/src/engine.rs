//! The per-tab chat engine.
//!
//! One tokio task owns every piece of mutable state: reconciler, panel
//! machine, session, scheduler and the render surface. Callers talk to it
//! through an [`EngineHandle`] that forwards [`EngineCommand`]s over an mpsc
//! channel; timers and background fetches report back on the same channel,
//! and sibling tabs reach it through the bus. State therefore only changes
//! between awaits of this single task.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use chatsync_net::{TabBus, Transport};
use chatsync_shared::{
    ChatError, ConversationSnapshot, MessageId, Mode, OutgoingPost, PanelState, TabSignal,
    TransportError,
};
use chatsync_store::{KeyValueStore, ReadStateStore};

use crate::config::ChatConfig;
use crate::panel::{PanelMachine, PanelTransition};
use crate::reconciler::{Reconciler, Reconciliation};
use crate::scheduler::{PollGate, PollScheduler};
use crate::session::SessionController;
use crate::surface::{Flash, FlashKind, MarketingSource, Notifier, PanelCue, RenderSurface};

const COMMAND_BUFFER: usize = 64;

/// External collaborators of one engine.
pub struct EngineDeps {
    pub transport: Arc<dyn Transport>,
    pub store: Box<dyn KeyValueStore>,
    pub bus: TabBus,
    pub surface: Box<dyn RenderSurface>,
    pub notifier: Box<dyn Notifier>,
    pub marketing: Box<dyn MarketingSource>,
}

/// A message typed by the visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub csrf_token: String,
    /// Anti-bot challenge answer; only the normal route takes it.
    pub challenge_response: Option<String>,
}

impl Draft {
    pub fn new(text: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            csrf_token: csrf_token.into(),
            challenge_response: None,
        }
    }

    pub fn with_challenge_response(mut self, response: impl Into<String>) -> Self {
        self.challenge_response = Some(response.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty text or missing CSRF token.
    Ignored,
    /// The pre-submit reload flipped the mode; nothing was posted.
    ModeChanged(Mode),
    Sent { callback: bool },
    /// The post failed and the draft carries a failure marker.
    Failed,
}

/// Point-in-time view of an engine, for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub panel: PanelState,
    pub mode: Option<Mode>,
    pub polling: bool,
    pub poll_in_flight: bool,
    pub connection_lost: bool,
    pub last_rendered: Option<MessageId>,
    pub pending_echoes: usize,
}

pub(crate) enum EngineCommand {
    Open { propagate: bool },
    Close { propagate: bool },
    Refresh(oneshot::Sender<Result<(), ChatError>>),
    Submit(Draft, oneshot::Sender<Result<SubmitOutcome, ChatError>>),
    Status(oneshot::Sender<EngineStatus>),
    Shutdown,
    PollTick,
    PollCompleted {
        token: u64,
        result: Result<ConversationSnapshot, TransportError>,
    },
    PanelCue { generation: u64, cue: PanelCue },
    PanelSettled { generation: u64 },
}

/// Cloneable entry point into a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Open the panel here and in sibling tabs.
    pub async fn open(&self) -> Result<(), ChatError> {
        self.send(EngineCommand::Open { propagate: true }).await
    }

    /// Close the panel here and in sibling tabs.
    pub async fn close(&self) -> Result<(), ChatError> {
        self.send(EngineCommand::Close { propagate: true }).await
    }

    /// Forced reload; resolves once the snapshot is applied.
    pub async fn refresh(&self) -> Result<(), ChatError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Refresh(reply)).await?;
        rx.await.map_err(|_| ChatError::Stopped)?
    }

    pub async fn submit(&self, draft: Draft) -> Result<SubmitOutcome, ChatError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Submit(draft, reply)).await?;
        rx.await.map_err(|_| ChatError::Stopped)?
    }

    pub async fn status(&self) -> Result<EngineStatus, ChatError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Status(reply)).await?;
        rx.await.map_err(|_| ChatError::Stopped)
    }

    pub async fn shutdown(&self) -> Result<(), ChatError> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, command: EngineCommand) -> Result<(), ChatError> {
        self.tx.send(command).await.map_err(|_| ChatError::Stopped)
    }
}

/// Spawn the engine for one tab.
///
/// The task performs the initial forced load, resumes polling if a posting
/// session was left on, and then serves commands until shut down, until
/// every handle is dropped, or until a fatal error. The join handle yields
/// that fatal error.
pub fn spawn_engine(
    config: ChatConfig,
    deps: EngineDeps,
) -> (EngineHandle, JoinHandle<Result<(), ChatError>>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let engine = Engine::new(config, deps, tx.downgrade());
    let task = tokio::spawn(engine.run(rx));
    (EngineHandle { tx }, task)
}

struct Engine {
    config: ChatConfig,
    transport: Arc<dyn Transport>,
    bus: TabBus,
    surface: Box<dyn RenderSurface>,
    notifier: Box<dyn Notifier>,
    marketing: Box<dyn MarketingSource>,
    session: SessionController,
    reconciler: Reconciler,
    panel: PanelMachine,
    scheduler: PollScheduler,
    gate: PollGate,
    /// Acknowledgment the store refused; retried on the next snapshot.
    unsaved_ack: Option<MessageId>,
    // Weak: the engine must not keep its own command channel open.
    self_tx: mpsc::WeakSender<EngineCommand>,
}

impl Engine {
    fn new(config: ChatConfig, deps: EngineDeps, self_tx: mpsc::WeakSender<EngineCommand>) -> Self {
        let session =
            SessionController::new(ReadStateStore::new(deps.store, &config.conversation));
        let reconciler = Reconciler::new(
            config.translations.clone(),
            config.default_photo_url.clone(),
        );
        let scheduler = PollScheduler::new(config.refresh_interval, config.max_loop_lifetime);

        Self {
            config,
            transport: deps.transport,
            bus: deps.bus,
            surface: deps.surface,
            notifier: deps.notifier,
            marketing: deps.marketing,
            session,
            reconciler,
            panel: PanelMachine::new(),
            scheduler,
            gate: PollGate::new(),
            unsaved_ack: None,
            self_tx,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<EngineCommand>) -> Result<(), ChatError> {
        info!(
            conversation = %self.config.conversation,
            tab = %self.bus.tab().short(),
            bus = self.bus.is_connected(),
            "Chat engine started"
        );

        let startup = self.start().await;
        self.check(startup)?;

        loop {
            let step = tokio::select! {
                command = rx.recv() => match command {
                    Some(EngineCommand::Shutdown) => {
                        info!("Chat engine shutdown requested");
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("All engine handles dropped, stopping");
                        break;
                    }
                },
                signal = self.bus.recv() => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => Ok(()),
                },
            };
            self.check(step)?;
        }

        self.scheduler.cancel();
        Ok(())
    }

    /// Log recoverable failures and keep going; hand fatal ones back.
    fn check(&mut self, step: Result<(), ChatError>) -> Result<(), ChatError> {
        match step {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Engine step failed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Fatal engine error, stopping");
                self.scheduler.cancel();
                Err(e)
            }
        }
    }

    async fn start(&mut self) -> Result<(), ChatError> {
        match self.session.is_active() {
            Ok(true) => {
                debug!("Posting session left on, resuming polling");
                self.restart_polling();
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not read session flag, not resuming polling"),
        }
        self.poll_now(true).await
    }

    async fn handle_command(&mut self, command: EngineCommand) -> Result<(), ChatError> {
        match command {
            EngineCommand::Open { propagate } => self.open(propagate),
            EngineCommand::Close { propagate } => {
                self.close(propagate);
                Ok(())
            }
            EngineCommand::Refresh(reply) => {
                let result = self.poll_now(true).await;
                let _ = reply.send(result.clone());
                result
            }
            EngineCommand::Submit(draft, reply) => {
                let result = self.submit(draft).await;
                let step = result.as_ref().map(|_| ()).map_err(|e| e.clone());
                let _ = reply.send(result);
                step
            }
            EngineCommand::Status(reply) => {
                let _ = reply.send(self.status());
                Ok(())
            }
            EngineCommand::PollTick => {
                self.poll_in_background();
                Ok(())
            }
            EngineCommand::PollCompleted { token, result } => {
                if !self.gate.complete(token) {
                    debug!(token, "Dropping superseded poll result");
                    return Ok(());
                }
                self.apply_fetch(result, false)
            }
            EngineCommand::PanelCue { generation, cue } => {
                if self.panel.is_current(generation) {
                    self.surface.apply_panel_cue(cue);
                }
                Ok(())
            }
            EngineCommand::PanelSettled { generation } => {
                if let Some(state) = self.panel.settle(generation) {
                    self.surface.set_panel_state(state);
                    debug!(?state, "Panel settled");
                }
                Ok(())
            }
            EngineCommand::Shutdown => Ok(()),
        }
    }

    async fn handle_signal(&mut self, signal: TabSignal) -> Result<(), ChatError> {
        debug!(signal = signal.as_wire(), "Signal from sibling tab");
        match signal {
            TabSignal::Opened => self.open(false),
            TabSignal::Closed => {
                self.close(false);
                Ok(())
            }
            TabSignal::RefreshRequested => self.poll_now(true).await,
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            panel: self.panel.state(),
            mode: self.session.mode(),
            polling: self.scheduler.is_running(),
            poll_in_flight: self.gate.in_flight(),
            connection_lost: self.reconciler.connection_lost(),
            last_rendered: self.reconciler.last_rendered(),
            pending_echoes: self.reconciler.pending_echoes(),
        }
    }

    // --- Polling ---

    /// Fetch on this task. Supersedes any background fetch.
    async fn poll_now(&mut self, force: bool) -> Result<(), ChatError> {
        let token = self.gate.supersede();
        let result = self.transport.fetch_conversation().await;
        self.gate.complete(token);
        self.apply_fetch(result, force)
    }

    /// Scheduled tick: fetch on a separate task, skipped while another
    /// fetch is outstanding.
    fn poll_in_background(&mut self) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let Some(token) = self.gate.try_begin() else {
            debug!("Poll already in flight, skipping tick");
            return;
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let result = transport.fetch_conversation().await;
            let _ = tx.send(EngineCommand::PollCompleted { token, result }).await;
        });
    }

    fn restart_polling(&mut self) {
        if let Some(tx) = self.self_tx.upgrade() {
            self.scheduler.restart(tx, || EngineCommand::PollTick);
        }
    }

    fn apply_fetch(
        &mut self,
        result: Result<ConversationSnapshot, TransportError>,
        force: bool,
    ) -> Result<(), ChatError> {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if self.reconciler.record_failure() {
                    self.surface
                        .show_connection_error(&self.config.translations.error_message_backend);
                }
                return Err(e.into());
            }
        };
        if self.reconciler.record_success() {
            info!("Backend reachable again");
            self.surface.clear_connection_error();
        }

        let acknowledged = self.acknowledged()?;
        let observation = self.session.observe_mode(snapshot.mode());
        let plan = self
            .reconciler
            .reconcile(&snapshot, observation, force, acknowledged)?;
        self.apply_plan(&snapshot, plan)
    }

    fn apply_plan(
        &mut self,
        snapshot: &ConversationSnapshot,
        plan: Reconciliation,
    ) -> Result<(), ChatError> {
        if plan.clear_transcript {
            self.surface.clear_transcript();
        }
        if plan.clear_callback_flash {
            self.surface.clear_flash();
        }
        if let Some(title) = &plan.title {
            self.surface.set_mode(plan.mode, title);
        }
        if let Some(header) = &plan.operator {
            self.surface.set_operator(header);
        }
        if let Some(intro) = &plan.intro {
            self.surface.render_intro(intro);
        }
        for echo in &plan.discarded_echoes {
            self.surface.discard_echo(*echo);
        }
        for message in &plan.to_render {
            self.surface.render_message(message);
        }

        if plan.notify {
            if let Some(message) = snapshot.last_message() {
                info!(id = ?message.id, operator = %message.operator_name, "New operator message");
                self.notifier.message_received(message);
            }
            if self.panel.state() == PanelState::Closed {
                self.open(true)?;
            }
        }

        if plan.operator_replied && self.scheduler.cancel() {
            debug!("Operator replied, polling stopped");
        }

        // Persist after the side effects: a failed write must not swallow
        // the notification or leave polling running.
        let mut persisted = Ok(());
        if let Some(id) = plan.acknowledge {
            persisted = self.persist_acknowledged(id);
        }
        if plan.operator_replied {
            persisted = persisted.and(self.end_session());
        }
        persisted
    }

    /// Stored acknowledgment, or the newer one still waiting to be saved.
    fn acknowledged(&mut self) -> Result<Option<MessageId>, ChatError> {
        if let Some(id) = self.unsaved_ack {
            match self.persist_acknowledged(id) {
                Ok(()) => debug!(%id, "Deferred acknowledgment saved"),
                Err(e) => warn!(error = %e, %id, "Acknowledgment still unsaved"),
            }
        }
        let stored = self.session.acknowledged()?;
        Ok(stored.max(self.unsaved_ack))
    }

    fn persist_acknowledged(&mut self, id: MessageId) -> Result<(), ChatError> {
        match self.session.acknowledge(id) {
            Ok(_) => {
                self.unsaved_ack = None;
                Ok(())
            }
            Err(e) => {
                self.unsaved_ack = self.unsaved_ack.max(Some(id));
                Err(e)
            }
        }
    }

    fn end_session(&self) -> Result<(), ChatError> {
        if self.session.is_active()? {
            self.session.end()?;
        }
        Ok(())
    }

    // --- Panel ---

    fn open(&mut self, propagate: bool) -> Result<(), ChatError> {
        let Some(transition) = self.panel.open() else {
            debug!(state = ?self.panel.state(), "Open ignored");
            return Ok(());
        };
        self.surface.set_panel_state(PanelState::Opening);
        if propagate {
            self.bus.publish(TabSignal::Opened);
        }
        for cue in transition.immediate_cues() {
            self.surface.apply_panel_cue(cue);
        }
        self.schedule_transition(&transition);
        self.surface.scroll_to_latest()
    }

    fn close(&mut self, propagate: bool) {
        let Some(transition) = self.panel.close() else {
            debug!(state = ?self.panel.state(), "Close ignored");
            return;
        };
        self.surface.set_panel_state(PanelState::Closing);
        if propagate {
            self.bus.publish(TabSignal::Closed);
        }
        for cue in transition.immediate_cues() {
            self.surface.apply_panel_cue(cue);
        }
        self.schedule_transition(&transition);
    }

    fn schedule_transition(&self, transition: &PanelTransition) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let generation = transition.generation;
        let cues: Vec<_> = transition.delayed_cues().collect();
        let settle_after = transition.settle_after;

        tokio::spawn(async move {
            let started = Instant::now();
            for (at, cue) in cues {
                time::sleep_until(started + at).await;
                if tx.send(EngineCommand::PanelCue { generation, cue }).await.is_err() {
                    return;
                }
            }
            time::sleep_until(started + settle_after).await;
            let _ = tx.send(EngineCommand::PanelSettled { generation }).await;
        });
    }

    // --- Submission ---

    async fn submit(&mut self, draft: Draft) -> Result<SubmitOutcome, ChatError> {
        self.bus.publish(TabSignal::RefreshRequested);
        let before = self.session.mode();
        self.reload().await?;
        let mode = self.session.mode().unwrap_or(Mode::Normal);

        if let Some(before) = before {
            if before != mode {
                let flash = match mode {
                    Mode::Callback => Flash {
                        kind: FlashKind::Info,
                        text: self.config.translations.change_to_callback.clone(),
                    },
                    Mode::Normal => Flash {
                        kind: FlashKind::Notice,
                        text: self.config.translations.change_to_chat.clone(),
                    },
                };
                self.surface.show_flash(&flash);
                return Ok(SubmitOutcome::ModeChanged(mode));
            }
        }

        let text = draft.text.trim();
        if text.is_empty() || draft.csrf_token.is_empty() {
            debug!("Ignoring empty draft");
            return Ok(SubmitOutcome::Ignored);
        }

        let is_callback = mode == Mode::Callback;
        let post = OutgoingPost {
            message: text.to_string(),
            token: draft.csrf_token.clone(),
            challenge_response: if is_callback {
                None
            } else {
                draft.challenge_response.clone()
            },
            marketing_data: if self.reconciler.has_inbound() {
                None
            } else {
                self.marketing.marketing_json()
            },
            is_callback,
        };

        let outcome = match self.transport.post_message(&post).await {
            Ok(()) => {
                info!(callback = is_callback, len = post.message.len(), "Message posted");
                for echo in self.reconciler.take_failed() {
                    self.surface.discard_echo(echo);
                }
                if is_callback {
                    self.surface.show_flash(&Flash {
                        kind: FlashKind::CallbackSuccess,
                        text: self.config.translations.success_flash.clone(),
                    });
                } else {
                    let echo = self.reconciler.push_echo(&post.message);
                    self.surface.render_echo(echo, &post.message);
                    self.bus.publish(TabSignal::RefreshRequested);
                    self.reload().await?;
                }
                SubmitOutcome::Sent {
                    callback: is_callback,
                }
            }
            Err(e) => {
                warn!(error = %e, callback = is_callback, "Message post failed");
                // Callback requests never enter the transcript.
                if !is_callback {
                    let echo = self.reconciler.push_failed();
                    self.surface.render_echo(echo, &post.message);
                    self.surface
                        .mark_echo_failed(echo, &self.config.translations.error_message);
                }
                SubmitOutcome::Failed
            }
        };

        self.session.start(Utc::now())?;
        self.restart_polling();
        Ok(outcome)
    }

    /// Forced reload where an unreachable backend only shows the banner.
    async fn reload(&mut self) -> Result<(), ChatError> {
        match self.poll_now(true).await {
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Reload failed");
                Ok(())
            }
            other => other,
        }
    }
}
