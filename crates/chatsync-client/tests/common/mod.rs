//! Fakes shared by the engine integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;

use chatsync_client::surface::{
    EchoId, Flash, FlashKind, Intro, IntroKind, OperatorHeader, PanelCue,
};
use chatsync_client::{
    spawn_engine, ChatConfig, EngineDeps, EngineHandle, Notifier, RenderSurface, StaticMarketing,
};
use chatsync_net::{TabBus, Transport};
use chatsync_shared::{
    ChatError, ConversationId, ConversationSnapshot, Direction, Message, MessageId, Mode,
    OperatorInfo, OutgoingPost, PanelState, PhotoSource, TabId, TransportError,
};
use chatsync_store::{KeyValueStore, MemoryStore, ReadStateStore, StoreError};

pub const CSRF: &str = "csrf-token";

pub fn conversation() -> ConversationId {
    ConversationId::new("engine-test")
}

pub fn test_config() -> ChatConfig {
    ChatConfig {
        conversation: conversation(),
        csrf_token: CSRF.to_string(),
        refresh_interval: Duration::from_secs(10),
        max_loop_lifetime: Duration::from_secs(60),
        ..ChatConfig::default()
    }
}

pub fn message(id: u64, direction: Direction, body: &str) -> Message {
    Message {
        id: Some(MessageId(id)),
        body: body.to_string(),
        direction,
        operator_name: "Petra".to_string(),
        operator_photo_url: Some("/img/petra.png".to_string()),
        operator_photo_url_alt: None,
    }
}

pub fn online(messages: Vec<Message>) -> ConversationSnapshot {
    ConversationSnapshot {
        operator_online: true,
        operator: OperatorInfo {
            id: 7,
            name: "Petra".to_string(),
            photo_full: None,
            photo: Some(PhotoSource::new("/img/petra.png")),
            phone: Some("+420 777 000 111".to_string()),
            whatsapp: Some("420777000111".to_string()),
        },
        intro_text: "Hi, I am Petra. How can I help?".to_string(),
        messages,
    }
}

pub fn offline() -> ConversationSnapshot {
    ConversationSnapshot::default()
}

/// Seed the shared read-state the way an earlier page load would have left it.
pub fn seed(store: &MemoryStore, acknowledged: Option<u64>, session_on: bool) {
    let read_state = ReadStateStore::new(Box::new(store.clone()), &conversation());
    if let Some(id) = acknowledged {
        read_state.advance_acknowledged(MessageId(id)).unwrap();
    }
    if session_on {
        read_state.set_session_on(Utc::now()).unwrap();
    }
}

pub fn read_state(store: &MemoryStore) -> ReadStateStore {
    ReadStateStore::new(Box::new(store.clone()), &conversation())
}

// --- Transport ---

struct FakeBackend {
    current: ConversationSnapshot,
    scripted: VecDeque<TransportError>,
    post_failures: VecDeque<TransportError>,
    fetches: usize,
    fetch_delay: Duration,
    posts: Vec<OutgoingPost>,
}

/// In-memory backend. Accepted posts on the normal route are appended to
/// the conversation as visitor messages, like the real backend does.
pub struct FakeTransport {
    backend: Mutex<FakeBackend>,
}

impl FakeTransport {
    pub fn new(snapshot: ConversationSnapshot) -> Arc<Self> {
        Arc::new(Self {
            backend: Mutex::new(FakeBackend {
                current: snapshot,
                scripted: VecDeque::new(),
                post_failures: VecDeque::new(),
                fetches: 0,
                fetch_delay: Duration::ZERO,
                posts: Vec::new(),
            }),
        })
    }

    pub fn set_snapshot(&self, snapshot: ConversationSnapshot) {
        self.backend.lock().unwrap().current = snapshot;
    }

    pub fn push_message(&self, message: Message) {
        self.backend.lock().unwrap().current.messages.push(message);
    }

    /// Make the next fetch fail.
    pub fn fail_next_fetch(&self, error: TransportError) {
        self.backend.lock().unwrap().scripted.push_back(error);
    }

    /// Fetches answer with the snapshot as it was when they started,
    /// after this much (virtual) time.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.backend.lock().unwrap().fetch_delay = delay;
    }

    pub fn fail_next_post(&self, error: TransportError) {
        self.backend.lock().unwrap().post_failures.push_back(error);
    }

    pub fn fetch_count(&self) -> usize {
        self.backend.lock().unwrap().fetches
    }

    pub fn posts(&self) -> Vec<OutgoingPost> {
        self.backend.lock().unwrap().posts.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_conversation(&self) -> Result<ConversationSnapshot, TransportError> {
        let (result, delay) = {
            let mut backend = self.backend.lock().unwrap();
            backend.fetches += 1;
            let result = match backend.scripted.pop_front() {
                Some(error) => Err(error),
                None => Ok(backend.current.clone()),
            };
            (result, backend.fetch_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn post_message(&self, post: &OutgoingPost) -> Result<(), TransportError> {
        let mut backend = self.backend.lock().unwrap();
        if let Some(error) = backend.post_failures.pop_front() {
            return Err(error);
        }
        backend.posts.push(post.clone());
        if !post.is_callback {
            let next = backend
                .current
                .last_message_id()
                .map_or(1, |MessageId(id)| id + 1);
            let operator = backend.current.operator.name.clone();
            backend.current.messages.push(Message {
                id: Some(MessageId(next)),
                body: post.message.clone(),
                direction: Direction::In,
                operator_name: operator,
                operator_photo_url: None,
                operator_photo_url_alt: None,
            });
        }
        Ok(())
    }
}

// --- Store ---

/// Shared in-memory store whose reads or writes of chosen keys fail once.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_gets: Arc<Mutex<Vec<&'static str>>>,
    failing_sets: Arc<Mutex<Vec<&'static str>>>,
}

impl FlakyStore {
    pub fn new(inner: &MemoryStore) -> Self {
        Self {
            inner: inner.clone(),
            ..Self::default()
        }
    }

    pub fn fail_next_get(&self, key: &'static str) {
        self.failing_gets.lock().unwrap().push(key);
    }

    pub fn fail_next_set(&self, key: &'static str) {
        self.failing_sets.lock().unwrap().push(key);
    }

    fn take(list: &Mutex<Vec<&'static str>>, key: &str) -> Result<(), StoreError> {
        let mut list = list.lock().unwrap();
        match list.iter().position(|k| *k == key) {
            Some(at) => {
                list.remove(at);
                Err(StoreError::Io(std::io::Error::other("disk unavailable")))
            }
            None => Ok(()),
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, scope: &str, key: &str) -> Result<Option<String>, StoreError> {
        Self::take(&self.failing_gets, key)?;
        self.inner.get(scope, key)
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<(), StoreError> {
        Self::take(&self.failing_sets, key)?;
        self.inner.set(scope, key, value)
    }

    fn remove(&self, scope: &str, key: &str) -> Result<(), StoreError> {
        self.inner.remove(scope, key)
    }
}

// --- Surface ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Message(Option<MessageId>, Direction),
    Intro(IntroKind, String),
    Echo(EchoId, String),
    DiscardEcho(EchoId),
    EchoFailed(EchoId),
    ClearTranscript,
    SetMode(Mode, String),
    SetOperator(String),
    ConnectionError,
    ClearConnectionError,
    Flash(FlashKind, String),
    ClearFlash,
    Panel(PanelState),
    Cue(PanelCue),
    Scroll,
}

impl SurfaceCall {
    /// Calls that add to or remove from the transcript.
    pub fn mutates_transcript(&self) -> bool {
        matches!(
            self,
            Self::Message(..)
                | Self::Intro(..)
                | Self::Echo(..)
                | Self::DiscardEcho(_)
                | Self::ClearTranscript
        )
    }
}

#[derive(Clone, Default)]
pub struct RecordingSurface {
    calls: Arc<Mutex<Vec<SurfaceCall>>>,
    missing_transcript: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page whose transcript container is gone.
    pub fn without_transcript() -> Self {
        Self {
            missing_transcript: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &SurfaceCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn transcript_mutations(&self) -> usize {
        self.calls().iter().filter(|c| c.mutates_transcript()).count()
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RenderSurface for RecordingSurface {
    fn render_message(&mut self, message: &Message) {
        self.record(SurfaceCall::Message(message.id, message.direction));
    }

    fn render_intro(&mut self, intro: &Intro) {
        self.record(SurfaceCall::Intro(intro.kind, intro.operator_name.clone()));
    }

    fn render_echo(&mut self, echo: EchoId, body: &str) {
        self.record(SurfaceCall::Echo(echo, body.to_string()));
    }

    fn discard_echo(&mut self, echo: EchoId) {
        self.record(SurfaceCall::DiscardEcho(echo));
    }

    fn mark_echo_failed(&mut self, echo: EchoId, _error_text: &str) {
        self.record(SurfaceCall::EchoFailed(echo));
    }

    fn clear_transcript(&mut self) {
        self.record(SurfaceCall::ClearTranscript);
    }

    fn set_mode(&mut self, mode: Mode, title: &str) {
        self.record(SurfaceCall::SetMode(mode, title.to_string()));
    }

    fn set_operator(&mut self, header: &OperatorHeader) {
        self.record(SurfaceCall::SetOperator(header.operator_name.clone()));
    }

    fn show_connection_error(&mut self, _text: &str) {
        self.record(SurfaceCall::ConnectionError);
    }

    fn clear_connection_error(&mut self) {
        self.record(SurfaceCall::ClearConnectionError);
    }

    fn show_flash(&mut self, flash: &Flash) {
        self.record(SurfaceCall::Flash(flash.kind, flash.text.clone()));
    }

    fn clear_flash(&mut self) {
        self.record(SurfaceCall::ClearFlash);
    }

    fn set_panel_state(&mut self, state: PanelState) {
        self.record(SurfaceCall::Panel(state));
    }

    fn apply_panel_cue(&mut self, cue: PanelCue) {
        self.record(SurfaceCall::Cue(cue));
    }

    fn scroll_to_latest(&mut self) -> Result<(), ChatError> {
        if self.missing_transcript {
            return Err(ChatError::StructuralIntegrity(
                "transcript container not found".to_string(),
            ));
        }
        self.record(SurfaceCall::Scroll);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<Option<MessageId>>>>,
}

impl RecordingNotifier {
    pub fn received(&self) -> Vec<Option<MessageId>> {
        self.received.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn message_received(&mut self, message: &Message) {
        self.received.lock().unwrap().push(message.id);
    }
}

// --- Harness ---

pub struct Tab {
    pub handle: EngineHandle,
    pub task: JoinHandle<Result<(), ChatError>>,
    pub transport: Arc<FakeTransport>,
    pub surface: RecordingSurface,
    pub notifier: RecordingNotifier,
}

pub struct TabBuilder {
    config: ChatConfig,
    transport: Arc<FakeTransport>,
    store: Box<dyn KeyValueStore>,
    bus: Option<TabBus>,
    surface: RecordingSurface,
    marketing: Option<String>,
}

impl TabBuilder {
    pub fn new(transport: Arc<FakeTransport>) -> Self {
        Self {
            config: test_config(),
            transport,
            store: Box::new(MemoryStore::new()),
            bus: None,
            surface: RecordingSurface::new(),
            marketing: None,
        }
    }

    pub fn store(mut self, store: &MemoryStore) -> Self {
        self.store = Box::new(store.clone());
        self
    }

    pub fn flaky_store(mut self, store: &FlakyStore) -> Self {
        self.store = Box::new(store.clone());
        self
    }

    pub fn bus(mut self, bus: TabBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn surface(mut self, surface: RecordingSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn marketing(mut self, json: &str) -> Self {
        self.marketing = Some(json.to_string());
        self
    }

    pub fn spawn(self) -> Tab {
        let notifier = RecordingNotifier::default();
        let deps = EngineDeps {
            transport: self.transport.clone(),
            store: self.store,
            bus: self
                .bus
                .unwrap_or_else(|| TabBus::detached(TabId::new())),
            surface: Box::new(self.surface.clone()),
            notifier: Box::new(notifier.clone()),
            marketing: Box::new(StaticMarketing(self.marketing)),
        };
        let (handle, task) = spawn_engine(self.config, deps);
        Tab {
            handle,
            task,
            transport: self.transport,
            surface: self.surface,
            notifier,
        }
    }
}

/// Let timers and background tasks run, then sync with the engine.
pub async fn settle(tab: &Tab, by: Duration) {
    tokio::time::sleep(by).await;
    tab.handle.status().await.unwrap();
}
