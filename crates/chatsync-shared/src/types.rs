use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset::PhotoSource;

/// Handle that scopes one engine instance: its persisted keys and its
/// cross-tab channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage scope for the read-state keys of this conversation.
    pub fn storage_scope(&self) -> String {
        format!("chat:{}", self.0)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new("default")
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// One per tab / engine instance; used to drop our own broadcasts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TabId(pub Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned message identifier. Server order is ascending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Parse the textual form kept in the read-state store.
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse::<u64>().ok().map(Self)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `In` is written by the visitor, `Out` by an operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// `None` for a local echo that the server has not confirmed yet.
    pub id: Option<MessageId>,
    pub body: String,
    pub direction: Direction,
    pub operator_name: String,
    pub operator_photo_url: Option<String>,
    pub operator_photo_url_alt: Option<String>,
}

impl Message {
    pub fn is_from_operator(&self) -> bool {
        self.direction == Direction::Out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperatorInfo {
    pub id: u64,
    pub name: String,
    /// Synchronized full-size photo; wins over `photo` when present.
    pub photo_full: Option<PhotoSource>,
    pub photo: Option<PhotoSource>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
}

impl OperatorInfo {
    /// Best photo available for this operator, full before current.
    pub fn preferred_photo(&self) -> Option<&PhotoSource> {
        self.photo_full.as_ref().or(self.photo.as_ref())
    }
}

/// One full fetch result. Replaced wholesale on every poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub operator_online: bool,
    pub operator: OperatorInfo,
    pub intro_text: String,
    pub messages: Vec<Message>,
}

impl ConversationSnapshot {
    pub fn mode(&self) -> Mode {
        Mode::from_operator_online(self.operator_online)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_message_id(&self) -> Option<MessageId> {
        self.last_message().and_then(|m| m.id)
    }
}

/// Derived from each snapshot, never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Mode {
    Normal,
    Callback,
}

impl Mode {
    pub fn from_operator_online(online: bool) -> Self {
        if online {
            Self::Normal
        } else {
            Self::Callback
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PanelState {
    Closed,
    Opening,
    Opened,
    Closing,
}

impl PanelState {
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Opening | Self::Closing)
    }
}

impl Default for PanelState {
    fn default() -> Self {
        Self::Closed
    }
}
