use serde::{Deserialize, Serialize};

use crate::asset::PhotoSource;
use crate::constants::{
    FIELD_CHALLENGE_RESPONSE, FIELD_MARKETING_DATA, FIELD_MESSAGE, FIELD_TOKEN,
};
use crate::types::{ConversationSnapshot, Direction, Message, MessageId, OperatorInfo};

/// Body of the get-conversation response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub operator_online: bool,
    /// Absent (or null) when nobody is online.
    #[serde(default)]
    pub operator: Option<OperatorDto>,
    #[serde(default)]
    pub intro_message: String,
    #[serde(default)]
    pub messages: Vec<MessageDto>,
}

/// A message as the backend serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    #[serde(default)]
    pub id: Option<u64>,
    pub message: String,
    pub way: Direction,
    #[serde(default)]
    pub operator_name: String,
    #[serde(default)]
    pub operator_photo: Option<String>,
    #[serde(default)]
    pub operator_photo_webp: Option<String>,
}

/// The online operator as the backend serializes it. Fields the widget never
/// shows (email, surname, username) are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorDto {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub photo_webp: Option<String>,
    #[serde(default)]
    pub photo_full_url: Option<String>,
    #[serde(default)]
    pub photo_full_url_webp: Option<String>,
}

impl From<MessageDto> for Message {
    fn from(m: MessageDto) -> Self {
        Self {
            id: m.id.map(MessageId),
            body: m.message,
            direction: m.way,
            operator_name: m.operator_name,
            operator_photo_url: m.operator_photo.filter(|p| !p.is_empty()),
            operator_photo_url_alt: m.operator_photo_webp.filter(|p| !p.is_empty()),
        }
    }
}

impl From<OperatorDto> for OperatorInfo {
    fn from(o: OperatorDto) -> Self {
        Self {
            id: o.id,
            name: o.name,
            photo_full: PhotoSource::from_parts(o.photo_full_url, o.photo_full_url_webp),
            photo: PhotoSource::from_parts(o.photo, o.photo_webp),
            phone: o.phone.filter(|p| !p.is_empty()),
            whatsapp: o.whatsapp.filter(|w| !w.is_empty()),
        }
    }
}

impl From<ConversationResponse> for ConversationSnapshot {
    fn from(r: ConversationResponse) -> Self {
        Self {
            operator_online: r.operator_online,
            operator: r.operator.map(OperatorInfo::from).unwrap_or_default(),
            intro_text: r.intro_message,
            messages: r.messages.into_iter().map(Message::from).collect(),
        }
    }
}

impl ConversationResponse {
    /// Decode a get-conversation body straight into a snapshot.
    pub fn decode_snapshot(body: &[u8]) -> Result<ConversationSnapshot, serde_json::Error> {
        let response: ConversationResponse = serde_json::from_slice(body)?;
        Ok(response.into())
    }
}

/// A post-message request, independent of how it is encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPost {
    pub message: String,
    /// CSRF token issued with the page.
    pub token: String,
    pub challenge_response: Option<String>,
    /// Marketing attribution JSON, only on the first outbound message.
    pub marketing_data: Option<String>,
    /// Selects the callback-request route instead of the message route.
    pub is_callback: bool,
}

impl OutgoingPost {
    /// Multipart form fields, absent optionals omitted.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            (FIELD_MESSAGE, self.message.clone()),
            (FIELD_TOKEN, self.token.clone()),
        ];
        if let Some(challenge) = &self.challenge_response {
            fields.push((FIELD_CHALLENGE_RESPONSE, challenge.clone()));
        }
        if let Some(marketing) = &self.marketing_data {
            fields.push((FIELD_MARKETING_DATA, marketing.clone()));
        }
        fields
    }
}

/// Control signals exchanged between tabs of the same origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabSignal {
    Opened,
    Closed,
    RefreshRequested,
}

impl TabSignal {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Opened => "chat_open",
            Self::Closed => "chat_close",
            Self::RefreshRequested => "chat_refresh",
        }
    }
}
