//! Widget configuration loaded from environment variables.
//!
//! Every setting has a default so the engine runs against a local backend
//! with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use chatsync_net::DEFAULT_REQUEST_TIMEOUT;
use chatsync_shared::constants::{
    DEFAULT_MAX_LOOP_SECS, DEFAULT_PHOTO_URL, DEFAULT_REFRESH_INTERVAL_SECS,
};
use chatsync_shared::ConversationId;

/// User-facing texts, shipped to the widget as one JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Translations {
    pub success_flash: String,
    pub callback_title: String,
    pub chat_title: String,
    pub change_to_callback: String,
    pub change_to_chat: String,
    /// Inline marker under a message that could not be sent.
    pub error_message: String,
    /// Banner shown while the backend is unreachable.
    pub error_message_backend: String,
    pub callback_intro_message: String,
}

impl Default for Translations {
    fn default() -> Self {
        Self {
            success_flash: "Thank you, we will call you back shortly.".to_string(),
            callback_title: "Request a callback".to_string(),
            chat_title: "Chat with us".to_string(),
            change_to_callback: "Our operators just went offline. Leave your phone number and we will call you back.".to_string(),
            change_to_chat: "An operator is online now, you can chat with us.".to_string(),
            error_message: "The message could not be sent.".to_string(),
            error_message_backend: "Connection to the chat was lost. Retrying…".to_string(),
            callback_intro_message: "Nobody is online right now. Leave us your phone number and we will call you back.".to_string(),
        }
    }
}

impl Translations {
    /// Parse a translations object; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Scopes persisted keys and the cross-tab channel.
    /// Env: `CHAT_CONVERSATION_ID`
    /// Default: `default`
    pub conversation: ConversationId,

    /// Env: `CHAT_BASE_URL`
    /// Default: `http://127.0.0.1:8000/`
    pub base_url: String,

    /// Env: `CHAT_ROUTE_CONVERSATION`
    /// Default: `/chat/data`
    pub conversation_route: String,

    /// Env: `CHAT_ROUTE_POST`
    /// Default: `/chat/message`
    pub post_route: String,

    /// Env: `CHAT_ROUTE_CALLBACK`
    /// Default: `/chat/callback`
    pub callback_route: String,

    /// Poll cadence while a posting session is active.
    /// Env: `CHAT_REFRESH_INTERVAL_SECS`
    /// Default: `10`
    pub refresh_interval: Duration,

    /// Ceiling on one polling loop, measured from its (re)start.
    /// Env: `CHAT_MAX_LOOP_SECS`
    /// Default: `1800`
    pub max_loop_lifetime: Duration,

    /// Env: `CHAT_REQUEST_TIMEOUT_SECS`
    /// Default: `8`
    pub request_timeout: Duration,

    /// SQLite file for the read-state. `None` uses the platform data dir.
    /// Env: `CHAT_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Env: `CHAT_DEFAULT_PHOTO_URL`
    pub default_photo_url: String,

    /// CSRF token attached to every post.
    /// Env: `CHAT_CSRF_TOKEN`
    pub csrf_token: String,

    /// Marketing attribution JSON sent with the first outbound message.
    /// Env: `CHAT_MARKETING_JSON`
    pub marketing_data: Option<String>,

    /// Env: `CHAT_TRANSLATIONS` (path to a JSON file)
    pub translations: Translations,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            conversation: ConversationId::default(),
            base_url: "http://127.0.0.1:8000/".to_string(),
            conversation_route: "/chat/data".to_string(),
            post_route: "/chat/message".to_string(),
            callback_route: "/chat/callback".to_string(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            max_loop_lifetime: Duration::from_secs(DEFAULT_MAX_LOOP_SECS),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            db_path: None,
            default_photo_url: DEFAULT_PHOTO_URL.to_string(),
            csrf_token: String::new(),
            marketing_data: None,
            translations: Translations::default(),
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("CHAT_CONVERSATION_ID") {
            if !id.is_empty() {
                config.conversation = ConversationId::new(id);
            }
        }

        if let Ok(url) = std::env::var("CHAT_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(route) = std::env::var("CHAT_ROUTE_CONVERSATION") {
            config.conversation_route = route;
        }
        if let Ok(route) = std::env::var("CHAT_ROUTE_POST") {
            config.post_route = route;
        }
        if let Ok(route) = std::env::var("CHAT_ROUTE_CALLBACK") {
            config.callback_route = route;
        }

        if let Some(secs) = env_secs("CHAT_REFRESH_INTERVAL_SECS") {
            config.refresh_interval = secs;
        }
        if let Some(secs) = env_secs("CHAT_MAX_LOOP_SECS") {
            config.max_loop_lifetime = secs;
        }
        if let Some(secs) = env_secs("CHAT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = secs;
        }

        if let Ok(path) = std::env::var("CHAT_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("CHAT_DEFAULT_PHOTO_URL") {
            if !url.is_empty() {
                config.default_photo_url = url;
            }
        }

        if let Ok(token) = std::env::var("CHAT_CSRF_TOKEN") {
            config.csrf_token = token;
        }

        if let Ok(json) = std::env::var("CHAT_MARKETING_JSON") {
            if !json.is_empty() {
                config.marketing_data = Some(json);
            }
        }

        if let Ok(path) = std::env::var("CHAT_TRANSLATIONS") {
            match std::fs::read_to_string(&path) {
                Ok(json) => match Translations::from_json(&json) {
                    Ok(translations) => config.translations = translations,
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "Invalid translations file, using defaults")
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Cannot read translations file, using defaults")
                }
            }
        }

        config
    }
}

/// Parse a positive number of seconds from `name`.
fn env_secs(name: &str) -> Option<Duration> {
    let value = std::env::var(name).ok()?;
    match parse_secs(&value) {
        Some(d) => Some(d),
        None => {
            tracing::warn!(var = name, value = %value, "Invalid duration, using default");
            None
        }
    }
}

fn parse_secs(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(secs) => Some(Duration::from_secs(secs)),
    }
}
