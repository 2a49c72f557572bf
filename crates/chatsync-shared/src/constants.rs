/// Application name
pub const APP_NAME: &str = "chatsync";

/// Poll cadence while a posting session is active, in seconds
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 10;

/// Hard ceiling on one polling loop's lifetime (30 minutes)
pub const DEFAULT_MAX_LOOP_SECS: u64 = 30 * 60;

/// Panel reveal/hide timeline, in milliseconds from the trigger
pub const PANEL_BODY_REVEAL_MS: u64 = 500;
pub const PANEL_BODY_HIDE_MS: u64 = 400;
pub const PANEL_CHROME_SWAP_MS: u64 = 1000;
pub const PANEL_SETTLE_MS: u64 = 1300;

/// Extension used for the alternate-format operator photo
pub const ALT_IMAGE_EXTENSION: &str = "webp";

/// Fallback avatar when an operator has no photo
pub const DEFAULT_PHOTO_URL: &str = "/images/icons/avatar.png";

/// Name of the same-origin broadcast channel the widget tabs share
pub const BUS_CHANNEL_NAME: &str = "chat_channel";

/// Buffer of the in-process broadcast primitive backing the cross-tab bus
pub const BUS_BUFFER_CAPACITY: usize = 64;

/// Persisted read-state keys
pub const KEY_LAST_READ_MESSAGE_ID: &str = "lastReadMessageId";
pub const KEY_SESSION_ON: &str = "chatSessionOn";
pub const KEY_SESSION_ON_TIMESTAMP: &str = "chatSessionOnTimestamp";

/// Multipart field names of the post-message request
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_TOKEN: &str = "token";
pub const FIELD_CHALLENGE_RESPONSE: &str = "cf-turnstile-response";
pub const FIELD_MARKETING_DATA: &str = "marketingData";

/// WhatsApp deep-link prefix used in the intro message
pub const WHATSAPP_LINK_PREFIX: &str = "https://wa.me/";
