//! Seams between the engine and the page it drives.
//!
//! The engine pushes view updates into a [`RenderSurface`] and never reads
//! layout back, with one exception: [`RenderSurface::scroll_to_latest`] fails
//! when the transcript container does not exist, which the engine treats as
//! a broken deployment. Sound/visual alerts go through [`Notifier`], and the
//! marketing attribution blob comes from a [`MarketingSource`].

use chatsync_shared::{ChatError, Message, Mode, PanelState, PhotoSource};

/// Local identifier of a message drafted in this tab and not yet confirmed
/// by the server.
pub type EchoId = u64;

/// Header bar contents in Normal mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorHeader {
    pub title: String,
    pub operator_name: String,
    /// `alt_url` is always the derived alternate-format sibling.
    pub photo: PhotoSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroKind {
    /// Greeting from an operator, with contact links.
    Operator,
    /// Fixed greeting of the callback form.
    Callback,
}

/// The synthetic first entry of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intro {
    pub kind: IntroKind,
    pub operator_name: String,
    pub photo: PhotoSource,
    pub text: String,
    pub phone: Option<String>,
    pub whatsapp_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Info,
    Notice,
    /// Confirmation of a callback request; dropped when an operator comes online.
    CallbackSuccess,
}

/// A transient banner above the transcript. Showing one replaces the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub text: String,
}

/// Visual steps of the panel's open/close animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelCue {
    Widen,
    ShowBody,
    ShowAssistant,
    HideBubble,
    ShowCloseButton,
    HideBody,
    Narrow,
    HideCloseButton,
    ShowBubble,
}

pub trait RenderSurface: Send {
    fn render_message(&mut self, message: &Message);

    fn render_intro(&mut self, intro: &Intro);

    fn render_echo(&mut self, echo: EchoId, body: &str);

    fn discard_echo(&mut self, echo: EchoId);

    /// Attach the inline failure marker to an echo.
    fn mark_echo_failed(&mut self, echo: EchoId, error_text: &str);

    /// Remove every transcript entry, intro included.
    fn clear_transcript(&mut self);

    fn set_mode(&mut self, mode: Mode, title: &str);

    fn set_operator(&mut self, header: &OperatorHeader);

    fn show_connection_error(&mut self, text: &str);

    fn clear_connection_error(&mut self);

    fn show_flash(&mut self, flash: &Flash);

    fn clear_flash(&mut self);

    fn set_panel_state(&mut self, state: PanelState);

    fn apply_panel_cue(&mut self, cue: PanelCue);

    /// Bring the newest transcript entry into view.
    fn scroll_to_latest(&mut self) -> Result<(), ChatError>;
}

pub trait Notifier: Send {
    /// An operator message arrived that this browser has not acknowledged.
    fn message_received(&mut self, message: &Message);
}

pub trait MarketingSource: Send {
    fn marketing_json(&self) -> Option<String>;
}

/// Marketing data fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketing(pub Option<String>);

impl MarketingSource for StaticMarketing {
    fn marketing_json(&self) -> Option<String> {
        self.0.clone()
    }
}
