//! Line-oriented front end: renders to stdout, reads commands from stdin.

use std::collections::HashMap;

use chatsync_shared::{ChatError, Direction, Message, Mode, PanelState};

use crate::surface::{
    EchoId, Flash, FlashKind, Intro, IntroKind, Notifier, OperatorHeader, PanelCue, RenderSurface,
};

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Open,
    Close,
    Refresh,
    Status,
    Quit,
    Say(String),
}

impl TerminalCommand {
    /// `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let command = match line {
            "" => return None,
            "/open" => Self::Open,
            "/close" => Self::Close,
            "/refresh" => Self::Refresh,
            "/status" => Self::Status,
            "/quit" | "/exit" => Self::Quit,
            text => Self::Say(text.to_string()),
        };
        Some(command)
    }
}

#[derive(Debug, Default)]
pub struct TerminalSurface {
    echoes: HashMap<EchoId, String>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderSurface for TerminalSurface {
    fn render_message(&mut self, message: &Message) {
        match message.direction {
            Direction::In => println!("  you: {}", message.body),
            Direction::Out => println!("  {}: {}", message.operator_name, message.body),
        }
    }

    fn render_intro(&mut self, intro: &Intro) {
        match intro.kind {
            IntroKind::Operator => {
                println!("  {}: {}", intro.operator_name, intro.text);
                if let Some(phone) = &intro.phone {
                    println!("    phone: {phone}");
                }
                if let Some(link) = &intro.whatsapp_link {
                    println!("    whatsapp: {link}");
                }
            }
            IntroKind::Callback => println!("  {}", intro.text),
        }
    }

    fn render_echo(&mut self, echo: EchoId, body: &str) {
        println!("  you (sending): {body}");
        self.echoes.insert(echo, body.to_string());
    }

    fn discard_echo(&mut self, echo: EchoId) {
        self.echoes.remove(&echo);
    }

    fn mark_echo_failed(&mut self, echo: EchoId, error_text: &str) {
        if let Some(body) = self.echoes.get(&echo) {
            println!("  ! \"{body}\": {error_text}");
        }
    }

    fn clear_transcript(&mut self) {
        self.echoes.clear();
        println!("----------------------------------------");
    }

    fn set_mode(&mut self, mode: Mode, title: &str) {
        println!("== {title} ({mode:?}) ==");
    }

    fn set_operator(&mut self, header: &OperatorHeader) {
        println!("== {} | {} ==", header.title, header.operator_name);
    }

    fn show_connection_error(&mut self, text: &str) {
        eprintln!("[offline] {text}");
    }

    fn clear_connection_error(&mut self) {
        eprintln!("[online]");
    }

    fn show_flash(&mut self, flash: &Flash) {
        let tag = match flash.kind {
            FlashKind::Info => "info",
            FlashKind::Notice => "notice",
            FlashKind::CallbackSuccess => "ok",
        };
        println!("[{tag}] {}", flash.text);
    }

    fn clear_flash(&mut self) {}

    fn set_panel_state(&mut self, state: PanelState) {
        if !state.is_transitioning() {
            println!("(panel {state:?})");
        }
    }

    fn apply_panel_cue(&mut self, _cue: PanelCue) {}

    fn scroll_to_latest(&mut self) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Rings the terminal bell.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn message_received(&mut self, message: &Message) {
        print!("\x07");
        println!("* new message from {}", message.operator_name);
    }
}
