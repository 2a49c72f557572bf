//! # chatsync-client
//!
//! Client-side synchronization engine of the support chat widget: keeps one
//! tab's transcript consistent with the backend and with sibling tabs.

pub mod config;
pub mod engine;
pub mod panel;
pub mod reconciler;
pub mod scheduler;
pub mod session;
pub mod surface;
pub mod terminal;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::{ChatConfig, Translations};
pub use engine::{spawn_engine, Draft, EngineDeps, EngineHandle, EngineStatus, SubmitOutcome};
pub use surface::{MarketingSource, Notifier, RenderSurface, StaticMarketing};

/// Install the global tracing subscriber, honouring `RUST_LOG`.
///
/// Logs go to stderr so they do not interleave with the rendered transcript.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "chatsync=debug,chatsync_client=debug,chatsync_net=info,chatsync_store=info,warn",
        )
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
