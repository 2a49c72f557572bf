//! # chatsync
//!
//! Terminal front end for the chat engine. Each line typed is sent as a
//! message; `/open`, `/close`, `/refresh`, `/status` and `/quit` drive the
//! panel and the engine directly.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use chatsync_client::terminal::{TerminalCommand, TerminalNotifier, TerminalSurface};
use chatsync_client::{spawn_engine, ChatConfig, Draft, EngineDeps, StaticMarketing, SubmitOutcome};
use chatsync_net::{BroadcastHub, HttpTransport, Routes};
use chatsync_shared::constants::BUS_CHANNEL_NAME;
use chatsync_shared::{ChatError, TabId};
use chatsync_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatsync_client::init_tracing();

    info!("Starting chatsync v{}", env!("CARGO_PKG_VERSION"));

    let config = ChatConfig::from_env();
    info!(
        conversation = %config.conversation,
        base_url = %config.base_url,
        refresh_secs = config.refresh_interval.as_secs(),
        max_loop_secs = config.max_loop_lifetime.as_secs(),
        "Loaded configuration"
    );

    let database = match &config.db_path {
        Some(path) => Database::open_at(path)
            .with_context(|| format!("opening {}", path.display()))?,
        None => Database::new().context("opening default database")?,
    };

    let routes = Routes::resolve(
        &config.base_url,
        &config.conversation_route,
        &config.post_route,
        &config.callback_route,
    )?;
    let transport = Arc::new(HttpTransport::new(routes, config.request_timeout)?);

    let hub = BroadcastHub::new(format!("{BUS_CHANNEL_NAME}:{}", config.conversation));
    let bus = hub.join(TabId::new());

    let csrf_token = config.csrf_token.clone();
    let deps = EngineDeps {
        transport,
        store: Box::new(database),
        bus,
        surface: Box::new(TerminalSurface::new()),
        notifier: Box::new(TerminalNotifier),
        marketing: Box::new(StaticMarketing(config.marketing_data.clone())),
    };
    let (handle, mut engine) = spawn_engine(config, deps);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let Some(command) = TerminalCommand::parse(&line) else {
                    continue;
                };
                let result = match command {
                    TerminalCommand::Open => handle.open().await,
                    TerminalCommand::Close => handle.close().await,
                    TerminalCommand::Refresh => handle.refresh().await,
                    TerminalCommand::Status => handle.status().await.map(|status| {
                        println!("{status:?}");
                    }),
                    TerminalCommand::Quit => break,
                    TerminalCommand::Say(text) => {
                        handle.submit(Draft::new(text, csrf_token.clone())).await.map(|outcome| {
                            if outcome == SubmitOutcome::Ignored {
                                println!("(not sent: message or CSRF token empty)");
                            }
                        })
                    }
                };
                match result {
                    Ok(()) => {}
                    Err(ChatError::Stopped) => break,
                    Err(e) => warn!(error = %e, "Command failed"),
                }
            }
            result = &mut engine => {
                return Ok(result??);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    let _ = handle.shutdown().await;
    engine.await??;
    Ok(())
}
