//! Memo Ledger - chat front-end for the shared expense sheet
//!
//! A chat command starts a short dialogue that stages an expense in the
//! spreadsheet, shows it for confirmation and hands it to the finalize
//! script.

mod api;
mod chat;
mod commit;
mod config;
mod dispatcher;
mod names;
mod notify;
mod runtime;
mod state_machine;
mod store;

use api::{create_router, AppState};
use chat::{ChannelId, DiscordRestClient};
use commit::{ScriptCommitGateway, TransactionIdGenerator};
use config::LedgerConfig;
use dispatcher::Dispatcher;
use names::NameResolver;
use notify::NotificationSink;
use runtime::{Collaborators, SessionManager, SessionSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use store::SheetsRowStore;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Pick up a local .env before anything reads the environment
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memo_ledger=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    // Configuration
    let config = LedgerConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;

    // Adapters
    let sheets = SheetsRowStore::new(
        &config.sheets_access_token,
        &config.spreadsheet_id,
        &config.sheet_name,
        config.sheet_gid,
    )?;
    let sheet_url = sheets.sheet_url();
    let chat = Arc::new(DiscordRestClient::new(&config.discord_bot_token)?);
    let io = Collaborators {
        store: Arc::new(sheets),
        chat: chat.clone(),
        commit: Arc::new(ScriptCommitGateway::new(&config.gas_base_url)?),
        ids: Arc::new(TransactionIdGenerator::new()),
    };

    // Sessions
    let mut settings = SessionSettings::new(&sheet_url);
    settings.confirm_timeout = config.confirm_timeout;
    settings.prompt_timeout = config.prompt_timeout;
    settings.clear_on_timeout = config.clear_on_timeout;

    let dispatcher = Dispatcher::new(
        &config.command_prefix,
        &config.command_name,
        &config.discord_bot_user_id,
    )?;
    let names = NameResolver::with_extra(config.name_aliases.clone());
    let manager = Arc::new(SessionManager::new(io, settings, names, dispatcher));

    // Notifications
    let notify_channel = config.notify_channel_id.clone().map(ChannelId::new);
    if notify_channel.is_none() {
        tracing::warn!("LEDGER_NOTIFY_CHANNEL_ID not set; webhook notifications will be dropped");
    }
    let (notifications, sink) = NotificationSink::channel(chat, notify_channel);
    let sink_task = tokio::spawn(sink.run());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(manager, notifications)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    tracing::info!(
        bot_user_id = %config.discord_bot_user_id,
        spreadsheet_id = %config.spreadsheet_id,
        sheet = %config.sheet_name,
        command = %format!("{}{}", config.command_prefix, config.command_name),
        "Ledger bot ready"
    );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Memo ledger listening on {}", addr);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    // The router held the last sender; let queued notifications drain
    let _ = sink_task.await;
    tracing::info!("Memo ledger stopped");

    Ok(())
}
