use anyhow::Context;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymkeeper::config::{Config, LedgerBackend};
use gymkeeper::context::{AppContext, BotOptions};
use gymkeeper::ledger::{auth::TokenSource, memory::MemoryLedger, sheets::SheetsClient, Ledger, LedgerStore};
use gymkeeper::services::telegram::TelegramClient;
use secrecy::ExposeSecret;

fn build_store(config: &Config) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.ledger_backend {
        LedgerBackend::Memory => {
            tracing::warn!("Using the in-memory ledger, data is lost on restart");
            Ok(Arc::new(MemoryLedger::new()))
        }
        LedgerBackend::Sheets => {
            let spreadsheet_id = config
                .spreadsheet_id
                .clone()
                .context("SPREADSHEET_ID must be set for the sheets backend")?;
            let credentials = config.load_google_credentials()?;
            let tokens = TokenSource::from_credentials(credentials.expose_secret())?;
            let client = SheetsClient::new(
                &config.sheets_api_url,
                spreadsheet_id,
                tokens,
                Duration::from_secs(config.ledger_timeout_secs),
            )?;
            Ok(Arc::new(client))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymkeeper=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting gymkeeper...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(backend = ?config.ledger_backend, "Configuration loaded successfully");

    let ledger = Ledger::new(build_store(&config)?);

    let telegram = Arc::new(TelegramClient::new(
        &config.telegram_api_url,
        config.bot_token.clone(),
        Duration::from_secs(config.telegram_timeout_secs),
        config.poll_timeout_secs,
    )?);

    let ctx = Arc::new(AppContext::new(
        BotOptions::from(&config),
        ledger,
        telegram.clone(),
    ));

    // Without a ledger the bot still answers, in limited mode
    match ctx.ledger.initialize().await {
        Ok(()) => {
            ctx.set_ledger_ready(true);
            tracing::info!("Ledger initialized");
        }
        Err(e) => tracing::error!(error = %e, "Ledger unavailable, starting in limited mode"),
    }

    match telegram.get_me().await {
        Ok(me) => tracing::info!(username = ?me.username, "Connected to the Bot API"),
        Err(e) => tracing::error!(error = %e, "Bot API not reachable yet"),
    }
    if let Err(e) = telegram.set_my_commands(&gymkeeper::bot::bot_commands()).await {
        tracing::warn!(error = %e, "Failed to register bot commands");
    }

    let startup_note = if ctx.ledger_ready() {
        "🤖 Bot started"
    } else {
        "⚠️ Bot started in limited mode: the ledger is unavailable"
    };
    ctx.notifier.notify_admin(startup_note).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(gymkeeper::bot::run_polling(
        ctx.clone(),
        telegram.clone(),
        shutdown_rx,
    ));

    let app = gymkeeper::api::router(ctx.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = poller.await {
        tracing::error!(error = %e, "Polling task ended abnormally");
    }

    tracing::info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
