use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use relaybot::access::activation;
use relaybot::backend::HttpBackend;
use relaybot::config::Config;
use relaybot::db::{self, AppState, queries};
use relaybot::handlers;
use relaybot::telegram::{self, TelegramClient};

#[derive(Parser)]
#[command(name = "relaybot", about = "Metered message-relay bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot transport and the payment-code issuance API (default).
    Serve,
    /// Insert an unredeemed activation code from the command line.
    IssueCode {
        /// Code string; generated when omitted.
        #[arg(long)]
        code: Option<String>,
        /// Free-text issuance label.
        #[arg(long)]
        note: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let pool = db::init_pool(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path))?;
    tracing::info!(path = %config.database_path, "database ready");

    let state = AppState {
        db: pool,
        config: Arc::new(config),
    };

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::IssueCode { code, note } => issue_code(state, code, note),
    }
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.addr();
    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "payment API listening");

    let api = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .context("payment API server failed")
    });

    // The chat transport is optional: without a token the process still
    // serves the issuance API.
    match (&state.config.telegram_bot_token, &state.config.backend_url) {
        (Some(token), Some(backend_url)) => {
            let backend = Arc::new(HttpBackend::new(
                backend_url,
                &state.config.backend_framework,
            )?);
            let client = TelegramClient::new(token)?;
            let bot_state = state.clone();
            let bot = tokio::spawn(async move {
                telegram::run(bot_state, backend, client)
                    .await
                    .context("chat transport failed")
            });
            tokio::select! {
                result = api => result??,
                result = bot => result??,
            }
        }
        (None, _) => {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set, running the payment API only");
            api.await??;
        }
        (Some(_), None) => {
            tracing::warn!("BACKEND_URL not set, running the payment API only");
            api.await??;
        }
    }

    Ok(())
}

fn issue_code(
    state: AppState,
    code: Option<String>,
    note: Option<String>,
) -> anyhow::Result<()> {
    let code = code.unwrap_or_else(handlers::generate_paid_code);
    let conn = state.db.get()?;
    let issued = activation::issue(&conn, &code, note.as_deref(), queries::now())?;
    println!("{}", issued.code);
    Ok(())
}
