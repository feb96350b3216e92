//! Parley server binary.
//!
//! # Usage
//!
//! ```bash
//! # Serve with ./parley.toml and PARLEY_* overrides
//! parley-server
//!
//! # Mint a credential for local testing
//! parley-server mint-token --user-id u1 --company-id c1 --first-name Ann
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use backend_lib::{
    auth::{TokenClaims, TokenCodec},
    config::Settings,
    storage::FlatFileStorage,
    ws_router, AppState,
};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Realtime one-on-one chat server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./parley.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default)
    Serve,
    /// Print a signed credential for the configured secret
    MintToken {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        company_id: String,
        #[arg(long, default_value = "User")]
        position: String,
        #[arg(long)]
        first_name: Option<String>,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::MintToken {
            user_id,
            company_id,
            position,
            first_name,
            ttl,
        } => {
            let codec = TokenCodec::new(&settings.jwt_secret, settings.token_leeway_secs);
            let now = chrono::Utc::now().timestamp();
            let token = codec.sign(&TokenClaims {
                user_id,
                position,
                company_id,
                first_name,
                exp: now + ttl,
                iat: Some(now),
            })?;
            println!("{token}");
            Ok(())
        },
    }
}

fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    if settings.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    init_tracing(&settings);

    let storage = FlatFileStorage::new(&settings.data_dir)
        .with_context(|| format!("opening data dir {}", settings.data_dir.display()))?;
    let bind_addr = settings.bind_addr;
    let state = Arc::new(AppState::new(storage, settings));

    // Expire handshake lockouts in the background
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    });

    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "parley listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("parley stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
