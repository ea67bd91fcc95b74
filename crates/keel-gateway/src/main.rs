use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use keel_gateway::{app, handlers};

#[derive(Parser)]
#[command(name = "keel-gateway", about = "Durable conversational agent runtime")]
struct Cli {
    /// Path to keel.toml (default: KEEL_CONFIG env, then ./keel.toml)
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_gateway=info,keel_agent=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = keel_core::config::KeelConfig::load(cli.config.as_deref())?;

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(app::AppState::new(config)?);
    state.registry.setup_all().await;
    handlers::spawn_event_handlers(Arc::clone(&state));
    handlers::spawn_heartbeat(Arc::clone(&state))?;

    let router = app::build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(%addr, channels = ?state.registry.channel_names(), "keel gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
