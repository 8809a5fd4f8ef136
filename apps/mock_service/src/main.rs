use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod simulation;

#[derive(Parser, Debug)]
#[command(about = "Local stand-in for the headset control service")]
struct Args {
    #[arg(long, env = "MOCK_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let app = routes::build_router(routes::AppState::new());
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "mock service listening");
    axum::serve(listener, app).await?;
    Ok(())
}
