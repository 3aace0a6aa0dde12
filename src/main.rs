use anyhow::Result;
use clap::Parser;
use highlight_split::config::{Config, CONFIG_ENV};
use highlight_split::{router, AppState};
use std::path::PathBuf;
use std::sync::Arc;

/// Highlight fragment and reconcile server
#[derive(Parser)]
#[command(name = "highlight-split")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    let bind = config.bind.clone();

    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}
