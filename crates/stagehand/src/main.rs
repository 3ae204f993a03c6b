//! Stagehand server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, listening on 127.0.0.1:54001
//! stagehand
//!
//! # JSON config file, overriding the bind address
//! stagehand --config stagehand.json --bind 0.0.0.0:54001
//! ```
//!
//! Logins are accepted with any numeric token; this binary is for local
//! play and testing.

use clap::Parser;
use stagehand::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Stage and session coordination server
#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(about = "Stage and session coordination server")]
#[command(version)]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<String>,

    /// Address to bind to, overriding the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let server = StagehandServerBuilder::new()
        .config(config)
        .build(DevAuthenticator)
        .await?;
    tracing::info!("listening on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}
