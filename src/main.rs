//! Multi-tenant site server.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────────┐
//!                        │                    SITE SERVER                      │
//!   Client Request       │  ┌─────────┐    ┌──────────┐    ┌──────────────┐   │
//!   ─────────────────────┼─▶│  http   │───▶│ routing  │───▶│   project    │   │
//!                        │  │ server  │    │  table   │    │   resolver   │   │
//!                        │  └────┬────┘    └──────────┘    └──────┬───────┘   │
//!                        │       │ dev assets / HMR               │           │
//!                        │       ▼                                ▼           │
//!                        │  ┌─────────┐                    ┌──────────────┐   │
//!                        │  │   dev   │◀── provisioning ───│   dispatch   │   │
//!                        │  │registry │                    │ ssr / ctrl / │   │
//!                        │  └────┬────┘                    │    static    │   │
//!   Client Response      │       │                         └──────┬───────┘   │
//!   ◀────────────────────┼───────┴────────────────────────────────┘           │
//!                        │                                                    │
//!                        │  config · lifecycle · observability                │
//!                        └────────────────────────────────────────────────────┘
//! ```
//!
//! This binary starts with an empty module registry: static pages, error
//! pages, mounts and dev assets work out of the box. Sites with SSR
//! renderers or controllers build their own binary around
//! [`HttpServer::new`] with a populated [`ModuleRegistry`].

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use microsite_server::config::{load_config, Mode};
use microsite_server::dispatch::ModuleRegistry;
use microsite_server::lifecycle::signals::spawn_signal_handler;
use microsite_server::observability::{logging, metrics};
use microsite_server::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "microsite-server")]
#[command(about = "Multi-tenant site server with a development multiplexer", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "microsite.toml")]
    config: PathBuf,

    /// Force production mode.
    #[arg(long, conflicts_with = "development")]
    production: bool,

    /// Force development mode.
    #[arg(long)]
    development: bool,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if cli.production {
        config.mode = Mode::Production;
    } else if cli.development {
        config.mode = Mode::Development;
    }
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        mode = ?config.mode,
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        "microsite-server starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, ModuleRegistry::new());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
