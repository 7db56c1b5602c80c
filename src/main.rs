//! CORS forwarding gateway.
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                       GATEWAY                        │
//!   Browser        │  ┌───────────┐   ┌──────────┐   ┌────────────────┐  │
//!   ───────────────┼─▶│ request id│──▶│rate limit│──▶│  auth (/proxy) │  │
//!                  │  │  + trace  │   └──────────┘   └───────┬────────┘  │
//!                  │  └───────────┘                          ▼           │
//!                  │                               ┌────────────────────┐│
//!                  │                               │ forwarding engine  ││
//!                  │                               │ validate → admit → ││
//!                  │                               │ dispatch → relay   │┼──▶ Target API
//!   ◀──────────────┼───────── CORS headers ◀───────┴────────────────────┘│
//!                  │                                                      │
//!                  │  admin API · usage stats · block-list · maintenance  │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use cors_proxy::config::watcher::ConfigWatcher;
use cors_proxy::config::{load_config, load_from_env};
use cors_proxy::lifecycle::{wait_for_signal, Shutdown};
use cors_proxy::observability::{logging, metrics};
use cors_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "cors-proxy")]
#[command(about = "CORS forwarding gateway", long_about = None)]
struct Args {
    /// TOML configuration file. Without it, defaults plus environment variables are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address, e.g. 127.0.0.1:4000.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => load_config(path),
        None => load_from_env(),
    };
    let file_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let mut config = file_config.clone();
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cors-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_ms = config.proxy.request_timeout_ms,
        max_body_size = config.proxy.max_body_size,
        blocked_domains = config.proxy.blocked_domains.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        proxy_auth = config.auth.proxy_api_key.is_some(),
        admin_enabled = config.auth.admin_api_key.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher handle alive for the lifetime of the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, file_config);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload unavailable");
                    (updates, None)
                }
            }
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config)?;

    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
