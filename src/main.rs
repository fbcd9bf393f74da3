//! wayback-proxy
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ http::server ──┬─▶ dispatcher ──▶ cache ──▶ snapshot files
//!                                                 │        │                     + time index
//!                                                 │        └──────▶ client ──▶ origin
//!                                                 └─▶ tunnel ──────────────────▶ CONNECT target
//!
//!     admin API ──▶ cache                 signals ──▶ Shutdown ──▶ accept loops
//! ```
//!
//! One current-thread tokio runtime drives everything; its handle is passed
//! down as the executor for connection tasks, tunnels and cache writes.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio::runtime::Handle;

use wayback_proxy::cache;
use wayback_proxy::config::{load_config, validate_config, CacheKind, ConfigError, ProxyConfig};
use wayback_proxy::lifecycle::{signals, Shutdown};
use wayback_proxy::net::Listener;
use wayback_proxy::observability::{logging, metrics};
use wayback_proxy::{admin, ProxyServer};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CacheArg {
    Simple,
    File,
    Wayback,
}

impl From<CacheArg> for CacheKind {
    fn from(arg: CacheArg) -> Self {
        match arg {
            CacheArg::Simple => CacheKind::Simple,
            CacheArg::File => CacheKind::File,
            CacheArg::Wayback => CacheKind::Wayback,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "wayback-proxy", version, about = "Caching forward HTTP proxy")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, keeping the configured bind host.
    #[arg(short, long)]
    port: Option<u16>,

    /// Log at debug level.
    #[arg(short, long)]
    debug: bool,

    /// Cache backend.
    #[arg(long, value_enum)]
    cache: Option<CacheArg>,

    /// Folder for file and wayback caches.
    #[arg(long)]
    cache_folder: Option<String>,
}

fn build_config(args: &Args) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(port) = args.port {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{host}:{port}");
    }
    if args.debug {
        config.observability.log_level = "debug".to_string();
    }
    if let Some(kind) = args.cache {
        config.cache.kind = kind.into();
    }
    if let Some(folder) = &args.cache_folder {
        config.cache.root = folder.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

async fn run(config: ProxyConfig, executor: Handle) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let cache = cache::build(&config.cache).await?;
    let shutdown = Shutdown::new();

    let mut admin_task = None;
    if config.admin.enabled {
        match &cache {
            Some(cache) => {
                let listener = tokio::net::TcpListener::bind(&config.admin.bind_address).await?;
                admin_task = Some(executor.spawn(admin::serve(
                    listener,
                    std::sync::Arc::clone(cache),
                    shutdown.subscribe(),
                )));
            }
            None => tracing::warn!("Admin API enabled without a cache; not starting it"),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(&config, cache, executor.clone());
    executor.spawn(signals::trigger_on_signal(shutdown.clone()));

    server.run(listener, shutdown.subscribe()).await?;

    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
            Ok(Ok(())) => {}
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wayback-proxy: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        cache = ?config.cache.kind,
        "wayback-proxy starting"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("wayback-proxy: failed to build runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let executor = runtime.handle().clone();

    match runtime.block_on(run(config, executor)) {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "wayback-proxy failed");
            ExitCode::FAILURE
        }
    }
}
