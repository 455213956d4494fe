use clap::Parser;
use greensort_core::GreensortConfig;
use greensort_server::{build_adapter, serve, AppState, ConfigManager};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "greensort-server")]
#[command(about = "GreenSort realtime waste classification server", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (JSON or TOML)
    #[arg(long, short)]
    config: Option<String>,

    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long, short)]
    port: Option<u16>,

    /// Detector endpoint (http/https); without one every frame reports nothing
    #[arg(long)]
    inference_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<GreensortConfig> {
    let mut config = match &args.config {
        Some(path) => GreensortConfig::from_file(path)?,
        None => GreensortConfig::default(),
    };
    config.apply_env();

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = &args.inference_url {
        config.inference.endpoint = Some(url.clone());
    }
    if let Some(level) = &args.log_level {
        config.server.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("Starting GreenSort realtime server v{}", env!("CARGO_PKG_VERSION"));

    let adapter = build_adapter(&config.inference)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, adapter);

    if let Some(path) = args.config.clone() {
        tokio::spawn(reload_on_hangup(state.config.clone(), path));
    }

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);
    info!("Realtime endpoint: ws://{}/ws/realtime-detect", addr);

    serve(listener, state, wait_for_shutdown()).await?;
    info!("Server stopped");
    Ok(())
}

/// SIGHUP re-reads the config file; sessions opened afterwards use it
#[cfg(unix)]
async fn reload_on_hangup(manager: Arc<ConfigManager>, path: String) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            error!("Failed to install SIGHUP handler: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        if let Err(e) = manager.reload_from_file(&path).await {
            warn!("Config reload from {} failed: {}", path, e);
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_manager: Arc<ConfigManager>, _path: String) {}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
