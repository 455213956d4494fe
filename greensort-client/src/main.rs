use clap::Parser;
use greensort_api::ServerMessage;
use greensort_client::{
    ChannelEvent, DirectoryFrameSource, FrameChannel, FrameTicker, GuidanceView,
};
use greensort_core::{GreensortConfig, Locale};
use greensort_eye::PresentationChange;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "greensort-client")]
#[command(about = "Stream frames to a GreenSort realtime server", long_about = None)]
#[command(version)]
struct Args {
    /// Directory of .jpg/.png frames to replay
    frames: String,

    /// Realtime endpoint
    #[arg(long)]
    url: Option<String>,

    /// Configuration file (JSON or TOML)
    #[arg(long, short)]
    config: Option<String>,

    /// Capture interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Guidance language (en, vi)
    #[arg(long, default_value = "en")]
    locale: String,

    /// Replay the directory once instead of looping
    #[arg(long)]
    once: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> anyhow::Result<GreensortConfig> {
    let mut config = match &args.config {
        Some(path) => GreensortConfig::from_file(path)?,
        None => GreensortConfig::default(),
    };
    if let Some(url) = &args.url {
        config.transport.url = url.clone();
    }
    if let Some(ms) = args.interval_ms {
        config.transport.frame_interval_ms = ms;
    }
    config.presentation.locale = match args.locale.to_ascii_lowercase().as_str() {
        "vi" => Locale::Vi,
        _ => Locale::En,
    };
    config.validate()?;
    Ok(config)
}

fn render(change: PresentationChange) {
    match change {
        PresentationChange::Show { guidance, hazard_modal } => {
            info!(
                "{} -> {} bin: {}",
                guidance.class_name, guidance.bin_name, guidance.instruction
            );
            if hazard_modal {
                warn!("Hazardous item: {}", guidance.instruction);
            }
        }
        PresentationChange::Hide { class } => info!("Guidance for {} hidden", class),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let config = load_config(&args)?;
    let mut source = DirectoryFrameSource::open(&args.frames, !args.once).await?;

    let (channel, mut events) = FrameChannel::new(config.transport.clone());
    channel.start().await;
    info!("Streaming to {}", config.transport.url);

    let ticker = FrameTicker::from_config(&config.transport);
    let ticker_channel = channel.clone();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let capture = tokio::spawn(async move {
        let stats = ticker
            .run(&mut source, &ticker_channel, async {
                let _ = done_rx.await;
            })
            .await;
        info!(
            "Capture finished: {} ticks, {} offered, {} dropped",
            stats.ticks, stats.offered, stats.dropped
        );
    });

    let mut view = GuidanceView::new(config.presentation.clone());
    let mut timer = tokio::time::interval(Duration::from_millis(25));

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    tokio::pin!(capture);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                break;
            }
            _ = &mut capture => break,
            _ = timer.tick() => {
                if let Some(change) = view.tick() {
                    render(change);
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(change) = view.on_channel_event(&event) {
                    render(change);
                }
                match event {
                    ChannelEvent::Message { generation, message } if generation == view.generation() => {
                        match message {
                            ServerMessage::Error { code, message, .. } => {
                                warn!("Frame rejected ({}): {}", code, message)
                            }
                            ServerMessage::Session { session_id } => info!("Session {}", session_id),
                            ServerMessage::Result(_) | ServerMessage::Pong { .. } => {}
                        }
                    }
                    ChannelEvent::Closed { kind, code, .. } => {
                        info!("Connection closed ({:?}, code {:?})", kind, code)
                    }
                    ChannelEvent::Reconnecting { attempt, delay } => {
                        info!("Reconnecting in {:?} (attempt {})", delay, attempt)
                    }
                    ChannelEvent::Unreachable { attempts } => {
                        error!("Server unreachable after {} attempts; still retrying", attempts)
                    }
                    ChannelEvent::Opened { .. } | ChannelEvent::Message { .. } => {}
                }
            }
        }
    }

    let _ = done_tx.send(());
    channel.stop().await;
    let stats = channel.stats();
    info!(
        "Sent {} frames, {} dropped while closed, {} superseded, {} reconnects",
        stats.sent, stats.dropped_not_open, stats.dropped_superseded, stats.reconnects
    );
    Ok(())
}
