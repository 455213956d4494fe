//! Reconnecting frame channel
//!
//! One channel owns at most one live connection. Frames are send-and-forget:
//! while the connection is not open they are dropped, and while one is
//! waiting to be written a newer frame replaces it. Abnormal closes and
//! failed opens are retried with [`ReconnectBackoff`] for as long as the
//! channel is started; a close with code 1000 ends the session.

use crate::backoff::ReconnectBackoff;
use crate::error::ChannelError;
use crate::tasks::ScheduledTasks;
use futures_util::{SinkExt, StreamExt};
use greensort_api::{ClientMessage, CloseKind, ServerMessage};
use greensort_core::TransportConfig;
use parking_lot::{Mutex, RwLock};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

const STOP_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Never started, or stopped by the user
    Idle,
    Connecting,
    Open,
    /// Waiting out a backoff delay
    Reconnecting { attempt: u32 },
    /// The server closed cleanly; start again to reconnect
    Closed,
}

/// Notifications for the consumer
///
/// `generation` counts opened connections over the channel's lifetime. Each
/// one is a fresh server-side session, so consumers restart their own state
/// on `Opened` and ignore messages from older generations.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened { generation: u64 },
    Message { generation: u64, message: ServerMessage },
    Closed { generation: u64, kind: CloseKind, code: Option<u16> },
    Reconnecting { attempt: u32, delay: Duration },
    /// Sustained failure to connect; retries continue in the background
    Unreachable { attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub sent: u64,
    /// Frames offered while no connection was open
    pub dropped_not_open: u64,
    /// Frames replaced by a newer one before they were written
    pub dropped_superseded: u64,
    pub reconnects: u64,
}

/// Outbound queue for one session
///
/// Frames share a single slot so a newer frame replaces an unsent one.
/// Control messages queue ahead of frames and are never replaced.
#[derive(Default)]
struct Outbox {
    frame: Mutex<Option<String>>,
    control: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl Outbox {
    /// Returns true when an unsent frame was replaced
    fn put_frame(&self, frame: String) -> bool {
        let replaced = self.frame.lock().replace(frame).is_some();
        self.notify.notify_one();
        replaced
    }

    fn put_control(&self, message: String) {
        self.control.lock().push_back(message);
        self.notify.notify_one();
    }

    fn take(&self) -> Option<String> {
        if let Some(message) = self.control.lock().pop_front() {
            return Some(message);
        }
        self.frame.lock().take()
    }

    fn clear_frame(&self) {
        self.frame.lock().take();
    }

    async fn next(&self) -> String {
        loop {
            if let Some(message) = self.take() {
                return message;
            }
            self.notify.notified().await;
        }
    }
}

/// State shared with the connection task
struct Shared {
    status: RwLock<ChannelStatus>,
    generation: AtomicU64,
    sent: AtomicU64,
    dropped_not_open: AtomicU64,
    dropped_superseded: AtomicU64,
    reconnects: AtomicU64,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl Shared {
    fn set_status(&self, status: ChannelStatus) {
        *self.status.write() = status;
    }

    fn emit(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            debug!("Channel event dropped; no consumer");
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    stop_tx: Option<watch::Sender<bool>>,
    tasks: ScheduledTasks,
    /// The user wants a session, even if it is paused for background
    wanted: bool,
    foreground: bool,
}

struct Inner {
    config: TransportConfig,
    shared: Arc<Shared>,
    next_frame_id: AtomicU64,
    outbox: Mutex<Option<Arc<Outbox>>>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

/// Handle to a reconnecting realtime connection; clones share the channel
#[derive(Clone)]
pub struct FrameChannel {
    inner: Arc<Inner>,
}

impl FrameChannel {
    pub fn new(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            status: RwLock::new(ChannelStatus::Idle),
            generation: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            dropped_not_open: AtomicU64::new(0),
            dropped_superseded: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            events,
        });

        let channel = Self {
            inner: Arc::new(Inner {
                config,
                shared,
                next_frame_id: AtomicU64::new(0),
                outbox: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(Lifecycle {
                    foreground: true,
                    ..Default::default()
                }),
            }),
        };
        (channel, events_rx)
    }

    /// Open a fresh session, tearing down any current one first
    pub async fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        lifecycle.wanted = true;
        self.teardown(&mut lifecycle).await;
        if lifecycle.foreground {
            self.launch(&mut lifecycle);
        }
    }

    /// Close cleanly and cancel every pending timer
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        lifecycle.wanted = false;
        self.teardown(&mut lifecycle).await;
    }

    /// Losing foreground closes the session; regaining it opens a new one
    pub async fn set_foreground(&self, foreground: bool) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.foreground == foreground {
            return;
        }
        lifecycle.foreground = foreground;

        if !lifecycle.wanted {
            return;
        }
        if foreground {
            info!("Foreground regained; opening a new session");
            self.launch(&mut lifecycle);
        } else {
            info!("Foreground lost; closing session");
            self.teardown(&mut lifecycle).await;
        }
    }

    /// Offer a frame; never waits for the network
    ///
    /// Returns the frame id assigned to the frame. Frames offered while no
    /// connection is open are dropped and counted.
    pub fn send_frame(&self, image: String) -> Result<u64, ChannelError> {
        let shared = &self.inner.shared;
        let outbox = match (self.status(), self.inner.outbox.lock().clone()) {
            (ChannelStatus::Open, Some(outbox)) => outbox,
            _ => {
                shared.dropped_not_open.fetch_add(1, Ordering::Relaxed);
                return Err(ChannelError::NotOpen);
            }
        };

        let frame_id = self.inner.next_frame_id.fetch_add(1, Ordering::Relaxed) + 1;
        let text = ClientMessage::frame(frame_id, image).to_json()?;
        if outbox.put_frame(text) {
            shared.dropped_superseded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(frame_id)
    }

    /// Ask the server to restart this session's engine
    pub fn request_reset(&self) -> Result<(), ChannelError> {
        let text = ClientMessage::Reset.to_json()?;
        match (self.status(), self.inner.outbox.lock().clone()) {
            (ChannelStatus::Open, Some(outbox)) => {
                outbox.put_control(text);
                Ok(())
            }
            _ => Err(ChannelError::NotOpen),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        *self.inner.shared.status.read()
    }

    pub fn is_open(&self) -> bool {
        self.status() == ChannelStatus::Open
    }

    /// Generation of the most recently opened connection
    pub fn generation(&self) -> u64 {
        self.inner.shared.generation.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ChannelStats {
        let shared = &self.inner.shared;
        ChannelStats {
            sent: shared.sent.load(Ordering::Relaxed),
            dropped_not_open: shared.dropped_not_open.load(Ordering::Relaxed),
            dropped_superseded: shared.dropped_superseded.load(Ordering::Relaxed),
            reconnects: shared.reconnects.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    fn launch(&self, lifecycle: &mut Lifecycle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let outbox = Arc::new(Outbox::default());
        *self.inner.outbox.lock() = Some(outbox.clone());
        self.inner.next_frame_id.store(0, Ordering::Relaxed);

        let config = self.inner.config.clone();
        let shared = self.inner.shared.clone();
        lifecycle
            .tasks
            .spawn("connection", supervise(config, shared, outbox, stop_rx));
        lifecycle.stop_tx = Some(stop_tx);
    }

    async fn teardown(&self, lifecycle: &mut Lifecycle) {
        *self.inner.outbox.lock() = None;
        if let Some(stop_tx) = lifecycle.stop_tx.take() {
            let _ = stop_tx.send(true);
            lifecycle.tasks.shutdown(STOP_GRACE).await;
            info!("Channel session stopped");
        }
        lifecycle.tasks.cancel_all();
        self.inner.shared.set_status(ChannelStatus::Idle);
    }
}

/// How one connection ended
enum ConnectionEnd {
    Stopped,
    Closed(Option<u16>),
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect, serve and reconnect until stopped or closed cleanly
async fn supervise(
    config: TransportConfig,
    shared: Arc<Shared>,
    outbox: Arc<Outbox>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut backoff = ReconnectBackoff::from_millis(config.reconnect_base_ms, config.reconnect_max_ms);
    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);

    loop {
        shared.set_status(ChannelStatus::Connecting);
        let attempt = tokio::select! {
            _ = stop_rx.changed() => return,
            result = connect(&config.url, connect_timeout) => result,
        };

        match attempt {
            Ok(socket) => {
                backoff.reset();
                // frames captured before the open are stale
                outbox.clear_frame();
                let generation = shared.generation.fetch_add(1, Ordering::Relaxed) + 1;
                shared.set_status(ChannelStatus::Open);
                info!("Connected to {} (generation {})", config.url, generation);
                shared.emit(ChannelEvent::Opened { generation });

                match run_connection(socket, &shared, &outbox, &mut stop_rx, generation).await {
                    ConnectionEnd::Stopped => return,
                    ConnectionEnd::Closed(code) => {
                        let kind = CloseKind::from_code(code);
                        shared.emit(ChannelEvent::Closed { generation, kind, code });
                        if !kind.should_reconnect() {
                            info!("Server closed the session cleanly");
                            shared.set_status(ChannelStatus::Closed);
                            return;
                        }
                        warn!("Connection closed abnormally (code {:?})", code);
                    }
                }
            }
            Err(e) => warn!("Failed to connect to {}: {}", config.url, e),
        }

        let delay = backoff.next_delay();
        let attempts = backoff.attempts();
        shared.reconnects.fetch_add(1, Ordering::Relaxed);
        shared.set_status(ChannelStatus::Reconnecting { attempt: attempts });
        shared.emit(ChannelEvent::Reconnecting { attempt: attempts, delay });
        if attempts == config.error_after_attempts {
            error!("Realtime server unreachable after {} attempts", attempts);
            shared.emit(ChannelEvent::Unreachable { attempts });
        }
        debug!("Reconnecting in {:?} (attempt {})", delay, attempts);

        tokio::select! {
            _ = stop_rx.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn connect(url: &str, timeout: Duration) -> Result<Socket, ChannelError> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((socket, _))) => Ok(socket),
        Ok(Err(e)) => Err(ChannelError::WebSocket(e)),
        Err(_) => Err(ChannelError::ConnectTimeout(timeout)),
    }
}

async fn run_connection(
    socket: Socket,
    shared: &Shared,
    outbox: &Outbox,
    stop_rx: &mut watch::Receiver<bool>,
    generation: u64,
) -> ConnectionEnd {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                let close = CloseFrame {
                    code: CloseCode::Normal,
                    reason: Cow::Borrowed("client stopped"),
                };
                if let Err(e) = sink.send(Message::Close(Some(close))).await {
                    debug!("Close frame not delivered: {}", e);
                }
                return ConnectionEnd::Stopped;
            }
            text = outbox.next() => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("Send failed: {}", e);
                    return ConnectionEnd::Closed(None);
                }
                shared.sent.fetch_add(1, Ordering::Relaxed);
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                    Ok(message) => shared.emit(ChannelEvent::Message { generation, message }),
                    Err(e) => warn!("Unparseable server message: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    return ConnectionEnd::Closed(frame.map(|f| u16::from(f.code)));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection error: {}", e);
                    return ConnectionEnd::Closed(None);
                }
                None => return ConnectionEnd::Closed(None),
            },
        }
    }
}
