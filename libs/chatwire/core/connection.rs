//! Socket lifecycle ownership
//!
//! A [`ConnectionManager`] owns one logical connection to the realtime
//! endpoint: the connect/reconnect loop, the connection state machine, and
//! outbound frame handoff. It performs no queuing of its own; `send`
//! reports whether a frame left the local outbound path and nothing more.

use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
use crate::core::heartbeat;
use crate::core::registry::{ListenerRegistry, Subscription};
use crate::core::router::EventRouter;
use crate::error::{ChatWireError, Result};
use crate::traits::reconnect::ReconnectionStrategy;
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Subscription to connection state changes
pub type StateSubscription = Subscription<(), ConnectionState>;

type StateListeners = ListenerRegistry<(), ConnectionState>;

/// Control messages for the socket task
#[derive(Debug)]
enum SocketCommand {
    /// Send a text frame on the open socket
    Frame(String),
    /// Close the socket and end the session
    Disconnect,
}

/// How an active socket ended
enum CloseReason {
    /// Close handshake with a normal status, or local disconnect
    Normal,
    /// Anything else: transport error, abnormal close code, stream ended
    Abnormal(String),
}

struct SessionHandle {
    active: Arc<AtomicBool>,
    command_tx: Sender<SocketCommand>,
    task: tokio::task::JoinHandle<()>,
}

/// Everything the connection task needs, bundled for the spawn
struct SessionContext {
    url: String,
    active: Arc<AtomicBool>,
    strategy: Arc<dyn ReconnectionStrategy>,
    heartbeat: Option<(Duration, String)>,
    router: Arc<EventRouter>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    listeners: Arc<StateListeners>,
    command_rx: Receiver<SocketCommand>,
}

/// Owns the socket lifecycle and the connection state machine
///
/// Construct one per logical connection; instances are caller-owned and
/// independent. Initial state is `Disconnected`.
pub struct ConnectionManager {
    endpoint: String,
    strategy: Arc<dyn ReconnectionStrategy>,
    heartbeat: Option<(Duration, String)>,
    router: Arc<EventRouter>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    state_listeners: Arc<StateListeners>,
    /// Read by `send` without touching the session lock, so state listeners
    /// may send frames re-entrantly.
    command_tx: RwLock<Option<Sender<SocketCommand>>>,
    session: Mutex<Option<SessionHandle>>,
}

impl ConnectionManager {
    /// Create a manager for `endpoint` (scheme + host, no path)
    pub fn new(
        endpoint: impl Into<String>,
        strategy: Arc<dyn ReconnectionStrategy>,
        heartbeat: Option<(Duration, String)>,
        router: Arc<EventRouter>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            strategy,
            heartbeat,
            router,
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
            metrics: Arc::new(AtomicMetrics::new()),
            state_listeners: Arc::new(ListenerRegistry::new()),
            command_tx: RwLock::new(None),
            session: Mutex::new(None),
        }
    }

    /// Open a session for the given identity
    ///
    /// Legal from `Disconnected` and from terminal `Error`; any other state
    /// is an `InvalidState` error. Must be called within a tokio runtime.
    pub fn connect(&self, user_id: &str, token: &str) -> Result<()> {
        let mut session = self.session.lock();

        if session
            .as_ref()
            .is_some_and(|s| s.active.load(Ordering::Acquire))
        {
            return Err(ChatWireError::InvalidState(
                "connect() while a session is active".to_string(),
            ));
        }
        let current = self.state.get();
        if !matches!(
            current,
            ConnectionState::Disconnected | ConnectionState::Error
        ) {
            return Err(ChatWireError::InvalidState(format!(
                "connect() from {current:?}"
            )));
        }

        // Previous session task (if any) has already exited.
        session.take();

        transition(&self.state, &self.state_listeners, ConnectionState::Connecting);

        let active = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = unbounded();
        let url = format!("{}/ws?userId={}&token={}", self.endpoint, user_id, token);

        let ctx = SessionContext {
            url,
            active: Arc::clone(&active),
            strategy: Arc::clone(&self.strategy),
            heartbeat: self.heartbeat.clone(),
            router: Arc::clone(&self.router),
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
            listeners: Arc::clone(&self.state_listeners),
            command_rx,
        };
        let task = tokio::spawn(run_connection(ctx));

        *self.command_tx.write() = Some(command_tx.clone());
        *session = Some(SessionHandle {
            active,
            command_tx,
            task,
        });
        Ok(())
    }

    /// Tear down the session from any state
    ///
    /// Cancels a pending reconnect timer if one is armed. Never retried,
    /// never an error; calling while already disconnected is a no-op.
    pub fn disconnect(&self) {
        let taken = { self.session.lock().take() };
        *self.command_tx.write() = None;

        if let Some(handle) = taken {
            handle.active.store(false, Ordering::Release);
            // Wake the socket loop so the close is prompt.
            let _ = handle.command_tx.send(SocketCommand::Disconnect);
        }

        transition(
            &self.state,
            &self.state_listeners,
            ConnectionState::Disconnected,
        );
    }

    /// Hand a text frame to the open transport
    ///
    /// Returns true iff the frame left the local outbound path. True is not
    /// proof of server receipt. Returns false without queuing when there is
    /// no open transport; persistence is the send pipeline's job.
    pub fn send(&self, frame: String) -> bool {
        if !self.state.is_connected() {
            return false;
        }
        match self.command_tx.read().as_ref() {
            Some(tx) => tx.send(SocketCommand::Frame(frame)).is_ok(),
            None => false,
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Register a state-change listener
    ///
    /// Listeners run synchronously at the transition site, in registration
    /// order, with the new state. Do not call `connect` or `disconnect`
    /// from inside a listener; defer that to a task.
    pub fn on_state_change(
        &self,
        listener: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> StateSubscription {
        self.state_listeners
            .subscribe((), move |state| listener(*state))
    }

    /// Current counters plus state
    pub fn metrics(&self) -> Metrics {
        Metrics {
            frames_sent: self.metrics.frames_sent(),
            frames_received: self.metrics.frames_received(),
            reconnect_count: self.metrics.reconnect_count(),
            connection_state: self.state.get(),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.session.lock().take() {
            handle.active.store(false, Ordering::Release);
            let _ = handle.command_tx.send(SocketCommand::Disconnect);
            handle.task.abort();
        }
    }
}

/// Apply one state transition and notify listeners
///
/// Illegal edges are refused and logged; concurrent writers race through the
/// compare-exchange, so a transition that lost the race is dropped rather
/// than applied out of order. Returns whether the transition was applied.
fn transition(
    state: &AtomicConnectionState,
    listeners: &StateListeners,
    to: ConnectionState,
) -> bool {
    let from = state.get();
    if from == to {
        return false;
    }
    if !ConnectionState::is_valid_transition(from, to) {
        warn!("refusing illegal transition {from:?} -> {to:?}");
        return false;
    }
    if !state.compare_exchange(from, to) {
        debug!("transition {from:?} -> {to:?} lost the race, dropping");
        return false;
    }
    listeners.dispatch(&(), &to);
    true
}

/// Connect/reconnect loop for one session
async fn run_connection(ctx: SessionContext) {
    let mut attempt: usize = 0;

    loop {
        if !ctx.active.load(Ordering::Acquire) {
            break;
        }

        // State here is Connecting: set by connect() for the first pass,
        // by the timer arm below for every subsequent one.
        match connect_async(&ctx.url).await {
            Ok((ws_stream, _)) => {
                if !ctx.active.load(Ordering::Acquire) {
                    break;
                }
                info!("connected to {}", ctx.url);
                attempt = 0;
                transition(&ctx.state, &ctx.listeners, ConnectionState::Connected);

                let reason = drive_socket(ws_stream, &ctx).await;

                if !ctx.active.load(Ordering::Acquire) {
                    break;
                }
                match reason {
                    CloseReason::Normal => {
                        info!("connection closed normally");
                        transition(&ctx.state, &ctx.listeners, ConnectionState::Disconnected);
                        break;
                    }
                    CloseReason::Abnormal(why) => {
                        warn!("connection lost: {why}");
                        transition(&ctx.state, &ctx.listeners, ConnectionState::Reconnecting);
                    }
                }
            }
            Err(e) => {
                error!("failed to open transport: {e}");
                if !ctx.active.load(Ordering::Acquire) {
                    break;
                }
                transition(&ctx.state, &ctx.listeners, ConnectionState::Error);
                if ctx.strategy.should_reconnect(attempt) {
                    transition(&ctx.state, &ctx.listeners, ConnectionState::Reconnecting);
                }
            }
        }

        let Some(delay) = ctx.strategy.next_delay(attempt) else {
            warn!("reconnect attempts exhausted after {attempt}");
            transition(&ctx.state, &ctx.listeners, ConnectionState::Error);
            break;
        };

        info!("reconnecting in {:?} (attempt {})", delay, attempt + 1);
        attempt += 1;
        ctx.metrics.increment_reconnects();

        if !sleep_while_active(delay, &ctx.active).await {
            debug!("reconnect timer cancelled");
            break;
        }

        transition(&ctx.state, &ctx.listeners, ConnectionState::Connecting);
    }

    // Session is over; allow a fresh connect().
    ctx.active.store(false, Ordering::Release);
    debug!("connection task exiting");
}

/// Sleep in short slices so disconnect() cancels the pending timer promptly
///
/// Returns false if the session went inactive during the wait.
async fn sleep_while_active(delay: Duration, active: &AtomicBool) -> bool {
    let check_interval = Duration::from_millis(100);
    let mut elapsed = Duration::ZERO;

    while elapsed < delay {
        if !active.load(Ordering::Acquire) {
            return false;
        }
        let slice = std::cmp::min(check_interval, delay - elapsed);
        tokio::time::sleep(slice).await;
        elapsed += slice;
    }
    active.load(Ordering::Acquire)
}

/// Run one open socket to completion
async fn drive_socket(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    ctx: &SessionContext,
) -> CloseReason {
    let (mut write, mut read) = ws_stream.split();

    let heartbeat = ctx
        .heartbeat
        .as_ref()
        .map(|(interval, payload)| heartbeat::spawn_heartbeat(*interval, payload.clone()));

    let reason = socket_loop(
        &mut write,
        &mut read,
        ctx,
        heartbeat.as_ref().map(|(_, _, rx)| rx),
    )
    .await;

    // Heartbeat task exits on signal; no need to abort.
    if let Some((_handle, shutdown_tx, _)) = heartbeat {
        let _ = shutdown_tx.send(());
    }

    reason
}

/// Select over inbound frames, outbound commands, and heartbeats
async fn socket_loop(
    write: &mut futures::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        Message,
    >,
    read: &mut futures::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
    ctx: &SessionContext,
    heartbeat_rx: Option<&Receiver<String>>,
) -> CloseReason {
    loop {
        if !ctx.active.load(Ordering::Acquire) {
            let _ = write.close().await;
            return CloseReason::Normal;
        }

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        ctx.metrics.increment_received();
                        ctx.router.route(&text);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("dropping binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let normal = frame
                            .as_ref()
                            .map(|f| f.code == CloseCode::Normal)
                            .unwrap_or(false);
                        return if normal {
                            CloseReason::Normal
                        } else {
                            CloseReason::Abnormal(format!("close frame {frame:?}"))
                        };
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by the protocol layer.
                    }
                    Some(Err(e)) => return CloseReason::Abnormal(e.to_string()),
                    None => return CloseReason::Abnormal("stream ended".to_string()),
                }
            }

            // Poll the command channel off the async thread (crossbeam recv
            // would otherwise block the select).
            cmd = async {
                let rx = ctx.command_rx.clone();
                tokio::task::spawn_blocking(move || {
                    rx.recv_timeout(Duration::from_millis(100))
                }).await.ok()
            } => {
                match cmd {
                    Some(Ok(SocketCommand::Frame(text))) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            return CloseReason::Abnormal(format!("send failed: {e}"));
                        }
                        ctx.metrics.increment_sent();
                    }
                    Some(Ok(SocketCommand::Disconnect)) => {
                        let _ = write.close().await;
                        return CloseReason::Normal;
                    }
                    Some(Err(_)) => {
                        // Poll timeout, keep looping.
                    }
                    None => return CloseReason::Normal,
                }
            }

            beat = async {
                match heartbeat_rx {
                    Some(rx) => {
                        let rx = rx.clone();
                        tokio::task::spawn_blocking(move || {
                            rx.recv_timeout(Duration::from_millis(100))
                        }).await.ok().and_then(|r| r.ok())
                    }
                    None => std::future::pending().await,
                }
            } => {
                if let Some(payload) = beat {
                    if let Err(e) = write.send(Message::Text(payload)).await {
                        return CloseReason::Abnormal(format!("heartbeat send failed: {e}"));
                    }
                    ctx.metrics.increment_sent();
                }
            }
        }
    }
}
