//! Relay orchestrator: the duplex pump between one browser WebSocket and
//! one upstream session.
//!
//! Three cooperating tasks share a cancellation scope: an upstream reader
//! polling the registry, a client writer draining the bounded output channel
//! through the option-negotiation filter, and an upstream writer draining
//! the bounded command channel. All outbound WebSocket writes — data,
//! status, errors, keepalive pings — go through one locked write path with a
//! write deadline, because the ping ticker and the relay writer would
//! otherwise interleave mid-frame.

pub mod frames;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::relay::frames::{ClientFrame, ServerFrame};
use crate::session::{DisconnectReason, SessionRegistry, SessionState};
use crate::state::AppState;
use crate::telnet::strip_iac;

/// Upstream→client channel capacity.
const OUTPUT_CHANNEL_CAPACITY: usize = 100;
/// Client→upstream channel capacity.
const COMMAND_CHANNEL_CAPACITY: usize = 64;
/// Deadline for any single write to the browser channel.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Keepalive ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(30);
/// Read buffer for one upstream poll.
const READ_BUFFER_SIZE: usize = 8192;

/// Serialized write half of the browser channel.
///
/// The single mutual-exclusion write path mandated for the channel: the
/// pump writer and the keepalive ticker both go through here.
struct ClientWriter {
    sink: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
}

/// Why a browser-channel write did not complete.
enum WriteError {
    /// The write deadline expired: the client cannot keep up.
    Timeout,
    /// The channel is gone.
    Closed,
}

impl ClientWriter {
    fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: tokio::sync::Mutex::new(sink),
        }
    }

    async fn send_frame(&self, frame: &ServerFrame) -> Result<(), WriteError> {
        let text = serde_json::to_string(frame).map_err(|_| WriteError::Closed)?;
        self.send(Message::Text(text.into())).await
    }

    async fn send_ping(&self) -> Result<(), WriteError> {
        self.send(Message::Ping(Vec::new().into())).await
    }

    async fn send(&self, message: Message) -> Result<(), WriteError> {
        let mut sink = self.sink.lock().await;
        match timeout(WRITE_DEADLINE, sink.send(message)).await {
            Err(_) => Err(WriteError::Timeout),
            Ok(Err(_)) => Err(WriteError::Closed),
            Ok(Ok(())) => Ok(()),
        }
    }
}

/// Handles to the three pump tasks for one connected session.
struct Pump {
    scope: CancellationToken,
    commands: mpsc::Sender<String>,
}

/// Drive one browser channel for its whole lifetime.
pub async fn serve(socket: WebSocket, owner: String, state: AppState) {
    info!(%owner, "Browser channel opened");

    let (sink, stream) = socket.split();
    let writer = Arc::new(ClientWriter::new(sink));
    let scope = CancellationToken::new();

    let attached = run(&owner, &state, &writer, &scope, stream).await;

    // Converge every exit path on one teardown: cancel the scope, close the
    // upstream if this channel was driving it, release the token bucket.
    scope.cancel();
    if attached && state.registry.status(&owner).state == SessionState::Connected {
        let _ = state
            .registry
            .disconnect(&owner, DisconnectReason::RemoteClose)
            .await;
    }
    state.limiters.release(&owner);
    info!(%owner, "Browser channel closed");
}

/// Returns whether this channel was still driving an upstream session when
/// the loop ended, so teardown knows whether the session is its to close.
async fn run(
    owner: &str,
    state: &AppState,
    writer: &Arc<ClientWriter>,
    scope: &CancellationToken,
    mut stream: SplitStream<WebSocket>,
) -> bool {
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + PING_INTERVAL,
        PING_INTERVAL,
    );
    // Upstream reader / writer tasks report a dead upstream here.
    let (status_tx, mut status_rx) = mpsc::channel::<()>(2);
    let mut pump: Option<Pump> = None;

    loop {
        tokio::select! {
            () = scope.cancelled() => return pump.is_some(),

            _ = ping.tick() => {
                if writer.send_ping().await.is_err() {
                    debug!(owner, "Keepalive ping failed, closing channel");
                    return pump.is_some();
                }
            }

            Some(()) = status_rx.recv() => {
                // The upstream died under us. A stale signal from a pump we
                // already tore down carries no frame.
                let Some(p) = pump.take() else { continue };
                p.scope.cancel();
                let _ = state
                    .registry
                    .disconnect(owner, DisconnectReason::RemoteClose)
                    .await;
                if writer.send_frame(&ServerFrame::disconnected()).await.is_err() {
                    return false;
                }
            }

            msg = stream.next() => {
                let Some(Ok(msg)) = msg else {
                    debug!(owner, "Browser channel read ended");
                    return pump.is_some();
                };
                match msg {
                    Message::Text(text) => {
                        handle_frame(owner, state, writer, scope, &status_tx, &mut pump, text.as_str())
                            .await;
                    }
                    Message::Close(_) => return pump.is_some(),
                    // Pings are answered by the WebSocket layer; pongs just
                    // prove liveness.
                    _ => {}
                }
            }
        }
    }
}

async fn handle_frame(
    owner: &str,
    state: &AppState,
    writer: &Arc<ClientWriter>,
    scope: &CancellationToken,
    status_tx: &mpsc::Sender<()>,
    pump: &mut Option<Pump>,
    text: &str,
) {
    state.metrics.inc_frames_in();

    // Size limit applies to the raw frame, before any parsing.
    if text.len() > state.max_frame_bytes {
        let _ = writer.send_frame(&ServerFrame::error("Message too large")).await;
        return;
    }

    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(owner, %err, "Unparseable browser frame");
            let _ = writer
                .send_frame(&ServerFrame::error("Invalid message format"))
                .await;
            return;
        }
    };

    match frame {
        ClientFrame::Connect { host, port } => {
            handle_connect(owner, state, writer, scope, status_tx, pump, host, port).await;
        }

        ClientFrame::Disconnect => {
            if let Some(p) = pump.take() {
                p.scope.cancel();
            }
            match state.registry.disconnect(owner, DisconnectReason::User).await {
                Ok(_) => {
                    let _ = writer.send_frame(&ServerFrame::disconnected()).await;
                }
                Err(_) => {
                    let _ = writer
                        .send_frame(&ServerFrame::error("Not connected"))
                        .await;
                }
            }
        }

        ClientFrame::Data { data } => {
            let Some(p) = pump.as_ref() else {
                let _ = writer
                    .send_frame(&ServerFrame::error("Not connected"))
                    .await;
                return;
            };

            if !state.limiters.allow(owner) {
                state.metrics.inc_rate_limit();
                let _ = writer
                    .send_frame(&ServerFrame::error("Rate limit exceeded"))
                    .await;
                return;
            }

            match p.commands.try_send(data) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let _ = writer
                        .send_frame(&ServerFrame::error("Command queue full"))
                        .await;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    let _ = writer
                        .send_frame(&ServerFrame::error("Not connected"))
                        .await;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_connect(
    owner: &str,
    state: &AppState,
    writer: &Arc<ClientWriter>,
    scope: &CancellationToken,
    status_tx: &mpsc::Sender<()>,
    pump: &mut Option<Pump>,
    host: Option<String>,
    port: Option<u32>,
) {
    if pump.is_some() {
        let _ = writer
            .send_frame(&ServerFrame::error("User already has an active session"))
            .await;
        return;
    }

    // A session may already exist, created through the control plane just
    // before the channel was opened; attach to it instead of dialing.
    let attached = state.registry.status(owner).state == SessionState::Connected;

    if !attached {
        let Some(host) = host.filter(|h| !h.is_empty()) else {
            let _ = writer.send_frame(&ServerFrame::error("Host is required")).await;
            return;
        };
        let port = port.unwrap_or(23);

        if let Err(err) = state.registry.connect(owner, &host, port).await {
            warn!(owner, %err, "Connect over browser channel failed");
            let _ = writer.send_frame(&ServerFrame::error(err.to_string())).await;
            return;
        }
    }

    // Connected status always precedes the first data frame.
    if writer.send_frame(&ServerFrame::connected()).await.is_err() {
        return;
    }
    *pump = Some(start_pump(owner, state, writer, scope, status_tx));
}

/// Spawn the per-session tasks: upstream reader, client writer, upstream
/// writer. All three live under a child of the channel scope so either side
/// can cancel the set.
fn start_pump(
    owner: &str,
    state: &AppState,
    writer: &Arc<ClientWriter>,
    scope: &CancellationToken,
    status_tx: &mpsc::Sender<()>,
) -> Pump {
    let token = scope.child_token();
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(OUTPUT_CHANNEL_CAPACITY);
    let (cmd_tx, cmd_rx) = mpsc::channel::<String>(COMMAND_CHANNEL_CAPACITY);

    tokio::spawn(read_upstream(
        Arc::clone(&state.registry),
        owner.to_string(),
        out_tx,
        status_tx.clone(),
        token.clone(),
    ));
    tokio::spawn(write_client(
        Arc::clone(writer),
        state.clone(),
        owner.to_string(),
        out_rx,
        token.clone(),
        scope.clone(),
    ));
    tokio::spawn(write_upstream(
        Arc::clone(&state.registry),
        owner.to_string(),
        cmd_rx,
        status_tx.clone(),
        token.clone(),
    ));

    Pump {
        scope: token,
        commands: cmd_tx,
    }
}

/// Poll the registry for upstream bytes and push them to the bounded output
/// channel in arrival order.
async fn read_upstream(
    registry: Arc<SessionRegistry>,
    owner: String,
    out_tx: mpsc::Sender<Vec<u8>>,
    status_tx: mpsc::Sender<()>,
    token: CancellationToken,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        if token.is_cancelled() {
            return;
        }
        match registry.read(&owner, &mut buf).await {
            // Deadline expiry; the bounded poll itself paces the loop.
            Ok(0) => continue,
            Ok(n) => {
                let chunk = buf[..n].to_vec();
                tokio::select! {
                    () = token.cancelled() => return,
                    sent = out_tx.send(chunk) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                debug!(%owner, %err, "Upstream read ended");
                let _ = status_tx.send(()).await;
                return;
            }
        }
    }
}

/// Drain the output channel through the option-negotiation filter onto the
/// browser channel. A write-deadline expiry here is the slow-client signal.
async fn write_client(
    writer: Arc<ClientWriter>,
    state: AppState,
    owner: String,
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    token: CancellationToken,
    channel_scope: CancellationToken,
) {
    loop {
        let chunk = tokio::select! {
            () = token.cancelled() => return,
            chunk = out_rx.recv() => chunk,
        };
        let Some(chunk) = chunk else { return };

        let clean = strip_iac(&chunk);
        if clean.is_empty() {
            continue;
        }
        let text = String::from_utf8_lossy(&clean).into_owned();

        match writer.send_frame(&ServerFrame::data(text)).await {
            Ok(()) => state.metrics.inc_frames_out(),
            Err(WriteError::Timeout) => {
                warn!(%owner, "Client too slow, dropping session");
                state.metrics.inc_slow_client();
                let _ = state
                    .registry
                    .disconnect(&owner, DisconnectReason::SlowClient)
                    .await;
                channel_scope.cancel();
                return;
            }
            Err(WriteError::Closed) => {
                channel_scope.cancel();
                return;
            }
        }
    }
}

/// Drain client commands onto the upstream socket in submission order.
async fn write_upstream(
    registry: Arc<SessionRegistry>,
    owner: String,
    mut cmd_rx: mpsc::Receiver<String>,
    status_tx: mpsc::Sender<()>,
    token: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            () = token.cancelled() => return,
            command = cmd_rx.recv() => command,
        };
        let Some(command) = command else { return };

        if let Err(err) = registry.write(&owner, &command).await {
            debug!(%owner, %err, "Upstream write ended");
            let _ = status_tx.send(()).await;
            return;
        }
    }
}
