//! In-memory session registry.
//!
//! One lock guards the owner→session, owner→socket, and owner→cancel maps;
//! the three entries for an owner move together. The lock is never held
//! across I/O: socket halves live behind their own per-half async locks and
//! are cloned out before use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::GatewayMetrics;
use crate::policy::{self, PortPolicy};
use crate::session::types::{DisconnectReason, Session, SessionState};
use crate::session::SessionError;

/// Timing and policy knobs for the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub ports: PortPolicy,
    pub dial_timeout: Duration,
    pub idle_timeout: Duration,
    pub hard_cap: Duration,
    /// Cadence of the per-session deadline check.
    pub watchdog_tick: Duration,
    /// Read deadline for one poll of the upstream socket.
    pub read_poll: Duration,
}

impl RegistryConfig {
    pub fn from_config(cfg: &mudgate_core::Config) -> Self {
        Self {
            ports: PortPolicy::from_config(cfg),
            dial_timeout: cfg.dial_timeout,
            idle_timeout: cfg.idle_timeout,
            hard_cap: cfg.hard_cap,
            watchdog_tick: Duration::from_secs(60),
            read_poll: Duration::from_millis(75),
        }
    }
}

/// Both halves of an upstream socket, each behind its own lock so the
/// single reader and single writer never contend.
#[derive(Clone)]
struct SocketHandle {
    reader: Arc<tokio::sync::Mutex<OwnedReadHalf>>,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
}

impl SocketHandle {
    fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Arc::new(tokio::sync::Mutex::new(reader)),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
        }
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    sockets: HashMap<String, SocketHandle>,
    cancels: HashMap<String, CancellationToken>,
}

/// Registry of upstream sessions, at most one active per owner.
pub struct SessionRegistry {
    cfg: RegistryConfig,
    metrics: Arc<GatewayMetrics>,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new(cfg: RegistryConfig, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            cfg,
            metrics,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Establish an upstream session for `owner`.
    ///
    /// Policy runs before any socket is opened; the registry rejects a
    /// second connect while one is connecting or connected. On success the
    /// session is `connected` with its watchdog running.
    pub async fn connect(
        self: &Arc<Self>,
        owner: &str,
        host: &str,
        port: u32,
    ) -> Result<Session, SessionError> {
        let port = match policy::check_port(port, &self.cfg.ports) {
            Ok(p) => p,
            Err(err) => {
                self.metrics.inc_blocked_port();
                warn!(owner, port, "Connect rejected by port policy");
                return Err(err.into());
            }
        };

        if let Err(err) = policy::check_host(host).await {
            self.metrics.inc_blocked_host();
            warn!(owner, host, "Connect rejected by host policy");
            return Err(err.into());
        }

        self.reserve(owner, host, port)?;

        debug!(owner, host, port, "Dialing upstream");
        let stream = match timeout(self.cfg.dial_timeout, TcpStream::connect((host, port))).await {
            Err(_) => {
                let msg = format!("connection timed out after {:?}", self.cfg.dial_timeout);
                self.fail_dial(owner, &msg);
                return Err(SessionError::DialTimeout(self.cfg.dial_timeout));
            }
            Ok(Err(err)) => {
                self.fail_dial(owner, &err.to_string());
                return Err(SessionError::DialFailed(err.to_string()));
            }
            Ok(Ok(stream)) => stream,
        };

        let session = self.install(owner, stream)?;
        info!(owner, host, port, "Session connected");
        Ok(session)
    }

    /// Steps 2–3 of connect: under the lock, reject an occupied owner and
    /// record the `connecting` row.
    fn reserve(&self, owner: &str, host: &str, port: u16) -> Result<(), SessionError> {
        let mut inner = self.lock();

        if let Some(existing) = inner.sessions.get(owner) {
            if existing.state.is_active() {
                return Err(SessionError::AlreadyConnected);
            }
        }

        inner.sessions.insert(
            owner.to_string(),
            Session {
                owner: owner.to_string(),
                host: host.to_string(),
                port,
                state: SessionState::Connecting,
                connected_at: None,
                last_activity_at: None,
                disconnect_reason: None,
                last_error: None,
            },
        );
        Ok(())
    }

    /// Step 5 of connect: install the socket, flip to `connected`, start
    /// the watchdog.
    fn install(self: &Arc<Self>, owner: &str, stream: TcpStream) -> Result<Session, SessionError> {
        let cancel = CancellationToken::new();
        let snapshot = {
            let mut inner = self.lock();

            // A disconnect may have raced the dial; do not resurrect it.
            match inner.sessions.get_mut(owner) {
                Some(session) if session.state == SessionState::Connecting => {
                    let now = SystemTime::now();
                    session.state = SessionState::Connected;
                    session.connected_at = Some(now);
                    session.last_activity_at = Some(now);
                    let snapshot = session.clone();

                    inner
                        .sockets
                        .insert(owner.to_string(), SocketHandle::from_stream(stream));
                    inner.cancels.insert(owner.to_string(), cancel.clone());
                    snapshot
                }
                _ => return Err(SessionError::NotConnected),
            }
        };

        self.metrics.inc_connect();
        self.spawn_watchdog(owner.to_string(), cancel);
        Ok(snapshot)
    }

    fn fail_dial(&self, owner: &str, message: &str) {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions.get_mut(owner) {
            session.state = SessionState::Error;
            session.disconnect_reason = Some(DisconnectReason::Error);
            session.last_error = Some(message.to_string());
        }
        warn!(owner, error = message, "Upstream dial failed");
    }

    /// Tear down the owner's session with the given reason.
    ///
    /// Idempotent: an absent or already-terminal session yields
    /// [`SessionError::NotConnected`].
    pub async fn disconnect(
        &self,
        owner: &str,
        reason: DisconnectReason,
    ) -> Result<Session, SessionError> {
        let (socket, cancel, snapshot, was_connected) = {
            let mut inner = self.lock();

            let session = inner
                .sessions
                .get_mut(owner)
                .filter(|s| s.state.is_active())
                .ok_or(SessionError::NotConnected)?;

            let was_connected = session.state == SessionState::Connected;
            session.state = SessionState::Disconnected;
            session.disconnect_reason = Some(reason);
            let snapshot = session.clone();

            (
                inner.sockets.remove(owner),
                inner.cancels.remove(owner),
                snapshot,
                was_connected,
            )
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(handle) = socket {
            let mut writer = handle.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        if was_connected {
            self.metrics.inc_disconnect(reason);
        }

        info!(owner, reason = reason.as_str(), "Session disconnected");
        Ok(snapshot)
    }

    /// Poll the upstream socket for output.
    ///
    /// Bounded by a short read deadline so a dedicated reader task can loop
    /// without blocking forever: a deadline expiry returns `Ok(0)`, EOF is
    /// [`SessionError::UpstreamClosed`], and any byte read resets the idle
    /// clock.
    pub async fn read(&self, owner: &str, buf: &mut [u8]) -> Result<usize, SessionError> {
        let handle = self
            .socket_handle(owner)
            .ok_or(SessionError::NotConnected)?;

        let mut reader = handle.reader.lock().await;
        match timeout(self.cfg.read_poll, reader.read(buf)).await {
            Err(_) => Ok(0),
            Ok(Ok(0)) => Err(SessionError::UpstreamClosed),
            Ok(Ok(n)) => {
                drop(reader);
                self.touch(owner);
                self.metrics.add_upstream_bytes_in(n as u64);
                Ok(n)
            }
            Ok(Err(err)) => Err(err.into()),
        }
    }

    /// Send one command line to the upstream, CRLF-terminated.
    ///
    /// Any I/O error tears the session down with reason `error`.
    pub async fn write(&self, owner: &str, command: &str) -> Result<(), SessionError> {
        let handle = self
            .socket_handle(owner)
            .ok_or(SessionError::NotConnected)?;

        let result = {
            let mut writer = handle.writer.lock().await;
            write_line(&mut writer, command).await
        };

        match result {
            Ok(()) => {
                self.touch(owner);
                self.metrics
                    .add_upstream_bytes_out(command.len() as u64 + 2);
                Ok(())
            }
            Err(err) => {
                warn!(owner, %err, "Upstream write failed, disconnecting");
                let _ = self.disconnect(owner, DisconnectReason::Error).await;
                Err(err.into())
            }
        }
    }

    /// Snapshot of the owner's session, or the resting state if none.
    pub fn status(&self, owner: &str) -> Session {
        self.lock()
            .sessions
            .get(owner)
            .cloned()
            .unwrap_or_else(|| Session::idle(owner))
    }

    fn socket_handle(&self, owner: &str) -> Option<SocketHandle> {
        self.lock().sockets.get(owner).cloned()
    }

    /// Reset the idle clock for a connected session.
    fn touch(&self, owner: &str) {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions.get_mut(owner) {
            if session.state == SessionState::Connected {
                session.last_activity_at = Some(SystemTime::now());
            }
        }
    }

    /// Periodic deadline check for one session.
    ///
    /// A coarse ticker comparing timestamps avoids the reset-during-firing
    /// race of one-shot timers, at the cost of up to one tick of slack.
    fn spawn_watchdog(self: &Arc<Self>, owner: String, cancel: CancellationToken) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(registry.cfg.watchdog_tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let Some(expired) = registry.expired_deadline(&owner) else {
                            continue;
                        };
                        info!(%owner, reason = expired.as_str(), "Session deadline expired");
                        let _ = registry.disconnect(&owner, expired).await;
                        return;
                    }
                }
            }
        });
    }

    fn expired_deadline(&self, owner: &str) -> Option<DisconnectReason> {
        let inner = self.lock();
        let session = inner.sessions.get(owner)?;
        if session.state != SessionState::Connected {
            return None;
        }

        let now = SystemTime::now();
        let idle = now
            .duration_since(session.last_activity_at?)
            .unwrap_or_default();
        if idle >= self.cfg.idle_timeout {
            return Some(DisconnectReason::IdleTimeout);
        }

        let age = now
            .duration_since(session.connected_at?)
            .unwrap_or_default();
        if age >= self.cfg.hard_cap {
            return Some(DisconnectReason::HardCap);
        }

        None
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an already-established stream as a connected session,
    /// bypassing policy and dial. Test-only.
    #[cfg(test)]
    pub(crate) fn adopt_for_test(self: &Arc<Self>, owner: &str, stream: TcpStream) -> Session {
        self.reserve(owner, "upstream.test", 23)
            .expect("owner already active");
        self.install(owner, stream).expect("install failed")
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, command: &str) -> std::io::Result<()> {
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}
