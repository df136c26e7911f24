//! Connection manager for the push-notification channel.
//!
//! One manager task owns the transport exclusively: it is the sole writer
//! of [`ConnectionState`], sends the keepalive, and forwards every inbound
//! frame — decoded to a [`PushEvent`] — over an ordered channel. Transport
//! failures never surface to the caller; the manager transitions to
//! `Reconnecting` and retries forever, because the consumer is a
//! long-running background presence rather than a request with a deadline.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::event::{decode_frame, ping_frame, PushEvent};

/// Capacity of the manager → dispatcher event channel.
const EVENT_BUFFER: usize = 256;

/// Lifecycle of the one logical push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    /// Waiting out the reconnect delay after a failure or server close.
    Reconnecting,
    Closed,
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Push endpoint URL (ws:// or wss://).
    pub url: String,
    /// Fixed wait before retrying a failed connection.
    pub reconnect_delay: Duration,
    /// Keepalive ping cadence while the connection is open.
    pub ping_interval: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws/notifications/".to_string(),
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Handle to a running [`ConnectionManager`] task.
///
/// Dropping the handle leaves the task running; call [`PushHandle::stop`]
/// for an orderly shutdown.
pub struct PushHandle {
    shutdown_tx: broadcast::Sender<()>,
    state_rx: watch::Receiver<ConnectionState>,
    task: tokio::task::JoinHandle<()>,
}

impl PushHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A watch receiver observing every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stops the manager: closes the transport with a normal-closure frame
    /// if open, cancels any pending reconnect, and waits for the task to
    /// finish. No reconnect can be scheduled after this returns.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if self.task.await.is_err() {
            warn!("Push manager task panicked during shutdown");
        }
    }
}

enum LoopExit {
    /// Shutdown was requested; do not reconnect.
    Stopped,
    /// The server closed or the stream ended; reconnect.
    Disconnected,
}

/// Owns the push connection and its reconnect/keepalive state machine.
pub struct ConnectionManager {
    config: PushConfig,
    event_tx: mpsc::Sender<PushEvent>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: broadcast::Sender<()>,
    // Subscribed at construction so a stop() issued before the task first
    // polls is never lost.
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionManager {
    pub fn new(config: PushConfig) -> (Self, mpsc::Receiver<PushEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        (
            Self {
                config,
                event_tx,
                state_tx,
                shutdown_tx,
                shutdown_rx,
            },
            event_rx,
        )
    }

    /// Spawns the manager on the current runtime and returns its handle
    /// together with the ordered event stream.
    pub fn spawn(config: PushConfig) -> (PushHandle, mpsc::Receiver<PushEvent>) {
        let (manager, event_rx) = Self::new(config);
        let state_rx = manager.state_tx.subscribe();
        let shutdown_tx = manager.shutdown_tx.clone();
        let task = tokio::spawn(manager.run());

        (
            PushHandle {
                shutdown_tx,
                state_rx,
                task,
            },
            event_rx,
        )
    }

    /// Runs the state machine until stopped. Reconnection is unbounded.
    pub async fn run(mut self) {
        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            info!(url = %self.config.url, "Connecting to push endpoint");

            match self.connect_and_listen().await {
                Ok(LoopExit::Stopped) => break,
                Ok(LoopExit::Disconnected) => {
                    info!("Push connection closed by server");
                }
                Err(e) => {
                    warn!(error = %e, "Push connection failed");
                }
            }

            self.set_state(ConnectionState::Reconnecting);
            debug!(delay = ?self.config.reconnect_delay, "Waiting before reconnect");
            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                _ = self.shutdown_rx.recv() => break,
            }
        }

        self.set_state(ConnectionState::Closed);
        info!("Push connection manager stopped");
    }

    async fn connect_and_listen(&mut self) -> Result<LoopExit, String> {
        let ws = tokio::select! {
            res = connect_async(self.config.url.as_str()) => {
                res.map_err(|e| format!("connect failed: {e}"))?.0
            }
            _ = self.shutdown_rx.recv() => return Ok(LoopExit::Stopped),
        };

        self.set_state(ConnectionState::Open);
        info!("Push connection open");

        let (mut write, mut read) = ws.split();

        // The keepalive timer lives inside this connection's scope: leaving
        // it drops the interval, so a stale tick cannot fire into a dead
        // transport. First ping goes out one full interval after open.
        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Stop requested, closing push connection");
                    // SinkExt::close sends a normal-closure frame and flushes.
                    let _ = write.close().await;
                    return Ok(LoopExit::Stopped);
                }

                _ = keepalive.tick() => {
                    if let Err(e) = write.send(Message::Text(ping_frame())).await {
                        return Err(format!("keepalive send failed: {e}"));
                    }
                    debug!("Sent keepalive ping");
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            // Frames are forwarded in arrival order; this task
                            // is the only producer.
                            let event = decode_frame(&text);
                            if self.event_tx.send(event).await.is_err() {
                                warn!("Event receiver dropped, discarding push events");
                            }
                        }
                        Some(Ok(Message::Close(_))) => return Ok(LoopExit::Disconnected),
                        Some(Ok(_)) => {} // binary and control frames are not events
                        Some(Err(e)) => return Err(format!("transport error: {e}")),
                        None => return Ok(LoopExit::Disconnected),
                    }
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Connection state changed");
        }
    }
}
