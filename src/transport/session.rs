//! Connection session and read worker.
//!
//! A [`Session`] owns everything tied to one connection: the WebSocket stream
//! (socket plus framing state) and the read worker task driving it. Sessions
//! are never reused; the coordinator builds a new one after every handshake.
//!
//! # Read Worker
//!
//! The worker is a tokio task that handles:
//!
//! - Incoming frames (text/binary go to the message handler)
//! - Outgoing messages and close requests from the API
//! - Optional heartbeat pings
//!
//! When it exits, for whatever reason, it clears the connected flag, drops the
//! stream and reports a [`CloseInfo`] through a oneshot channel. The channel is
//! consumed by value, so the report happens exactly once per session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

use super::connector::WsStream;

// ============================================================================
// Constants
// ============================================================================

/// Close code sent when the client goes away (default for `stop()`).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code reported when the peer's close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the stream ended without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// How long a requested close waits for the peer's close reply.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `send` waits for the worker to write the frame.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Callback for incoming text and binary messages.
///
/// Called on the read worker; keep it short or hand the message off. The
/// handler slot is not locked during the call, so the handler may replace or
/// clear itself.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Handler slot shared between the client and every session's worker.
pub(crate) type SharedHandler = Arc<Mutex<Option<MessageHandler>>>;

type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// ============================================================================
// CloseInfo
// ============================================================================

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl CloseInfo {
    /// Creates a close info.
    #[inline]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Close info for a stream that ended without a close handshake.
    #[inline]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }

    fn from_frame(frame: Option<&CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self::new(u16::from(frame.code), frame.reason.as_str()),
            None => Self::new(CLOSE_NO_STATUS, ""),
        }
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

// ============================================================================
// SessionCommand
// ============================================================================

/// Internal commands for the read worker.
enum SessionCommand {
    /// Write a message and report the outcome.
    Send {
        message: Message,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Start the closing handshake.
    Close { code: u16, reason: String },
}

// ============================================================================
// SessionHandle
// ============================================================================

/// Cloneable view of a session used for sending and state queries.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    connected: Arc<AtomicBool>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns `true` between handshake completion and detected closure.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Sends a message through the read worker.
    ///
    /// A [`Error::Timeout`] only means the write was not confirmed in time.
    /// The message stays queued and may still reach the peer afterwards.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the session already closed
    /// - [`Error::ConnectionClosed`] if it closed while sending
    /// - [`Error::Timeout`] if the frame was not written within 30s
    /// - [`Error::WebSocket`] if the write failed
    pub async fn send(&self, message: Message) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let (ack, ack_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Send { message, ack })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(SEND_TIMEOUT, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::timeout("send", SEND_TIMEOUT.as_millis() as u64)),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One open connection and its read worker.
pub struct Session {
    handle: SessionHandle,
    closed_rx: oneshot::Receiver<CloseInfo>,
    close_info: Option<CloseInfo>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Takes ownership of a handshaken stream and starts the read worker.
    pub(crate) fn open(
        ws_stream: WsStream,
        handler: SharedHandler,
        heartbeat: Option<Duration>,
    ) -> Self {
        let id = SessionId::next();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        let connected = Arc::new(AtomicBool::new(true));

        let worker = tokio::spawn(run_read_worker(
            id,
            ws_stream,
            command_rx,
            Arc::clone(&connected),
            handler,
            heartbeat,
            closed_tx,
        ));

        debug!(session_id = %id, "Session opened");

        Self {
            handle: SessionHandle {
                id,
                command_tx,
                connected,
            },
            closed_rx,
            close_info: None,
            worker: Some(worker),
        }
    }

    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    /// Returns a cloneable handle for sending.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Returns `true` while the read worker is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// Waits until the read worker exited and returns why.
    ///
    /// Cancel-safe: a dropped call can be repeated and yields the same result.
    pub async fn wait_closed(&mut self) -> CloseInfo {
        let info = match self.close_info.take() {
            Some(info) => info,
            None => (&mut self.closed_rx)
                .await
                .unwrap_or_else(|_| CloseInfo::abnormal("read worker ended without report")),
        };
        self.close_info = Some(info.clone());

        if let Some(worker) = self.worker.as_mut() {
            if let Err(e) = worker.await {
                error!(session_id = %self.handle.id, error = %e, "Read worker panicked");
            }
            self.worker = None;
        }

        info
    }

    /// Requests a graceful close and waits until the read worker exited.
    ///
    /// Sends a close frame if the session is still connected, then waits up
    /// to 5s for the peer's reply. On an already closed session this only
    /// returns the recorded close info.
    pub async fn close(&mut self, code: u16, reason: &str) -> CloseInfo {
        if self.handle.is_connected() {
            let _ = self.handle.command_tx.send(SessionCommand::Close {
                code,
                reason: reason.to_owned(),
            });
        }

        self.wait_closed().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.handle.id)
            .field("connected", &self.is_connected())
            .field("worker_running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Read Worker
// ============================================================================

/// Read worker loop; reports the close info exactly once on exit.
async fn run_read_worker(
    id: SessionId,
    ws_stream: WsStream,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    connected: Arc<AtomicBool>,
    handler: SharedHandler,
    heartbeat: Option<Duration>,
    closed_tx: oneshot::Sender<CloseInfo>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut ticker = heartbeat.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    let info = loop {
        tokio::select! {
            // Incoming frames from the peer
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Close(frame))) => {
                        let info = CloseInfo::from_frame(frame.as_ref());
                        debug!(session_id = %id, %info, "Close frame received from peer");
                        // Flushes the close reply queued by the engine
                        let _ = ws_write.close().await;
                        break info;
                    }

                    Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                        dispatch(&handler, message);
                    }

                    Some(Ok(_)) => {
                        trace!(session_id = %id, "Control frame received");
                    }

                    Some(Err(e)) => {
                        warn!(session_id = %id, error = %e, "WebSocket read failed");
                        break CloseInfo::abnormal(e.to_string());
                    }

                    None => {
                        debug!(session_id = %id, "WebSocket stream ended");
                        break CloseInfo::abnormal("stream ended");
                    }
                }
            }

            // Commands from the API
            command = command_rx.recv() => {
                match command {
                    Some(SessionCommand::Send { message, ack }) => {
                        let result = ws_write.send(message).await.map_err(Error::from);
                        if let Err(ref e) = result {
                            debug!(session_id = %id, error = %e, "Send failed");
                        }
                        let _ = ack.send(result);
                    }

                    Some(SessionCommand::Close { code, reason }) => {
                        debug!(session_id = %id, code, "Close requested");
                        break close_gracefully(&mut ws_write, &mut ws_read, code, reason).await;
                    }

                    None => {
                        debug!(session_id = %id, "Command channel closed");
                        break close_gracefully(
                            &mut ws_write,
                            &mut ws_read,
                            CLOSE_GOING_AWAY,
                            String::new(),
                        )
                        .await;
                    }
                }
            }

            () = next_tick(&mut ticker) => {
                if let Err(e) = ws_write.send(Message::Ping(Default::default())).await {
                    warn!(session_id = %id, error = %e, "Heartbeat ping failed");
                    break CloseInfo::abnormal(e.to_string());
                }
                trace!(session_id = %id, "Heartbeat ping sent");
            }
        }
    };

    connected.store(false, Ordering::Release);
    drop(ws_write);
    drop(ws_read);

    debug!(session_id = %id, %info, "Read worker terminated");
    let _ = closed_tx.send(info);
}

/// Sends our close frame and waits briefly for the peer's reply.
async fn close_gracefully(
    ws_write: &mut WsSink,
    ws_read: &mut WsSource,
    code: u16,
    reason: String,
) -> CloseInfo {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.clone().into(),
    };

    if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
        return CloseInfo::new(code, reason);
    }

    let drain = async {
        while let Some(Ok(message)) = ws_read.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    };

    if timeout(CLOSE_TIMEOUT, drain).await.is_err() {
        debug!("Peer did not answer the close frame in time");
    }

    CloseInfo::new(code, reason)
}

fn dispatch(handler: &SharedHandler, message: Message) {
    let current = handler.lock().clone();
    match current {
        Some(handler) => handler(message),
        None => trace!("No message handler set, dropping message"),
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
