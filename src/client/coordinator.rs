//! Reconnect coordinator loop.
//!
//! One coordinator task runs per `start()`. It owns the attempt counter and
//! the current backoff, creates a fresh [`Session`] after every successful
//! handshake and decides after every closure whether to connect again.
//!
//! # Flow
//!
//! ```text
//! ┌─────────┐ refused  ┌──────────────┐
//! │ attempt │─────────►│ backoff wait │──┐
//! └────┬────┘          └──────────────┘  │
//!      │ ▲                               │
//!      │ └───────────────────────────────┘
//!      │ handshaken
//!      ▼
//! ┌─────────┐ closed, reconnect on
//! │ session │─────────────────────► attempt (backoff reset)
//! └─────────┘
//! ```
//!
//! Every wait races the stop signal, so a stop request is observed while
//! connecting, while backing off and while a session is open.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};
use crate::transport::session::SharedHandler;
use crate::transport::{CLOSE_GOING_AWAY, Connector, Session, SessionHandle, WsStream};

use super::builder::ClientConfig;
use super::state::{ClientEvent, ClientState};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// StopRequest
// ============================================================================

/// Close code and reason requested by `stop()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StopRequest {
    pub(crate) code: u16,
    pub(crate) reason: String,
}

impl StopRequest {
    pub(crate) fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl Default for StopRequest {
    fn default() -> Self {
        Self::new(CLOSE_GOING_AWAY, "")
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the client façade and the coordinator task.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) handler: SharedHandler,
    stop: watch::Sender<Option<StopRequest>>,
    reconnect: AtomicBool,
    state: Mutex<ClientState>,
    session: Mutex<Option<SessionHandle>>,
    events: broadcast::Sender<ClientEvent>,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (stop, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            config,
            connector,
            handler: Arc::new(Mutex::new(None)),
            stop,
            reconnect: AtomicBool::new(false),
            state: Mutex::new(ClientState::Idle),
            session: Mutex::new(None),
            events,
        }
    }

    /// Raises the stop flag. Returns `true` if it was not raised before.
    pub(crate) fn request_stop(&self, request: StopRequest) -> bool {
        self.stop.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(request);
            true
        })
    }

    /// Lowers the stop flag for a fresh `start()`.
    pub(crate) fn clear_stop(&self) -> bool {
        self.stop.send_if_modified(|current| current.take().is_some())
    }

    #[inline]
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.borrow().is_some()
    }

    pub(crate) fn stop_request(&self) -> Option<StopRequest> {
        self.stop.borrow().clone()
    }

    fn subscribe_stop(&self) -> watch::Receiver<Option<StopRequest>> {
        self.stop.subscribe()
    }

    #[inline]
    pub(crate) fn set_reconnect(&self, enabled: bool) {
        self.reconnect.store(enabled, Ordering::Release);
    }

    #[inline]
    pub(crate) fn reconnect_enabled(&self) -> bool {
        self.reconnect.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn state(&self) -> ClientState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Client state changed");
        }
    }

    pub(crate) fn current_session(&self) -> Option<SessionHandle> {
        self.session.lock().clone()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Publishes an event; having no subscribers is fine.
    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

// ============================================================================
// AttemptState
// ============================================================================

/// Attempt counter and backoff of one connecting phase.
#[derive(Debug, Clone)]
pub(crate) struct AttemptState {
    policy: BackoffPolicy,
    current_backoff: Duration,
    attempt: u32,
}

impl AttemptState {
    pub(crate) fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current_backoff: policy.initial(),
            attempt: 0,
        }
    }

    /// Counts a new attempt and returns its 1-based number.
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    /// Doubles the previous delay, capped, and returns it as the wait after
    /// a refusal.
    pub(crate) fn take_delay(&mut self) -> Duration {
        self.current_backoff = self.policy.next_delay(self.current_backoff);
        self.current_backoff
    }

    /// Previous delay back to the initial one after a successful handshake.
    pub(crate) fn reset(&mut self) {
        self.current_backoff = self.policy.initial();
        self.attempt = 0;
    }

    #[cfg(test)]
    fn current_backoff(&self) -> Duration {
        self.current_backoff
    }
}

// ============================================================================
// Coordinator Loop
// ============================================================================

/// Runs connect attempts and sessions until stopped, a fatal failure, or a
/// closure with reconnect disabled.
pub(crate) async fn run(shared: Arc<Shared>) {
    let endpoint = &shared.config.endpoint;
    let mut stop_rx = shared.subscribe_stop();
    let mut attempts = AttemptState::new(shared.config.backoff);

    loop {
        if shared.stop_requested() {
            break;
        }

        let attempt = attempts.begin_attempt();
        shared.set_state(ClientState::Connecting);
        shared.emit(ClientEvent::Connecting { attempt });
        info!(%endpoint, attempt, "Trying to connect");

        let result = tokio::select! {
            biased;

            () = wait_for_stop(&mut stop_rx) => {
                debug!(%endpoint, attempt, "Connect attempt abandoned");
                break;
            }

            result = connect_once(&shared) => result,
        };

        match result {
            Ok(ws_stream) => {
                attempts.reset();

                if !run_session(&shared, ws_stream, &mut stop_rx).await {
                    break;
                }

                info!(%endpoint, "Reconnecting");
            }

            Err(e) if e.is_connection_refused() => {
                let delay = attempts.take_delay();
                let delay_ms = delay.as_millis() as u64;

                warn!(%endpoint, attempt, error = %e, "Connection refused");
                warn!(%endpoint, delay_ms, "Waiting before reconnect");
                shared.emit(ClientEvent::Retrying { attempt, delay });

                tokio::select! {
                    biased;

                    () = wait_for_stop(&mut stop_rx) => break,

                    () = sleep(delay) => {}
                }
            }

            Err(e) => {
                warn!(%endpoint, attempt, error = %e, "Connect failed, not retrying");
                shared.emit(ClientEvent::Failed {
                    attempt,
                    error: e.to_string(),
                });
                break;
            }
        }
    }

    if !shared.stop_requested() {
        shared.set_state(ClientState::Idle);
        shared.emit(ClientEvent::Idle);
    }

    debug!(%endpoint, "Coordinator loop exited");
}

/// One attempt: handshake request, then resolve, connect and handshake
/// bounded by the connect timeout.
async fn connect_once(shared: &Shared) -> Result<WsStream> {
    let config = &shared.config;
    let request = config.handshake.request_for(&config.endpoint)?;

    timeout(
        config.connect_timeout,
        shared.connector.connect(&config.endpoint, request),
    )
    .await
    .map_err(|_| Error::connection_timeout(config.connect_timeout.as_millis() as u64))?
}

/// Owns one session until it closes. Returns `true` to reconnect.
async fn run_session(
    shared: &Shared,
    ws_stream: WsStream,
    stop_rx: &mut watch::Receiver<Option<StopRequest>>,
) -> bool {
    let mut session = Session::open(
        ws_stream,
        Arc::clone(&shared.handler),
        shared.config.heartbeat,
    );
    let session_id = session.id();

    *shared.session.lock() = Some(session.handle());
    shared.set_state(ClientState::Open);
    info!(%session_id, endpoint = %shared.config.endpoint, "Connected");
    shared.emit(ClientEvent::Connected { session_id });

    let closed = tokio::select! {
        biased;

        () = wait_for_stop(stop_rx) => None,

        info = session.wait_closed() => Some(info),
    };

    let info = match closed {
        Some(info) => info,
        None => {
            let request = shared.stop_request().unwrap_or_default();
            shared.set_state(ClientState::Closing);
            session.close(request.code, &request.reason).await
        }
    };

    shared.session.lock().take();
    warn!(
        %session_id,
        code = info.code,
        reason = %info.reason,
        "Connection closed"
    );
    shared.emit(ClientEvent::Closed { session_id, info });

    !shared.stop_requested() && shared.reconnect_enabled()
}

/// Resolves once a stop has been requested.
async fn wait_for_stop(stop_rx: &mut watch::Receiver<Option<StopRequest>>) {
    // An error means the sender is gone, which only happens on teardown
    let _ = stop_rx.wait_for(Option::is_some).await;
}

// ============================================================================
// Tests
// ============================================================================
