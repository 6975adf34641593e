//! Reconnecting client façade.
//!
//! [`ReconnectClient`] is the caller-facing handle. It starts and stops the
//! coordinator task, forwards sends to the current session and exposes the
//! client state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::transport::{CLOSE_GOING_AWAY, Connector, MessageHandler};

use super::builder::{ClientBuilder, ClientConfig};
use super::coordinator::{self, Shared, StopRequest};
use super::state::{ClientEvent, ClientState};

// ============================================================================
// ReconnectClient
// ============================================================================

/// WebSocket client that reconnects with exponential backoff.
///
/// Connection-refused failures are retried with a delay doubling from the
/// initial backoff up to the ceiling; any other connect failure ends the loop.
/// A session closed by the peer is replaced by a fresh one when reconnect is
/// enabled.
///
/// # Example
///
/// ```no_run
/// use ws_reconnect::{Message, ReconnectClient};
///
/// # async fn example() -> ws_reconnect::Result<()> {
/// let client = ReconnectClient::builder()
///     .url("ws://127.0.0.1:8080")
///     .build()?;
///
/// client.set_message_handler(|message: Message| println!("{message:?}"));
/// client.start(true)?;
///
/// // ... later
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ReconnectClient {
    /// State shared with the coordinator task.
    shared: Arc<Shared>,
    /// Join handle of the coordinator task, guarded for stop serialization.
    driver: AsyncMutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ReconnectClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectClient")
            .field("endpoint", &self.shared.config.endpoint)
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ReconnectClient - Construction
// ============================================================================

impl ReconnectClient {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates an idle client from a validated configuration.
    pub(crate) fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            shared: Arc::new(Shared::new(config, connector)),
            driver: AsyncMutex::new(None),
        }
    }
}

// ============================================================================
// ReconnectClient - Lifecycle
// ============================================================================

impl ReconnectClient {
    /// Starts the coordinator task; returns immediately.
    ///
    /// `reconnect` decides whether a closed session is replaced by a new
    /// one. Calling `start` while the loop is running only updates that flag.
    /// A start after [`stop()`](Self::stop) returned begins a fresh run.
    ///
    /// Connect failures are not reported here; watch [`state()`](Self::state)
    /// or [`subscribe()`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if called outside a Tokio runtime.
    pub fn start(&self, reconnect: bool) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("start() requires a Tokio runtime: {e}")))?;

        let Ok(mut driver) = self.driver.try_lock() else {
            warn!(endpoint = %self.shared.config.endpoint, "Stop in progress, start ignored");
            return Ok(());
        };

        self.shared.set_reconnect(reconnect);

        if self.shared.state().is_active() {
            debug!(reconnect, "Client already running");
            return Ok(());
        }

        self.shared.clear_stop();
        self.shared.set_state(ClientState::Connecting);
        *driver = Some(runtime.spawn(coordinator::run(Arc::clone(&self.shared))));

        debug!(endpoint = %self.shared.config.endpoint, reconnect, "Client started");
        Ok(())
    }

    /// Stops the client with close code 1001 (going away).
    ///
    /// See [`stop_with()`](Self::stop_with).
    pub async fn stop(&self) {
        self.stop_with(CLOSE_GOING_AWAY, "").await;
    }

    /// Stops the client, closing an open session with `code` and `reason`.
    ///
    /// Returns after the coordinator task and read worker have exited.
    /// Idempotent: later calls return once the first stop has completed and
    /// send no further close frames.
    pub async fn stop_with(&self, code: u16, reason: &str) {
        let mut driver = self.driver.lock().await;
        let first = self.shared.request_stop(StopRequest::new(code, reason));

        if let Some(task) = driver.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "Coordinator task panicked");
        }

        if first {
            self.shared.set_state(ClientState::Stopped);
            info!(endpoint = %self.shared.config.endpoint, "Client stopped");
            self.shared.emit(ClientEvent::Stopped);
        }
    }
}

// ============================================================================
// ReconnectClient - State
// ============================================================================

impl ReconnectClient {
    /// Returns `true` while a session is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared
            .current_session()
            .is_some_and(|session| session.is_connected())
    }

    /// Returns the coordinator state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Returns the id of the open session, if any.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.current_session().map(|session| session.id())
    }

    /// Returns the connection target.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.config.endpoint
    }

    /// Returns the validated configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Subscribes to lifecycle events.
    ///
    /// Slow subscribers lose the oldest events (see [`broadcast`]).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.subscribe()
    }
}

// ============================================================================
// ReconnectClient - Messaging
// ============================================================================

impl ReconnectClient {
    /// Sends a message on the open session.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no session is open
    /// - [`Error::ConnectionClosed`] if the session closed while sending
    /// - [`Error::Timeout`] if the frame was not written in time; the message
    ///   stays queued and may still be sent later
    /// - [`Error::WebSocket`] if the write failed
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        let session = self.shared.current_session().ok_or(Error::NotConnected)?;
        session.send(message.into()).await
    }

    /// Sends a text message.
    ///
    /// # Errors
    ///
    /// See [`send()`](Self::send).
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::text(text.into())).await
    }

    /// Sends a binary message.
    ///
    /// # Errors
    ///
    /// See [`send()`](Self::send).
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(Message::Binary(data.into())).await
    }

    /// Serializes `value` as JSON and sends it as a text message.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] if serialization fails, otherwise see
    /// [`send()`](Self::send).
    pub async fn send_json<T>(&self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let text = serde_json::to_string(value)?;
        self.send_text(text).await
    }

    /// Sets the callback for incoming text and binary messages.
    ///
    /// Applies to the open session and every later one.
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(handler);
        *self.shared.handler.lock() = Some(handler);
    }

    /// Removes the message callback; incoming messages are dropped.
    pub fn clear_message_handler(&self) {
        self.shared.handler.lock().take();
    }
}

// ============================================================================
// Drop
// ============================================================================

impl Drop for ReconnectClient {
    fn drop(&mut self) {
        // Coordinator closes the session with 1001 on its own
        self.shared.request_stop(StopRequest::default());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::sync::mpsc;
    use tokio::time::{Instant, timeout};
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use crate::test_support::{
        PeerListener, PeerStream, ScriptedConnector, Step, drain_peer, init_tracing, unused_port,
    };

    const WAIT: Duration = Duration::from_secs(10);

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn scripted_client(
        listener: &PeerListener,
        connector: Arc<ScriptedConnector>,
        initial: u64,
        ceiling: u64,
    ) -> ReconnectClient {
        ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .initial_backoff(ms(initial))
            .max_backoff(ms(ceiling))
            .connector(connector)
            .build()
            .expect("valid client")
    }

    /// Collects events until `done` matches one, bounded by `WAIT`.
    async fn events_until(
        rx: &mut broadcast::Receiver<ClientEvent>,
        done: impl Fn(&ClientEvent) -> bool,
    ) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        timeout(WAIT, async {
            loop {
                let event = rx.recv().await.expect("event channel open");
                let finished = done(&event);
                events.push(event);
                if finished {
                    break;
                }
            }
        })
        .await
        .expect("expected event in time");
        events
    }

    fn retry_delays(events: &[ClientEvent]) -> Vec<Duration> {
        events
            .iter()
            .filter_map(|event| match event {
                ClientEvent::Retrying { delay, .. } => Some(*delay),
                _ => None,
            })
            .collect()
    }

    fn is_connected_event(event: &ClientEvent) -> bool {
        matches!(event, ClientEvent::Connected { .. })
    }

    async fn close_from_peer(peer: &mut PeerStream, code: u16, reason: &str) {
        peer.send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        })))
        .await
        .expect("peer close should be sent");
        while let Some(Ok(_)) = peer.next().await {}
    }

    /// Reads the peer until a close frame and returns its code and reason.
    async fn received_close(mut peer: PeerStream) -> Option<(u16, String)> {
        let mut received = None;
        while let Some(Ok(message)) = peer.next().await {
            if let Message::Close(frame) = message {
                received = frame.map(|f| (u16::from(f.code), f.reason.as_str().to_owned()));
            }
        }
        received
    }

    // ------------------------------------------------------------------------
    // Backoff scenarios
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_refusals_back_off_then_connect() {
        init_tracing();
        let mut listener = PeerListener::bind().await;
        let connector = Arc::new(ScriptedConnector::new([
            Step::Refuse,
            Step::Refuse,
            Step::Refuse,
        ]));
        let client = scripted_client(&listener, Arc::clone(&connector), 10, 1000);
        let mut events = client.subscribe();

        let started = Instant::now();
        client.start(true).unwrap();
        let seen = events_until(&mut events, is_connected_event).await;
        let _peer = listener.next_peer().await;

        assert_eq!(retry_delays(&seen), vec![ms(20), ms(40), ms(80)]);
        assert!(started.elapsed() >= ms(140));
        assert_eq!(connector.attempts(), 4);
        assert!(client.is_connected());
        assert_eq!(client.state(), ClientState::Open);

        client.stop().await;
    }

    #[tokio::test]
    async fn test_backoff_stops_at_ceiling() {
        let mut listener = PeerListener::bind().await;
        let connector = Arc::new(ScriptedConnector::new([Step::Refuse; 5]));
        let client = scripted_client(&listener, Arc::clone(&connector), 10, 30);
        let mut events = client.subscribe();

        client.start(true).unwrap();
        let seen = events_until(&mut events, is_connected_event).await;
        let _peer = listener.next_peer().await;

        assert_eq!(
            retry_delays(&seen),
            vec![ms(20), ms(30), ms(30), ms(30), ms(30)]
        );

        client.stop().await;
    }

    #[tokio::test]
    async fn test_real_refused_port_is_retried() {
        let port = unused_port().await;
        let client = ReconnectClient::builder()
            .host_port("127.0.0.1", port)
            .initial_backoff(ms(5))
            .max_backoff(ms(20))
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        let seen = events_until(&mut events, |event| {
            matches!(event, ClientEvent::Retrying { attempt: 2, .. })
        })
        .await;

        assert_eq!(retry_delays(&seen), vec![ms(10), ms(20)]);
        assert_eq!(client.state(), ClientState::Connecting);
        assert!(!client.is_connected());

        client.stop().await;
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_listener_appearing_later_is_reached() {
        let port = unused_port().await;
        let client = ReconnectClient::builder()
            .host_port("127.0.0.1", port)
            .initial_backoff(ms(10))
            .max_backoff(ms(50))
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        events_until(&mut events, |event| {
            matches!(event, ClientEvent::Retrying { .. })
        })
        .await;

        let mut listener = PeerListener::bind_port(port).await;
        events_until(&mut events, is_connected_event).await;
        let _peer = listener.next_peer().await;
        assert!(client.is_connected());

        client.stop().await;
    }

    #[tokio::test]
    async fn test_backoff_resets_after_success() {
        let mut listener = PeerListener::bind().await;
        let connector = Arc::new(ScriptedConnector::new([Step::Refuse, Step::Refuse]));
        let client = scripted_client(&listener, Arc::clone(&connector), 10, 1000);
        let mut events = client.subscribe();

        client.start(true).unwrap();
        let first = events_until(&mut events, is_connected_event).await;
        assert_eq!(retry_delays(&first), vec![ms(20), ms(40)]);

        // Next phase starts over at the initial delay
        connector.push([Step::Refuse, Step::Refuse]);
        let mut peer = listener.next_peer().await;
        close_from_peer(&mut peer, 1000, "restart").await;

        let second = events_until(&mut events, is_connected_event).await;
        assert_eq!(retry_delays(&second), vec![ms(20), ms(40)]);
        assert!(second.contains(&ClientEvent::Connecting { attempt: 1 }));
        let _peer = listener.next_peer().await;

        client.stop().await;
    }

    // ------------------------------------------------------------------------
    // Session closure
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_peer_close_reconnects_once() {
        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let mut first = listener.next_peer().await;
        let first_id = client.session_id().expect("open session");

        close_from_peer(&mut first, 1000, "bye").await;

        let seen = events_until(&mut events, is_connected_event).await;
        let closed = seen
            .iter()
            .find_map(|event| match event {
                ClientEvent::Closed { session_id, info } => Some((*session_id, info.clone())),
                _ => None,
            })
            .expect("closed event");
        assert_eq!(closed.0, first_id);
        assert_eq!(closed.1.code, 1000);
        assert_eq!(closed.1.reason, "bye");
        assert!(!seen.iter().any(|event| matches!(event, ClientEvent::Retrying { .. })));

        let _second = listener.next_peer().await;
        assert_ne!(client.session_id(), Some(first_id));

        tokio::time::sleep(ms(100)).await;
        assert_eq!(listener.accepted(), 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn test_peer_close_without_reconnect_goes_idle() {
        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(false).unwrap();
        events_until(&mut events, is_connected_event).await;
        let mut peer = listener.next_peer().await;

        close_from_peer(&mut peer, 1000, "").await;
        events_until(&mut events, |event| *event == ClientEvent::Idle).await;

        assert_eq!(client.state(), ClientState::Idle);
        assert!(!client.is_connected());
        assert_eq!(listener.accepted(), 1);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let mut listener = PeerListener::bind().await;
        let connector = Arc::new(ScriptedConnector::new([Step::Fail("unreachable")]));
        let client = scripted_client(&listener, Arc::clone(&connector), 10, 50);
        let mut events = client.subscribe();

        client.start(true).unwrap();
        let seen = events_until(&mut events, |event| *event == ClientEvent::Idle).await;

        assert!(seen.iter().any(|event| matches!(
            event,
            ClientEvent::Failed { attempt: 1, error } if error.contains("unreachable")
        )));
        tokio::time::sleep(ms(50)).await;
        assert_eq!(connector.attempts(), 1);
        assert!(!client.is_connected());
        assert_eq!(client.state(), ClientState::Idle);

        // A new start tries again
        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let _peer = listener.next_peer().await;
        assert!(client.is_connected());

        client.stop().await;
    }

    #[tokio::test]
    async fn test_connect_timeout_is_fatal() {
        let listener = PeerListener::bind().await;
        let connector = Arc::new(ScriptedConnector::new([Step::Hang]));
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .connect_timeout(ms(50))
            .connector(Arc::clone(&connector))
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        let seen = events_until(&mut events, |event| *event == ClientEvent::Idle).await;

        assert!(seen.iter().any(|event| matches!(event, ClientEvent::Failed { .. })));
        assert_eq!(connector.attempts(), 1);
    }

    // ------------------------------------------------------------------------
    // Stop
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_stop_during_connect() {
        let listener = PeerListener::bind().await;
        let connector = Arc::new(ScriptedConnector::new([Step::Hang]));
        let client = scripted_client(&listener, Arc::clone(&connector), 10, 50);

        client.start(true).unwrap();
        timeout(WAIT, client.stop()).await.expect("stop should return");

        assert!(!client.is_connected());
        assert_eq!(client.state(), ClientState::Stopped);
        assert_eq!(listener.accepted(), 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_backoff_wait() {
        let listener = PeerListener::bind().await;
        let connector = Arc::new(ScriptedConnector::new([Step::Refuse]));
        let client = scripted_client(&listener, Arc::clone(&connector), 10_000, 10_000);
        let mut events = client.subscribe();

        client.start(true).unwrap();
        events_until(&mut events, |event| {
            matches!(event, ClientEvent::Retrying { .. })
        })
        .await;

        let started = Instant::now();
        client.stop().await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(connector.attempts(), 1);
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_closes_open_session_with_code() {
        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let peer = tokio::spawn(received_close(listener.next_peer().await));

        client.stop_with(1000, "done").await;

        assert_eq!(peer.await.unwrap(), Some((1000, "done".to_owned())));
        assert!(!client.is_connected());
        assert_eq!(client.session_id(), None);
        assert_eq!(listener.accepted(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_peer_close_racing_stop_reports_once() {
        for _ in 0..20 {
            let mut listener = PeerListener::bind().await;
            let client = ReconnectClient::builder()
                .endpoint(listener.endpoint())
                .build()
                .unwrap();
            let mut events = client.subscribe();

            client.start(true).unwrap();
            events_until(&mut events, is_connected_event).await;
            let mut peer = listener.next_peer().await;

            let peer_close = async move {
                let _ = peer
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "bye".into(),
                    })))
                    .await;
                while let Some(Ok(_)) = peer.next().await {}
            };

            timeout(WAIT, async {
                tokio::join!(client.stop_with(1000, "done"), peer_close);
            })
            .await
            .expect("stop and peer close should finish");

            let mut closed = Vec::new();
            let mut reconnected = false;
            while let Ok(event) = events.try_recv() {
                match event {
                    ClientEvent::Closed { info, .. } => closed.push(info),
                    ClientEvent::Connected { .. } => reconnected = true,
                    _ => {}
                }
            }

            assert_eq!(closed.len(), 1);
            assert_eq!(closed[0].code, 1000);
            assert!(!reconnected);
            assert!(!client.is_connected());
            assert_eq!(client.state(), ClientState::Stopped);
            assert_eq!(listener.accepted(), 1);
        }
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        drain_peer(listener.next_peer().await);

        tokio::join!(client.stop(), client.stop());
        client.stop().await;

        let mut stopped = 0;
        while let Ok(event) = events.try_recv() {
            if event == ClientEvent::Stopped {
                stopped += 1;
            }
        }
        assert_eq!(stopped, 1);
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let client = ReconnectClient::builder()
            .host_port("127.0.0.1", 1)
            .build()
            .unwrap();

        client.stop().await;
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        drain_peer(listener.next_peer().await);
        client.stop().await;

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let _peer = listener.next_peer().await;
        assert!(client.is_connected());
        assert_eq!(listener.accepted(), 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn test_drop_closes_session() {
        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let peer = listener.next_peer().await;

        drop(client);

        let received = timeout(WAIT, received_close(peer)).await.unwrap();
        assert_eq!(received.map(|(code, _)| code), Some(CLOSE_GOING_AWAY));
    }

    // ------------------------------------------------------------------------
    // Start
    // ------------------------------------------------------------------------

    #[test]
    fn test_start_outside_runtime_fails() {
        let client = ReconnectClient::builder()
            .host_port("127.0.0.1", 1)
            .build()
            .unwrap();

        let err = client.start(true).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let _peer = listener.next_peer().await;
        client.start(true).unwrap();

        tokio::time::sleep(ms(100)).await;
        assert_eq!(listener.accepted(), 1);

        client.stop().await;
    }

    // ------------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let client = ReconnectClient::builder()
            .host_port("127.0.0.1", 1)
            .build()
            .unwrap();

        let err = client.send_text("hello").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_send_and_receive_through_handler() {
        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        let (tx, mut rx) = mpsc::unbounded_channel();
        client.set_message_handler(move |message| {
            let _ = tx.send(message);
        });

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let mut peer = listener.next_peer().await;

        client.send_text("ping").await.unwrap();
        client.send_binary(vec![1u8, 2, 3]).await.unwrap();
        assert_eq!(peer.next().await.unwrap().unwrap(), Message::text("ping"));
        assert_eq!(
            peer.next().await.unwrap().unwrap(),
            Message::binary(vec![1u8, 2, 3])
        );

        peer.send(Message::text("pong")).await.unwrap();
        let received = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(received, Message::text("pong"));

        client.clear_message_handler();
        drain_peer(peer);
        client.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handler_can_clear_itself() {
        let mut listener = PeerListener::bind().await;
        let client = Arc::new(
            ReconnectClient::builder()
                .endpoint(listener.endpoint())
                .build()
                .unwrap(),
        );
        let mut events = client.subscribe();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(&client);
        client.set_message_handler(move |message| {
            if let Some(client) = weak.upgrade() {
                client.clear_message_handler();
            }
            let _ = tx.send(message);
        });

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let mut peer = listener.next_peer().await;

        peer.send(Message::text("hi")).await.unwrap();
        let received = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(received, Message::text("hi"));

        // No handler anymore; the worker keeps running and drops this one
        peer.send(Message::text("unhandled")).await.unwrap();
        timeout(WAIT, client.send_text("after"))
            .await
            .expect("send should not hang")
            .unwrap();
        assert_eq!(peer.next().await.unwrap().unwrap(), Message::text("after"));

        drain_peer(peer);
        timeout(WAIT, client.stop()).await.expect("stop should return");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_json() {
        #[derive(Serialize)]
        struct Heartbeat<'a> {
            action: &'a str,
            seq: u32,
        }

        let mut listener = PeerListener::bind().await;
        let client = ReconnectClient::builder()
            .endpoint(listener.endpoint())
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(true).unwrap();
        events_until(&mut events, is_connected_event).await;
        let mut peer = listener.next_peer().await;

        client
            .send_json(&Heartbeat {
                action: "Heartbeat",
                seq: 7,
            })
            .await
            .unwrap();

        let message = peer.next().await.unwrap().unwrap();
        let value: serde_json::Value =
            serde_json::from_str(message.to_text().unwrap()).unwrap();
        assert_eq!(value["action"], "Heartbeat");
        assert_eq!(value["seq"], 7);

        drain_peer(peer);
        client.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.next().await.and_then(|message| message.ok())
        });

        let client = ReconnectClient::builder()
            .unix_socket(&path)
            .build()
            .unwrap();
        let mut events = client.subscribe();

        client.start(false).unwrap();
        events_until(&mut events, is_connected_event).await;
        client.send_text("over unix").await.unwrap();

        let received = timeout(WAIT, server).await.unwrap().unwrap();
        assert_eq!(received, Some(Message::text("over unix")));

        client.stop().await;
    }
}
