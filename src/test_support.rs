//! Test helpers: local WebSocket peers and a scripted connector.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing_subscriber::EnvFilter;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::transport::{ClientRequest, Connector, HandshakeOptions, TungsteniteConnector, WsStream};

// ============================================================================
// Types
// ============================================================================

/// Server side of a test connection.
pub(crate) type PeerStream = WebSocketStream<TcpStream>;

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`; repeated calls are ignored.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Peers
// ============================================================================

/// A local WebSocket server handing every accepted connection to the test.
pub(crate) struct PeerListener {
    port: u16,
    peers: mpsc::UnboundedReceiver<PeerStream>,
    accepted: Arc<AtomicUsize>,
}

impl PeerListener {
    /// Binds to `127.0.0.1:0` and starts accepting.
    pub(crate) async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        Self::serve(listener)
    }

    /// Binds to a specific port on `127.0.0.1`.
    pub(crate) async fn bind_port(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("bind");
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let port = listener.local_addr().expect("local addr").port();
        let (tx, peers) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if tx.send(ws).is_err() {
                        break;
                    }
                }
            }
        });

        Self {
            port,
            peers,
            accepted,
        }
    }

    pub(crate) fn endpoint(&self) -> Endpoint {
        Endpoint::network("127.0.0.1", self.port)
    }

    /// Number of completed server-side handshakes.
    pub(crate) fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Waits up to 10s for the next accepted connection.
    pub(crate) async fn next_peer(&mut self) -> PeerStream {
        timeout(Duration::from_secs(10), self.peers.recv())
            .await
            .expect("peer should connect in time")
            .expect("listener alive")
    }
}

/// Returns a handshaken client stream and its server side.
pub(crate) async fn connected_pair() -> (WsStream, PeerStream) {
    let mut listener = PeerListener::bind().await;
    let endpoint = listener.endpoint();
    let request = HandshakeOptions::default()
        .request_for(&endpoint)
        .expect("request");

    let client = TungsteniteConnector
        .connect(&endpoint, request)
        .await
        .expect("client connect");
    let peer = listener.next_peer().await;

    (client, peer)
}

/// Keeps reading the peer until the stream ends, answering close frames.
pub(crate) fn drain_peer(mut peer: PeerStream) {
    tokio::spawn(async move { while let Some(Ok(_)) = peer.next().await {} });
}

/// Returns a localhost port with nothing listening on it.
pub(crate) async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr").port()
}

// ============================================================================
// ScriptedConnector
// ============================================================================

/// Outcome of one scripted connect attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    /// Fail as if the peer refused the connection.
    Refuse,
    /// Fail with a non-retryable error.
    Fail(&'static str),
    /// Never complete.
    Hang,
    /// Delegate to the real connector.
    Connect,
}

/// Connector that plays a script before delegating to the real engine.
///
/// Once the script is exhausted every attempt connects for real.
pub(crate) struct ScriptedConnector {
    plan: Mutex<VecDeque<Step>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub(crate) fn new(plan: impl IntoIterator<Item = Step>) -> Self {
        Self {
            plan: Mutex::new(plan.into_iter().collect()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Appends steps to the script.
    pub(crate) fn push(&self, steps: impl IntoIterator<Item = Step>) {
        self.plan.lock().extend(steps);
    }

    /// Number of connect attempts made so far.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &Endpoint, request: ClientRequest) -> Result<WsStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.plan.lock().pop_front().unwrap_or(Step::Connect);

        match step {
            Step::Refuse => Err(Error::connection_refused(endpoint.to_string())),
            Step::Fail(message) => Err(Error::connection(message)),
            Step::Hang => std::future::pending().await,
            Step::Connect => TungsteniteConnector.connect(endpoint, request).await,
        }
    }
}
