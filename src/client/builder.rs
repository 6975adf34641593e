//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`ReconnectClient`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ws_reconnect::ReconnectClient;
//!
//! # fn example() -> ws_reconnect::Result<()> {
//! let client = ReconnectClient::builder()
//!     .url("ws://127.0.0.1:8080/ocpp/CP01")
//!     .protocol("ocpp1.6")
//!     .initial_backoff(Duration::from_secs(1))
//!     .max_backoff(Duration::from_secs(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{BackoffPolicy, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::transport::{Connector, HandshakeOptions, TungsteniteConnector};

use super::core::ReconnectClient;

// ============================================================================
// Constants
// ============================================================================

/// Default bound for one connect attempt (resolve, connect, handshake).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ClientConfig
// ============================================================================

/// Validated client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Connection target.
    pub endpoint: Endpoint,
    /// Reconnect backoff.
    pub backoff: BackoffPolicy,
    /// Bound for one connect attempt.
    pub connect_timeout: Duration,
    /// Ping period while a session is open.
    pub heartbeat: Option<Duration>,
    /// Subprotocols and extra headers of the handshake.
    pub handshake: HandshakeOptions,
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Where the endpoint comes from; the last setter wins.
#[derive(Debug, Clone)]
enum EndpointSource {
    Url(String),
    Endpoint(Endpoint),
}

/// Builder for configuring a [`ReconnectClient`] instance.
///
/// Use [`ReconnectClient::builder()`] to create a new builder.
#[derive(Clone)]
pub struct ClientBuilder {
    /// Endpoint source.
    endpoint: Option<EndpointSource>,
    /// Request resource overriding the URL path.
    resource: Option<String>,
    /// Starting point of the doubling.
    initial_backoff: Duration,
    /// Upper bound for the delay.
    max_backoff: Duration,
    /// Bound for one connect attempt.
    connect_timeout: Duration,
    /// Ping period.
    heartbeat: Option<Duration>,
    /// Handshake extras.
    handshake: HandshakeOptions,
    /// Protocol engine override.
    connector: Option<Arc<dyn Connector>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            endpoint: None,
            resource: None,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat: None,
            handshake: HandshakeOptions::default(),
            connector: None,
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("endpoint", &self.endpoint)
            .field("resource", &self.resource)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("connect_timeout", &self.connect_timeout)
            .field("heartbeat", &self.heartbeat)
            .field("handshake", &self.handshake)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default settings and no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint from a `ws://` or `ws+unix://` URL.
    ///
    /// The URL is parsed by [`build()`](Self::build).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(EndpointSource::Url(url.into()));
        self
    }

    /// Sets a network endpoint.
    #[inline]
    #[must_use]
    pub fn host_port(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = Some(EndpointSource::Endpoint(Endpoint::network(host, port)));
        self
    }

    /// Sets a Unix domain socket endpoint.
    #[inline]
    #[must_use]
    pub fn unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.endpoint = Some(EndpointSource::Endpoint(Endpoint::local(path)));
        self
    }

    /// Sets the endpoint directly.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(EndpointSource::Endpoint(endpoint));
        self
    }

    /// Overrides the request resource (path and query) of the handshake.
    #[inline]
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets the starting delay (default 1s).
    ///
    /// Every refusal doubles the previous delay before waiting, so the first
    /// wait is twice this value, capped by [`max_backoff`](Self::max_backoff).
    #[inline]
    #[must_use]
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Sets the upper bound for the reconnect delay (default 5s).
    #[inline]
    #[must_use]
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Sets the bound for one connect attempt (default 30s).
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables a periodic ping while a session is open.
    #[inline]
    #[must_use]
    pub fn heartbeat(mut self, period: Duration) -> Self {
        self.heartbeat = Some(period);
        self
    }

    /// Adds a requested subprotocol.
    #[inline]
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.handshake.protocols.push(protocol.into());
        self
    }

    /// Adds a handshake request header.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.handshake.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the protocol engine.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set or the URL is invalid
    /// - [`Error::Config`] if the backoff, timeout or heartbeat is invalid
    /// - [`Error::Config`] if a handshake header or subprotocol is invalid
    pub fn build(self) -> Result<ReconnectClient> {
        let config = self.validate()?;
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(TungsteniteConnector),
        };

        Ok(ReconnectClient::new(config, connector))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    fn validate(&self) -> Result<ClientConfig> {
        let endpoint = self.validate_endpoint()?;
        let backoff = BackoffPolicy::new(self.initial_backoff, self.max_backoff)?;

        if self.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }

        if self.heartbeat.is_some_and(|period| period.is_zero()) {
            return Err(Error::config("Heartbeat period must be greater than zero"));
        }

        // Surfaces header problems now instead of on every attempt
        self.handshake.request_for(&endpoint)?;

        Ok(ClientConfig {
            endpoint,
            backoff,
            connect_timeout: self.connect_timeout,
            heartbeat: self.heartbeat,
            handshake: self.handshake.clone(),
        })
    }

    fn validate_endpoint(&self) -> Result<Endpoint> {
        let endpoint = match &self.endpoint {
            Some(EndpointSource::Url(url)) => Endpoint::parse(url)?,
            Some(EndpointSource::Endpoint(endpoint)) => endpoint.clone(),
            None => {
                return Err(Error::config(
                    "Endpoint is required. Use .url(), .host_port() or .unix_socket() to set it.\n\
                     Example: ReconnectClient::builder().url(\"ws://127.0.0.1:8080\")",
                ));
            }
        };

        if let Endpoint::Network { host, .. } = &endpoint
            && host.is_empty()
        {
            return Err(Error::config("Endpoint host must not be empty"));
        }

        Ok(match &self.resource {
            Some(resource) => endpoint.with_resource(resource.clone()),
            None => endpoint,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
