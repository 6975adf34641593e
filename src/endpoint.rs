//! Connection target.
//!
//! An [`Endpoint`] is either a network host and port or a local (Unix domain)
//! socket path. It is parsed once when the client is built and never changes
//! afterwards.
//!
//! # Accepted URLs
//!
//! | URL | Endpoint |
//! |-----|----------|
//! | `ws://127.0.0.1:8080/ocpp` | `Network { host: "127.0.0.1", port: 8080, resource: "/ocpp" }` |
//! | `ws://[::1]/` | `Network { host: "::1", port: 80, resource: "/" }` |
//! | `ws+unix:///run/app.sock` | `Local { path: "/run/app.sock", resource: "/" }` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};

use url::{Host, Url};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Scheme of plain network WebSocket URLs.
const SCHEME_WS: &str = "ws";

/// Scheme of TLS WebSocket URLs (rejected).
const SCHEME_WSS: &str = "wss";

/// Scheme of Unix domain socket WebSocket URLs.
const SCHEME_WS_UNIX: &str = "ws+unix";

/// Host placed in the handshake request of local-socket endpoints.
const LOCAL_AUTHORITY: &str = "localhost";

// ============================================================================
// Endpoint
// ============================================================================

/// Target of the WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Host name or IP literal plus TCP port.
    Network {
        /// Host name or IP literal, IPv6 without brackets.
        host: String,
        /// TCP port.
        port: u16,
        /// Request path and query sent in the handshake.
        resource: String,
    },
    /// Unix domain socket.
    Local {
        /// Filesystem path of the socket.
        path: PathBuf,
        /// Request path sent in the handshake.
        resource: String,
    },
}

// ============================================================================
// Endpoint - Constructors
// ============================================================================

impl Endpoint {
    /// Creates a network endpoint with resource `/`.
    #[must_use]
    pub fn network(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map(str::to_owned)
            .unwrap_or(host);

        Self::Network {
            host,
            port,
            resource: "/".to_owned(),
        }
    }

    /// Creates a local-socket endpoint with resource `/`.
    #[must_use]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local {
            path: path.into(),
            resource: "/".to_owned(),
        }
    }

    /// Parses a `ws://` or `ws+unix://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is malformed, uses `wss://`, uses
    /// an unknown scheme, or lacks a host or socket path.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| Error::config(format!("Invalid endpoint URL '{input}': {e}")))?;

        match url.scheme() {
            SCHEME_WS => Self::from_network_url(&url),
            SCHEME_WS_UNIX => Self::from_local_url(&url),
            SCHEME_WSS => Err(Error::config(format!(
                "Secure WebSocket URLs are not supported: {input}"
            ))),
            other => Err(Error::config(format!(
                "Unsupported endpoint scheme '{other}' in {input}"
            ))),
        }
    }

    fn from_network_url(url: &Url) -> Result<Self> {
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::config(format!("Endpoint URL has no host: {url}"))),
        };

        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::config(format!("Endpoint URL has no port: {url}")))?;

        let mut resource = url.path().to_owned();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self::Network {
            host,
            port,
            resource,
        })
    }

    fn from_local_url(url: &Url) -> Result<Self> {
        let path = url.path();
        if path.is_empty() || path == "/" {
            return Err(Error::config(format!(
                "Local endpoint URL has no socket path: {url}"
            )));
        }

        Ok(Self::local(path))
    }
}

// ============================================================================
// Endpoint - Accessors
// ============================================================================

impl Endpoint {
    /// Returns the host of a network endpoint.
    #[inline]
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Network { host, .. } => Some(host),
            Self::Local { .. } => None,
        }
    }

    /// Returns the port of a network endpoint.
    #[inline]
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Network { port, .. } => Some(*port),
            Self::Local { .. } => None,
        }
    }

    /// Returns the socket path of a local endpoint.
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Network { .. } => None,
            Self::Local { path, .. } => Some(path),
        }
    }

    /// Returns the request resource sent in the handshake.
    #[inline]
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Network { resource, .. } | Self::Local { resource, .. } => resource,
        }
    }

    /// Returns `true` for local-socket endpoints.
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    /// Returns a copy of this endpoint with a different request resource.
    #[must_use]
    pub fn with_resource(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        let value = if value.starts_with('/') {
            value
        } else {
            format!("/{value}")
        };

        match &mut self {
            Self::Network { resource, .. } | Self::Local { resource, .. } => *resource = value,
        }
        self
    }

    /// Returns the URI placed in the handshake request.
    ///
    /// Local endpoints use `localhost` as authority.
    #[must_use]
    pub fn request_uri(&self) -> String {
        match self {
            Self::Network {
                host,
                port,
                resource,
            } if host.contains(':') => format!("ws://[{host}]:{port}{resource}"),
            Self::Network {
                host,
                port,
                resource,
            } => format!("ws://{host}:{port}{resource}"),
            Self::Local { resource, .. } => format!("ws://{LOCAL_AUTHORITY}{resource}"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { host, port, .. } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Network { host, port, .. } => write!(f, "{host}:{port}"),
            Self::Local { path, .. } => write!(f, "unix:{}", path.display()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
