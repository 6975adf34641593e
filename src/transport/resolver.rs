//! Address resolution and socket preparation.
//!
//! Turns an [`Endpoint`] into a configured, not yet connected transport
//! socket. A fresh socket is produced for every connection attempt.
//!
//! # Family Selection
//!
//! | Endpoint | Family |
//! |----------|--------|
//! | Local path | Unix domain stream socket |
//! | Host resolves | Family of the first resolved address |
//! | Lookup fails, host starts with `::` | IPv6 (fallback) |
//! | Lookup fails otherwise | IPv4 (fallback) |
//!
//! Network sockets get `TCP_NODELAY` and `SO_REUSEADDR`. IPv6 sockets for
//! `::`-prefixed hosts additionally try to clear `IPV6_V6ONLY`; platforms that
//! reject the option are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, lookup_host};
use tracing::{debug, trace};

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Byte stream a WebSocket session runs over.
pub trait AsyncIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Type-erased transport stream (TCP or Unix domain socket).
pub type BoxedIo = Box<dyn AsyncIo>;

/// Address family of a network socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4.
    Ipv4,
    /// IPv6.
    Ipv6,
}

impl AddressFamily {
    fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Self::Ipv4,
            SocketAddr::V6(_) => Self::Ipv6,
        }
    }

    fn domain(self) -> Domain {
        match self {
            Self::Ipv4 => Domain::IPV4,
            Self::Ipv6 => Domain::IPV6,
        }
    }
}

/// Where a prepared network socket connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Address returned by the lookup.
    Resolved(SocketAddr),
    /// Lookup failed during preparation; resolved again at connect time.
    Deferred {
        /// Host to resolve.
        host: String,
        /// Port to connect to.
        port: u16,
    },
}

// ============================================================================
// PreparedSocket
// ============================================================================

/// A configured socket ready for one connection attempt.
pub enum PreparedSocket {
    /// TCP socket with options applied.
    Tcp {
        /// The unconnected socket.
        socket: TcpSocket,
        /// Family the socket was created for.
        family: AddressFamily,
        /// Connect target.
        target: ConnectTarget,
    },
    /// Unix domain socket path.
    #[cfg(unix)]
    Local {
        /// Socket path.
        path: PathBuf,
    },
}

impl PreparedSocket {
    /// Returns the address family of a network socket.
    #[inline]
    #[must_use]
    pub fn family(&self) -> Option<AddressFamily> {
        match self {
            Self::Tcp { family, .. } => Some(*family),
            #[cfg(unix)]
            Self::Local { .. } => None,
        }
    }

    /// Connects the socket and returns the byte stream.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionRefused`] if the peer refused the connection
    /// - [`Error::Resolve`] if a deferred target still does not resolve
    /// - [`Error::Io`] for any other transport failure
    pub async fn connect(self) -> Result<BoxedIo> {
        match self {
            Self::Tcp { socket, target, .. } => {
                let addr = match target {
                    ConnectTarget::Resolved(addr) => addr,
                    ConnectTarget::Deferred { host, port } => resolve_first(&host, port)
                        .await
                        .map_err(|e| Error::resolve(&host, e.to_string()))?,
                };

                let stream = socket
                    .connect(addr)
                    .await
                    .map_err(|e| refused_or_io(e, addr.to_string()))?;

                trace!(%addr, "TCP stream connected");
                Ok(Box::new(stream))
            }

            #[cfg(unix)]
            Self::Local { path } => {
                let stream = tokio::net::UnixStream::connect(&path)
                    .await
                    .map_err(|e| refused_or_io(e, format!("unix:{}", path.display())))?;

                trace!(path = %path.display(), "Unix stream connected");
                Ok(Box::new(stream))
            }
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Resolves the endpoint and creates a configured socket for it.
///
/// # Errors
///
/// Returns [`Error::Io`] if the socket cannot be created or configured, and
/// [`Error::Config`] for local endpoints on non-Unix platforms.
pub async fn prepare(endpoint: &Endpoint) -> Result<PreparedSocket> {
    match endpoint {
        Endpoint::Local { path, .. } => prepare_local(path.clone()),

        Endpoint::Network { host, port, .. } => {
            let (family, target) = match resolve_first(host, *port).await {
                Ok(addr) => (AddressFamily::of(&addr), ConnectTarget::Resolved(addr)),
                Err(e) => {
                    let family = fallback_family(host);
                    debug!(
                        host = %host,
                        error = %e,
                        ?family,
                        "Address lookup failed, using fallback family"
                    );
                    (
                        family,
                        ConnectTarget::Deferred {
                            host: host.clone(),
                            port: *port,
                        },
                    )
                }
            };

            let socket = open_tcp_socket(family, host)?;

            Ok(PreparedSocket::Tcp {
                socket,
                family,
                target,
            })
        }
    }
}

/// Family assumed when the host cannot be looked up.
#[must_use]
pub fn fallback_family(host: &str) -> AddressFamily {
    if host.starts_with("::") {
        AddressFamily::Ipv6
    } else {
        AddressFamily::Ipv4
    }
}

#[cfg(unix)]
fn prepare_local(path: PathBuf) -> Result<PreparedSocket> {
    Ok(PreparedSocket::Local { path })
}

#[cfg(not(unix))]
fn prepare_local(path: std::path::PathBuf) -> Result<PreparedSocket> {
    Err(Error::config(format!(
        "Local socket endpoints are only supported on Unix: {}",
        path.display()
    )))
}

async fn resolve_first(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no addresses returned"))
}

/// Creates a non-blocking TCP socket with the client's socket options.
fn open_tcp_socket(family: AddressFamily, host: &str) -> Result<TcpSocket> {
    let socket = Socket::new(family.domain(), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket.set_reuse_address(true)?;

    if family == AddressFamily::Ipv6
        && host.starts_with("::")
        && let Err(e) = socket.set_only_v6(false)
    {
        trace!(error = %e, "IPV6_V6ONLY not supported, ignoring");
    }

    socket.set_nonblocking(true)?;

    Ok(TcpSocket::from_std_stream(socket.into()))
}

fn refused_or_io(err: std::io::Error, target: String) -> Error {
    if err.kind() == ErrorKind::ConnectionRefused {
        Error::connection_refused(target)
    } else {
        Error::Io(err)
    }
}

// ============================================================================
// Tests
// ============================================================================
