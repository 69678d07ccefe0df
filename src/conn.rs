//! Push connection to the sensor backend.
//!
//! Handles WebSocket I/O only: connect, receive the next data message, close.
//! No telemetry semantics here; the [`Session`](crate::session::Session) owns
//! decoding and the snapshot cell.

use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};
use tungstenite::handshake::HandshakeError;
use tungstenite::http::Uri;
use tungstenite::{Message, WebSocket};

use crate::error::DecodeError;

/// Default sensor backend stream.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws/video";

/// Shortest read timeout handed to the socket; zero would mean "block forever".
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// One data message from the backend, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
}

/// Errors from session and connection operations.
#[derive(Debug)]
pub enum SessionError {
    /// Endpoint is not a usable `ws://host[:port]/path` URL.
    Endpoint { endpoint: String, reason: String },
    /// TCP connect or socket option failure.
    Io(io::Error),
    /// WebSocket handshake or protocol failure.
    Transport(tungstenite::Error),
    /// No message arrived within the receive timeout.
    Timeout { timeout: Duration },
    /// Connection closed by the backend.
    Disconnected,
    /// Operation on a session that has already been closed or terminated.
    Closed,
    /// One inbound message could not be decoded.
    Decode(DecodeError),
}

impl SessionError {
    /// Whether this error ends the session.
    ///
    /// A timeout or a malformed message leaves the connection usable; every
    /// other fault terminates it and requires an explicit reopen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionError::Timeout { .. } | SessionError::Decode(_))
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Endpoint { endpoint, reason } => {
                write!(f, "bad endpoint {endpoint:?}: {reason}")
            }
            SessionError::Io(e) => write!(f, "I/O error: {e}"),
            SessionError::Transport(e) => write!(f, "websocket error: {e}"),
            SessionError::Timeout { timeout } => {
                write!(f, "recv timed out after {timeout:?}")
            }
            SessionError::Disconnected => write!(f, "connection closed by backend"),
            SessionError::Closed => write!(f, "session is closed"),
            SessionError::Decode(e) => write!(f, "malformed message: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(e) => Some(e),
            SessionError::Transport(e) => Some(e),
            SessionError::Decode(e) => Some(e),
            SessionError::Endpoint { .. }
            | SessionError::Timeout { .. }
            | SessionError::Disconnected
            | SessionError::Closed => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Io(e)
    }
}

impl From<DecodeError> for SessionError {
    fn from(e: DecodeError) -> Self {
        SessionError::Decode(e)
    }
}

impl From<tungstenite::Error> for SessionError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                SessionError::Disconnected
            }
            tungstenite::Error::Io(io) => SessionError::Io(io),
            other => SessionError::Transport(other),
        }
    }
}

/// A message-oriented push transport.
///
/// Read-only from the client's point of view: nothing is sent after the
/// connection is opened.
pub trait Feed {
    /// Block until the next data message arrives.
    ///
    /// `None` blocks indefinitely. Returns `SessionError::Timeout` if nothing
    /// arrives in time; control frames never surface here.
    fn recv(&mut self, timeout: Option<Duration>) -> Result<Inbound, SessionError>;

    /// Release the underlying connection. Must be safe to call more than once.
    fn close(&mut self);
}

/// WebSocket connection to the sensor backend (plain `ws://`).
///
/// Synchronous, single-threaded. Callers drive timing via `recv()`.
pub struct WsFeed {
    socket: WebSocket<TcpStream>,
    closed: bool,
}

impl WsFeed {
    /// Connect with the system default TCP timeout.
    pub fn connect(endpoint: &str) -> Result<Self, SessionError> {
        Self::open(endpoint, None)
    }

    /// Connect with an explicit timeout covering both TCP connect and the
    /// WebSocket handshake.
    pub fn connect_timeout(endpoint: &str, timeout: Duration) -> Result<Self, SessionError> {
        Self::open(endpoint, Some(timeout))
    }

    fn open(endpoint: &str, timeout: Option<Duration>) -> Result<Self, SessionError> {
        let (host, port) = parse_endpoint(endpoint)?;
        let stream = match timeout {
            None => TcpStream::connect((host.as_str(), port))?,
            Some(t) => connect_any(&host, port, t)?,
        };
        // Frames are latency-sensitive video; disable Nagle.
        let _ = stream.set_nodelay(true);
        stream.set_read_timeout(timeout.map(|t| t.max(MIN_TIMEOUT)))?;

        let (socket, response) = tungstenite::client(endpoint, stream).map_err(|e| match e {
            HandshakeError::Failure(err) => SessionError::from(err),
            // No session exists yet, so this is a failed open, not a recv timeout.
            HandshakeError::Interrupted(_) => SessionError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "websocket handshake timed out",
            )),
        })?;
        info!("connected to {endpoint} ({})", response.status());
        Ok(Self { socket, closed: false })
    }

    /// The peer address of the underlying TCP connection.
    pub fn peer_addr(&self) -> Result<SocketAddr, SessionError> {
        Ok(self.socket.get_ref().peer_addr()?)
    }
}

impl Feed for WsFeed {
    fn recv(&mut self, timeout: Option<Duration>) -> Result<Inbound, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.socket
            .get_ref()
            .set_read_timeout(timeout.map(|t| t.max(MIN_TIMEOUT)))?;
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => return Ok(Inbound::Text(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => return Ok(Inbound::Binary(data.to_vec())),
                Ok(Message::Close(frame)) => {
                    debug!("backend sent close: {frame:?}");
                    return Err(SessionError::Disconnected);
                }
                // Ping/pong and raw frames; pongs are queued by tungstenite.
                Ok(_) => continue,
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Err(SessionError::Timeout {
                        timeout: timeout.unwrap_or_default(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.socket.close(None) {
            debug!("close handshake skipped: {e}");
        }
        let _ = self.socket.flush();
        let _ = self.socket.get_ref().shutdown(Shutdown::Both);
        info!("connection released");
    }
}

impl Drop for WsFeed {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn parse_endpoint(endpoint: &str) -> Result<(String, u16), SessionError> {
    let bad = |reason: &str| SessionError::Endpoint {
        endpoint: endpoint.to_owned(),
        reason: reason.to_owned(),
    };
    let uri: Uri = endpoint.parse().map_err(|_| bad("not a URL"))?;
    match uri.scheme_str() {
        Some("ws") => {}
        Some("wss") => return Err(bad("TLS is not supported for the sensor stream")),
        _ => return Err(bad("scheme must be ws://")),
    }
    let host = uri.host().ok_or_else(|| bad("missing host"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']').to_owned();
    Ok((host, uri.port_u16().unwrap_or(80)))
}

/// Try each resolved address in turn with `timeout`; return the last error.
fn connect_any(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last = e,
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_default_port() {
        let (host, port) = parse_endpoint("ws://sensor.local/ws/video").unwrap();
        assert_eq!(host, "sensor.local");
        assert_eq!(port, 80);
    }

    #[test]
    fn endpoint_explicit_port() {
        let (host, port) = parse_endpoint(DEFAULT_ENDPOINT).unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 8000);
    }

    #[test]
    fn endpoint_ipv6() {
        let (host, port) = parse_endpoint("ws://[::1]:9000/ws").unwrap();
        assert_eq!(host, "::1");
        assert_eq!(port, 9000);
    }

    #[test]
    fn endpoint_rejects_other_schemes() {
        assert!(matches!(
            parse_endpoint("http://localhost:8000/"),
            Err(SessionError::Endpoint { .. })
        ));
        assert!(matches!(
            parse_endpoint("wss://localhost/"),
            Err(SessionError::Endpoint { .. })
        ));
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(SessionError::Endpoint { .. })
        ));
    }

    #[test]
    fn terminal_classification() {
        assert!(!SessionError::Timeout { timeout: Duration::from_secs(1) }.is_terminal());
        assert!(!SessionError::Decode(DecodeError::NotText).is_terminal());
        assert!(SessionError::Disconnected.is_terminal());
        assert!(SessionError::Closed.is_terminal());
    }

    #[test]
    fn closed_socket_maps_to_disconnected() {
        assert!(matches!(
            SessionError::from(tungstenite::Error::ConnectionClosed),
            SessionError::Disconnected
        ));
    }
}
