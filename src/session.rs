//! Per-connection tunnel session.
//!
//! A session owns the upgraded WebSocket transport and moves through a strict
//! forward-only state machine:
//!
//! ```text
//! AwaitingHeader -> Connecting -> Relaying -> Closed
//!        \______________\__________________-> Closed   (on any failure)
//! ```
//!
//! Only the very first binary frame is header-bearing; every later frame is
//! raw payload for the lifetime of the session. Any failure before `Relaying`
//! closes the transport silently — no diagnostic bytes ever reach the remote
//! peer, so the gateway cannot be used as a validation oracle.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};
use tracing::{debug, info};

use crate::config::Config;
use crate::protocol::{self, HeaderError, MIN_HEADER_LEN};
use crate::relay;

/// Bound on the destination dial; a slow dial is a failed dial.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("credential mismatch")]
    CredentialMismatch,

    #[error("transport ended before a header frame arrived")]
    TransportClosed,

    #[error("first frame was not binary")]
    NonBinaryHeaderFrame,

    #[error("failed to dial {target}: {source}")]
    DialFailure {
        target: String,
        source: std::io::Error,
    },

    #[error("dial to {target} timed out")]
    DialTimeout { target: String },

    #[error("destination write failed: {0}")]
    Destination(std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHeader,
    Connecting,
    Relaying,
    Closed,
}

pub struct TunnelSession<S> {
    transport: WebSocketStream<S>,
    config: Arc<Config>,
    state: SessionState,
}

impl<S> TunnelSession<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(transport: WebSocketStream<S>, config: Arc<Config>) -> Self {
        Self {
            transport,
            config,
            state: SessionState::AwaitingHeader,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to completion. Consumes the session; both peers are
    /// closed by the time this returns, whichever side terminated first.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let destination = match self.establish().await {
            Ok(destination) => destination,
            Err(e) => {
                self.state = SessionState::Closed;
                // Silent termination: a close frame, never a reason.
                let _ = self.transport.close(None).await;
                return Err(e);
            }
        };

        self.state = SessionState::Relaying;
        let relayed = relay::run(self.transport, destination).await;
        self.state = SessionState::Closed;
        relayed.map_err(|e| {
            SessionError::Destination(std::io::Error::other(format!("relay failed: {e}")))
        })
    }

    /// `AwaitingHeader` and `Connecting`: reads the header frame, validates
    /// the credential, parses the header, dials, acknowledges, and forwards
    /// the first frame's residual payload.
    async fn establish(&mut self) -> Result<TcpStream, SessionError> {
        let frame = self.read_header_frame().await?;

        if frame.len() < MIN_HEADER_LEN {
            return Err(HeaderError::TooShort.into());
        }
        let presented: [u8; protocol::CREDENTIAL_LEN] = frame[1..1 + protocol::CREDENTIAL_LEN]
            .try_into()
            .expect("slice of checked length");
        if !self.config.credential.matches(&presented) {
            return Err(SessionError::CredentialMismatch);
        }

        let header = protocol::parse_header(&frame)?;
        self.state = SessionState::Connecting;

        // The override replaces the host only; the parsed port always wins.
        let host = match &self.config.proxy_host {
            Some(override_host) => override_host.clone(),
            None => header.address.to_string(),
        };
        let port = header.port;

        debug!(target_host = %host, target_port = port, "Attempting to connect to destination");
        let mut destination = match timeout(DIAL_TIMEOUT, TcpStream::connect((host.as_str(), port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(SessionError::DialFailure {
                    target: format!("{host}:{port}"),
                    source,
                });
            }
            Err(_) => {
                return Err(SessionError::DialTimeout {
                    target: format!("{host}:{port}"),
                });
            }
        };
        info!(target_host = %host, target_port = port, "Connected to destination");

        // Ack first, before any destination-originated bytes can flow.
        self.transport
            .send(Message::Binary(
                protocol::encode_ack(header.version).to_vec().into(),
            ))
            .await?;

        // Everything after the preamble in the first frame is application
        // payload and belongs to the destination.
        let residual = &frame[header.payload_offset..];
        if !residual.is_empty() {
            destination
                .write_all(residual)
                .await
                .map_err(SessionError::Destination)?;
        }

        Ok(destination)
    }

    /// Waits for the first data-bearing frame. Ping/pong frames are transport
    /// noise and do not count as the header.
    async fn read_header_frame(&mut self) -> Result<Vec<u8>, SessionError> {
        while let Some(msg) = self.transport.next().await {
            match msg? {
                Message::Binary(data) => return Ok(data.to_vec()),
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => return Err(SessionError::TransportClosed),
                _ => return Err(SessionError::NonBinaryHeaderFrame),
            }
        }
        Err(SessionError::TransportClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;
    use tokio::time::timeout;
    use tokio_tungstenite::{accept_async, connect_async};

    const TEST_TIMEOUT: Duration = Duration::from_secs(1);
    const UUID: &str = "de305d54-75b4-431b-adb2-eb6b9e546014";

    fn test_config(proxy_host: Option<&str>) -> Arc<Config> {
        let raw = RawConfig {
            uuid: UUID.to_string(),
            proxy_host: proxy_host.map(str::to_string),
            ..RawConfig::default()
        };
        Arc::new(Config::from_raw(raw).unwrap())
    }

    fn header_frame(uuid: &str, command: u8, ipv4: [u8; 4], port: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![1u8];
        frame.extend_from_slice(uuid::Uuid::parse_str(uuid).unwrap().as_bytes());
        frame.push(0); // no addons
        frame.push(command);
        frame.extend_from_slice(&port.to_be_bytes());
        frame.push(1); // IPv4
        frame.extend_from_slice(&ipv4);
        frame.extend_from_slice(payload);
        frame
    }

    /// Starts a session endpoint on a free port; each accepted connection
    /// becomes a `TunnelSession` with the given config.
    async fn start_session_server(config: Arc<Config>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = config.clone();
                tokio::spawn(async move {
                    let websocket = accept_async(stream).await.unwrap();
                    let _ = TunnelSession::new(websocket, config).run().await;
                });
            }
        });

        port
    }

    /// TCP server that records everything it receives and echoes a banner.
    async fn start_capturing_server() -> (u16, Arc<Mutex<Vec<u8>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let received = received_clone.clone();
                tokio::spawn(async move {
                    let mut buffer = [0u8; 4096];
                    while let Ok(n) = stream.read(&mut buffer).await {
                        if n == 0 {
                            break;
                        }
                        received.lock().await.extend_from_slice(&buffer[..n]);
                        let _ = stream.write_all(b"banner").await;
                    }
                });
            }
        });

        (port, received)
    }

    async fn connect(port: u16) -> WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>> {
        let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}/"))
            .await
            .unwrap();
        ws
    }

    #[tokio::test]
    async fn new_session_awaits_header() {
        let session_port = start_session_server(test_config(None)).await;
        let ws = connect(session_port).await;

        let session = TunnelSession::new(ws, test_config(None));
        assert_eq!(session.state(), SessionState::AwaitingHeader);
    }

    #[tokio::test]
    async fn ack_precedes_destination_bytes_and_payload_is_forwarded() {
        let (dest_port, received) = start_capturing_server().await;
        let session_port = start_session_server(test_config(None)).await;

        let mut ws = connect(session_port).await;
        let frame = header_frame(UUID, 1, [127, 0, 0, 1], dest_port, b"GET / HTTP/1.1\r\n");
        ws.send(Message::Binary(frame.into())).await.unwrap();

        let first = timeout(TEST_TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(first, Message::Binary(vec![1, 0].into()));

        let second = timeout(TEST_TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(second, Message::Binary(b"banner".to_vec().into()));

        assert_eq!(*received.lock().await, b"GET / HTTP/1.1\r\n");
    }

    #[tokio::test]
    async fn later_frames_are_payload_even_if_header_shaped() {
        let (dest_port, received) = start_capturing_server().await;
        let session_port = start_session_server(test_config(None)).await;

        let mut ws = connect(session_port).await;
        ws.send(Message::Binary(
            header_frame(UUID, 1, [127, 0, 0, 1], dest_port, b"").into(),
        ))
        .await
        .unwrap();
        let ack = timeout(TEST_TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(ack, Message::Binary(vec![1, 0].into()));

        // A second frame that happens to look like a header must be relayed
        // verbatim, not re-parsed.
        let header_shaped = header_frame(UUID, 1, [9, 9, 9, 9], 9, b"");
        ws.send(Message::Binary(header_shaped.clone().into()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*received.lock().await, header_shaped);
    }

    #[tokio::test]
    async fn credential_mismatch_closes_without_sending_bytes() {
        let (dest_port, received) = start_capturing_server().await;
        let session_port = start_session_server(test_config(None)).await;

        let mut ws = connect(session_port).await;
        let frame = header_frame(
            "00000000-0000-0000-0000-000000000001",
            1,
            [127, 0, 0, 1],
            dest_port,
            b"secret",
        );
        ws.send(Message::Binary(frame.into())).await.unwrap();

        // The only thing the peer may observe is the close handshake.
        let next = timeout(TEST_TIMEOUT, ws.next()).await.unwrap();
        assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
        assert!(received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unsupported_command_terminates_session() {
        let session_port = start_session_server(test_config(None)).await;

        let mut ws = connect(session_port).await;
        let frame = header_frame(UUID, 2, [127, 0, 0, 1], 80, b"");
        ws.send(Message::Binary(frame.into())).await.unwrap();

        let next = timeout(TEST_TIMEOUT, ws.next()).await.unwrap();
        assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    }

    #[tokio::test]
    async fn short_first_frame_terminates_session() {
        let session_port = start_session_server(test_config(None)).await;

        let mut ws = connect(session_port).await;
        ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();

        let next = timeout(TEST_TIMEOUT, ws.next()).await.unwrap();
        assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    }

    #[tokio::test]
    async fn dial_failure_terminates_without_response_frame() {
        // Bind-then-drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = listener.local_addr().unwrap().port();
        drop(listener);

        let session_port = start_session_server(test_config(None)).await;

        let mut ws = connect(session_port).await;
        let frame = header_frame(UUID, 1, [127, 0, 0, 1], dead_port, b"");
        ws.send(Message::Binary(frame.into())).await.unwrap();

        let next = timeout(Duration::from_secs(5), ws.next()).await.unwrap();
        assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    }

    #[tokio::test]
    async fn override_host_replaces_host_but_keeps_port() {
        let (dest_port, received) = start_capturing_server().await;
        // Header points somewhere unroutable; the override redirects the host
        // while the parsed port still selects our capturing server.
        let session_port = start_session_server(test_config(Some("127.0.0.1"))).await;

        let mut ws = connect(session_port).await;
        let frame = header_frame(UUID, 1, [203, 0, 113, 9], dest_port, b"steered");
        ws.send(Message::Binary(frame.into())).await.unwrap();

        let ack = timeout(TEST_TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(ack, Message::Binary(vec![1, 0].into()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*received.lock().await, b"steered");
    }
}
