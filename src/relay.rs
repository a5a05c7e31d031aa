//! Bidirectional byte relay between the upgraded WebSocket peer and the
//! destination TCP connection.
//!
//! Both directions run concurrently and are coupled only by the session
//! lifecycle: when either side closes or errors, the `select!` drops the
//! other direction and both transports are torn down in the same step. Bytes
//! are copied verbatim; nothing is buffered across messages.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Error as TungsteniteError, Message, error::ProtocolError},
};
use tracing::{debug, error, info, warn};

pub const BUFFER_SIZE: usize = 8192;

/// Runs the relay until either peer terminates. Consumes both transports;
/// dropping the halves on exit closes whichever side is still open, so
/// teardown is idempotent regardless of which peer went first.
pub async fn run<S>(websocket: WebSocketStream<S>, destination: TcpStream) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (mut tcp_reader, mut tcp_writer) = destination.into_split();

    let ws_to_tcp = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    debug!(bytes = data.len(), "Forwarding data from WebSocket to destination");
                    if let Err(e) = tcp_writer.write_all(&data).await {
                        // Destination already gone; drop the bytes and let
                        // teardown close the WebSocket side.
                        debug!(error = %e, bytes = data.len(), "Destination write failed");
                        break;
                    }
                }
                Ok(Message::Text(_)) => {
                    warn!("Dropping text message (binary only)");
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket connection closed");
                    break;
                }
                Err(e) => {
                    match e {
                        TungsteniteError::ConnectionClosed
                        | TungsteniteError::Protocol(ProtocolError::ResetWithoutClosingHandshake) =>
                        {
                            debug!("Client disconnected: {e}");
                        }
                        _ => {
                            error!("WebSocket error: {e}");
                        }
                    }
                    break;
                }
                _ => {}
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    let tcp_to_ws = async {
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            match tcp_reader.read(&mut buffer).await {
                Ok(0) => {
                    info!("Destination connection closed");
                    break;
                }
                Ok(n) => {
                    let data = &buffer[..n];
                    debug!(bytes = n, "Forwarding data from destination to WebSocket");
                    if let Err(e) = ws_sender.send(Message::Binary(data.to_vec().into())).await {
                        error!(error = %e, bytes = data.len(), "Failed to send WebSocket message");
                        return Err(e).context("Failed to send destination data via WebSocket");
                    }
                }
                Err(e) => {
                    error!("Failed to read from destination: {e}");
                    break;
                }
            }
        }
        Ok(())
    };

    tokio::select! {
        result = ws_to_tcp => result?,
        result = tcp_to_ws => result?,
    }

    info!("Relay closed");
    Ok(())
}
