//! HTTP facade and connection entry point.
//!
//! The gateway owns the listener. Every accepted connection is served as
//! HTTP/1.1: ordinary requests are routed to the decoy endpoints, and
//! WebSocket upgrade requests are screened by the gatekeeper. A permitted
//! upgrade completes the RFC 6455 handshake and hands the raw upgraded byte
//! stream to a [`TunnelSession`]; a refused one is answered with the decoy
//! 404 and `Connection: close` so the socket dies before any tunnel protocol
//! bytes are read.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{
    CONNECTION, CONTENT_TYPE, HOST, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE,
};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::decoy;
use crate::gate;
use crate::session::TunnelSession;
use crate::subscribe;

/// Accept loop: one task per connection, sessions isolated from each other.
pub async fn serve(listener: TcpListener, config: Arc<Config>) -> Result<()> {
    while let Ok((stream, client_addr)) = listener.accept().await {
        let config = config.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, config).await {
                error!(client_addr = %client_addr, error = %e, "Connection failed");
            }
        });
    }

    Ok(())
}

#[tracing::instrument(skip(stream, config), fields(client_addr = %client_addr))]
async fn handle_connection(
    stream: TcpStream,
    client_addr: SocketAddr,
    config: Arc<Config>,
) -> Result<()> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request| {
        let config = config.clone();
        async move { Ok::<_, Infallible>(handle_request(request, &config, client_addr)) }
    });

    hyper::server::conn::http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .context("Failed to serve HTTP connection")?;
    Ok(())
}

fn handle_request(
    mut request: Request<Incoming>,
    config: &Arc<Config>,
    client_addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let path = request.uri().path().to_string();

    if gate::is_websocket_upgrade(&request) {
        if !gate::upgrade_permitted(&path, &config.ws_path) {
            debug!(path = %path, "Refused upgrade on unrecognized path");
            return refuse_upgrade();
        }
        return accept_upgrade(&mut request, config.clone(), client_addr);
    }

    match (request.method(), path.as_str()) {
        (&Method::GET, "/") => html_response(decoy::DASHBOARD_HTML),
        (&Method::GET, "/healthz") => json_response(StatusCode::OK, decoy::health_body()),
        (&Method::GET, path) if path == config.sub_path => {
            subscription_response(&request, config)
        }
        _ => json_response(StatusCode::NOT_FOUND, decoy::not_found_body()),
    }
}

/// Completes the WebSocket handshake and spawns the tunnel session over the
/// upgraded byte stream.
fn accept_upgrade(
    request: &mut Request<Incoming>,
    config: Arc<Config>,
    client_addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let Some(key) = request.headers().get(SEC_WEBSOCKET_KEY) else {
        return refuse_upgrade();
    };
    let accept_key = derive_accept_key(key.as_bytes());

    let client_ip = original_client_ip(request, client_addr);
    let on_upgrade = hyper::upgrade::on(request);

    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let websocket =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                info!(client_ip = %client_ip, "Tunnel transport established");

                if let Err(e) = TunnelSession::new(websocket, config).run().await {
                    debug!(client_ip = %client_ip, error = %e, "Tunnel session ended");
                }
            }
            Err(e) => {
                debug!(client_ip = %client_ip, error = %e, "Upgrade failed");
            }
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(
        SEC_WEBSOCKET_ACCEPT,
        HeaderValue::from_str(&accept_key).expect("derived accept key is a valid header value"),
    );
    response
}

/// Refusal is indistinguishable from an unknown API path, and the connection
/// is closed in the same response.
fn refuse_upgrade() -> Response<Full<Bytes>> {
    let mut response = json_response(StatusCode::NOT_FOUND, decoy::not_found_body());
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

fn subscription_response(request: &Request<Incoming>, config: &Config) -> Response<Full<Bytes>> {
    // Configured public host wins; otherwise fall back to the Host header the
    // platform routed this request with.
    let host = config.public_host.clone().or_else(|| {
        request
            .headers()
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .and_then(|host| host.split(':').next())
            .filter(|host| !host.is_empty())
            .map(str::to_string)
    });

    match host {
        Some(host) => text_response(subscribe::subscription_body(
            &config.credential,
            &host,
            &config.ws_path,
        )),
        None => json_response(StatusCode::NOT_FOUND, decoy::not_found_body()),
    }
}

/// Leftmost X-Forwarded-For entry when the platform proxy supplies one,
/// otherwise the direct peer address.
fn original_client_ip(request: &Request<Incoming>, client_addr: SocketAddr) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| client_addr.to_string())
}

fn html_response(body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn text_response(body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
