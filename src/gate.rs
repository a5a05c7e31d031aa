//! Upgrade gatekeeper.
//!
//! The only external-facing disguise boundary: a connection becomes tunnel
//! traffic solely when it is a WebSocket upgrade request whose path equals
//! the configured upgrade path exactly. Everything else belongs to the decoy
//! facade.

use hyper::Request;
use hyper::header::{CONNECTION, UPGRADE};

/// Exact-match path check; no prefix or wildcard matching.
#[must_use]
pub fn upgrade_permitted(request_path: &str, configured_path: &str) -> bool {
    request_path == configured_path
}

/// Whether the request asks for a WebSocket upgrade at all.
#[must_use]
pub fn is_websocket_upgrade<B>(request: &Request<B>) -> bool {
    let upgrade_is_websocket = request
        .headers()
        .get(UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));

    let connection_requests_upgrade = request
        .headers()
        .get(CONNECTION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });

    upgrade_is_websocket && connection_requests_upgrade
}
