//! Subscription link generation.
//!
//! Clients import the gateway by fetching a base64-encoded `vless://` URL
//! that names the credential, the public host, and the fixed 443/TLS/ws
//! scheme the platform fronts the gateway with.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::auth::Credential;

/// Builds the plain connection URL for a gateway reachable at `host`.
#[must_use]
pub fn connection_link(credential: &Credential, host: &str, ws_path: &str) -> String {
    let encoded_path = ws_path.replace('/', "%2F");
    format!(
        "vless://{uuid}@{host}:443?encryption=none&security=tls&sni={host}&type=ws&host={host}&path={encoded_path}#{host}",
        uuid = credential.to_uuid_string(),
    )
}

/// The base64 form served by the subscription endpoint.
#[must_use]
pub fn subscription_body(credential: &Credential, host: &str, ws_path: &str) -> String {
    STANDARD.encode(connection_link(credential, host, ws_path))
}
