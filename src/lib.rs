//! VLESS-over-WebSocket Tunneling Gateway
//!
//! Accepts WebSocket connections on a single configured path, authenticates
//! the first frame's embedded credential, parses the binary request header,
//! dials the requested TCP destination, and relays bytes both ways. All other
//! HTTP traffic is answered by a decoy status page and a bland JSON API.

pub mod auth;
pub mod config;
pub mod decoy;
pub mod gate;
pub mod gateway;
pub mod keepalive;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod subscribe;

// Re-export commonly used types and functions
pub use auth::Credential;
pub use config::Config;
pub use gateway::serve;
pub use protocol::{Address, HeaderError, RequestHeader, encode_ack, parse_header};
pub use session::{SessionError, SessionState, TunnelSession};
