//! Identity credential validation.
//!
//! Every session's first frame carries a 16-byte credential that must match
//! the process-wide secret. The secret is derived once at startup from a
//! human-readable UUID identifier; comparison is constant-time so the check
//! cannot be used as a timing oracle.

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::protocol::CREDENTIAL_LEN;

/// The process-wide shared secret proving a client may use the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential([u8; CREDENTIAL_LEN]);

impl Credential {
    /// Derives the credential from a UUID identifier. Separator hyphens are
    /// stripped and hex case is normalized by the parser, so
    /// `DEADBEEF-0011-...` and `deadbeef0011...` name the same credential.
    pub fn from_identifier(identifier: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(identifier.trim())
            .with_context(|| format!("invalid credential identifier: {identifier}"))?;
        Ok(Self(*uuid.as_bytes()))
    }

    /// Compares the presented bytes against the configured secret without
    /// short-circuiting on the first differing byte.
    #[must_use]
    pub fn matches(&self, presented: &[u8; CREDENTIAL_LEN]) -> bool {
        self.0
            .iter()
            .zip(presented.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Canonical hyphenated form, used when building the subscription link.
    #[must_use]
    pub fn to_uuid_string(&self) -> String {
        Uuid::from_bytes(self.0).to_string()
    }
}
