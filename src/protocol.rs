//! VLESS request header codec.
//!
//! The first binary frame of every tunnel session carries a request preamble
//! followed immediately by application payload:
//!
//! ```text
//! | version | credential | addon len N | addons | cmd | port  | atyp | address  | payload |
//! | u8      | 16 bytes   | u8          | N      | u8  | u16be | u8   | variable | rest    |
//! ```
//!
//! Address encodings (`atyp`): 1 = IPv4 (4 raw bytes), 2 = domain name
//! (1 length byte + UTF-8 name), 3 = IPv6 (16 raw bytes). Addon bytes are
//! skipped, never interpreted.
//!
//! The parser computes the exact offset where payload begins so callers can
//! slice the remainder of the frame without re-scanning.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

/// Size of the credential carried after the version byte.
pub const CREDENTIAL_LEN: usize = 16;

/// Smallest frame that can hold a complete preamble.
pub const MIN_HEADER_LEN: usize = 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("frame too short to contain a request header")]
    TooShort,

    #[error("unsupported command: {0} (stream/TCP only)")]
    UnsupportedCommand(u8),

    #[error("unsupported address kind: {0}")]
    UnsupportedAddressKind(u8),

    #[error("domain name is not valid UTF-8")]
    InvalidDomainName,
}

/// Request commands. Only stream (TCP) tunneling is supported; every other
/// command byte fails parsing with [`HeaderError::UnsupportedCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stream,
}

/// Destination address as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Domain(String),
    Ipv6(Ipv6Addr),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4(addr) => addr.fmt(f),
            Self::Domain(name) => f.write_str(name),
            // Eight uncompressed big-endian hextets, no `::` shortening.
            Self::Ipv6(addr) => {
                let segments = addr.segments();
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{segment:x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Parsed request preamble of a session's first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub version: u8,
    pub credential: [u8; CREDENTIAL_LEN],
    pub command: Command,
    pub port: u16,
    pub address: Address,
    /// Byte index into the original frame where application payload begins.
    pub payload_offset: usize,
}

/// Parses the request preamble from the first inbound frame.
///
/// The entire header must be present in `frame`; a header split across frames
/// is not supported and yields [`HeaderError::TooShort`]. Bytes at and after
/// the returned `payload_offset` are application payload bound for the
/// destination and must be forwarded untouched.
pub fn parse_header(frame: &[u8]) -> Result<RequestHeader, HeaderError> {
    if frame.len() < MIN_HEADER_LEN {
        return Err(HeaderError::TooShort);
    }

    let version = frame[0];

    let mut credential = [0u8; CREDENTIAL_LEN];
    credential.copy_from_slice(&frame[1..1 + CREDENTIAL_LEN]);

    let addon_len = frame[17] as usize;
    let command_idx = 18 + addon_len;

    // Everything past the addon region is variable; re-check length as the
    // cursor advances instead of guessing offsets.
    let command_byte = *frame.get(command_idx).ok_or(HeaderError::TooShort)?;
    if command_byte != 1 {
        return Err(HeaderError::UnsupportedCommand(command_byte));
    }

    let port_idx = command_idx + 1;
    let port_bytes: [u8; 2] = frame
        .get(port_idx..port_idx + 2)
        .ok_or(HeaderError::TooShort)?
        .try_into()
        .expect("slice of checked length 2");
    let port = u16::from_be_bytes(port_bytes);

    let kind_idx = port_idx + 2;
    let kind = *frame.get(kind_idx).ok_or(HeaderError::TooShort)?;
    let value_idx = kind_idx + 1;

    let (address, payload_offset) = match kind {
        1 => {
            let raw: [u8; 4] = frame
                .get(value_idx..value_idx + 4)
                .ok_or(HeaderError::TooShort)?
                .try_into()
                .expect("slice of checked length 4");
            (Address::Ipv4(Ipv4Addr::from(raw)), value_idx + 4)
        }
        2 => {
            let name_len = *frame.get(value_idx).ok_or(HeaderError::TooShort)? as usize;
            let name_idx = value_idx + 1;
            let raw = frame
                .get(name_idx..name_idx + name_len)
                .ok_or(HeaderError::TooShort)?;
            let name =
                String::from_utf8(raw.to_vec()).map_err(|_| HeaderError::InvalidDomainName)?;
            (Address::Domain(name), name_idx + name_len)
        }
        3 => {
            let raw: [u8; 16] = frame
                .get(value_idx..value_idx + 16)
                .ok_or(HeaderError::TooShort)?
                .try_into()
                .expect("slice of checked length 16");
            (Address::Ipv6(Ipv6Addr::from(raw)), value_idx + 16)
        }
        other => return Err(HeaderError::UnsupportedAddressKind(other)),
    };

    Ok(RequestHeader {
        version,
        credential,
        command: Command::Stream,
        port,
        address,
        payload_offset,
    })
}

/// Encodes the two-byte acknowledgement sent toward the upgraded peer after a
/// successful destination dial: the request version followed by a zero addon
/// count.
#[must_use]
pub fn encode_ack(version: u8) -> [u8; 2] {
    [version, 0x00]
}
