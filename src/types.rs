//! Shared record-layer types.
//!
//! These types represent the wire-level protocol elements that are common
//! to the TLS and DTLS record layers.

use std::cmp::Ordering;
use std::fmt;

use nom::number::complete::be_u8;
use nom::IResult;

// ============================================================================
// Content Type
// ============================================================================

/// Record content types.
///
/// Identifies the type of data in a record. The values are the same for
/// TLS and DTLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Change Cipher Spec.
    ChangeCipherSpec,
    /// Alert message.
    Alert,
    /// Handshake message.
    Handshake,
    /// Application data.
    ApplicationData,
    /// Heartbeat message (RFC 6520).
    Heartbeat,
    /// Unknown content type.
    Unknown(u8),
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl ContentType {
    /// Convert a u8 value to a `ContentType`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            24 => ContentType::Heartbeat,
            _ => ContentType::Unknown(value),
        }
    }

    /// Convert this `ContentType` to its u8 value.
    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Heartbeat => 24,
            ContentType::Unknown(value) => *value,
        }
    }

    /// Parse a `ContentType` from wire format.
    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }

    /// Whether a caller may wait for this content type via `recv`.
    ///
    /// Alerts and heartbeats are reacted to by the dispatcher and are never
    /// handed out as a requested stream.
    pub fn is_receivable(&self) -> bool {
        matches!(
            self,
            ContentType::Handshake | ContentType::ApplicationData | ContentType::ChangeCipherSpec
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::ChangeCipherSpec => write!(f, "change_cipher_spec"),
            ContentType::Alert => write!(f, "alert"),
            ContentType::Handshake => write!(f, "handshake"),
            ContentType::ApplicationData => write!(f, "application_data"),
            ContentType::Heartbeat => write!(f, "heartbeat"),
            ContentType::Unknown(value) => write!(f, "unknown({})", value),
        }
    }
}

// ============================================================================
// Protocol Version
// ============================================================================

/// Protocol versions understood by the record layer.
///
/// TLS versions use major 3; DTLS versions are the 1's complement encoding
/// with major 254.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// TLS 1.0 (3, 1).
    Tls1_0,
    /// TLS 1.1 (3, 2).
    Tls1_1,
    /// TLS 1.2 (3, 3).
    Tls1_2,
    /// DTLS 1.0 (254, 255).
    Dtls1_0,
    /// DTLS 1.2 (254, 253).
    Dtls1_2,
    /// Unknown version bytes.
    Unknown(u8, u8),
}

impl ProtocolVersion {
    /// TLS major version byte.
    pub const TLS_MAJOR: u8 = 3;
    /// DTLS major version byte.
    pub const DTLS_MAJOR: u8 = 254;

    /// Convert wire format (major, minor) bytes to a `ProtocolVersion`.
    pub fn from_bytes(major: u8, minor: u8) -> Self {
        match (major, minor) {
            (3, 1) => ProtocolVersion::Tls1_0,
            (3, 2) => ProtocolVersion::Tls1_1,
            (3, 3) => ProtocolVersion::Tls1_2,
            (254, 255) => ProtocolVersion::Dtls1_0,
            (254, 253) => ProtocolVersion::Dtls1_2,
            _ => ProtocolVersion::Unknown(major, minor),
        }
    }

    /// The wire format (major, minor) bytes of this version.
    pub fn to_bytes(&self) -> (u8, u8) {
        match self {
            ProtocolVersion::Tls1_0 => (3, 1),
            ProtocolVersion::Tls1_1 => (3, 2),
            ProtocolVersion::Tls1_2 => (3, 3),
            ProtocolVersion::Dtls1_0 => (254, 255),
            ProtocolVersion::Dtls1_2 => (254, 253),
            ProtocolVersion::Unknown(major, minor) => (*major, *minor),
        }
    }

    /// The major version byte.
    pub fn major(&self) -> u8 {
        self.to_bytes().0
    }

    /// Whether this is a datagram (DTLS) version.
    pub fn is_dtls(&self) -> bool {
        self.major() == Self::DTLS_MAJOR
    }

    /// Parse a `ProtocolVersion` from wire format.
    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, major) = be_u8(input)?;
        let (input, minor) = be_u8(input)?;
        Ok((input, Self::from_bytes(major, minor)))
    }

    /// Serialize this version to the output buffer.
    pub fn serialize(&self, output: &mut crate::buffer::Buf) {
        let (major, minor) = self.to_bytes();
        output.push(major);
        output.push(minor);
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Tls1_0 => write!(f, "TLS 1.0"),
            ProtocolVersion::Tls1_1 => write!(f, "TLS 1.1"),
            ProtocolVersion::Tls1_2 => write!(f, "TLS 1.2"),
            ProtocolVersion::Dtls1_0 => write!(f, "DTLS 1.0"),
            ProtocolVersion::Dtls1_2 => write!(f, "DTLS 1.2"),
            ProtocolVersion::Unknown(major, minor) => write!(f, "unknown({}, {})", major, minor),
        }
    }
}

// ============================================================================
// Handshake Type
// ============================================================================

/// Handshake message types the record layer inspects.
///
/// The dispatcher only looks at the first byte of a handshake fragment to
/// recognize rehandshake signals; full handshake parsing belongs to the
/// handshake layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    /// Server-initiated rehandshake hint.
    HelloRequest,
    /// Client hello.
    ClientHello,
    /// Server hello.
    ServerHello,
    /// Anything else.
    Unknown(u8),
}

impl HandshakeType {
    /// Convert a u8 value to a `HandshakeType`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            _ => HandshakeType::Unknown(value),
        }
    }
}

// ============================================================================
// Sequence
// ============================================================================

/// Record sequence number (epoch + sequence).
///
/// TLS leaves the epoch at 0; DTLS carries both fields in the record header
/// and uses them for replay protection and nonce construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sequence {
    /// The epoch (incremented on key change).
    pub epoch: u16,
    /// The sequence number within the epoch (u48 for DTLS).
    pub sequence_number: u64,
}

impl Sequence {
    /// Create a new sequence with the given epoch and sequence number 0.
    pub fn new(epoch: u16) -> Self {
        Self {
            epoch,
            sequence_number: 0,
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[epoch: {}, sequence_number: {}]",
            self.epoch, self.sequence_number,
        )
    }
}

impl Ord for Sequence {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.epoch < other.epoch {
            Ordering::Less
        } else if self.epoch > other.epoch {
            Ordering::Greater
        } else {
            self.sequence_number.cmp(&other.sequence_number)
        }
    }
}

impl PartialOrd for Sequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The role of the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting endpoint.
    Client,
    /// Accepting endpoint.
    Server,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_wire_values() {
        for value in [20u8, 21, 22, 23, 24, 99] {
            assert_eq!(ContentType::from_u8(value).as_u8(), value);
        }
        assert!(ContentType::ApplicationData.is_receivable());
        assert!(!ContentType::Alert.is_receivable());
        assert!(!ContentType::Heartbeat.is_receivable());
    }

    #[test]
    fn version_bytes() {
        assert_eq!(ProtocolVersion::Tls1_2.to_bytes(), (3, 3));
        assert_eq!(ProtocolVersion::Dtls1_2.to_bytes(), (254, 253));
        assert!(ProtocolVersion::Dtls1_0.is_dtls());
        assert!(!ProtocolVersion::Tls1_0.is_dtls());
        assert_eq!(ProtocolVersion::from_bytes(3, 3), ProtocolVersion::Tls1_2);
    }

    #[test]
    fn sequence_ordering() {
        let a = Sequence {
            epoch: 0,
            sequence_number: 500,
        };
        let b = Sequence {
            epoch: 1,
            sequence_number: 2,
        };
        assert!(a < b);
    }
}
