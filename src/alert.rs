//! Alert message codec.
//!
//! An alert body is exactly two bytes: level and description. The record
//! layer decodes alerts itself because they change session state (EOF,
//! invalidation); everything else about alert policy belongs to the caller.

use std::fmt;

use crate::buffer::Buf;
use crate::error::Error;

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// Warning. The connection may continue.
    Warning,
    /// Fatal. The connection must be torn down.
    Fatal,
    /// Unknown level byte.
    Unknown(u8),
}

impl AlertLevel {
    /// Convert a u8 value to an `AlertLevel`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            _ => AlertLevel::Unknown(value),
        }
    }

    /// Convert this `AlertLevel` to its u8 value.
    pub fn as_u8(&self) -> u8 {
        match self {
            AlertLevel::Warning => 1,
            AlertLevel::Fatal => 2,
            AlertLevel::Unknown(value) => *value,
        }
    }
}

/// Alert descriptions the record layer knows about.
///
/// Unlisted values round-trip through `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDescription {
    /// Clean shutdown signal.
    CloseNotify,
    /// An inappropriate message was received.
    UnexpectedMessage,
    /// Record arrived with a bad MAC.
    BadRecordMac,
    /// Record exceeded the length bounds.
    RecordOverflow,
    /// Decompression produced invalid or oversized output.
    DecompressionFailure,
    /// Handshake could not be completed.
    HandshakeFailure,
    /// A field was out of range or inconsistent.
    IllegalParameter,
    /// The advertised protocol version is not supported.
    ProtocolVersion,
    /// Local processing error.
    InternalError,
    /// Renegotiation refused.
    NoRenegotiation,
    /// Anything else.
    Unknown(u8),
}

impl AlertDescription {
    /// Convert a u8 value to an `AlertDescription`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            22 => AlertDescription::RecordOverflow,
            30 => AlertDescription::DecompressionFailure,
            40 => AlertDescription::HandshakeFailure,
            47 => AlertDescription::IllegalParameter,
            70 => AlertDescription::ProtocolVersion,
            80 => AlertDescription::InternalError,
            100 => AlertDescription::NoRenegotiation,
            _ => AlertDescription::Unknown(value),
        }
    }

    /// Convert this `AlertDescription` to its u8 value.
    pub fn as_u8(&self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::RecordOverflow => 22,
            AlertDescription::DecompressionFailure => 30,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::IllegalParameter => 47,
            AlertDescription::ProtocolVersion => 70,
            AlertDescription::InternalError => 80,
            AlertDescription::NoRenegotiation => 100,
            AlertDescription::Unknown(value) => *value,
        }
    }
}

impl fmt::Display for AlertDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A decoded alert message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// Severity.
    pub level: AlertLevel,
    /// What happened.
    pub description: AlertDescription,
}

impl Alert {
    /// Wire length of an alert body.
    pub const LEN: usize = 2;

    /// Decode an alert from a decrypted record fragment.
    ///
    /// The fragment must be exactly two bytes.
    pub fn parse(input: &[u8]) -> Result<Alert, Error> {
        if input.len() != Self::LEN {
            return Err(Error::UnexpectedPacketLength);
        }
        Ok(Alert {
            level: AlertLevel::from_u8(input[0]),
            description: AlertDescription::from_u8(input[1]),
        })
    }

    /// Serialize this alert into the output buffer.
    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.level.as_u8());
        output.push(self.description.as_u8());
    }

    /// Whether this alert is a clean shutdown signal.
    pub fn is_close_notify(&self) -> bool {
        self.description == AlertDescription::CloseNotify
    }
}
