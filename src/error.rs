use thiserror::Error;

use crate::alert::AlertDescription;
use crate::types::{ContentType, ProtocolVersion};

/// Errors surfaced by the record layer.
///
/// The variants follow a coarse taxonomy: transient transport conditions
/// (always retryable), protocol violations (soft on DTLS, fatal on TLS),
/// resource exhaustion (always fatal), peer-signaled alerts, and
/// programming-contract violations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The transport cannot make progress right now. Retry the same call.
    #[error("Operation would block")]
    WouldBlock,

    /// The transport was interrupted. Retry the same call.
    #[error("Operation was interrupted")]
    Interrupted,

    /// The receive timeout expired before a full record arrived.
    #[error("Operation timed out")]
    Timedout,

    /// The transport failed in a non-retryable way.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Record failed to decrypt, authenticate, or decompress.
    ///
    /// Deliberately carries no detail: padding, MAC, tag, and length
    /// failures are indistinguishable to the peer.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// The encrypt pipeline failed.
    #[error("Encryption failed")]
    EncryptionFailed,

    /// A record of an unexpected content type arrived.
    #[error("Unexpected packet received")]
    UnexpectedPacket,

    /// The transport delivered fewer bytes than the record header promised.
    #[error("Unexpected packet length")]
    UnexpectedPacketLength,

    /// The record length field exceeds the negotiated maximum.
    #[error("Record payload too large: {0}")]
    OversizedRecord(u16),

    /// Outbound DTLS payload exceeds the path MTU.
    #[error("Packet too large for transport")]
    LargePacket,

    /// Too many consecutive empty records received.
    #[error("Too many empty records")]
    TooManyEmptyRecords,

    /// A sequence counter reached its maximum value.
    #[error("Record sequence number limit reached")]
    RecordLimitReached,

    /// The requested epoch is not in the retained window.
    #[error("Epoch {0} not found")]
    EpochNotFound(u16),

    /// A record advertised a version other than the negotiated one.
    #[error("Expected protocol version {0} but got: {1}")]
    BadProtocolVersion(ProtocolVersion, ProtocolVersion),

    /// A record advertised an unsupported protocol version.
    #[error("Unsupported protocol version {0}, {1}")]
    UnsupportedVersion(u8, u8),

    /// The peer sent a fatal alert. The session is dead and unresumable.
    #[error("Fatal alert received: {0}")]
    FatalAlertReceived(AlertDescription),

    /// The peer sent a non-fatal alert other than close_notify.
    #[error("Warning alert received: {0}")]
    WarningAlertReceived(AlertDescription),

    /// Application data arrived while a handshake message was expected.
    ///
    /// The data has been buffered; the caller decides how to handle the
    /// in-progress rehandshake.
    #[error("Application data received while expecting handshake data")]
    GotApplicationData,

    /// A ClientHello arrived outside a handshake; the peer wants to
    /// renegotiate. The hello has been buffered.
    #[error("Peer requested a rehandshake")]
    Rehandshake,

    /// The session has been invalidated; only an outbound alert is allowed.
    #[error("Session is invalid")]
    InvalidSession,

    /// The caller passed arguments that make no sense for the current state.
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),

    /// A contract violation inside the record layer, e.g. using an epoch
    /// whose keys were never installed. Not attributable to the peer.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// An internal invariant did not hold.
    #[error("Internal error: {0}")]
    InternalError(&'static str),

    /// Cipher or MAC setup failed (wrong key length, provider error).
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// A record carried a content type the caller cannot wait for.
    #[error("Content type {0} cannot be received directly")]
    NotReceivable(ContentType),
}

impl Error {
    /// Whether the caller should retry the same operation.
    ///
    /// Retryable errors never mutate committed cryptographic state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::WouldBlock | Error::Interrupted | Error::Timedout
        )
    }

    /// Whether this error invalidates the session on a reliable (TLS)
    /// transport. On DTLS only the always-fatal kinds apply; protocol
    /// violations are downgraded by the dispatcher before they get here.
    pub fn is_fatal(&self, dtls: bool) -> bool {
        match self {
            Error::WouldBlock | Error::Interrupted | Error::Timedout => false,
            Error::WarningAlertReceived(_) => false,
            Error::GotApplicationData | Error::Rehandshake => false,
            Error::TooManyEmptyRecords | Error::RecordLimitReached => true,
            Error::FatalAlertReceived(_) => true,
            Error::InvalidState(_) | Error::InternalError(_) => true,
            Error::DecryptionFailed
            | Error::UnexpectedPacket
            | Error::UnexpectedPacketLength
            | Error::OversizedRecord(_)
            | Error::BadProtocolVersion(..)
            | Error::UnsupportedVersion(..) => !dtls,
            _ => !dtls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(Error::WouldBlock.is_retryable());
        assert!(Error::Interrupted.is_retryable());
        assert!(Error::Timedout.is_retryable());
        assert!(!Error::DecryptionFailed.is_retryable());
    }

    #[test]
    fn fatality_depends_on_transport() {
        assert!(Error::DecryptionFailed.is_fatal(false));
        assert!(!Error::DecryptionFailed.is_fatal(true));
        // Resource exhaustion is fatal on both.
        assert!(Error::RecordLimitReached.is_fatal(true));
        assert!(Error::TooManyEmptyRecords.is_fatal(true));
    }
}
