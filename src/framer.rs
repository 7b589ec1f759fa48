//! Record header framing.
//!
//! Builds and parses the wire-format record headers:
//!
//! - TLS: `type(1) || version(2) || length(2)`
//! - DTLS: `type(1) || version(2) || epoch(2) || sequence(6) || length(2)`
//! - SSLv2-compatible short ClientHello: `msb-set-length(1) || length(1)`,
//!   accepted only when a ClientHello is expected on a stream transport.

use log::debug;
use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::error::Error;
use crate::types::{ContentType, ProtocolVersion, Sequence};

/// TLS record header length.
pub const TLS_HEADER_LEN: usize = 5;

/// DTLS record header length.
pub const DTLS_HEADER_LEN: usize = 13;

/// SSLv2-compatible short header length.
pub const SSL2_HEADER_LEN: usize = 2;

/// Parse a big-endian 48-bit integer.
pub(crate) fn be_u48(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, bytes) = take(6usize)(input)?;
    let mut value = 0u64;
    for byte in bytes {
        value = (value << 8) | *byte as u64;
    }
    Ok((input, value))
}

/// Everything the parser needs to know about the session to validate a
/// header.
#[derive(Debug, Clone, Copy)]
pub struct HeaderContext {
    /// Datagram transport?
    pub dtls: bool,
    /// The negotiated protocol version; `None` until the first hello
    /// exchange settles it.
    pub negotiated: Option<ProtocolVersion>,
    /// Whether the caller currently expects a ClientHello. Gates the
    /// SSLv2-compatible short form.
    pub expect_client_hello: bool,
    /// Enforce the exact negotiated version on non-hello records.
    pub strict_version_check: bool,
    /// Largest acceptable ciphertext length.
    pub max_ciphertext_len: usize,
}

/// A parsed (or to-be-written) record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// The content type of this record.
    pub content_type: ContentType,
    /// The protocol version advertised on the wire.
    pub version: ProtocolVersion,
    /// The epoch and sequence number. Only on the wire for DTLS.
    pub sequence: Sequence,
    /// The length of the fragment that follows.
    pub length: u16,
    /// Whether this was the SSLv2-compatible short form.
    pub ssl2: bool,
}

impl RecordHeader {
    /// Header size on the wire for the given transport kind.
    pub fn header_len(dtls: bool) -> usize {
        if dtls {
            DTLS_HEADER_LEN
        } else {
            TLS_HEADER_LEN
        }
    }

    /// Build a header for an outbound record.
    pub fn new(
        content_type: ContentType,
        version: ProtocolVersion,
        sequence: Sequence,
        length: u16,
    ) -> Self {
        Self {
            content_type,
            version,
            sequence,
            length,
            ssl2: false,
        }
    }

    /// Serialize this header into the output buffer.
    ///
    /// The SSLv2 short form is receive-only and is never written.
    pub fn serialize(&self, dtls: bool, output: &mut Buf) {
        debug_assert!(!self.ssl2);
        output.push(self.content_type.as_u8());
        self.version.serialize(output);
        if dtls {
            output.extend_from_slice(&self.sequence.epoch.to_be_bytes());
            output.extend_from_slice(&self.sequence.sequence_number.to_be_bytes()[2..]);
        }
        output.extend_from_slice(&self.length.to_be_bytes());
    }

    /// Parse and validate a header from `input`.
    ///
    /// `input` must hold exactly `header_len(ctx.dtls)` bytes. When the
    /// SSLv2 short form applies, the bytes past the two-byte header are
    /// already fragment data; the caller accounts for them via
    /// [`RecordHeader::consumed_body_len`].
    pub fn parse(input: &[u8], ctx: &HeaderContext) -> Result<RecordHeader, Error> {
        // SSLv2-compatible ClientHello: a set high bit in the first byte,
        // only on a stream transport, only while a ClientHello is expected.
        if !ctx.dtls && ctx.expect_client_hello && input.first().is_some_and(|b| b & 0x80 != 0) {
            return Self::parse_ssl2(input, ctx);
        }

        let (rest, content_type) =
            ContentType::parse(input).map_err(|_| Error::UnexpectedPacketLength)?;
        let (rest, version) =
            ProtocolVersion::parse(rest).map_err(|_| Error::UnexpectedPacketLength)?;

        check_version(version, ctx)?;

        let (rest, sequence) = if ctx.dtls {
            let (rest, epoch) = be_u16::<_, nom::error::Error<&[u8]>>(rest)
                .map_err(|_| Error::UnexpectedPacketLength)?;
            let (rest, sequence_number) =
                be_u48(rest).map_err(|_| Error::UnexpectedPacketLength)?;
            (
                rest,
                Sequence {
                    epoch,
                    sequence_number,
                },
            )
        } else {
            (rest, Sequence::default())
        };

        let (_, length) = be_u16::<_, nom::error::Error<&[u8]>>(rest)
            .map_err(|_| Error::UnexpectedPacketLength)?;

        if length as usize > ctx.max_ciphertext_len {
            return Err(Error::OversizedRecord(length));
        }

        Ok(RecordHeader {
            content_type,
            version,
            sequence,
            length,
            ssl2: false,
        })
    }

    fn parse_ssl2(input: &[u8], ctx: &HeaderContext) -> Result<RecordHeader, Error> {
        if input.len() < SSL2_HEADER_LEN {
            return Err(Error::UnexpectedPacketLength);
        }
        let length = (((input[0] & 0x7f) as u16) << 8) | input[1] as u16;

        // The caller already pulled enough bytes for a normal header; a
        // hello too short to cover them cannot be valid.
        if (length as usize) < TLS_HEADER_LEN - SSL2_HEADER_LEN {
            return Err(Error::UnexpectedPacketLength);
        }
        if length as usize > ctx.max_ciphertext_len {
            return Err(Error::OversizedRecord(length));
        }

        debug!("SSLv2-compatible ClientHello header, length {}", length);

        // The hello body carries the real version; the header has none.
        Ok(RecordHeader {
            content_type: ContentType::Handshake,
            version: ctx.negotiated.unwrap_or(ProtocolVersion::Tls1_0),
            sequence: Sequence::default(),
            length,
            ssl2: true,
        })
    }

    /// How many fragment bytes were already consumed out of the header
    /// read. Non-zero only for the SSLv2 short form, whose header is
    /// shorter than the bytes the caller pulled for a normal header.
    pub fn consumed_body_len(&self, dtls: bool) -> usize {
        if self.ssl2 {
            Self::header_len(dtls) - SSL2_HEADER_LEN
        } else {
            0
        }
    }

    /// Total bytes of fragment still to be read from the transport.
    pub fn remaining_body_len(&self, dtls: bool) -> usize {
        (self.length as usize).saturating_sub(self.consumed_body_len(dtls))
    }
}

fn check_version(version: ProtocolVersion, ctx: &HeaderContext) -> Result<(), Error> {
    match ctx.negotiated {
        // Before negotiation only the major byte is meaningful; hello
        // records may use a placeholder minor version.
        None => {
            let wanted = if ctx.dtls {
                ProtocolVersion::DTLS_MAJOR
            } else {
                ProtocolVersion::TLS_MAJOR
            };
            if version.major() != wanted {
                let (major, minor) = version.to_bytes();
                return Err(Error::UnsupportedVersion(major, minor));
            }
            Ok(())
        }
        Some(expected) if version != expected => {
            // The version field of protected records is unauthenticated,
            // so this check has limited value; it stays behind a policy
            // switch.
            if ctx.strict_version_check {
                Err(Error::BadProtocolVersion(expected, version))
            } else {
                debug!("Ignoring record version {} (negotiated {})", version, expected);
                Ok(())
            }
        }
        Some(_) => Ok(()),
    }
}
