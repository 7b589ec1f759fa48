//! Cryptographic collaborator interfaces for the record layer.
//!
//! The record layer does not implement bulk ciphers or MACs itself; it
//! drives them through the small traits in this module. A default
//! implementation backed by RustCrypto lives in [`rust_crypto`], and a
//! process-wide provider registry in [`provider`].

use std::fmt;

use tinyvec::ArrayVec;
use zeroize::Zeroizing;

use crate::buffer::Buf;
use crate::types::{ContentType, ProtocolVersion, Sequence};

pub mod provider;
pub mod rust_crypto;

/// Explicit nonce length for AEAD records.
///
/// The explicit nonce is transmitted with each record.
pub const EXPLICIT_NONCE_LEN: usize = 8;

/// GCM authentication tag length.
pub const GCM_TAG_LEN: usize = 16;

/// Overhead per AEAD record (explicit nonce + tag).
pub const AEAD_OVERHEAD: usize = EXPLICIT_NONCE_LEN + GCM_TAG_LEN;

/// A MAC or AEAD tag, up to SHA-512 output size.
pub type MacTag = ArrayVec<[u8; 64]>;

// ============================================================================
// Nonce and AAD
// ============================================================================

/// Fixed IV portion for AEAD record protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv(pub [u8; 4]);

impl Iv {
    /// Wrap the 4-byte fixed IV handed over at key installation.
    pub fn new(iv: &[u8]) -> Result<Self, String> {
        let iv: [u8; 4] = iv
            .try_into()
            .map_err(|_| format!("fixed IV must be 4 bytes, got {}", iv.len()))?;
        Ok(Self(iv))
    }
}

/// Full AEAD nonce (fixed IV + explicit nonce).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(pub [u8; 12]);

impl Nonce {
    /// Combine the fixed IV with the per-record explicit nonce.
    pub fn new(iv: Iv, explicit_nonce: &[u8; EXPLICIT_NONCE_LEN]) -> Self {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&iv.0);
        nonce[4..].copy_from_slice(explicit_nonce);
        Self(nonce)
    }
}

/// Additional Authenticated Data for a protected record.
///
/// Binds the sequence number (epoch-folded for DTLS), content type,
/// protocol version and plaintext length:
/// `seq(8) || type(1) || version(2) || length(2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aad(pub ArrayVec<[u8; 13]>);

impl Aad {
    /// Build the AAD for a record.
    pub fn new(
        content_type: ContentType,
        version: ProtocolVersion,
        sequence: Sequence,
        length: u16,
        dtls: bool,
    ) -> Self {
        let mut aad = ArrayVec::new();
        aad.extend_from_slice(&seq_bytes(sequence, dtls));
        aad.push(content_type.as_u8());
        let (major, minor) = version.to_bytes();
        aad.push(major);
        aad.push(minor);
        aad.extend_from_slice(&length.to_be_bytes());
        Aad(aad)
    }
}

impl std::ops::Deref for Aad {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The 8-byte sequence field as it enters MAC and AAD inputs.
///
/// For DTLS the top two bytes carry the epoch.
pub(crate) fn seq_bytes(sequence: Sequence, dtls: bool) -> [u8; 8] {
    let mut bytes = sequence.sequence_number.to_be_bytes();
    if dtls {
        let epoch = sequence.epoch.to_be_bytes();
        bytes[0] = epoch[0];
        bytes[1] = epoch[1];
    }
    bytes
}

// ============================================================================
// Cipher traits
// ============================================================================

/// An AEAD cipher handle for one direction of one epoch.
pub trait AeadCipher: Send {
    /// Length of the authentication tag appended by `seal`.
    fn tag_len(&self) -> usize {
        GCM_TAG_LEN
    }

    /// Encrypt in place, appending the tag.
    fn seal(&mut self, data: &mut Buf, aad: &Aad, nonce: Nonce) -> Result<(), String>;

    /// Decrypt in place, verifying and stripping the tag.
    fn open(&mut self, data: &mut Buf, aad: &Aad, nonce: Nonce) -> Result<(), String>;
}

/// A stream cipher handle. One keystream per direction state.
pub trait StreamCipher: Send {
    /// Apply the keystream for an outbound record.
    fn encrypt(&mut self, data: &mut [u8]) -> Result<(), String>;

    /// Apply the keystream for an inbound record.
    fn decrypt(&mut self, data: &mut [u8]) -> Result<(), String>;
}

/// A block cipher handle operating in CBC mode.
///
/// The engine performs the chaining; the pipeline owns padding and MAC.
pub trait BlockCipher: Send {
    /// The cipher block length. Record IVs and padding use this.
    fn block_len(&self) -> usize;

    /// CBC-encrypt `data` (a whole number of blocks) under `iv`.
    fn encrypt_cbc(&mut self, iv: &[u8], data: &mut [u8]) -> Result<(), String>;

    /// CBC-decrypt `data` (a whole number of blocks) under `iv`.
    fn decrypt_cbc(&mut self, iv: &[u8], data: &mut [u8]) -> Result<(), String>;
}

/// The bulk cipher installed for one direction of one epoch.
pub enum CipherState {
    /// No encryption (epoch 0, or NULL cipher suites).
    Null,
    /// Stream cipher.
    Stream(Box<dyn StreamCipher>),
    /// Block cipher in CBC mode with explicit per-record IV.
    Block(Box<dyn BlockCipher>),
    /// AEAD with explicit nonce; the tag stands in for the MAC.
    Aead(Box<dyn AeadCipher>),
}

/// The class of a [`CipherState`], for dispatch without borrowing the
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherClass {
    /// No encryption.
    Null,
    /// Stream cipher.
    Stream,
    /// Block cipher in CBC mode.
    Block,
    /// AEAD.
    Aead,
}

impl CipherState {
    /// The class of this cipher.
    pub fn class(&self) -> CipherClass {
        match self {
            CipherState::Null => CipherClass::Null,
            CipherState::Stream(_) => CipherClass::Stream,
            CipherState::Block(_) => CipherClass::Block,
            CipherState::Aead(_) => CipherClass::Aead,
        }
    }

    /// Whether this is an AEAD construction.
    pub fn is_aead(&self) -> bool {
        matches!(self, CipherState::Aead(_))
    }

    /// Worst-case ciphertext expansion over the plaintext for this cipher
    /// class, given the MAC tag length in use.
    pub fn max_overhead(&self, mac_len: usize) -> usize {
        match self {
            CipherState::Null => mac_len,
            CipherState::Stream(_) => mac_len,
            // IV block + MAC + maximal padding block
            CipherState::Block(c) => c.block_len() * 2 + mac_len,
            CipherState::Aead(c) => EXPLICIT_NONCE_LEN + c.tag_len(),
        }
    }
}

impl fmt::Debug for CipherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherState::Null => write!(f, "Null"),
            CipherState::Stream(_) => write!(f, "Stream"),
            CipherState::Block(c) => write!(f, "Block({})", c.block_len()),
            CipherState::Aead(_) => write!(f, "Aead"),
        }
    }
}

// ============================================================================
// MAC traits
// ============================================================================

/// A keyed MAC handle (HMAC or similar).
///
/// `finalize` must reset the handle so it can authenticate the next record.
pub trait MacHandle: Send {
    /// Length of the produced tag.
    fn tag_len(&self) -> usize;

    /// Set a per-record nonce, for nonce-based MAC modes. Default no-op.
    fn set_nonce(&mut self, _nonce: &[u8]) {}

    /// Feed data into the MAC.
    fn update(&mut self, data: &[u8]);

    /// Produce the tag and reset for the next record.
    fn finalize(&mut self) -> MacTag;
}

/// A keyed digest handle for the legacy (SSL3-style) record MAC.
///
/// The construction differs from HMAC in its input: the protocol version
/// bytes are not part of the authenticated header.
pub trait DigestHandle: Send {
    /// Length of the produced tag.
    fn tag_len(&self) -> usize;

    /// Feed data into the digest.
    fn update(&mut self, data: &[u8]);

    /// Produce the tag and reset for the next record.
    fn finalize(&mut self) -> MacTag;
}

/// The record MAC installed for one direction of one epoch.
///
/// AEAD epochs use `None`; the tag is produced by the cipher itself.
pub enum RecordMac {
    /// No MAC (epoch 0 or AEAD).
    None,
    /// Modern HMAC-based record MAC.
    Hmac(Box<dyn MacHandle>),
    /// Legacy keyed-digest record MAC.
    Digest(Box<dyn DigestHandle>),
}

impl RecordMac {
    /// Tag length, 0 when no MAC is installed.
    pub fn tag_len(&self) -> usize {
        match self {
            RecordMac::None => 0,
            RecordMac::Hmac(mac) => mac.tag_len(),
            RecordMac::Digest(digest) => digest.tag_len(),
        }
    }

    /// Compute the record MAC over the pseudo-header and payload.
    ///
    /// Returns `None` when no MAC is installed.
    pub fn compute(
        &mut self,
        sequence: Sequence,
        content_type: ContentType,
        version: ProtocolVersion,
        dtls: bool,
        data: &[u8],
    ) -> Option<MacTag> {
        let seq = seq_bytes(sequence, dtls);
        let length = (data.len() as u16).to_be_bytes();

        match self {
            RecordMac::None => None,
            RecordMac::Hmac(mac) => {
                mac.set_nonce(&seq);
                mac.update(&seq);
                mac.update(&[content_type.as_u8()]);
                let (major, minor) = version.to_bytes();
                mac.update(&[major, minor]);
                mac.update(&length);
                mac.update(data);
                Some(mac.finalize())
            }
            RecordMac::Digest(digest) => {
                // The legacy construction authenticates no version bytes.
                digest.update(&seq);
                digest.update(&[content_type.as_u8()]);
                digest.update(&length);
                digest.update(data);
                Some(digest.finalize())
            }
        }
    }
}

impl fmt::Debug for RecordMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordMac::None => write!(f, "None"),
            RecordMac::Hmac(mac) => write!(f, "Hmac({})", mac.tag_len()),
            RecordMac::Digest(digest) => write!(f, "Digest({})", digest.tag_len()),
        }
    }
}

// ============================================================================
// Compression
// ============================================================================

/// A record compression method.
pub trait Compressor: Send {
    /// Compress `data` in place.
    fn compress(&mut self, data: &mut Buf) -> Result<(), String>;

    /// Decompress `data` in place. Output beyond `max_len` is an error.
    fn decompress(&mut self, data: &mut Buf, max_len: usize) -> Result<(), String>;
}

/// The compression state installed for one direction of one epoch.
///
/// `Null` is the identity and the only method negotiated in practice.
pub enum Compression {
    /// No compression.
    Null,
    /// An externally provided method.
    Custom(Box<dyn Compressor>),
}

impl Compression {
    /// Compress an outbound fragment.
    pub fn compress(&mut self, data: &mut Buf) -> Result<(), String> {
        match self {
            Compression::Null => Ok(()),
            Compression::Custom(method) => method.compress(data),
        }
    }

    /// Decompress an inbound fragment, bounding the output size.
    pub fn decompress(&mut self, data: &mut Buf, max_len: usize) -> Result<(), String> {
        match self {
            Compression::Null => {
                if data.len() > max_len {
                    return Err("decompressed record too large".to_string());
                }
                Ok(())
            }
            Compression::Custom(method) => method.decompress(data, max_len),
        }
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Null => write!(f, "Null"),
            Compression::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Constant-time equality for MAC tags.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ============================================================================
// Key material
// ============================================================================

/// Key material for one direction of a new epoch.
///
/// Produced by the handshake layer's key derivation and consumed when the
/// epoch's cipher and MAC handles are created. All fields are wiped on drop.
pub struct KeyMaterial {
    /// Bulk cipher key.
    pub enc_key: Zeroizing<Vec<u8>>,
    /// MAC key. Empty for AEAD suites.
    pub mac_key: Zeroizing<Vec<u8>>,
    /// Fixed IV portion. Empty for suites without one.
    pub fixed_iv: Zeroizing<Vec<u8>>,
}

impl KeyMaterial {
    /// Bundle key material from raw slices.
    pub fn new(enc_key: &[u8], mac_key: &[u8], fixed_iv: &[u8]) -> Self {
        Self {
            enc_key: Zeroizing::new(enc_key.to_vec()),
            mac_key: Zeroizing::new(mac_key.to_vec()),
            fixed_iv: Zeroizing::new(fixed_iv.to_vec()),
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key bytes.
        f.debug_struct("KeyMaterial")
            .field("enc_key_len", &self.enc_key.len())
            .field("mac_key_len", &self.mac_key.len())
            .field("fixed_iv_len", &self.fixed_iv.len())
            .finish()
    }
}
