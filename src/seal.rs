//! Record protection pipeline.
//!
//! [`seal`] turns a plaintext fragment into the on-wire protected fragment:
//! compress, MAC, pad, encrypt. [`open`] is the inverse. Every failure on
//! the open path collapses into [`Error::DecryptionFailed`]; padding, MAC,
//! tag and length problems must stay indistinguishable to the peer.

use log::debug;

use crate::buffer::Buf;
use crate::crypto::{ct_eq, Aad, CipherClass, CipherState, Nonce, EXPLICIT_NONCE_LEN};
use crate::error::Error;
use crate::params::DirectionState;
use crate::rng::SeededRng;
use crate::types::{ContentType, ProtocolVersion, Sequence};

/// Protect one outbound fragment in place.
///
/// On return `fragment` holds the wire form: explicit IV/nonce prefix (if
/// any), ciphertext, and MAC/tag/padding suffix (as the cipher class
/// dictates). `min_pad` requests extra padding for length hiding; it only
/// applies to block ciphers.
pub fn seal(
    dir: &mut DirectionState,
    rng: &mut SeededRng,
    content_type: ContentType,
    version: ProtocolVersion,
    dtls: bool,
    sequence: Sequence,
    fragment: &mut Buf,
    min_pad: usize,
) -> Result<(), Error> {
    dir.compression.compress(fragment).map_err(|e| {
        debug!("Record protection failed: {}", e);
        Error::EncryptionFailed
    })?;

    let plaintext_len = fragment.len() as u16;

    match dir.cipher.class() {
        CipherClass::Null => {
            append_mac(dir, sequence, content_type, version, dtls, fragment);
        }
        CipherClass::Stream => {
            append_mac(dir, sequence, content_type, version, dtls, fragment);
            let CipherState::Stream(cipher) = &mut dir.cipher else {
                unreachable!()
            };
            cipher.encrypt(fragment.as_mut()).map_err(|e| {
                debug!("Record protection failed: {}", e);
                Error::EncryptionFailed
            })?;
        }
        CipherClass::Block => {
            append_mac(dir, sequence, content_type, version, dtls, fragment);
            let CipherState::Block(cipher) = &mut dir.cipher else {
                unreachable!()
            };
            let block = cipher.block_len();

            // TLS padding: pad_total bytes, each holding pad_total - 1.
            let content_len = fragment.len();
            let mut pad_total = 1 + min_pad.min(255);
            let rem = (content_len + pad_total) % block;
            if rem != 0 {
                pad_total += block - rem;
            }
            while pad_total > 256 {
                pad_total -= block;
            }
            fragment.resize(content_len + pad_total, (pad_total - 1) as u8);

            // Explicit per-record IV.
            let mut iv = vec![0u8; block];
            rng.fill(&mut iv);
            cipher.encrypt_cbc(&iv, fragment.as_mut()).map_err(|e| {
                debug!("Record protection failed: {}", e);
                Error::EncryptionFailed
            })?;
            prepend(fragment, &iv);
        }
        CipherClass::Aead => {
            let Some(iv) = dir.iv else {
                return Err(Error::InvalidState("AEAD epoch without fixed IV"));
            };
            let CipherState::Aead(cipher) = &mut dir.cipher else {
                unreachable!()
            };

            let aad = Aad::new(content_type, version, sequence, plaintext_len, dtls);
            let explicit_nonce: [u8; EXPLICIT_NONCE_LEN] = rng.random();
            let nonce = Nonce::new(iv, &explicit_nonce);

            cipher.seal(fragment, &aad, nonce).map_err(|e| {
                debug!("Record protection failed: {}", e);
                Error::EncryptionFailed
            })?;
            prepend(fragment, &explicit_nonce);
        }
    }

    Ok(())
}

/// Unprotect one inbound fragment in place.
///
/// `sequence` is the record's sequence number: taken from the header for
/// DTLS, from the local read counter for TLS. On success `fragment` holds
/// the plaintext, which may legitimately be empty. `max_plain_len` bounds
/// the decompressed size.
pub fn open(
    dir: &mut DirectionState,
    content_type: ContentType,
    version: ProtocolVersion,
    dtls: bool,
    sequence: Sequence,
    fragment: &mut Buf,
    max_plain_len: usize,
) -> Result<(), Error> {
    match dir.cipher.class() {
        CipherClass::Null => {
            strip_and_verify_mac(dir, sequence, content_type, version, dtls, fragment)?;
        }
        CipherClass::Stream => {
            {
                let CipherState::Stream(cipher) = &mut dir.cipher else {
                    unreachable!()
                };
                cipher
                    .decrypt(fragment.as_mut())
                    .map_err(|_| Error::DecryptionFailed)?;
            }
            strip_and_verify_mac(dir, sequence, content_type, version, dtls, fragment)?;
        }
        CipherClass::Block => {
            open_block(dir, sequence, content_type, version, dtls, fragment)?;
        }
        CipherClass::Aead => {
            let Some(iv) = dir.iv else {
                return Err(Error::InvalidState("AEAD epoch without fixed IV"));
            };
            let CipherState::Aead(cipher) = &mut dir.cipher else {
                unreachable!()
            };

            let overhead = EXPLICIT_NONCE_LEN + cipher.tag_len();
            let Some(plaintext_len) = fragment.len().checked_sub(overhead) else {
                return Err(Error::DecryptionFailed);
            };

            let mut explicit_nonce = [0u8; EXPLICIT_NONCE_LEN];
            explicit_nonce.copy_from_slice(&fragment[..EXPLICIT_NONCE_LEN]);
            let nonce = Nonce::new(iv, &explicit_nonce);
            let aad = Aad::new(content_type, version, sequence, plaintext_len as u16, dtls);

            fragment.consume_front(EXPLICIT_NONCE_LEN);
            cipher
                .open(fragment, &aad, nonce)
                .map_err(|_| Error::DecryptionFailed)?;
        }
    }

    // Inverse of the compression step; failures are indistinguishable
    // from crypto failures on this path.
    dir.compression
        .decompress(fragment, max_plain_len)
        .map_err(|_| Error::DecryptionFailed)?;

    if fragment.len() > max_plain_len {
        return Err(Error::DecryptionFailed);
    }

    Ok(())
}

fn append_mac(
    dir: &mut DirectionState,
    sequence: Sequence,
    content_type: ContentType,
    version: ProtocolVersion,
    dtls: bool,
    fragment: &mut Buf,
) {
    if let Some(tag) = dir
        .mac
        .compute(sequence, content_type, version, dtls, fragment)
    {
        fragment.extend_from_slice(&tag);
    }
}

fn strip_and_verify_mac(
    dir: &mut DirectionState,
    sequence: Sequence,
    content_type: ContentType,
    version: ProtocolVersion,
    dtls: bool,
    fragment: &mut Buf,
) -> Result<(), Error> {
    let tag_len = dir.mac.tag_len();
    if tag_len == 0 {
        return Ok(());
    }

    let Some(content_len) = fragment.len().checked_sub(tag_len) else {
        return Err(Error::DecryptionFailed);
    };

    let computed = dir
        .mac
        .compute(
            sequence,
            content_type,
            version,
            dtls,
            &fragment[..content_len],
        )
        .expect("mac handle with nonzero tag length");

    if !ct_eq(&fragment[content_len..], &computed) {
        return Err(Error::DecryptionFailed);
    }

    fragment.truncate(content_len);
    Ok(())
}

fn open_block(
    dir: &mut DirectionState,
    sequence: Sequence,
    content_type: ContentType,
    version: ProtocolVersion,
    dtls: bool,
    fragment: &mut Buf,
) -> Result<(), Error> {
    let tag_len = dir.mac.tag_len();
    let CipherState::Block(cipher) = &mut dir.cipher else {
        unreachable!()
    };
    let block = cipher.block_len();

    // IV block plus at least one data block, whole blocks only. These are
    // length-derived conditions, observable from the ciphertext itself.
    if fragment.len() < block * 2 || fragment.len() % block != 0 {
        return Err(Error::DecryptionFailed);
    }

    let mut iv = vec![0u8; block];
    iv.copy_from_slice(&fragment[..block]);
    cipher
        .decrypt_cbc(&iv, &mut fragment.as_mut()[block..])
        .map_err(|_| Error::DecryptionFailed)?;
    fragment.consume_front(block);

    let len = fragment.len();
    if len < tag_len + 1 {
        return Err(Error::DecryptionFailed);
    }

    // Padding and MAC are validated without early exits so that a wrong
    // pad and a wrong MAC cost the same work and return the same error.
    let claimed_pad = fragment[len - 1] as usize;
    let mut pad_ok = claimed_pad + 1 + tag_len <= len;
    let pad_len = if pad_ok { claimed_pad } else { 0 };

    let pad_byte = fragment[len - 1];
    let scan_start = len.saturating_sub(256);
    let mut diff = 0u8;
    for (i, byte) in fragment[scan_start..].iter().enumerate() {
        let from_end = len - 1 - (scan_start + i);
        if from_end <= pad_len {
            diff |= byte ^ pad_byte;
        }
    }
    pad_ok &= diff == 0;

    let content_len = len - tag_len - pad_len - 1;
    let mac_ok = match dir.mac.compute(
        sequence,
        content_type,
        version,
        dtls,
        &fragment[..content_len],
    ) {
        Some(computed) => ct_eq(&fragment[content_len..content_len + tag_len], &computed),
        None => true,
    };

    if !(pad_ok && mac_ok) {
        return Err(Error::DecryptionFailed);
    }

    fragment.truncate(content_len);
    Ok(())
}

fn prepend(fragment: &mut Buf, prefix: &[u8]) {
    let len = fragment.len();
    fragment.resize(len + prefix.len(), 0);
    fragment.copy_within(0..len, prefix.len());
    fragment[..prefix.len()].copy_from_slice(prefix);
}
