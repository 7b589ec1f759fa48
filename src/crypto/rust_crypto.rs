//! Default crypto backend built on the RustCrypto crates.
//!
//! Provides AES-128-GCM record protection and an HMAC-SHA256 record MAC
//! for NULL-cipher epochs.

use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes128Gcm, KeyInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::provider::{CryptoProvider, DirectionCrypto, KeyLengths, SuiteId, SupportedSuite};
use super::{Aad, AeadCipher, CipherState, Iv, KeyMaterial, MacHandle, MacTag, Nonce, RecordMac};
use crate::buffer::Buf;

/// AES-128-GCM record cipher for one direction.
pub struct Aes128GcmCipher {
    inner: Aes128Gcm,
}

impl Aes128GcmCipher {
    /// Create a cipher handle from a 16-byte key.
    pub fn new(key: &[u8]) -> Result<Self, String> {
        let inner =
            Aes128Gcm::new_from_slice(key).map_err(|_| "AES-128-GCM key must be 16 bytes")?;
        Ok(Self { inner })
    }
}

impl AeadCipher for Aes128GcmCipher {
    fn seal(&mut self, data: &mut Buf, aad: &Aad, nonce: Nonce) -> Result<(), String> {
        self.inner
            .encrypt_in_place(aes_gcm::Nonce::from_slice(&nonce.0), aad, data)
            .map_err(|_| "AEAD seal failed".to_string())
    }

    fn open(&mut self, data: &mut Buf, aad: &Aad, nonce: Nonce) -> Result<(), String> {
        self.inner
            .decrypt_in_place(aes_gcm::Nonce::from_slice(&nonce.0), aad, data)
            .map_err(|_| "AEAD open failed".to_string())
    }
}

/// HMAC-SHA256 record MAC for one direction.
pub struct HmacSha256 {
    inner: Hmac<Sha256>,
}

impl HmacSha256 {
    /// Create a MAC handle from a key.
    pub fn new(key: &[u8]) -> Result<Self, String> {
        let inner = <Hmac<Sha256> as Mac>::new_from_slice(key)
            .map_err(|_| "HMAC-SHA256 rejected the key")?;
        Ok(Self { inner })
    }
}

impl MacHandle for HmacSha256 {
    fn tag_len(&self) -> usize {
        32
    }

    fn update(&mut self, data: &[u8]) {
        Mac::update(&mut self.inner, data);
    }

    fn finalize(&mut self) -> MacTag {
        let out = self.inner.finalize_reset().into_bytes();
        let mut tag = MacTag::new();
        tag.extend_from_slice(out.as_slice());
        tag
    }
}

// ============================================================================
// Suites
// ============================================================================

#[derive(Debug)]
struct Aes128GcmSha256Suite;

impl SupportedSuite for Aes128GcmSha256Suite {
    fn id(&self) -> SuiteId {
        SuiteId::AES_128_GCM_SHA256
    }

    fn key_lengths(&self) -> KeyLengths {
        KeyLengths {
            enc_key: 16,
            mac_key: 0,
            fixed_iv: 4,
        }
    }

    fn new_direction(&self, keys: &KeyMaterial) -> Result<DirectionCrypto, String> {
        let cipher = Aes128GcmCipher::new(&keys.enc_key)?;
        let iv = Iv::new(&keys.fixed_iv)?;
        Ok(DirectionCrypto {
            cipher: CipherState::Aead(Box::new(cipher)),
            mac: RecordMac::None,
            iv: Some(iv),
        })
    }
}

#[derive(Debug)]
struct NullSha256Suite;

impl SupportedSuite for NullSha256Suite {
    fn id(&self) -> SuiteId {
        SuiteId::NULL_SHA256
    }

    fn key_lengths(&self) -> KeyLengths {
        KeyLengths {
            enc_key: 0,
            mac_key: 32,
            fixed_iv: 0,
        }
    }

    fn new_direction(&self, keys: &KeyMaterial) -> Result<DirectionCrypto, String> {
        let mac = HmacSha256::new(&keys.mac_key)?;
        Ok(DirectionCrypto {
            cipher: CipherState::Null,
            mac: RecordMac::Hmac(Box::new(mac)),
            iv: None,
        })
    }
}

static AES_128_GCM_SHA256: Aes128GcmSha256Suite = Aes128GcmSha256Suite;
static NULL_SHA256: NullSha256Suite = NullSha256Suite;
static ALL_SUITES: &[&dyn SupportedSuite] = &[&AES_128_GCM_SHA256, &NULL_SHA256];

/// The default provider backed by RustCrypto.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider { suites: ALL_SUITES }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentType, ProtocolVersion, Sequence};

    #[test]
    fn aead_seal_open_roundtrip() {
        let keys = KeyMaterial::new(&[7u8; 16], &[], &[1, 2, 3, 4]);
        let suite = &AES_128_GCM_SHA256;

        let DirectionCrypto { cipher, iv, .. } = suite.new_direction(&keys).unwrap();
        let CipherState::Aead(mut sealer) = cipher else {
            panic!("expected AEAD");
        };
        let DirectionCrypto { cipher, .. } = suite.new_direction(&keys).unwrap();
        let CipherState::Aead(mut opener) = cipher else {
            panic!("expected AEAD");
        };

        let sequence = Sequence {
            epoch: 1,
            sequence_number: 42,
        };
        let aad = Aad::new(
            ContentType::ApplicationData,
            ProtocolVersion::Tls1_2,
            sequence,
            5,
            false,
        );
        let nonce = Nonce::new(iv.unwrap(), &[9u8; 8]);

        let mut data = Buf::from_slice(b"hello");
        sealer.seal(&mut data, &aad, nonce).unwrap();
        assert_eq!(data.len(), 5 + 16);

        opener.open(&mut data, &aad, nonce).unwrap();
        assert_eq!(&*data, b"hello");
    }

    #[test]
    fn aead_open_rejects_tampering() {
        let keys = KeyMaterial::new(&[7u8; 16], &[], &[1, 2, 3, 4]);
        let DirectionCrypto { cipher, iv, .. } =
            AES_128_GCM_SHA256.new_direction(&keys).unwrap();
        let CipherState::Aead(mut cipher) = cipher else {
            panic!("expected AEAD");
        };

        let sequence = Sequence::new(1);
        let aad = Aad::new(
            ContentType::ApplicationData,
            ProtocolVersion::Tls1_2,
            sequence,
            5,
            false,
        );
        let nonce = Nonce::new(iv.unwrap(), &[9u8; 8]);

        let mut data = Buf::from_slice(b"hello");
        cipher.seal(&mut data, &aad, nonce).unwrap();
        data[0] ^= 0x80;
        assert!(cipher.open(&mut data, &aad, nonce).is_err());
    }

    #[test]
    fn hmac_resets_between_records() {
        let mut mac = HmacSha256::new(&[3u8; 32]).unwrap();
        mac.update(b"one");
        let first = mac.finalize();
        mac.update(b"one");
        let again = mac.finalize();
        assert_eq!(first, again);

        mac.update(b"two");
        let other = mac.finalize();
        assert_ne!(first, other);
    }
}
