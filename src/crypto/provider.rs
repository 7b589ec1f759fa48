//! Pluggable crypto suite registry.
//!
//! A [`CryptoProvider`] holds static references to the cipher suites a
//! deployment supports. The handshake layer looks a suite up by id when it
//! installs keys for a new epoch. A process-wide default can be installed
//! once and is used when no explicit provider is given.

use std::fmt;

use once_cell::sync::OnceCell;

use super::{CipherState, Iv, KeyMaterial, RecordMac};

/// Identifies a record-protection suite (bulk cipher + record MAC).
///
/// Key exchange is of no concern to the record layer, so the ids name only
/// the protection halves of the usual suite names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum SuiteId {
    /// No encryption, HMAC-SHA256 record MAC.
    NULL_SHA256,
    /// AES-128-GCM AEAD.
    AES_128_GCM_SHA256,
    /// Unknown or externally defined suite.
    Unknown(u16),
}

/// Key lengths a suite consumes at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLengths {
    /// Bulk cipher key length.
    pub enc_key: usize,
    /// MAC key length. 0 for AEAD suites.
    pub mac_key: usize,
    /// Fixed IV length. 0 for suites without one.
    pub fixed_iv: usize,
}

/// Cipher and MAC handles created for one direction of one epoch.
pub struct DirectionCrypto {
    /// The bulk cipher.
    pub cipher: CipherState,
    /// The record MAC.
    pub mac: RecordMac,
    /// Fixed IV portion for AEAD nonce construction.
    pub iv: Option<Iv>,
}

/// A record-protection suite the provider can instantiate.
pub trait SupportedSuite: Sync + fmt::Debug {
    /// The suite id.
    fn id(&self) -> SuiteId;

    /// The key lengths this suite consumes.
    fn key_lengths(&self) -> KeyLengths;

    /// Create the cipher/MAC handles for one direction from key material.
    fn new_direction(&self, keys: &KeyMaterial) -> Result<DirectionCrypto, String>;
}

/// The set of suites available to a connection.
#[derive(Debug, Clone, Copy)]
pub struct CryptoProvider {
    /// Supported suites in preference order.
    pub suites: &'static [&'static dyn SupportedSuite],
}

static DEFAULT_PROVIDER: OnceCell<CryptoProvider> = OnceCell::new();

impl CryptoProvider {
    /// Look up a suite by id.
    pub fn find(&self, id: SuiteId) -> Option<&'static dyn SupportedSuite> {
        self.suites.iter().copied().find(|s| s.id() == id)
    }

    /// Install this provider as the process-wide default.
    ///
    /// Returns `Err(self)` if a default was already installed.
    pub fn install_default(self) -> Result<(), CryptoProvider> {
        DEFAULT_PROVIDER.set(self).map_err(|_| self)
    }

    /// Get the process-wide default provider, if one was installed.
    pub fn get_default() -> Option<&'static CryptoProvider> {
        DEFAULT_PROVIDER.get()
    }
}
