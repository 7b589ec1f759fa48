use std::time::Duration;

/// Slack on top of the plaintext bound for compression and cipher
/// expansion in a received ciphertext.
pub(crate) const MAX_CIPHERTEXT_EXPANSION: usize = 2048;

/// Record layer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    dtls: bool,
    max_record_size: usize,
    max_empty_records: usize,
    mtu: usize,
    epoch_retention: u16,
    strict_version_check: bool,
    recv_timeout: Option<Duration>,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            dtls: false,
            max_record_size: 16384,
            max_empty_records: 200,
            mtu: 1150,
            epoch_retention: 1,
            strict_version_check: true,
            recv_timeout: None,
            rng_seed: None,
        }
    }

    /// Whether the transport is datagram-based (DTLS).
    #[inline(always)]
    pub fn dtls(&self) -> bool {
        self.dtls
    }

    /// Maximum plaintext payload of a single record.
    ///
    /// The protocol bound is 2^14; callers may lower it.
    #[inline(always)]
    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Maximum ciphertext length accepted in a record header.
    ///
    /// Allows for compression and cipher expansion over the plaintext bound.
    #[inline(always)]
    pub fn max_ciphertext_size(&self) -> usize {
        self.max_record_size + MAX_CIPHERTEXT_EXPANSION
    }

    /// Max consecutive empty-plaintext records before the session fails.
    ///
    /// Empty records are legitimate (protective fragments against CBC
    /// attacks) but an unbounded stream of them is a DoS.
    #[inline(always)]
    pub fn max_empty_records(&self) -> usize {
        self.max_empty_records
    }

    /// Max transmission unit for DTLS datagrams.
    ///
    /// Outbound records that would exceed this are refused, never fragmented.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// How many retired epochs stay decryptable (DTLS reordering window).
    #[inline(always)]
    pub fn epoch_retention(&self) -> u16 {
        self.epoch_retention
    }

    /// Whether non-hello records must carry the exact negotiated version.
    ///
    /// The version field of protected records is unauthenticated, so this
    /// check adds little; it is kept for interop strictness and can be
    /// relaxed here.
    #[inline(always)]
    pub fn strict_version_check(&self) -> bool {
        self.strict_version_check
    }

    /// Timeout for a blocking receive. `None` means wait forever.
    #[inline(always)]
    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout
    }

    /// Seed for deterministic non-secret randomness (tests).
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

/// Builder for record layer configuration.
pub struct ConfigBuilder {
    dtls: bool,
    max_record_size: usize,
    max_empty_records: usize,
    mtu: usize,
    epoch_retention: u16,
    strict_version_check: bool,
    recv_timeout: Option<Duration>,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Select datagram (DTLS) or stream (TLS) behavior.
    ///
    /// Defaults to stream.
    pub fn dtls(mut self, dtls: bool) -> Self {
        self.dtls = dtls;
        self
    }

    /// Set the maximum plaintext payload of a single record.
    ///
    /// Clamped to the protocol bound of 16384. Defaults to 16384.
    pub fn max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size.clamp(512, 16384);
        self
    }

    /// Set the max consecutive empty records tolerated.
    ///
    /// Defaults to 200.
    pub fn max_empty_records(mut self, max: usize) -> Self {
        self.max_empty_records = max;
        self
    }

    /// Set the max transmission unit for DTLS datagrams.
    ///
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set how many retired epochs stay decryptable under DTLS.
    ///
    /// Defaults to 1 (the previous epoch).
    pub fn epoch_retention(mut self, epochs: u16) -> Self {
        self.epoch_retention = epochs;
        self
    }

    /// Set whether non-hello records must carry the exact negotiated version.
    ///
    /// Defaults to true.
    pub fn strict_version_check(mut self, strict: bool) -> Self {
        self.strict_version_check = strict;
        self
    }

    /// Set the timeout for a blocking receive.
    ///
    /// Defaults to `None` (wait forever).
    pub fn recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Seed the non-secret randomness for deterministic tests.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        Config {
            dtls: self.dtls,
            max_record_size: self.max_record_size,
            max_empty_records: self.max_empty_records,
            mtu: self.mtu,
            epoch_retention: self.epoch_retention,
            strict_version_check: self.strict_version_check,
            recv_timeout: self.recv_timeout,
            rng_seed: self.rng_seed,
        }
    }
}
