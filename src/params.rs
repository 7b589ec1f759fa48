//! Per-epoch record protection parameters.
//!
//! One [`RecordParameters`] bundle exists per cryptographic epoch. Read and
//! write sides can be on different epochs (a DTLS peer may keep sending
//! under the old epoch while we already write under the new one), so the
//! store tracks a current epoch per direction and retains retired epochs
//! for a bounded window.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::crypto::provider::DirectionCrypto;
use crate::crypto::{CipherState, Compression, Iv, RecordMac};
use crate::error::Error;
use crate::seq::SeqNumber;
use crate::window::ReplayWindow;

/// Selects an epoch by logical role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochSelector {
    /// The epoch records are currently read under.
    ReadCurrent,
    /// The epoch records are currently written under.
    WriteCurrent,
    /// The epoch reads move to after the peer's ChangeCipherSpec.
    ReadNext,
    /// The epoch writes move to after our ChangeCipherSpec.
    WriteNext,
    /// A specific epoch id.
    Explicit(u16),
}

/// Cipher, MAC, compression and counters for one direction of one epoch.
pub struct DirectionState {
    /// Bulk cipher handle.
    pub cipher: CipherState,
    /// Record MAC handle.
    pub mac: RecordMac,
    /// Compression state.
    pub compression: Compression,
    /// Fixed IV for AEAD nonce construction.
    pub iv: Option<Iv>,
    /// Per-direction record counter.
    pub seq: SeqNumber,
    /// Anti-replay window. Read side of DTLS epochs only.
    pub replay: Option<ReplayWindow>,
}

impl DirectionState {
    /// The unprotected state of epoch 0.
    pub fn null(dtls: bool, read_side: bool) -> Self {
        Self {
            cipher: CipherState::Null,
            mac: RecordMac::None,
            compression: Compression::Null,
            iv: None,
            seq: SeqNumber::new(dtls),
            replay: (dtls && read_side).then(ReplayWindow::new),
        }
    }

    /// Wrap freshly created cipher/MAC handles for a new epoch.
    pub fn new(crypto: DirectionCrypto, dtls: bool, read_side: bool) -> Self {
        Self {
            cipher: crypto.cipher,
            mac: crypto.mac,
            compression: Compression::Null,
            iv: crypto.iv,
            seq: SeqNumber::new(dtls),
            replay: (dtls && read_side).then(ReplayWindow::new),
        }
    }

    /// Worst-case ciphertext expansion over the plaintext.
    pub fn max_overhead(&self) -> usize {
        self.cipher.max_overhead(self.mac.tag_len())
    }
}

/// The protection parameters of one epoch.
///
/// Immutable once `initialized` (the sequence counters and replay window
/// inside the direction states advance, the crypto setup does not).
pub struct RecordParameters {
    epoch: u16,
    initialized: bool,
    /// Inbound direction.
    pub read: DirectionState,
    /// Outbound direction.
    pub write: DirectionState,
}

impl RecordParameters {
    /// The unprotected epoch 0 every connection starts in.
    pub fn null_epoch(dtls: bool) -> Self {
        Self {
            epoch: 0,
            initialized: true,
            read: DirectionState::null(dtls, true),
            write: DirectionState::null(dtls, false),
        }
    }

    /// A fully keyed epoch, ready for promotion.
    pub fn with_keys(epoch: u16, read: DirectionState, write: DirectionState) -> Self {
        Self {
            epoch,
            initialized: true,
            read,
            write,
        }
    }

    /// The epoch id.
    pub fn epoch(&self) -> u16 {
        self.epoch
    }

    /// Whether keys have been installed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Contract check before any cipher/MAC handle is used.
    pub fn ensure_initialized(&self) -> Result<(), Error> {
        if !self.initialized {
            return Err(Error::InvalidState("epoch keys not installed"));
        }
        Ok(())
    }
}

/// All live epochs of one connection plus the current per-direction
/// pointers.
pub struct ParamStore {
    /// Epochs in ascending order.
    epochs: VecDeque<RecordParameters>,
    read_current: u16,
    write_current: u16,
    retention: u16,
    dtls: bool,
}

impl ParamStore {
    /// A fresh store holding only the unprotected epoch 0.
    pub fn new(dtls: bool, retention: u16) -> Self {
        let mut epochs = VecDeque::new();
        epochs.push_back(RecordParameters::null_epoch(dtls));
        Self {
            epochs,
            read_current: 0,
            write_current: 0,
            retention,
            dtls,
        }
    }

    /// The epoch reads currently resolve to.
    pub fn read_current(&self) -> u16 {
        self.read_current
    }

    /// The epoch writes currently resolve to.
    pub fn write_current(&self) -> u16 {
        self.write_current
    }

    fn resolve(&self, selector: EpochSelector) -> u16 {
        match selector {
            EpochSelector::ReadCurrent => self.read_current,
            EpochSelector::WriteCurrent => self.write_current,
            EpochSelector::ReadNext => self.read_current.wrapping_add(1),
            EpochSelector::WriteNext => self.write_current.wrapping_add(1),
            EpochSelector::Explicit(id) => id,
        }
    }

    /// Look up the parameters for an epoch.
    pub fn get(&self, selector: EpochSelector) -> Result<&RecordParameters, Error> {
        let id = self.resolve(selector);
        self.epochs
            .iter()
            .find(|p| p.epoch == id)
            .ok_or(Error::EpochNotFound(id))
    }

    /// Look up the parameters for an epoch, mutably.
    pub fn get_mut(&mut self, selector: EpochSelector) -> Result<&mut RecordParameters, Error> {
        let id = self.resolve(selector);
        self.epochs
            .iter_mut()
            .find(|p| p.epoch == id)
            .ok_or(Error::EpochNotFound(id))
    }

    /// Install the keyed parameters for the next epoch.
    ///
    /// Called by the handshake layer once key derivation is done. The new
    /// epoch is not used until `promote_read` / `promote_write`.
    pub fn install_next(
        &mut self,
        read: DirectionState,
        write: DirectionState,
    ) -> Result<u16, Error> {
        let highest = self.epochs.back().map(|p| p.epoch).unwrap_or(0);
        let epoch = highest
            .checked_add(1)
            .ok_or(Error::InvalidState("epoch id would wrap"))?;

        debug!("Installing parameters for epoch {}", epoch);
        self.epochs
            .push_back(RecordParameters::with_keys(epoch, read, write));
        Ok(epoch)
    }

    /// Move the read pointer to the next epoch.
    ///
    /// Driven by the peer's ChangeCipherSpec. The pointer only moves
    /// forward; the previous epoch stays decryptable for the retention
    /// window under DTLS.
    pub fn promote_read(&mut self) -> Result<u16, Error> {
        let next = self.read_current.wrapping_add(1);
        let params = self
            .epochs
            .iter()
            .find(|p| p.epoch == next)
            .ok_or(Error::EpochNotFound(next))?;
        params.ensure_initialized()?;

        trace!("Read epoch {} -> {}", self.read_current, next);
        self.read_current = next;
        self.expire();
        Ok(next)
    }

    /// Move the write pointer to the next epoch.
    ///
    /// Driven by our own ChangeCipherSpec.
    pub fn promote_write(&mut self) -> Result<u16, Error> {
        let next = self.write_current.wrapping_add(1);
        let params = self
            .epochs
            .iter()
            .find(|p| p.epoch == next)
            .ok_or(Error::EpochNotFound(next))?;
        params.ensure_initialized()?;

        trace!("Write epoch {} -> {}", self.write_current, next);
        self.write_current = next;
        self.expire();
        Ok(next)
    }

    /// Drop epochs that fell out of the retention window.
    fn expire(&mut self) {
        let keep_from = self
            .read_current
            .min(self.write_current)
            .saturating_sub(if self.dtls { self.retention } else { 0 });
        while let Some(front) = self.epochs.front() {
            if front.epoch >= keep_from {
                break;
            }
            debug!("Retiring epoch {}", front.epoch);
            self.epochs.pop_front();
        }
    }
}
