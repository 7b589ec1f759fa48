//! Transport and controller collaborator interfaces.
//!
//! The record layer never touches sockets. It reads and writes through the
//! [`Transport`] trait and signals suspension with the retryable error
//! kinds; callers re-invoke the same operation to continue. The DTLS
//! retransmit controller and the heartbeat sub-protocol handler are the
//! other two collaborators the receive dispatcher drives.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::Error;

/// A byte/datagram transport underneath the record layer.
///
/// Stream transports (TLS) deliver arbitrary byte chunks; datagram
/// transports (DTLS) must deliver one whole datagram per `read`. Blocking
/// implementations honor `timeout`; non-blocking ones return
/// [`Error::WouldBlock`].
pub trait Transport {
    /// Read up to `buf.len()` bytes. `Ok(0)` means transport EOF.
    ///
    /// `timeout` of `None` means wait forever; expiry yields
    /// [`Error::Timedout`].
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error>;

    /// Write bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, Error>;

    /// Flush anything the transport has buffered.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Outcome of one retransmit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmitProgress {
    /// The flight was fully retransmitted.
    Complete,
    /// More work remains; call again.
    InProgress,
}

/// DTLS flight retransmission controller.
///
/// Owned by the handshake layer; the receive dispatcher only pokes it when
/// a replayed handshake record shows the peer missed our last flight.
pub trait RetransmitController {
    /// Whether retransmission runs on an async timer.
    fn is_async(&self) -> bool;

    /// Whether the retransmit timer is currently armed.
    fn timer_active(&self) -> bool;

    /// Retransmit (part of) the last flight.
    fn retransmit(&mut self) -> Result<RetransmitProgress, Error>;

    /// Cancel the timer; the peer has made forward progress.
    fn cancel_timer(&mut self);
}

/// Heartbeat sub-protocol handler.
pub trait HeartbeatHandler {
    /// Consume one decrypted heartbeat record.
    fn handle(&mut self, record: &[u8]) -> bool;
}

/// In-memory transport connecting two endpoints, for tests and loopback
/// use. `datagram` mode preserves read boundaries the way UDP would.
#[derive(Debug, Default)]
pub struct PipeTransport {
    /// Data waiting to be read by this endpoint.
    pub rx: VecDeque<Vec<u8>>,
    /// Data written by this endpoint, to be moved to the peer's `rx`.
    pub tx: VecDeque<Vec<u8>>,
    /// Preserve datagram boundaries.
    pub datagram: bool,
    /// `read` returns `Ok(0)` once `rx` drains.
    pub eof: bool,
    /// Accept at most this many bytes per `write` call.
    pub write_limit: Option<usize>,
    /// Fail the next `write` calls with `WouldBlock`.
    pub block_writes: bool,
}

impl PipeTransport {
    /// A stream-mode pipe.
    pub fn stream() -> Self {
        Self::default()
    }

    /// A datagram-mode pipe.
    pub fn dgram() -> Self {
        Self {
            datagram: true,
            ..Self::default()
        }
    }

    /// Move everything this endpoint wrote into the peer's read queue.
    pub fn deliver_to(&mut self, peer: &mut PipeTransport) {
        peer.rx.extend(self.tx.drain(..));
    }

    /// Queue raw bytes for this endpoint to read.
    pub fn inject(&mut self, data: &[u8]) {
        self.rx.push_back(data.to_vec());
    }
}

impl Transport for PipeTransport {
    fn read(&mut self, buf: &mut [u8], _timeout: Option<Duration>) -> Result<usize, Error> {
        let Some(front) = self.rx.front_mut() else {
            if self.eof {
                return Ok(0);
            }
            return Err(Error::WouldBlock);
        };

        if self.datagram {
            // One whole datagram per read; a short buffer truncates like UDP.
            let n = front.len().min(buf.len());
            buf[..n].copy_from_slice(&front[..n]);
            self.rx.pop_front();
            Ok(n)
        } else {
            let n = front.len().min(buf.len());
            buf[..n].copy_from_slice(&front[..n]);
            if n == front.len() {
                self.rx.pop_front();
            } else {
                front.drain(..n);
            }
            Ok(n)
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        if self.block_writes {
            return Err(Error::WouldBlock);
        }
        let n = self.write_limit.unwrap_or(data.len()).min(data.len());
        if n == 0 && !data.is_empty() {
            return Err(Error::WouldBlock);
        }
        if self.datagram {
            self.tx.push_back(data.to_vec());
            Ok(data.len())
        } else {
            self.tx.push_back(data[..n].to_vec());
            Ok(n)
        }
    }
}
