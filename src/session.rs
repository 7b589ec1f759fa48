//! The record session: receive dispatcher and send path.
//!
//! A [`RecordSession`] owns one connection's record-layer state: the epoch
//! parameter store, the per-content-type pending buffers, the session
//! flags, and the transport. All operations run on the caller's thread;
//! suspension is expressed through the retryable error kinds and callers
//! re-invoke the same operation to continue.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::buffer::{Buf, BufferPool};
use crate::config::{Config, MAX_CIPHERTEXT_EXPANSION};
use crate::error::Error;
use crate::framer::{HeaderContext, RecordHeader, DTLS_HEADER_LEN, SSL2_HEADER_LEN};
use crate::params::{EpochSelector, ParamStore};
use crate::rng::SeededRng;
use crate::seal;
use crate::transport::{HeartbeatHandler, RetransmitController, RetransmitProgress, Transport};
use crate::types::{ContentType, HandshakeType, ProtocolVersion, Role, Sequence};

/// Largest datagram we will accept from the transport.
const MAX_DATAGRAM: usize = 65535;

/// What the receive dispatcher is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    /// Normal record processing.
    Normal,
    /// A DTLS flight retransmission is in progress.
    DtlsRetransmit,
}

/// Per-connection record-layer flags and counters.
///
/// Owned by the session object; mutated only by the receive dispatcher and
/// the send path.
#[derive(Debug)]
pub struct SessionRecordState {
    /// Reads are administratively stopped.
    pub may_not_read: bool,
    /// Writes are administratively stopped.
    pub may_not_write: bool,
    /// The peer signaled a clean shutdown; reads return EOF.
    pub read_eof: bool,
    /// A fatal condition killed the session.
    pub invalid: bool,
    /// Whether the session may still be resumed later.
    pub resumable: bool,
    /// Consecutive empty-plaintext records seen.
    pub empty_record_count: usize,
    /// DTLS records silently dropped (bad crypto, replays, junk).
    pub discarded_count: u64,
    /// Dispatcher state.
    pub recv_state: RecvState,
}

impl SessionRecordState {
    fn new() -> Self {
        Self {
            may_not_read: false,
            may_not_write: false,
            read_eof: false,
            invalid: false,
            resumable: true,
            empty_record_count: 0,
            discarded_count: 0,
            recv_state: RecvState::Normal,
        }
    }
}

/// Flags for [`RecordSession::send`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SendFlags {
    /// The call resumes a previously interrupted send; empty data is then
    /// acceptable.
    pub resume: bool,
}

/// How to shut the session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownHow {
    /// Send close_notify and stop writing; reads stay possible.
    WriteOnly,
    /// Send close_notify and wait for the peer's.
    ReadWrite,
}

/// Explicit state for the resumable close sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByeState {
    SendClose,
    RecvClose,
    Done,
}

/// One decrypted record waiting for the caller, with the sequence number
/// it arrived under.
type PendingQueue = std::collections::VecDeque<(u64, Buf)>;

#[derive(Debug, Default)]
struct PendingBuffers {
    handshake: PendingQueue,
    application: PendingQueue,
    change_cipher_spec: PendingQueue,
}

impl PendingBuffers {
    fn queue_mut(&mut self, content_type: ContentType) -> Option<&mut PendingQueue> {
        match content_type {
            ContentType::Handshake => Some(&mut self.handshake),
            ContentType::ApplicationData => Some(&mut self.application),
            ContentType::ChangeCipherSpec => Some(&mut self.change_cipher_spec),
            _ => None,
        }
    }
}

/// A sealed record whose transport write was interrupted.
#[derive(Debug)]
struct TxPending {
    wire: Buf,
    offset: usize,
    user_len: usize,
}

enum Fill {
    Done,
    Eof,
}

/// The record layer of one connection.
pub struct RecordSession<T: Transport> {
    config: Arc<Config>,
    transport: T,
    role: Role,
    store: ParamStore,
    state: SessionRecordState,
    pending: PendingBuffers,
    buffers: BufferPool,
    rng: SeededRng,
    timeout: Option<Duration>,
    max_record_size: usize,
    max_empty_records: usize,
    negotiated: Option<ProtocolVersion>,
    handshaking: bool,
    expect_client_hello: bool,
    /// Partial record accumulation for stream transports.
    rx_partial: Buf,
    /// Current datagram and read offset for DTLS.
    rx_datagram: Buf,
    rx_offset: usize,
    tx_pending: Option<TxPending>,
    heartbeat: Option<Box<dyn HeartbeatHandler>>,
    retransmit: Option<Box<dyn RetransmitController>>,
    bye_state: ByeState,
}

impl<T: Transport> RecordSession<T> {
    /// Create the record layer for a fresh connection.
    ///
    /// Starts in the unprotected epoch 0 with no version negotiated.
    pub fn new(config: Arc<Config>, transport: T, role: Role) -> Self {
        let dtls = config.dtls();
        let rng = SeededRng::new(config.rng_seed());
        let timeout = config.recv_timeout();
        Self {
            store: ParamStore::new(dtls, config.epoch_retention()),
            state: SessionRecordState::new(),
            pending: PendingBuffers::default(),
            buffers: BufferPool::default(),
            rng,
            timeout,
            max_record_size: config.max_record_size(),
            max_empty_records: config.max_empty_records(),
            negotiated: None,
            handshaking: true,
            expect_client_hello: role == Role::Server,
            rx_partial: Buf::new(),
            rx_datagram: Buf::new(),
            rx_offset: 0,
            tx_pending: None,
            heartbeat: None,
            retransmit: None,
            bye_state: ByeState::SendClose,
            config,
            transport,
            role,
        }
    }

    /// The epoch parameter store.
    pub fn params(&self) -> &ParamStore {
        &self.store
    }

    /// The epoch parameter store, mutably. Used by the handshake layer to
    /// install and promote epochs.
    pub fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.store
    }

    /// The session flags and counters.
    pub fn state(&self) -> &SessionRecordState {
        &self.state
    }

    /// The underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Fix the negotiated protocol version. Until this is called, record
    /// headers are only checked for the right major version.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.negotiated = Some(version);
    }

    /// Tell the record layer whether a handshake is in progress. A
    /// ClientHello arriving at a non-handshaking server signals a
    /// rehandshake.
    pub fn set_handshaking(&mut self, handshaking: bool) {
        self.handshaking = handshaking;
    }

    /// Whether the caller currently expects a ClientHello. Gates the
    /// SSLv2-compatible short header form.
    pub fn set_expect_client_hello(&mut self, expect: bool) {
        self.expect_client_hello = expect;
    }

    /// Bound each blocking receive. `None` waits forever.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Cap the plaintext payload of a single record, within the protocol
    /// bounds.
    pub fn set_max_record_size(&mut self, size: usize) {
        self.max_record_size = size.clamp(512, 16384);
    }

    /// Adjust the consecutive empty-record tolerance.
    pub fn set_max_empty_records(&mut self, max: usize) {
        self.max_empty_records = max;
    }

    /// Install the heartbeat sub-protocol handler.
    pub fn set_heartbeat_handler(&mut self, handler: Box<dyn HeartbeatHandler>) {
        self.heartbeat = Some(handler);
    }

    /// Install the DTLS flight retransmission controller.
    pub fn set_retransmit_controller(&mut self, controller: Box<dyn RetransmitController>) {
        self.retransmit = Some(controller);
    }

    fn header_context(&self) -> HeaderContext {
        HeaderContext {
            dtls: self.config.dtls(),
            negotiated: self.negotiated,
            expect_client_hello: self.expect_client_hello,
            strict_version_check: self.config.strict_version_check(),
            max_ciphertext_len: self.max_record_size + MAX_CIPHERTEXT_EXPANSION,
        }
    }

    fn wire_version(&self) -> ProtocolVersion {
        self.negotiated.unwrap_or(if self.config.dtls() {
            ProtocolVersion::Dtls1_0
        } else {
            ProtocolVersion::Tls1_0
        })
    }

    /// Kill the session. Only an outbound alert may follow.
    fn invalidate(&mut self, unresumable: bool) {
        self.state.invalid = true;
        if unresumable {
            self.state.resumable = false;
        }
    }

    /// Downgrade a protocol violation: soft on DTLS, fatal on TLS.
    fn violation(&mut self, error: Error) -> Error {
        if self.config.dtls() {
            self.state.discarded_count += 1;
            debug!("Dropping offending datagram: {}", error);
            Error::WouldBlock
        } else {
            self.invalidate(true);
            error
        }
    }

    // ========================================================================
    // Receive path
    // ========================================================================

    /// Receive decrypted bytes of the given content type.
    ///
    /// Returns the number of bytes written into `buf`; 0 means the peer
    /// closed cleanly. Records of other types encountered on the way are
    /// reacted to per the dispatch rules, which may surface as errors
    /// (alerts, rehandshake signals) without invalidating the session.
    pub fn recv(&mut self, want: ContentType, buf: &mut [u8]) -> Result<usize, Error> {
        if !want.is_receivable() {
            return Err(Error::NotReceivable(want));
        }
        if self.state.invalid || self.state.may_not_read {
            return Err(Error::InvalidSession);
        }

        loop {
            if let Some(n) = self.pop_pending(want, buf) {
                return Ok(n);
            }
            if self.state.read_eof {
                return Ok(0);
            }
            self.process_one_record(want)?;
        }
    }

    /// DTLS diagnostics: records silently dropped so far.
    pub fn discarded_count(&self) -> u64 {
        self.state.discarded_count
    }

    fn pop_pending(&mut self, want: ContentType, buf: &mut [u8]) -> Option<usize> {
        let queue = self.pending.queue_mut(want)?;
        if queue.is_empty() {
            return None;
        }

        let mut n = 0;
        loop {
            let whole = {
                let Some((_, chunk)) = queue.front_mut() else {
                    break;
                };
                let take = chunk.len().min(buf.len() - n);
                buf[n..n + take].copy_from_slice(&chunk[..take]);
                n += take;
                if take < chunk.len() {
                    chunk.consume_front(take);
                    false
                } else {
                    true
                }
            };
            if !whole {
                break;
            }
            let (_, done) = queue.pop_front().expect("peeked above");
            self.buffers.push(done);
            if n == buf.len() || queue.is_empty() {
                break;
            }
        }
        Some(n)
    }

    fn process_one_record(&mut self, want: ContentType) -> Result<(), Error> {
        if self.config.dtls() {
            self.process_datagram_record(want)
        } else {
            self.process_stream_record(want)
        }
    }

    fn process_stream_record(&mut self, want: ContentType) -> Result<(), Error> {
        let header_len = RecordHeader::header_len(false);
        if let Fill::Eof = self.fill_rx(header_len)? {
            return Ok(());
        }

        let ctx = self.header_context();
        let header = match RecordHeader::parse(&self.rx_partial[..header_len], &ctx) {
            Ok(header) => header,
            Err(e) => {
                self.invalidate(true);
                return Err(e);
            }
        };

        let body_start = if header.ssl2 {
            SSL2_HEADER_LEN
        } else {
            header_len
        };
        let total = body_start + header.length as usize;
        if let Fill::Eof = self.fill_rx(total)? {
            return Ok(());
        }

        let mut fragment = self.buffers.pop();
        fragment.extend_from_slice(&self.rx_partial[body_start..total]);
        self.rx_partial.clear();

        self.handle_record(header, fragment, want)
    }

    /// Accumulate exactly `target` bytes of the current record.
    ///
    /// Transport EOF at a record boundary is a clean close; EOF inside a
    /// record is a violation.
    fn fill_rx(&mut self, target: usize) -> Result<Fill, Error> {
        let mut chunk = [0u8; 4096];
        while self.rx_partial.len() < target {
            let want = (target - self.rx_partial.len()).min(chunk.len());
            let n = self.transport.read(&mut chunk[..want], self.timeout)?;
            if n == 0 {
                if self.rx_partial.is_empty() {
                    debug!("Transport EOF at record boundary");
                    self.state.read_eof = true;
                    return Ok(Fill::Eof);
                }
                self.invalidate(true);
                return Err(Error::UnexpectedPacketLength);
            }
            self.rx_partial.extend_from_slice(&chunk[..n]);
        }
        Ok(Fill::Done)
    }

    fn process_datagram_record(&mut self, want: ContentType) -> Result<(), Error> {
        if self.rx_offset >= self.rx_datagram.len() {
            self.rx_datagram.clear();
            self.rx_datagram.resize(MAX_DATAGRAM, 0);
            let n = self.transport.read(self.rx_datagram.as_mut(), self.timeout);
            let n = match n {
                Ok(n) => n,
                Err(e) => {
                    self.rx_datagram.clear();
                    return Err(e);
                }
            };
            if n == 0 {
                self.rx_datagram.clear();
                self.state.read_eof = true;
                return Ok(());
            }
            self.rx_datagram.truncate(n);
            self.rx_offset = 0;
        }

        let ctx = self.header_context();
        let offset = self.rx_offset;
        let remaining = &self.rx_datagram[offset..];

        if remaining.len() < DTLS_HEADER_LEN {
            return self.discard_datagram("trailing bytes shorter than a record header");
        }

        let header = match RecordHeader::parse(&remaining[..DTLS_HEADER_LEN], &ctx) {
            Ok(header) => header,
            Err(e) => {
                debug!("Bad record header in datagram: {}", e);
                return self.discard_datagram("unparsable record header");
            }
        };

        let total = DTLS_HEADER_LEN + header.length as usize;
        if remaining.len() < total {
            return self.discard_datagram("record length exceeds datagram");
        }

        let mut fragment = self.buffers.pop();
        fragment.extend_from_slice(&remaining[DTLS_HEADER_LEN..total]);
        self.rx_offset += total;

        self.handle_record(header, fragment, want)
    }

    fn discard_datagram(&mut self, reason: &str) -> Result<(), Error> {
        debug!("Discarding rest of datagram: {}", reason);
        self.state.discarded_count += 1;
        self.rx_offset = self.rx_datagram.len();
        Ok(())
    }

    /// Steps 3-10 of the per-record algorithm: epoch lookup, decrypt,
    /// replay check, counter, empty-fragment guard, classification.
    fn handle_record(
        &mut self,
        header: RecordHeader,
        mut fragment: Buf,
        want: ContentType,
    ) -> Result<(), Error> {
        let dtls = self.config.dtls();

        let selector = if dtls {
            EpochSelector::Explicit(header.sequence.epoch)
        } else {
            EpochSelector::ReadCurrent
        };

        let params = match self.store.get_mut(selector) {
            Ok(params) => params,
            Err(e) => {
                self.buffers.push(fragment);
                if dtls {
                    // Late or early epoch; the datagram is simply dropped.
                    debug!("No parameters for record epoch: {}", e);
                    self.state.discarded_count += 1;
                    return Ok(());
                }
                return Err(Error::InternalError("read epoch has no parameters"));
            }
        };
        if let Err(e) = params.ensure_initialized() {
            self.buffers.push(fragment);
            return Err(e);
        }

        let sequence = if dtls {
            header.sequence
        } else {
            Sequence {
                epoch: params.epoch(),
                sequence_number: params.read.seq.value(),
            }
        };

        let opened = seal::open(
            &mut params.read,
            header.content_type,
            header.version,
            dtls,
            sequence,
            &mut fragment,
            self.max_record_size,
        );
        if let Err(e) = opened {
            self.buffers.push(fragment);
            if dtls {
                // A forged or corrupted datagram never takes the
                // association down.
                debug!("Dropping undecryptable record {}", sequence);
                self.state.discarded_count += 1;
                return Ok(());
            }
            warn!("Record failed to decrypt, invalidating session");
            self.invalidate(true);
            return Err(e);
        }

        if dtls {
            let fresh = params
                .read
                .replay
                .as_mut()
                .map(|w| w.check_and_update(sequence.sequence_number))
                .unwrap_or(true);
            if !fresh {
                debug!("Duplicate record {}", sequence);
                self.buffers.push(fragment);
                self.state.discarded_count += 1;
                return Ok(());
            }
        }

        if let Err(e) = params.read.seq.increment() {
            self.buffers.push(fragment);
            warn!("Read sequence counter exhausted");
            self.invalidate(true);
            return Err(e);
        }

        if fragment.is_empty() {
            self.buffers.push(fragment);
            self.state.empty_record_count += 1;
            trace!(
                "Empty record {}/{}",
                self.state.empty_record_count,
                self.max_empty_records
            );
            if self.state.empty_record_count > self.max_empty_records {
                self.invalidate(true);
                return Err(Error::TooManyEmptyRecords);
            }
            return Ok(());
        }
        self.state.empty_record_count = 0;

        self.classify(header, sequence, fragment, want)
    }

    /// Step 10: route one decrypted record.
    fn classify(
        &mut self,
        header: RecordHeader,
        sequence: Sequence,
        fragment: Buf,
        want: ContentType,
    ) -> Result<(), Error> {
        let content_type = header.content_type;
        let dtls = self.config.dtls();

        if content_type == want {
            // Forward progress; a pending retransmit timer is moot.
            if dtls {
                if let Some(controller) = &mut self.retransmit {
                    if controller.timer_active() {
                        controller.cancel_timer();
                    }
                }
            }
            let queue = self
                .pending
                .queue_mut(content_type)
                .expect("receivable type has a queue");
            queue.push_back((sequence.sequence_number, fragment));
            return Ok(());
        }

        match content_type {
            ContentType::Alert => {
                let result = self.handle_alert(&fragment);
                self.buffers.push(fragment);
                result
            }
            ContentType::ChangeCipherSpec => {
                if dtls {
                    // Reordering may deliver the CCS before the flight it
                    // belongs to; hold on to it.
                    self.pending
                        .change_cipher_spec
                        .push_back((sequence.sequence_number, fragment));
                    Ok(())
                } else {
                    self.buffers.push(fragment);
                    Err(self.violation(Error::UnexpectedPacket))
                }
            }
            ContentType::Heartbeat => {
                let consumed = match &mut self.heartbeat {
                    Some(handler) => handler.handle(&fragment),
                    None => false,
                };
                self.buffers.push(fragment);
                if consumed {
                    Ok(())
                } else {
                    Err(self.violation(Error::UnexpectedPacket))
                }
            }
            ContentType::ApplicationData => {
                if want == ContentType::Handshake {
                    // Rehandshake in progress; keep the data and let the
                    // caller decide.
                    self.pending
                        .application
                        .push_back((sequence.sequence_number, fragment));
                    Err(Error::GotApplicationData)
                } else {
                    self.buffers.push(fragment);
                    Err(self.violation(Error::UnexpectedPacket))
                }
            }
            ContentType::Handshake => self.classify_stray_handshake(sequence, fragment),
            ContentType::Unknown(value) => {
                debug!("Record with unknown content type {}", value);
                self.buffers.push(fragment);
                Err(self.violation(Error::UnexpectedPacket))
            }
        }
    }

    /// A handshake record arrived while the caller wanted something else.
    fn classify_stray_handshake(
        &mut self,
        sequence: Sequence,
        fragment: Buf,
    ) -> Result<(), Error> {
        let dtls = self.config.dtls();

        // A replayed flight from the peer means our last flight was lost.
        // Retransmit instead of delivering the stale handshake upward.
        if dtls {
            let replaying = self
                .retransmit
                .as_ref()
                .map(|c| c.is_async() && c.timer_active())
                .unwrap_or(false);
            if replaying {
                self.buffers.push(fragment);
                return self.drive_retransmit();
            }
        }

        let msg_type = fragment.first().copied().map(HandshakeType::from_u8);
        match msg_type {
            Some(HandshakeType::HelloRequest) if self.role == Role::Client => {
                // A rehandshake hint; consumed, we keep waiting for data.
                debug!("Consuming HelloRequest");
                self.buffers.push(fragment);
                Ok(())
            }
            Some(HandshakeType::ClientHello)
                if self.role == Role::Server && !self.handshaking =>
            {
                debug!("ClientHello outside handshake, signaling rehandshake");
                self.pending
                    .handshake
                    .push_back((sequence.sequence_number, fragment));
                Err(Error::Rehandshake)
            }
            _ => {
                self.buffers.push(fragment);
                Err(self.violation(Error::UnexpectedPacket))
            }
        }
    }

    fn drive_retransmit(&mut self) -> Result<(), Error> {
        self.state.recv_state = RecvState::DtlsRetransmit;
        let Some(controller) = &mut self.retransmit else {
            self.state.recv_state = RecvState::Normal;
            return Ok(());
        };
        match controller.retransmit() {
            Ok(RetransmitProgress::Complete) => {
                trace!("Flight retransmission complete");
                self.state.recv_state = RecvState::Normal;
                Ok(())
            }
            Ok(RetransmitProgress::InProgress) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn handle_alert(&mut self, fragment: &[u8]) -> Result<(), Error> {
        let alert = match Alert::parse(fragment) {
            Ok(alert) => alert,
            Err(e) => return Err(self.violation(e)),
        };

        if alert.level == AlertLevel::Fatal {
            warn!("Fatal alert received: {}", alert.description);
            self.invalidate(true);
            return Err(Error::FatalAlertReceived(alert.description));
        }

        if alert.is_close_notify() {
            debug!("close_notify received");
            self.state.read_eof = true;
            return Ok(());
        }

        debug!("Warning alert received: {}", alert.description);
        Err(Error::WarningAlertReceived(alert.description))
    }

    // ========================================================================
    // Send path
    // ========================================================================

    /// Seal and send one record of `data` under the selected epoch.
    ///
    /// Returns how many bytes of `data` were consumed, which may be less
    /// than `data.len()` on a stream transport (the caller continues with
    /// the rest). A retryable transport error leaves the sealed record
    /// buffered; re-invoke with the same arguments, or empty data plus
    /// [`SendFlags::resume`], to flush it.
    pub fn send(
        &mut self,
        content_type: ContentType,
        handshake_subtype: Option<HandshakeType>,
        selector: EpochSelector,
        data: &[u8],
        min_pad: usize,
        flags: SendFlags,
    ) -> Result<usize, Error> {
        let is_alert = content_type == ContentType::Alert;
        if (self.state.invalid || self.state.may_not_write) && !is_alert {
            return Err(Error::InvalidSession);
        }

        // A previous record is still on its way out; flush it rather than
        // encrypting anything new.
        if self.tx_pending.is_some() {
            return self.flush_tx_pending();
        }

        if data.is_empty() {
            if flags.resume {
                return Ok(0);
            }
            return Err(Error::InvalidRequest("empty send with nothing to resume"));
        }

        let dtls = self.config.dtls();
        let version = self.wire_version();

        let params = self.store.get_mut(selector)?;
        params.ensure_initialized()?;

        let n = if dtls {
            let overhead = DTLS_HEADER_LEN + params.write.max_overhead();
            let limit = self
                .max_record_size
                .min(self.config.mtu().saturating_sub(overhead));
            if data.len() > limit {
                return Err(Error::LargePacket);
            }
            data.len()
        } else {
            data.len().min(self.max_record_size)
        };

        let sequence = Sequence {
            epoch: params.epoch(),
            sequence_number: params.write.seq.value(),
        };

        let mut fragment = self.buffers.pop();
        fragment.extend_from_slice(&data[..n]);
        let sealed = seal::seal(
            &mut params.write,
            &mut self.rng,
            content_type,
            version,
            dtls,
            sequence,
            &mut fragment,
            min_pad,
        );
        if let Err(e) = sealed {
            self.buffers.push(fragment);
            return Err(e);
        }

        let header = RecordHeader::new(content_type, version, sequence, fragment.len() as u16);
        let mut wire = self.buffers.pop();
        header.serialize(dtls, &mut wire);
        wire.extend_from_slice(&fragment);
        self.buffers.push(fragment);

        // The ciphertext is committed; the counter must advance before any
        // I/O so a retry can never reuse the sequence number.
        if let Err(e) = params.write.seq.increment() {
            warn!("Write sequence counter exhausted");
            self.invalidate(true);
            return Err(e);
        }

        match handshake_subtype {
            Some(subtype) => trace!(
                "Sending {} ({:?}) record {}, {} bytes",
                content_type,
                subtype,
                sequence,
                n
            ),
            None => trace!("Sending {} record {}, {} bytes", content_type, sequence, n),
        }
        self.tx_pending = Some(TxPending {
            wire,
            offset: 0,
            user_len: n,
        });
        self.flush_tx_pending()
    }

    /// Convenience: send application data under the current write epoch.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.send(
            ContentType::ApplicationData,
            None,
            EpochSelector::WriteCurrent,
            data,
            0,
            SendFlags::default(),
        )
    }

    /// Convenience: send one handshake message fragment.
    pub fn send_handshake(
        &mut self,
        subtype: HandshakeType,
        selector: EpochSelector,
        data: &[u8],
    ) -> Result<usize, Error> {
        self.send(
            ContentType::Handshake,
            Some(subtype),
            selector,
            data,
            0,
            SendFlags::default(),
        )
    }

    /// Send an alert. Fatal alerts invalidate the session once written.
    pub fn send_alert(
        &mut self,
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), Error> {
        let body = [level.as_u8(), description.as_u8()];
        self.send(
            ContentType::Alert,
            None,
            EpochSelector::WriteCurrent,
            &body,
            0,
            SendFlags::default(),
        )?;
        if level == AlertLevel::Fatal {
            self.invalidate(true);
        }
        Ok(())
    }

    fn flush_tx_pending(&mut self) -> Result<usize, Error> {
        let Some(pending) = self.tx_pending.as_mut() else {
            return Ok(0);
        };

        while pending.offset < pending.wire.len() {
            match self.transport.write(&pending.wire[pending.offset..]) {
                Ok(0) => {
                    // The transport accepted nothing and reported no
                    // retryable condition; writes are no longer safe.
                    self.state.may_not_write = true;
                    self.state.resumable = false;
                    return Err(Error::Transport("write accepted zero bytes".to_string()));
                }
                Ok(n) => pending.offset += n,
                Err(e) if e.is_retryable() => {
                    trace!(
                        "Record write interrupted at {}/{} bytes",
                        pending.offset,
                        pending.wire.len()
                    );
                    return Err(e);
                }
                Err(e) => {
                    self.state.may_not_write = true;
                    self.state.resumable = false;
                    return Err(e);
                }
            }
        }

        let done = self.tx_pending.take().expect("checked above");
        let user_len = done.user_len;
        self.buffers.push(done.wire);
        self.transport.flush()?;
        Ok(user_len)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Run the clean close sequence.
    ///
    /// Sends close_notify, stops writes, and for [`ShutdownHow::ReadWrite`]
    /// waits for the peer's close_notify. Resumable: a retryable error
    /// leaves the sequence where it was and the call can be repeated.
    pub fn bye(&mut self, how: ShutdownHow) -> Result<(), Error> {
        loop {
            match self.bye_state {
                ByeState::SendClose => {
                    self.send_alert(AlertLevel::Warning, AlertDescription::CloseNotify)?;
                    self.state.may_not_write = true;
                    self.bye_state = if how == ShutdownHow::ReadWrite && !self.state.read_eof {
                        ByeState::RecvClose
                    } else {
                        ByeState::Done
                    };
                }
                ByeState::RecvClose => {
                    let mut scratch = [0u8; 1024];
                    match self.recv(ContentType::ApplicationData, &mut scratch) {
                        // Straggler data after our close is discarded.
                        Ok(n) if n > 0 => {}
                        Ok(_) => self.bye_state = ByeState::Done,
                        Err(e) => return Err(e),
                    }
                }
                ByeState::Done => return Ok(()),
            }
        }
    }
}
