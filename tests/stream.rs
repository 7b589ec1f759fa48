//! TLS (stream transport) record layer tests.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use reclay::transport::{HeartbeatHandler, Transport};
use reclay::alert::{AlertDescription, AlertLevel};
use reclay::{
    Config, ContentType, EpochSelector, Error, ProtocolVersion, RecordSession, Role, Sequence,
};

#[test]
fn ordered_delivery_of_three_records() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    install_gcm_epoch(&mut client, &mut server, false);

    let first = vec![0xaa; 100];
    let second = vec![0xbb; 4096];
    let third = vec![0xcc; 1];

    assert_eq!(client.send_application_data(&first).unwrap(), 100);
    assert_eq!(client.send_application_data(&second).unwrap(), 4096);
    assert_eq!(client.send_application_data(&third).unwrap(), 1);
    deliver(&mut client, &mut server);

    let mut buf = vec![0u8; 100];
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        100
    );
    assert_eq!(buf, first);

    let mut buf = vec![0u8; 4096];
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        4096
    );
    assert_eq!(buf, second);

    let mut buf = vec![0u8; 16];
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        1
    );
    assert_eq!(buf[0], 0xcc);
}

#[test]
fn write_counter_matches_send_count() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    install_gcm_epoch(&mut client, &mut server, false);

    for _ in 0..17 {
        client.send_application_data(b"tick").unwrap();
    }

    let params = client.params().get(EpochSelector::WriteCurrent).unwrap();
    assert_eq!(params.write.seq.value(), 17);
}

#[test]
fn interrupted_send_resumes_without_reusing_sequence() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    install_gcm_epoch(&mut client, &mut server, false);

    client.send_application_data(b"first").unwrap();

    // The transport jams; the sealed record stays buffered.
    client.transport_mut().block_writes = true;
    assert!(matches!(
        client.send_application_data(b"second"),
        Err(Error::WouldBlock)
    ));

    // The counter advanced exactly once for the committed ciphertext.
    let seq = client
        .params()
        .get(EpochSelector::WriteCurrent)
        .unwrap()
        .write
        .seq
        .value();
    assert_eq!(seq, 2);

    // Retry with identical arguments once the transport recovers.
    client.transport_mut().block_writes = false;
    assert_eq!(client.send_application_data(b"second").unwrap(), 6);
    let seq = client
        .params()
        .get(EpochSelector::WriteCurrent)
        .unwrap()
        .write
        .seq
        .value();
    assert_eq!(seq, 2, "flush must not re-encrypt");

    deliver(&mut client, &mut server);
    let mut buf = vec![0u8; 64];
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        5
    );
    assert_eq!(&buf[..5], b"first");
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        6
    );
    assert_eq!(&buf[..6], b"second");
}

#[test]
fn partial_transport_writes_complete() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    install_gcm_epoch(&mut client, &mut server, false);

    // The transport accepts only 7 bytes per call; the send path loops.
    client.transport_mut().write_limit = Some(7);
    assert_eq!(client.send_application_data(b"chunked payload").unwrap(), 15);

    deliver(&mut client, &mut server);
    let mut buf = vec![0u8; 64];
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        15
    );
    assert_eq!(&buf[..15], b"chunked payload");
}

#[test]
fn corrupted_record_invalidates_tls_session() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    install_gcm_epoch(&mut client, &mut server, false);

    client.send_application_data(b"sensitive").unwrap();
    let mut packets = capture(&mut client);
    // Flip one ciphertext byte past the 5-byte header.
    let last = packets[0].len() - 1;
    packets[0][last] ^= 0x01;
    server.transport_mut().rx.extend(packets);

    let mut buf = vec![0u8; 64];
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::DecryptionFailed)
    ));
    assert!(server.state().invalid);
    assert!(!server.state().resumable);

    // The single reliable stream is now suspect; everything is refused.
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::InvalidSession)
    ));
    assert!(matches!(
        server.send_application_data(b"reply"),
        Err(Error::InvalidSession)
    ));
}

#[test]
fn close_notify_yields_clean_eof() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    install_gcm_epoch(&mut client, &mut server, false);

    client
        .send_alert(AlertLevel::Warning, AlertDescription::CloseNotify)
        .unwrap();
    deliver(&mut client, &mut server);

    let mut buf = vec![0u8; 64];
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        0
    );
    // EOF is sticky.
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        0
    );
    assert!(server.state().read_eof);
    assert!(!server.state().invalid);
}

#[test]
fn fatal_alert_makes_session_unresumable() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    install_gcm_epoch(&mut client, &mut server, false);

    client
        .send_alert(AlertLevel::Fatal, AlertDescription::HandshakeFailure)
        .unwrap();
    deliver(&mut client, &mut server);

    let mut buf = vec![0u8; 64];
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::FatalAlertReceived(AlertDescription::HandshakeFailure))
    ));
    assert!(!server.state().resumable);
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::InvalidSession)
    ));
    assert!(matches!(
        server.send_application_data(b"x"),
        Err(Error::InvalidSession)
    ));
}

#[test]
fn warning_alert_is_reported_but_not_fatal() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    install_gcm_epoch(&mut client, &mut server, false);

    client
        .send_alert(AlertLevel::Warning, AlertDescription::NoRenegotiation)
        .unwrap();
    client.send_application_data(b"still here").unwrap();
    deliver(&mut client, &mut server);

    let mut buf = vec![0u8; 64];
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::WarningAlertReceived(AlertDescription::NoRenegotiation))
    ));
    // The session keeps working.
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        10
    );
}

#[test]
fn empty_record_flood_is_bounded() {
    let _ = env_logger::try_init();
    let (_, mut server) = tls_pair_with(|b| b.max_empty_records(3));
    server.set_version(ProtocolVersion::Tls1_2);

    let empty = raw_record(
        ContentType::ApplicationData,
        ProtocolVersion::Tls1_2,
        Sequence::default(),
        false,
        &[],
    );

    // Exactly the limit: tolerated, the read just keeps waiting.
    for _ in 0..3 {
        server.transport_mut().inject(&empty);
    }
    let mut buf = vec![0u8; 16];
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::WouldBlock)
    ));
    assert!(!server.state().invalid);

    // One more consecutive empty record crosses the ceiling.
    server.transport_mut().inject(&empty);
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::TooManyEmptyRecords)
    ));
    assert!(server.state().invalid);
}

#[test]
fn application_data_during_rehandshake_is_buffered_and_reported() {
    let _ = env_logger::try_init();
    let (mut client, mut server) = tls_pair();
    server.set_version(ProtocolVersion::Tls1_2);
    client.set_version(ProtocolVersion::Tls1_2);

    client.send_application_data(b"early data").unwrap();
    deliver(&mut client, &mut server);

    // The server is waiting for a handshake message.
    let mut buf = vec![0u8; 64];
    assert!(matches!(
        server.recv(ContentType::Handshake, &mut buf),
        Err(Error::GotApplicationData)
    ));
    // The data was kept and is readable as application data.
    assert_eq!(
        server.recv(ContentType::ApplicationData, &mut buf).unwrap(),
        10
    );
    assert_eq!(&buf[..10], b"early data");
}

#[test]
fn client_hello_outside_handshake_signals_rehandshake() {
    let _ = env_logger::try_init();
    let (_, mut server) = tls_pair();
    server.set_version(ProtocolVersion::Tls1_2);
    server.set_handshaking(false);
    server.set_expect_client_hello(false);

    // First byte 0x01 marks a ClientHello handshake message.
    let hello = raw_record(
        ContentType::Handshake,
        ProtocolVersion::Tls1_2,
        Sequence::default(),
        false,
        &[0x01, 0x00, 0x00, 0x02, 0x03, 0x03],
    );
    server.transport_mut().inject(&hello);

    let mut buf = vec![0u8; 64];
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::Rehandshake)
    ));
    assert!(!server.state().invalid);

    // The hello is waiting in the handshake stream.
    let n = server.recv(ContentType::Handshake, &mut buf).unwrap();
    assert_eq!(n, 6);
    assert_eq!(buf[0], 0x01);
}

#[test]
fn hello_request_is_consumed_by_client() {
    let _ = env_logger::try_init();
    let (mut client, _) = tls_pair();
    client.set_version(ProtocolVersion::Tls1_2);

    let hello_request = raw_record(
        ContentType::Handshake,
        ProtocolVersion::Tls1_2,
        Sequence::default(),
        false,
        &[0x00, 0x00, 0x00, 0x00],
    );
    client.transport_mut().inject(&hello_request);

    // Consumed silently; the read keeps waiting for data.
    let mut buf = vec![0u8; 64];
    assert!(matches!(
        client.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::WouldBlock)
    ));
    assert!(!client.state().invalid);
}

#[test]
fn ssl2_compatible_client_hello_is_accepted() {
    let _ = env_logger::try_init();
    let (_, mut server) = tls_pair();
    // Fresh server: expecting a ClientHello, nothing negotiated.

    let body: Vec<u8> = (0..10).collect();
    let mut wire = vec![0x80, body.len() as u8];
    wire.extend_from_slice(&body);
    server.transport_mut().inject(&wire);

    let mut buf = vec![0u8; 64];
    let n = server.recv(ContentType::Handshake, &mut buf).unwrap();
    assert_eq!(n, 10);
    assert_eq!(&buf[..10], &body[..]);
}

#[test]
fn heartbeat_is_handed_off_to_the_handler() {
    let _ = env_logger::try_init();

    struct Recorder(Rc<RefCell<Vec<u8>>>);
    impl HeartbeatHandler for Recorder {
        fn handle(&mut self, record: &[u8]) -> bool {
            self.0.borrow_mut().extend_from_slice(record);
            true
        }
    }

    let (_, mut server) = tls_pair();
    server.set_version(ProtocolVersion::Tls1_2);
    let seen = Rc::new(RefCell::new(Vec::new()));
    server.set_heartbeat_handler(Box::new(Recorder(Rc::clone(&seen))));

    let ping = raw_record(
        ContentType::Heartbeat,
        ProtocolVersion::Tls1_2,
        Sequence::default(),
        false,
        &[0x01, 0x00, 0x04, b'p', b'i', b'n', b'g'],
    );
    server.transport_mut().inject(&ping);

    let mut buf = vec![0u8; 64];
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::WouldBlock)
    ));
    assert_eq!(&seen.borrow()[3..], b"ping");
    assert!(!server.state().invalid);
}

#[test]
fn change_cipher_spec_out_of_flow_is_fatal_on_tls() {
    let _ = env_logger::try_init();
    let (_, mut server) = tls_pair();
    server.set_version(ProtocolVersion::Tls1_2);

    let ccs = raw_record(
        ContentType::ChangeCipherSpec,
        ProtocolVersion::Tls1_2,
        Sequence::default(),
        false,
        &[0x01],
    );
    server.transport_mut().inject(&ccs);

    let mut buf = vec![0u8; 16];
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::UnexpectedPacket)
    ));
    assert!(server.state().invalid);
}

#[test]
fn receive_timeout_is_retryable() {
    let _ = env_logger::try_init();

    struct SilentTransport;
    impl Transport for SilentTransport {
        fn read(&mut self, _buf: &mut [u8], _timeout: Option<Duration>) -> Result<usize, Error> {
            Err(Error::Timedout)
        }
        fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
            Ok(data.len())
        }
    }

    let config = Arc::new(
        Config::builder()
            .recv_timeout(Some(Duration::from_millis(50)))
            .build(),
    );
    let mut session = RecordSession::new(config, SilentTransport, Role::Client);
    session.set_version(ProtocolVersion::Tls1_2);

    let mut buf = [0u8; 16];
    assert!(matches!(
        session.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::Timedout)
    ));
    // Expiry never corrupts committed state; the same call just repeats.
    assert!(matches!(
        session.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::Timedout)
    ));
    assert!(!session.state().invalid);
}

#[test]
fn transport_eof_mid_record_is_a_violation() {
    let _ = env_logger::try_init();
    let (_, mut server) = tls_pair();
    server.set_version(ProtocolVersion::Tls1_2);

    // A header promising 16 bytes, followed by silence.
    let truncated = raw_record(
        ContentType::ApplicationData,
        ProtocolVersion::Tls1_2,
        Sequence::default(),
        false,
        &[0u8; 16],
    );
    server.transport_mut().inject(&truncated[..10]);
    server.transport_mut().eof = true;

    let mut buf = vec![0u8; 64];
    assert!(matches!(
        server.recv(ContentType::ApplicationData, &mut buf),
        Err(Error::UnexpectedPacketLength)
    ));
    assert!(server.state().invalid);
}
