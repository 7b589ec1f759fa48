//! Shared helpers for record layer integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use reclay::buffer::Buf;
use reclay::crypto::provider::{SuiteId, SupportedSuite};
use reclay::crypto::{rust_crypto, KeyMaterial};
use reclay::transport::PipeTransport;
use reclay::{
    Config, ContentType, DirectionState, ProtocolVersion, RecordHeader, RecordSession, Role,
    Sequence,
};

pub type Session = RecordSession<PipeTransport>;

pub fn tls_pair() -> (Session, Session) {
    tls_pair_with(|b| b)
}

pub fn tls_pair_with(
    f: impl Fn(reclay::ConfigBuilder) -> reclay::ConfigBuilder,
) -> (Session, Session) {
    let client_config = Arc::new(f(Config::builder()).rng_seed(11).build());
    let server_config = Arc::new(f(Config::builder()).rng_seed(22).build());
    let client = RecordSession::new(client_config, PipeTransport::stream(), Role::Client);
    let server = RecordSession::new(server_config, PipeTransport::stream(), Role::Server);
    (client, server)
}

pub fn dtls_pair() -> (Session, Session) {
    dtls_pair_with(|b| b)
}

pub fn dtls_pair_with(
    f: impl Fn(reclay::ConfigBuilder) -> reclay::ConfigBuilder,
) -> (Session, Session) {
    let client_config = Arc::new(f(Config::builder().dtls(true)).rng_seed(11).build());
    let server_config = Arc::new(f(Config::builder().dtls(true)).rng_seed(22).build());
    let client = RecordSession::new(client_config, PipeTransport::dgram(), Role::Client);
    let server = RecordSession::new(server_config, PipeTransport::dgram(), Role::Server);
    (client, server)
}

/// Move everything `from` wrote over to `to`'s read queue.
pub fn deliver(from: &mut Session, to: &mut Session) {
    let packets: Vec<Vec<u8>> = from.transport_mut().tx.drain(..).collect();
    to.transport_mut().rx.extend(packets);
}

/// Drain `from`'s written packets without delivering them.
pub fn capture(from: &mut Session) -> Vec<Vec<u8>> {
    from.transport_mut().tx.drain(..).collect()
}

/// Install AES-128-GCM keys as the next epoch on both sides and promote
/// both directions, the way a finished handshake would.
pub fn install_gcm_epoch(client: &mut Session, server: &mut Session, dtls: bool) {
    let provider = rust_crypto::default_provider();
    let suite = provider.find(SuiteId::AES_128_GCM_SHA256).unwrap();

    let client_write_keys = KeyMaterial::new(&[0x11; 16], &[], &[1, 2, 3, 4]);
    let server_write_keys = KeyMaterial::new(&[0x22; 16], &[], &[5, 6, 7, 8]);

    let read = DirectionState::new(suite.new_direction(&server_write_keys).unwrap(), dtls, true);
    let write = DirectionState::new(suite.new_direction(&client_write_keys).unwrap(), dtls, false);
    client.params_mut().install_next(read, write).unwrap();
    client.params_mut().promote_write().unwrap();
    client.params_mut().promote_read().unwrap();

    let read = DirectionState::new(suite.new_direction(&client_write_keys).unwrap(), dtls, true);
    let write = DirectionState::new(suite.new_direction(&server_write_keys).unwrap(), dtls, false);
    server.params_mut().install_next(read, write).unwrap();
    server.params_mut().promote_write().unwrap();
    server.params_mut().promote_read().unwrap();

    let version = if dtls {
        ProtocolVersion::Dtls1_2
    } else {
        ProtocolVersion::Tls1_2
    };
    client.set_version(version);
    server.set_version(version);
    client.set_handshaking(false);
    server.set_handshaking(false);
    client.set_expect_client_hello(false);
    server.set_expect_client_hello(false);
}

/// Hand-frame an unprotected record the way the peer's epoch 0 would.
pub fn raw_record(
    content_type: ContentType,
    version: ProtocolVersion,
    sequence: Sequence,
    dtls: bool,
    body: &[u8],
) -> Vec<u8> {
    let header = RecordHeader::new(content_type, version, sequence, body.len() as u16);
    let mut wire = Buf::new();
    header.serialize(dtls, &mut wire);
    wire.extend_from_slice(body);
    wire.into_vec()
}
