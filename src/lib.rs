#![forbid(unsafe_code)]
#![warn(clippy::all)]

//! A TLS/DTLS record layer.
//!
//! Turns a reliable or unreliable transport into authenticated,
//! optionally-encrypted content-typed message streams, and demultiplexes
//! received records into handshake, alert, change-cipher-spec, heartbeat
//! and application-data streams. Key exchange, certificates and sockets
//! live elsewhere; this crate drives them through the traits in
//! [`crypto`] and [`transport`].

pub mod alert;
pub mod buffer;
pub mod crypto;
pub mod transport;

mod config;
mod error;
mod framer;
mod params;
mod rng;
mod seal;
mod seq;
mod session;
mod types;
mod window;

pub use config::{Config, ConfigBuilder};
pub use error::Error;
pub use framer::{HeaderContext, RecordHeader, DTLS_HEADER_LEN, TLS_HEADER_LEN};
pub use params::{DirectionState, EpochSelector, ParamStore, RecordParameters};
pub use seal::{open, seal};
pub use seq::{SeqNumber, DTLS_SEQ_MAX};
pub use session::{RecordSession, RecvState, SendFlags, SessionRecordState, ShutdownHow};
pub use types::{ContentType, HandshakeType, ProtocolVersion, Role, Sequence};
pub use window::ReplayWindow;
