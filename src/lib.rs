//! Handshake layer for TLS 1.2, TLS 1.3 and QUIC-TLS.
//!
//! Covers hello extensions and their negotiation, classical, KEM and hybrid
//! key exchange, the TLS 1.3 key schedule, the TLS 1.2 PRF and master
//! secret, and fragmentation of handshake messages into records or QUIC
//! CRYPTO frames.
//!
//! Record protection, certificate path validation and the transport itself
//! are collaborators: traffic secrets are handed out through
//! `take_traffic_keys`, signatures go through a [`CredentialStore`] and
//! records move through a [`Transport`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use handshaker::{Config, Connection, MemoryTransport};
//!
//! let config = Arc::new(Config::builder().alpn_protocols(&["h2"]).build().unwrap());
//! let (a, _b) = MemoryTransport::pair();
//! let mut client = Connection::client(config, a).unwrap();
//! client.process().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

pub mod alert;
pub mod buffer;
mod config;
mod connection;
pub mod credentials;
pub mod crypto;
mod error;
pub mod extension;
pub mod handshake;
mod negotiation;
mod quic;
pub mod record;
pub mod session;
pub mod transport;
pub mod types;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use config::{Config, ConfigBuilder};
pub use connection::Connection;
pub use credentials::{CredentialStore, EcdsaCredentials};
pub use crypto::{CryptoProvider, Direction, KeyBlock, Secret, TrafficSecret};
pub use error::{Error, FatalError};
pub use handshake::{
    ExportedKeys, HandshakeContext, HandshakeState, HandshakeType, Outgoing,
    PostHandshakeContext, Role,
};
pub use quic::QuicConnection;
pub use record::quic::KeySpace;
pub use record::CloseState;
pub use session::{MemorySessionCache, Session, SessionCache, SessionKey};
pub use transport::{MemoryTransport, Transport};
pub use types::{CipherSuite, NamedGroup, ProtocolVersion, SignatureScheme};
