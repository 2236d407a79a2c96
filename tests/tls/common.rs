//! Shared helpers for the handshake integration tests.

#![allow(unused)]

use std::sync::Arc;

use handshaker::{
    Config, ConfigBuilder, Connection, EcdsaCredentials, ExportedKeys, FatalError,
    MemoryTransport, ProtocolVersion,
};

pub type Conn = Connection<MemoryTransport>;

/// Run both ends until neither has anything left to do.
pub fn drive(client: &mut Conn, server: &mut Conn) -> Result<(), FatalError> {
    for _ in 0..16 {
        server.process()?;
        client.process()?;
        if client.is_handshake_complete() && server.is_handshake_complete() {
            break;
        }
    }
    Ok(())
}

/// Handshake over an in-memory pipe, panicking on failure.
pub fn connect(client: Arc<Config>, server: Arc<Config>) -> (Conn, Conn) {
    let (a, b) = MemoryTransport::pair();
    let mut client = Connection::client(client, a).expect("client");
    let mut server = Connection::server(server, b).expect("server");
    drive(&mut client, &mut server).expect("handshake");
    assert!(client.is_handshake_complete(), "client not complete");
    assert!(server.is_handshake_complete(), "server not complete");
    (client, server)
}

pub fn config(builder: ConfigBuilder) -> Arc<Config> {
    Arc::new(builder.build().expect("config"))
}

/// TLS 1.2 builders: the server signs with a fresh P-256 key the client trusts.
pub fn tls12_builders() -> (ConfigBuilder, ConfigBuilder) {
    let server_creds = EcdsaCredentials::generate_p256();
    let public = server_creds.public_key().expect("public key");
    let client_creds = EcdsaCredentials::new().trust(&public).expect("trust");
    (
        Config::builder()
            .versions(&[ProtocolVersion::TLS1_2])
            .with_credentials(Arc::new(client_creds)),
        Config::builder().with_credentials(Arc::new(server_creds)),
    )
}

/// Send `data` one way and read it back on the other end.
pub fn transfer(from: &mut Conn, to: &mut Conn, data: &[u8]) -> Vec<u8> {
    from.write(data).expect("write");
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    while out.len() < data.len() {
        let n = to.read(&mut buf).expect("read");
        assert!(n > 0, "no data after {} bytes", out.len());
        out.extend_from_slice(&buf[..n]);
    }
    out
}

/// Every TLS 1.3 traffic secret exported so far, as (epoch, direction, bytes).
pub fn tls13_secrets(conn: &mut Conn) -> Vec<(u16, handshaker::Direction, Vec<u8>)> {
    let mut out = Vec::new();
    while let Some(keys) = conn.take_traffic_keys() {
        if let ExportedKeys::Tls13(s) = keys {
            out.push((s.epoch, s.direction, s.secret.as_bytes().to_vec()));
        }
    }
    out
}
