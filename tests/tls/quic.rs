//! TLS 1.3 over QUIC CRYPTO frames.

use std::sync::Arc;

use handshaker::{
    AlertDescription, Config, ExportedKeys, KeySpace, NamedGroup, QuicConnection,
};

fn quic_config(params: &[(u64, &[u8])]) -> Arc<Config> {
    Arc::new(
        Config::builder()
            .alpn_protocols(&["h3"])
            .quic_transport_parameters(params)
            .unwrap()
            .build()
            .unwrap(),
    )
}

/// Move all pending CRYPTO data one way.
fn flow(from: &mut QuicConnection, to: &mut QuicConnection) -> bool {
    let mut moved = false;
    while let Some(space) = from.pending_space() {
        let data = from.take_crypto_data(space).unwrap();
        to.read_crypto_data(space, &data).unwrap();
        moved = true;
    }
    moved
}

#[test]
fn quic_handshake_and_ticket() {
    let _ = env_logger::try_init();

    let mut client = QuicConnection::client(quic_config(&[(0x01, &[0x40, 0x64])])).unwrap();
    let mut server = QuicConnection::server(quic_config(&[(0x03, &[0x45, 0xc0])])).unwrap();

    while flow(&mut client, &mut server) | flow(&mut server, &mut client) {}
    assert!(client.is_handshake_complete());
    assert!(server.is_handshake_complete());
    assert_eq!(server.alpn(), Some(&b"h3"[..]));
    assert_eq!(
        server.peer_transport_parameters(),
        Some(&[0x01, 0x02, 0x40, 0x64][..])
    );

    // Every exported secret yields packet keys.
    let suite = client.suite().unwrap();
    let mut count = 0;
    while let Some(ExportedKeys::Tls13(secret)) = client.take_traffic_keys() {
        let keys = QuicConnection::packet_keys(suite, &secret.secret).unwrap();
        assert_eq!(keys.iv.len(), 12);
        count += 1;
    }
    assert_eq!(count, 4);

    server.send_new_session_ticket().unwrap();
    assert_eq!(server.pending_space(), Some(KeySpace::Application));
    assert!(flow(&mut server, &mut client));
}

#[test]
fn quic_hybrid_is_the_default_share() {
    let mut client = QuicConnection::client(quic_config(&[])).unwrap();
    let hello = client.take_crypto_data(KeySpace::Initial).unwrap();
    // X25519MLKEM768 share: 1184 + 32 bytes.
    assert!(hello.len() > 1216);
}

#[test]
fn quic_failure_maps_to_crypto_error() {
    let _ = env_logger::try_init();

    let client_config = Arc::new(
        Config::builder()
            .groups(&[NamedGroup::X25519])
            .alpn_protocols(&["h3"])
            .quic_transport_parameters(&[])
            .unwrap()
            .build()
            .unwrap(),
    );
    let server_config = Arc::new(
        Config::builder()
            .groups(&[NamedGroup::X25519])
            .alpn_protocols(&["doq"])
            .quic_transport_parameters(&[])
            .unwrap()
            .build()
            .unwrap(),
    );
    let mut client = QuicConnection::client(client_config).unwrap();
    let mut server = QuicConnection::server(server_config).unwrap();

    let hello = client.take_crypto_data(KeySpace::Initial).unwrap();
    let err = server
        .read_crypto_data(KeySpace::Initial, &hello)
        .unwrap_err();
    assert_eq!(err.alert, AlertDescription::HandshakeFailure);
    assert_eq!(server.error_code(), Some(0x128));
    assert_eq!(server.pending_space(), None);
}
