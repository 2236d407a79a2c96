//! TLS 1.3 handshakes between two in-memory endpoints.

use std::sync::Arc;

use handshaker::{
    AlertDescription, CipherSuite, Config, Connection, Direction, MemoryTransport, NamedGroup,
    ProtocolVersion,
};

use crate::common::*;

#[test]
fn tls13_default_hybrid_handshake() {
    let _ = env_logger::try_init();

    let (mut client, mut server) = connect(
        config(Config::builder()),
        config(Config::builder()),
    );
    assert_eq!(client.version(), Some(ProtocolVersion::TLS1_3));
    assert_eq!(server.version(), Some(ProtocolVersion::TLS1_3));
    assert_eq!(client.suite(), Some(CipherSuite::TLS_AES_128_GCM_SHA256));

    assert_eq!(transfer(&mut client, &mut server, b"hello server"), b"hello server");
    assert_eq!(transfer(&mut server, &mut client, b"hello client"), b"hello client");
}

#[test]
fn tls13_every_key_share_group() {
    let _ = env_logger::try_init();

    for group in [
        NamedGroup::X25519,
        NamedGroup::Secp256r1,
        NamedGroup::Secp384r1,
        NamedGroup::MlKem768,
        NamedGroup::SecP256r1MlKem768,
        NamedGroup::X25519MlKem768,
    ] {
        let builder = || Config::builder().groups(&[group]).key_share_groups(&[group]);
        let (mut client, mut server) = connect(config(builder()), config(builder()));
        assert_eq!(
            transfer(&mut client, &mut server, b"x"),
            b"x",
            "data over {:?}",
            group
        );
    }
}

#[test]
fn tls13_traffic_secrets_pair_up() {
    let (mut client, mut server) = connect(
        config(Config::builder().groups(&[NamedGroup::X25519])),
        config(Config::builder().groups(&[NamedGroup::X25519])),
    );
    let client_secrets = tls13_secrets(&mut client);
    let server_secrets = tls13_secrets(&mut server);
    assert_eq!(client_secrets.len(), 4);
    assert_eq!(server_secrets.len(), 4);

    for (epoch, direction, secret) in &client_secrets {
        let opposite = match direction {
            Direction::Read => Direction::Write,
            Direction::Write => Direction::Read,
        };
        let peer = server_secrets
            .iter()
            .find(|(e, d, _)| e == epoch && *d == opposite)
            .expect("matching secret");
        assert_eq!(&peer.2, secret, "epoch {} {:?}", epoch, direction);
    }
}

#[test]
fn tls13_server_preference_for_suite() {
    let (client, _) = connect(
        config(Config::builder().groups(&[NamedGroup::X25519])),
        config(
            Config::builder()
                .groups(&[NamedGroup::X25519])
                .cipher_suites(&[
                    CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
                    CipherSuite::TLS_AES_128_GCM_SHA256,
                ]),
        ),
    );
    assert_eq!(client.suite(), Some(CipherSuite::TLS_CHACHA20_POLY1305_SHA256));
}

#[test]
fn tls13_alpn_selected() {
    let (client, server) = connect(
        config(Config::builder().alpn_protocols(&["h2", "http/1.1"])),
        config(Config::builder().alpn_protocols(&["http/1.1", "h2"])),
    );
    assert_eq!(client.alpn(), Some(&b"http/1.1"[..]));
    assert_eq!(server.alpn(), Some(&b"http/1.1"[..]));
}

#[test]
fn tls13_alpn_mismatch_fails() {
    let _ = env_logger::try_init();

    let (a, b) = MemoryTransport::pair();
    let mut client =
        Connection::client(config(Config::builder().alpn_protocols(&["h2"])), a).unwrap();
    let mut server =
        Connection::server(config(Config::builder().alpn_protocols(&["smtp"])), b).unwrap();

    let err = server.process().unwrap_err();
    assert_eq!(err.alert, AlertDescription::HandshakeFailure);

    let err = client.process().unwrap_err();
    assert_eq!(err.alert, AlertDescription::HandshakeFailure);
    assert!(!client.is_handshake_complete());
}

#[test]
fn tls13_without_common_share_fails() {
    let (a, b) = MemoryTransport::pair();
    let mut client = Connection::client(
        config(
            Config::builder()
                .groups(&[NamedGroup::X25519, NamedGroup::Secp256r1])
                .key_share_groups(&[NamedGroup::X25519]),
        ),
        a,
    )
    .unwrap();
    let mut server =
        Connection::server(config(Config::builder().groups(&[NamedGroup::Secp256r1])), b)
            .unwrap();

    let err = server.process().unwrap_err();
    assert_eq!(err.alert, AlertDescription::HandshakeFailure);
    assert!(client.process().is_err());
}

#[test]
fn tls13_key_update_both_ways() {
    let _ = env_logger::try_init();

    let (mut client, mut server) = connect(
        config(Config::builder().groups(&[NamedGroup::X25519])),
        config(Config::builder().groups(&[NamedGroup::X25519])),
    );
    tls13_secrets(&mut client);
    tls13_secrets(&mut server);

    client.key_update(true).unwrap();
    assert_eq!(transfer(&mut client, &mut server, b"after"), b"after");
    client.process().unwrap();

    let client_secrets = tls13_secrets(&mut client);
    let server_secrets = tls13_secrets(&mut server);
    assert!(client_secrets.iter().any(|(e, d, _)| *e == 3 && *d == Direction::Write));
    assert!(client_secrets.iter().any(|(e, d, _)| *e == 3 && *d == Direction::Read));
    assert!(server_secrets.iter().any(|(e, d, _)| *e == 3 && *d == Direction::Read));
    assert!(server_secrets.iter().any(|(e, d, _)| *e == 3 && *d == Direction::Write));

    assert_eq!(transfer(&mut server, &mut client, b"still"), b"still");
}

#[test]
fn tls13_exporters_agree() {
    let (mut client, mut server) = connect(
        config(Config::builder().groups(&[NamedGroup::X25519])),
        config(Config::builder().groups(&[NamedGroup::X25519])),
    );
    let a = client
        .export_keying_material("EXPORTER-handshaker", None, 48)
        .unwrap();
    let b = server
        .export_keying_material("EXPORTER-handshaker", None, 48)
        .unwrap();
    assert_eq!(a.len(), 48);
    assert_eq!(a, b);
}

#[test]
fn tls13_max_fragment_length_splits_records() {
    let _ = env_logger::try_init();

    let (mut client, mut server) = connect(
        config(
            Config::builder()
                .groups(&[NamedGroup::X25519])
                .max_fragment_length(512),
        ),
        config(Config::builder().groups(&[NamedGroup::X25519])),
    );

    let data = vec![0x5a; 2000];
    server.write(&data).unwrap();
    assert_eq!(client.transport().pending(), 4);

    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    while received.len() < data.len() {
        let n = client.read(&mut buf).unwrap();
        assert!(n > 0 && n <= 512);
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received, data);
}

#[test]
fn tls13_close_notify() {
    let (mut client, mut server) = connect(
        config(Config::builder().groups(&[NamedGroup::X25519])),
        config(Config::builder().groups(&[NamedGroup::X25519])),
    );
    server.close().unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(client.read(&mut buf).unwrap(), 0);
    assert!(client.is_peer_closed());
    assert!(server.write(b"late").is_err());
}

#[test]
fn quic_config_is_rejected_by_tls_connection() {
    let (a, _) = MemoryTransport::pair();
    let config = Arc::new(
        Config::builder()
            .quic_transport_parameters(&[(1, &[0])])
            .unwrap()
            .build()
            .unwrap(),
    );
    assert!(Connection::client(config, a).is_err());
}
