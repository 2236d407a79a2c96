//! TLS 1.2 ECDHE and DHE handshakes with signed ServerKeyExchange.

use std::sync::Arc;
use std::time::Duration;

use handshaker::{
    AlertDescription, CipherSuite, Config, Connection, EcdsaCredentials, Error, ExportedKeys,
    MemorySessionCache, MemoryTransport, NamedGroup, ProtocolVersion, SessionCache, SessionKey,
};

use crate::common::*;

#[test]
fn tls12_ecdhe_handshake() {
    let _ = env_logger::try_init();

    let (client, server) = tls12_builders();
    let (mut client, mut server) = connect(config(client), config(server));
    assert_eq!(client.version(), Some(ProtocolVersion::TLS1_2));
    assert_eq!(
        server.suite(),
        Some(CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256)
    );

    assert_eq!(transfer(&mut client, &mut server, b"ping"), b"ping");
    assert_eq!(transfer(&mut server, &mut client, b"pong"), b"pong");
}

#[test]
fn tls12_key_blocks_match() {
    let (client, server) = tls12_builders();
    let (mut client, mut server) = connect(config(client), config(server));

    let Some(ExportedKeys::Tls12(client_block)) = client.take_traffic_keys() else {
        panic!("no client key block");
    };
    let Some(ExportedKeys::Tls12(server_block)) = server.take_traffic_keys() else {
        panic!("no server key block");
    };
    assert_eq!(client_block.client_write_key, server_block.client_write_key);
    assert_eq!(client_block.server_write_iv, server_block.server_write_iv);
    assert_eq!(client_block.client_write_key.len(), 16);
}

#[test]
fn tls12_each_curve() {
    for group in [NamedGroup::Secp256r1, NamedGroup::Secp384r1, NamedGroup::X25519] {
        let (client, server) = tls12_builders();
        let (mut client, mut server) = connect(
            config(client.groups(&[group])),
            config(server.groups(&[group])),
        );
        assert_eq!(transfer(&mut client, &mut server, b"x"), b"x", "{:?}", group);
    }
}

#[test]
fn tls12_dhe_handshake() {
    let _ = env_logger::try_init();

    let (client, server) = tls12_builders();
    let (mut client, mut server) = connect(
        config(client.cipher_suites(&[CipherSuite::DHE_RSA_AES128_GCM_SHA256])),
        config(server),
    );
    assert_eq!(client.suite(), Some(CipherSuite::DHE_RSA_AES128_GCM_SHA256));
    assert_eq!(transfer(&mut client, &mut server, b"finite field"), b"finite field");
}

#[test]
fn tls12_exporters_agree() {
    let (client, server) = tls12_builders();
    let (mut client, mut server) = connect(
        config(client.extended_master_secret(false)),
        config(server),
    );
    let a = client
        .export_keying_material("EXTRACTOR-test", Some(b"context"), 32)
        .unwrap();
    let b = server
        .export_keying_material("EXTRACTOR-test", Some(b"context"), 32)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn tls12_untrusted_server_key() {
    let _ = env_logger::try_init();

    let stranger = EcdsaCredentials::generate_p256().public_key().unwrap();
    let client_creds = EcdsaCredentials::new().trust(&stranger).unwrap();
    let client = Config::builder()
        .versions(&[ProtocolVersion::TLS1_2])
        .with_credentials(Arc::new(client_creds));
    let (_, server) = tls12_builders();

    let (a, b) = MemoryTransport::pair();
    let mut client = Connection::client(config(client), a).unwrap();
    let mut server = Connection::server(config(server), b).unwrap();
    server.process().unwrap();

    let err = client.process().unwrap_err();
    assert_eq!(err.alert, AlertDescription::HandshakeFailure);

    let err = server.process().unwrap_err();
    assert_eq!(err.alert, AlertDescription::HandshakeFailure);
}

#[test]
fn tls12_sessions_are_cached() {
    let _ = env_logger::try_init();

    let client_cache = Arc::new(MemorySessionCache::new(4, Duration::from_secs(600)));
    let server_cache = Arc::new(MemorySessionCache::new(4, Duration::from_secs(600)));
    let (client, server) = tls12_builders();
    let (client, _server) = connect(
        config(
            client
                .server_name("db.internal")
                .peer_port(5432)
                .with_session_cache(client_cache.clone()),
        ),
        config(server.with_session_cache(server_cache.clone())),
    );
    assert!(client.is_handshake_complete());

    let session = client_cache
        .get(&SessionKey::HostPort("db.internal".into(), 5432))
        .expect("client session");
    assert_eq!(session.version, ProtocolVersion::TLS1_2);
    assert_eq!(session.secret.len(), 48);
    assert!(session.extended_master_secret);

    let stored = server_cache
        .get(&SessionKey::Id(session.id.clone()))
        .expect("server session");
    assert_eq!(stored.secret, session.secret);
}

#[test]
fn tls12_has_no_key_update() {
    let (client, server) = tls12_builders();
    let (mut client, _) = connect(config(client), config(server));
    assert!(matches!(
        client.key_update(false),
        Err(Error::UnsupportedOperation(_))
    ));
}
