// Server handshake flows.
//
// TLS 1.3 (and QUIC):
//
// 1. ClientHello: pick version, suite and a group the client sent a share
//    for, answer the share, derive handshake secrets
// 2. Send ServerHello (epoch 0), then EncryptedExtensions and Finished
//    (epoch 1), derive application secrets and switch writing to epoch 2
// 3. Client Finished (epoch 1): verify, switch reading to epoch 2, derive
//    the resumption master secret
//
// TLS 1.2 (ECDHE or DHE):
//
// 1. ClientHello: send ServerHello, a signed ServerKeyExchange and
//    ServerHelloDone
// 2. ClientKeyExchange: derive the master secret
// 3. ChangeCipherSpec, then Finished: verify, send ChangeCipherSpec and our
//    Finished, store the session

use super::context::HandshakeContext;
use super::hello::{ClientHello, ServerHello, DOWNGRADE_TLS12};
use super::messages::{ClientKeyExchange, Finished, KeyExchangeParams, ServerKeyExchange};
use super::{check_verify_data, EncryptedExtensions, HandshakeType};
use crate::buffer::Buf;
use crate::crypto::key_schedule;
use crate::crypto::rust_crypto::{DhKey, DhParams};
use crate::crypto::{
    legacy, Credentials, Direction, KeyExchangeScheme, KeySchedule, Possession, SecretStage,
    ShareOrigin,
};
use crate::extension::{KeyShareEntry, MessageContext};
use crate::negotiation::{consume_extensions, produce_extensions};
use crate::types::{
    CipherSuite, KeyExchangeAlgorithm, NamedGroup, ProtocolVersion, Random, SignatureScheme,
};
use crate::Error;

const NO_COMPRESSION: u8 = 0;

pub(super) fn on_client_hello(
    ctx: &mut HandshakeContext,
    body: &[u8],
    raw: &[u8],
) -> Result<(), Error> {
    let hello = ClientHello::decode(body)?;
    if !hello.compression_methods.contains(&NO_COMPRESSION) {
        return Err(Error::IllegalParameter(
            "ClientHello without null compression".into(),
        ));
    }
    ctx.client_random = hello.random;
    ctx.transcript.update(raw);

    consume_extensions(ctx, MessageContext::ClientHello, &hello.extensions)?;
    if hello
        .cipher_suites
        .contains(&CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV)
    {
        ctx.negotiated.secure_renegotiation = true;
    }

    let version = select_version(ctx, &hello)?;
    let suite = select_suite(ctx, &hello, version)?;
    let hash = suite
        .hash_algorithm()
        .ok_or_else(|| Error::Internal(format!("no hash for {:?}", suite)))?;
    ctx.version = Some(version);
    ctx.suite = Some(suite);
    ctx.transcript.set_algorithm(hash)?;
    select_alpn(ctx)?;
    debug!("Selected {} with {:?}", version, suite);

    if version == ProtocolVersion::TLS1_3 {
        start_tls13(ctx, hello.session_id)
    } else {
        start_tls12(ctx)
    }
}

fn select_version(ctx: &HandshakeContext, hello: &ClientHello) -> Result<ProtocolVersion, Error> {
    let offered = &ctx.negotiated.peer_versions;
    let version = if !offered.is_empty() {
        ctx.config
            .versions()
            .iter()
            .copied()
            .find(|v| offered.contains(v))
    } else if hello.legacy_version == ProtocolVersion::TLS1_2
        && ctx.config.enables(ProtocolVersion::TLS1_2)
    {
        Some(ProtocolVersion::TLS1_2)
    } else {
        None
    };
    version.ok_or_else(|| {
        Error::NegotiationFailed(format!(
            "no common version (legacy {}, offered {:?})",
            hello.legacy_version, offered
        ))
    })
}

/// Curve for a TLS 1.2 ECDHE exchange. A client that sent no
/// supported_groups accepts any.
fn tls12_curve(ctx: &HandshakeContext) -> Option<NamedGroup> {
    let peer = &ctx.negotiated.peer_groups;
    ctx.config
        .groups()
        .iter()
        .copied()
        .find(|g| g.is_ec() && (peer.is_empty() || peer.contains(g)))
}

fn usable_tls12(ctx: &HandshakeContext, suite: CipherSuite) -> bool {
    let Some(store) = ctx.config.credentials() else {
        return false;
    };
    if signature_scheme(ctx, &store.signing_schemes()).is_none() {
        return false;
    }
    match suite.key_exchange() {
        Some(KeyExchangeAlgorithm::Ecdhe) => tls12_curve(ctx).is_some(),
        Some(KeyExchangeAlgorithm::Dhe) => ctx.config.groups().contains(&NamedGroup::Ffdhe2048),
        _ => false,
    }
}

fn select_suite(
    ctx: &HandshakeContext,
    hello: &ClientHello,
    version: ProtocolVersion,
) -> Result<CipherSuite, Error> {
    ctx.config
        .cipher_suites()
        .iter()
        .copied()
        .filter(|s| s.supports(version) && hello.cipher_suites.contains(s))
        .find(|s| version == ProtocolVersion::TLS1_3 || usable_tls12(ctx, *s))
        .ok_or_else(|| Error::NegotiationFailed(format!("no common cipher suite for {}", version)))
}

fn signature_scheme(
    ctx: &HandshakeContext,
    ours: &[SignatureScheme],
) -> Option<SignatureScheme> {
    let peer = &ctx.negotiated.peer_signature_schemes;
    ours.iter().copied().find(|s| {
        ctx.config.signature_schemes().contains(s) && (peer.is_empty() || peer.contains(s))
    })
}

/// First of our protocols the client offered. Offering ALPN and sharing
/// nothing fails the handshake.
fn select_alpn(ctx: &mut HandshakeContext) -> Result<(), Error> {
    let ours = ctx.config.alpn_protocols();
    let peer = &ctx.negotiated.peer_alpn;
    if ours.is_empty() || peer.is_empty() {
        return Ok(());
    }
    let selected = ours
        .iter()
        .find(|p| peer.contains(*p))
        .cloned()
        .ok_or_else(|| Error::NegotiationFailed("no common application protocol".into()))?;
    debug!("ALPN selected {:?}", String::from_utf8_lossy(&selected));
    ctx.negotiated.alpn = Some(selected);
    Ok(())
}

fn start_tls13(ctx: &mut HandshakeContext, session_id: Vec<u8>) -> Result<(), Error> {
    let config = ctx.config.clone();
    let provider = config.crypto_provider();
    let hash = ctx.hash()?;

    // No HelloRetryRequest: the client must already have sent a usable share.
    let entry = config
        .groups()
        .iter()
        .find_map(|g| {
            ctx.negotiated
                .peer_key_shares
                .iter()
                .find(|e| e.group == *g)
        })
        .cloned()
        .ok_or_else(|| Error::NegotiationFailed("no acceptable key share".into()))?;

    let scheme = KeyExchangeScheme::new(entry.group)?;
    let credentials = scheme.credentials(provider, &entry.key_exchange, ShareOrigin::Client)?;
    let (share, mut shared) = scheme.respond(provider, &credentials)?;
    ctx.credentials.push(credentials);
    ctx.group = Some(entry.group);
    ctx.negotiated.server_share = Some(KeyShareEntry::new(entry.group, share));
    debug!("Key exchange over {:?}", entry.group);

    ctx.server_random = Random::new();
    ctx.session_id = session_id;
    let extensions = produce_extensions(ctx, MessageContext::ServerHello13)?;
    let hello = ServerHello {
        legacy_version: ProtocolVersion::TLS1_2,
        random: ctx.server_random,
        session_id: ctx.session_id.clone(),
        cipher_suite: ctx.negotiated_suite()?,
        compression_method: NO_COMPRESSION,
        extensions,
    };
    let mut body = Buf::new();
    hello.serialize(&mut body)?;
    ctx.send(HandshakeType::ServerHello, &body)?;

    let mut schedule = KeySchedule::new(hash, None);
    let extracted = schedule.input_shared_secrets(&shared);
    shared.wipe();
    extracted?;
    let transcript_hash = ctx.transcript.current_hash()?;
    let (client_hs, server_hs) = schedule.handshake_traffic_secrets(&transcript_hash)?;

    ctx.advance_write_epoch();
    ctx.export_traffic(1, Direction::Write, &server_hs)?;
    ctx.export_traffic(1, Direction::Read, &client_hs)?;
    ctx.advance_read_epoch();

    let extensions = produce_extensions(ctx, MessageContext::EncryptedExtensions)?;
    let mut body = Buf::new();
    EncryptedExtensions { extensions }.serialize(&mut body)?;
    ctx.send(HandshakeType::EncryptedExtensions, &body)?;

    let transcript_hash = ctx.transcript.current_hash()?;
    let verify_data = key_schedule::finished_verify_data(hash, &server_hs, &transcript_hash)?;
    let mut body = Buf::new();
    Finished { verify_data }.serialize(&mut body);
    ctx.send(HandshakeType::Finished, &body)?;

    schedule.input_empty()?;
    let transcript_hash = ctx.transcript.current_hash()?;
    let (client_ap, server_ap) = schedule.application_traffic_secrets(&transcript_hash)?;
    ctx.exporter_master = Some(schedule.exporter_master_secret(&transcript_hash)?);
    ctx.advance_write_epoch();
    ctx.export_traffic(2, Direction::Write, &server_ap)?;

    ctx.key_schedule = Some(schedule);
    ctx.client_handshake_secret = Some(client_hs);
    ctx.server_handshake_secret = Some(server_hs);
    ctx.client_application_secret = Some(client_ap);
    ctx.server_application_secret = Some(server_ap);

    ctx.expect(&[(HandshakeType::Finished, on_client_finished)]);
    Ok(())
}

fn on_client_finished(ctx: &mut HandshakeContext, body: &[u8], raw: &[u8]) -> Result<(), Error> {
    let hash = ctx.hash()?;
    let finished = Finished::decode(body, hash.output_len())?;
    let transcript_hash = ctx.transcript.current_hash()?;
    let client_hs = ctx
        .client_handshake_secret
        .as_ref()
        .ok_or_else(|| Error::Internal("no client handshake secret".into()))?;
    let expected = key_schedule::finished_verify_data(hash, client_hs, &transcript_hash)?;
    check_verify_data(&expected, &finished.verify_data)?;
    ctx.transcript.update(raw);
    trace!("Client Finished verified");

    ctx.advance_read_epoch();
    let client_ap = ctx
        .client_application_secret
        .as_ref()
        .ok_or_else(|| Error::Internal("no client application secret".into()))?
        .duplicate(SecretStage::Traffic);
    ctx.export_traffic(2, Direction::Read, &client_ap)?;

    let schedule = ctx
        .key_schedule
        .as_ref()
        .ok_or_else(|| Error::Internal("no key schedule".into()))?;
    let transcript_hash = ctx.transcript.current_hash()?;
    ctx.resumption_master = Some(schedule.resumption_master_secret(&transcript_hash)?);

    ctx.complete();
    Ok(())
}

fn start_tls12(ctx: &mut HandshakeContext) -> Result<(), Error> {
    let config = ctx.config.clone();
    let suite = ctx.negotiated_suite()?;

    ctx.negotiated.extended_master_secret =
        ctx.negotiated.peer_extended_master_secret && config.extended_master_secret();
    ctx.session_id = Random::new().0.to_vec();
    let mut random = Random::new();
    if config.enables(ProtocolVersion::TLS1_3) {
        random.0[24..].copy_from_slice(&DOWNGRADE_TLS12);
    }
    ctx.server_random = random;

    let extensions = produce_extensions(ctx, MessageContext::ServerHello12)?;
    let hello = ServerHello {
        legacy_version: ProtocolVersion::TLS1_2,
        random: ctx.server_random,
        session_id: ctx.session_id.clone(),
        cipher_suite: suite,
        compression_method: NO_COMPRESSION,
        extensions,
    };
    let mut body = Buf::new();
    hello.serialize(&mut body)?;
    ctx.send(HandshakeType::ServerHello, &body)?;

    let (possession, params) = match suite.key_exchange() {
        Some(KeyExchangeAlgorithm::Ecdhe) => {
            let group = tls12_curve(ctx)
                .ok_or_else(|| Error::NegotiationFailed("no common curve".into()))?;
            let possession = KeyExchangeScheme::new(group)?.generate(config.crypto_provider())?;
            let params = KeyExchangeParams::Ecdhe {
                group,
                public: possession.key_share(),
            };
            (possession, params)
        }
        Some(KeyExchangeAlgorithm::Dhe) => {
            let dh = DhParams::ffdhe2048();
            let possession = Possession::Agreement(Box::new(DhKey::generate(dh)));
            let params = KeyExchangeParams::Dhe {
                p: dh.p_bytes(),
                g: dh.g_bytes(),
                public: possession.key_share(),
            };
            (possession, params)
        }
        _ => return Err(Error::Internal(format!("{:?} is not a TLS 1.2 suite", suite))),
    };
    ctx.group = Some(possession.group());

    let store = config
        .credentials()
        .ok_or_else(|| Error::NegotiationFailed("no credentials to sign with".into()))?;
    let scheme = signature_scheme(ctx, &store.signing_schemes())
        .ok_or_else(|| Error::NegotiationFailed("no common signature scheme".into()))?;
    let mut signed = Buf::new();
    signed.extend_from_slice(&ctx.client_random.0);
    signed.extend_from_slice(&ctx.server_random.0);
    params.serialize(&mut signed);
    let signature = store.sign(scheme, &signed)?;

    let mut body = Buf::new();
    ServerKeyExchange {
        params,
        scheme,
        signature,
    }
    .serialize(&mut body);
    ctx.send(HandshakeType::ServerKeyExchange, &body)?;
    ctx.send(HandshakeType::ServerHelloDone, &[])?;
    ctx.possessions.push(possession);

    ctx.expect(&[(HandshakeType::ClientKeyExchange, on_client_key_exchange)]);
    Ok(())
}

fn on_client_key_exchange(
    ctx: &mut HandshakeContext,
    body: &[u8],
    raw: &[u8],
) -> Result<(), Error> {
    let suite = ctx.negotiated_suite()?;
    let kx = suite
        .key_exchange()
        .ok_or_else(|| Error::Internal(format!("no key exchange for {:?}", suite)))?;
    let cke = ClientKeyExchange::decode(body, kx)?;
    ctx.transcript.update(raw);

    let possession = ctx
        .possessions
        .pop()
        .ok_or_else(|| Error::Internal("no key exchange possession".into()))?;
    let credentials = match kx {
        KeyExchangeAlgorithm::Dhe => Credentials::PublicKey {
            group: possession.group(),
            bytes: cke.public,
        },
        // Both sides of an ECDHE exchange publish points of the same size.
        _ => possession.server_credentials(&cke.public)?,
    };
    let shared = possession.complete(&credentials)?.into_single()?;
    let premaster = match kx {
        KeyExchangeAlgorithm::Dhe => legacy::dhe_premaster(shared),
        _ => shared,
    };
    ctx.install_master_secret(premaster)?;

    ctx.expect_change_cipher_spec = true;
    ctx.expect(&[(HandshakeType::Finished, on_client_finished_legacy)]);
    Ok(())
}

fn on_client_finished_legacy(
    ctx: &mut HandshakeContext,
    body: &[u8],
    raw: &[u8],
) -> Result<(), Error> {
    if !ctx.peer_change_cipher_spec {
        return Err(Error::ProtocolState(
            "Finished before ChangeCipherSpec".into(),
        ));
    }
    let finished = Finished::decode(body, 12)?;
    let expected = ctx.legacy_verify_data(true)?;
    check_verify_data(&expected, &finished.verify_data)?;
    ctx.transcript.update(raw);
    trace!("Client Finished verified");

    ctx.send_change_cipher_spec();
    ctx.advance_write_epoch();
    let verify_data = ctx.legacy_verify_data(false)?;
    let mut body = Buf::new();
    Finished { verify_data }.serialize(&mut body);
    ctx.send(HandshakeType::Finished, &body)?;

    ctx.store_session()?;
    ctx.complete();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alert::AlertDescription;
    use crate::extension::ExtensionList;
    use crate::handshake::{frame, Outgoing};
    use crate::Config;

    fn client_hello(versions: &[ProtocolVersion]) -> Vec<u8> {
        let config = Config::builder().versions(versions).build().unwrap();
        let mut client = HandshakeContext::client(Arc::new(config)).unwrap();
        match client.poll_outgoing() {
            Some(Outgoing::Handshake(raw)) => raw,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tls13_server_flight() {
        let mut server = HandshakeContext::server(Arc::new(Config::default()));
        let raw = client_hello(&[ProtocolVersion::TLS1_3]);
        server.dispatch(HandshakeType::ClientHello, &raw).unwrap();
        assert_eq!(server.version(), Some(ProtocolVersion::TLS1_3));
        assert_eq!(server.group(), Some(NamedGroup::X25519MlKem768));

        let mut types = Vec::new();
        while let Some(out) = server.poll_outgoing() {
            types.push(match out {
                Outgoing::Handshake(raw) => Some(HandshakeType::from_u8(raw[0])),
                Outgoing::AdvanceEpoch => None,
                Outgoing::ChangeCipherSpec => panic!("no CCS in TLS 1.3"),
            });
        }
        assert_eq!(
            types,
            vec![
                Some(HandshakeType::ServerHello),
                None,
                Some(HandshakeType::EncryptedExtensions),
                Some(HandshakeType::Finished),
                None,
            ]
        );
        assert_eq!(server.read_epoch(), 1);
        assert_eq!(server.write_epoch(), 2);
    }

    #[test]
    fn tls12_without_credentials_fails() {
        let mut server = HandshakeContext::server(Arc::new(Config::default()));
        let raw = client_hello(&[ProtocolVersion::TLS1_2]);
        let err = server.dispatch(HandshakeType::ClientHello, &raw).unwrap_err();
        assert_eq!(err.alert, AlertDescription::HandshakeFailure);
    }

    #[test]
    fn compression_must_include_null() {
        let hello = ClientHello {
            legacy_version: ProtocolVersion::TLS1_2,
            random: Random([9; 32]),
            session_id: vec![],
            cipher_suites: vec![CipherSuite::TLS_AES_128_GCM_SHA256],
            compression_methods: vec![1],
            extensions: ExtensionList::new(),
        };
        let mut body = Buf::new();
        hello.serialize(&mut body).unwrap();
        let raw = frame(HandshakeType::ClientHello, &body).unwrap();
        let mut server = HandshakeContext::server(Arc::new(Config::default()));
        let err = server.dispatch(HandshakeType::ClientHello, &raw).unwrap_err();
        assert_eq!(err.alert, AlertDescription::IllegalParameter);
    }

    #[test]
    fn no_key_share_fails_without_retry() {
        let config = Config::builder()
            .groups(&[NamedGroup::X25519, NamedGroup::Secp256r1])
            .key_share_groups(&[NamedGroup::X25519])
            .build()
            .unwrap();
        let mut client = HandshakeContext::client(Arc::new(config)).unwrap();
        let Some(Outgoing::Handshake(raw)) = client.poll_outgoing() else {
            panic!("no ClientHello");
        };
        let server_config = Config::builder()
            .versions(&[ProtocolVersion::TLS1_3])
            .groups(&[NamedGroup::Secp256r1])
            .build()
            .unwrap();
        let mut server = HandshakeContext::server(Arc::new(server_config));
        let err = server.dispatch(HandshakeType::ClientHello, &raw).unwrap_err();
        assert_eq!(err.alert, AlertDescription::HandshakeFailure);
    }
}
