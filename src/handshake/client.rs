// Client handshake flows.
//
// TLS 1.3 (and QUIC):
//
// 1. ClientHello with a key share per configured key share group (epoch 0)
// 2. ServerHello: pick the matching possession, derive handshake secrets,
//    switch both directions to epoch 1
// 3. EncryptedExtensions
// 4. Finished: verify, derive application and exporter secrets, send our
//    Finished, switch to epoch 2, derive the resumption master secret
//
// TLS 1.2 (ECDHE or DHE):
//
// 1. ClientHello
// 2. ServerHello
// 3. ServerKeyExchange: verify the signature, generate our ephemeral key
// 4. ServerHelloDone: send ClientKeyExchange, derive the master secret,
//    send ChangeCipherSpec and Finished
// 5. ChangeCipherSpec, then Finished: verify, store the session

use super::context::HandshakeContext;
use super::hello::{ClientHello, ServerHello};
use super::messages::{ClientKeyExchange, Finished, KeyExchangeParams, ServerKeyExchange};
use super::{check_verify_data, EncryptedExtensions, HandshakeType};
use crate::buffer::Buf;
use crate::crypto::key_schedule;
use crate::crypto::rust_crypto::{DhKey, DhParams};
use crate::crypto::{legacy, Credentials, Direction, KeyExchangeScheme, KeySchedule, Possession};
use crate::extension::{Extension, ExtensionType, MessageContext, SupportedVersionsExtension};
use crate::negotiation::{consume_extensions, produce_extensions};
use crate::types::{CipherSuite, KeyExchangeAlgorithm, ProtocolVersion, Random};
use crate::Error;

const NO_COMPRESSION: u8 = 0;

pub(super) fn start(ctx: &mut HandshakeContext) -> Result<(), Error> {
    let config = ctx.config.clone();

    if config.enables(ProtocolVersion::TLS1_3) {
        let provider = config.crypto_provider();
        for group in config.key_share_groups() {
            let scheme = KeyExchangeScheme::new(*group)?;
            ctx.possessions.push(scheme.generate(provider)?);
        }
    }

    ctx.client_random = Random::new();
    // QUIC has no use for the legacy session id.
    ctx.session_id = if config.is_quic() {
        Vec::new()
    } else {
        Random::new().0.to_vec()
    };

    let extensions = produce_extensions(ctx, MessageContext::ClientHello)?;
    let mut cipher_suites: Vec<CipherSuite> = config.cipher_suites().to_vec();
    if config.enables(ProtocolVersion::TLS1_2) {
        cipher_suites.push(CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV);
    }

    let hello = ClientHello {
        legacy_version: ProtocolVersion::TLS1_2,
        random: ctx.client_random,
        session_id: ctx.session_id.clone(),
        cipher_suites,
        compression_methods: vec![NO_COMPRESSION],
        extensions,
    };
    let mut body = Buf::new();
    hello.serialize(&mut body)?;
    ctx.send(HandshakeType::ClientHello, &body)?;

    debug!(
        "Sent ClientHello: {} suites, {} key shares",
        hello.cipher_suites.len(),
        ctx.possessions.len()
    );
    ctx.expect(&[(HandshakeType::ServerHello, on_server_hello)]);
    Ok(())
}

fn selected_version(ctx: &HandshakeContext, hello: &ServerHello) -> Result<ProtocolVersion, Error> {
    let Some(data) = hello.extensions.get(ExtensionType::SupportedVersions) else {
        return Ok(hello.legacy_version);
    };
    if !ctx.config.enables(ProtocolVersion::TLS1_3) {
        return Err(Error::UnsupportedExtension(ExtensionType::SupportedVersions));
    }
    match Extension::decode(
        ExtensionType::SupportedVersions,
        data,
        MessageContext::ServerHello13,
    )? {
        Extension::SupportedVersions(SupportedVersionsExtension::Selected(v)) => Ok(v),
        other => Err(Error::Internal(format!(
            "decoder returned {:?}",
            other.ext_type()
        ))),
    }
}

fn on_server_hello(ctx: &mut HandshakeContext, body: &[u8], raw: &[u8]) -> Result<(), Error> {
    let hello = ServerHello::decode(body)?;
    let config = ctx.config.clone();

    let version = selected_version(ctx, &hello)?;
    if !config.enables(version) {
        return Err(Error::NegotiationFailed(format!(
            "server selected {}",
            version
        )));
    }
    if version == ProtocolVersion::TLS1_2
        && config.enables(ProtocolVersion::TLS1_3)
        && hello.has_downgrade_sentinel()
    {
        return Err(Error::IllegalParameter(
            "TLS 1.2 ServerHello with the downgrade sentinel".into(),
        ));
    }

    let suite = hello.cipher_suite;
    if !config.cipher_suites().contains(&suite) || !suite.supports(version) {
        return Err(Error::IllegalParameter(format!(
            "server selected {:?} for {}",
            suite, version
        )));
    }
    if hello.compression_method != NO_COMPRESSION {
        return Err(Error::IllegalParameter(format!(
            "compression method {}",
            hello.compression_method
        )));
    }

    let hash = suite
        .hash_algorithm()
        .ok_or_else(|| Error::Internal(format!("no hash for {:?}", suite)))?;
    ctx.version = Some(version);
    ctx.suite = Some(suite);
    ctx.server_random = hello.random;
    ctx.transcript.set_algorithm(hash)?;
    ctx.transcript.update(raw);
    debug!("Server selected {} with {:?}", version, suite);

    if version == ProtocolVersion::TLS1_3 {
        if hello.session_id != ctx.session_id {
            return Err(Error::IllegalParameter(
                "legacy_session_id not echoed".into(),
            ));
        }
        consume_extensions(ctx, MessageContext::ServerHello13, &hello.extensions)?;
        handshake_secrets(ctx)
    } else {
        ctx.session_id = hello.session_id;
        consume_extensions(ctx, MessageContext::ServerHello12, &hello.extensions)?;
        // The TLS 1.3 key shares are of no further use.
        ctx.possessions.clear();
        ctx.expect(&[(HandshakeType::ServerKeyExchange, on_server_key_exchange)]);
        Ok(())
    }
}

fn handshake_secrets(ctx: &mut HandshakeContext) -> Result<(), Error> {
    let share = ctx
        .negotiated
        .server_share
        .take()
        .ok_or(Error::MissingExtension(ExtensionType::KeyShare))?;
    let index = ctx
        .possessions
        .iter()
        .position(|p| p.group() == share.group)
        .ok_or_else(|| {
            Error::IllegalParameter(format!("server chose {:?} without a client share", share.group))
        })?;
    let possession = ctx.possessions.swap_remove(index);
    ctx.possessions.clear();

    let credentials = possession.server_credentials(&share.key_exchange)?;
    let mut shared = possession.complete(&credentials)?;
    ctx.credentials.push(credentials);
    ctx.group = Some(share.group);

    let mut schedule = KeySchedule::new(ctx.hash()?, None);
    let extracted = schedule.input_shared_secrets(&shared);
    shared.wipe();
    extracted?;

    let transcript_hash = ctx.transcript.current_hash()?;
    let (client_hs, server_hs) = schedule.handshake_traffic_secrets(&transcript_hash)?;
    ctx.key_schedule = Some(schedule);

    ctx.export_traffic(1, Direction::Read, &server_hs)?;
    ctx.export_traffic(1, Direction::Write, &client_hs)?;
    ctx.client_handshake_secret = Some(client_hs);
    ctx.server_handshake_secret = Some(server_hs);
    ctx.advance_read_epoch();
    ctx.advance_write_epoch();
    debug!("Key exchange over {:?} complete", share.group);

    ctx.expect(&[(
        HandshakeType::EncryptedExtensions,
        on_encrypted_extensions,
    )]);
    Ok(())
}

fn on_encrypted_extensions(
    ctx: &mut HandshakeContext,
    body: &[u8],
    raw: &[u8],
) -> Result<(), Error> {
    let ee = EncryptedExtensions::decode(body)?;
    ctx.transcript.update(raw);
    consume_extensions(ctx, MessageContext::EncryptedExtensions, &ee.extensions)?;
    ctx.expect(&[(HandshakeType::Finished, on_server_finished)]);
    Ok(())
}

fn on_server_finished(ctx: &mut HandshakeContext, body: &[u8], raw: &[u8]) -> Result<(), Error> {
    let hash = ctx.hash()?;
    let finished = Finished::decode(body, hash.output_len())?;

    let transcript_hash = ctx.transcript.current_hash()?;
    let server_hs = ctx
        .server_handshake_secret
        .as_ref()
        .ok_or_else(|| Error::Internal("no server handshake secret".into()))?;
    let expected = key_schedule::finished_verify_data(hash, server_hs, &transcript_hash)?;
    check_verify_data(&expected, &finished.verify_data)?;
    ctx.transcript.update(raw);
    trace!("Server Finished verified");

    let mut schedule = ctx
        .key_schedule
        .take()
        .ok_or_else(|| Error::Internal("no key schedule".into()))?;
    schedule.input_empty()?;
    let transcript_hash = ctx.transcript.current_hash()?;
    let (client_ap, server_ap) = schedule.application_traffic_secrets(&transcript_hash)?;
    ctx.exporter_master = Some(schedule.exporter_master_secret(&transcript_hash)?);
    ctx.export_traffic(2, Direction::Read, &server_ap)?;

    let client_hs = ctx
        .client_handshake_secret
        .as_ref()
        .ok_or_else(|| Error::Internal("no client handshake secret".into()))?;
    let verify_data = key_schedule::finished_verify_data(hash, client_hs, &transcript_hash)?;
    let mut body = Buf::new();
    Finished { verify_data }.serialize(&mut body);
    ctx.send(HandshakeType::Finished, &body)?;

    ctx.advance_read_epoch();
    ctx.advance_write_epoch();
    ctx.export_traffic(2, Direction::Write, &client_ap)?;
    ctx.client_application_secret = Some(client_ap);
    ctx.server_application_secret = Some(server_ap);

    let transcript_hash = ctx.transcript.current_hash()?;
    ctx.resumption_master = Some(schedule.resumption_master_secret(&transcript_hash)?);
    schedule.wipe();

    ctx.complete();
    Ok(())
}

fn on_server_key_exchange(
    ctx: &mut HandshakeContext,
    body: &[u8],
    raw: &[u8],
) -> Result<(), Error> {
    let config = ctx.config.clone();
    let suite = ctx.negotiated_suite()?;
    let kx = suite
        .key_exchange()
        .ok_or_else(|| Error::Internal(format!("no key exchange for {:?}", suite)))?;
    let ske = ServerKeyExchange::decode(body, kx)?;
    ctx.transcript.update(raw);

    if !config.signature_schemes().contains(&ske.scheme) {
        return Err(Error::IllegalParameter(format!(
            "ServerKeyExchange signed with {:?}",
            ske.scheme
        )));
    }
    let store = config.credentials().ok_or_else(|| {
        Error::NegotiationFailed("no credential store to verify the server".into())
    })?;
    let mut params = Buf::new();
    ske.params.serialize(&mut params);
    let mut signed = Vec::with_capacity(64 + params.len());
    signed.extend_from_slice(&ctx.client_random.0);
    signed.extend_from_slice(&ctx.server_random.0);
    signed.extend_from_slice(&params);
    store.verify(ske.scheme, &signed, &ske.signature)?;
    trace!("ServerKeyExchange signature verified: {:?}", ske.scheme);

    let (possession, credentials) = match &ske.params {
        KeyExchangeParams::Ecdhe { group, public } => {
            if !group.is_ec() || !config.groups().contains(group) {
                return Err(Error::IllegalParameter(format!(
                    "server chose curve {:?}",
                    group
                )));
            }
            let possession = KeyExchangeScheme::new(*group)?.generate(config.crypto_provider())?;
            let credentials = possession.server_credentials(public)?;
            (possession, credentials)
        }
        KeyExchangeParams::Dhe { p, g, public } => {
            let params = DhParams::new(p, g).map_err(Error::IllegalParameter)?;
            let key = DhKey::generate(&params);
            let possession = Possession::Agreement(Box::new(key));
            let credentials = Credentials::PublicKey {
                group: possession.group(),
                bytes: public.clone(),
            };
            (possession, credentials)
        }
    };
    ctx.group = Some(possession.group());
    ctx.possessions.push(possession);
    ctx.credentials.push(credentials);

    ctx.expect(&[(HandshakeType::ServerHelloDone, on_server_hello_done)]);
    Ok(())
}

fn on_server_hello_done(
    ctx: &mut HandshakeContext,
    body: &[u8],
    raw: &[u8],
) -> Result<(), Error> {
    if !body.is_empty() {
        return Err(Error::WireFormat(format!(
            "ServerHelloDone with {} bytes",
            body.len()
        )));
    }
    ctx.transcript.update(raw);

    let suite = ctx.negotiated_suite()?;
    let kx = suite
        .key_exchange()
        .ok_or_else(|| Error::Internal(format!("no key exchange for {:?}", suite)))?;
    let possession = ctx
        .possessions
        .pop()
        .ok_or_else(|| Error::Internal("no key exchange possession".into()))?;
    let credentials = ctx
        .credentials
        .pop()
        .ok_or_else(|| Error::Internal("no server key exchange".into()))?;

    let public = possession.key_share();
    let shared = possession.complete(&credentials)?.into_single()?;
    let premaster = match kx {
        KeyExchangeAlgorithm::Dhe => legacy::dhe_premaster(shared),
        _ => shared,
    };

    let mut body = Buf::new();
    ClientKeyExchange { public }.serialize(&mut body, kx);
    ctx.send(HandshakeType::ClientKeyExchange, &body)?;
    ctx.install_master_secret(premaster)?;

    ctx.send_change_cipher_spec();
    ctx.advance_write_epoch();
    let verify_data = ctx.legacy_verify_data(true)?;
    let mut body = Buf::new();
    Finished { verify_data }.serialize(&mut body);
    ctx.send(HandshakeType::Finished, &body)?;

    ctx.expect_change_cipher_spec = true;
    ctx.expect(&[(HandshakeType::Finished, on_server_finished_legacy)]);
    Ok(())
}

fn on_server_finished_legacy(
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
    let expected = ctx.legacy_verify_data(false)?;
    check_verify_data(&expected, &finished.verify_data)?;
    ctx.transcript.update(raw);
    trace!("Server Finished verified");

    ctx.store_session()?;
    ctx.complete();
    Ok(())
}
