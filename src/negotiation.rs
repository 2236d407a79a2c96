//! Which extensions appear in which hello message, and what they do.
//!
//! One static table binds each extension type to the messages it may appear
//! in and up to three handlers:
//!
//! - a producer, asked for the extension when building a message,
//! - a consumer, given the decoded extension when one is received,
//! - an absence handler, run when a received message lacks the extension.
//!
//! A ClientHello may carry anything: types without a table entry are kept
//! in the message and otherwise ignored. A server's message may only carry
//! types the table allows for it and the client offered.

use crate::extension::{
    AlpnExtension, EcPointFormatsExtension, Extension, ExtensionList, ExtensionType,
    KeyShareEntry, KeyShareExtension, MaxFragmentLengthExtension, MessageContext,
    QuicTransportParametersExtension, RenegotiationInfoExtension, ServerNameExtension,
    SignatureAlgorithmsExtension, StatusRequestExtension, StatusRequestV2Extension,
    SupportedGroupsExtension, SupportedVersionsExtension,
};
use crate::handshake::{HandshakeContext, Role};
use crate::types::{KeyExchangeAlgorithm, NamedGroup, ProtocolVersion, SignatureScheme};
use crate::Error;

/// Outcome of extension processing for one handshake.
///
/// Fields prefixed `peer_` hold what the peer offered; the rest hold what
/// was agreed.
#[derive(Debug, Default)]
pub(crate) struct Negotiated {
    /// Extension types in the ClientHello, sent or received.
    pub offered: Vec<ExtensionType>,
    /// Host name the client asked for (server side).
    pub server_name: Option<String>,
    pub server_name_acked: bool,
    pub max_fragment_length: Option<MaxFragmentLengthExtension>,
    pub status_request: bool,
    pub peer_groups: Vec<NamedGroup>,
    pub peer_point_formats: bool,
    pub peer_signature_schemes: Vec<SignatureScheme>,
    pub peer_alpn: Vec<Vec<u8>>,
    pub alpn: Option<Vec<u8>>,
    pub peer_extended_master_secret: bool,
    pub extended_master_secret: bool,
    pub peer_versions: Vec<ProtocolVersion>,
    pub peer_key_shares: Vec<KeyShareEntry>,
    pub server_share: Option<KeyShareEntry>,
    pub peer_transport_parameters: Option<QuicTransportParametersExtension>,
    pub secure_renegotiation: bool,
}

type Producer = fn(&mut HandshakeContext, MessageContext) -> Result<Option<Extension>, Error>;
type Consumer = fn(&mut HandshakeContext, MessageContext, Extension) -> Result<(), Error>;
type Absence = fn(&mut HandshakeContext, MessageContext) -> Result<(), Error>;

struct ExtensionEntry {
    ext_type: ExtensionType,
    /// Bitmask of [`MessageContext::mask`].
    contexts: u8,
    produce: Option<Producer>,
    consume: Option<Consumer>,
    absent: Option<Absence>,
}

const CH: u8 = MessageContext::ClientHello.mask();
const SH12: u8 = MessageContext::ServerHello12.mask();
const SH13: u8 = MessageContext::ServerHello13.mask();
const EE: u8 = MessageContext::EncryptedExtensions.mask();

/// Production order is table order.
static EXTENSIONS: &[ExtensionEntry] = &[
    ExtensionEntry {
        ext_type: ExtensionType::ServerName,
        contexts: CH | SH12 | EE,
        produce: Some(produce_server_name),
        consume: Some(consume_server_name),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::MaxFragmentLength,
        contexts: CH | SH12 | EE,
        produce: Some(produce_max_fragment_length),
        consume: Some(consume_max_fragment_length),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::StatusRequest,
        contexts: CH,
        produce: Some(produce_status_request),
        consume: Some(consume_status_request),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::SupportedGroups,
        contexts: CH,
        produce: Some(produce_supported_groups),
        consume: Some(consume_supported_groups),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::EcPointFormats,
        contexts: CH | SH12,
        produce: Some(produce_ec_point_formats),
        consume: Some(consume_ec_point_formats),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::SignatureAlgorithms,
        contexts: CH,
        produce: Some(produce_signature_algorithms),
        consume: Some(consume_signature_algorithms),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::ApplicationLayerProtocolNegotiation,
        contexts: CH | SH12 | EE,
        produce: Some(produce_alpn),
        consume: Some(consume_alpn),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::StatusRequestV2,
        contexts: CH,
        produce: Some(produce_status_request_v2),
        consume: Some(consume_status_request),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::ExtendedMasterSecret,
        contexts: CH | SH12,
        produce: Some(produce_extended_master_secret),
        consume: Some(consume_extended_master_secret),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::SupportedVersions,
        contexts: CH | SH13,
        produce: Some(produce_supported_versions),
        consume: Some(consume_supported_versions),
        absent: None,
    },
    ExtensionEntry {
        ext_type: ExtensionType::KeyShare,
        contexts: CH | SH13,
        produce: Some(produce_key_share),
        consume: Some(consume_key_share),
        absent: Some(absent_key_share),
    },
    ExtensionEntry {
        ext_type: ExtensionType::QuicTransportParameters,
        contexts: CH | EE,
        produce: Some(produce_quic_transport_parameters),
        consume: Some(consume_quic_transport_parameters),
        absent: Some(absent_quic_transport_parameters),
    },
    ExtensionEntry {
        ext_type: ExtensionType::RenegotiationInfo,
        contexts: CH | SH12,
        produce: Some(produce_renegotiation_info),
        consume: Some(consume_renegotiation_info),
        absent: None,
    },
];

fn entry_for(
    ext_type: ExtensionType,
    context: MessageContext,
) -> Option<&'static ExtensionEntry> {
    EXTENSIONS
        .iter()
        .find(|s| s.ext_type == ext_type && s.contexts & context.mask() != 0)
}

/// Build the extension block of an outgoing message.
pub(crate) fn produce_extensions(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<ExtensionList, Error> {
    let mut list = ExtensionList::new();
    for entry in EXTENSIONS.iter().filter(|s| s.contexts & context.mask() != 0) {
        let Some(produce) = entry.produce else {
            continue;
        };
        if let Some(ext) = produce(ctx, context)? {
            debug_assert_eq!(ext.ext_type(), entry.ext_type);
            list.push_extension(&ext)?;
        }
    }
    if context.is_client_hello() {
        ctx.negotiated.offered = list.iter().map(|e| e.ext_type).collect();
    }
    trace!("Produced {} extensions for {:?}", list.len(), context);
    Ok(list)
}

/// Apply the extension block of a received message, then run the absence
/// handlers for every applicable type it lacks.
pub(crate) fn consume_extensions(
    ctx: &mut HandshakeContext,
    context: MessageContext,
    list: &ExtensionList,
) -> Result<(), Error> {
    for raw in list.iter() {
        let entry = entry_for(raw.ext_type, context);
        if context.is_client_hello() {
            ctx.negotiated.offered.push(raw.ext_type);
        } else if entry.is_none() || !ctx.negotiated.offered.contains(&raw.ext_type) {
            warn!("Peer sent {:?} in {:?}", raw.ext_type, context);
            return Err(Error::UnsupportedExtension(raw.ext_type));
        }

        let Some(consume) = entry.and_then(|s| s.consume) else {
            trace!("Ignoring extension {:?}", raw.ext_type);
            continue;
        };
        let ext = Extension::decode(raw.ext_type, &raw.data, context)?;
        consume(ctx, context, ext)?;
    }

    for entry in EXTENSIONS.iter().filter(|s| s.contexts & context.mask() != 0) {
        if list.contains(entry.ext_type) {
            continue;
        }
        if let Some(absent) = entry.absent {
            absent(ctx, context)?;
        }
    }
    Ok(())
}

fn mismatch(ext: &Extension) -> Error {
    Error::Internal(format!("decoder returned {:?}", ext.ext_type()))
}

// server_name (RFC 6066 Section 3)

fn produce_server_name(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    if context.is_client_hello() {
        return Ok(ctx
            .config
            .server_name()
            .map(|name| Extension::ServerName(ServerNameExtension::host_name(name))));
    }
    // Acknowledged with an empty payload.
    Ok(ctx
        .negotiated
        .server_name
        .as_ref()
        .map(|_| Extension::ServerName(ServerNameExtension::default())))
}

fn consume_server_name(
    ctx: &mut HandshakeContext,
    context: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    let Extension::ServerName(sni) = ext else {
        return Err(mismatch(&ext));
    };
    if context.is_client_hello() {
        let name = sni
            .first_host_name()
            .ok_or_else(|| Error::IllegalParameter("server_name without a host name".into()))?;
        ctx.negotiated.server_name = Some(name.to_string());
    } else {
        if !sni.names.is_empty() {
            return Err(Error::IllegalParameter(
                "server_name acknowledgement must be empty".into(),
            ));
        }
        ctx.negotiated.server_name_acked = true;
    }
    Ok(())
}

// max_fragment_length (RFC 6066 Section 4)

fn produce_max_fragment_length(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    let mfl = if context.is_client_hello() {
        ctx.config.max_fragment_length()
    } else {
        ctx.negotiated.max_fragment_length
    };
    Ok(mfl.map(Extension::MaxFragmentLength))
}

fn consume_max_fragment_length(
    ctx: &mut HandshakeContext,
    context: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    let Extension::MaxFragmentLength(mfl) = ext else {
        return Err(mismatch(&ext));
    };
    if !context.is_client_hello() && ctx.config.max_fragment_length() != Some(mfl) {
        return Err(Error::IllegalParameter(format!(
            "max_fragment_length {} was not requested",
            mfl.fragment_size()
        )));
    }
    ctx.negotiated.max_fragment_length = Some(mfl);
    Ok(())
}

// status_request (RFC 6066 Section 8) and status_request_v2 (RFC 6961)

fn produce_status_request(
    ctx: &mut HandshakeContext,
    _: MessageContext,
) -> Result<Option<Extension>, Error> {
    Ok(ctx
        .config
        .status_request()
        .then(|| Extension::StatusRequest(StatusRequestExtension::ocsp())))
}

fn produce_status_request_v2(
    ctx: &mut HandshakeContext,
    _: MessageContext,
) -> Result<Option<Extension>, Error> {
    let wanted = ctx.config.status_request() && ctx.config.enables(ProtocolVersion::TLS1_2);
    Ok(wanted.then(|| Extension::StatusRequestV2(StatusRequestV2Extension::ocsp_multi())))
}

/// Recorded only. No certificate status is ever sent, so the request is
/// never acknowledged.
fn consume_status_request(
    ctx: &mut HandshakeContext,
    _: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    match ext {
        Extension::StatusRequest(_) | Extension::StatusRequestV2(_) => {
            ctx.negotiated.status_request = true;
            Ok(())
        }
        other => Err(mismatch(&other)),
    }
}

// supported_groups (RFC 8422 Section 5.1.1, RFC 8446 Section 4.2.7)

fn produce_supported_groups(
    ctx: &mut HandshakeContext,
    _: MessageContext,
) -> Result<Option<Extension>, Error> {
    let tls13 = ctx.config.enables(ProtocolVersion::TLS1_3);
    let groups: Vec<NamedGroup> = ctx
        .config
        .groups()
        .iter()
        .copied()
        .filter(|g| tls13 || !g.is_tls13_only())
        .collect();
    if groups.is_empty() {
        return Ok(None);
    }
    Ok(Some(Extension::SupportedGroups(
        SupportedGroupsExtension::new(&groups),
    )))
}

fn consume_supported_groups(
    ctx: &mut HandshakeContext,
    _: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    let Extension::SupportedGroups(groups) = ext else {
        return Err(mismatch(&ext));
    };
    ctx.negotiated.peer_groups = groups.groups;
    Ok(())
}

// ec_point_formats (RFC 8422 Section 5.1.2)

fn produce_ec_point_formats(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    let wanted = if context.is_client_hello() {
        ctx.config.enables(ProtocolVersion::TLS1_2) && ctx.config.groups().iter().any(|g| g.is_ec())
    } else {
        ctx.negotiated.peer_point_formats
            && ctx.suite.and_then(|s| s.key_exchange()) == Some(KeyExchangeAlgorithm::Ecdhe)
    };
    Ok(wanted.then(|| Extension::EcPointFormats(EcPointFormatsExtension::default())))
}

fn consume_ec_point_formats(
    ctx: &mut HandshakeContext,
    _: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    let Extension::EcPointFormats(formats) = ext else {
        return Err(mismatch(&ext));
    };
    if !formats.supports_uncompressed() {
        return Err(Error::IllegalParameter(
            "ec_point_formats without uncompressed".into(),
        ));
    }
    ctx.negotiated.peer_point_formats = true;
    Ok(())
}

// signature_algorithms (RFC 8446 Section 4.2.3)

fn produce_signature_algorithms(
    ctx: &mut HandshakeContext,
    _: MessageContext,
) -> Result<Option<Extension>, Error> {
    let schemes = ctx.config.signature_schemes();
    if schemes.is_empty() {
        return Ok(None);
    }
    Ok(Some(Extension::SignatureAlgorithms(
        SignatureAlgorithmsExtension::new(schemes),
    )))
}

fn consume_signature_algorithms(
    ctx: &mut HandshakeContext,
    _: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    let Extension::SignatureAlgorithms(schemes) = ext else {
        return Err(mismatch(&ext));
    };
    ctx.negotiated.peer_signature_schemes = schemes.schemes;
    Ok(())
}

// application_layer_protocol_negotiation (RFC 7301)

fn produce_alpn(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    if context.is_client_hello() {
        let protocols = ctx.config.alpn_protocols();
        if protocols.is_empty() {
            return Ok(None);
        }
        return Ok(Some(Extension::Alpn(AlpnExtension::new(protocols))));
    }
    Ok(ctx
        .negotiated
        .alpn
        .as_ref()
        .map(|p| Extension::Alpn(AlpnExtension::new(&[p]))))
}

fn consume_alpn(
    ctx: &mut HandshakeContext,
    context: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    let Extension::Alpn(alpn) = ext else {
        return Err(mismatch(&ext));
    };
    if context.is_client_hello() {
        ctx.negotiated.peer_alpn = alpn.protocols;
        return Ok(());
    }
    let [selected] = &alpn.protocols[..] else {
        return Err(Error::IllegalParameter(format!(
            "server selected {} protocols",
            alpn.protocols.len()
        )));
    };
    if !ctx.config.alpn_protocols().contains(selected) {
        return Err(Error::IllegalParameter(
            "server selected a protocol that was not offered".into(),
        ));
    }
    ctx.negotiated.alpn = Some(selected.clone());
    Ok(())
}

// extended_master_secret (RFC 7627)

fn produce_extended_master_secret(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    let wanted = if context.is_client_hello() {
        ctx.config.extended_master_secret() && ctx.config.enables(ProtocolVersion::TLS1_2)
    } else {
        ctx.negotiated.extended_master_secret
    };
    Ok(wanted.then_some(Extension::ExtendedMasterSecret))
}

fn consume_extended_master_secret(
    ctx: &mut HandshakeContext,
    context: MessageContext,
    _: Extension,
) -> Result<(), Error> {
    if context.is_client_hello() {
        ctx.negotiated.peer_extended_master_secret = true;
    } else {
        ctx.negotiated.extended_master_secret = true;
    }
    Ok(())
}

// supported_versions (RFC 8446 Section 4.2.1)

fn produce_supported_versions(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    if context.is_client_hello() {
        if !ctx.config.enables(ProtocolVersion::TLS1_3) {
            return Ok(None);
        }
        return Ok(Some(Extension::SupportedVersions(
            SupportedVersionsExtension::Offered(ctx.config.versions().to_vec()),
        )));
    }
    Ok(Some(Extension::SupportedVersions(
        SupportedVersionsExtension::Selected(ProtocolVersion::TLS1_3),
    )))
}

fn consume_supported_versions(
    ctx: &mut HandshakeContext,
    _: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    match ext {
        Extension::SupportedVersions(SupportedVersionsExtension::Offered(versions)) => {
            ctx.negotiated.peer_versions = versions;
            Ok(())
        }
        Extension::SupportedVersions(SupportedVersionsExtension::Selected(version)) => {
            if version != ProtocolVersion::TLS1_3 {
                return Err(Error::IllegalParameter(format!(
                    "supported_versions selected {}",
                    version
                )));
            }
            Ok(())
        }
        other => Err(mismatch(&other)),
    }
}

// key_share (RFC 8446 Section 4.2.8)

fn produce_key_share(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    if context.is_client_hello() {
        if ctx.possessions.is_empty() {
            return Ok(None);
        }
        let entries = ctx
            .possessions
            .iter()
            .map(|p| KeyShareEntry::new(p.group(), p.key_share()))
            .collect();
        return Ok(Some(Extension::KeyShare(KeyShareExtension::Offered(
            entries,
        ))));
    }
    Ok(ctx
        .negotiated
        .server_share
        .clone()
        .map(|e| Extension::KeyShare(KeyShareExtension::Selected(e))))
}

fn consume_key_share(
    ctx: &mut HandshakeContext,
    _: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    match ext {
        Extension::KeyShare(KeyShareExtension::Offered(entries)) => {
            ctx.negotiated.peer_key_shares = entries;
        }
        Extension::KeyShare(KeyShareExtension::Selected(entry)) => {
            ctx.negotiated.server_share = Some(entry);
        }
        other => return Err(mismatch(&other)),
    }
    Ok(())
}

/// A TLS 1.3 ServerHello must carry the server's share. A ClientHello
/// without one is judged once the version is known.
fn absent_key_share(_: &mut HandshakeContext, context: MessageContext) -> Result<(), Error> {
    if context == MessageContext::ServerHello13 {
        return Err(Error::MissingExtension(ExtensionType::KeyShare));
    }
    Ok(())
}

// quic_transport_parameters (RFC 9001 Section 8.2)

fn produce_quic_transport_parameters(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    // Sent by the client in ClientHello and by the server in EncryptedExtensions.
    let ours = match (ctx.role, context) {
        (Role::Client, MessageContext::ClientHello)
        | (Role::Server, MessageContext::EncryptedExtensions) => {
            ctx.config.quic_transport_parameters().cloned()
        }
        _ => None,
    };
    Ok(ours.map(Extension::QuicTransportParameters))
}

fn consume_quic_transport_parameters(
    ctx: &mut HandshakeContext,
    _: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    let Extension::QuicTransportParameters(params) = ext else {
        return Err(mismatch(&ext));
    };
    if !ctx.config.is_quic() {
        trace!("Ignoring quic_transport_parameters outside QUIC");
        return Ok(());
    }
    ctx.negotiated.peer_transport_parameters = Some(params);
    Ok(())
}

fn absent_quic_transport_parameters(
    ctx: &mut HandshakeContext,
    _: MessageContext,
) -> Result<(), Error> {
    if ctx.config.is_quic() {
        return Err(Error::MissingExtension(
            ExtensionType::QuicTransportParameters,
        ));
    }
    Ok(())
}

// renegotiation_info (RFC 5746)

fn produce_renegotiation_info(
    ctx: &mut HandshakeContext,
    context: MessageContext,
) -> Result<Option<Extension>, Error> {
    let wanted = if context.is_client_hello() {
        ctx.config.enables(ProtocolVersion::TLS1_2)
    } else {
        ctx.negotiated.secure_renegotiation
    };
    Ok(wanted.then(|| Extension::RenegotiationInfo(RenegotiationInfoExtension::default())))
}

/// Only initial handshakes happen, so the field must be empty.
fn consume_renegotiation_info(
    ctx: &mut HandshakeContext,
    _: MessageContext,
    ext: Extension,
) -> Result<(), Error> {
    let Extension::RenegotiationInfo(info) = ext else {
        return Err(mismatch(&ext));
    };
    if !info.renegotiated_connection.is_empty() {
        return Err(Error::NegotiationFailed(
            "renegotiation_info is not empty on an initial handshake".into(),
        ));
    }
    ctx.negotiated.secure_renegotiation = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::Buf;
    use crate::Config;

    fn server() -> HandshakeContext {
        HandshakeContext::server(Arc::new(Config::default()))
    }

    fn quic_config() -> Arc<Config> {
        Arc::new(
            Config::builder()
                .quic_transport_parameters(&[(0x01, &[0x40, 0x64][..])])
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn list(entries: &[(ExtensionType, &[u8])]) -> ExtensionList {
        let mut list = ExtensionList::new();
        for (t, data) in entries {
            list.push(*t, Buf::from_slice(data)).unwrap();
        }
        list
    }

    #[test]
    fn client_hello_keeps_unknown_extensions() {
        let mut ctx = server();
        let exts = list(&[
            (ExtensionType::Unknown(0x7a7a), &[1, 2]),
            (ExtensionType::ExtendedMasterSecret, &[]),
        ]);
        consume_extensions(&mut ctx, MessageContext::ClientHello, &exts).unwrap();
        assert!(ctx.negotiated.peer_extended_master_secret);
        assert!(ctx
            .negotiated
            .offered
            .contains(&ExtensionType::Unknown(0x7a7a)));
    }

    #[test]
    fn response_with_unoffered_extension() {
        let mut ctx = server();
        // Nothing was offered.
        let exts = list(&[(ExtensionType::ExtendedMasterSecret, &[])]);
        let err =
            consume_extensions(&mut ctx, MessageContext::ServerHello12, &exts).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedExtension(ExtensionType::ExtendedMasterSecret)
        ));
    }

    #[test]
    fn response_with_extension_not_allowed_in_context() {
        let mut ctx = server();
        ctx.negotiated.offered.push(ExtensionType::SupportedGroups);
        let exts = list(&[(ExtensionType::SupportedGroups, &[0, 2, 0, 0x1D])]);
        let err = consume_extensions(&mut ctx, MessageContext::EncryptedExtensions, &exts)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedExtension(_)));
    }

    #[test]
    fn renegotiation_info_must_be_empty() {
        let mut ctx = server();
        let exts = list(&[(ExtensionType::RenegotiationInfo, &[1, 0xAA])]);
        let err = consume_extensions(&mut ctx, MessageContext::ClientHello, &exts).unwrap_err();
        assert!(matches!(err, Error::NegotiationFailed(_)));

        let mut ctx = server();
        let exts = list(&[(ExtensionType::RenegotiationInfo, &[0])]);
        consume_extensions(&mut ctx, MessageContext::ClientHello, &exts).unwrap();
        assert!(ctx.negotiated.secure_renegotiation);
    }

    #[test]
    fn quic_requires_transport_parameters() {
        let mut ctx = HandshakeContext::server(quic_config());
        let err = consume_extensions(&mut ctx, MessageContext::ClientHello, &ExtensionList::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingExtension(ExtensionType::QuicTransportParameters)
        ));

        // Without QUIC the same ClientHello is fine.
        let mut ctx = server();
        consume_extensions(&mut ctx, MessageContext::ClientHello, &ExtensionList::new()).unwrap();
    }

    #[test]
    fn tls13_server_hello_requires_key_share() {
        let mut ctx = server();
        ctx.negotiated.offered.push(ExtensionType::SupportedVersions);
        let exts = list(&[(ExtensionType::SupportedVersions, &[0x03, 0x04])]);
        let err =
            consume_extensions(&mut ctx, MessageContext::ServerHello13, &exts).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingExtension(ExtensionType::KeyShare)
        ));
    }

    #[test]
    fn max_fragment_length_strict_decode() {
        let mut ctx = server();
        let exts = list(&[(ExtensionType::MaxFragmentLength, &[5])]);
        let err = consume_extensions(&mut ctx, MessageContext::ClientHello, &exts).unwrap_err();
        assert!(matches!(err, Error::WireFormat(_)));
    }

    #[test]
    fn client_hello_production_records_offers() {
        let config = Config::builder()
            .server_name("example.com")
            .alpn_protocols(&["h2"])
            .build()
            .unwrap();
        let ctx = HandshakeContext::client(Arc::new(config)).unwrap();
        let offered = &ctx.negotiated.offered;
        for t in [
            ExtensionType::ServerName,
            ExtensionType::SupportedGroups,
            ExtensionType::SignatureAlgorithms,
            ExtensionType::ApplicationLayerProtocolNegotiation,
            ExtensionType::ExtendedMasterSecret,
            ExtensionType::SupportedVersions,
            ExtensionType::KeyShare,
            ExtensionType::RenegotiationInfo,
        ] {
            assert!(offered.contains(&t), "{:?} not offered", t);
        }
        assert!(!offered.contains(&ExtensionType::QuicTransportParameters));
    }
}
