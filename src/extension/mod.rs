//! Hello extensions: the shared list codec and the typed payloads.
//!
//! On the wire an extension block is
//!
//! ```text
//! u16 total_length
//! N × { u16 type, u16 length, length bytes payload }
//! ```
//!
//! where `total_length` must equal the sum of `4 + length` over all entries.
//! An empty list is encoded as zero bytes, not as a zero length prefix.

use std::cell::Cell;

use nom::combinator::all_consuming;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::Error;

mod alpn;
mod ec_point_formats;
mod key_share;
mod max_fragment_length;
mod quic_transport_parameters;
mod renegotiation_info;
mod server_name;
mod signature_algorithms;
mod status_request;
mod supported_groups;
mod supported_versions;

pub use alpn::AlpnExtension;
pub use ec_point_formats::{EcPointFormatsExtension, UNCOMPRESSED};
pub use key_share::{KeyShareEntry, KeyShareExtension};
pub use max_fragment_length::MaxFragmentLengthExtension;
pub use quic_transport_parameters::QuicTransportParametersExtension;
pub use renegotiation_info::RenegotiationInfoExtension;
pub use server_name::{ServerNameEntry, ServerNameExtension};
pub use signature_algorithms::SignatureAlgorithmsExtension;
pub use status_request::{StatusRequestExtension, StatusRequestV2Extension};
pub use supported_groups::SupportedGroupsExtension;
pub use supported_versions::SupportedVersionsExtension;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionType {
    ServerName,
    MaxFragmentLength,
    StatusRequest,
    SupportedGroups,
    EcPointFormats,
    SignatureAlgorithms,
    ApplicationLayerProtocolNegotiation,
    StatusRequestV2,
    ExtendedMasterSecret,
    SupportedVersions,
    KeyShare,
    QuicTransportParameters,
    RenegotiationInfo,
    Unknown(u16),
}

impl ExtensionType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => ExtensionType::ServerName,
            0x0001 => ExtensionType::MaxFragmentLength,
            0x0005 => ExtensionType::StatusRequest,
            0x000A => ExtensionType::SupportedGroups,
            0x000B => ExtensionType::EcPointFormats,
            0x000D => ExtensionType::SignatureAlgorithms,
            0x0010 => ExtensionType::ApplicationLayerProtocolNegotiation,
            0x0011 => ExtensionType::StatusRequestV2,
            0x0017 => ExtensionType::ExtendedMasterSecret,
            0x002B => ExtensionType::SupportedVersions,
            0x0033 => ExtensionType::KeyShare,
            0x0039 => ExtensionType::QuicTransportParameters,
            0xFF01 => ExtensionType::RenegotiationInfo,
            _ => ExtensionType::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ExtensionType::ServerName => 0x0000,
            ExtensionType::MaxFragmentLength => 0x0001,
            ExtensionType::StatusRequest => 0x0005,
            ExtensionType::SupportedGroups => 0x000A,
            ExtensionType::EcPointFormats => 0x000B,
            ExtensionType::SignatureAlgorithms => 0x000D,
            ExtensionType::ApplicationLayerProtocolNegotiation => 0x0010,
            ExtensionType::StatusRequestV2 => 0x0011,
            ExtensionType::ExtendedMasterSecret => 0x0017,
            ExtensionType::SupportedVersions => 0x002B,
            ExtensionType::KeyShare => 0x0033,
            ExtensionType::QuicTransportParameters => 0x0039,
            ExtensionType::RenegotiationInfo => 0xFF01,
            ExtensionType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ExtensionType> {
        let (input, value) = be_u16(input)?;
        Ok((input, ExtensionType::from_u16(value)))
    }
}

/// The handshake message an extension block belongs to.
///
/// ServerHello is split by version since TLS 1.3 moves most responses
/// into EncryptedExtensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageContext {
    ClientHello,
    ServerHello12,
    ServerHello13,
    EncryptedExtensions,
}

impl MessageContext {
    pub fn is_client_hello(&self) -> bool {
        matches!(self, MessageContext::ClientHello)
    }

    pub(crate) const fn mask(&self) -> u8 {
        match self {
            MessageContext::ClientHello => 0b0001,
            MessageContext::ServerHello12 => 0b0010,
            MessageContext::ServerHello13 => 0b0100,
            MessageContext::EncryptedExtensions => 0b1000,
        }
    }
}

/// One undecoded entry of an extension block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub ext_type: ExtensionType,
    pub data: Buf,
}

impl RawExtension {
    fn parse(input: &[u8]) -> IResult<&[u8], RawExtension> {
        let (input, ext_type) = ExtensionType::parse(input)?;
        let (input, data) = crate::types::opaque_u16(input)?;
        Ok((
            input,
            RawExtension {
                ext_type,
                data: Buf::from_slice(data),
            },
        ))
    }
}

/// Ordered extension block with a memoized encoded length.
#[derive(Debug, Default)]
pub struct ExtensionList {
    entries: Vec<RawExtension>,
    encoded_len: Cell<Option<usize>>,
}

impl Clone for ExtensionList {
    fn clone(&self) -> Self {
        ExtensionList {
            entries: self.entries.clone(),
            encoded_len: Cell::new(self.encoded_len.get()),
        }
    }
}

impl PartialEq for ExtensionList {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ExtensionList {}

impl ExtensionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawExtension> {
        self.entries.iter()
    }

    pub fn get(&self, ext_type: ExtensionType) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.ext_type == ext_type)
            .map(|e| &*e.data)
    }

    pub fn contains(&self, ext_type: ExtensionType) -> bool {
        self.entries.iter().any(|e| e.ext_type == ext_type)
    }

    /// Append one entry, invalidating the memoized length.
    ///
    /// An extension type may only appear once in a block.
    pub fn push(&mut self, ext_type: ExtensionType, data: Buf) -> Result<(), Error> {
        if self.contains(ext_type) {
            return Err(Error::Internal(format!(
                "extension {:?} produced twice",
                ext_type
            )));
        }
        if data.len() > u16::MAX as usize {
            return Err(Error::ResourceLimit(format!(
                "extension {:?} payload of {} bytes",
                ext_type,
                data.len()
            )));
        }
        self.entries.push(RawExtension { ext_type, data });
        self.encoded_len.set(None);
        Ok(())
    }

    /// Append a typed extension.
    pub fn push_extension(&mut self, ext: &Extension) -> Result<(), Error> {
        let mut data = Buf::new();
        ext.serialize(&mut data);
        self.push(ext.ext_type(), data)
    }

    /// Number of bytes [`encode`](Self::encode) will write, including the outer prefix.
    pub fn encoded_len(&self) -> usize {
        if let Some(len) = self.encoded_len.get() {
            return len;
        }
        let len = if self.entries.is_empty() {
            0
        } else {
            2 + self
                .entries
                .iter()
                .map(|e| 4 + e.data.len())
                .sum::<usize>()
        };
        self.encoded_len.set(Some(len));
        len
    }

    pub fn encode(&self, output: &mut Buf) -> Result<(), Error> {
        let len = self.encoded_len();
        if len == 0 {
            return Ok(());
        }
        let body = len - 2;
        if body > u16::MAX as usize {
            return Err(Error::ResourceLimit(format!(
                "extension block of {} bytes",
                body
            )));
        }
        output.push_u16(body as u16);
        for entry in &self.entries {
            output.push_u16(entry.ext_type.as_u16());
            output.push_u16(entry.data.len() as u16);
            output.extend_from_slice(&entry.data);
        }
        Ok(())
    }

    /// Decode an extension block, returning the bytes that follow it.
    ///
    /// No input at all is an empty list. Otherwise the declared length must be
    /// covered exactly by whole entries.
    pub fn decode(input: &[u8]) -> Result<(&[u8], ExtensionList), Error> {
        if input.is_empty() {
            return Ok((input, ExtensionList::new()));
        }
        if input.len() < 2 {
            return Err(Error::WireFormat("truncated extension length".into()));
        }
        let declared = u16::from_be_bytes([input[0], input[1]]) as usize;
        let rest = &input[2..];
        if rest.len() < declared {
            return Err(Error::WireFormat(format!(
                "extension block declares {} bytes, {} available",
                declared,
                rest.len()
            )));
        }
        let (mut block, rest) = rest.split_at(declared);

        let mut list = ExtensionList::new();
        let mut total = 0;
        while !block.is_empty() {
            let (next, entry) = RawExtension::parse(block).map_err(|_| {
                Error::WireFormat(format!(
                    "extension entries overrun declared length {}",
                    declared
                ))
            })?;
            if list.contains(entry.ext_type) {
                return Err(Error::WireFormat(format!(
                    "duplicate extension {:?}",
                    entry.ext_type
                )));
            }
            total += 4 + entry.data.len();
            list.entries.push(entry);
            block = next;
        }
        debug_assert_eq!(total, declared);
        list.encoded_len.set(Some(2 + declared));

        Ok((rest, list))
    }
}

/// A decoded extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    ServerName(ServerNameExtension),
    SignatureAlgorithms(SignatureAlgorithmsExtension),
    SupportedGroups(SupportedGroupsExtension),
    EcPointFormats(EcPointFormatsExtension),
    RenegotiationInfo(RenegotiationInfoExtension),
    Alpn(AlpnExtension),
    MaxFragmentLength(MaxFragmentLengthExtension),
    StatusRequest(StatusRequestExtension),
    StatusRequestV2(StatusRequestV2Extension),
    ExtendedMasterSecret,
    QuicTransportParameters(QuicTransportParametersExtension),
    SupportedVersions(SupportedVersionsExtension),
    KeyShare(KeyShareExtension),
    /// Any extension we have no decoder for, kept verbatim.
    Unknown(u16, Vec<u8>),
}

impl Extension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Extension::ServerName(_) => ExtensionType::ServerName,
            Extension::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Extension::SupportedGroups(_) => ExtensionType::SupportedGroups,
            Extension::EcPointFormats(_) => ExtensionType::EcPointFormats,
            Extension::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Extension::Alpn(_) => ExtensionType::ApplicationLayerProtocolNegotiation,
            Extension::MaxFragmentLength(_) => ExtensionType::MaxFragmentLength,
            Extension::StatusRequest(_) => ExtensionType::StatusRequest,
            Extension::StatusRequestV2(_) => ExtensionType::StatusRequestV2,
            Extension::ExtendedMasterSecret => ExtensionType::ExtendedMasterSecret,
            Extension::QuicTransportParameters(_) => ExtensionType::QuicTransportParameters,
            Extension::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Extension::KeyShare(_) => ExtensionType::KeyShare,
            Extension::Unknown(t, _) => ExtensionType::Unknown(*t),
        }
    }

    /// Decode one payload. The payload must be consumed exactly.
    ///
    /// `context` only matters for the extensions whose shape differs
    /// between ClientHello and the server's messages.
    pub fn decode(
        ext_type: ExtensionType,
        payload: &[u8],
        context: MessageContext,
    ) -> Result<Extension, Error> {
        let ext = match ext_type {
            ExtensionType::ServerName => {
                Extension::ServerName(exact(payload, ServerNameExtension::parse)?)
            }
            ExtensionType::SignatureAlgorithms => Extension::SignatureAlgorithms(exact(
                payload,
                SignatureAlgorithmsExtension::parse,
            )?),
            ExtensionType::SupportedGroups => {
                Extension::SupportedGroups(exact(payload, SupportedGroupsExtension::parse)?)
            }
            ExtensionType::EcPointFormats => {
                Extension::EcPointFormats(exact(payload, EcPointFormatsExtension::parse)?)
            }
            ExtensionType::RenegotiationInfo => Extension::RenegotiationInfo(exact(
                payload,
                RenegotiationInfoExtension::parse,
            )?),
            ExtensionType::ApplicationLayerProtocolNegotiation => {
                Extension::Alpn(exact(payload, AlpnExtension::parse)?)
            }
            ExtensionType::MaxFragmentLength => {
                Extension::MaxFragmentLength(MaxFragmentLengthExtension::decode(payload)?)
            }
            ExtensionType::StatusRequest => {
                Extension::StatusRequest(exact(payload, StatusRequestExtension::parse)?)
            }
            ExtensionType::StatusRequestV2 => {
                Extension::StatusRequestV2(exact(payload, StatusRequestV2Extension::parse)?)
            }
            ExtensionType::ExtendedMasterSecret => {
                if !payload.is_empty() {
                    return Err(Error::WireFormat(format!(
                        "extended_master_secret carries {} bytes",
                        payload.len()
                    )));
                }
                Extension::ExtendedMasterSecret
            }
            ExtensionType::QuicTransportParameters => Extension::QuicTransportParameters(
                QuicTransportParametersExtension::decode(payload)?,
            ),
            ExtensionType::SupportedVersions => {
                Extension::SupportedVersions(if context.is_client_hello() {
                    exact(payload, SupportedVersionsExtension::parse_offered)?
                } else {
                    exact(payload, SupportedVersionsExtension::parse_selected)?
                })
            }
            ExtensionType::KeyShare => Extension::KeyShare(if context.is_client_hello() {
                exact(payload, KeyShareExtension::parse_offered)?
            } else {
                exact(payload, KeyShareExtension::parse_selected)?
            }),
            ExtensionType::Unknown(t) => Extension::Unknown(t, payload.to_vec()),
        };
        Ok(ext)
    }

    /// Write the payload, without type and length.
    pub fn serialize(&self, output: &mut Buf) {
        match self {
            Extension::ServerName(e) => e.serialize(output),
            Extension::SignatureAlgorithms(e) => e.serialize(output),
            Extension::SupportedGroups(e) => e.serialize(output),
            Extension::EcPointFormats(e) => e.serialize(output),
            Extension::RenegotiationInfo(e) => e.serialize(output),
            Extension::Alpn(e) => e.serialize(output),
            Extension::MaxFragmentLength(e) => e.serialize(output),
            Extension::StatusRequest(e) => e.serialize(output),
            Extension::StatusRequestV2(e) => e.serialize(output),
            Extension::ExtendedMasterSecret => {}
            Extension::QuicTransportParameters(e) => e.serialize(output),
            Extension::SupportedVersions(e) => e.serialize(output),
            Extension::KeyShare(e) => e.serialize(output),
            Extension::Unknown(_, data) => output.extend_from_slice(data),
        }
    }
}

/// Run `parser` over the whole of `payload`, failing if anything is left over.
fn exact<'a, T>(
    payload: &'a [u8],
    parser: impl FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
) -> Result<T, Error> {
    let (_, value) = all_consuming(parser)(payload)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_encodes_to_nothing() {
        let list = ExtensionList::new();
        let mut out = Buf::new();
        list.encode(&mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(list.encoded_len(), 0);
    }

    #[test]
    fn list_roundtrip_keeps_order_and_unknowns() {
        let mut list = ExtensionList::new();
        list.push(ExtensionType::ExtendedMasterSecret, Buf::new())
            .unwrap();
        list.push(ExtensionType::Unknown(0x7a7a), Buf::from_slice(&[1, 2, 3]))
            .unwrap();
        list.push(ExtensionType::MaxFragmentLength, Buf::from_slice(&[2]))
            .unwrap();

        let mut out = Buf::new();
        list.encode(&mut out).unwrap();
        assert_eq!(out.len(), list.encoded_len());
        assert_eq!(&out[..2], &[0, 4 + 4 + 3 + 4 + 1]);

        let (rest, decoded) = ExtensionList::decode(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, list);
        assert_eq!(
            decoded.get(ExtensionType::Unknown(0x7a7a)),
            Some(&[1u8, 2, 3][..])
        );
    }

    fn roundtrip(list: &ExtensionList) {
        let mut out = Buf::new();
        list.encode(&mut out).unwrap();
        assert_eq!(out.len(), list.encoded_len());
        let (rest, decoded) = ExtensionList::decode(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(&decoded, list);
        assert_eq!(decoded.encoded_len(), list.encoded_len());
    }

    #[test]
    fn roundtrip_over_generated_lists() {
        const KNOWN: [ExtensionType; 13] = [
            ExtensionType::ServerName,
            ExtensionType::MaxFragmentLength,
            ExtensionType::StatusRequest,
            ExtensionType::SupportedGroups,
            ExtensionType::EcPointFormats,
            ExtensionType::SignatureAlgorithms,
            ExtensionType::ApplicationLayerProtocolNegotiation,
            ExtensionType::StatusRequestV2,
            ExtensionType::ExtendedMasterSecret,
            ExtensionType::SupportedVersions,
            ExtensionType::KeyShare,
            ExtensionType::QuicTransportParameters,
            ExtensionType::RenegotiationInfo,
        ];

        roundtrip(&ExtensionList::new());

        for ext_type in KNOWN {
            let mut single = ExtensionList::new();
            single.push(ext_type, Buf::from_slice(&[0x42])).unwrap();
            roundtrip(&single);
        }

        // Largest payload that still fits the outer u16 length.
        let mut largest = ExtensionList::new();
        largest
            .push(ExtensionType::Unknown(0x1234), Buf::from_slice(&vec![0xab; 65531]))
            .unwrap();
        roundtrip(&largest);
        let mut too_large = largest.clone();
        too_large
            .push(ExtensionType::ExtendedMasterSecret, Buf::new())
            .unwrap();
        assert!(matches!(
            too_large.encode(&mut Buf::new()),
            Err(Error::ResourceLimit(_))
        ));

        // Every known type, payload sizes varying per entry, unknowns between.
        let mut all = ExtensionList::new();
        for (i, ext_type) in KNOWN.iter().enumerate() {
            let payload: Vec<u8> = (0..i as u8 * 7).collect();
            all.push(*ext_type, Buf::from_slice(&payload)).unwrap();
            all.push(ExtensionType::Unknown(0xfa00 + i as u16), Buf::from_slice(&[i as u8]))
                .unwrap();
        }
        roundtrip(&all);
    }

    #[test]
    fn push_invalidates_memoized_length() {
        let mut list = ExtensionList::new();
        list.push(ExtensionType::ExtendedMasterSecret, Buf::new())
            .unwrap();
        assert_eq!(list.encoded_len(), 6);
        list.push(ExtensionType::RenegotiationInfo, Buf::from_slice(&[0]))
            .unwrap();
        assert_eq!(list.encoded_len(), 11);
    }

    #[test]
    fn declared_length_must_match_entries() {
        // Declared 6, one entry of 4 + 1.
        let short = [0x00, 0x06, 0x00, 0x01, 0x00, 0x01, 0x02, 0xFF];
        assert!(matches!(
            ExtensionList::decode(&short),
            Err(Error::WireFormat(_))
        ));

        // Declared 4, entry claims 1 byte of payload beyond it.
        let long = [0x00, 0x04, 0x00, 0x01, 0x00, 0x01, 0x02];
        assert!(matches!(
            ExtensionList::decode(&long),
            Err(Error::WireFormat(_))
        ));

        // Declared more than is present.
        let truncated = [0x00, 0x09, 0x00, 0x17, 0x00, 0x00];
        assert!(matches!(
            ExtensionList::decode(&truncated),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn trailing_bytes_after_block_are_returned() {
        let input = [0x00, 0x04, 0x00, 0x17, 0x00, 0x00, 0xAB];
        let (rest, list) = ExtensionList::decode(&input).unwrap();
        assert_eq!(rest, &[0xAB]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn duplicate_types_rejected() {
        let input = [0x00, 0x08, 0x00, 0x17, 0x00, 0x00, 0x00, 0x17, 0x00, 0x00];
        assert!(matches!(
            ExtensionList::decode(&input),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn extended_master_secret_must_be_empty() {
        let err = Extension::decode(
            ExtensionType::ExtendedMasterSecret,
            &[0],
            MessageContext::ClientHello,
        )
        .unwrap_err();
        assert!(matches!(err, Error::WireFormat(_)));
    }

    #[test]
    fn unknown_extension_is_opaque() {
        let ext = Extension::decode(
            ExtensionType::Unknown(0xABCD),
            &[9, 8, 7],
            MessageContext::ServerHello13,
        )
        .unwrap();
        assert_eq!(ext, Extension::Unknown(0xABCD, vec![9, 8, 7]));
        let mut out = Buf::new();
        ext.serialize(&mut out);
        assert_eq!(&*out, &[9, 8, 7]);
    }
}
