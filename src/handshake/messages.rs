use nom::bytes::complete::take;
use nom::combinator::all_consuming;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::IResult;

use crate::buffer::Buf;
use crate::extension::ExtensionList;
use crate::types::{opaque_u16, opaque_u8, KeyExchangeAlgorithm, NamedGroup, SignatureScheme};
use crate::Error;

/// `ECCurveType.named_curve` (RFC 8422 Section 5.4).
const NAMED_CURVE: u8 = 3;

/// Run `parser` over the whole body.
fn exact<'a, T>(
    body: &'a [u8],
    parser: impl FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
) -> Result<T, Error> {
    let (_, value) = all_consuming(parser)(body)?;
    Ok(value)
}

/// Ephemeral parameters of a TLS 1.2 ServerKeyExchange.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyExchangeParams {
    Ecdhe {
        group: NamedGroup,
        public: Vec<u8>,
    },
    Dhe {
        p: Vec<u8>,
        g: Vec<u8>,
        public: Vec<u8>,
    },
}

impl std::fmt::Debug for KeyExchangeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyExchangeParams::Ecdhe { group, public } => f
                .debug_struct("Ecdhe")
                .field("group", group)
                .field("public_len", &public.len())
                .finish(),
            KeyExchangeParams::Dhe { p, public, .. } => f
                .debug_struct("Dhe")
                .field("p_len", &p.len())
                .field("public_len", &public.len())
                .finish(),
        }
    }
}

impl KeyExchangeParams {
    fn parse(input: &[u8], kx: KeyExchangeAlgorithm) -> IResult<&[u8], KeyExchangeParams> {
        match kx {
            KeyExchangeAlgorithm::Ecdhe => {
                let (input, curve_type) = be_u8(input)?;
                if curve_type != NAMED_CURVE {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        input,
                        nom::error::ErrorKind::Tag,
                    )));
                }
                let (input, group) = NamedGroup::parse(input)?;
                let (input, public) = opaque_u8(input)?;
                Ok((
                    input,
                    KeyExchangeParams::Ecdhe {
                        group,
                        public: public.to_vec(),
                    },
                ))
            }
            KeyExchangeAlgorithm::Dhe => {
                let (input, p) = opaque_u16(input)?;
                let (input, g) = opaque_u16(input)?;
                let (input, public) = opaque_u16(input)?;
                Ok((
                    input,
                    KeyExchangeParams::Dhe {
                        p: p.to_vec(),
                        g: g.to_vec(),
                        public: public.to_vec(),
                    },
                ))
            }
            KeyExchangeAlgorithm::Any => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Switch,
            ))),
        }
    }

    /// The encoded parameters, which are also the signed part.
    pub fn serialize(&self, output: &mut Buf) {
        match self {
            KeyExchangeParams::Ecdhe { group, public } => {
                output.push(NAMED_CURVE);
                output.push_u16(group.as_u16());
                output.push(public.len() as u8);
                output.extend_from_slice(public);
            }
            KeyExchangeParams::Dhe { p, g, public } => {
                for v in [p, g, public] {
                    output.push_u16(v.len() as u16);
                    output.extend_from_slice(v);
                }
            }
        }
    }

    pub fn public(&self) -> &[u8] {
        match self {
            KeyExchangeParams::Ecdhe { public, .. } | KeyExchangeParams::Dhe { public, .. } => {
                public
            }
        }
    }
}

/// TLS 1.2 ServerKeyExchange: parameters plus a signature over
/// `client_random + server_random + params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub params: KeyExchangeParams,
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
}

impl ServerKeyExchange {
    fn parse(input: &[u8], kx: KeyExchangeAlgorithm) -> IResult<&[u8], ServerKeyExchange> {
        let (input, params) = KeyExchangeParams::parse(input, kx)?;
        let (input, scheme) = SignatureScheme::parse(input)?;
        let (input, signature) = opaque_u16(input)?;
        Ok((
            input,
            ServerKeyExchange {
                params,
                scheme,
                signature: signature.to_vec(),
            },
        ))
    }

    pub fn decode(body: &[u8], kx: KeyExchangeAlgorithm) -> Result<ServerKeyExchange, Error> {
        exact(body, |i| Self::parse(i, kx))
    }

    pub fn serialize(&self, output: &mut Buf) {
        self.params.serialize(output);
        output.push_u16(self.scheme.as_u16());
        output.push_u16(self.signature.len() as u16);
        output.extend_from_slice(&self.signature);
    }
}

/// TLS 1.2 ClientKeyExchange carrying the client's ephemeral public value.
///
/// The length prefix is one byte for ECDHE and two for DHE.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub public: Vec<u8>,
}

impl std::fmt::Debug for ClientKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientKeyExchange")
            .field("public_len", &self.public.len())
            .finish()
    }
}

impl ClientKeyExchange {
    pub fn decode(body: &[u8], kx: KeyExchangeAlgorithm) -> Result<ClientKeyExchange, Error> {
        let public = match kx {
            KeyExchangeAlgorithm::Ecdhe => exact(body, opaque_u8)?,
            KeyExchangeAlgorithm::Dhe => exact(body, opaque_u16)?,
            KeyExchangeAlgorithm::Any => {
                return Err(Error::UnsupportedOperation(
                    "ClientKeyExchange outside TLS 1.2".into(),
                ))
            }
        };
        if public.is_empty() {
            return Err(Error::WireFormat("empty ClientKeyExchange".into()));
        }
        Ok(ClientKeyExchange {
            public: public.to_vec(),
        })
    }

    pub fn serialize(&self, output: &mut Buf, kx: KeyExchangeAlgorithm) {
        match kx {
            KeyExchangeAlgorithm::Dhe => output.push_u16(self.public.len() as u16),
            _ => output.push(self.public.len() as u8),
        }
        output.extend_from_slice(&self.public);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    /// `expected_len` is 12 for TLS 1.2 and the hash length for TLS 1.3.
    pub fn decode(body: &[u8], expected_len: usize) -> Result<Finished, Error> {
        if body.len() != expected_len {
            return Err(Error::WireFormat(format!(
                "Finished of {} bytes, expected {}",
                body.len(),
                expected_len
            )));
        }
        Ok(Finished {
            verify_data: body.to_vec(),
        })
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.verify_data);
    }
}

/// TLS 1.3 KeyUpdate (RFC 8446 Section 4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUpdate {
    pub update_requested: bool,
}

impl KeyUpdate {
    pub fn decode(body: &[u8]) -> Result<KeyUpdate, Error> {
        match body {
            [0] => Ok(KeyUpdate {
                update_requested: false,
            }),
            [1] => Ok(KeyUpdate {
                update_requested: true,
            }),
            [v] => Err(Error::WireFormat(format!("KeyUpdate request value {}", v))),
            _ => Err(Error::WireFormat(format!(
                "KeyUpdate body of {} bytes",
                body.len()
            ))),
        }
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.update_requested as u8);
    }
}

/// TLS 1.3 NewSessionTicket (RFC 8446 Section 4.6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket {
    pub lifetime: u32,
    pub age_add: u32,
    pub nonce: Vec<u8>,
    pub ticket: Vec<u8>,
    pub extensions: ExtensionList,
}

impl NewSessionTicket {
    fn parse_fixed(input: &[u8]) -> IResult<&[u8], (u32, u32, &[u8], &[u8])> {
        let (input, lifetime) = be_u32(input)?;
        let (input, age_add) = be_u32(input)?;
        let (input, nonce) = opaque_u8(input)?;
        let (input, ticket_len) = be_u16(input)?;
        if ticket_len == 0 {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (input, ticket) = take(ticket_len)(input)?;
        Ok((input, (lifetime, age_add, nonce, ticket)))
    }

    /// The extension block is mandatory here, so an empty one is `00 00`.
    pub fn decode(body: &[u8]) -> Result<NewSessionTicket, Error> {
        let (rest, (lifetime, age_add, nonce, ticket)) = Self::parse_fixed(body)?;
        if rest.len() < 2 {
            return Err(Error::WireFormat("NewSessionTicket without extensions".into()));
        }
        let extensions = if rest == [0, 0] {
            ExtensionList::new()
        } else {
            let (rest, list) = ExtensionList::decode(rest)?;
            if !rest.is_empty() {
                return Err(Error::WireFormat(format!(
                    "{} bytes after NewSessionTicket",
                    rest.len()
                )));
            }
            list
        };
        Ok(NewSessionTicket {
            lifetime,
            age_add,
            nonce: nonce.to_vec(),
            ticket: ticket.to_vec(),
            extensions,
        })
    }

    pub fn serialize(&self, output: &mut Buf) -> Result<(), Error> {
        output.extend_from_slice(&self.lifetime.to_be_bytes());
        output.extend_from_slice(&self.age_add.to_be_bytes());
        output.push(self.nonce.len() as u8);
        output.extend_from_slice(&self.nonce);
        output.push_u16(self.ticket.len() as u16);
        output.extend_from_slice(&self.ticket);
        if self.extensions.is_empty() {
            output.push_u16(0);
            Ok(())
        } else {
            self.extensions.encode(output)
        }
    }
}

/// TLS 1.3 EncryptedExtensions. Like NewSessionTicket, the block is
/// always present on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptedExtensions {
    pub extensions: ExtensionList,
}

impl EncryptedExtensions {
    pub fn decode(body: &[u8]) -> Result<EncryptedExtensions, Error> {
        match body {
            [0, 0] => Ok(EncryptedExtensions::default()),
            [] | [_] => Err(Error::WireFormat("EncryptedExtensions truncated".into())),
            _ => {
                let (rest, extensions) = ExtensionList::decode(body)?;
                if !rest.is_empty() {
                    return Err(Error::WireFormat(format!(
                        "{} bytes after EncryptedExtensions",
                        rest.len()
                    )));
                }
                Ok(EncryptedExtensions { extensions })
            }
        }
    }

    pub fn serialize(&self, output: &mut Buf) -> Result<(), Error> {
        if self.extensions.is_empty() {
            output.push_u16(0);
            Ok(())
        } else {
            self.extensions.encode(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_update_values() {
        assert!(KeyUpdate::decode(&[1]).unwrap().update_requested);
        assert!(!KeyUpdate::decode(&[0]).unwrap().update_requested);
        assert!(matches!(KeyUpdate::decode(&[2]), Err(Error::WireFormat(_))));
        assert!(matches!(KeyUpdate::decode(&[]), Err(Error::WireFormat(_))));
        assert!(matches!(
            KeyUpdate::decode(&[0, 0]),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn server_key_exchange_ecdhe() {
        let ske = ServerKeyExchange {
            params: KeyExchangeParams::Ecdhe {
                group: NamedGroup::X25519,
                public: vec![4; 32],
            },
            scheme: SignatureScheme::ECDSA_SECP256R1_SHA256,
            signature: vec![0x30, 0x01, 0x00],
        };
        let mut out = Buf::new();
        ske.serialize(&mut out);
        assert_eq!(&out[..4], &[3, 0x00, 0x1D, 32]);
        let decoded = ServerKeyExchange::decode(&out, KeyExchangeAlgorithm::Ecdhe).unwrap();
        assert_eq!(decoded, ske);

        // The same bytes are not valid DHE parameters.
        assert!(ServerKeyExchange::decode(&out, KeyExchangeAlgorithm::Dhe).is_err());
    }

    #[test]
    fn server_key_exchange_dhe() {
        let ske = ServerKeyExchange {
            params: KeyExchangeParams::Dhe {
                p: vec![0xFF; 256],
                g: vec![2],
                public: vec![9; 256],
            },
            scheme: SignatureScheme::ECDSA_SECP384R1_SHA384,
            signature: vec![1; 70],
        };
        let mut out = Buf::new();
        ske.serialize(&mut out);
        let decoded = ServerKeyExchange::decode(&out, KeyExchangeAlgorithm::Dhe).unwrap();
        assert_eq!(decoded.params.public(), &[9; 256][..]);
    }

    #[test]
    fn client_key_exchange_prefix_width() {
        let cke = ClientKeyExchange {
            public: vec![5; 65],
        };
        let mut ecdhe = Buf::new();
        cke.serialize(&mut ecdhe, KeyExchangeAlgorithm::Ecdhe);
        assert_eq!(ecdhe[0], 65);
        let mut dhe = Buf::new();
        cke.serialize(&mut dhe, KeyExchangeAlgorithm::Dhe);
        assert_eq!(&dhe[..2], &[0, 65]);

        assert_eq!(
            ClientKeyExchange::decode(&dhe, KeyExchangeAlgorithm::Dhe).unwrap(),
            cke
        );
        assert!(ClientKeyExchange::decode(&dhe, KeyExchangeAlgorithm::Ecdhe).is_err());
    }

    #[test]
    fn finished_length_is_exact() {
        assert!(Finished::decode(&[0; 12], 12).is_ok());
        assert!(matches!(
            Finished::decode(&[0; 13], 12),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn new_session_ticket_roundtrip() {
        let nst = NewSessionTicket {
            lifetime: 7200,
            age_add: 0xDEADBEEF,
            nonce: vec![0, 1],
            ticket: vec![42; 32],
            extensions: ExtensionList::new(),
        };
        let mut out = Buf::new();
        nst.serialize(&mut out).unwrap();
        assert_eq!(&out[out.len() - 2..], &[0, 0]);
        assert_eq!(NewSessionTicket::decode(&out).unwrap(), nst);

        out.truncate(out.len() - 2);
        assert!(NewSessionTicket::decode(&out).is_err());
    }

    #[test]
    fn empty_encrypted_extensions() {
        let ee = EncryptedExtensions::default();
        let mut out = Buf::new();
        ee.serialize(&mut out).unwrap();
        assert_eq!(&*out, &[0, 0]);
        assert!(EncryptedExtensions::decode(&out).unwrap().extensions.is_empty());
        assert!(EncryptedExtensions::decode(&[]).is_err());
    }
}
