//! KeyShare extension (RFC 8446 Section 4.2.8)
//!
//! The key_exchange bytes are kept raw. For KEM groups the client's entry
//! is an encapsulation key and the server's entry is a ciphertext, so
//! nothing here tries to interpret them as public keys.

use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::{opaque_u16, NamedGroup};

/// A single key share entry: named group + raw key exchange bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

impl std::fmt::Debug for KeyShareEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShareEntry")
            .field("group", &self.group)
            .field("len", &self.key_exchange.len())
            .finish()
    }
}

impl KeyShareEntry {
    pub fn new(group: NamedGroup, key_exchange: Vec<u8>) -> Self {
        KeyShareEntry {
            group,
            key_exchange,
        }
    }

    fn parse(input: &[u8]) -> IResult<&[u8], KeyShareEntry> {
        let (input, group) = NamedGroup::parse(input)?;
        let (rest, key_exchange) = opaque_u16(input)?;
        if key_exchange.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        Ok((
            rest,
            KeyShareEntry {
                group,
                key_exchange: key_exchange.to_vec(),
            },
        ))
    }

    fn serialize(&self, output: &mut Buf) {
        output.push_u16(self.group.as_u16());
        output.push_u16(self.key_exchange.len() as u16);
        output.extend_from_slice(&self.key_exchange);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyShareExtension {
    /// ClientHello: one entry per group the client generated a share for.
    Offered(Vec<KeyShareEntry>),
    /// ServerHello: the server's single share.
    Selected(KeyShareEntry),
}

impl KeyShareExtension {
    pub fn parse_offered(input: &[u8]) -> IResult<&[u8], KeyShareExtension> {
        let (rest, list_len) = be_u16(input)?;
        let (rest, mut list) = take(list_len)(rest)?;
        let mut entries: Vec<KeyShareEntry> = Vec::new();
        while !list.is_empty() {
            let (r, entry) = KeyShareEntry::parse(list)?;
            // Each group may appear at most once.
            if entries.iter().any(|e| e.group == entry.group) {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    list,
                    nom::error::ErrorKind::Verify,
                )));
            }
            entries.push(entry);
            list = r;
        }
        Ok((rest, KeyShareExtension::Offered(entries)))
    }

    pub fn parse_selected(input: &[u8]) -> IResult<&[u8], KeyShareExtension> {
        let (rest, entry) = KeyShareEntry::parse(input)?;
        Ok((rest, KeyShareExtension::Selected(entry)))
    }

    pub fn serialize(&self, output: &mut Buf) {
        match self {
            KeyShareExtension::Offered(entries) => {
                let len: usize = entries.iter().map(|e| 4 + e.key_exchange.len()).sum();
                output.push_u16(len as u16);
                for e in entries {
                    e.serialize(output);
                }
            }
            KeyShareExtension::Selected(entry) => entry.serialize(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_entries_roundtrip() {
        let ext = KeyShareExtension::Offered(vec![
            KeyShareEntry::new(NamedGroup::X25519, vec![7; 32]),
            KeyShareEntry::new(NamedGroup::Secp256r1, vec![4; 65]),
        ]);
        let mut out = Buf::new();
        ext.serialize(&mut out);
        assert_eq!(&out[..2], &[0, 36 + 69]);
        let (rest, parsed) = KeyShareExtension::parse_offered(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, ext);
    }

    #[test]
    fn duplicate_group_rejected() {
        let ext = KeyShareExtension::Offered(vec![
            KeyShareEntry::new(NamedGroup::X25519, vec![7; 32]),
            KeyShareEntry::new(NamedGroup::X25519, vec![8; 32]),
        ]);
        let mut out = Buf::new();
        ext.serialize(&mut out);
        assert!(KeyShareExtension::parse_offered(&out).is_err());
    }

    #[test]
    fn debug_does_not_print_key_bytes() {
        let entry = KeyShareEntry::new(NamedGroup::MlKem768, vec![0xAB; 1088]);
        let dbg = format!("{:?}", entry);
        assert!(dbg.contains("1088"));
        assert!(!dbg.contains("171"));
    }
}
