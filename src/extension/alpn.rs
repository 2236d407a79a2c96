//! Application-Layer Protocol Negotiation (RFC 7301).

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::buffer::Buf;

/// ALPN extension. The client offers a list, the server answers with exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlpnExtension {
    pub protocols: Vec<Vec<u8>>,
}

impl AlpnExtension {
    pub fn new<P: AsRef<[u8]>>(protocols: &[P]) -> Self {
        AlpnExtension {
            protocols: protocols.iter().map(|p| p.as_ref().to_vec()).collect(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], AlpnExtension> {
        let (rest, list_len) = be_u16(input)?;
        let (rest, mut list) = take(list_len)(rest)?;
        if list.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }

        let mut protocols = Vec::new();
        while !list.is_empty() {
            let (r, len) = be_u8(list)?;
            if len == 0 {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    list,
                    nom::error::ErrorKind::LengthValue,
                )));
            }
            let (r, name) = take(len)(r)?;
            protocols.push(name.to_vec());
            list = r;
        }

        Ok((rest, AlpnExtension { protocols }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        let len: usize = self.protocols.iter().map(|p| 1 + p.len()).sum();
        output.push_u16(len as u16);
        for p in &self.protocols {
            output.push(p.len() as u8);
            output.extend_from_slice(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpn_wire_format() {
        let ext = AlpnExtension::new(&["h2", "http/1.1"]);
        let mut out = Buf::new();
        ext.serialize(&mut out);
        assert_eq!(&out[..3], &[0x00, 0x0c, 0x02]);

        let (rest, parsed) = AlpnExtension::parse(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, ext);
    }

    #[test]
    fn empty_protocol_name_rejected() {
        assert!(AlpnExtension::parse(&[0x00, 0x01, 0x00]).is_err());
        assert!(AlpnExtension::parse(&[0x00, 0x00]).is_err());
    }
}
