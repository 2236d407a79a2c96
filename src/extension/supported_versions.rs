use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::ProtocolVersion;

/// SupportedVersions extension (RFC 8446 Section 4.2.1).
///
/// ClientHello carries a u8-prefixed list, ServerHello a single version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportedVersionsExtension {
    Offered(Vec<ProtocolVersion>),
    Selected(ProtocolVersion),
}

impl SupportedVersionsExtension {
    pub fn parse_offered(input: &[u8]) -> IResult<&[u8], SupportedVersionsExtension> {
        let (rest, len) = be_u8(input)?;
        if len < 2 || len % 2 != 0 {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (rest, mut list) = take(len)(rest)?;
        let mut versions = Vec::with_capacity(len as usize / 2);
        while !list.is_empty() {
            let (r, v) = ProtocolVersion::parse(list)?;
            versions.push(v);
            list = r;
        }
        Ok((rest, SupportedVersionsExtension::Offered(versions)))
    }

    pub fn parse_selected(input: &[u8]) -> IResult<&[u8], SupportedVersionsExtension> {
        let (rest, v) = ProtocolVersion::parse(input)?;
        Ok((rest, SupportedVersionsExtension::Selected(v)))
    }

    pub fn serialize(&self, output: &mut Buf) {
        match self {
            SupportedVersionsExtension::Offered(versions) => {
                output.push((versions.len() * 2) as u8);
                for v in versions {
                    output.push_u16(v.as_u16());
                }
            }
            SupportedVersionsExtension::Selected(v) => output.push_u16(v.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offered_and_selected() {
        let ext = SupportedVersionsExtension::Offered(vec![
            ProtocolVersion::TLS1_3,
            ProtocolVersion::TLS1_2,
        ]);
        let mut out = Buf::new();
        ext.serialize(&mut out);
        assert_eq!(&*out, &[4, 0x03, 0x04, 0x03, 0x03]);
        let (_, parsed) = SupportedVersionsExtension::parse_offered(&out).unwrap();
        assert_eq!(parsed, ext);

        let (_, sel) = SupportedVersionsExtension::parse_selected(&[0x03, 0x04]).unwrap();
        assert_eq!(sel, SupportedVersionsExtension::Selected(ProtocolVersion::TLS1_3));
    }
}
