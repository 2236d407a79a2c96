use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::SignatureScheme;

/// SignatureAlgorithms extension (RFC 8446 Section 4.2.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureAlgorithmsExtension {
    pub schemes: Vec<SignatureScheme>,
}

impl SignatureAlgorithmsExtension {
    pub fn new(schemes: &[SignatureScheme]) -> Self {
        SignatureAlgorithmsExtension {
            schemes: schemes.to_vec(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureAlgorithmsExtension> {
        let (rest, list_len) = be_u16(input)?;
        if list_len < 2 || list_len % 2 != 0 {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (rest, mut list) = take(list_len)(rest)?;

        let mut schemes = Vec::with_capacity(list_len as usize / 2);
        while !list.is_empty() {
            let (r, scheme) = SignatureScheme::parse(list)?;
            schemes.push(scheme);
            list = r;
        }

        Ok((rest, SignatureAlgorithmsExtension { schemes }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push_u16((self.schemes.len() * 2) as u16);
        for s in &self.schemes {
            output.push_u16(s.as_u16());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_unknown_schemes() {
        let bytes = [0x00, 0x04, 0x04, 0x03, 0xFE, 0xFE];
        let (rest, ext) = SignatureAlgorithmsExtension::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            ext.schemes,
            vec![
                SignatureScheme::ECDSA_SECP256R1_SHA256,
                SignatureScheme::Unknown(0xFEFE)
            ]
        );
    }

    #[test]
    fn odd_length_rejected() {
        assert!(SignatureAlgorithmsExtension::parse(&[0x00, 0x03, 0x04, 0x03, 0x00]).is_err());
        assert!(SignatureAlgorithmsExtension::parse(&[0x00, 0x00]).is_err());
    }
}
