use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use crate::buffer::Buf;

/// The only point format anyone uses.
pub const UNCOMPRESSED: u8 = 0;

/// EcPointFormats extension (RFC 8422 Section 5.1.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPointFormatsExtension {
    pub formats: Vec<u8>,
}

impl Default for EcPointFormatsExtension {
    fn default() -> Self {
        EcPointFormatsExtension {
            formats: vec![UNCOMPRESSED],
        }
    }
}

impl EcPointFormatsExtension {
    pub fn supports_uncompressed(&self) -> bool {
        self.formats.contains(&UNCOMPRESSED)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], EcPointFormatsExtension> {
        let (rest, len) = be_u8(input)?;
        if len == 0 {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (rest, formats) = take(len)(rest)?;
        Ok((
            rest,
            EcPointFormatsExtension {
                formats: formats.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.formats.len() as u8);
        output.extend_from_slice(&self.formats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_uncompressed() {
        let mut out = Buf::new();
        EcPointFormatsExtension::default().serialize(&mut out);
        assert_eq!(&*out, &[1, 0]);

        let (_, parsed) = EcPointFormatsExtension::parse(&[2, 1, 2]).unwrap();
        assert!(!parsed.supports_uncompressed());
    }
}
