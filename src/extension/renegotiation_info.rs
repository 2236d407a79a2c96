use nom::IResult;

use crate::buffer::Buf;
use crate::types::opaque_u8;

/// RenegotiationInfo extension (RFC 5746).
///
/// Renegotiation is never performed, so on an initial handshake the
/// `renegotiated_connection` field must be empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenegotiationInfoExtension {
    pub renegotiated_connection: Vec<u8>,
}

impl RenegotiationInfoExtension {
    pub fn parse(input: &[u8]) -> IResult<&[u8], RenegotiationInfoExtension> {
        let (rest, data) = opaque_u8(input)?;
        Ok((
            rest,
            RenegotiationInfoExtension {
                renegotiated_connection: data.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.renegotiated_connection.len() as u8);
        output.extend_from_slice(&self.renegotiated_connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_handshake_encoding() {
        let mut out = Buf::new();
        RenegotiationInfoExtension::default().serialize(&mut out);
        assert_eq!(&*out, &[0]);
        assert!(RenegotiationInfoExtension::parse(&[2, 1]).is_err());
    }
}
