use crate::buffer::Buf;
use crate::Error;

/// MaxFragmentLength extension (RFC 6066 Section 4).
///
/// One byte, 1..=4, mapping to 2^9..=2^12 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxFragmentLengthExtension {
    code: u8,
}

impl MaxFragmentLengthExtension {
    /// Pick the largest code whose size is not above `fragment_size`.
    ///
    /// Anything below 1024 maps to 512, anything from 4096 up to 4096.
    pub fn from_fragment_size(fragment_size: usize) -> Self {
        let code = if fragment_size >= 4096 {
            4
        } else if fragment_size >= 2048 {
            3
        } else if fragment_size >= 1024 {
            2
        } else {
            1
        };
        MaxFragmentLengthExtension { code }
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn fragment_size(&self) -> usize {
        1 << (8 + self.code as usize)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        match payload {
            [code @ 1..=4] => Ok(MaxFragmentLengthExtension { code: *code }),
            [code] => Err(Error::WireFormat(format!(
                "max_fragment_length value {}",
                code
            ))),
            _ => Err(Error::WireFormat(format!(
                "max_fragment_length payload of {} bytes",
                payload.len()
            ))),
        }
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_round_down_to_codes() {
        assert_eq!(MaxFragmentLengthExtension::from_fragment_size(300).code(), 1);
        assert_eq!(MaxFragmentLengthExtension::from_fragment_size(1500).code(), 2);
        assert_eq!(MaxFragmentLengthExtension::from_fragment_size(3000).code(), 3);
        assert_eq!(MaxFragmentLengthExtension::from_fragment_size(5000).code(), 4);
        assert_eq!(
            MaxFragmentLengthExtension::from_fragment_size(3000).fragment_size(),
            2048
        );
    }

    #[test]
    fn decode_rejects_out_of_range() {
        assert!(matches!(
            MaxFragmentLengthExtension::decode(&[5]),
            Err(Error::WireFormat(_))
        ));
        assert!(matches!(
            MaxFragmentLengthExtension::decode(&[0]),
            Err(Error::WireFormat(_))
        ));
        assert!(matches!(
            MaxFragmentLengthExtension::decode(&[1, 1]),
            Err(Error::WireFormat(_))
        ));
        assert_eq!(
            MaxFragmentLengthExtension::decode(&[4]).unwrap().fragment_size(),
            4096
        );
    }
}
