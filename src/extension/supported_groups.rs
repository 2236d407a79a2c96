use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::types::NamedGroup;

/// SupportedGroups extension, RFC 8422 Section 5.1.1 and RFC 7919.
///
/// Unknown groups are kept so the server can skip them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedGroupsExtension {
    pub groups: Vec<NamedGroup>,
}

impl SupportedGroupsExtension {
    pub fn new(groups: &[NamedGroup]) -> Self {
        SupportedGroupsExtension {
            groups: groups.to_vec(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SupportedGroupsExtension> {
        let (rest, list_len) = be_u16(input)?;
        if list_len < 2 || list_len % 2 != 0 {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (rest, mut list) = take(list_len)(rest)?;

        let mut groups = Vec::with_capacity(list_len as usize / 2);
        while !list.is_empty() {
            let (r, group) = NamedGroup::parse(list)?;
            groups.push(group);
            list = r;
        }

        Ok((rest, SupportedGroupsExtension { groups }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        // Write the total length of all groups (2 bytes per group)
        output.push_u16((self.groups.len() * 2) as u16);
        for group in &self.groups {
            output.push_u16(group.as_u16());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_groups_extension() {
        let ext = SupportedGroupsExtension::new(&[
            NamedGroup::X25519MlKem768,
            NamedGroup::X25519,
            NamedGroup::Secp256r1,
        ]);

        let mut serialized = Buf::new();
        ext.serialize(&mut serialized);

        let expected = [
            0x00, 0x06, // Groups length
            0x11, 0xEC, // X25519MLKEM768
            0x00, 0x1D, // X25519
            0x00, 0x17, // secp256r1
        ];
        assert_eq!(&*serialized, expected);

        let (_, parsed) = SupportedGroupsExtension::parse(&serialized).unwrap();
        assert_eq!(parsed, ext);
    }

    #[test]
    fn test_supported_groups_parse_provided_bytes() {
        // 0x0100 is ffdhe2048, 0x0101 is ffdhe3072 which we don't implement.
        let bytes = [0, 10, 0, 29, 0, 23, 0, 24, 1, 0, 1, 1];

        let (rest, parsed) =
            SupportedGroupsExtension::parse(&bytes).expect("parse SupportedGroups");
        assert!(rest.is_empty());
        assert_eq!(
            parsed.groups,
            vec![
                NamedGroup::X25519,
                NamedGroup::Secp256r1,
                NamedGroup::Secp384r1,
                NamedGroup::Ffdhe2048,
                NamedGroup::Unknown(0x0101),
            ]
        );
    }
}
