//! Server Name Indication (RFC 6066 Section 3).

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::buffer::Buf;

/// `host_name` is the only name type ever defined.
pub const HOST_NAME: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNameEntry {
    pub name_type: u8,
    pub name: Vec<u8>,
}

/// ServerName extension.
///
/// A server acknowledges SNI with an empty payload, which decodes to an
/// empty list here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerNameExtension {
    pub names: Vec<ServerNameEntry>,
}

impl ServerNameExtension {
    pub fn host_name(name: &str) -> Self {
        ServerNameExtension {
            names: vec![ServerNameEntry {
                name_type: HOST_NAME,
                name: name.as_bytes().to_vec(),
            }],
        }
    }

    /// The first `host_name` entry, if it is valid ASCII.
    pub fn first_host_name(&self) -> Option<&str> {
        self.names
            .iter()
            .find(|n| n.name_type == HOST_NAME)
            .and_then(|n| std::str::from_utf8(&n.name).ok())
            .filter(|n| n.is_ascii())
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerNameExtension> {
        if input.is_empty() {
            return Ok((input, ServerNameExtension::default()));
        }
        let (rest, list_len) = be_u16(input)?;
        let (rest, mut list) = take(list_len)(rest)?;
        if list.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }

        let mut names = Vec::new();
        while !list.is_empty() {
            let (r, name_type) = be_u8(list)?;
            let (r, name_len) = be_u16(r)?;
            let (r, name) = take(name_len)(r)?;
            if name.is_empty() {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    list,
                    nom::error::ErrorKind::LengthValue,
                )));
            }
            names.push(ServerNameEntry {
                name_type,
                name: name.to_vec(),
            });
            list = r;
        }

        Ok((rest, ServerNameExtension { names }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        if self.names.is_empty() {
            return;
        }
        let len: usize = self.names.iter().map(|n| 3 + n.name.len()).sum();
        output.push_u16(len as u16);
        for n in &self.names {
            output.push(n.name_type);
            output.push_u16(n.name.len() as u16);
            output.extend_from_slice(&n.name);
        }
    }
}
