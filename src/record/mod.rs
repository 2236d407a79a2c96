//! Handshake record fragmentation.
//!
//! Record protection is not done here. Outbound fragments carry the epoch
//! whose keys the record protection collaborator applies, and inbound
//! records arrive already decrypted.

use std::fmt;

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::buffer::Buf;
use crate::Error;

mod inbound;
mod outbound;
pub mod quic;

pub use inbound::InboundRecord;
pub use outbound::{CloseState, Fragment, OutboundRecord};
pub(crate) use outbound::FragmentQueue;

/// Largest plaintext fragment (RFC 8446 Section 5.1).
pub const MAX_FRAGMENT_LEN: usize = 1 << 14;

/// Allowance for record protection on top of the plaintext.
pub const MAX_EXPANSION: usize = 2048;

pub const RECORD_HEADER_LEN: usize = 5;

/// legacy_record_version on everything we write.
const RECORD_VERSION: u16 = 0x0303;

/// Largest record body we accept, given a negotiated max fragment length.
pub fn max_record_len(max_fragment_length: Option<usize>) -> usize {
    max_fragment_length.unwrap_or(MAX_FRAGMENT_LEN).min(MAX_FRAGMENT_LEN) + MAX_EXPANSION
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }
}

/// `content_type(1) legacy_record_version(2) length(2)`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn parse(input: &[u8]) -> IResult<&[u8], RecordHeader> {
        let (input, content_type) = be_u8(input)?;
        let (input, version) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        Ok((
            input,
            RecordHeader {
                content_type: ContentType::from_u8(content_type),
                version,
                length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.content_type.as_u8());
        output.push_u16(self.version);
        output.push_u16(self.length);
    }
}

impl fmt::Debug for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordHeader({:?}, 0x{:04x}, {})",
            self.content_type, self.version, self.length
        )
    }
}

/// Frame `body` as one record. The body must fit a u16 length.
pub fn encode_record(content_type: ContentType, body: &[u8]) -> Result<Vec<u8>, Error> {
    let length = u16::try_from(body.len())
        .map_err(|_| Error::ResourceLimit(format!("record body of {} bytes", body.len())))?;
    let mut out = Buf::with_capacity(RECORD_HEADER_LEN + body.len());
    RecordHeader {
        content_type,
        version: RECORD_VERSION,
        length,
    }
    .serialize(&mut out);
    out.extend_from_slice(body);
    Ok(out.into_vec())
}
