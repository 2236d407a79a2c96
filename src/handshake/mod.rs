//! Handshake messages and the per-connection handshake state machine.
//!
//! Every handshake message is framed as
//!
//! ```text
//! u8  msg_type
//! u24 length
//! length bytes body
//! ```
//!
//! The framed bytes, header included, are what enters the transcript hash.

mod client;
mod context;
mod hello;
mod messages;
mod post;
mod server;

pub use context::{ExportedKeys, HandshakeContext, HandshakeState, Outgoing};
pub use hello::{ClientHello, ServerHello, DOWNGRADE_TLS12};
pub use messages::{
    ClientKeyExchange, EncryptedExtensions, Finished, KeyExchangeParams, KeyUpdate,
    NewSessionTicket, ServerKeyExchange,
};
pub use post::PostHandshakeContext;

use nom::number::complete::{be_u24, be_u8};
use nom::IResult;
use subtle::ConstantTimeEq;

use crate::buffer::Buf;
use crate::Error;

/// Largest handshake message body accepted from a peer.
pub const MAX_HANDSHAKE_MESSAGE: usize = 1 << 16;

/// Size of the `msg_type` + `length` header.
pub const HEADER_LEN: usize = 4;

/// Which end of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeType {
    ClientHello,
    ServerHello,
    NewSessionTicket,
    EncryptedExtensions,
    Certificate,
    ServerKeyExchange,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    KeyUpdate,
    Unknown(u8),
}

impl HandshakeType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            4 => HandshakeType::NewSessionTicket,
            8 => HandshakeType::EncryptedExtensions,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            24 => HandshakeType::KeyUpdate,
            _ => HandshakeType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::NewSessionTicket => 4,
            HandshakeType::EncryptedExtensions => 8,
            HandshakeType::Certificate => 11,
            HandshakeType::ServerKeyExchange => 12,
            HandshakeType::ServerHelloDone => 14,
            HandshakeType::CertificateVerify => 15,
            HandshakeType::ClientKeyExchange => 16,
            HandshakeType::Finished => 20,
            HandshakeType::KeyUpdate => 24,
            HandshakeType::Unknown(value) => *value,
        }
    }

    fn parse(input: &[u8]) -> IResult<&[u8], HandshakeType> {
        let (input, value) = be_u8(input)?;
        Ok((input, HandshakeType::from_u8(value)))
    }
}

/// Frame `body` as one handshake message.
pub fn frame(msg_type: HandshakeType, body: &[u8]) -> Result<Vec<u8>, Error> {
    if body.len() >= 1 << 24 {
        return Err(Error::ResourceLimit(format!(
            "{:?} body of {} bytes",
            msg_type,
            body.len()
        )));
    }
    let mut out = Buf::with_capacity(HEADER_LEN + body.len());
    out.push(msg_type.as_u8());
    out.push_u24(body.len() as u32);
    out.extend_from_slice(body);
    Ok(out.into_vec())
}

/// Reassembles handshake messages from the payloads of consecutive records.
///
/// A message may span records and a record may carry several messages.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: Vec<u8>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the payload of one handshake record.
    pub fn push(&mut self, fragment: &[u8]) {
        self.buffer.extend_from_slice(fragment);
    }

    /// True when no partial message is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Next complete message as `(type, framed bytes)`.
    ///
    /// A declared body length above [`MAX_HANDSHAKE_MESSAGE`] fails before
    /// the body arrives.
    pub fn next_message(&mut self) -> Result<Option<(HandshakeType, Vec<u8>)>, Error> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }
        let (_, (msg_type, length)) = parse_header(&self.buffer)?;
        let length = length as usize;
        if length > MAX_HANDSHAKE_MESSAGE {
            return Err(Error::ResourceLimit(format!(
                "{:?} declares {} bytes",
                msg_type, length
            )));
        }
        let total = HEADER_LEN + length;
        if self.buffer.len() < total {
            return Ok(None);
        }
        let rest = self.buffer.split_off(total);
        let message = std::mem::replace(&mut self.buffer, rest);
        trace!("Reassembled {:?} ({} bytes)", msg_type, length);
        Ok(Some((msg_type, message)))
    }
}

/// Constant time comparison of a peer's Finished `verify_data`.
pub(crate) fn check_verify_data(expected: &[u8], received: &[u8]) -> Result<(), Error> {
    if !bool::from(expected.ct_eq(received)) {
        return Err(Error::Crypto("Finished verify_data mismatch".into()));
    }
    Ok(())
}

fn parse_header(input: &[u8]) -> IResult<&[u8], (HandshakeType, u32)> {
    let (input, msg_type) = HandshakeType::parse(input)?;
    let (input, length) = be_u24(input)?;
    Ok((input, (msg_type, length)))
}
