use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::buffer::Buf;
use crate::extension::ExtensionList;
use crate::types::{opaque_u8, CipherSuite, ProtocolVersion, Random};
use crate::Error;

/// Last eight bytes of a TLS 1.2 ServerHello random sent by a server that
/// also supports TLS 1.3 (RFC 8446 Section 4.1.3).
pub const DOWNGRADE_TLS12: [u8; 8] = *b"DOWNGRD\x01";

const MAX_SESSION_ID: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub legacy_version: ProtocolVersion,
    pub random: Random,
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<u8>,
    pub extensions: ExtensionList,
}

impl ClientHello {
    fn parse_fixed(
        input: &[u8],
    ) -> IResult<&[u8], (ProtocolVersion, Random, &[u8], Vec<CipherSuite>, &[u8])> {
        let (input, legacy_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = opaque_u8(input)?;
        let (input, suites_len) = be_u16(input)?;
        if suites_len == 0 || suites_len % 2 != 0 {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (input, mut suites_bytes) = take(suites_len)(input)?;
        let mut cipher_suites = Vec::with_capacity(suites_len as usize / 2);
        while !suites_bytes.is_empty() {
            let (rest, suite) = CipherSuite::parse(suites_bytes)?;
            cipher_suites.push(suite);
            suites_bytes = rest;
        }
        let (input, compression_len) = be_u8(input)?;
        let (input, compression_methods) = take(compression_len)(input)?;
        Ok((
            input,
            (
                legacy_version,
                random,
                session_id,
                cipher_suites,
                compression_methods,
            ),
        ))
    }

    /// Decode a ClientHello body. The body must be consumed exactly.
    pub fn decode(body: &[u8]) -> Result<ClientHello, Error> {
        let (rest, (legacy_version, random, session_id, cipher_suites, compression_methods)) =
            Self::parse_fixed(body)?;
        if session_id.len() > MAX_SESSION_ID {
            return Err(Error::WireFormat(format!(
                "session id of {} bytes",
                session_id.len()
            )));
        }
        if compression_methods.is_empty() {
            return Err(Error::WireFormat("no compression methods".into()));
        }
        let (rest, extensions) = ExtensionList::decode(rest)?;
        if !rest.is_empty() {
            return Err(Error::WireFormat(format!(
                "{} bytes after ClientHello extensions",
                rest.len()
            )));
        }
        Ok(ClientHello {
            legacy_version,
            random,
            session_id: session_id.to_vec(),
            cipher_suites,
            compression_methods: compression_methods.to_vec(),
            extensions,
        })
    }

    pub fn serialize(&self, output: &mut Buf) -> Result<(), Error> {
        output.push_u16(self.legacy_version.as_u16());
        output.extend_from_slice(&self.random.0);
        output.push(self.session_id.len() as u8);
        output.extend_from_slice(&self.session_id);
        output.push_u16((self.cipher_suites.len() * 2) as u16);
        for suite in &self.cipher_suites {
            output.push_u16(suite.as_u16());
        }
        output.push(self.compression_methods.len() as u8);
        output.extend_from_slice(&self.compression_methods);
        self.extensions.encode(output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub legacy_version: ProtocolVersion,
    pub random: Random,
    pub session_id: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub compression_method: u8,
    pub extensions: ExtensionList,
}

impl ServerHello {
    fn parse_fixed(input: &[u8]) -> IResult<&[u8], (ProtocolVersion, Random, &[u8], CipherSuite, u8)> {
        let (input, legacy_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = opaque_u8(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, compression_method) = be_u8(input)?;
        Ok((
            input,
            (
                legacy_version,
                random,
                session_id,
                cipher_suite,
                compression_method,
            ),
        ))
    }

    pub fn decode(body: &[u8]) -> Result<ServerHello, Error> {
        let (rest, (legacy_version, random, session_id, cipher_suite, compression_method)) =
            Self::parse_fixed(body)?;
        if session_id.len() > MAX_SESSION_ID {
            return Err(Error::WireFormat(format!(
                "session id of {} bytes",
                session_id.len()
            )));
        }
        let (rest, extensions) = ExtensionList::decode(rest)?;
        if !rest.is_empty() {
            return Err(Error::WireFormat(format!(
                "{} bytes after ServerHello extensions",
                rest.len()
            )));
        }
        Ok(ServerHello {
            legacy_version,
            random,
            session_id: session_id.to_vec(),
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    pub fn serialize(&self, output: &mut Buf) -> Result<(), Error> {
        output.push_u16(self.legacy_version.as_u16());
        output.extend_from_slice(&self.random.0);
        output.push(self.session_id.len() as u8);
        output.extend_from_slice(&self.session_id);
        output.push_u16(self.cipher_suite.as_u16());
        output.push(self.compression_method);
        self.extensions.encode(output)
    }

    /// Whether the random carries the TLS 1.2 downgrade sentinel.
    pub fn has_downgrade_sentinel(&self) -> bool {
        self.random.0[24..] == DOWNGRADE_TLS12
    }
}
