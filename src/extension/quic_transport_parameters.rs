//! quic_transport_parameters (RFC 9001 Section 8.2).
//!
//! The payload is a sequence of `(varint id, varint length, value)` triples
//! owned by the QUIC layer. It is validated here and otherwise kept as the
//! exact bytes received, so non-minimal varints survive re-encoding.

use crate::buffer::Buf;
use crate::Error;

#[derive(Clone, PartialEq, Eq, Default)]
pub struct QuicTransportParametersExtension {
    raw: Vec<u8>,
}

impl std::fmt::Debug for QuicTransportParametersExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicTransportParametersExtension")
            .field("len", &self.raw.len())
            .finish()
    }
}

impl QuicTransportParametersExtension {
    pub fn from_parameters(params: &[(u64, &[u8])]) -> Result<Self, Error> {
        let mut raw = Vec::new();
        for (id, value) in params {
            write_varint(&mut raw, *id)?;
            write_varint(&mut raw, value.len() as u64)?;
            raw.extend_from_slice(value);
        }
        Ok(QuicTransportParametersExtension { raw })
    }

    /// Wrap an already encoded parameter block after validating it.
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let ext = QuicTransportParametersExtension {
            raw: payload.to_vec(),
        };
        ext.parameters()?;
        Ok(ext)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn parameters(&self) -> Result<Vec<(u64, &[u8])>, Error> {
        let mut input = &self.raw[..];
        let mut params: Vec<(u64, &[u8])> = Vec::new();
        while !input.is_empty() {
            let (rest, id) = read_varint(input)?;
            let (rest, len) = read_varint(rest)?;
            let len = usize::try_from(len)
                .ok()
                .filter(|l| *l <= rest.len())
                .ok_or_else(|| {
                    Error::WireFormat(format!("transport parameter 0x{:x} overruns", id))
                })?;
            if params.iter().any(|(p, _)| *p == id) {
                return Err(Error::WireFormat(format!(
                    "duplicate transport parameter 0x{:x}",
                    id
                )));
            }
            params.push((id, &rest[..len]));
            input = &rest[len..];
        }
        Ok(params)
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.raw);
    }
}

/// Variable length integer (RFC 9000 Section 16).
fn read_varint(input: &[u8]) -> Result<(&[u8], u64), Error> {
    let first = *input
        .first()
        .ok_or_else(|| Error::WireFormat("truncated varint".into()))?;
    let len = 1usize << (first >> 6);
    if input.len() < len {
        return Err(Error::WireFormat("truncated varint".into()));
    }
    let mut value = (first & 0x3f) as u64;
    for b in &input[1..len] {
        value = (value << 8) | *b as u64;
    }
    Ok((&input[len..], value))
}

fn write_varint(output: &mut Vec<u8>, value: u64) -> Result<(), Error> {
    match value {
        0..=0x3f => output.push(value as u8),
        0x40..=0x3fff => output.extend_from_slice(&((value as u16) | 0x4000).to_be_bytes()),
        0x4000..=0x3fff_ffff => {
            output.extend_from_slice(&((value as u32) | 0x8000_0000).to_be_bytes())
        }
        0x4000_0000..=0x3fff_ffff_ffff_ffff => {
            output.extend_from_slice(&(value | 0xc000_0000_0000_0000).to_be_bytes())
        }
        _ => return Err(Error::IllegalParameter(format!("varint {} too large", value))),
    }
    Ok(())
}
