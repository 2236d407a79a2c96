//! Certificate status request extensions, RFC 6066 Section 8 and RFC 6961.
//!
//! Servers acknowledge both with an empty payload.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::buffer::Buf;
use crate::types::opaque_u16;

/// `ocsp` status type.
pub const OCSP: u8 = 1;
/// `ocsp_multi` status type (v2 only).
pub const OCSP_MULTI: u8 = 2;

/// OCSPStatusRequest body shared by v1 and v2.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OcspStatusRequest {
    /// Encoded ResponderID list, kept opaque.
    pub responder_id_list: Vec<u8>,
    /// Encoded request extensions, kept opaque.
    pub request_extensions: Vec<u8>,
}

impl OcspStatusRequest {
    fn parse(input: &[u8]) -> IResult<&[u8], OcspStatusRequest> {
        let (input, responder_id_list) = opaque_u16(input)?;
        let (input, request_extensions) = opaque_u16(input)?;
        Ok((
            input,
            OcspStatusRequest {
                responder_id_list: responder_id_list.to_vec(),
                request_extensions: request_extensions.to_vec(),
            },
        ))
    }

    fn encoded_len(&self) -> usize {
        4 + self.responder_id_list.len() + self.request_extensions.len()
    }

    fn serialize(&self, output: &mut Buf) {
        output.push_u16(self.responder_id_list.len() as u16);
        output.extend_from_slice(&self.responder_id_list);
        output.push_u16(self.request_extensions.len() as u16);
        output.extend_from_slice(&self.request_extensions);
    }
}

/// status_request (v1). `None` is the server's empty acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusRequestExtension {
    pub request: Option<(u8, OcspStatusRequest)>,
}

impl StatusRequestExtension {
    pub fn ocsp() -> Self {
        StatusRequestExtension {
            request: Some((OCSP, OcspStatusRequest::default())),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], StatusRequestExtension> {
        if input.is_empty() {
            return Ok((input, StatusRequestExtension::default()));
        }
        let (input, status_type) = be_u8(input)?;
        if status_type != OCSP {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Switch,
            )));
        }
        let (input, req) = OcspStatusRequest::parse(input)?;
        Ok((
            input,
            StatusRequestExtension {
                request: Some((status_type, req)),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        if let Some((status_type, req)) = &self.request {
            output.push(*status_type);
            req.serialize(output);
        }
    }
}

/// status_request_v2. `None` is the server's empty acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusRequestV2Extension {
    pub requests: Option<Vec<(u8, OcspStatusRequest)>>,
}

impl StatusRequestV2Extension {
    pub fn ocsp_multi() -> Self {
        StatusRequestV2Extension {
            requests: Some(vec![
                (OCSP_MULTI, OcspStatusRequest::default()),
                (OCSP, OcspStatusRequest::default()),
            ]),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], StatusRequestV2Extension> {
        if input.is_empty() {
            return Ok((input, StatusRequestV2Extension::default()));
        }
        let (rest, list_len) = be_u16(input)?;
        let (rest, mut list) = take(list_len)(rest)?;

        let mut requests = Vec::new();
        while !list.is_empty() {
            let (r, status_type) = be_u8(list)?;
            let (r, body) = opaque_u16(r)?;
            if status_type != OCSP && status_type != OCSP_MULTI {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    list,
                    nom::error::ErrorKind::Switch,
                )));
            }
            let (_, req) = nom::combinator::all_consuming(OcspStatusRequest::parse)(body)?;
            requests.push((status_type, req));
            list = r;
        }

        Ok((
            rest,
            StatusRequestV2Extension {
                requests: Some(requests),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        let Some(requests) = &self.requests else {
            return;
        };
        let len: usize = requests.iter().map(|(_, r)| 3 + r.encoded_len()).sum();
        output.push_u16(len as u16);
        for (status_type, req) in requests {
            output.push(*status_type);
            output.push_u16(req.encoded_len() as u16);
            req.serialize(output);
        }
    }
}
