use std::io;

use thiserror::Error;

use crate::alert::AlertDescription;
use crate::extension::ExtensionType;

/// Failure raised anywhere inside the handshake layer.
///
/// Every variant is fatal to the connection. The dispatch step in
/// [`HandshakeContext`](crate::HandshakeContext) is the single place that turns
/// one of these into an alert and a [`FatalError`].
#[derive(Debug, Error)]
pub enum Error {
    /// Length mismatch, truncated or otherwise malformed bytes.
    #[error("malformed input: {0}")]
    WireFormat(String),

    /// Message or operation not valid for the current context or role.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Key generation, agreement, encapsulation or derivation failed.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Message arrived in the wrong handshake phase.
    #[error("protocol state: {0}")]
    ProtocolState(String),

    /// Record, message or extension exceeds its maximum size.
    #[error("resource limit: {0}")]
    ResourceLimit(String),

    /// A mandatory extension was absent.
    #[error("missing extension {0:?}")]
    MissingExtension(ExtensionType),

    /// Peer sent an extension it is not allowed to send here.
    #[error("unsupported extension {0:?}")]
    UnsupportedExtension(ExtensionType),

    /// Well-formed value that is not acceptable.
    #[error("illegal parameter: {0}")]
    IllegalParameter(String),

    /// No common version, cipher suite, group or protocol.
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Internal inconsistency, such as a key schedule stage that should exist but doesn't.
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid configuration, rejected by [`ConfigBuilder::build`](crate::ConfigBuilder::build).
    #[error("config: {0}")]
    Config(String),

    /// Transport failure.
    #[error("transport: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The alert sent to the peer when this error terminates the connection.
    pub fn alert(&self) -> AlertDescription {
        match self {
            Error::WireFormat(_) => AlertDescription::DecodeError,
            Error::UnsupportedOperation(_) => AlertDescription::UnexpectedMessage,
            Error::ProtocolState(_) => AlertDescription::UnexpectedMessage,
            Error::Crypto(_) => AlertDescription::HandshakeFailure,
            Error::NegotiationFailed(_) => AlertDescription::HandshakeFailure,
            Error::ResourceLimit(_) => AlertDescription::RecordOverflow,
            Error::IllegalParameter(_) => AlertDescription::IllegalParameter,
            Error::MissingExtension(_) => AlertDescription::MissingExtension,
            Error::UnsupportedExtension(_) => AlertDescription::UnsupportedExtension,
            Error::Internal(_) | Error::Config(_) | Error::Io(_) => AlertDescription::InternalError,
        }
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::WireFormat("truncated input".to_string()),
            nom::Err::Error(e) | nom::Err::Failure(e) => Error::WireFormat(format!(
                "parse error {:?} with {} bytes remaining",
                e.code,
                e.input.len()
            )),
        }
    }
}

/// The failure signal callers observe: the alert that terminated the
/// connection together with its cause.
///
/// No secret material is ever part of the cause.
#[derive(Debug, Error)]
#[error("fatal alert {alert:?}: {cause}")]
pub struct FatalError {
    pub alert: AlertDescription,
    #[source]
    pub cause: Error,
}

impl FatalError {
    pub fn new(alert: AlertDescription, cause: Error) -> Self {
        FatalError { alert, cause }
    }

    /// A fatal failure raised by the peer's own alert.
    pub fn from_peer(alert: AlertDescription) -> Self {
        FatalError {
            alert,
            cause: Error::ProtocolState(format!("peer sent fatal alert {:?}", alert)),
        }
    }
}

impl From<Error> for FatalError {
    fn from(cause: Error) -> Self {
        FatalError {
            alert: cause.alert(),
            cause,
        }
    }
}
