//! Signing and verification collaborator.
//!
//! Keys and certificates are loaded and validated by the host. The handshake
//! only asks for signatures over its own messages and for verification of
//! the peer's, by [`SignatureScheme`].

use std::fmt;

use p256::ecdsa::signature::{Signer, Verifier};
use rand::rngs::OsRng;

use crate::types::SignatureScheme;
use crate::Error;

/// Already validated private keys and trusted peer keys.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Schemes this store can sign with, in preference order.
    fn signing_schemes(&self) -> Vec<SignatureScheme>;

    /// Sign `message` with the local key for `scheme`.
    fn sign(&self, scheme: SignatureScheme, message: &[u8]) -> Result<Vec<u8>, Error>;

    /// Verify a peer's `signature` over `message`.
    fn verify(
        &self,
        scheme: SignatureScheme,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), Error>;
}

enum EcdsaSigningKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
}

enum EcdsaVerifyingKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

/// ECDSA keys over P-256 or P-384, DER encoded signatures.
///
/// Holds an optional local signing key and any number of trusted peer keys.
/// A signature verifies if any trusted key of the matching curve accepts it.
#[derive(Default)]
pub struct EcdsaCredentials {
    signing: Option<EcdsaSigningKey>,
    trusted: Vec<EcdsaVerifyingKey>,
}

impl EcdsaCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh P-256 signing key.
    pub fn generate_p256() -> Self {
        EcdsaCredentials {
            signing: Some(EcdsaSigningKey::P256(p256::ecdsa::SigningKey::random(
                &mut OsRng,
            ))),
            trusted: Vec::new(),
        }
    }

    /// Fresh P-384 signing key.
    pub fn generate_p384() -> Self {
        EcdsaCredentials {
            signing: Some(EcdsaSigningKey::P384(p384::ecdsa::SigningKey::random(
                &mut OsRng,
            ))),
            trusted: Vec::new(),
        }
    }

    /// SEC1 uncompressed public key of the signing key.
    pub fn public_key(&self) -> Option<Vec<u8>> {
        match self.signing.as_ref()? {
            EcdsaSigningKey::P256(k) => Some(
                k.verifying_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec(),
            ),
            EcdsaSigningKey::P384(k) => Some(
                k.verifying_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec(),
            ),
        }
    }

    /// Trust a peer key given as a SEC1 point. The curve follows from the length.
    pub fn trust(mut self, sec1: &[u8]) -> Result<Self, Error> {
        let key = match sec1.len() {
            65 => EcdsaVerifyingKey::P256(
                p256::ecdsa::VerifyingKey::from_sec1_bytes(sec1)
                    .map_err(|_| Error::IllegalParameter("invalid P-256 public key".into()))?,
            ),
            97 => EcdsaVerifyingKey::P384(
                p384::ecdsa::VerifyingKey::from_sec1_bytes(sec1)
                    .map_err(|_| Error::IllegalParameter("invalid P-384 public key".into()))?,
            ),
            n => {
                return Err(Error::IllegalParameter(format!(
                    "unsupported public key length {}",
                    n
                )))
            }
        };
        self.trusted.push(key);
        Ok(self)
    }
}

impl CredentialStore for EcdsaCredentials {
    fn signing_schemes(&self) -> Vec<SignatureScheme> {
        match &self.signing {
            Some(EcdsaSigningKey::P256(_)) => vec![SignatureScheme::ECDSA_SECP256R1_SHA256],
            Some(EcdsaSigningKey::P384(_)) => vec![SignatureScheme::ECDSA_SECP384R1_SHA384],
            None => Vec::new(),
        }
    }

    fn sign(&self, scheme: SignatureScheme, message: &[u8]) -> Result<Vec<u8>, Error> {
        match (&self.signing, scheme) {
            (Some(EcdsaSigningKey::P256(key)), SignatureScheme::ECDSA_SECP256R1_SHA256) => {
                let sig: p256::ecdsa::Signature = key
                    .try_sign(message)
                    .map_err(|e| Error::Crypto(format!("ECDSA signing failed: {}", e)))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            (Some(EcdsaSigningKey::P384(key)), SignatureScheme::ECDSA_SECP384R1_SHA384) => {
                let sig: p384::ecdsa::Signature = key
                    .try_sign(message)
                    .map_err(|e| Error::Crypto(format!("ECDSA signing failed: {}", e)))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            _ => Err(Error::NegotiationFailed(format!(
                "no signing key for {:?}",
                scheme
            ))),
        }
    }

    fn verify(
        &self,
        scheme: SignatureScheme,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        let accepted = match scheme {
            SignatureScheme::ECDSA_SECP256R1_SHA256 => {
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| Error::WireFormat("malformed ECDSA signature".into()))?;
                self.trusted.iter().any(|k| match k {
                    EcdsaVerifyingKey::P256(k) => k.verify(message, &sig).is_ok(),
                    _ => false,
                })
            }
            SignatureScheme::ECDSA_SECP384R1_SHA384 => {
                let sig = p384::ecdsa::Signature::from_der(signature)
                    .map_err(|_| Error::WireFormat("malformed ECDSA signature".into()))?;
                self.trusted.iter().any(|k| match k {
                    EcdsaVerifyingKey::P384(k) => k.verify(message, &sig).is_ok(),
                    _ => false,
                })
            }
            _ => {
                return Err(Error::IllegalParameter(format!(
                    "unsupported signature scheme {:?}",
                    scheme
                )))
            }
        };
        if !accepted {
            return Err(Error::Crypto(format!("{:?} signature rejected", scheme)));
        }
        Ok(())
    }
}

impl fmt::Debug for EcdsaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signing = match &self.signing {
            Some(EcdsaSigningKey::P256(_)) => Some("P-256"),
            Some(EcdsaSigningKey::P384(_)) => Some("P-384"),
            None => None,
        };
        f.debug_struct("EcdsaCredentials")
            .field("signing", &signing)
            .field("trusted", &self.trusted.len())
            .finish()
    }
}
