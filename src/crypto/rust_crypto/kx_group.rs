//! Elliptic curve key agreement groups.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{ecdh::EphemeralSecret as P256EphemeralSecret, PublicKey as P256PublicKey};
use p384::{ecdh::EphemeralSecret as P384EphemeralSecret, PublicKey as P384PublicKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::crypto::provider::{AgreementKey, SupportedKeyAgreement};
use crate::crypto::secret::{Secret, SecretStage};
use crate::types::NamedGroup;

/// Ephemeral ECDH key. The public value is cached at generation.
enum EcdhKey {
    P256 {
        secret: P256EphemeralSecret,
        public_key: Vec<u8>,
    },
    P384 {
        secret: P384EphemeralSecret,
        public_key: Vec<u8>,
    },
    X25519 {
        secret: StaticSecret,
        public_key: Vec<u8>,
    },
}

impl std::fmt::Debug for EcdhKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKey")
            .field("group", &self.group())
            .field("public_key_len", &self.public_key().len())
            .finish_non_exhaustive()
    }
}

impl EcdhKey {
    fn generate(group: NamedGroup) -> Result<Self, String> {
        match group {
            NamedGroup::Secp256r1 => {
                let secret = P256EphemeralSecret::random(&mut OsRng);
                let public_key = P256PublicKey::from(&secret)
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                Ok(EcdhKey::P256 { secret, public_key })
            }
            NamedGroup::Secp384r1 => {
                let secret = P384EphemeralSecret::random(&mut OsRng);
                let public_key = P384PublicKey::from(&secret)
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                Ok(EcdhKey::P384 { secret, public_key })
            }
            NamedGroup::X25519 => Ok(x25519_key(StaticSecret::random_from_rng(OsRng))),
            _ => Err(format!("Unsupported ECDH group {:?}", group)),
        }
    }
}

fn x25519_key(secret: StaticSecret) -> EcdhKey {
    let public_key = X25519PublicKey::from(&secret).as_bytes().to_vec();
    EcdhKey::X25519 { secret, public_key }
}

/// Fixed X25519 private key, for known-answer tests.
#[cfg(test)]
pub(crate) fn x25519_from_private(private: [u8; 32]) -> Box<dyn AgreementKey> {
    Box::new(x25519_key(StaticSecret::from(private)))
}

/// Uncompressed SEC1 point of the expected size.
fn check_uncompressed(peer: &[u8], len: usize, curve: &str) -> Result<(), String> {
    if peer.len() != len || peer[0] != 0x04 {
        return Err(format!(
            "{} public key must be an uncompressed point of {} bytes",
            curve, len
        ));
    }
    Ok(())
}

impl AgreementKey for EcdhKey {
    fn group(&self) -> NamedGroup {
        match self {
            EcdhKey::P256 { .. } => NamedGroup::Secp256r1,
            EcdhKey::P384 { .. } => NamedGroup::Secp384r1,
            EcdhKey::X25519 { .. } => NamedGroup::X25519,
        }
    }

    fn public_key(&self) -> &[u8] {
        match self {
            EcdhKey::P256 { public_key, .. } => public_key,
            EcdhKey::P384 { public_key, .. } => public_key,
            EcdhKey::X25519 { public_key, .. } => public_key,
        }
    }

    fn agree(self: Box<Self>, peer_public: &[u8]) -> Result<Secret, String> {
        match *self {
            EcdhKey::P256 { secret, .. } => {
                check_uncompressed(peer_public, 65, "P-256")?;
                // from_sec1_bytes rejects points not on the curve and the identity.
                let peer_key = P256PublicKey::from_sec1_bytes(peer_public)
                    .map_err(|_| "Invalid P-256 public key".to_string())?;
                let shared = secret.diffie_hellman(&peer_key);
                Ok(Secret::from_slice(
                    SecretStage::Shared,
                    shared.raw_secret_bytes().as_slice(),
                ))
            }
            EcdhKey::P384 { secret, .. } => {
                check_uncompressed(peer_public, 97, "P-384")?;
                let peer_key = P384PublicKey::from_sec1_bytes(peer_public)
                    .map_err(|_| "Invalid P-384 public key".to_string())?;
                let shared = secret.diffie_hellman(&peer_key);
                Ok(Secret::from_slice(
                    SecretStage::Shared,
                    shared.raw_secret_bytes().as_slice(),
                ))
            }
            EcdhKey::X25519 { secret, .. } => {
                let peer: [u8; 32] = peer_public
                    .try_into()
                    .map_err(|_| "X25519 public key must be 32 bytes".to_string())?;
                let shared = secret.diffie_hellman(&X25519PublicKey::from(peer));
                if !shared.was_contributory() {
                    return Err("X25519 shared secret is all zero".to_string());
                }
                Ok(Secret::from_slice(SecretStage::Shared, shared.as_bytes()))
            }
        }
    }
}

/// P-256 (secp256r1) key exchange group.
#[derive(Debug)]
struct P256;

impl SupportedKeyAgreement for P256 {
    fn group(&self) -> NamedGroup {
        NamedGroup::Secp256r1
    }

    fn public_key_len(&self) -> usize {
        65
    }

    fn generate(&self) -> Result<Box<dyn AgreementKey>, String> {
        Ok(Box::new(EcdhKey::generate(NamedGroup::Secp256r1)?))
    }
}

/// P-384 (secp384r1) key exchange group.
#[derive(Debug)]
struct P384;

impl SupportedKeyAgreement for P384 {
    fn group(&self) -> NamedGroup {
        NamedGroup::Secp384r1
    }

    fn public_key_len(&self) -> usize {
        97
    }

    fn generate(&self) -> Result<Box<dyn AgreementKey>, String> {
        Ok(Box::new(EcdhKey::generate(NamedGroup::Secp384r1)?))
    }
}

/// X25519 key exchange group.
#[derive(Debug)]
struct X25519;

impl SupportedKeyAgreement for X25519 {
    fn group(&self) -> NamedGroup {
        NamedGroup::X25519
    }

    fn public_key_len(&self) -> usize {
        32
    }

    fn generate(&self) -> Result<Box<dyn AgreementKey>, String> {
        Ok(Box::new(EcdhKey::generate(NamedGroup::X25519)?))
    }
}

static KX_GROUP_P256: P256 = P256;
static KX_GROUP_P384: P384 = P384;
static KX_GROUP_X25519: X25519 = X25519;

/// All supported key agreement groups.
pub(crate) static ALL_KEY_AGREEMENTS: &[&dyn SupportedKeyAgreement] = &[
    &KX_GROUP_X25519,
    &KX_GROUP_P256,
    &KX_GROUP_P384,
    &super::dh::KX_GROUP_FFDHE2048,
];
