//! Cryptographic provider traits for the key exchange primitives.
//!
//! The handshake never names an algorithm implementation directly. It asks the
//! [`CryptoProvider`] for the primitive registered under a [`NamedGroup`] and
//! drives it through one of two shapes:
//!
//! - **Key agreement** ([`SupportedKeyAgreement`] / [`AgreementKey`]): finite
//!   field and elliptic curve Diffie-Hellman. Both sides publish a public value
//!   and combine the peer's value with their own private key.
//! - **Key encapsulation** ([`SupportedKem`] / [`KemDecapsulator`]): the client
//!   publishes an encapsulation key, the server encapsulates against it and
//!   answers with a ciphertext, the client decapsulates.
//!
//! Hybrid groups have no primitive of their own; they are resolved into their
//! two component groups by the caller.
//!
//! # Thread Safety
//!
//! Factory traits require `Send + Sync + UnwindSafe + RefUnwindSafe` so a
//! provider can sit in a shared `Arc<Config>`. Live key objects only need `Send`.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

use super::secret::Secret;
use crate::types::{GroupKind, NamedGroup};
use crate::Error;

// ============================================================================
// Marker Trait
// ============================================================================

/// Marker trait for types that are safe to use in crypto provider components.
pub trait CryptoSafe: Send + Sync + Debug + UnwindSafe + RefUnwindSafe {}

/// Blanket implementation: any type satisfying the bounds implements [`CryptoSafe`].
impl<T: Send + Sync + Debug + UnwindSafe + RefUnwindSafe> CryptoSafe for T {}

// ============================================================================
// Instance Traits (created by factories)
// ============================================================================

/// Private half of one ephemeral key agreement.
pub trait AgreementKey: Send + Debug {
    fn group(&self) -> NamedGroup;

    /// Public value as it goes on the wire.
    fn public_key(&self) -> &[u8];

    /// Validate `peer_public` and derive the shared secret. Consumes the private key.
    fn agree(self: Box<Self>, peer_public: &[u8]) -> Result<Secret, String>;
}

/// Decapsulation key of one ephemeral KEM exchange.
pub trait KemDecapsulator: Send + Debug {
    fn group(&self) -> NamedGroup;

    /// Encapsulation key as it goes on the wire.
    fn encapsulation_key(&self) -> &[u8];

    /// Recover the shared secret from the peer's ciphertext. Consumes the key.
    fn decapsulate(self: Box<Self>, ciphertext: &[u8]) -> Result<Secret, String>;
}

/// Result of encapsulating against a peer's encapsulation key.
#[derive(Debug)]
pub struct Encapsulated {
    pub shared_secret: Secret,
    /// Raw ciphertext, sent in place of a public key.
    pub ciphertext: Vec<u8>,
}

// ============================================================================
// Factory Traits (used by CryptoProvider)
// ============================================================================

/// Key agreement group support (factory for [`AgreementKey`]).
pub trait SupportedKeyAgreement: CryptoSafe {
    fn group(&self) -> NamedGroup;

    /// Length of the public value on the wire.
    fn public_key_len(&self) -> usize;

    /// Start a new exchange with a fresh ephemeral key.
    fn generate(&self) -> Result<Box<dyn AgreementKey>, String>;
}

/// KEM support (factory for [`KemDecapsulator`]).
pub trait SupportedKem: CryptoSafe {
    fn group(&self) -> NamedGroup;

    fn encapsulation_key_len(&self) -> usize;

    fn ciphertext_len(&self) -> usize;

    /// Generate a fresh key pair.
    fn generate(&self) -> Result<Box<dyn KemDecapsulator>, String>;

    /// Encapsulate against a peer's encapsulation key.
    fn encapsulate(&self, encapsulation_key: &[u8]) -> Result<Encapsulated, String>;
}

// ============================================================================
// Core Provider Struct
// ============================================================================

/// Table of key exchange primitives, looked up by group.
///
/// Holds static trait object references, so cloning it into every
/// connection copies two slices.
#[derive(Debug, Clone)]
pub struct CryptoProvider {
    pub key_agreements: &'static [&'static dyn SupportedKeyAgreement],
    pub kems: &'static [&'static dyn SupportedKem],
}

impl CryptoProvider {
    pub fn key_agreement(&self, group: NamedGroup) -> Option<&'static dyn SupportedKeyAgreement> {
        self.key_agreements
            .iter()
            .find(|k| k.group() == group)
            .copied()
    }

    pub fn kem(&self, group: NamedGroup) -> Option<&'static dyn SupportedKem> {
        self.kems.iter().find(|k| k.group() == group).copied()
    }

    /// Whether every primitive `group` needs is available.
    pub fn supports(&self, group: NamedGroup) -> bool {
        match group.kind() {
            Some(GroupKind::ClassicalDh) | Some(GroupKind::EllipticCurveDh) => {
                self.key_agreement(group).is_some()
            }
            Some(GroupKind::Kem) => self.kem(group).is_some(),
            Some(GroupKind::Hybrid(a, b)) => self.supports(a) && self.supports(b),
            None => false,
        }
    }

    /// Check that the tables are usable: at least one group and no duplicates.
    pub fn validate(&self) -> Result<(), Error> {
        if self.key_agreements.is_empty() && self.kems.is_empty() {
            return Err(Error::Internal("crypto provider has no groups".into()));
        }
        let mut seen: Vec<NamedGroup> = Vec::new();
        let groups = self
            .key_agreements
            .iter()
            .map(|k| k.group())
            .chain(self.kems.iter().map(|k| k.group()));
        for group in groups {
            if seen.contains(&group) {
                return Err(Error::Internal(format!(
                    "crypto provider registers {:?} twice",
                    group
                )));
            }
            seen.push(group);
        }
        Ok(())
    }
}

impl Default for CryptoProvider {
    fn default() -> Self {
        super::rust_crypto::default_provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_provider_supports_all_groups() {
        let provider = CryptoProvider::default();
        provider.validate().unwrap();
        for group in NamedGroup::all() {
            assert!(provider.supports(*group), "{:?}", group);
        }
        assert!(!provider.supports(NamedGroup::Unknown(0x0019)));
    }

    #[test]
    fn hybrid_needs_both_components() {
        static ONLY_KEMS: CryptoProvider = CryptoProvider {
            key_agreements: &[],
            kems: crate::crypto::rust_crypto::ALL_KEMS,
        };
        assert!(ONLY_KEMS.supports(NamedGroup::MlKem768));
        assert!(!ONLY_KEMS.supports(NamedGroup::X25519MlKem768));
    }
}
