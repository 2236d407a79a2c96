//! Key exchange over a negotiated group.
//!
//! Three shapes, picked by [`GroupKind`]:
//!
//! - **Key agreement** (DH/ECDH): both sides publish a public value. The
//!   client's [`Possession`] is its private key.
//! - **KEM**: the client publishes an encapsulation key; the server
//!   encapsulates and answers with a ciphertext. The ciphertext is never a
//!   public key and is only ever handed to the decapsulator.
//! - **Hybrid**: two component exchanges run independently. Shares are the
//!   concatenation of the component shares in the group's declared order, and
//!   the two shared secrets stay separate all the way into HKDF-Extract.
//!
//! Any failure of the underlying primitive surfaces as [`Error::Crypto`];
//! share length mismatches as [`Error::WireFormat`].

use std::fmt;

use super::provider::{AgreementKey, CryptoProvider, KemDecapsulator};
use super::secret::Secret;
use crate::types::{GroupKind, NamedGroup};
use crate::Error;

/// One negotiable key exchange group together with its algorithmic shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyExchangeScheme {
    group: NamedGroup,
    kind: GroupKind,
}

/// Local secret material for one scheme.
///
/// Owned by the handshake for the lifetime of one exchange. Dropping it
/// zeroizes the private keys.
pub enum Possession {
    Agreement(Box<dyn AgreementKey>),
    Kem {
        key: Box<dyn KemDecapsulator>,
        ciphertext_len: usize,
    },
    Hybrid {
        group: NamedGroup,
        first: Box<Possession>,
        second: Box<Possession>,
    },
}

/// Peer-supplied public material, validated for length but not decoded.
///
/// A KEM share is kept as raw bytes: the server's ciphertext is not a
/// public key and nothing ever parses it as one.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    PublicKey {
        group: NamedGroup,
        bytes: Vec<u8>,
    },
    KemShare {
        group: NamedGroup,
        bytes: Vec<u8>,
    },
    Hybrid {
        group: NamedGroup,
        first: Box<Credentials>,
        second: Box<Credentials>,
    },
}

/// Shared secrets of one exchange, one per component, in declared order.
#[derive(Debug, Default)]
pub struct SharedSecrets(Vec<Secret>);

/// Which side produced a share. KEM shares differ in size per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOrigin {
    Client,
    Server,
}

impl KeyExchangeScheme {
    pub fn new(group: NamedGroup) -> Result<Self, Error> {
        let kind = group
            .kind()
            .ok_or_else(|| Error::NegotiationFailed(format!("unknown group {:?}", group)))?;
        Ok(KeyExchangeScheme { group, kind })
    }

    pub fn group(&self) -> NamedGroup {
        self.group
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    fn components(&self) -> Result<(KeyExchangeScheme, KeyExchangeScheme), Error> {
        match self.kind {
            GroupKind::Hybrid(a, b) => Ok((KeyExchangeScheme::new(a)?, KeyExchangeScheme::new(b)?)),
            _ => Err(Error::Internal(format!("{:?} is not hybrid", self.group))),
        }
    }

    /// Exact size of a share sent by `origin`.
    pub fn share_len(&self, provider: &CryptoProvider, origin: ShareOrigin) -> Result<usize, Error> {
        match self.kind {
            GroupKind::ClassicalDh | GroupKind::EllipticCurveDh => provider
                .key_agreement(self.group)
                .map(|k| k.public_key_len())
                .ok_or_else(|| self.unsupported()),
            GroupKind::Kem => {
                let kem = provider.kem(self.group).ok_or_else(|| self.unsupported())?;
                Ok(match origin {
                    ShareOrigin::Client => kem.encapsulation_key_len(),
                    ShareOrigin::Server => kem.ciphertext_len(),
                })
            }
            GroupKind::Hybrid(..) => {
                let (a, b) = self.components()?;
                Ok(a.share_len(provider, origin)? + b.share_len(provider, origin)?)
            }
        }
    }

    fn unsupported(&self) -> Error {
        Error::NegotiationFailed(format!("no primitive for {:?}", self.group))
    }

    /// Generate the client's possession.
    pub fn generate(&self, provider: &CryptoProvider) -> Result<Possession, Error> {
        match self.kind {
            GroupKind::ClassicalDh | GroupKind::EllipticCurveDh => {
                let ka = provider
                    .key_agreement(self.group)
                    .ok_or_else(|| self.unsupported())?;
                let key = ka.generate().map_err(Error::Crypto)?;
                Ok(Possession::Agreement(key))
            }
            GroupKind::Kem => {
                let kem = provider.kem(self.group).ok_or_else(|| self.unsupported())?;
                let key = kem.generate().map_err(Error::Crypto)?;
                Ok(Possession::Kem {
                    key,
                    ciphertext_len: kem.ciphertext_len(),
                })
            }
            GroupKind::Hybrid(..) => {
                let (a, b) = self.components()?;
                Ok(Possession::Hybrid {
                    group: self.group,
                    first: Box::new(a.generate(provider)?),
                    second: Box::new(b.generate(provider)?),
                })
            }
        }
    }

    /// Check the size of a share received from `origin` and split it into components.
    pub fn credentials(
        &self,
        provider: &CryptoProvider,
        share: &[u8],
        origin: ShareOrigin,
    ) -> Result<Credentials, Error> {
        let expected = self.share_len(provider, origin)?;
        if share.len() != expected {
            return Err(Error::WireFormat(format!(
                "{:?} key share of {} bytes, expected {}",
                self.group,
                share.len(),
                expected
            )));
        }
        Ok(match self.kind {
            GroupKind::ClassicalDh | GroupKind::EllipticCurveDh => Credentials::PublicKey {
                group: self.group,
                bytes: share.to_vec(),
            },
            GroupKind::Kem => Credentials::KemShare {
                group: self.group,
                bytes: share.to_vec(),
            },
            GroupKind::Hybrid(..) => {
                let (a, b) = self.components()?;
                let split = a.share_len(provider, origin)?;
                let (left, right) = share.split_at(split);
                Credentials::Hybrid {
                    group: self.group,
                    first: Box::new(a.credentials(provider, left, origin)?),
                    second: Box::new(b.credentials(provider, right, origin)?),
                }
            }
        })
    }

    /// Server side: answer the client's credentials.
    ///
    /// Returns the server share and the shared secrets. For key agreement the
    /// server generates its own key and agrees immediately; for a KEM it
    /// encapsulates against the client's key.
    pub fn respond(
        &self,
        provider: &CryptoProvider,
        client: &Credentials,
    ) -> Result<(Vec<u8>, SharedSecrets), Error> {
        match (self.kind, client) {
            (GroupKind::ClassicalDh | GroupKind::EllipticCurveDh, Credentials::PublicKey { bytes, .. }) => {
                let ka = provider
                    .key_agreement(self.group)
                    .ok_or_else(|| self.unsupported())?;
                let key = ka.generate().map_err(Error::Crypto)?;
                let share = key.public_key().to_vec();
                let secret = key.agree(bytes).map_err(Error::Crypto)?;
                Ok((share, SharedSecrets(vec![secret])))
            }
            (GroupKind::Kem, Credentials::KemShare { bytes, .. }) => {
                let kem = provider.kem(self.group).ok_or_else(|| self.unsupported())?;
                let enc = kem.encapsulate(bytes).map_err(Error::Crypto)?;
                Ok((enc.ciphertext, SharedSecrets(vec![enc.shared_secret])))
            }
            (GroupKind::Hybrid(..), Credentials::Hybrid { first, second, .. }) => {
                let (a, b) = self.components()?;
                let (mut share, mut secrets) = a.respond(provider, first)?;
                let (share_b, secrets_b) = b.respond(provider, second)?;
                share.extend_from_slice(&share_b);
                secrets.append(secrets_b);
                Ok((share, secrets))
            }
            _ => Err(Error::Internal(format!(
                "credentials {:?} do not match {:?}",
                client.group(),
                self.group
            ))),
        }
    }
}

impl Possession {
    pub fn group(&self) -> NamedGroup {
        match self {
            Possession::Agreement(key) => key.group(),
            Possession::Kem { key, .. } => key.group(),
            Possession::Hybrid { group, .. } => *group,
        }
    }

    /// The share this possession publishes: public value or encapsulation key.
    pub fn key_share(&self) -> Vec<u8> {
        match self {
            Possession::Agreement(key) => key.public_key().to_vec(),
            Possession::Kem { key, .. } => key.encapsulation_key().to_vec(),
            Possession::Hybrid { first, second, .. } => {
                let mut share = first.key_share();
                share.extend_from_slice(&second.key_share());
                share
            }
        }
    }

    /// Client side: combine with the server's credentials. Consumes the private keys.
    pub fn complete(self, server: &Credentials) -> Result<SharedSecrets, Error> {
        match (self, server) {
            (Possession::Agreement(key), Credentials::PublicKey { bytes, .. }) => {
                let secret = key.agree(bytes).map_err(Error::Crypto)?;
                Ok(SharedSecrets(vec![secret]))
            }
            (Possession::Kem { key, ciphertext_len }, Credentials::KemShare { bytes, .. }) => {
                if bytes.len() != ciphertext_len {
                    return Err(Error::WireFormat(format!(
                        "KEM ciphertext of {} bytes, expected {}",
                        bytes.len(),
                        ciphertext_len
                    )));
                }
                let secret = key.decapsulate(bytes).map_err(Error::Crypto)?;
                Ok(SharedSecrets(vec![secret]))
            }
            (
                Possession::Hybrid { first, second, .. },
                Credentials::Hybrid {
                    first: c_first,
                    second: c_second,
                    ..
                },
            ) => {
                let mut secrets = first.complete(c_first)?;
                secrets.append(second.complete(c_second)?);
                Ok(secrets)
            }
            (possession, _) => Err(Error::Internal(format!(
                "credentials {:?} do not match possession {:?}",
                server.group(),
                possession.group()
            ))),
        }
    }

    /// Split a server share sized for this possession into credentials.
    ///
    /// Used by the client, which knows the exact shape it offered.
    pub fn server_credentials(&self, share: &[u8]) -> Result<Credentials, Error> {
        let expected = self.server_share_len();
        if share.len() != expected {
            return Err(Error::WireFormat(format!(
                "{:?} server share of {} bytes, expected {}",
                self.group(),
                share.len(),
                expected
            )));
        }
        Ok(match self {
            Possession::Agreement(key) => Credentials::PublicKey {
                group: key.group(),
                bytes: share.to_vec(),
            },
            Possession::Kem { key, .. } => Credentials::KemShare {
                group: key.group(),
                bytes: share.to_vec(),
            },
            Possession::Hybrid {
                group,
                first,
                second,
            } => {
                let (left, right) = share.split_at(first.server_share_len());
                Credentials::Hybrid {
                    group: *group,
                    first: Box::new(first.server_credentials(left)?),
                    second: Box::new(second.server_credentials(right)?),
                }
            }
        })
    }

    fn server_share_len(&self) -> usize {
        match self {
            Possession::Agreement(key) => key.public_key().len(),
            Possession::Kem { ciphertext_len, .. } => *ciphertext_len,
            Possession::Hybrid { first, second, .. } => {
                first.server_share_len() + second.server_share_len()
            }
        }
    }
}

impl fmt::Debug for Possession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Possession::Agreement(key) => f.debug_tuple("Possession::Agreement").field(key).finish(),
            Possession::Kem { key, .. } => f.debug_tuple("Possession::Kem").field(key).finish(),
            Possession::Hybrid {
                group,
                first,
                second,
            } => f
                .debug_struct("Possession::Hybrid")
                .field("group", group)
                .field("first", first)
                .field("second", second)
                .finish(),
        }
    }
}

impl Credentials {
    pub fn group(&self) -> NamedGroup {
        match self {
            Credentials::PublicKey { group, .. }
            | Credentials::KemShare { group, .. }
            | Credentials::Hybrid { group, .. } => *group,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::PublicKey { group, bytes } => f
                .debug_struct("Credentials::PublicKey")
                .field("group", group)
                .field("len", &bytes.len())
                .finish(),
            Credentials::KemShare { group, bytes } => f
                .debug_struct("Credentials::KemShare")
                .field("group", group)
                .field("len", &bytes.len())
                .finish(),
            Credentials::Hybrid {
                group,
                first,
                second,
            } => f
                .debug_struct("Credentials::Hybrid")
                .field("group", group)
                .field("first", first)
                .field("second", second)
                .finish(),
        }
    }
}

impl SharedSecrets {
    pub fn new(secrets: Vec<Secret>) -> Self {
        SharedSecrets(secrets)
    }

    pub fn single(secret: Secret) -> Self {
        SharedSecrets(vec![secret])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The secrets as IKM segments, in order.
    pub fn segments(&self) -> Vec<&[u8]> {
        self.0.iter().map(|s| s.as_bytes()).collect()
    }

    fn append(&mut self, mut other: SharedSecrets) {
        self.0.append(&mut other.0);
    }

    /// Take the only secret of a non-hybrid exchange.
    pub fn into_single(mut self) -> Result<Secret, Error> {
        if self.0.len() != 1 {
            return Err(Error::Internal(format!(
                "expected one shared secret, have {}",
                self.0.len()
            )));
        }
        self.0
            .pop()
            .ok_or_else(|| Error::Internal("no shared secret".into()))
    }

    pub fn wipe(&mut self) {
        for s in &mut self.0 {
            s.wipe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(group: NamedGroup) -> (SharedSecrets, SharedSecrets) {
        let provider = CryptoProvider::default();
        let scheme = KeyExchangeScheme::new(group).unwrap();

        let possession = scheme.generate(&provider).unwrap();
        let client_share = possession.key_share();
        assert_eq!(
            client_share.len(),
            scheme.share_len(&provider, ShareOrigin::Client).unwrap()
        );

        let client_creds = scheme
            .credentials(&provider, &client_share, ShareOrigin::Client)
            .unwrap();
        let (server_share, server_secrets) = scheme.respond(&provider, &client_creds).unwrap();
        assert_eq!(
            server_share.len(),
            scheme.share_len(&provider, ShareOrigin::Server).unwrap()
        );

        let server_creds = possession.server_credentials(&server_share).unwrap();
        let client_secrets = possession.complete(&server_creds).unwrap();
        (client_secrets, server_secrets)
    }

    #[test]
    fn every_group_agrees() {
        for group in NamedGroup::all() {
            let (c, s) = exchange(*group);
            assert_eq!(c.segments(), s.segments(), "{:?}", group);
            let expected = if matches!(group.kind(), Some(GroupKind::Hybrid(..))) { 2 } else { 1 };
            assert_eq!(c.len(), expected);
        }
    }

    #[test]
    fn hybrid_share_sizes_follow_declared_order() {
        let provider = CryptoProvider::default();
        let x = KeyExchangeScheme::new(NamedGroup::X25519MlKem768).unwrap();
        assert_eq!(x.share_len(&provider, ShareOrigin::Client).unwrap(), 1184 + 32);
        assert_eq!(x.share_len(&provider, ShareOrigin::Server).unwrap(), 1088 + 32);
        let p = KeyExchangeScheme::new(NamedGroup::SecP256r1MlKem768).unwrap();
        assert_eq!(p.share_len(&provider, ShareOrigin::Client).unwrap(), 65 + 1184);

        // The KEM secret comes first for X25519MLKEM768.
        let (c, _) = exchange(NamedGroup::X25519MlKem768);
        assert_eq!(c.segments()[0].len(), 32);
        assert_eq!(c.segments()[1].len(), 32);
    }

    #[test]
    fn oversize_kem_ciphertext_is_wire_format() {
        let provider = CryptoProvider::default();
        let scheme = KeyExchangeScheme::new(NamedGroup::MlKem768).unwrap();
        let possession = scheme.generate(&provider).unwrap();
        let err = possession.server_credentials(&[0u8; 1089]).unwrap_err();
        assert!(matches!(err, Error::WireFormat(_)));

        let err = scheme
            .credentials(&provider, &[0u8; 1185], ShareOrigin::Client)
            .unwrap_err();
        assert!(matches!(err, Error::WireFormat(_)));
    }

    #[test]
    fn invalid_point_is_crypto_failure() {
        let provider = CryptoProvider::default();
        let scheme = KeyExchangeScheme::new(NamedGroup::Secp256r1).unwrap();
        let mut bogus = vec![0x04];
        bogus.extend_from_slice(&[0x11; 64]);
        let creds = scheme
            .credentials(&provider, &bogus, ShareOrigin::Client)
            .unwrap();
        let err = scheme.respond(&provider, &creds).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
        assert_eq!(err.alert(), crate::AlertDescription::HandshakeFailure);
    }

    #[test]
    fn unknown_group_fails_negotiation() {
        assert!(matches!(
            KeyExchangeScheme::new(NamedGroup::Unknown(0x0019)),
            Err(Error::NegotiationFailed(_))
        ));
    }
}
