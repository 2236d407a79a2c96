//! Key exchange primitives and the key schedules.

pub mod hash;
pub mod hkdf;
pub mod key_exchange;
pub mod key_schedule;
pub mod legacy;
pub mod prf;
pub mod provider;
pub mod rust_crypto;
mod secret;

pub use hash::{HashContext, Transcript};
pub use key_exchange::{Credentials, KeyExchangeScheme, Possession, ShareOrigin, SharedSecrets};
pub use key_schedule::{Direction, KeySchedule, QuicKeys, TrafficKeys, TrafficSecret};
pub use legacy::KeyBlock;
pub use provider::{
    AgreementKey, CryptoProvider, CryptoSafe, Encapsulated, KemDecapsulator,
    SupportedKeyAgreement, SupportedKem,
};
pub use secret::{Secret, SecretStage};

// Re-export shared types for provider implementations
pub use crate::types::{HashAlgorithm, NamedGroup, SignatureScheme};
