//! RustCrypto backed key exchange primitives.
//!
//! Elliptic curves come from `p256`, `p384` and `x25519-dalek`, the finite
//! field group from `num-bigint`, and ML-KEM from the `pqcrypto` bindings.

mod dh;
mod kem;
mod kx_group;

pub use dh::{DhKey, DhParams};

use crate::crypto::provider::CryptoProvider;

pub(crate) use kem::ALL_KEMS;
pub(crate) use kx_group::ALL_KEY_AGREEMENTS;

#[cfg(test)]
pub(crate) use kx_group::x25519_from_private;

/// Get the default RustCrypto-based crypto provider.
///
/// # Supported Groups
///
/// - secp256r1, secp384r1, x25519
/// - ffdhe2048
/// - MLKEM768
///
/// The hybrid groups SecP256r1MLKEM768 and X25519MLKEM768 are available
/// through their components.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        key_agreements: ALL_KEY_AGREEMENTS,
        kems: ALL_KEMS,
    }
}
