//! ML-KEM-768 through the pqcrypto bindings.

use pqcrypto_mlkem::mlkem768::{self, Ciphertext, PublicKey, SecretKey};
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use zeroize::Zeroizing;

use crate::crypto::provider::{Encapsulated, KemDecapsulator, SupportedKem};
use crate::crypto::secret::{Secret, SecretStage};
use crate::types::NamedGroup;

/// Client side key pair. The secret key is kept as bytes so it can be wiped.
struct MlKem768Key {
    encapsulation_key: Vec<u8>,
    secret_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for MlKem768Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlKem768Key")
            .field("encapsulation_key_len", &self.encapsulation_key.len())
            .finish_non_exhaustive()
    }
}

impl KemDecapsulator for MlKem768Key {
    fn group(&self) -> NamedGroup {
        NamedGroup::MlKem768
    }

    fn encapsulation_key(&self) -> &[u8] {
        &self.encapsulation_key
    }

    fn decapsulate(self: Box<Self>, ciphertext: &[u8]) -> Result<Secret, String> {
        if ciphertext.len() != mlkem768::ciphertext_bytes() {
            return Err(format!(
                "ML-KEM-768 ciphertext of {} bytes",
                ciphertext.len()
            ));
        }
        // pqcrypto key and secret values are Copy without Zeroize; only the
        // bytes we own are wiped.
        let secret_key = SecretKey::from_bytes(&self.secret_key)
            .map_err(|_| "invalid ML-KEM-768 secret key".to_string())?;
        let ciphertext = Ciphertext::from_bytes(ciphertext)
            .map_err(|_| "invalid ML-KEM-768 ciphertext".to_string())?;
        let shared = mlkem768::decapsulate(&ciphertext, &secret_key);
        Ok(Secret::from_slice(SecretStage::Shared, shared.as_bytes()))
    }
}

/// ML-KEM-768 (FIPS 203).
#[derive(Debug)]
struct MlKem768;

impl SupportedKem for MlKem768 {
    fn group(&self) -> NamedGroup {
        NamedGroup::MlKem768
    }

    fn encapsulation_key_len(&self) -> usize {
        mlkem768::public_key_bytes()
    }

    fn ciphertext_len(&self) -> usize {
        mlkem768::ciphertext_bytes()
    }

    fn generate(&self) -> Result<Box<dyn KemDecapsulator>, String> {
        let (public, secret) = mlkem768::keypair();
        Ok(Box::new(MlKem768Key {
            encapsulation_key: public.as_bytes().to_vec(),
            secret_key: Zeroizing::new(secret.as_bytes().to_vec()),
        }))
    }

    fn encapsulate(&self, encapsulation_key: &[u8]) -> Result<Encapsulated, String> {
        if encapsulation_key.len() != mlkem768::public_key_bytes() {
            return Err(format!(
                "ML-KEM-768 encapsulation key of {} bytes",
                encapsulation_key.len()
            ));
        }
        let public_key = PublicKey::from_bytes(encapsulation_key)
            .map_err(|_| "invalid ML-KEM-768 encapsulation key".to_string())?;
        let (shared, ciphertext) = mlkem768::encapsulate(&public_key);
        Ok(Encapsulated {
            shared_secret: Secret::from_slice(SecretStage::Shared, shared.as_bytes()),
            ciphertext: ciphertext.as_bytes().to_vec(),
        })
    }
}

static KEM_MLKEM768: MlKem768 = MlKem768;

/// All supported KEMs.
pub(crate) static ALL_KEMS: &[&dyn SupportedKem] = &[&KEM_MLKEM768];
