//! Finite field Diffie-Hellman.
//!
//! Covers the RFC 7919 ffdhe2048 group, and explicit `(p, g)` parameters as
//! a TLS 1.2 DHE ServerKeyExchange carries them.

use std::sync::OnceLock;

use num_bigint::{BigUint, RandomBits};
use rand::distributions::Distribution;
use rand::rngs::OsRng;

use crate::crypto::provider::{AgreementKey, SupportedKeyAgreement};
use crate::crypto::secret::{Secret, SecretStage};
use crate::types::NamedGroup;

/// RFC 7919 Appendix A.1.
const FFDHE2048_P: &str = concat!(
    "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695",
    "A9E13641146433FBCC939DCE249B3EF97D2FE363630C75D8F681B202AEC4617A",
    "D3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
    "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797A",
    "BC0AB182B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4",
    "AE56EDE76372BB190B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
    "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC2EC22005",
    "C58EF1837D1683B2C6F34A26C1B2EFFA886B423861285C97FFFFFFFFFFFFFFFF",
);

/// Smallest modulus accepted from a peer.
const MIN_PRIME_BITS: u64 = 2048;

/// Diffie-Hellman domain parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DhParams {
    p: BigUint,
    g: BigUint,
    /// Subgroup order, known for safe primes like the RFC 7919 groups.
    q: Option<BigUint>,
    len: usize,
}

impl std::fmt::Debug for DhParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhParams")
            .field("bits", &self.p.bits())
            .field("named", &self.is_ffdhe2048())
            .finish()
    }
}

impl DhParams {
    pub fn ffdhe2048() -> &'static DhParams {
        static PARAMS: OnceLock<DhParams> = OnceLock::new();
        PARAMS.get_or_init(|| {
            // The constant above is valid hex.
            let p = BigUint::parse_bytes(FFDHE2048_P.as_bytes(), 16).unwrap_or_default();
            let q = (&p - 1u32) >> 1;
            DhParams {
                len: 256,
                g: BigUint::from(2u32),
                q: Some(q),
                p,
            }
        })
    }

    /// Explicit parameters received from a peer.
    pub fn new(p: &[u8], g: &[u8]) -> Result<DhParams, String> {
        let named = DhParams::ffdhe2048();
        let p = BigUint::from_bytes_be(p);
        let g = BigUint::from_bytes_be(g);
        if p == named.p && g == named.g {
            return Ok(named.clone());
        }
        if p.bits() < MIN_PRIME_BITS {
            return Err(format!("DH prime of {} bits is too small", p.bits()));
        }
        if !p.bit(0) {
            return Err("DH prime is even".to_string());
        }
        let one = BigUint::from(1u32);
        if g <= one || g >= &p - &one {
            return Err("DH generator out of range".to_string());
        }
        let len = ((p.bits() + 7) / 8) as usize;
        Ok(DhParams { p, g, q: None, len })
    }

    pub fn is_ffdhe2048(&self) -> bool {
        self.q.is_some() && self.p == DhParams::ffdhe2048().p
    }

    /// Length of p, and of every public value, in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn p_bytes(&self) -> Vec<u8> {
        self.p.to_bytes_be()
    }

    pub fn g_bytes(&self) -> Vec<u8> {
        self.g.to_bytes_be()
    }

    fn to_fixed(&self, value: &BigUint) -> Vec<u8> {
        let bytes = value.to_bytes_be();
        let mut out = vec![0u8; self.len.saturating_sub(bytes.len())];
        out.extend_from_slice(&bytes);
        out
    }

    /// Peer public value must satisfy 1 < y < p-1, and lie in the prime
    /// order subgroup when its order is known.
    fn check_public(&self, y: &BigUint) -> Result<(), String> {
        let one = BigUint::from(1u32);
        if *y <= one || *y >= &self.p - &one {
            return Err("DH public value out of range".to_string());
        }
        if let Some(q) = &self.q {
            if y.modpow(q, &self.p) != one {
                return Err("DH public value not in prime order subgroup".to_string());
            }
        }
        Ok(())
    }
}

/// Ephemeral DH key.
pub struct DhKey {
    params: DhParams,
    private_key: BigUint,
    public_key: Vec<u8>,
}

impl std::fmt::Debug for DhKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKey")
            .field("params", &self.params)
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

impl DhKey {
    pub fn generate(params: &DhParams) -> DhKey {
        // One bit less than the prime, retried in the unlikely case it is < 2.
        let distribution = RandomBits::new(params.p.bits() - 1);
        let two = BigUint::from(2u32);
        let private_key = loop {
            let candidate: BigUint = distribution.sample(&mut OsRng);
            if candidate >= two {
                break candidate;
            }
        };

        let public_key = params.to_fixed(&params.g.modpow(&private_key, &params.p));

        DhKey {
            params: params.clone(),
            private_key,
            public_key,
        }
    }

    pub fn params(&self) -> &DhParams {
        &self.params
    }
}

impl AgreementKey for DhKey {
    fn group(&self) -> NamedGroup {
        if self.params.is_ffdhe2048() {
            NamedGroup::Ffdhe2048
        } else {
            NamedGroup::Unknown(0)
        }
    }

    fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    fn agree(self: Box<Self>, peer_public: &[u8]) -> Result<Secret, String> {
        if peer_public.is_empty() || peer_public.len() > self.params.len {
            return Err(format!(
                "DH public value of {} bytes for a {} byte group",
                peer_public.len(),
                self.params.len
            ));
        }
        let y = BigUint::from_bytes_be(peer_public);
        self.params.check_public(&y)?;

        let z = y.modpow(&self.private_key, &self.params.p);
        Ok(Secret::new(SecretStage::Shared, self.params.to_fixed(&z)))
    }
}

/// ffdhe2048 (RFC 7919) key exchange group.
#[derive(Debug)]
pub(super) struct Ffdhe2048;

impl SupportedKeyAgreement for Ffdhe2048 {
    fn group(&self) -> NamedGroup {
        NamedGroup::Ffdhe2048
    }

    fn public_key_len(&self) -> usize {
        256
    }

    fn generate(&self) -> Result<Box<dyn AgreementKey>, String> {
        Ok(Box::new(DhKey::generate(DhParams::ffdhe2048())))
    }
}

pub(super) static KX_GROUP_FFDHE2048: Ffdhe2048 = Ffdhe2048;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffdhe2048_prime_shape() {
        let params = DhParams::ffdhe2048();
        assert_eq!(params.p.bits(), 2048);
        assert_eq!(params.p_bytes().len(), 256);
        assert!(params.is_ffdhe2048());
    }

    #[test]
    fn ffdhe2048_agreement() {
        let a = KX_GROUP_FFDHE2048.generate().unwrap();
        let b = KX_GROUP_FFDHE2048.generate().unwrap();
        assert_eq!(a.public_key().len(), 256);
        let a_pub = a.public_key().to_vec();
        let b_pub = b.public_key().to_vec();
        let s1 = a.agree(&b_pub).unwrap();
        let s2 = b.agree(&a_pub).unwrap();
        assert_eq!(s1.len(), 256);
        assert_eq!(s1, s2);
    }

    #[test]
    fn rejects_degenerate_public_values() {
        let params = DhParams::ffdhe2048();
        let p_minus_one = params.to_fixed(&(&params.p - 1u32));
        for bad in [vec![1u8], vec![0u8; 256], p_minus_one] {
            let key = Box::new(DhKey::generate(params));
            assert!(key.agree(&bad).is_err());
        }
    }

    #[test]
    fn explicit_params_recognise_named_group() {
        let named = DhParams::ffdhe2048();
        let params = DhParams::new(&named.p_bytes(), &named.g_bytes()).unwrap();
        assert!(params.is_ffdhe2048());
        assert!(DhParams::new(&[0xFF; 64], &[2]).is_err());
    }
}
