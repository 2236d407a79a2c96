use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use zeroize::Zeroize;

use crate::types::HashAlgorithm;
use crate::Error;

/// PRF for TLS 1.2
/// as specified in RFC 5246 Section 5.
///
/// PRF(secret, label, seed) = P_<hash>(secret, label + seed)
///
/// `seed` is the seed WITHOUT the label.
pub fn prf_tls12(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, Error> {
    debug_assert!(label.is_ascii());
    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label.as_bytes());
    full_seed.extend_from_slice(seed);

    match hash {
        HashAlgorithm::SHA256 => p_hash::<Hmac<Sha256>>(secret, &full_seed, output_len),
        HashAlgorithm::SHA384 => p_hash::<Hmac<Sha384>>(secret, &full_seed, output_len),
    }
}

fn p_hash<M: Mac + hmac::digest::KeyInit + Clone>(
    secret: &[u8],
    full_seed: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, Error> {
    let key = <M as Mac>::new_from_slice(secret)
        .map_err(|_| Error::Crypto("Invalid HMAC key".to_string()))?;

    let mut result = Vec::with_capacity(output_len);

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut mac = key.clone();
    mac.update(full_seed);
    let mut a = mac.finalize().into_bytes();

    while result.len() < output_len {
        // HMAC_hash(secret, A(i) + seed)
        let mut mac = key.clone();
        mac.update(&a);
        mac.update(full_seed);
        let mut output = mac.finalize().into_bytes();

        let remaining = output_len - result.len();
        let to_copy = remaining.min(output.len());
        result.extend_from_slice(&output[..to_copy]);
        output.as_mut_slice().zeroize();

        if result.len() < output_len {
            // A(i+1) = HMAC_hash(secret, A(i))
            let mut mac = key.clone();
            mac.update(&a);
            a.as_mut_slice().zeroize();
            a = mac.finalize().into_bytes();
        }
    }
    a.as_mut_slice().zeroize();

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn p_sha256_known_answer() {
        let secret = hex("9bbe436ba940f017b17652849a71db35");
        let seed = hex("a0ba9f936cda311827a6f796ffd5198c");
        let out = prf_tls12(HashAlgorithm::SHA256, &secret, "test label", &seed, 100).unwrap();
        assert_eq!(
            out,
            hex(concat!(
                "e3f229ba727be17b8d122620557cd453c2aab21d07c3d495329b52d4e61edb5a",
                "6b301791e90d35c9c9a46b4e14baf9af0fa022f7077def17abfd3797c0564bab",
                "4fbc91666e9def9b97fce34f796789baa48082d122ee42c5a72e5a5110fff701",
                "87347b66"
            ))
        );
    }

    #[test]
    fn output_length_is_exact() {
        for len in [1, 12, 32, 48, 104] {
            let out = prf_tls12(HashAlgorithm::SHA384, b"k", "l", b"s", len).unwrap();
            assert_eq!(out.len(), len);
        }
    }
}
