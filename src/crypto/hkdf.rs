//! HKDF (RFC 5869) and the TLS 1.3 label encoding (RFC 8446 Section 7.1).

use hkdf::{Hkdf, HkdfExtract};
use sha2::{Sha256, Sha384};
use zeroize::Zeroize;

use super::secret::{Secret, SecretStage};
use crate::types::HashAlgorithm;
use crate::Error;

/// Prefix of every TLS 1.3 label.
const LABEL_PREFIX: &[u8] = b"tls13 ";

/// HKDF-Extract over several input keying material segments.
///
/// The segments are fed to the HMAC in order, which is the same as extracting
/// over their concatenation without ever materializing it. Hybrid groups rely
/// on this to pass their two shared secrets separately.
pub fn extract(
    hash: HashAlgorithm,
    salt: &[u8],
    ikm: &[&[u8]],
    stage: SecretStage,
) -> Secret {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    match hash {
        HashAlgorithm::SHA256 => {
            let mut ext = HkdfExtract::<Sha256>::new(salt);
            for segment in ikm {
                ext.input_ikm(segment);
            }
            let (mut prk, _) = ext.finalize();
            let secret = Secret::from_slice(stage, &prk);
            prk.as_mut_slice().zeroize();
            secret
        }
        HashAlgorithm::SHA384 => {
            let mut ext = HkdfExtract::<Sha384>::new(salt);
            for segment in ikm {
                ext.input_ikm(segment);
            }
            let (mut prk, _) = ext.finalize();
            let secret = Secret::from_slice(stage, &prk);
            prk.as_mut_slice().zeroize();
            secret
        }
    }
}

/// HKDF-Expand.
pub fn expand(
    hash: HashAlgorithm,
    prk: &[u8],
    info: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, Error> {
    let mut output = vec![0u8; output_len];
    match hash {
        HashAlgorithm::SHA256 => {
            let hk = Hkdf::<Sha256>::from_prk(prk)
                .map_err(|e| Error::Crypto(format!("Invalid PRK: {:?}", e)))?;
            hk.expand(info, &mut output)
                .map_err(|e| Error::Crypto(format!("HKDF expand failed: {:?}", e)))?;
        }
        HashAlgorithm::SHA384 => {
            let hk = Hkdf::<Sha384>::from_prk(prk)
                .map_err(|e| Error::Crypto(format!("Invalid PRK: {:?}", e)))?;
            hk.expand(info, &mut output)
                .map_err(|e| Error::Crypto(format!("HKDF expand failed: {:?}", e)))?;
        }
    }
    Ok(output)
}

/// HKDF-Expand-Label.
///
/// ```text
/// struct {
///     uint16 length = Length;
///     opaque label<7..255> = "tls13 " + Label;
///     opaque context<0..255> = Context;
/// } HkdfLabel;
/// ```
pub fn expand_label(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, Error> {
    let full_label_len = LABEL_PREFIX.len() + label.len();
    if full_label_len > 255 || context.len() > 255 || output_len > u16::MAX as usize {
        return Err(Error::Internal(format!(
            "HkdfLabel out of range: label {} context {} length {}",
            full_label_len,
            context.len(),
            output_len
        )));
    }

    let mut info = Vec::with_capacity(2 + 1 + full_label_len + 1 + context.len());
    info.extend_from_slice(&(output_len as u16).to_be_bytes());
    info.push(full_label_len as u8);
    info.extend_from_slice(LABEL_PREFIX);
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);

    expand(hash, secret, &info, output_len)
}

/// `HKDF-Expand-Label` producing a [`Secret`] at `stage`.
pub fn derive(
    hash: HashAlgorithm,
    secret: &Secret,
    label: &[u8],
    context: &[u8],
    output_len: usize,
    stage: SecretStage,
) -> Result<Secret, Error> {
    let bytes = expand_label(hash, secret.as_bytes(), label, context, output_len)?;
    Ok(Secret::new(stage, bytes))
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
    fn rfc5869_case_1() {
        let ikm = [0x0b; 22];
        let salt = hex("000102030405060708090a0b0c");
        let info = hex("f0f1f2f3f4f5f6f7f8f9");
        let prk = extract(HashAlgorithm::SHA256, &salt, &[&ikm], SecretStage::Shared);
        assert_eq!(
            prk.as_bytes(),
            &hex("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5")[..]
        );
        let okm = expand(HashAlgorithm::SHA256, prk.as_bytes(), &info, 42).unwrap();
        assert_eq!(
            okm,
            hex("3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865")
        );
    }

    #[test]
    fn segmented_extract_equals_concatenated() {
        let a = [1u8; 32];
        let b = [2u8; 17];
        let mut both = a.to_vec();
        both.extend_from_slice(&b);
        let split = extract(HashAlgorithm::SHA384, b"salt", &[&a, &b], SecretStage::Handshake);
        let joined = extract(HashAlgorithm::SHA384, b"salt", &[&both], SecretStage::Handshake);
        assert_eq!(split, joined);
    }

    #[test]
    fn extracted_secret_outlives_scratch_wipe() {
        use hmac::{Hmac, Mac};

        let ikm = [0x5c; 48];
        let mut mac = <Hmac<Sha384> as Mac>::new_from_slice(b"salt").unwrap();
        mac.update(&ikm);
        let reference = mac.finalize().into_bytes().to_vec();

        let prk = extract(HashAlgorithm::SHA384, b"salt", &[&ikm], SecretStage::Early);
        assert_eq!(prk.as_bytes(), &reference[..]);
        assert!(prk.as_bytes().iter().any(|b| *b != 0));
    }

    #[test]
    fn label_too_long() {
        let label = [b'a'; 250];
        assert!(expand_label(HashAlgorithm::SHA256, &[0; 32], &label, &[], 32).is_err());
    }
}
