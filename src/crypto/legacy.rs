//! TLS 1.2 key schedule (RFC 5246 Section 8.1 and 6.3, RFC 7627).
//!
//! One PRF call per stage: premaster secret to master secret, master secret
//! to the key block. The premaster secret is wiped as soon as the master
//! secret exists.

use super::prf::prf_tls12;
use super::secret::{Secret, SecretStage};
use crate::types::{CipherSuite, HashAlgorithm, Random};
use crate::Error;

const MASTER_SECRET_LEN: usize = 48;
const VERIFY_DATA_LEN: usize = 12;

/// Record protection keys of one TLS 1.2 connection.
#[derive(Debug)]
pub struct KeyBlock {
    pub suite: CipherSuite,
    pub client_write_mac_key: Secret,
    pub server_write_mac_key: Secret,
    pub client_write_key: Secret,
    pub server_write_key: Secret,
    pub client_write_iv: Secret,
    pub server_write_iv: Secret,
}

/// Premaster secret of a finite field exchange: leading zero bytes are stripped.
pub fn dhe_premaster(mut shared: Secret) -> Secret {
    let bytes = shared.as_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let premaster = Secret::from_slice(SecretStage::PreMaster, &bytes[first..]);
    shared.wipe();
    premaster
}

/// `PRF(pre_master_secret, "master secret", ClientHello.random + ServerHello.random)`.
pub fn master_secret(
    hash: HashAlgorithm,
    mut premaster: Secret,
    client_random: &Random,
    server_random: &Random,
) -> Result<Secret, Error> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(&client_random.0);
    seed.extend_from_slice(&server_random.0);
    let out = prf_tls12(
        hash,
        premaster.as_bytes(),
        "master secret",
        &seed,
        MASTER_SECRET_LEN,
    );
    premaster.wipe();
    Ok(Secret::new(SecretStage::Master, out?))
}

/// `PRF(pre_master_secret, "extended master secret", session_hash)`.
pub fn extended_master_secret(
    hash: HashAlgorithm,
    mut premaster: Secret,
    session_hash: &[u8],
) -> Result<Secret, Error> {
    let out = prf_tls12(
        hash,
        premaster.as_bytes(),
        "extended master secret",
        session_hash,
        MASTER_SECRET_LEN,
    );
    premaster.wipe();
    Ok(Secret::new(SecretStage::Master, out?))
}

/// Split `PRF(master_secret, "key expansion", server_random + client_random)`.
pub fn key_block(
    hash: HashAlgorithm,
    master: &Secret,
    suite: CipherSuite,
    client_random: &Random,
    server_random: &Random,
) -> Result<KeyBlock, Error> {
    let (mac_len, key_len, iv_len) = suite.key_lengths();
    if key_len == 0 {
        return Err(Error::Internal(format!("no key lengths for {:?}", suite)));
    }

    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(&server_random.0);
    seed.extend_from_slice(&client_random.0);

    let total = 2 * (mac_len + key_len + iv_len);
    let mut block = prf_tls12(hash, master.as_bytes(), "key expansion", &seed, total)?;

    let mut offset = 0;
    let mut take = |len: usize| {
        let s = Secret::from_slice(SecretStage::Key, &block[offset..offset + len]);
        offset += len;
        s
    };

    let key_block = KeyBlock {
        suite,
        client_write_mac_key: take(mac_len),
        server_write_mac_key: take(mac_len),
        client_write_key: take(key_len),
        server_write_key: take(key_len),
        client_write_iv: take(iv_len),
        server_write_iv: take(iv_len),
    };
    zeroize::Zeroize::zeroize(&mut block);
    Ok(key_block)
}

/// Finished `verify_data`: 12 bytes of `PRF(master_secret, finished_label, Hash(handshake_messages))`.
pub fn finished_verify_data(
    hash: HashAlgorithm,
    master: &Secret,
    client: bool,
    handshake_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    let label = if client {
        "client finished"
    } else {
        "server finished"
    };
    prf_tls12(hash, master.as_bytes(), label, handshake_hash, VERIFY_DATA_LEN)
}

/// Keying material exporter (RFC 5705).
pub fn export_keying_material(
    hash: HashAlgorithm,
    master: &Secret,
    client_random: &Random,
    server_random: &Random,
    label: &str,
    context: Option<&[u8]>,
    len: usize,
) -> Result<Vec<u8>, Error> {
    let mut seed = Vec::with_capacity(64 + 2 + context.map_or(0, |c| c.len()));
    seed.extend_from_slice(&client_random.0);
    seed.extend_from_slice(&server_random.0);
    if let Some(context) = context {
        if context.len() > u16::MAX as usize {
            return Err(Error::ResourceLimit("exporter context too long".into()));
        }
        seed.extend_from_slice(&(context.len() as u16).to_be_bytes());
        seed.extend_from_slice(context);
    }
    prf_tls12(hash, master.as_bytes(), label, &seed, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn randoms() -> (Random, Random) {
        (Random([1; 32]), Random([2; 32]))
    }

    #[test]
    fn master_secret_consumes_premaster() {
        let (cr, sr) = randoms();
        let premaster = Secret::new(SecretStage::PreMaster, vec![3; 32]);
        let ms = master_secret(HashAlgorithm::SHA256, premaster, &cr, &sr).unwrap();
        assert_eq!(ms.len(), 48);
        assert_eq!(ms.stage(), SecretStage::Master);

        let mut seed = vec![1; 32];
        seed.extend_from_slice(&[2; 32]);
        let expected = prf_tls12(HashAlgorithm::SHA256, &[3; 32], "master secret", &seed, 48).unwrap();
        assert!(ms.ct_eq(&expected));
    }

    #[test]
    fn extended_master_secret_binds_session_hash() {
        let a = extended_master_secret(
            HashAlgorithm::SHA384,
            Secret::new(SecretStage::PreMaster, vec![3; 32]),
            &[4; 48],
        )
        .unwrap();
        let b = extended_master_secret(
            HashAlgorithm::SHA384,
            Secret::new(SecretStage::PreMaster, vec![3; 32]),
            &[5; 48],
        )
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn key_block_layout() {
        let (cr, sr) = randoms();
        let ms = Secret::new(SecretStage::Master, vec![9; 48]);
        let suite = CipherSuite::ECDHE_RSA_AES256_GCM_SHA384;
        let kb = key_block(HashAlgorithm::SHA384, &ms, suite, &cr, &sr).unwrap();
        assert_eq!(kb.client_write_key.len(), 32);
        assert_eq!(kb.server_write_key.len(), 32);
        assert_eq!(kb.client_write_iv.len(), 4);
        assert!(kb.client_write_mac_key.is_empty());

        let mut seed = vec![2; 32];
        seed.extend_from_slice(&[1; 32]);
        let raw = prf_tls12(HashAlgorithm::SHA384, &[9; 48], "key expansion", &seed, 72).unwrap();
        assert!(kb.client_write_key.ct_eq(&raw[..32]));
        assert!(kb.server_write_key.ct_eq(&raw[32..64]));
        assert!(kb.client_write_iv.ct_eq(&raw[64..68]));
        assert!(kb.server_write_iv.ct_eq(&raw[68..72]));
    }

    #[test]
    fn finished_labels_differ() {
        let ms = Secret::new(SecretStage::Master, vec![9; 48]);
        let c = finished_verify_data(HashAlgorithm::SHA256, &ms, true, &[0; 32]).unwrap();
        let s = finished_verify_data(HashAlgorithm::SHA256, &ms, false, &[0; 32]).unwrap();
        assert_eq!(c.len(), 12);
        assert_ne!(c, s);
    }

    #[test]
    fn dhe_premaster_strips_leading_zeros() {
        let shared = Secret::new(SecretStage::Shared, vec![0, 0, 7, 0, 8]);
        let pm = dhe_premaster(shared);
        assert_eq!(pm.as_bytes(), &[7, 0, 8]);
        assert_eq!(pm.stage(), SecretStage::PreMaster);
    }
}
