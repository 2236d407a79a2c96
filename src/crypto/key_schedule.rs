//! TLS 1.3 key schedule (RFC 8446 Section 7.1).
//!
//! ```text
//!              0
//!              |
//!              v
//!    PSK ->  HKDF-Extract = Early Secret
//!              |
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!  shared -> HKDF-Extract = Handshake Secret
//!              |
//!              +-----> Derive-Secret(., "c hs traffic" | "s hs traffic",
//!              |                     ClientHello...ServerHello)
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!    0 -> HKDF-Extract = Master Secret
//!              |
//!              +-----> "c ap traffic" | "s ap traffic" | "exp master"
//!              |            (ClientHello...server Finished)
//!              +-----> "res master"  (ClientHello...client Finished)
//! ```
//!
//! A hybrid exchange contributes two shared secrets. They enter the
//! Handshake Secret extract as two IKM segments, in the group's order.
//!
//! [`KeySchedule`] holds exactly one chain secret at a time. Moving to the
//! next stage wipes the previous one and the intermediate salt before
//! returning.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};

use super::hash::digest;
use super::hkdf::{derive, expand_label, extract};
use super::key_exchange::SharedSecrets;
use super::secret::{Secret, SecretStage};
use crate::types::{CipherSuite, HashAlgorithm};
use crate::Error;

/// Salt of the RFC 9001 QUIC v1 initial secrets.
const QUIC_V1_INITIAL_SALT: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c, 0xad,
    0xcc, 0xbb, 0x7f, 0x0a,
];

/// Direction of a traffic secret relative to the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One traffic secret handed to the record protection collaborator.
///
/// `epoch` counts key changes on one direction: 1 for handshake traffic, 2
/// for the first application traffic secret, +1 per KeyUpdate.
#[derive(Debug)]
pub struct TrafficSecret {
    pub epoch: u16,
    pub direction: Direction,
    pub suite: CipherSuite,
    pub secret: Secret,
}

/// Record protection key and IV derived from a traffic secret.
#[derive(Debug)]
pub struct TrafficKeys {
    pub key: Secret,
    pub iv: Secret,
}

/// QUIC packet protection keys derived from a traffic secret.
#[derive(Debug)]
pub struct QuicKeys {
    pub key: Secret,
    pub iv: Secret,
    /// Header protection key.
    pub hp: Secret,
}

/// The TLS 1.3 secret chain.
#[derive(Debug)]
pub struct KeySchedule {
    hash: HashAlgorithm,
    current: Secret,
}

impl KeySchedule {
    /// Start the chain. Without a PSK the IKM is a zero string of hash length.
    pub fn new(hash: HashAlgorithm, psk: Option<&[u8]>) -> Self {
        let zeros = vec![0u8; hash.output_len()];
        let ikm = psk.unwrap_or(&zeros[..]);
        let early = extract(hash, &zeros, &[ikm], SecretStage::Early);
        trace!("Key schedule started ({:?}, psk: {})", hash, psk.is_some());
        KeySchedule {
            hash,
            current: early,
        }
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn stage(&self) -> SecretStage {
        self.current.stage()
    }

    fn expect_stage(&self, stage: SecretStage) -> Result<(), Error> {
        if self.current.stage() != stage {
            return Err(Error::Internal(format!(
                "key schedule at {:?}, expected {:?}",
                self.current.stage(),
                stage
            )));
        }
        Ok(())
    }

    /// `Derive-Secret(current, "derived", "")`.
    fn salt(&self) -> Result<Secret, Error> {
        let empty_hash = digest(self.hash, &[]);
        derive(
            self.hash,
            &self.current,
            b"derived",
            &empty_hash,
            self.hash.output_len(),
            SecretStage::Salt,
        )
    }

    /// Replace the chain secret, wiping the old one and the salt in between.
    fn advance(&mut self, ikm: &[&[u8]], stage: SecretStage) -> Result<(), Error> {
        let mut salt = self.salt()?;
        let next = extract(self.hash, salt.as_bytes(), ikm, stage);
        salt.wipe();
        let mut previous = std::mem::replace(&mut self.current, next);
        previous.wipe();
        trace!("Key schedule {:?} -> {:?}", previous.stage(), stage);
        Ok(())
    }

    /// Early Secret -> Handshake Secret.
    pub fn input_shared_secrets(&mut self, shared: &SharedSecrets) -> Result<(), Error> {
        self.expect_stage(SecretStage::Early)?;
        if shared.is_empty() {
            return Err(Error::Internal("no shared secret for handshake secret".into()));
        }
        self.advance(&shared.segments(), SecretStage::Handshake)
    }

    /// Handshake Secret -> Master Secret.
    pub fn input_empty(&mut self) -> Result<(), Error> {
        self.expect_stage(SecretStage::Handshake)?;
        let zeros = vec![0u8; self.hash.output_len()];
        self.advance(&[&zeros[..]], SecretStage::Master)
    }

    fn derive_secret(
        &self,
        label: &[u8],
        transcript_hash: &[u8],
        stage: SecretStage,
    ) -> Result<Secret, Error> {
        derive(
            self.hash,
            &self.current,
            label,
            transcript_hash,
            self.hash.output_len(),
            stage,
        )
    }

    /// `(client, server)` handshake traffic secrets over Hash(ClientHello..ServerHello).
    pub fn handshake_traffic_secrets(&self, transcript_hash: &[u8]) -> Result<(Secret, Secret), Error> {
        self.expect_stage(SecretStage::Handshake)?;
        Ok((
            self.derive_secret(b"c hs traffic", transcript_hash, SecretStage::Traffic)?,
            self.derive_secret(b"s hs traffic", transcript_hash, SecretStage::Traffic)?,
        ))
    }

    /// `(client, server)` application traffic secrets over Hash(ClientHello..server Finished).
    pub fn application_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Secret, Secret), Error> {
        self.expect_stage(SecretStage::Master)?;
        Ok((
            self.derive_secret(b"c ap traffic", transcript_hash, SecretStage::Traffic)?,
            self.derive_secret(b"s ap traffic", transcript_hash, SecretStage::Traffic)?,
        ))
    }

    pub fn exporter_master_secret(&self, transcript_hash: &[u8]) -> Result<Secret, Error> {
        self.expect_stage(SecretStage::Master)?;
        self.derive_secret(b"exp master", transcript_hash, SecretStage::Exporter)
    }

    /// Over Hash(ClientHello..client Finished).
    pub fn resumption_master_secret(&self, transcript_hash: &[u8]) -> Result<Secret, Error> {
        self.expect_stage(SecretStage::Master)?;
        self.derive_secret(b"res master", transcript_hash, SecretStage::Resumption)
    }

    /// Wipe the chain secret. The schedule is unusable afterwards.
    pub fn wipe(&mut self) {
        self.current.wipe();
    }
}

fn hmac(hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let bad_key = |_| Error::Crypto("invalid HMAC key".to_string());
    Ok(match hash {
        HashAlgorithm::SHA256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).map_err(bad_key)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::SHA384 => {
            let mut mac = <Hmac<Sha384> as Mac>::new_from_slice(key).map_err(bad_key)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    })
}

/// Finished `verify_data` (RFC 8446 Section 4.4.4).
///
/// ```text
/// finished_key = HKDF-Expand-Label(BaseKey, "finished", "", Hash.length)
/// verify_data  = HMAC(finished_key, Transcript-Hash(...))
/// ```
pub fn finished_verify_data(
    hash: HashAlgorithm,
    base_key: &Secret,
    transcript_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut finished_key = derive(
        hash,
        base_key,
        b"finished",
        &[],
        hash.output_len(),
        SecretStage::Key,
    )?;
    let verify_data = hmac(hash, finished_key.as_bytes(), transcript_hash);
    finished_key.wipe();
    verify_data
}

/// Record protection key and IV: "key" and "iv" with empty context.
pub fn traffic_keys(
    hash: HashAlgorithm,
    secret: &Secret,
    key_len: usize,
    iv_len: usize,
) -> Result<TrafficKeys, Error> {
    Ok(TrafficKeys {
        key: derive(hash, secret, b"key", &[], key_len, SecretStage::Key)?,
        iv: derive(hash, secret, b"iv", &[], iv_len, SecretStage::Key)?,
    })
}

/// `application_traffic_secret_N+1` (RFC 8446 Section 7.2).
pub fn next_traffic_secret(hash: HashAlgorithm, secret: &Secret) -> Result<Secret, Error> {
    derive(
        hash,
        secret,
        b"traffic upd",
        &[],
        hash.output_len(),
        SecretStage::Traffic,
    )
}

/// TLS-Exporter (RFC 8446 Section 7.5).
///
/// ```text
/// HKDF-Expand-Label(Derive-Secret(Secret, label, ""),
///                   "exporter", Hash(context_value), key_length)
/// ```
pub fn export_keying_material(
    hash: HashAlgorithm,
    exporter_master: &Secret,
    label: &[u8],
    context: &[u8],
    len: usize,
) -> Result<Vec<u8>, Error> {
    let empty_hash = digest(hash, &[]);
    let mut derived = derive(
        hash,
        exporter_master,
        label,
        &empty_hash,
        hash.output_len(),
        SecretStage::Exporter,
    )?;
    let context_hash = digest(hash, context);
    let out = expand_label(hash, derived.as_bytes(), b"exporter", &context_hash, len);
    derived.wipe();
    out
}

/// PSK of one session ticket (RFC 8446 Section 4.6.1).
pub fn resumption_psk(
    hash: HashAlgorithm,
    resumption_master: &Secret,
    ticket_nonce: &[u8],
) -> Result<Secret, Error> {
    derive(
        hash,
        resumption_master,
        b"resumption",
        ticket_nonce,
        hash.output_len(),
        SecretStage::Psk,
    )
}

/// QUIC packet protection keys (RFC 9001 Section 5.1).
///
/// The header protection key has the length of the AEAD key.
pub fn quic_keys(
    hash: HashAlgorithm,
    secret: &Secret,
    key_len: usize,
    iv_len: usize,
) -> Result<QuicKeys, Error> {
    Ok(QuicKeys {
        key: derive(hash, secret, b"quic key", &[], key_len, SecretStage::Key)?,
        iv: derive(hash, secret, b"quic iv", &[], iv_len, SecretStage::Key)?,
        hp: derive(hash, secret, b"quic hp", &[], key_len, SecretStage::Key)?,
    })
}

/// `(client, server)` QUIC v1 Initial secrets for a client chosen
/// Destination Connection ID (RFC 9001 Section 5.2).
pub fn quic_initial_secrets(dcid: &[u8]) -> Result<(Secret, Secret), Error> {
    let hash = HashAlgorithm::SHA256;
    let mut initial = extract(hash, &QUIC_V1_INITIAL_SALT, &[dcid], SecretStage::Early);
    let client = derive(
        hash,
        &initial,
        b"client in",
        &[],
        hash.output_len(),
        SecretStage::Traffic,
    );
    let server = derive(
        hash,
        &initial,
        b"server in",
        &[],
        hash.output_len(),
        SecretStage::Traffic,
    );
    initial.wipe();
    Ok((client?, server?))
}
