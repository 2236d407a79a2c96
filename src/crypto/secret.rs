//! Derived key material.
//!
//! Every intermediate of the key schedules lives in a [`Secret`]. A secret is
//! wiped exactly once: either explicitly by the derivation step that consumed
//! it, or on drop if it is still live. The `wiped` flag makes the explicit
//! path and the drop path agree, so aborting a handshake between two steps
//! leaves nothing half cleared.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Pipeline stage a [`Secret`] was produced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStage {
    /// Legacy premaster secret, input to the PRF.
    PreMaster,
    /// Raw output of one key agreement or decapsulation.
    Shared,
    Early,
    /// Output of `Derive-Secret(., "derived", "")`.
    Salt,
    Handshake,
    Master,
    Traffic,
    Exporter,
    Resumption,
    /// Session PSK derived from a ticket.
    Psk,
    /// Final record protection key, IV or header protection key.
    Key,
}

/// Opaque key material at one stage of a key schedule.
pub struct Secret {
    stage: SecretStage,
    bytes: Vec<u8>,
    wiped: bool,
}

impl Secret {
    pub fn new(stage: SecretStage, bytes: Vec<u8>) -> Self {
        Secret {
            stage,
            bytes,
            wiped: false,
        }
    }

    pub fn from_slice(stage: SecretStage, bytes: &[u8]) -> Self {
        Secret::new(stage, bytes.to_vec())
    }

    pub fn stage(&self) -> SecretStage {
        self.stage
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The key bytes. Empty once wiped.
    pub fn as_bytes(&self) -> &[u8] {
        debug_assert!(!self.wiped, "use of wiped {:?} secret", self.stage);
        &self.bytes
    }

    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Zero and release the key bytes. Calling it twice is a no-op.
    pub fn wipe(&mut self) {
        if self.wiped {
            return;
        }
        self.bytes.zeroize();
        self.wiped = true;
    }

    /// Duplicate the key bytes under a new stage.
    ///
    /// Used where one derivation output has two independent consumers.
    pub fn duplicate(&self, stage: SecretStage) -> Secret {
        Secret::new(stage, self.bytes.clone())
    }

    /// Constant time comparison of the key bytes.
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        self.bytes.len() == other.len() && bool::from(self.bytes.ct_eq(other))
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("stage", &self.stage)
            .field("len", &self.bytes.len())
            .field("wiped", &self.wiped)
            .finish()
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.stage == other.stage && self.ct_eq(&other.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_is_idempotent() {
        let mut s = Secret::new(SecretStage::Handshake, vec![1; 32]);
        assert!(!s.is_wiped());
        s.wipe();
        assert!(s.is_wiped());
        assert_eq!(s.len(), 0);
        s.wipe();
        assert!(s.is_wiped());
    }

    #[test]
    fn debug_shows_only_metadata() {
        let s = Secret::new(SecretStage::Traffic, vec![0x5a; 48]);
        let dbg = format!("{:?}", s);
        assert!(dbg.contains("Traffic"));
        assert!(dbg.contains("48"));
        assert!(!dbg.contains("90"));
    }

    #[test]
    fn constant_time_compare() {
        let s = Secret::new(SecretStage::Key, vec![1, 2, 3]);
        assert!(s.ct_eq(&[1, 2, 3]));
        assert!(!s.ct_eq(&[1, 2]));
        assert!(!s.ct_eq(&[1, 2, 4]));
    }
}
