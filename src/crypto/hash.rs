//! Hash contexts and the handshake transcript.

use sha2::{Digest, Sha256, Sha384};

use crate::types::HashAlgorithm;
use crate::Error;

/// Incremental hash over one of the supported algorithms.
#[derive(Clone)]
pub enum HashContext {
    Sha256(Sha256),
    Sha384(Sha384),
}

impl HashContext {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::SHA256 => HashContext::Sha256(Sha256::new()),
            HashAlgorithm::SHA384 => HashContext::Sha384(Sha384::new()),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            HashContext::Sha256(_) => HashAlgorithm::SHA256,
            HashContext::Sha384(_) => HashAlgorithm::SHA384,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            HashContext::Sha256(ctx) => ctx.update(data),
            HashContext::Sha384(ctx) => ctx.update(data),
        }
    }

    /// Clone the context and finalize it. The original can continue to be updated.
    pub fn clone_and_finalize(&self) -> Vec<u8> {
        match self {
            HashContext::Sha256(ctx) => ctx.clone().finalize().to_vec(),
            HashContext::Sha384(ctx) => ctx.clone().finalize().to_vec(),
        }
    }
}

impl std::fmt::Debug for HashContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashContext({:?})", self.algorithm())
    }
}

/// One-shot hash.
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut ctx = HashContext::new(algorithm);
    ctx.update(data);
    ctx.clone_and_finalize()
}

/// Running hash over every handshake message.
///
/// The hash algorithm is only known once the cipher suite is chosen, so
/// messages are buffered until [`Transcript::set_algorithm`] is called and
/// hashed incrementally from then on.
#[derive(Debug, Default)]
pub struct Transcript {
    pending: Vec<u8>,
    ctx: Option<HashContext>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        self.ctx.as_ref().map(|c| c.algorithm())
    }

    /// Fix the hash algorithm, hashing everything buffered so far.
    pub fn set_algorithm(&mut self, algorithm: HashAlgorithm) -> Result<(), Error> {
        if let Some(ctx) = &self.ctx {
            if ctx.algorithm() != algorithm {
                return Err(Error::Internal(format!(
                    "transcript hash already fixed to {:?}",
                    ctx.algorithm()
                )));
            }
            return Ok(());
        }
        let mut ctx = HashContext::new(algorithm);
        ctx.update(&self.pending);
        self.pending = Vec::new();
        self.ctx = Some(ctx);
        Ok(())
    }

    /// Add one complete handshake message, header included.
    pub fn update(&mut self, message: &[u8]) {
        match &mut self.ctx {
            Some(ctx) => ctx.update(message),
            None => self.pending.extend_from_slice(message),
        }
    }

    /// Hash of everything added so far.
    pub fn current_hash(&self) -> Result<Vec<u8>, Error> {
        self.ctx
            .as_ref()
            .map(|c| c.clone_and_finalize())
            .ok_or_else(|| Error::Internal("transcript hash algorithm not negotiated".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_then_incremental_matches_one_shot() {
        let mut t = Transcript::new();
        t.update(b"client hello");
        t.update(b"server hello");
        assert!(t.current_hash().is_err());
        t.set_algorithm(HashAlgorithm::SHA384).unwrap();
        t.update(b"finished");
        assert_eq!(
            t.current_hash().unwrap(),
            digest(
                HashAlgorithm::SHA384,
                b"client helloserver hellofinished"
            )
        );
    }

    #[test]
    fn algorithm_cannot_change() {
        let mut t = Transcript::new();
        t.set_algorithm(HashAlgorithm::SHA256).unwrap();
        assert!(t.set_algorithm(HashAlgorithm::SHA256).is_ok());
        assert!(t.set_algorithm(HashAlgorithm::SHA384).is_err());
    }

    #[test]
    fn empty_sha256() {
        let h = digest(HashAlgorithm::SHA256, &[]);
        assert_eq!(h[..4], [0xe3, 0xb0, 0xc4, 0x42]);
    }
}
