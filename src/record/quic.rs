//! CRYPTO stream framing for QUIC.
//!
//! QUIC carries handshake bytes in CRYPTO frames of the packet number
//! space matching their epoch, and carries alerts as transport error codes.

use std::sync::{Mutex, MutexGuard};

use super::{ContentType, FragmentQueue};
use crate::alert::Alert;

/// QUIC encryption level of a handshake epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySpace {
    Initial,
    Handshake,
    Application,
}

impl KeySpace {
    pub fn from_epoch(epoch: u16) -> Self {
        match epoch {
            0 => KeySpace::Initial,
            1 => KeySpace::Handshake,
            _ => KeySpace::Application,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            KeySpace::Initial => 0,
            KeySpace::Handshake => 1,
            KeySpace::Application => 2,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    queue: FragmentQueue,
    error_code: Option<u64>,
    closed: bool,
}

/// Outbound handshake bytes waiting to be put in CRYPTO frames.
#[derive(Debug, Default)]
pub struct CryptoStream {
    inner: Mutex<Inner>,
}

impl CryptoStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn queue_handshake(&self, bytes: &[u8]) {
        self.lock().queue.push(ContentType::Handshake, bytes.to_vec());
    }

    pub fn advance_epoch(&self) {
        self.lock().queue.advance_epoch();
    }

    /// Bytes to send in `space`.
    ///
    /// Only drains while the head of the queue belongs to `space`, so data
    /// of a later space is never handed out ahead of an earlier one.
    pub fn take_crypto_data(&self, space: KeySpace) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        let mut out: Option<Vec<u8>> = None;
        while let Some(head) = inner.queue.front() {
            if KeySpace::from_epoch(head.epoch) != space {
                break;
            }
            let Some(fragment) = inner.queue.pop() else {
                break;
            };
            match &mut out {
                Some(data) => data.extend_from_slice(&fragment.data),
                None => out = Some(fragment.data),
            }
        }
        out
    }

    /// Space of the next bytes to send.
    pub fn pending_space(&self) -> Option<KeySpace> {
        self.lock()
            .queue
            .front()
            .map(|f| KeySpace::from_epoch(f.epoch))
    }

    /// Record a fatal alert as a CRYPTO_ERROR code. The first one wins.
    ///
    /// Queued handshake bytes are dropped: the connection is over. Returns
    /// `None` when the stream was closed first, in which case nothing is
    /// recorded.
    pub fn record_alert(&self, alert: Alert) -> Option<u64> {
        let mut inner = self.lock();
        if let Some(code) = inner.error_code {
            warn!("Dropping {:?}, already failed with 0x{:x}", alert, code);
            return Some(code);
        }
        if inner.closed {
            warn!("Discarding {:?} after close", alert);
            return None;
        }
        let code = alert.quic_error_code();
        inner.error_code = Some(code);
        inner.queue.clear();
        Some(code)
    }

    /// Stop recording alerts. Bytes already queued can still be taken.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn error_code(&self) -> Option<u64> {
        self.lock().error_code
    }
}
