use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{encode_record, ContentType, MAX_FRAGMENT_LEN};
use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::Error;

/// One outbound record body and the write epoch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub content_type: ContentType,
    pub epoch: u16,
    pub data: Vec<u8>,
}

impl Fragment {
    /// The fragment as an unprotected record.
    pub fn to_record(&self) -> Result<Vec<u8>, Error> {
        encode_record(self.content_type, &self.data)
    }
}

#[derive(Debug)]
struct Entry {
    fragment: Fragment,
    /// Epoch advances that take effect once this entry drains.
    advances: u16,
}

/// Ordered fragments with deferred epoch boundaries.
///
/// An epoch advance requested while fragments are queued attaches to the
/// last of them, so bytes queued before the boundary always leave under the
/// old epoch.
#[derive(Debug, Default)]
pub(crate) struct FragmentQueue {
    entries: VecDeque<Entry>,
    /// Epoch of the next fragment to drain.
    epoch: u16,
    /// Epoch the next queued fragment is tagged with.
    tail_epoch: u16,
}

impl FragmentQueue {
    pub fn push(&mut self, content_type: ContentType, data: Vec<u8>) {
        self.entries.push_back(Entry {
            fragment: Fragment {
                content_type,
                epoch: self.tail_epoch,
                data,
            },
            advances: 0,
        });
    }

    pub fn advance_epoch(&mut self) {
        self.tail_epoch += 1;
        match self.entries.back_mut() {
            Some(last) => last.advances += 1,
            None => self.epoch += 1,
        }
    }

    pub fn pop(&mut self) -> Option<Fragment> {
        let entry = self.entries.pop_front()?;
        self.epoch += entry.advances;
        Some(entry.fragment)
    }

    pub fn front(&self) -> Option<&Fragment> {
        self.entries.front().map(|e| &e.fragment)
    }

    pub fn epoch(&self) -> u16 {
        self.epoch
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.epoch = self.tail_epoch;
    }
}

/// Close progress of the outbound side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseState {
    Open,
    /// Closed by the caller, queued fragments still draining.
    ClosePending,
    Closed,
}

#[derive(Debug)]
struct Outbound {
    queue: FragmentQueue,
    state: CloseState,
    fatal: Option<Alert>,
    /// Set by `close()`; alerts raised afterwards are discarded even while
    /// close_notify is still queued.
    close_requested: bool,
    max_fragment: usize,
}

/// Outbound fragment queue together with its alert and close state.
///
/// Every operation takes the same lock, so a close racing a send cannot
/// interleave into the queue.
#[derive(Debug)]
pub struct OutboundRecord {
    inner: Mutex<Outbound>,
}

impl Default for OutboundRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundRecord {
    pub fn new() -> Self {
        OutboundRecord {
            inner: Mutex::new(Outbound {
                queue: FragmentQueue::default(),
                state: CloseState::Open,
                fatal: None,
                close_requested: false,
                max_fragment: MAX_FRAGMENT_LEN,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Outbound> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Limit outbound fragments to a negotiated max fragment length.
    pub fn set_max_fragment_length(&self, len: usize) {
        self.lock().max_fragment = len.clamp(1, MAX_FRAGMENT_LEN);
    }

    /// Queue handshake bytes under the current epoch, split to fragment size.
    pub fn queue_handshake(&self, bytes: &[u8]) -> Result<(), Error> {
        self.queue_data(ContentType::Handshake, bytes)
    }

    pub fn queue_application_data(&self, bytes: &[u8]) -> Result<(), Error> {
        self.queue_data(ContentType::ApplicationData, bytes)
    }

    pub fn queue_change_cipher_spec(&self) -> Result<(), Error> {
        let mut out = self.lock();
        out.ensure_open()?;
        out.queue.push(ContentType::ChangeCipherSpec, vec![1]);
        Ok(())
    }

    fn queue_data(&self, content_type: ContentType, bytes: &[u8]) -> Result<(), Error> {
        let mut out = self.lock();
        out.ensure_open()?;
        let max = out.max_fragment;
        for chunk in bytes.chunks(max) {
            out.queue.push(content_type, chunk.to_vec());
        }
        Ok(())
    }

    /// Switch to the next write epoch once everything queued so far drained.
    pub fn advance_epoch(&self) {
        self.lock().queue.advance_epoch();
    }

    /// Queue a fatal alert.
    ///
    /// Returns false when the alert was dropped: it was a warning, a fatal
    /// alert was already queued, or the connection is closed. A queued fatal
    /// alert closes the outbound side once it drains.
    pub fn encode_alert(&self, alert: Alert) -> bool {
        let mut out = self.lock();
        if out.state == CloseState::Closed || out.close_requested {
            warn!("Discarding {:?} after close", alert);
            return false;
        }
        if alert.level != AlertLevel::Fatal {
            trace!("Not sending warning {:?}", alert.description);
            return false;
        }
        if let Some(first) = out.fatal {
            warn!(
                "Dropping fatal {:?}, {:?} already sent",
                alert.description, first.description
            );
            return false;
        }
        out.fatal = Some(alert);
        out.queue.push(ContentType::Alert, alert.serialize().to_vec());
        out.state = CloseState::ClosePending;
        true
    }

    /// Queue close_notify and close once the queue drains.
    pub fn close(&self) {
        let mut out = self.lock();
        if out.state != CloseState::Open {
            return;
        }
        let notify = Alert::new(AlertLevel::Warning, AlertDescription::CloseNotify);
        out.queue.push(ContentType::Alert, notify.serialize().to_vec());
        out.state = CloseState::ClosePending;
        out.close_requested = true;
        debug!("Close pending, {} fragments queued", out.queue.len());
    }

    /// Close immediately, dropping anything still queued.
    pub fn abort(&self) {
        let mut out = self.lock();
        out.queue.clear();
        out.close_requested = true;
        out.state = CloseState::Closed;
    }

    /// Oldest queued fragment.
    pub fn drain_next(&self) -> Option<Fragment> {
        let mut out = self.lock();
        let fragment = out.queue.pop();
        if out.state == CloseState::ClosePending && out.queue.is_empty() {
            trace!("{:?} -> {:?}", CloseState::ClosePending, CloseState::Closed);
            out.state = CloseState::Closed;
        }
        fragment
    }

    pub fn state(&self) -> CloseState {
        self.lock().state
    }

    /// Epoch of the next fragment to drain.
    pub fn epoch(&self) -> u16 {
        self.lock().queue.epoch()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// The fatal alert queued for this connection, if any.
    pub fn fatal_alert(&self) -> Option<Alert> {
        self.lock().fatal
    }
}

impl Outbound {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.state != CloseState::Open {
            return Err(Error::ProtocolState(format!(
                "send on {:?} connection",
                self.state
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_boundary_waits_for_queued_fragment() {
        let out = OutboundRecord::new();
        out.queue_handshake(b"F1").unwrap();
        out.advance_epoch();
        out.queue_handshake(b"F2").unwrap();
        assert_eq!(out.epoch(), 0);

        let f1 = out.drain_next().unwrap();
        assert_eq!((f1.epoch, f1.data.as_slice()), (0, &b"F1"[..]));
        assert_eq!(out.epoch(), 1);

        let f2 = out.drain_next().unwrap();
        assert_eq!((f2.epoch, f2.data.as_slice()), (1, &b"F2"[..]));

        // Empty queue: takes effect at once.
        out.advance_epoch();
        assert_eq!(out.epoch(), 2);
        out.queue_handshake(b"F3").unwrap();
        assert_eq!(out.drain_next().unwrap().epoch, 2);
    }

    #[test]
    fn double_advance_on_one_fragment() {
        let mut queue = FragmentQueue::default();
        queue.push(ContentType::Handshake, vec![1]);
        queue.advance_epoch();
        queue.advance_epoch();
        queue.push(ContentType::Handshake, vec![2]);
        assert_eq!(queue.pop().unwrap().epoch, 0);
        assert_eq!(queue.epoch(), 2);
        assert_eq!(queue.pop().unwrap().epoch, 2);
    }

    #[test]
    fn close_waits_for_drain() {
        let out = OutboundRecord::new();
        out.queue_handshake(&[1, 2, 3]).unwrap();
        out.close();
        assert_eq!(out.state(), CloseState::ClosePending);
        assert!(out.queue_handshake(&[4]).is_err());

        assert_eq!(out.drain_next().unwrap().content_type, ContentType::Handshake);
        assert_eq!(out.state(), CloseState::ClosePending);
        let notify = out.drain_next().unwrap();
        assert_eq!(notify.content_type, ContentType::Alert);
        assert_eq!(notify.data, vec![1, 0]);
        assert_eq!(out.state(), CloseState::Closed);
        assert!(out.drain_next().is_none());
    }

    #[test]
    fn alert_after_close_is_discarded() {
        let out = OutboundRecord::new();
        out.queue_handshake(b"F1").unwrap();
        out.close();
        assert!(!out.encode_alert(Alert::fatal(AlertDescription::InternalError)));
        assert_eq!(out.fatal_alert(), None);

        let drained: Vec<(ContentType, Vec<u8>)> = std::iter::from_fn(|| out.drain_next())
            .map(|f| (f.content_type, f.data))
            .collect();
        assert_eq!(
            drained,
            vec![
                (ContentType::Handshake, b"F1".to_vec()),
                (ContentType::Alert, vec![1, 0]),
            ]
        );
        assert_eq!(out.state(), CloseState::Closed);
    }

    #[test]
    fn fatal_alert_before_close_still_drains() {
        let out = OutboundRecord::new();
        out.queue_handshake(b"F1").unwrap();
        assert!(out.encode_alert(Alert::fatal(AlertDescription::DecodeError)));
        out.close();

        assert_eq!(out.drain_next().unwrap().data, b"F1".to_vec());
        assert_eq!(out.drain_next().unwrap().data, vec![2, 50]);
        assert!(out.drain_next().is_none());
        assert_eq!(out.state(), CloseState::Closed);
    }

    #[test]
    fn first_fatal_alert_wins() {
        let out = OutboundRecord::new();
        let warning = Alert::new(AlertLevel::Warning, AlertDescription::UserCanceled);
        assert!(!out.encode_alert(warning));
        assert!(out.is_empty());

        assert!(out.encode_alert(Alert::fatal(AlertDescription::DecodeError)));
        assert!(!out.encode_alert(Alert::fatal(AlertDescription::InternalError)));
        assert_eq!(
            out.fatal_alert().map(|a| a.description),
            Some(AlertDescription::DecodeError)
        );

        assert_eq!(out.drain_next().unwrap().data, vec![2, 50]);
        assert_eq!(out.state(), CloseState::Closed);
        assert!(!out.encode_alert(Alert::fatal(AlertDescription::HandshakeFailure)));
        assert!(out.drain_next().is_none());
    }

    #[test]
    fn large_messages_are_split() {
        let out = OutboundRecord::new();
        out.set_max_fragment_length(512);
        out.queue_handshake(&[7u8; 1100]).unwrap();
        let sizes: Vec<usize> = std::iter::from_fn(|| out.drain_next())
            .map(|f| f.data.len())
            .collect();
        assert_eq!(sizes, vec![512, 512, 76]);
    }
}
