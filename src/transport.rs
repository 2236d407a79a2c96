//! Record transport collaborator.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

/// Delivers whole TLS records.
///
/// `read_record` blocks until a record is available and returns `None` at
/// end of stream.
pub trait Transport: Send {
    fn read_record(&mut self) -> io::Result<Option<Vec<u8>>>;

    fn write_record(&mut self, record: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct Pipe {
    records: VecDeque<Vec<u8>>,
    closed: bool,
}

/// One end of an in-memory, non-blocking record pipe.
///
/// `read_record` returns `WouldBlock` when nothing is queued and the peer has
/// not closed. Used to run two endpoints against each other in one thread.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    rx: Arc<Mutex<Pipe>>,
    tx: Arc<Mutex<Pipe>>,
}

impl MemoryTransport {
    /// A connected pair.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let a = Arc::new(Mutex::new(Pipe::default()));
        let b = Arc::new(Mutex::new(Pipe::default()));
        (
            MemoryTransport {
                rx: a.clone(),
                tx: b.clone(),
            },
            MemoryTransport { rx: b, tx: a },
        )
    }

    /// Signal end of stream to the peer.
    pub fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
    }

    /// Records queued for this end.
    pub fn pending(&self) -> usize {
        self.rx.lock().unwrap_or_else(|e| e.into_inner()).records.len()
    }
}

impl Transport for MemoryTransport {
    fn read_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut pipe = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        match pipe.records.pop_front() {
            Some(record) => Ok(Some(record)),
            None if pipe.closed => Ok(None),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        let mut pipe = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        if pipe.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        pipe.records.push_back(record.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_delivers_in_order() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.write_record(b"one").unwrap();
        a.write_record(b"two").unwrap();
        assert_eq!(b.pending(), 2);
        assert_eq!(b.read_record().unwrap().unwrap(), b"one");
        assert_eq!(b.read_record().unwrap().unwrap(), b"two");
        let err = b.read_record().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn shutdown_is_end_of_stream() {
        let (a, mut b) = MemoryTransport::pair();
        a.shutdown();
        assert!(b.read_record().unwrap().is_none());
    }
}
