use super::{max_record_len, ContentType, RecordHeader, RECORD_HEADER_LEN};
use crate::Error;

/// The one record being read.
///
/// Holds a single buffer, reused between records and grown only when a
/// record is larger than any before it. `available` never includes bytes
/// of a record that was not handed over yet.
#[derive(Debug)]
pub struct InboundRecord {
    buffer: Vec<u8>,
    position: usize,
    content_type: Option<ContentType>,
    max_len: usize,
}

impl Default for InboundRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundRecord {
    pub fn new() -> Self {
        InboundRecord {
            buffer: Vec::new(),
            position: 0,
            content_type: None,
            max_len: max_record_len(None),
        }
    }

    /// Lower the accepted record size to a negotiated max fragment length.
    pub fn set_max_fragment_length(&mut self, len: Option<usize>) {
        self.max_len = max_record_len(len);
    }

    /// Take in one whole record (header included).
    ///
    /// The previous record must be consumed first.
    pub fn accept(&mut self, record: &[u8]) -> Result<ContentType, Error> {
        if self.available() > 0 {
            return Err(Error::ProtocolState(format!(
                "{} bytes of the previous record unread",
                self.available()
            )));
        }
        let (body, header) = RecordHeader::parse(record)?;
        let length = header.length as usize;
        if length > self.max_len {
            return Err(Error::ResourceLimit(format!(
                "record of {} bytes, limit {}",
                length, self.max_len
            )));
        }
        if body.len() != length {
            return Err(Error::WireFormat(format!(
                "record declares {} bytes, carries {}",
                length,
                record.len() - RECORD_HEADER_LEN
            )));
        }

        self.buffer.clear();
        if length > self.buffer.capacity() {
            trace!("Growing record buffer to {}", length);
            self.buffer.reserve_exact(length);
        }
        self.buffer.extend_from_slice(body);
        self.position = 0;
        self.content_type = Some(header.content_type);
        Ok(header.content_type)
    }

    /// Type of the current record.
    pub fn content_type(&self) -> Option<ContentType> {
        self.content_type
    }

    /// Unread bytes of the current record.
    pub fn available(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Copy out up to `buf.len()` unread bytes.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.available());
        buf[..n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;
        n
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte) {
            1 => Some(byte[0]),
            _ => None,
        }
    }

    /// All unread bytes of the current record.
    pub fn consume(&mut self) -> &[u8] {
        let start = self.position;
        self.position = self.buffer.len();
        &self.buffer[start..]
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode_record;

    #[test]
    fn reads_within_current_record() {
        let mut inbound = InboundRecord::new();
        let record = encode_record(ContentType::ApplicationData, b"hello").unwrap();
        assert_eq!(inbound.accept(&record).unwrap(), ContentType::ApplicationData);

        assert_eq!(inbound.read_byte(), Some(b'h'));
        let mut buf = [0u8; 16];
        assert_eq!(inbound.read(&mut buf), 4);
        assert_eq!(&buf[..4], b"ello");
        assert_eq!(inbound.available(), 0);
        assert_eq!(inbound.read(&mut buf), 0);
    }

    #[test]
    fn unread_record_blocks_the_next() {
        let mut inbound = InboundRecord::new();
        let record = encode_record(ContentType::ApplicationData, b"ab").unwrap();
        inbound.accept(&record).unwrap();
        assert!(matches!(
            inbound.accept(&record),
            Err(Error::ProtocolState(_))
        ));
        inbound.consume();
        inbound.accept(&record).unwrap();
    }

    #[test]
    fn oversize_record_is_resource_limit() {
        let mut inbound = InboundRecord::new();
        inbound.set_max_fragment_length(Some(512));
        let record = encode_record(ContentType::Handshake, &[0u8; 3000]).unwrap();
        assert!(matches!(
            inbound.accept(&record),
            Err(Error::ResourceLimit(_))
        ));

        let mut inbound = InboundRecord::new();
        let mut header = vec![22, 3, 3];
        header.extend_from_slice(&20000u16.to_be_bytes());
        assert!(matches!(
            inbound.accept(&header),
            Err(Error::ResourceLimit(_))
        ));
    }

    #[test]
    fn length_mismatch_is_wire_format() {
        let mut inbound = InboundRecord::new();
        let mut record = encode_record(ContentType::Handshake, &[1, 2, 3]).unwrap();
        record.pop();
        assert!(matches!(inbound.accept(&record), Err(Error::WireFormat(_))));
    }

    #[test]
    fn buffer_grows_only_when_needed() {
        let mut inbound = InboundRecord::new();
        inbound
            .accept(&encode_record(ContentType::Handshake, &[0u8; 1000]).unwrap())
            .unwrap();
        inbound.consume();
        let capacity = inbound.capacity();
        assert!(capacity >= 1000);

        inbound
            .accept(&encode_record(ContentType::Handshake, &[0u8; 10]).unwrap())
            .unwrap();
        assert_eq!(inbound.capacity(), capacity);
    }
}
