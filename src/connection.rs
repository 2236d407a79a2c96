use std::io;
use std::sync::Arc;

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::handshake::{
    ExportedKeys, HandshakeContext, HandshakeState, MessageAssembler, Outgoing,
    PostHandshakeContext,
};
use crate::record::{CloseState, ContentType, InboundRecord, OutboundRecord};
use crate::transport::Transport;
use crate::types::{CipherSuite, ProtocolVersion};
use crate::{Config, Error, FatalError};

enum Phase {
    Handshaking(HandshakeContext),
    Established(PostHandshakeContext),
    Failed,
}

/// A TLS endpoint over a record [`Transport`].
///
/// Drives the handshake, then carries application data. Record protection
/// is left to the transport side: keys for it come out of
/// [`Connection::take_traffic_keys`].
pub struct Connection<T: Transport> {
    transport: T,
    phase: Phase,
    outbound: OutboundRecord,
    inbound: InboundRecord,
    assembler: MessageAssembler,
    peer_closed: bool,
}

/// What one attempt to read a record produced.
enum ReadOutcome {
    Record,
    WouldBlock,
    Eof,
}

impl<T: Transport> Connection<T> {
    /// Start a client handshake. The ClientHello is written right away.
    pub fn client(config: Arc<Config>, transport: T) -> Result<Self, Error> {
        if config.is_quic() {
            return Err(Error::Config("QUIC configuration on a TLS connection".into()));
        }
        let handshake = HandshakeContext::client(config)?;
        let mut conn = Connection::new(Phase::Handshaking(handshake), transport);
        conn.pump()?;
        conn.flush()?;
        Ok(conn)
    }

    /// Wait for a ClientHello.
    pub fn server(config: Arc<Config>, transport: T) -> Result<Self, Error> {
        if config.is_quic() {
            return Err(Error::Config("QUIC configuration on a TLS connection".into()));
        }
        let handshake = HandshakeContext::server(config);
        Ok(Connection::new(Phase::Handshaking(handshake), transport))
    }

    fn new(phase: Phase, transport: T) -> Self {
        Connection {
            transport,
            phase,
            outbound: OutboundRecord::new(),
            inbound: InboundRecord::new(),
            assembler: MessageAssembler::new(),
            peer_closed: false,
        }
    }

    /// Read and handle records until the transport has nothing more or
    /// application data is waiting to be read.
    pub fn process(&mut self) -> Result<(), FatalError> {
        while self.inbound.available() == 0 && self.is_readable() {
            match self.read_one()? {
                ReadOutcome::Record => {}
                ReadOutcome::WouldBlock | ReadOutcome::Eof => break,
            }
        }
        Ok(())
    }

    /// Drive the handshake to completion over a blocking transport.
    pub fn complete_handshake(&mut self) -> Result<(), FatalError> {
        while !self.is_handshake_complete() {
            if !self.is_readable() {
                return Err(self.abort(Error::ProtocolState(
                    "connection closed during handshake".into(),
                )));
            }
            if let ReadOutcome::Eof = self.read_one()? {
                return Err(self.abort(Error::ProtocolState(
                    "end of stream during handshake".into(),
                )));
            }
        }
        Ok(())
    }

    /// Read application data.
    ///
    /// Returns buffered data of the current record without touching the
    /// transport. Otherwise reads records until one carries application
    /// data. `Ok(0)` means the peer closed or the transport would block.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FatalError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.inbound.available() > 0 {
                return Ok(self.inbound.read(buf));
            }
            if !self.is_readable() {
                return Ok(0);
            }
            match self.read_one()? {
                ReadOutcome::Record => {}
                ReadOutcome::WouldBlock | ReadOutcome::Eof => return Ok(0),
            }
        }
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>, FatalError> {
        let mut byte = [0u8; 1];
        Ok(match self.read(&mut byte)? {
            0 => None,
            _ => Some(byte[0]),
        })
    }

    /// Send application data. Only valid once the handshake completed.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        if !matches!(self.phase, Phase::Established(_)) {
            return Err(Error::ProtocolState(
                "application data before the handshake completed".into(),
            ));
        }
        self.outbound.queue_application_data(data)?;
        self.flush()
    }

    /// Update our TLS 1.3 traffic keys, optionally asking the peer to follow.
    pub fn key_update(&mut self, request_peer: bool) -> Result<(), Error> {
        self.established()?.key_update(request_peer)?;
        self.pump()?;
        self.flush()
    }

    /// Issue a session ticket (TLS 1.3 server).
    pub fn send_new_session_ticket(&mut self) -> Result<(), Error> {
        self.established()?.send_new_session_ticket()?;
        self.pump()?;
        self.flush()
    }

    pub fn export_keying_material(
        &mut self,
        label: &str,
        context: Option<&[u8]>,
        len: usize,
    ) -> Result<Vec<u8>, Error> {
        self.established()?
            .export_keying_material(label, context, len)
    }

    /// Next key material for record protection.
    pub fn take_traffic_keys(&mut self) -> Option<ExportedKeys> {
        match &mut self.phase {
            Phase::Handshaking(ctx) => ctx.take_traffic_keys(),
            Phase::Established(ctx) => ctx.take_traffic_keys(),
            Phase::Failed => None,
        }
    }

    /// Send close_notify after anything still queued and wipe the keys.
    pub fn close(&mut self) -> Result<(), Error> {
        self.outbound.close();
        let flushed = self.flush();
        match &mut self.phase {
            Phase::Handshaking(ctx) => ctx.close(),
            Phase::Established(ctx) => ctx.close(),
            Phase::Failed => {}
        }
        flushed
    }

    pub fn is_handshake_complete(&self) -> bool {
        matches!(self.phase, Phase::Established(_))
    }

    pub fn is_peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn close_state(&self) -> CloseState {
        self.outbound.state()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        match &self.phase {
            Phase::Handshaking(ctx) => ctx.state(),
            Phase::Established(ctx) => ctx.state(),
            Phase::Failed => HandshakeState::Closed,
        }
    }

    pub fn version(&self) -> Option<ProtocolVersion> {
        match &self.phase {
            Phase::Handshaking(ctx) => ctx.version(),
            Phase::Established(ctx) => Some(ctx.version()),
            Phase::Failed => None,
        }
    }

    pub fn suite(&self) -> Option<CipherSuite> {
        match &self.phase {
            Phase::Handshaking(ctx) => ctx.suite(),
            Phase::Established(ctx) => Some(ctx.suite()),
            Phase::Failed => None,
        }
    }

    pub fn alpn(&self) -> Option<&[u8]> {
        match &self.phase {
            Phase::Handshaking(ctx) => ctx.alpn(),
            Phase::Established(ctx) => ctx.alpn(),
            Phase::Failed => None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn is_readable(&self) -> bool {
        !self.peer_closed
            && !matches!(self.phase, Phase::Failed)
            && self.handshake_state() != HandshakeState::Closed
    }

    fn established(&mut self) -> Result<&mut PostHandshakeContext, Error> {
        match &mut self.phase {
            Phase::Established(ctx) => Ok(ctx),
            _ => Err(Error::ProtocolState("handshake not complete".into())),
        }
    }

    fn read_one(&mut self) -> Result<ReadOutcome, FatalError> {
        let record = match self.transport.read_record() {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("Transport reached end of stream");
                self.peer_closed = true;
                return Ok(ReadOutcome::Eof);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::WouldBlock),
            Err(e) => return Err(self.abort(Error::Io(e))),
        };
        match self.handle_record(&record) {
            Ok(()) => {}
            Err(Failure::Local(cause)) => return Err(self.abort(cause)),
            Err(Failure::Dispatch(fatal)) => return Err(self.abort_fatal(fatal)),
            Err(Failure::Peer(fatal)) => {
                self.outbound.abort();
                self.shutdown_phase();
                return Err(fatal);
            }
        }
        if let Err(e) = self.pump().and_then(|_| self.flush()) {
            return Err(self.abort(e));
        }
        Ok(ReadOutcome::Record)
    }

    fn handle_record(&mut self, record: &[u8]) -> Result<(), Failure> {
        let content_type = self.inbound.accept(record)?;
        trace!("Received {:?} record ({} bytes)", content_type, self.inbound.available());
        match content_type {
            ContentType::Handshake => {
                let payload = self.inbound.consume().to_vec();
                if payload.is_empty() {
                    return Err(Error::WireFormat("empty handshake record".into()).into());
                }
                self.assembler.push(&payload);
                self.handle_messages()
            }
            ContentType::ChangeCipherSpec => {
                let payload = self.inbound.consume().to_vec();
                if payload != [1] {
                    return Err(Error::WireFormat("malformed change_cipher_spec".into()).into());
                }
                if !self.assembler.is_empty() {
                    return Err(Error::ProtocolState(
                        "change_cipher_spec inside a handshake message".into(),
                    )
                    .into());
                }
                match &mut self.phase {
                    Phase::Handshaking(ctx) => ctx.change_cipher_spec().map_err(Failure::Dispatch),
                    _ => Err(Error::ProtocolState(
                        "change_cipher_spec after the handshake".into(),
                    )
                    .into()),
                }
            }
            ContentType::Alert => {
                let payload = self.inbound.consume().to_vec();
                let (rest, alert) = Alert::parse(&payload)?;
                if !rest.is_empty() {
                    return Err(Error::WireFormat("alert record longer than one alert".into()).into());
                }
                self.handle_alert(alert)
            }
            ContentType::ApplicationData => {
                if !matches!(self.phase, Phase::Established(_)) {
                    self.inbound.consume();
                    return Err(Error::ProtocolState(
                        "application data before the handshake completed".into(),
                    )
                    .into());
                }
                Ok(())
            }
            ContentType::Unknown(value) => {
                self.inbound.consume();
                Err(Error::UnsupportedOperation(format!("record content type {}", value)).into())
            }
        }
    }

    fn handle_messages(&mut self) -> Result<(), Failure> {
        while let Some((msg_type, raw)) = self.assembler.next_message()? {
            match &mut self.phase {
                Phase::Handshaking(ctx) => {
                    let epoch = ctx.read_epoch();
                    ctx.dispatch(msg_type, &raw).map_err(Failure::Dispatch)?;
                    if ctx.read_epoch() != epoch && !self.assembler.is_empty() {
                        return Err(Error::ProtocolState(
                            "handshake data across a key change".into(),
                        )
                        .into());
                    }
                    self.inbound.set_max_fragment_length(ctx.max_fragment_length());
                    if let Some(len) = ctx.max_fragment_length() {
                        self.outbound.set_max_fragment_length(len);
                    }
                    if ctx.is_finished() {
                        self.finish_handshake()?;
                    }
                }
                Phase::Established(ctx) => {
                    ctx.dispatch(msg_type, &raw).map_err(Failure::Dispatch)?;
                }
                Phase::Failed => {
                    return Err(Error::ProtocolState("connection failed".into()).into());
                }
            }
        }
        Ok(())
    }

    fn finish_handshake(&mut self) -> Result<(), Failure> {
        let Phase::Handshaking(mut ctx) = std::mem::replace(&mut self.phase, Phase::Failed) else {
            return Err(Error::Internal("not handshaking".into()).into());
        };
        // Messages the final step queued go out before anything post-handshake.
        while let Some(out) = ctx.poll_outgoing() {
            queue_outgoing(&self.outbound, out)?;
        }
        let post = ctx.into_post_handshake()?;
        debug!(
            "Handshake complete: {} {:?}",
            post.version(),
            post.suite()
        );
        self.phase = Phase::Established(post);
        Ok(())
    }

    fn handle_alert(&mut self, alert: Alert) -> Result<(), Failure> {
        match (alert.level, alert.description) {
            (_, AlertDescription::CloseNotify) => {
                debug!("Peer sent close_notify");
                self.peer_closed = true;
                Ok(())
            }
            (AlertLevel::Warning, description) => {
                debug!("Ignoring warning alert {:?}", description);
                Ok(())
            }
            (_, description) => {
                debug!("Peer sent fatal alert {:?}", description);
                Err(Failure::Peer(FatalError::from_peer(description)))
            }
        }
    }

    /// Move messages from the active context to the record queue.
    fn pump(&mut self) -> Result<(), Error> {
        match &mut self.phase {
            Phase::Handshaking(ctx) => {
                while let Some(out) = ctx.poll_outgoing() {
                    queue_outgoing(&self.outbound, out)?;
                }
            }
            Phase::Established(ctx) => {
                while let Some(out) = ctx.poll_outgoing() {
                    queue_outgoing(&self.outbound, out)?;
                }
            }
            Phase::Failed => {}
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        while let Some(fragment) = self.outbound.drain_next() {
            trace!(
                "Sending {:?} record, epoch {} ({} bytes)",
                fragment.content_type,
                fragment.epoch,
                fragment.data.len()
            );
            self.transport.write_record(&fragment.to_record()?)?;
        }
        Ok(())
    }

    /// Tear down after a local failure, telling the peer why.
    fn abort(&mut self, cause: Error) -> FatalError {
        self.abort_fatal(FatalError::from(cause))
    }

    fn abort_fatal(&mut self, fatal: FatalError) -> FatalError {
        debug!("Connection failed: {}", fatal);
        self.outbound.encode_alert(Alert::fatal(fatal.alert));
        if let Err(e) = self.flush() {
            debug!("Could not send {:?}: {}", fatal.alert, e);
            self.outbound.abort();
        }
        self.shutdown_phase();
        fatal
    }

    fn shutdown_phase(&mut self) {
        match &mut self.phase {
            Phase::Handshaking(ctx) => ctx.close(),
            Phase::Established(ctx) => ctx.close(),
            Phase::Failed => {}
        }
        self.phase = Phase::Failed;
    }
}

fn queue_outgoing(outbound: &OutboundRecord, out: Outgoing) -> Result<(), Error> {
    match out {
        Outgoing::Handshake(raw) => outbound.queue_handshake(&raw),
        Outgoing::ChangeCipherSpec => outbound.queue_change_cipher_spec(),
        Outgoing::AdvanceEpoch => {
            outbound.advance_epoch();
            Ok(())
        }
    }
}

/// Why handling one record failed.
enum Failure {
    /// Raised here; the alert still has to be chosen.
    Local(Error),
    /// Raised by a handshake context, which already closed itself.
    Dispatch(FatalError),
    /// The peer's own fatal alert. Nothing is sent back.
    Peer(FatalError),
}

impl From<Error> for Failure {
    fn from(value: Error) -> Self {
        Failure::Local(value)
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Failure {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        Failure::Local(value.into())
    }
}
