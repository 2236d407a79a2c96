use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::{client, frame, server, HandshakeType, PostHandshakeContext, Role, HEADER_LEN};
use crate::crypto::{
    legacy, Credentials, Direction, KeyBlock, KeySchedule, Possession, Secret, SecretStage,
    TrafficSecret, Transcript,
};
use crate::negotiation::Negotiated;
use crate::session::Session;
use crate::types::{CipherSuite, HashAlgorithm, NamedGroup, ProtocolVersion, Random};
use crate::{Config, Error, FatalError};

/// Consumer of one handshake message: `(context, body, framed message)`.
///
/// The framed bytes are what the consumer adds to the transcript, at the
/// point the protocol requires.
pub(crate) type MessageConsumer = fn(&mut HandshakeContext, &[u8], &[u8]) -> Result<(), Error>;

/// Lifecycle of a [`HandshakeContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Active,
    Finished,
    PostHandshake,
    Closed,
}

/// One instruction for the record layer, in the order it must be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A framed handshake message.
    Handshake(Vec<u8>),
    /// TLS 1.2 ChangeCipherSpec.
    ChangeCipherSpec,
    /// Everything queued after this goes out under the next write epoch.
    AdvanceEpoch,
}

/// Key material handed to the record protection collaborator.
#[derive(Debug)]
pub enum ExportedKeys {
    Tls13(TrafficSecret),
    Tls12(KeyBlock),
}

/// Per-connection handshake state.
///
/// Owns everything one handshake needs: negotiated parameters, the local
/// key exchange possessions, the transcript, the key schedule and the table
/// of message types valid right now. The table is replaced after every
/// message, so it only ever holds what the current phase may receive.
pub struct HandshakeContext {
    pub(crate) state: HandshakeState,
    pub(crate) role: Role,
    pub(crate) config: Arc<Config>,
    consumers: Vec<(HandshakeType, MessageConsumer)>,

    pub(crate) version: Option<ProtocolVersion>,
    pub(crate) suite: Option<CipherSuite>,
    pub(crate) group: Option<NamedGroup>,

    /// Local key exchange secrets, in offer order.
    pub(crate) possessions: Vec<Possession>,
    /// Peer key exchange material, in the order it was received.
    pub(crate) credentials: Vec<Credentials>,

    pub(crate) transcript: Transcript,
    pub(crate) negotiated: Negotiated,

    pub(crate) client_random: Random,
    pub(crate) server_random: Random,
    pub(crate) session_id: Vec<u8>,

    pub(crate) key_schedule: Option<KeySchedule>,
    /// TLS 1.2 master secret.
    pub(crate) master_secret: Option<Secret>,
    pub(crate) client_handshake_secret: Option<Secret>,
    pub(crate) server_handshake_secret: Option<Secret>,
    pub(crate) client_application_secret: Option<Secret>,
    pub(crate) server_application_secret: Option<Secret>,
    pub(crate) exporter_master: Option<Secret>,
    pub(crate) resumption_master: Option<Secret>,

    /// Whether a TLS 1.2 ChangeCipherSpec is valid next.
    pub(crate) expect_change_cipher_spec: bool,
    pub(crate) peer_change_cipher_spec: bool,

    pub(crate) read_epoch: u16,
    pub(crate) write_epoch: u16,
    pub(crate) outbox: VecDeque<Outgoing>,
    pub(crate) exported: VecDeque<ExportedKeys>,
}

impl HandshakeContext {
    fn new(role: Role, config: Arc<Config>) -> Self {
        HandshakeContext {
            state: HandshakeState::Active,
            role,
            config,
            consumers: Vec::new(),
            version: None,
            suite: None,
            group: None,
            possessions: Vec::new(),
            credentials: Vec::new(),
            transcript: Transcript::new(),
            negotiated: Negotiated::default(),
            client_random: Random([0; 32]),
            server_random: Random([0; 32]),
            session_id: Vec::new(),
            key_schedule: None,
            master_secret: None,
            client_handshake_secret: None,
            server_handshake_secret: None,
            client_application_secret: None,
            server_application_secret: None,
            exporter_master: None,
            resumption_master: None,
            expect_change_cipher_spec: false,
            peer_change_cipher_spec: false,
            read_epoch: 0,
            write_epoch: 0,
            outbox: VecDeque::new(),
            exported: VecDeque::new(),
        }
    }

    /// Start a client handshake. The ClientHello is queued immediately.
    pub fn client(config: Arc<Config>) -> Result<Self, Error> {
        let mut ctx = Self::new(Role::Client, config);
        client::start(&mut ctx)?;
        Ok(ctx)
    }

    /// Start a server handshake, waiting for a ClientHello.
    pub fn server(config: Arc<Config>) -> Self {
        let mut ctx = Self::new(Role::Server, config);
        ctx.expect(&[(HandshakeType::ClientHello, server::on_client_hello)]);
        ctx
    }

    /// Feed one complete, framed handshake message.
    ///
    /// This is where every failure becomes an alert. Any error closes the
    /// context and wipes its secrets.
    pub fn dispatch(&mut self, msg_type: HandshakeType, raw: &[u8]) -> Result<(), FatalError> {
        if self.state != HandshakeState::Active {
            let state = self.state;
            return Err(self.fail(Error::ProtocolState(format!(
                "{:?} received in state {:?}",
                msg_type, state
            ))));
        }

        let consumer = self
            .consumers
            .iter()
            .find(|(t, _)| *t == msg_type)
            .map(|(_, c)| *c);
        let Some(consumer) = consumer else {
            return Err(self.fail(Error::UnsupportedOperation(format!(
                "unexpected {:?}",
                msg_type
            ))));
        };

        if raw.len() < HEADER_LEN {
            return Err(self.fail(Error::WireFormat(format!(
                "{:?} shorter than its header",
                msg_type
            ))));
        }
        let body = &raw[HEADER_LEN..];
        trace!("Dispatch {:?} ({} bytes)", msg_type, body.len());

        if let Err(e) = consumer(self, body, raw) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Peer ChangeCipherSpec (TLS 1.2 only).
    pub fn change_cipher_spec(&mut self) -> Result<(), FatalError> {
        let valid = self.state == HandshakeState::Active
            && self.version == Some(ProtocolVersion::TLS1_2)
            && self.expect_change_cipher_spec;
        if !valid {
            return Err(self.fail(Error::UnsupportedOperation(
                "unexpected change_cipher_spec".into(),
            )));
        }
        self.expect_change_cipher_spec = false;
        self.peer_change_cipher_spec = true;
        self.advance_read_epoch();
        Ok(())
    }

    /// Next instruction for the record layer.
    pub fn poll_outgoing(&mut self) -> Option<Outgoing> {
        self.outbox.pop_front()
    }

    /// Next key material for record protection.
    pub fn take_traffic_keys(&mut self) -> Option<ExportedKeys> {
        self.exported.pop_front()
    }

    /// Abort the handshake. Wipes all secrets; idempotent.
    pub fn close(&mut self) {
        if self.state == HandshakeState::Closed {
            return;
        }
        trace!("{:?} -> {:?}", self.state, HandshakeState::Closed);
        self.state = HandshakeState::Closed;
        self.consumers.clear();
        self.wipe_handshake_secrets();
        for secret in [
            &mut self.master_secret,
            &mut self.client_application_secret,
            &mut self.server_application_secret,
            &mut self.exporter_master,
            &mut self.resumption_master,
        ] {
            if let Some(mut s) = secret.take() {
                s.wipe();
            }
        }
    }

    /// Turn a completed handshake into its post-handshake context.
    pub fn into_post_handshake(self) -> Result<PostHandshakeContext, Error> {
        PostHandshakeContext::from_handshake(self)
    }

    pub(crate) fn fail(&mut self, cause: Error) -> FatalError {
        let fatal = FatalError::from(cause);
        warn!(
            "Handshake failed ({:?}), sending {:?}: {}",
            self.role, fatal.alert, fatal.cause
        );
        self.close();
        fatal
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == HandshakeState::Finished
    }

    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    pub fn suite(&self) -> Option<CipherSuite> {
        self.suite
    }

    /// Group of the completed key exchange.
    pub fn group(&self) -> Option<NamedGroup> {
        self.group
    }

    pub fn alpn(&self) -> Option<&[u8]> {
        self.negotiated.alpn.as_deref()
    }

    /// Host name the client asked for, as seen by this side.
    pub fn server_name(&self) -> Option<&str> {
        match self.role {
            Role::Client => self.config.server_name(),
            Role::Server => self.negotiated.server_name.as_deref(),
        }
    }

    pub fn max_fragment_length(&self) -> Option<usize> {
        self.negotiated
            .max_fragment_length
            .map(|m| m.fragment_size())
    }

    pub fn extended_master_secret(&self) -> bool {
        self.negotiated.extended_master_secret
    }

    /// Whether the client asked for OCSP stapling.
    pub fn status_requested(&self) -> bool {
        self.negotiated.status_request
    }

    /// Raw QUIC transport parameters of the peer.
    pub fn peer_transport_parameters(&self) -> Option<&[u8]> {
        self.negotiated
            .peer_transport_parameters
            .as_ref()
            .map(|p| p.as_bytes())
    }

    /// Epoch of the next record expected from the peer.
    pub fn read_epoch(&self) -> u16 {
        self.read_epoch
    }

    pub fn write_epoch(&self) -> u16 {
        self.write_epoch
    }

    pub(crate) fn expect(&mut self, table: &[(HandshakeType, MessageConsumer)]) {
        self.consumers = table.to_vec();
        trace!(
            "Expecting {:?}",
            self.consumers.iter().map(|(t, _)| *t).collect::<Vec<_>>()
        );
    }

    /// Frame, add to the transcript and queue.
    pub(crate) fn send(&mut self, msg_type: HandshakeType, body: &[u8]) -> Result<(), Error> {
        let raw = frame(msg_type, body)?;
        self.transcript.update(&raw);
        trace!(
            "Queue {:?} ({} bytes, epoch {})",
            msg_type,
            body.len(),
            self.write_epoch
        );
        self.outbox.push_back(Outgoing::Handshake(raw));
        Ok(())
    }

    pub(crate) fn send_change_cipher_spec(&mut self) {
        self.outbox.push_back(Outgoing::ChangeCipherSpec);
    }

    pub(crate) fn advance_write_epoch(&mut self) {
        self.write_epoch += 1;
        debug!("{:?} write epoch {}", self.role, self.write_epoch);
        self.outbox.push_back(Outgoing::AdvanceEpoch);
    }

    pub(crate) fn advance_read_epoch(&mut self) {
        self.read_epoch += 1;
        debug!("{:?} read epoch {}", self.role, self.read_epoch);
    }

    pub(crate) fn hash(&self) -> Result<HashAlgorithm, Error> {
        self.suite
            .and_then(|s| s.hash_algorithm())
            .ok_or_else(|| Error::Internal("no cipher suite negotiated".into()))
    }

    pub(crate) fn negotiated_suite(&self) -> Result<CipherSuite, Error> {
        self.suite
            .ok_or_else(|| Error::Internal("no cipher suite negotiated".into()))
    }

    pub(crate) fn negotiated_version(&self) -> Result<ProtocolVersion, Error> {
        self.version
            .ok_or_else(|| Error::Internal("no protocol version negotiated".into()))
    }

    /// Publish a copy of a TLS 1.3 traffic secret.
    pub(crate) fn export_traffic(
        &mut self,
        epoch: u16,
        direction: Direction,
        secret: &Secret,
    ) -> Result<(), Error> {
        let suite = self.negotiated_suite()?;
        trace!("Export {:?} traffic secret for epoch {}", direction, epoch);
        self.exported.push_back(ExportedKeys::Tls13(TrafficSecret {
            epoch,
            direction,
            suite,
            secret: secret.duplicate(SecretStage::Traffic),
        }));
        Ok(())
    }

    pub(crate) fn export_key_block(&mut self, block: KeyBlock) {
        trace!("Export key block for {:?}", block.suite);
        self.exported.push_back(ExportedKeys::Tls12(block));
    }

    /// TLS 1.2: premaster secret to master secret and key block.
    ///
    /// The extended master secret hashes the transcript as it stands, so
    /// this runs right after the ClientKeyExchange entered it.
    pub(crate) fn install_master_secret(&mut self, premaster: Secret) -> Result<(), Error> {
        let hash = self.hash()?;
        let suite = self.negotiated_suite()?;
        let master = if self.negotiated.extended_master_secret {
            let session_hash = self.transcript.current_hash()?;
            legacy::extended_master_secret(hash, premaster, &session_hash)?
        } else {
            legacy::master_secret(hash, premaster, &self.client_random, &self.server_random)?
        };
        let block = legacy::key_block(
            hash,
            &master,
            suite,
            &self.client_random,
            &self.server_random,
        )?;
        self.export_key_block(block);
        self.master_secret = Some(master);
        Ok(())
    }

    /// TLS 1.2 Finished `verify_data` over the transcript as it stands.
    pub(crate) fn legacy_verify_data(&self, client: bool) -> Result<Vec<u8>, Error> {
        let hash = self.hash()?;
        let master = self
            .master_secret
            .as_ref()
            .ok_or_else(|| Error::Internal("no master secret".into()))?;
        let transcript_hash = self.transcript.current_hash()?;
        legacy::finished_verify_data(hash, master, client, &transcript_hash)
    }

    /// Active -> Finished. Drops the key exchange material and every
    /// secret only the handshake itself needs.
    pub(crate) fn complete(&mut self) {
        self.consumers.clear();
        self.wipe_handshake_secrets();
        trace!("{:?} -> {:?}", self.state, HandshakeState::Finished);
        self.state = HandshakeState::Finished;
        debug!(
            "{:?} handshake complete: {:?} {:?} group {:?} alpn {:?}",
            self.role,
            self.version,
            self.suite,
            self.group,
            self.negotiated.alpn.as_deref().map(String::from_utf8_lossy)
        );
    }

    fn wipe_handshake_secrets(&mut self) {
        self.possessions.clear();
        self.credentials.clear();
        if let Some(mut schedule) = self.key_schedule.take() {
            schedule.wipe();
        }
        for secret in [
            &mut self.client_handshake_secret,
            &mut self.server_handshake_secret,
        ] {
            if let Some(mut s) = secret.take() {
                s.wipe();
            }
        }
    }

    /// Store a completed TLS 1.2 session in the configured cache.
    pub(crate) fn store_session(&mut self) -> Result<(), Error> {
        let Some(cache) = self.config.session_cache().cloned() else {
            return Ok(());
        };
        let master = self
            .master_secret
            .as_ref()
            .ok_or_else(|| Error::Internal("no master secret to store".into()))?;
        let peer = match self.role {
            Role::Client => self
                .config
                .server_name()
                .map(|host| (host.to_string(), self.config.peer_port())),
            Role::Server => None,
        };
        let session = Session {
            id: self.session_id.clone(),
            peer,
            version: self.negotiated_version()?,
            suite: self.negotiated_suite()?,
            secret: master.duplicate(SecretStage::Master),
            alpn: self.negotiated.alpn.clone(),
            extended_master_secret: self.negotiated.extended_master_secret,
            ticket: None,
            ticket_age_add: 0,
            lifetime: None,
            created: Instant::now(),
        };
        debug!("Storing session ({} byte id)", session.id.len());
        cache.put(Arc::new(session));
        Ok(())
    }
}

impl fmt::Debug for HandshakeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeContext")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("suite", &self.suite)
            .field("group", &self.group)
            .field("read_epoch", &self.read_epoch)
            .field("write_epoch", &self.write_epoch)
            .field("possessions", &self.possessions.len())
            .finish()
    }
}

impl Drop for HandshakeContext {
    fn drop(&mut self) {
        self.wipe_handshake_secrets();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDescription;

    fn client() -> HandshakeContext {
        HandshakeContext::client(Arc::new(Config::default())).unwrap()
    }

    #[test]
    fn client_queues_hello() {
        let mut ctx = client();
        let Some(Outgoing::Handshake(raw)) = ctx.poll_outgoing() else {
            panic!("no ClientHello queued");
        };
        assert_eq!(raw[0], HandshakeType::ClientHello.as_u8());
        assert!(ctx.poll_outgoing().is_none());
        assert_eq!(ctx.state(), HandshakeState::Active);
        assert!(!ctx.possessions.is_empty());
    }

    #[test]
    fn unexpected_message_closes() {
        let mut ctx = client();
        let raw = frame(HandshakeType::Finished, &[0; 32]).unwrap();
        let err = ctx.dispatch(HandshakeType::Finished, &raw).unwrap_err();
        assert_eq!(err.alert, AlertDescription::UnexpectedMessage);
        assert_eq!(ctx.state(), HandshakeState::Closed);
        assert!(ctx.possessions.is_empty());

        // Closed stays closed.
        let err = ctx.dispatch(HandshakeType::Finished, &raw).unwrap_err();
        assert_eq!(err.alert, AlertDescription::UnexpectedMessage);
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let mut ctx = client();
        let raw = frame(HandshakeType::ServerHello, &[3, 3, 0]).unwrap();
        let err = ctx.dispatch(HandshakeType::ServerHello, &raw).unwrap_err();
        assert_eq!(err.alert, AlertDescription::DecodeError);
    }

    #[test]
    fn change_cipher_spec_outside_tls12() {
        let mut ctx = client();
        let err = ctx.change_cipher_spec().unwrap_err();
        assert_eq!(err.alert, AlertDescription::UnexpectedMessage);
        assert_eq!(ctx.state(), HandshakeState::Closed);
    }

    #[test]
    fn server_rejects_anything_but_client_hello() {
        let mut ctx = HandshakeContext::server(Arc::new(Config::default()));
        let raw = frame(HandshakeType::KeyUpdate, &[0]).unwrap();
        let err = ctx.dispatch(HandshakeType::KeyUpdate, &raw).unwrap_err();
        assert_eq!(err.alert, AlertDescription::UnexpectedMessage);
    }
}
