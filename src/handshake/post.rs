use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngCore;

use super::context::{ExportedKeys, HandshakeContext, HandshakeState, Outgoing};
use super::messages::{KeyUpdate, NewSessionTicket};
use super::{frame, HandshakeType, Role, HEADER_LEN};
use crate::buffer::Buf;
use crate::crypto::key_schedule::{self, Direction, TrafficSecret};
use crate::crypto::{legacy, HashAlgorithm, Secret, SecretStage};
use crate::extension::ExtensionList;
use crate::session::Session;
use crate::types::{CipherSuite, ProtocolVersion, Random};
use crate::{Config, Error, FatalError};

/// Longest ticket lifetime a server may announce (RFC 8446 Section 4.6.1).
const MAX_TICKET_LIFETIME: u32 = 604_800;

type PostConsumer = fn(&mut PostHandshakeContext, &[u8]) -> Result<(), Error>;

/// What is left of a handshake once it completed.
///
/// Accepts only KeyUpdate and NewSessionTicket, and only under TLS 1.3.
/// Anything else is fatal.
pub struct PostHandshakeContext {
    state: HandshakeState,
    role: Role,
    config: Arc<Config>,
    version: ProtocolVersion,
    suite: CipherSuite,
    hash: HashAlgorithm,
    consumers: &'static [(HandshakeType, PostConsumer)],

    read_secret: Option<Secret>,
    write_secret: Option<Secret>,
    read_epoch: u16,
    write_epoch: u16,

    exporter_master: Option<Secret>,
    resumption_master: Option<Secret>,
    master_secret: Option<Secret>,
    client_random: Random,
    server_random: Random,
    alpn: Option<Vec<u8>>,
    ticket_count: u64,

    outbox: VecDeque<Outgoing>,
    exported: VecDeque<ExportedKeys>,
}

static CLIENT_TLS13: &[(HandshakeType, PostConsumer)] = &[
    (HandshakeType::KeyUpdate, on_key_update),
    (HandshakeType::NewSessionTicket, on_new_session_ticket),
];

static SERVER_TLS13: &[(HandshakeType, PostConsumer)] =
    &[(HandshakeType::KeyUpdate, on_key_update)];

static CLIENT_QUIC: &[(HandshakeType, PostConsumer)] =
    &[(HandshakeType::NewSessionTicket, on_new_session_ticket)];

/// TLS 1.2 renegotiation is not supported, so nothing is accepted.
static NONE: &[(HandshakeType, PostConsumer)] = &[];

impl PostHandshakeContext {
    pub(crate) fn from_handshake(mut ctx: HandshakeContext) -> Result<Self, Error> {
        if ctx.state != HandshakeState::Finished {
            return Err(Error::ProtocolState(format!(
                "handshake is {:?}, not finished",
                ctx.state
            )));
        }
        let version = ctx.negotiated_version()?;
        let suite = ctx.negotiated_suite()?;
        let hash = ctx.hash()?;
        let quic = ctx.config.is_quic();

        let consumers = match (version, ctx.role, quic) {
            (ProtocolVersion::TLS1_3, Role::Client, false) => CLIENT_TLS13,
            (ProtocolVersion::TLS1_3, Role::Client, true) => CLIENT_QUIC,
            (ProtocolVersion::TLS1_3, Role::Server, false) => SERVER_TLS13,
            _ => NONE,
        };

        let (read_secret, write_secret) = match ctx.role {
            Role::Client => (
                ctx.server_application_secret.take(),
                ctx.client_application_secret.take(),
            ),
            Role::Server => (
                ctx.client_application_secret.take(),
                ctx.server_application_secret.take(),
            ),
        };

        ctx.state = HandshakeState::PostHandshake;
        trace!("{:?} -> {:?}", HandshakeState::Finished, ctx.state);

        Ok(PostHandshakeContext {
            state: HandshakeState::PostHandshake,
            role: ctx.role,
            config: ctx.config.clone(),
            version,
            suite,
            hash,
            consumers,
            read_secret,
            write_secret,
            read_epoch: ctx.read_epoch,
            write_epoch: ctx.write_epoch,
            exporter_master: ctx.exporter_master.take(),
            resumption_master: ctx.resumption_master.take(),
            master_secret: ctx.master_secret.take(),
            client_random: ctx.client_random,
            server_random: ctx.server_random,
            alpn: ctx.negotiated.alpn.take(),
            ticket_count: 0,
            outbox: std::mem::take(&mut ctx.outbox),
            exported: std::mem::take(&mut ctx.exported),
        })
    }

    /// Feed one framed post-handshake message.
    pub fn dispatch(&mut self, msg_type: HandshakeType, raw: &[u8]) -> Result<(), FatalError> {
        if self.state != HandshakeState::PostHandshake {
            let state = self.state;
            return Err(self.fail(Error::ProtocolState(format!(
                "{:?} received in state {:?}",
                msg_type, state
            ))));
        }
        let Some((_, consumer)) = self.consumers.iter().find(|(t, _)| *t == msg_type) else {
            return Err(self.fail(Error::UnsupportedOperation(format!(
                "{:?} after the handshake",
                msg_type
            ))));
        };
        if raw.len() < HEADER_LEN {
            return Err(self.fail(Error::WireFormat(format!(
                "{:?} shorter than its header",
                msg_type
            ))));
        }
        if let Err(e) = consumer(self, &raw[HEADER_LEN..]) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Update our own traffic keys, optionally asking the peer to do the same.
    pub fn key_update(&mut self, request_peer: bool) -> Result<(), Error> {
        if self.state != HandshakeState::PostHandshake {
            return Err(Error::ProtocolState(format!(
                "key update in state {:?}",
                self.state
            )));
        }
        if self.version != ProtocolVersion::TLS1_3 || self.config.is_quic() {
            return Err(Error::UnsupportedOperation(
                "KeyUpdate needs TLS 1.3 over TLS records".into(),
            ));
        }
        self.send_key_update(request_peer)
    }

    /// Issue one session ticket (server, TLS 1.3).
    ///
    /// The ticket is an opaque random identifier. With a session cache
    /// configured, the PSK it stands for is stored under it.
    pub fn send_new_session_ticket(&mut self) -> Result<(), Error> {
        if self.role != Role::Server || self.version != ProtocolVersion::TLS1_3 {
            return Err(Error::UnsupportedOperation(
                "only a TLS 1.3 server issues tickets".into(),
            ));
        }
        if self.state != HandshakeState::PostHandshake {
            return Err(Error::ProtocolState(format!(
                "ticket in state {:?}",
                self.state
            )));
        }
        let resumption_master = self
            .resumption_master
            .as_ref()
            .ok_or_else(|| Error::Internal("no resumption master secret".into()))?;

        let nonce = self.ticket_count.to_be_bytes().to_vec();
        self.ticket_count += 1;
        let mut ticket = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut ticket);
        let age_add = rand::rngs::OsRng.next_u32();
        let lifetime = self
            .config
            .session_ticket_lifetime()
            .as_secs()
            .min(MAX_TICKET_LIFETIME as u64) as u32;

        let psk = key_schedule::resumption_psk(self.hash, resumption_master, &nonce)?;
        if let Some(cache) = self.config.session_cache() {
            cache.put(Arc::new(Session {
                id: ticket.clone(),
                peer: None,
                version: self.version,
                suite: self.suite,
                secret: psk,
                alpn: self.alpn.clone(),
                extended_master_secret: false,
                ticket: Some(ticket.clone()),
                ticket_age_add: age_add,
                lifetime: Some(Duration::from_secs(lifetime as u64)),
                created: Instant::now(),
            }));
        }

        let message = NewSessionTicket {
            lifetime,
            age_add,
            nonce,
            ticket,
            extensions: ExtensionList::new(),
        };
        let mut body = Buf::new();
        message.serialize(&mut body)?;
        self.queue(HandshakeType::NewSessionTicket, &body)?;
        debug!("Issued session ticket ({} s)", lifetime);
        Ok(())
    }

    /// Keying material exporter: RFC 8446 Section 7.5 under TLS 1.3,
    /// RFC 5705 under TLS 1.2.
    pub fn export_keying_material(
        &self,
        label: &str,
        context: Option<&[u8]>,
        len: usize,
    ) -> Result<Vec<u8>, Error> {
        if self.state == HandshakeState::Closed {
            return Err(Error::ProtocolState("exporter after close".into()));
        }
        match self.version {
            ProtocolVersion::TLS1_3 => {
                let exporter = self
                    .exporter_master
                    .as_ref()
                    .ok_or_else(|| Error::Internal("no exporter master secret".into()))?;
                key_schedule::export_keying_material(
                    self.hash,
                    exporter,
                    label.as_bytes(),
                    context.unwrap_or(&[]),
                    len,
                )
            }
            _ => {
                let master = self
                    .master_secret
                    .as_ref()
                    .ok_or_else(|| Error::Internal("no master secret".into()))?;
                legacy::export_keying_material(
                    self.hash,
                    master,
                    &self.client_random,
                    &self.server_random,
                    label,
                    context,
                    len,
                )
            }
        }
    }

    pub fn poll_outgoing(&mut self) -> Option<Outgoing> {
        self.outbox.pop_front()
    }

    pub fn take_traffic_keys(&mut self) -> Option<ExportedKeys> {
        self.exported.pop_front()
    }

    /// Wipe every remaining secret. Idempotent.
    pub fn close(&mut self) {
        if self.state == HandshakeState::Closed {
            return;
        }
        trace!("{:?} -> {:?}", self.state, HandshakeState::Closed);
        self.state = HandshakeState::Closed;
        for secret in [
            &mut self.read_secret,
            &mut self.write_secret,
            &mut self.exporter_master,
            &mut self.resumption_master,
            &mut self.master_secret,
        ] {
            if let Some(mut s) = secret.take() {
                s.wipe();
            }
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn alpn(&self) -> Option<&[u8]> {
        self.alpn.as_deref()
    }

    pub fn read_epoch(&self) -> u16 {
        self.read_epoch
    }

    pub fn write_epoch(&self) -> u16 {
        self.write_epoch
    }

    fn fail(&mut self, cause: Error) -> FatalError {
        let fatal = FatalError::from(cause);
        debug!(
            "Post-handshake failure ({:?}), sending {:?}: {}",
            self.role, fatal.alert, fatal.cause
        );
        self.close();
        fatal
    }

    fn queue(&mut self, msg_type: HandshakeType, body: &[u8]) -> Result<(), Error> {
        let raw = frame(msg_type, body)?;
        self.outbox.push_back(Outgoing::Handshake(raw));
        Ok(())
    }

    fn send_key_update(&mut self, update_requested: bool) -> Result<(), Error> {
        let mut body = Buf::new();
        KeyUpdate { update_requested }.serialize(&mut body);
        self.queue(HandshakeType::KeyUpdate, &body)?;
        self.outbox.push_back(Outgoing::AdvanceEpoch);
        self.write_epoch += 1;
        let epoch = self.write_epoch;
        let secret = rotate(self.hash, &mut self.write_secret)?;
        self.export(epoch, Direction::Write, secret);
        debug!("{:?} write keys updated, epoch {}", self.role, epoch);
        Ok(())
    }

    fn export(&mut self, epoch: u16, direction: Direction, secret: Secret) {
        self.exported.push_back(ExportedKeys::Tls13(TrafficSecret {
            epoch,
            direction,
            suite: self.suite,
            secret,
        }));
    }
}

impl fmt::Debug for PostHandshakeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostHandshakeContext")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("suite", &self.suite)
            .field("read_epoch", &self.read_epoch)
            .field("write_epoch", &self.write_epoch)
            .finish()
    }
}

/// Replace `slot` with the next traffic secret and return a copy of it.
fn rotate(hash: HashAlgorithm, slot: &mut Option<Secret>) -> Result<Secret, Error> {
    let mut current = slot
        .take()
        .ok_or_else(|| Error::Internal("no application traffic secret".into()))?;
    let next = key_schedule::next_traffic_secret(hash, &current);
    current.wipe();
    let next = next?;
    let copy = next.duplicate(SecretStage::Traffic);
    *slot = Some(next);
    Ok(copy)
}

fn on_key_update(ctx: &mut PostHandshakeContext, body: &[u8]) -> Result<(), Error> {
    let update = KeyUpdate::decode(body)?;
    ctx.read_epoch += 1;
    let epoch = ctx.read_epoch;
    let secret = rotate(ctx.hash, &mut ctx.read_secret)?;
    ctx.export(epoch, Direction::Read, secret);
    debug!(
        "{:?} read keys updated, epoch {} (requested: {})",
        ctx.role, epoch, update.update_requested
    );
    if update.update_requested {
        ctx.send_key_update(false)?;
    }
    Ok(())
}

fn on_new_session_ticket(ctx: &mut PostHandshakeContext, body: &[u8]) -> Result<(), Error> {
    let ticket = NewSessionTicket::decode(body)?;
    if ticket.lifetime > MAX_TICKET_LIFETIME {
        return Err(Error::IllegalParameter(format!(
            "ticket lifetime of {} s",
            ticket.lifetime
        )));
    }
    if ticket.lifetime == 0 {
        debug!("Discarding ticket with zero lifetime");
        return Ok(());
    }

    let (Some(cache), Some(host)) = (ctx.config.session_cache(), ctx.config.server_name()) else {
        trace!("No session cache or server name, ticket dropped");
        return Ok(());
    };
    let resumption_master = ctx
        .resumption_master
        .as_ref()
        .ok_or_else(|| Error::Internal("no resumption master secret".into()))?;
    let psk = key_schedule::resumption_psk(ctx.hash, resumption_master, &ticket.nonce)?;

    cache.put(Arc::new(Session {
        id: Vec::new(),
        peer: Some((host.to_string(), ctx.config.peer_port())),
        version: ctx.version,
        suite: ctx.suite,
        secret: psk,
        alpn: ctx.alpn.clone(),
        extended_master_secret: false,
        ticket: Some(ticket.ticket),
        ticket_age_add: ticket.age_add,
        lifetime: Some(Duration::from_secs(ticket.lifetime as u64)),
        created: Instant::now(),
    }));
    debug!("Stored session ticket for {}", host);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDescription;
    use crate::handshake::test_util::{complete_pair, drain_keys};
    use crate::session::{MemorySessionCache, SessionCache, SessionKey};
    use crate::types::NamedGroup;

    fn tls13_pair(client: Config, server: Config) -> (PostHandshakeContext, PostHandshakeContext) {
        let (c, s) = complete_pair(client, server);
        let mut c = c.into_post_handshake().unwrap();
        let mut s = s.into_post_handshake().unwrap();
        drain_keys(&mut c);
        drain_keys(&mut s);
        (c, s)
    }

    fn x25519() -> Config {
        Config::builder()
            .groups(&[NamedGroup::X25519])
            .build()
            .unwrap()
    }

    fn deliver(from: &mut PostHandshakeContext, to: &mut PostHandshakeContext) {
        while let Some(out) = from.poll_outgoing() {
            if let Outgoing::Handshake(raw) = out {
                to.dispatch(HandshakeType::from_u8(raw[0]), &raw).unwrap();
            }
        }
    }

    fn next_secret(ctx: &mut PostHandshakeContext) -> TrafficSecret {
        match ctx.take_traffic_keys() {
            Some(ExportedKeys::Tls13(secret)) => secret,
            other => panic!("expected a traffic secret, got {:?}", other),
        }
    }

    #[test]
    fn requested_key_update_rotates_both_directions() {
        let _ = env_logger::try_init();
        let (mut client, mut server) = tls13_pair(x25519(), x25519());
        assert_eq!(client.write_epoch(), 2);

        client.key_update(true).unwrap();
        let client_write = next_secret(&mut client);
        assert_eq!(client_write.epoch, 3);

        deliver(&mut client, &mut server);
        let server_read = next_secret(&mut server);
        let server_write = next_secret(&mut server);
        assert_eq!(server_read.direction, Direction::Read);
        assert_eq!(server_read.secret, client_write.secret);
        assert_eq!(server_write.epoch, 3);

        deliver(&mut server, &mut client);
        let client_read = next_secret(&mut client);
        assert_eq!(client_read.secret, server_write.secret);
        assert_eq!(client.read_epoch(), 3);
        // The response did not ask for another update.
        assert!(client.poll_outgoing().is_none());
    }

    #[test]
    fn out_of_table_message_is_fatal() {
        let (_, mut server) = tls13_pair(x25519(), x25519());
        let raw = frame(HandshakeType::NewSessionTicket, &[0; 13]).unwrap();
        let err = server
            .dispatch(HandshakeType::NewSessionTicket, &raw)
            .unwrap_err();
        assert_eq!(err.alert, AlertDescription::UnexpectedMessage);
        assert_eq!(server.state(), HandshakeState::Closed);

        let raw = frame(HandshakeType::ClientHello, &[]).unwrap();
        let err = server
            .dispatch(HandshakeType::ClientHello, &raw)
            .unwrap_err();
        assert_eq!(err.alert, AlertDescription::UnexpectedMessage);
    }

    #[test]
    fn malformed_key_update() {
        let (mut client, _) = tls13_pair(x25519(), x25519());
        let raw = frame(HandshakeType::KeyUpdate, &[2]).unwrap();
        let err = client.dispatch(HandshakeType::KeyUpdate, &raw).unwrap_err();
        assert_eq!(err.alert, AlertDescription::DecodeError);
    }

    #[test]
    fn ticket_lands_in_client_cache() {
        let _ = env_logger::try_init();
        let cache = Arc::new(MemorySessionCache::new(8, Duration::from_secs(3600)));
        let client = Config::builder()
            .groups(&[NamedGroup::X25519])
            .server_name("example.com")
            .with_session_cache(cache.clone())
            .build()
            .unwrap();
        let (mut client, mut server) = tls13_pair(client, x25519());

        server.send_new_session_ticket().unwrap();
        deliver(&mut server, &mut client);

        let session = cache
            .get(&SessionKey::HostPort("example.com".into(), 443))
            .unwrap();
        assert_eq!(session.version, ProtocolVersion::TLS1_3);
        assert_eq!(session.ticket.as_ref().map(|t| t.len()), Some(32));
        assert_eq!(session.secret.len(), 32);
    }

    #[test]
    fn only_servers_issue_tickets() {
        let (mut client, _) = tls13_pair(x25519(), x25519());
        assert!(matches!(
            client.send_new_session_ticket(),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn exporters_agree() {
        let (client, server) = tls13_pair(x25519(), x25519());
        let a = client
            .export_keying_material("EXPORTER-test", Some(b"ctx"), 32)
            .unwrap();
        let b = server
            .export_keying_material("EXPORTER-test", Some(b"ctx"), 32)
            .unwrap();
        assert_eq!(a, b);
        let c = server
            .export_keying_material("EXPORTER-other", Some(b"ctx"), 32)
            .unwrap();
        assert_ne!(a, c);
    }
}
