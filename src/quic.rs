//! TLS 1.3 handshake for QUIC (RFC 9001).
//!
//! No records: handshake bytes travel in CRYPTO frames per key space, the
//! packet protection keys are derived from the exported traffic secrets and
//! alerts become CRYPTO_ERROR codes.

use std::sync::Arc;

use crate::alert::Alert;
use crate::crypto::key_schedule::{self, QuicKeys};
use crate::crypto::Secret;
use crate::handshake::{
    ExportedKeys, HandshakeContext, HandshakeState, MessageAssembler, Outgoing,
    PostHandshakeContext,
};
use crate::record::quic::{CryptoStream, KeySpace};
use crate::types::CipherSuite;
use crate::{Config, Error, FatalError};

enum Phase {
    Handshaking(HandshakeContext),
    Established(PostHandshakeContext),
    Failed,
}

/// One QUIC endpoint's TLS state.
pub struct QuicConnection {
    phase: Phase,
    crypto: CryptoStream,
    assemblers: [MessageAssembler; 3],
    peer_transport_parameters: Option<Vec<u8>>,
}

impl QuicConnection {
    pub fn client(config: Arc<Config>) -> Result<Self, Error> {
        check_quic(&config)?;
        let handshake = HandshakeContext::client(config)?;
        let mut conn = QuicConnection::new(Phase::Handshaking(handshake));
        conn.pump();
        Ok(conn)
    }

    pub fn server(config: Arc<Config>) -> Result<Self, Error> {
        check_quic(&config)?;
        Ok(QuicConnection::new(Phase::Handshaking(HandshakeContext::server(
            config,
        ))))
    }

    fn new(phase: Phase) -> Self {
        QuicConnection {
            phase,
            crypto: CryptoStream::new(),
            assemblers: Default::default(),
            peer_transport_parameters: None,
        }
    }

    /// Packet protection secrets for the Initial space, from the client's
    /// first Destination Connection ID. Returns (client, server).
    pub fn initial_secrets(dcid: &[u8]) -> Result<(Secret, Secret), Error> {
        key_schedule::quic_initial_secrets(dcid)
    }

    /// Packet protection keys for one traffic secret.
    pub fn packet_keys(suite: CipherSuite, secret: &Secret) -> Result<QuicKeys, Error> {
        let hash = suite
            .hash_algorithm()
            .ok_or_else(|| Error::Config(format!("{:?} has no hash", suite)))?;
        let (_, key_len, iv_len) = suite.key_lengths();
        key_schedule::quic_keys(hash, secret, key_len, iv_len)
    }

    /// Packet protection keys for the Initial space. Returns (client, server).
    pub fn initial_keys(dcid: &[u8]) -> Result<(QuicKeys, QuicKeys), Error> {
        let (client, server) = Self::initial_secrets(dcid)?;
        let suite = CipherSuite::TLS_AES_128_GCM_SHA256;
        Ok((
            Self::packet_keys(suite, &client)?,
            Self::packet_keys(suite, &server)?,
        ))
    }

    /// Feed CRYPTO frame data received in `space`.
    ///
    /// On failure the returned error's alert maps to the CRYPTO_ERROR code
    /// available from [`QuicConnection::error_code`].
    pub fn read_crypto_data(&mut self, space: KeySpace, data: &[u8]) -> Result<(), FatalError> {
        if let Err(fatal) = self.handle_crypto_data(space, data) {
            return Err(self.fail(fatal));
        }
        self.pump();
        Ok(())
    }

    fn handle_crypto_data(&mut self, space: KeySpace, data: &[u8]) -> Result<(), FatalError> {
        let expected = self.read_space()?;
        if space != expected {
            return Err(Error::ProtocolState(format!(
                "CRYPTO data in {:?}, expected {:?}",
                space, expected
            ))
            .into());
        }
        let assembler = &mut self.assemblers[space.index()];
        assembler.push(data);

        loop {
            let Some((msg_type, raw)) = self.assemblers[space.index()].next_message()? else {
                return Ok(());
            };
            match &mut self.phase {
                Phase::Handshaking(ctx) => {
                    let epoch = ctx.read_epoch();
                    ctx.dispatch(msg_type, &raw)?;
                    if ctx.read_epoch() != epoch && !self.assemblers[space.index()].is_empty() {
                        return Err(Error::ProtocolState(
                            "handshake data across a key change".into(),
                        )
                        .into());
                    }
                    if self.peer_transport_parameters.is_none() {
                        self.peer_transport_parameters =
                            ctx.peer_transport_parameters().map(|p| p.to_vec());
                    }
                    if ctx.is_finished() {
                        self.finish_handshake()?;
                    }
                }
                Phase::Established(ctx) => ctx.dispatch(msg_type, &raw)?,
                Phase::Failed => {
                    return Err(Error::ProtocolState("connection failed".into()).into())
                }
            }
        }
    }

    fn finish_handshake(&mut self) -> Result<(), Error> {
        let Phase::Handshaking(mut ctx) = std::mem::replace(&mut self.phase, Phase::Failed) else {
            return Err(Error::Internal("not handshaking".into()));
        };
        while let Some(out) = ctx.poll_outgoing() {
            queue_outgoing(&self.crypto, out);
        }
        let post = ctx.into_post_handshake()?;
        debug!("QUIC handshake complete: {:?}", post.suite());
        self.phase = Phase::Established(post);
        Ok(())
    }

    /// Handshake bytes to send in `space`.
    pub fn take_crypto_data(&mut self, space: KeySpace) -> Option<Vec<u8>> {
        self.crypto.take_crypto_data(space)
    }

    /// Space of the next handshake bytes to send.
    pub fn pending_space(&self) -> Option<KeySpace> {
        self.crypto.pending_space()
    }

    /// Next traffic secret for packet protection.
    pub fn take_traffic_keys(&mut self) -> Option<ExportedKeys> {
        match &mut self.phase {
            Phase::Handshaking(ctx) => ctx.take_traffic_keys(),
            Phase::Established(ctx) => ctx.take_traffic_keys(),
            Phase::Failed => None,
        }
    }

    /// Issue a session ticket (server).
    pub fn send_new_session_ticket(&mut self) -> Result<(), Error> {
        match &mut self.phase {
            Phase::Established(ctx) => ctx.send_new_session_ticket()?,
            _ => return Err(Error::ProtocolState("handshake not complete".into())),
        }
        self.pump();
        Ok(())
    }

    /// QUIC has its own key update mechanism.
    pub fn key_update(&mut self) -> Result<(), Error> {
        Err(Error::UnsupportedOperation(
            "key updates are done by QUIC, not TLS".into(),
        ))
    }

    pub fn export_keying_material(
        &self,
        label: &str,
        context: Option<&[u8]>,
        len: usize,
    ) -> Result<Vec<u8>, Error> {
        match &self.phase {
            Phase::Established(ctx) => ctx.export_keying_material(label, context, len),
            _ => Err(Error::ProtocolState("handshake not complete".into())),
        }
    }

    /// CRYPTO_ERROR code (0x100 + alert) once the handshake failed.
    pub fn error_code(&self) -> Option<u64> {
        self.crypto.error_code()
    }

    /// Raw transport parameters the peer sent.
    pub fn peer_transport_parameters(&self) -> Option<&[u8]> {
        self.peer_transport_parameters.as_deref()
    }

    pub fn is_handshake_complete(&self) -> bool {
        matches!(self.phase, Phase::Established(_))
    }

    pub fn handshake_state(&self) -> HandshakeState {
        match &self.phase {
            Phase::Handshaking(ctx) => ctx.state(),
            Phase::Established(ctx) => ctx.state(),
            Phase::Failed => HandshakeState::Closed,
        }
    }

    pub fn alpn(&self) -> Option<&[u8]> {
        match &self.phase {
            Phase::Handshaking(ctx) => ctx.alpn(),
            Phase::Established(ctx) => ctx.alpn(),
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

    /// Drop all key material. No alert is produced; closing is QUIC's job.
    pub fn close(&mut self) {
        self.crypto.close();
        match &mut self.phase {
            Phase::Handshaking(ctx) => ctx.close(),
            Phase::Established(ctx) => ctx.close(),
            Phase::Failed => {}
        }
    }

    fn read_space(&self) -> Result<KeySpace, Error> {
        match &self.phase {
            Phase::Handshaking(ctx) => Ok(KeySpace::from_epoch(ctx.read_epoch())),
            Phase::Established(ctx) => Ok(KeySpace::from_epoch(ctx.read_epoch())),
            Phase::Failed => Err(Error::ProtocolState("connection failed".into())),
        }
    }

    fn pump(&mut self) {
        match &mut self.phase {
            Phase::Handshaking(ctx) => {
                while let Some(out) = ctx.poll_outgoing() {
                    queue_outgoing(&self.crypto, out);
                }
            }
            Phase::Established(ctx) => {
                while let Some(out) = ctx.poll_outgoing() {
                    queue_outgoing(&self.crypto, out);
                }
            }
            Phase::Failed => {}
        }
    }

    fn fail(&mut self, fatal: FatalError) -> FatalError {
        match self.crypto.record_alert(Alert::fatal(fatal.alert)) {
            Some(code) => debug!("QUIC handshake failed with 0x{:x}: {}", code, fatal.cause),
            None => debug!("Input after close rejected: {}", fatal.cause),
        }
        self.close();
        self.phase = Phase::Failed;
        fatal
    }
}

fn check_quic(config: &Config) -> Result<(), Error> {
    if !config.is_quic() {
        return Err(Error::Config("QUIC needs local transport parameters".into()));
    }
    Ok(())
}

fn queue_outgoing(crypto: &CryptoStream, out: Outgoing) {
    match out {
        Outgoing::Handshake(raw) => crypto.queue_handshake(&raw),
        Outgoing::AdvanceEpoch => crypto.advance_epoch(),
        Outgoing::ChangeCipherSpec => {
            // TLS 1.3 only, so never produced here.
            trace!("Ignoring change_cipher_spec in QUIC");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDescription;
    use crate::crypto::Direction;
    use crate::types::NamedGroup;

    fn config(params: &[u8]) -> Arc<Config> {
        Arc::new(
            Config::builder()
                .groups(&[NamedGroup::X25519])
                .alpn_protocols(&["h3"])
                .quic_transport_parameters(&[(0x04, params)])
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn exchange(from: &mut QuicConnection, to: &mut QuicConnection) -> bool {
        let mut moved = false;
        while let Some(space) = from.pending_space() {
            let data = from.take_crypto_data(space).unwrap();
            to.read_crypto_data(space, &data).unwrap();
            moved = true;
        }
        moved
    }

    #[test]
    fn handshake_over_crypto_frames() {
        let _ = env_logger::try_init();
        let mut client = QuicConnection::client(config(&[1, 2])).unwrap();
        let mut server = QuicConnection::server(config(&[3])).unwrap();
        assert_eq!(client.pending_space(), Some(KeySpace::Initial));

        while exchange(&mut client, &mut server) | exchange(&mut server, &mut client) {}

        assert!(client.is_handshake_complete());
        assert!(server.is_handshake_complete());
        assert_eq!(client.alpn(), Some(&b"h3"[..]));
        assert_eq!(client.peer_transport_parameters(), Some(&[0x04, 0x01, 0x03][..]));
        assert_eq!(server.peer_transport_parameters(), Some(&[0x04, 0x02, 0x01, 0x02][..]));

        let mut client_keys = Vec::new();
        while let Some(ExportedKeys::Tls13(secret)) = client.take_traffic_keys() {
            client_keys.push((secret.epoch, secret.direction));
        }
        assert!(client_keys.contains(&(1, Direction::Write)));
        assert!(client_keys.contains(&(2, Direction::Read)));
        assert!(matches!(client.key_update(), Err(Error::UnsupportedOperation(_))));
    }

    #[test]
    fn data_in_wrong_space_is_fatal() {
        let mut client = QuicConnection::client(config(&[])).unwrap();
        let mut server = QuicConnection::server(config(&[])).unwrap();
        let data = client.take_crypto_data(KeySpace::Initial).unwrap();
        let err = server
            .read_crypto_data(KeySpace::Handshake, &data)
            .unwrap_err();
        assert_eq!(err.alert, AlertDescription::UnexpectedMessage);
        assert_eq!(server.error_code(), Some(0x10a));
        assert_eq!(server.handshake_state(), HandshakeState::Closed);
    }

    #[test]
    fn crypto_data_after_close_records_no_error() {
        let mut client = QuicConnection::client(config(&[])).unwrap();
        let mut server = QuicConnection::server(config(&[])).unwrap();
        let hello = client.take_crypto_data(KeySpace::Initial).unwrap();

        server.close();
        assert!(server.read_crypto_data(KeySpace::Initial, &hello).is_err());
        assert_eq!(server.error_code(), None);
        assert_eq!(server.take_crypto_data(KeySpace::Initial), None);
    }

    #[test]
    fn tls_config_is_rejected() {
        let config = Arc::new(Config::builder().build().unwrap());
        assert!(matches!(
            QuicConnection::client(config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rfc9001_initial_keys() {
        let dcid = [0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08];
        let (client, server) = QuicConnection::initial_keys(&dcid).unwrap();
        assert_ne!(client.key, server.key);
        assert_eq!(client.hp.len(), 16);
        assert_eq!(
            client.key.as_bytes(),
            &[
                0x1f, 0x36, 0x96, 0x13, 0xdd, 0x76, 0xd5, 0x46, 0x77, 0x30, 0xef, 0xcb, 0xe3,
                0xb1, 0xa2, 0x2d
            ]
        );
        assert_eq!(
            client.iv.as_bytes(),
            &[0xfa, 0x04, 0x4b, 0x2f, 0x42, 0xa3, 0xfd, 0x3b, 0x46, 0xfb, 0x25, 0x5c]
        );
    }
}
