use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::CredentialStore;
use crate::crypto::CryptoProvider;
use crate::extension::{MaxFragmentLengthExtension, QuicTransportParametersExtension};
use crate::session::SessionCache;
use crate::types::{CipherSuite, NamedGroup, ProtocolVersion, SignatureScheme};
use crate::Error;

/// Handshake configuration, shared by every connection behind an `Arc`.
#[derive(Clone)]
pub struct Config {
    versions: Vec<ProtocolVersion>,
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<NamedGroup>,
    key_share_groups: Vec<NamedGroup>,
    signature_schemes: Vec<SignatureScheme>,
    alpn_protocols: Vec<Vec<u8>>,
    server_name: Option<String>,
    peer_port: u16,
    max_fragment_length: Option<MaxFragmentLengthExtension>,
    extended_master_secret: bool,
    status_request: bool,
    quic_transport_parameters: Option<QuicTransportParametersExtension>,
    session_ticket_lifetime: Duration,
    crypto_provider: CryptoProvider,
    credentials: Option<Arc<dyn CredentialStore>>,
    session_cache: Option<Arc<dyn SessionCache>>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            versions: vec![ProtocolVersion::TLS1_3, ProtocolVersion::TLS1_2],
            cipher_suites: CipherSuite::all().to_vec(),
            groups: NamedGroup::all().to_vec(),
            key_share_groups: None,
            signature_schemes: vec![
                SignatureScheme::ECDSA_SECP256R1_SHA256,
                SignatureScheme::ECDSA_SECP384R1_SHA384,
            ],
            alpn_protocols: Vec::new(),
            server_name: None,
            peer_port: 443,
            max_fragment_length: None,
            extended_master_secret: true,
            status_request: false,
            quic_transport_parameters: None,
            session_ticket_lifetime: Duration::from_secs(7200),
            crypto_provider: None,
            credentials: None,
            session_cache: None,
        }
    }

    /// Enabled protocol versions, highest preference first.
    #[inline(always)]
    pub fn versions(&self) -> &[ProtocolVersion] {
        &self.versions
    }

    /// Whether `version` is enabled.
    pub fn enables(&self, version: ProtocolVersion) -> bool {
        self.versions.contains(&version)
    }

    /// Cipher suites in preference order.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Named groups in preference order.
    #[inline(always)]
    pub fn groups(&self) -> &[NamedGroup] {
        &self.groups
    }

    /// Groups a client generates TLS 1.3 key shares for up front.
    #[inline(always)]
    pub fn key_share_groups(&self) -> &[NamedGroup] {
        &self.key_share_groups
    }

    /// Signature schemes offered and accepted.
    #[inline(always)]
    pub fn signature_schemes(&self) -> &[SignatureScheme] {
        &self.signature_schemes
    }

    /// ALPN protocols. A client offers them in order; a server picks the
    /// first of its own list the client offered.
    #[inline(always)]
    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.alpn_protocols
    }

    /// For a client, the host name sent in server_name and used as the
    /// session cache key.
    #[inline(always)]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Port of the peer, for `host:port` session cache keys.
    #[inline(always)]
    pub fn peer_port(&self) -> u16 {
        self.peer_port
    }

    /// Maximum fragment length a client requests (RFC 6066).
    #[inline(always)]
    pub fn max_fragment_length(&self) -> Option<MaxFragmentLengthExtension> {
        self.max_fragment_length
    }

    /// Whether to negotiate Extended Master Secret for TLS 1.2 (RFC 7627).
    #[inline(always)]
    pub fn extended_master_secret(&self) -> bool {
        self.extended_master_secret
    }

    /// Whether a client requests OCSP stapling.
    #[inline(always)]
    pub fn status_request(&self) -> bool {
        self.status_request
    }

    /// Local QUIC transport parameters. Set if and only if the connection
    /// runs in QUIC mode.
    #[inline(always)]
    pub fn quic_transport_parameters(&self) -> Option<&QuicTransportParametersExtension> {
        self.quic_transport_parameters.as_ref()
    }

    #[inline(always)]
    pub fn is_quic(&self) -> bool {
        self.quic_transport_parameters.is_some()
    }

    /// Lifetime a server puts in its TLS 1.3 session tickets.
    #[inline(always)]
    pub fn session_ticket_lifetime(&self) -> Duration {
        self.session_ticket_lifetime
    }

    /// Key exchange primitives.
    #[inline(always)]
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.crypto_provider
    }

    /// Signing keys and trusted peer keys.
    #[inline(always)]
    pub fn credentials(&self) -> Option<&Arc<dyn CredentialStore>> {
        self.credentials.as_ref()
    }

    /// Where resumable sessions are stored.
    #[inline(always)]
    pub fn session_cache(&self) -> Option<&Arc<dyn SessionCache>> {
        self.session_cache.as_ref()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("versions", &self.versions)
            .field("cipher_suites", &self.cipher_suites)
            .field("groups", &self.groups)
            .field("key_share_groups", &self.key_share_groups)
            .field("alpn_protocols", &self.alpn_protocols.len())
            .field("server_name", &self.server_name)
            .field("quic", &self.is_quic())
            .finish()
    }
}

/// Builder for [`Config`].
pub struct ConfigBuilder {
    versions: Vec<ProtocolVersion>,
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<NamedGroup>,
    key_share_groups: Option<Vec<NamedGroup>>,
    signature_schemes: Vec<SignatureScheme>,
    alpn_protocols: Vec<Vec<u8>>,
    server_name: Option<String>,
    peer_port: u16,
    max_fragment_length: Option<MaxFragmentLengthExtension>,
    extended_master_secret: bool,
    status_request: bool,
    quic_transport_parameters: Option<QuicTransportParametersExtension>,
    session_ticket_lifetime: Duration,
    crypto_provider: Option<CryptoProvider>,
    credentials: Option<Arc<dyn CredentialStore>>,
    session_cache: Option<Arc<dyn SessionCache>>,
}

impl ConfigBuilder {
    /// Set the enabled protocol versions, highest preference first.
    ///
    /// Defaults to TLS 1.3 and TLS 1.2.
    pub fn versions(mut self, versions: &[ProtocolVersion]) -> Self {
        self.versions = versions.to_vec();
        self
    }

    /// Set the cipher suites in preference order.
    ///
    /// Defaults to [`CipherSuite::all`].
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Set the named groups in preference order.
    ///
    /// Defaults to [`NamedGroup::all`].
    pub fn groups(mut self, groups: &[NamedGroup]) -> Self {
        self.groups = groups.to_vec();
        self
    }

    /// Set the groups a client sends TLS 1.3 key shares for.
    ///
    /// Defaults to the first group usable with TLS 1.3.
    pub fn key_share_groups(mut self, groups: &[NamedGroup]) -> Self {
        self.key_share_groups = Some(groups.to_vec());
        self
    }

    /// Set the signature schemes.
    ///
    /// Defaults to ECDSA over P-256 and P-384.
    pub fn signature_schemes(mut self, schemes: &[SignatureScheme]) -> Self {
        self.signature_schemes = schemes.to_vec();
        self
    }

    /// Set the ALPN protocols. Each must be 1 to 255 bytes.
    ///
    /// Defaults to none.
    pub fn alpn_protocols<P: AsRef<[u8]>>(mut self, protocols: &[P]) -> Self {
        self.alpn_protocols = protocols.iter().map(|p| p.as_ref().to_vec()).collect();
        self
    }

    /// Set the host name a client sends in server_name.
    pub fn server_name(mut self, name: &str) -> Self {
        self.server_name = Some(name.to_string());
        self
    }

    /// Set the peer port used in `host:port` session cache keys.
    ///
    /// Defaults to 443.
    pub fn peer_port(mut self, port: u16) -> Self {
        self.peer_port = port;
        self
    }

    /// Request a maximum fragment length, rounded down to 512, 1024, 2048 or 4096.
    ///
    /// Defaults to not requesting one.
    pub fn max_fragment_length(mut self, fragment_size: usize) -> Self {
        self.max_fragment_length = Some(MaxFragmentLengthExtension::from_fragment_size(
            fragment_size,
        ));
        self
    }

    /// Set whether to negotiate Extended Master Secret (RFC 7627).
    ///
    /// Defaults to true.
    pub fn extended_master_secret(mut self, enabled: bool) -> Self {
        self.extended_master_secret = enabled;
        self
    }

    /// Set whether a client requests OCSP stapling.
    ///
    /// Defaults to false.
    pub fn status_request(mut self, enabled: bool) -> Self {
        self.status_request = enabled;
        self
    }

    /// Run in QUIC mode with these local transport parameters (id, value).
    ///
    /// QUIC mode requires TLS 1.3 and makes the peer's transport
    /// parameters mandatory.
    pub fn quic_transport_parameters(mut self, params: &[(u64, &[u8])]) -> Result<Self, Error> {
        self.quic_transport_parameters = Some(
            QuicTransportParametersExtension::from_parameters(params)
                .map_err(|e| Error::Config(format!("transport parameters: {}", e)))?,
        );
        Ok(self)
    }

    /// Set the lifetime of session tickets a server issues.
    ///
    /// Defaults to 2 hours.
    pub fn session_ticket_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_ticket_lifetime = lifetime;
        self
    }

    /// Set a custom crypto provider.
    ///
    /// Defaults to the RustCrypto based provider.
    pub fn with_crypto_provider(mut self, provider: CryptoProvider) -> Self {
        self.crypto_provider = Some(provider);
        self
    }

    /// Set the credential store. A server needs one for TLS 1.2; a client
    /// needs one to verify a TLS 1.2 server.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the session cache.
    pub fn with_session_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.session_cache = Some(cache);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::Config` when the settings cannot produce a handshake.
    pub fn build(self) -> Result<Config, Error> {
        let crypto_provider = self.crypto_provider.unwrap_or_default();
        crypto_provider.validate()?;

        let mut versions = self.versions;
        versions.dedup();
        if versions.is_empty() {
            return Err(Error::Config("no protocol versions".into()));
        }
        if let Some(v) = versions
            .iter()
            .find(|v| !matches!(v, ProtocolVersion::TLS1_2 | ProtocolVersion::TLS1_3))
        {
            return Err(Error::Config(format!("unsupported version {}", v)));
        }
        if self.quic_transport_parameters.is_some() {
            if !versions.contains(&ProtocolVersion::TLS1_3) {
                return Err(Error::Config("QUIC requires TLS 1.3".into()));
            }
            versions.retain(|v| *v == ProtocolVersion::TLS1_3);
        }

        let cipher_suites: Vec<CipherSuite> = self
            .cipher_suites
            .into_iter()
            .filter(|s| versions.iter().any(|v| s.supports(*v)))
            .collect();
        for version in &versions {
            if !cipher_suites.iter().any(|s| s.supports(*version)) {
                return Err(Error::Config(format!("no cipher suite for {}", version)));
            }
        }

        if let Some(g) = self.groups.iter().find(|g| !crypto_provider.supports(**g)) {
            return Err(Error::Config(format!("group {:?} not in provider", g)));
        }
        if self.groups.is_empty() {
            return Err(Error::Config("no named groups".into()));
        }

        let key_share_groups = match self.key_share_groups {
            Some(groups) => {
                if let Some(g) = groups.iter().find(|g| !self.groups.contains(*g)) {
                    return Err(Error::Config(format!(
                        "key share group {:?} not enabled",
                        g
                    )));
                }
                groups
            }
            None => self
                .groups
                .iter()
                .find(|g| g.kind().is_some())
                .copied()
                .into_iter()
                .collect(),
        };

        if let Some(p) = self
            .alpn_protocols
            .iter()
            .find(|p| p.is_empty() || p.len() > 255)
        {
            return Err(Error::Config(format!(
                "ALPN protocol of {} bytes",
                p.len()
            )));
        }

        Ok(Config {
            versions,
            cipher_suites,
            groups: self.groups,
            key_share_groups,
            signature_schemes: self.signature_schemes,
            alpn_protocols: self.alpn_protocols,
            server_name: self.server_name,
            peer_port: self.peer_port,
            max_fragment_length: self.max_fragment_length,
            extended_master_secret: self.extended_master_secret,
            status_request: self.status_request,
            quic_transport_parameters: self.quic_transport_parameters,
            session_ticket_lifetime: self.session_ticket_lifetime,
            crypto_provider,
            credentials: self.credentials,
            session_cache: self.session_cache,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(
            config.versions(),
            &[ProtocolVersion::TLS1_3, ProtocolVersion::TLS1_2]
        );
        assert_eq!(config.key_share_groups(), &[NamedGroup::X25519MlKem768]);
        assert!(config.extended_master_secret());
        assert!(!config.is_quic());
    }

    #[test]
    fn quic_restricts_to_tls13() {
        let config = Config::builder()
            .quic_transport_parameters(&[(0x04, &[0x80, 0x01, 0x00, 0x00][..])])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.versions(), &[ProtocolVersion::TLS1_3]);
        assert!(config.cipher_suites().iter().all(|s| s.is_tls13()));

        let err = Config::builder()
            .versions(&[ProtocolVersion::TLS1_2])
            .quic_transport_parameters(&[])
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_unusable_settings() {
        assert!(Config::builder()
            .versions(&[ProtocolVersion::TLS1_1])
            .build()
            .is_err());
        assert!(Config::builder()
            .versions(&[ProtocolVersion::TLS1_3])
            .cipher_suites(&[CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256])
            .build()
            .is_err());
        assert!(Config::builder()
            .groups(&[NamedGroup::X25519])
            .key_share_groups(&[NamedGroup::Secp256r1])
            .build()
            .is_err());
        assert!(Config::builder().alpn_protocols(&[""]).build().is_err());
        assert!(Config::builder()
            .groups(&[NamedGroup::Unknown(0x0019)])
            .build()
            .is_err());
    }

    #[test]
    fn max_fragment_length_rounds_down() {
        let config = Config::builder().max_fragment_length(1500).build().unwrap();
        assert_eq!(config.max_fragment_length().unwrap().fragment_size(), 1024);
    }
}
