//! Protocol identifiers shared by every part of the handshake layer.
//!
//! Versions, cipher suites, hash algorithms, named groups and signature
//! schemes, with their wire encodings.

use std::fmt;

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

// ============================================================================
// Protocol Version
// ============================================================================

/// TLS/DTLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    TLS1_0,
    TLS1_1,
    TLS1_2,
    TLS1_3,
    DTLS1_0,
    DTLS1_2,
    DTLS1_3,
    Unknown(u16),
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0301 => ProtocolVersion::TLS1_0,
            0x0302 => ProtocolVersion::TLS1_1,
            0x0303 => ProtocolVersion::TLS1_2,
            0x0304 => ProtocolVersion::TLS1_3,
            0xFEFF => ProtocolVersion::DTLS1_0,
            0xFEFD => ProtocolVersion::DTLS1_2,
            0xFEFC => ProtocolVersion::DTLS1_3,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::TLS1_0 => 0x0301,
            ProtocolVersion::TLS1_1 => 0x0302,
            ProtocolVersion::TLS1_2 => 0x0303,
            ProtocolVersion::TLS1_3 => 0x0304,
            ProtocolVersion::DTLS1_0 => 0xFEFF,
            ProtocolVersion::DTLS1_2 => 0xFEFD,
            ProtocolVersion::DTLS1_3 => 0xFEFC,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, version) = be_u16(input)?;
        Ok((input, ProtocolVersion::from_u16(version)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }

    /// Whether this version uses the HKDF key schedule.
    pub fn uses_hkdf(&self) -> bool {
        matches!(self, ProtocolVersion::TLS1_3 | ProtocolVersion::DTLS1_3)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::TLS1_0 => write!(f, "TLSv1.0"),
            ProtocolVersion::TLS1_1 => write!(f, "TLSv1.1"),
            ProtocolVersion::TLS1_2 => write!(f, "TLSv1.2"),
            ProtocolVersion::TLS1_3 => write!(f, "TLSv1.3"),
            ProtocolVersion::DTLS1_0 => write!(f, "DTLSv1.0"),
            ProtocolVersion::DTLS1_2 => write!(f, "DTLSv1.2"),
            ProtocolVersion::DTLS1_3 => write!(f, "DTLSv1.3"),
            ProtocolVersion::Unknown(v) => write!(f, "Unknown(0x{:04x})", v),
        }
    }
}

// ============================================================================
// Hash Algorithm
// ============================================================================

/// Hash algorithm driving the PRF, HKDF and transcript hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    SHA256,
    SHA384,
}

impl HashAlgorithm {
    /// Output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::SHA256 => 32,
            HashAlgorithm::SHA384 => 48,
        }
    }
}

// ============================================================================
// Cipher Suites
// ============================================================================

/// Key exchange algorithm of a TLS 1.2 cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeAlgorithm {
    /// Ephemeral Elliptic Curve Diffie-Hellman.
    Ecdhe,
    /// Ephemeral finite field Diffie-Hellman.
    Dhe,
    /// Negotiated through supported_groups/key_share (TLS 1.3).
    Any,
}

/// Cipher suites known to the handshake layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum CipherSuite {
    TLS_AES_128_GCM_SHA256,
    TLS_AES_256_GCM_SHA384,
    TLS_CHACHA20_POLY1305_SHA256,
    ECDHE_ECDSA_AES128_GCM_SHA256,
    ECDHE_RSA_AES128_GCM_SHA256,
    ECDHE_RSA_AES256_GCM_SHA384,
    DHE_RSA_AES128_GCM_SHA256,
    /// TLS_EMPTY_RENEGOTIATION_INFO_SCSV, a signalling value and not a real suite.
    EMPTY_RENEGOTIATION_INFO_SCSV,
    Unknown(u16),
}

impl CipherSuite {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x1301 => CipherSuite::TLS_AES_128_GCM_SHA256,
            0x1302 => CipherSuite::TLS_AES_256_GCM_SHA384,
            0x1303 => CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
            0xC02B => CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            0xC02F => CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
            0xC030 => CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
            0x009E => CipherSuite::DHE_RSA_AES128_GCM_SHA256,
            0x00FF => CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV,
            _ => CipherSuite::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::TLS_AES_128_GCM_SHA256 => 0x1301,
            CipherSuite::TLS_AES_256_GCM_SHA384 => 0x1302,
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256 => 0x1303,
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256 => 0xC02B,
            CipherSuite::ECDHE_RSA_AES128_GCM_SHA256 => 0xC02F,
            CipherSuite::ECDHE_RSA_AES256_GCM_SHA384 => 0xC030,
            CipherSuite::DHE_RSA_AES128_GCM_SHA256 => 0x009E,
            CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV => 0x00FF,
            CipherSuite::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, CipherSuite::from_u16(value)))
    }

    /// Whether this suite is usable with TLS 1.3.
    pub fn is_tls13(&self) -> bool {
        matches!(
            self,
            CipherSuite::TLS_AES_128_GCM_SHA256
                | CipherSuite::TLS_AES_256_GCM_SHA384
                | CipherSuite::TLS_CHACHA20_POLY1305_SHA256
        )
    }

    /// Whether this suite is usable with TLS 1.2.
    pub fn is_tls12(&self) -> bool {
        matches!(
            self,
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256
                | CipherSuite::ECDHE_RSA_AES128_GCM_SHA256
                | CipherSuite::ECDHE_RSA_AES256_GCM_SHA384
                | CipherSuite::DHE_RSA_AES128_GCM_SHA256
        )
    }

    /// Whether the suite can be negotiated under `version`.
    pub fn supports(&self, version: ProtocolVersion) -> bool {
        if version.uses_hkdf() {
            self.is_tls13()
        } else {
            self.is_tls12()
        }
    }

    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        match self {
            CipherSuite::TLS_AES_256_GCM_SHA384 | CipherSuite::ECDHE_RSA_AES256_GCM_SHA384 => {
                Some(HashAlgorithm::SHA384)
            }
            CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV | CipherSuite::Unknown(_) => None,
            _ => Some(HashAlgorithm::SHA256),
        }
    }

    pub fn key_exchange(&self) -> Option<KeyExchangeAlgorithm> {
        match self {
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256
            | CipherSuite::ECDHE_RSA_AES128_GCM_SHA256
            | CipherSuite::ECDHE_RSA_AES256_GCM_SHA384 => Some(KeyExchangeAlgorithm::Ecdhe),
            CipherSuite::DHE_RSA_AES128_GCM_SHA256 => Some(KeyExchangeAlgorithm::Dhe),
            _ if self.is_tls13() => Some(KeyExchangeAlgorithm::Any),
            _ => None,
        }
    }

    /// Key material lengths: (mac_key_len, enc_key_len, fixed_iv_len).
    ///
    /// TLS 1.3 suites report a 12 byte IV.
    pub fn key_lengths(&self) -> (usize, usize, usize) {
        match self {
            CipherSuite::TLS_AES_128_GCM_SHA256 => (0, 16, 12),
            CipherSuite::TLS_AES_256_GCM_SHA384 => (0, 32, 12),
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256 => (0, 32, 12),
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256
            | CipherSuite::ECDHE_RSA_AES128_GCM_SHA256
            | CipherSuite::DHE_RSA_AES128_GCM_SHA256 => (0, 16, 4),
            CipherSuite::ECDHE_RSA_AES256_GCM_SHA384 => (0, 32, 4),
            CipherSuite::EMPTY_RENEGOTIATION_INFO_SCSV | CipherSuite::Unknown(_) => (0, 0, 0),
        }
    }

    /// Default preference order.
    pub fn all() -> &'static [CipherSuite] {
        &[
            CipherSuite::TLS_AES_128_GCM_SHA256,
            CipherSuite::TLS_AES_256_GCM_SHA384,
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
            CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
            CipherSuite::DHE_RSA_AES128_GCM_SHA256,
        ]
    }
}

// ============================================================================
// Named Groups (Key Exchange)
// ============================================================================

/// Key exchange groups (RFC 8422, RFC 7919, RFC 8446, draft-ietf-tls-ecdhe-mlkem).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedGroup {
    Secp256r1,
    Secp384r1,
    X25519,
    Ffdhe2048,
    MlKem768,
    SecP256r1MlKem768,
    X25519MlKem768,
    Unknown(u16),
}

/// The algorithmic shape of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Finite field Diffie-Hellman.
    ClassicalDh,
    /// Elliptic curve Diffie-Hellman.
    EllipticCurveDh,
    /// Key encapsulation.
    Kem,
    /// Two sub-groups run independently, secrets combined at extract time.
    Hybrid(NamedGroup, NamedGroup),
}

impl NamedGroup {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0017 => NamedGroup::Secp256r1,
            0x0018 => NamedGroup::Secp384r1,
            0x001D => NamedGroup::X25519,
            0x0100 => NamedGroup::Ffdhe2048,
            0x0201 => NamedGroup::MlKem768,
            0x11EB => NamedGroup::SecP256r1MlKem768,
            0x11EC => NamedGroup::X25519MlKem768,
            _ => NamedGroup::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            NamedGroup::Secp256r1 => 0x0017,
            NamedGroup::Secp384r1 => 0x0018,
            NamedGroup::X25519 => 0x001D,
            NamedGroup::Ffdhe2048 => 0x0100,
            NamedGroup::MlKem768 => 0x0201,
            NamedGroup::SecP256r1MlKem768 => 0x11EB,
            NamedGroup::X25519MlKem768 => 0x11EC,
            NamedGroup::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], NamedGroup> {
        let (input, value) = be_u16(input)?;
        Ok((input, NamedGroup::from_u16(value)))
    }

    /// Discriminant describing how a key exchange over this group runs.
    ///
    /// Hybrid sub-groups are listed in the order their shares appear on the wire.
    pub fn kind(&self) -> Option<GroupKind> {
        match self {
            NamedGroup::Secp256r1 | NamedGroup::Secp384r1 | NamedGroup::X25519 => {
                Some(GroupKind::EllipticCurveDh)
            }
            NamedGroup::Ffdhe2048 => Some(GroupKind::ClassicalDh),
            NamedGroup::MlKem768 => Some(GroupKind::Kem),
            NamedGroup::SecP256r1MlKem768 => Some(GroupKind::Hybrid(
                NamedGroup::Secp256r1,
                NamedGroup::MlKem768,
            )),
            NamedGroup::X25519MlKem768 => {
                Some(GroupKind::Hybrid(NamedGroup::MlKem768, NamedGroup::X25519))
            }
            NamedGroup::Unknown(_) => None,
        }
    }

    /// Whether the group may be used with the TLS 1.2 ECDHE suites.
    pub fn is_ec(&self) -> bool {
        matches!(self.kind(), Some(GroupKind::EllipticCurveDh))
    }

    /// Whether the group can only be used with TLS 1.3.
    pub fn is_tls13_only(&self) -> bool {
        matches!(self.kind(), Some(GroupKind::Kem) | Some(GroupKind::Hybrid(..)))
    }

    /// Default preference order.
    pub fn all() -> &'static [NamedGroup] {
        &[
            NamedGroup::X25519MlKem768,
            NamedGroup::X25519,
            NamedGroup::Secp256r1,
            NamedGroup::Secp384r1,
            NamedGroup::SecP256r1MlKem768,
            NamedGroup::MlKem768,
            NamedGroup::Ffdhe2048,
        ]
    }
}

// ============================================================================
// Signature Schemes
// ============================================================================

/// Signature schemes (RFC 8446 Section 4.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum SignatureScheme {
    ECDSA_SECP256R1_SHA256,
    ECDSA_SECP384R1_SHA384,
    ED25519,
    RSA_PSS_RSAE_SHA256,
    RSA_PSS_RSAE_SHA384,
    RSA_PKCS1_SHA256,
    RSA_PKCS1_SHA384,
    Unknown(u16),
}

impl SignatureScheme {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0403 => SignatureScheme::ECDSA_SECP256R1_SHA256,
            0x0503 => SignatureScheme::ECDSA_SECP384R1_SHA384,
            0x0807 => SignatureScheme::ED25519,
            0x0804 => SignatureScheme::RSA_PSS_RSAE_SHA256,
            0x0805 => SignatureScheme::RSA_PSS_RSAE_SHA384,
            0x0401 => SignatureScheme::RSA_PKCS1_SHA256,
            0x0501 => SignatureScheme::RSA_PKCS1_SHA384,
            _ => SignatureScheme::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            SignatureScheme::ECDSA_SECP256R1_SHA256 => 0x0403,
            SignatureScheme::ECDSA_SECP384R1_SHA384 => 0x0503,
            SignatureScheme::ED25519 => 0x0807,
            SignatureScheme::RSA_PSS_RSAE_SHA256 => 0x0804,
            SignatureScheme::RSA_PSS_RSAE_SHA384 => 0x0805,
            SignatureScheme::RSA_PKCS1_SHA256 => 0x0401,
            SignatureScheme::RSA_PKCS1_SHA384 => 0x0501,
            SignatureScheme::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureScheme> {
        let (input, value) = be_u16(input)?;
        Ok((input, SignatureScheme::from_u16(value)))
    }

    pub fn all() -> &'static [SignatureScheme] {
        &[
            SignatureScheme::ECDSA_SECP256R1_SHA256,
            SignatureScheme::ECDSA_SECP384R1_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_RSAE_SHA256,
            SignatureScheme::RSA_PSS_RSAE_SHA384,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
        ]
    }
}

// ============================================================================
// Random
// ============================================================================

/// 32 bytes of hello random.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl Random {
    pub fn new() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Random(bytes)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, bytes) = nom::bytes::complete::take(32usize)(input)?;
        let mut random = [0u8; 32];
        random.copy_from_slice(bytes);
        Ok((input, Random(random)))
    }
}

impl Default for Random {
    fn default() -> Self {
        Random::new()
    }
}

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Random(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..)")
    }
}

/// Parse a u8-prefixed opaque vector.
pub(crate) fn opaque_u8(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u8(input)?;
    nom::bytes::complete::take(len)(input)
}

/// Parse a u16-prefixed opaque vector.
pub(crate) fn opaque_u16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u16(input)?;
    nom::bytes::complete::take(len)(input)
}
