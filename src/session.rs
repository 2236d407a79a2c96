//! Session cache collaborator.
//!
//! Sessions are looked up either by session id or by the peer's
//! `host:port`. Expiry is checked lazily on lookup; there is no background
//! sweep.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::crypto::Secret;
use crate::types::{CipherSuite, ProtocolVersion};

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Id(Vec<u8>),
    HostPort(String, u16),
}

/// Resumable state of a completed handshake.
///
/// `secret` is the TLS 1.2 master secret or a TLS 1.3 resumption PSK. It is
/// zeroized when the last reference to the session drops.
pub struct Session {
    pub id: Vec<u8>,
    pub peer: Option<(String, u16)>,
    pub version: ProtocolVersion,
    pub suite: CipherSuite,
    pub secret: Secret,
    pub alpn: Option<Vec<u8>>,
    pub extended_master_secret: bool,
    /// TLS 1.3 ticket as sent by the server.
    pub ticket: Option<Vec<u8>>,
    pub ticket_age_add: u32,
    /// Lifetime advertised by the server. Capped by the cache's own TTL.
    pub lifetime: Option<Duration>,
    pub created: Instant,
}

impl Session {
    /// All keys this session can be found under.
    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys = Vec::with_capacity(2);
        if !self.id.is_empty() {
            keys.push(SessionKey::Id(self.id.clone()));
        }
        if let Some((host, port)) = &self.peer {
            keys.push(SessionKey::HostPort(host.clone(), *port));
        }
        keys
    }

    fn expired(&self, ttl: Duration, now: Instant) -> bool {
        let ttl = match self.lifetime {
            Some(lifetime) => lifetime.min(ttl),
            None => ttl,
        };
        now.saturating_duration_since(self.created) >= ttl
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id_len", &self.id.len())
            .field("peer", &self.peer)
            .field("version", &self.version)
            .field("suite", &self.suite)
            .field("secret", &self.secret)
            .field("ticket", &self.ticket.as_ref().map(|t| t.len()))
            .finish()
    }
}

/// Storage for resumable sessions.
pub trait SessionCache: Send + Sync + fmt::Debug {
    fn get(&self, key: &SessionKey) -> Option<Arc<Session>>;

    fn put(&self, session: Arc<Session>);
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<SessionKey, Arc<Session>>,
    /// Insertion order, oldest first.
    order: VecDeque<SessionKey>,
}

/// In-memory [`SessionCache`] with a capacity and a TTL.
///
/// When full, the oldest entry is evicted. Expired entries are removed when a
/// lookup finds them.
#[derive(Debug)]
pub struct MemorySessionCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl MemorySessionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        MemorySessionCache {
            capacity,
            ttl,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lookup with an explicit clock.
    pub fn get_at(&self, key: &SessionKey, now: Instant) -> Option<Arc<Session>> {
        let mut inner = self.lock();
        let session = inner.entries.get(key)?.clone();
        if session.expired(self.ttl, now) {
            debug!("Session cache entry expired: {:?}", key);
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        Some(session)
    }
}

impl SessionCache for MemorySessionCache {
    fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.get_at(key, Instant::now())
    }

    fn put(&self, session: Arc<Session>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.lock();
        for key in session.keys() {
            if inner.entries.insert(key.clone(), session.clone()).is_some() {
                inner.order.retain(|k| k != &key);
            }
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            trace!("Session cache evicting {:?}", oldest);
            inner.entries.remove(&oldest);
        }
    }
}
