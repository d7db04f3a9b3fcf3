//! OCSP validity cache.
//!
//! Verifying an OCSP response's signature and locating its responder is the
//! expensive part of revocation checking, and the same response is typically
//! presented with many messages. The cache remembers which responder
//! certificate authenticated a given (response, subject, issuer) triple so
//! those steps can be skipped. Status and time checks always run.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::cert::Certificate;
use crate::config::VerifierConfig;

/// Cache key: SHA-256 of the response DER plus both certificate fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OcspCacheKey {
    response: [u8; 32],
    subject: [u8; 32],
    issuer: [u8; 32],
}

impl OcspCacheKey {
    /// Key for `response_der` checked against `subject` and `issuer`.
    #[must_use]
    pub fn new(response_der: &[u8], subject: &Certificate, issuer: &Certificate) -> Self {
        Self {
            response: Sha256::digest(response_der).into(),
            subject: *subject.fingerprint(),
            issuer: *issuer.fingerprint(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    responder: Certificate,
    inserted_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Bounded, TTL-based memo of authenticated OCSP responders.
///
/// Entries are immutable once written and the first writer for a key wins.
/// A poisoned lock is treated as an empty cache.
#[derive(Debug)]
pub struct OcspValidityCache {
    entries: RwLock<HashMap<OcspCacheKey, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl OcspValidityCache {
    /// Create a cache with the given entry lifetime and capacity.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Create a cache sized from the verifier configuration.
    #[must_use]
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::new(config.ocsp_cache_ttl, config.ocsp_cache_capacity)
    }

    /// Responder certificate previously recorded for `key`, if still fresh.
    #[must_use]
    pub fn get(&self, key: &OcspCacheKey) -> Option<Certificate> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.is_fresh(Instant::now()) {
            trace!("ocsp validity cache hit");
            Some(entry.responder.clone())
        } else {
            None
        }
    }

    /// Record that `responder` authenticated the response behind `key`.
    ///
    /// An existing fresh entry is kept. When the cache is full, expired
    /// entries are dropped first, then the oldest ones.
    pub fn insert(&self, key: OcspCacheKey, responder: Certificate) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        let now = Instant::now();

        if entries.get(&key).is_some_and(|entry| entry.is_fresh(now)) {
            return;
        }

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            entries.retain(|_, entry| entry.is_fresh(now));
            while entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| *k);
                match oldest {
                    Some(oldest) => {
                        entries.remove(&oldest);
                    },
                    None => break,
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                responder,
                inserted_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Number of entries, including expired ones not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
