//! Verifier configuration and the trust snapshot.
//!
//! Trust configuration (anchors, intermediates, OCSP responders) changes at
//! runtime. Every verification reads one immutable [`TrustSnapshot`] taken at
//! its start; [`TrustStore::replace`] swaps in a new snapshot for later
//! verifications without disturbing the ones in flight.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::cert::{Certificate, IdentityResolver, SubjectNameIdentityResolver};

/// Tunables for the verification core.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Maximum number of certificates in a path, trust anchor included.
    pub max_path_depth: usize,
    /// Reject OCSP responses whose nextUpdate is before the verification time.
    pub verify_next_update: bool,
    /// Maximum age of an OCSP response's thisUpdate. `None` disables the check.
    pub ocsp_freshness: Option<Duration>,
    /// Lifetime of an OCSP validity cache entry.
    pub ocsp_cache_ttl: Duration,
    /// Maximum number of OCSP validity cache entries.
    pub ocsp_cache_capacity: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 16,
            verify_next_update: true,
            ocsp_freshness: None,
            ocsp_cache_ttl: Duration::from_secs(60),
            ocsp_cache_capacity: 1000,
        }
    }
}

/// Immutable view of the trust configuration.
pub struct TrustSnapshot {
    config: VerifierConfig,
    anchors: Vec<Certificate>,
    intermediates: Vec<Certificate>,
    /// CA fingerprint -> responders trusted to sign OCSP for it.
    responders: HashMap<[u8; 32], Vec<Certificate>>,
    identity_resolver: Arc<dyn IdentityResolver>,
}

impl TrustSnapshot {
    /// Start building a snapshot.
    #[must_use]
    pub fn builder() -> TrustSnapshotBuilder {
        TrustSnapshotBuilder::default()
    }

    /// Verifier configuration.
    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Trust anchors.
    #[must_use]
    pub fn anchors(&self) -> &[Certificate] {
        &self.anchors
    }

    /// Known intermediate CA certificates.
    #[must_use]
    pub fn intermediates(&self) -> &[Certificate] {
        &self.intermediates
    }

    /// Whether `cert` is a configured trust anchor.
    #[must_use]
    pub fn is_trust_anchor(&self, cert: &Certificate) -> bool {
        self.anchors.iter().any(|anchor| anchor == cert)
    }

    /// OCSP responders trusted for certificates issued by `ca`.
    #[must_use]
    pub fn responders_for(&self, ca: &Certificate) -> &[Certificate] {
        self.responders
            .get(ca.fingerprint())
            .map_or(&[], Vec::as_slice)
    }

    /// Every configured OCSP responder certificate.
    pub fn all_responders(&self) -> impl Iterator<Item = &Certificate> {
        self.responders.values().flatten()
    }

    /// Anchors followed by intermediates.
    pub fn ca_certs(&self) -> impl Iterator<Item = &Certificate> {
        self.anchors.iter().chain(self.intermediates.iter())
    }

    /// Resolver mapping signing certificates to member identities.
    #[must_use]
    pub fn identity_resolver(&self) -> &dyn IdentityResolver {
        self.identity_resolver.as_ref()
    }
}

impl fmt::Debug for TrustSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustSnapshot")
            .field("config", &self.config)
            .field("anchors", &self.anchors.len())
            .field("intermediates", &self.intermediates.len())
            .field("responders", &self.responders.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TrustSnapshot`].
#[derive(Default)]
pub struct TrustSnapshotBuilder {
    config: VerifierConfig,
    anchors: Vec<Certificate>,
    intermediates: Vec<Certificate>,
    responders: HashMap<[u8; 32], Vec<Certificate>>,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
}

impl TrustSnapshotBuilder {
    /// Set the verifier configuration.
    #[must_use]
    pub fn config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a trust anchor.
    #[must_use]
    pub fn anchor(mut self, cert: Certificate) -> Self {
        if !self.anchors.contains(&cert) {
            self.anchors.push(cert);
        }
        self
    }

    /// Add trust anchors.
    #[must_use]
    pub fn anchors(self, certs: impl IntoIterator<Item = Certificate>) -> Self {
        certs.into_iter().fold(self, Self::anchor)
    }

    /// Add a known intermediate CA certificate.
    #[must_use]
    pub fn intermediate(mut self, cert: Certificate) -> Self {
        if !self.intermediates.contains(&cert) {
            self.intermediates.push(cert);
        }
        self
    }

    /// Add known intermediate CA certificates.
    #[must_use]
    pub fn intermediates(self, certs: impl IntoIterator<Item = Certificate>) -> Self {
        certs.into_iter().fold(self, Self::intermediate)
    }

    /// Trust `responder` to sign OCSP responses for certificates issued by `ca`.
    #[must_use]
    pub fn ocsp_responder(mut self, ca: &Certificate, responder: Certificate) -> Self {
        let entry = self.responders.entry(*ca.fingerprint()).or_default();
        if !entry.contains(&responder) {
            entry.push(responder);
        }
        self
    }

    /// Replace the default subject-name identity resolver.
    #[must_use]
    pub fn identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity_resolver = Some(resolver);
        self
    }

    /// Finish the snapshot.
    #[must_use]
    pub fn build(self) -> TrustSnapshot {
        TrustSnapshot {
            config: self.config,
            anchors: self.anchors,
            intermediates: self.intermediates,
            responders: self.responders,
            identity_resolver: self
                .identity_resolver
                .unwrap_or_else(|| Arc::new(SubjectNameIdentityResolver)),
        }
    }
}

/// Shared, replaceable handle to the current [`TrustSnapshot`].
#[derive(Clone)]
pub struct TrustStore {
    current: Arc<RwLock<Arc<TrustSnapshot>>>,
}

impl TrustStore {
    /// Create a store holding `snapshot`.
    #[must_use]
    pub fn new(snapshot: TrustSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// The snapshot current at the time of the call.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TrustSnapshot> {
        // A writer cannot leave the slot half-written: it only swaps an Arc.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Install a new snapshot for verifications that start after this call.
    pub fn replace(&self, snapshot: TrustSnapshot) {
        debug!(
            anchors = snapshot.anchors.len(),
            intermediates = snapshot.intermediates.len(),
            "replacing trust snapshot"
        );
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }
}

impl fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustStore")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
