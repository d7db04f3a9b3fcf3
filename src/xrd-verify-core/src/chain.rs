//! Certification path building and validation.
//!
//! Paths are built by depth-first search from the subject certificate towards
//! the snapshot's trust anchors, matching issuer to subject name and checking
//! each signature. Validation then re-checks the whole path structurally and,
//! when a date is given, temporally, and finally checks OCSP evidence for
//! every certificate below the anchor.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, trace};

use crate::cache::OcspValidityCache;
use crate::cert::Certificate;
use crate::config::TrustSnapshot;
use crate::error::TrustError;
use crate::ocsp::{OcspResponse, OcspVerifier};

/// A certification path: `[subject, ...intermediates]` plus the anchor that
/// issued the last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertChain {
    certs: Vec<Certificate>,
    trust_anchor: Certificate,
}

impl CertChain {
    /// Create a chain. `certs` starts with the subject and proceeds towards
    /// the anchor.
    pub fn new(certs: Vec<Certificate>, trust_anchor: Certificate) -> Result<Self, TrustError> {
        if certs.is_empty() {
            return Err(TrustError::path_building("chain has no subject certificate"));
        }
        Ok(Self {
            certs,
            trust_anchor,
        })
    }

    /// The end-entity certificate.
    #[must_use]
    pub fn subject(&self) -> &Certificate {
        &self.certs[0]
    }

    /// Intermediate CA certificates, nearest the subject first.
    #[must_use]
    pub fn intermediates(&self) -> &[Certificate] {
        &self.certs[1..]
    }

    /// Subject followed by intermediates.
    #[must_use]
    pub fn certs(&self) -> &[Certificate] {
        &self.certs
    }

    /// The trust anchor terminating the path.
    #[must_use]
    pub fn trust_anchor(&self) -> &Certificate {
        &self.trust_anchor
    }

    /// Number of certificates including the anchor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.certs.len() + 1
    }

    /// Always false: a chain holds at least the subject and the anchor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Every certificate from subject to anchor.
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certs.iter().chain(std::iter::once(&self.trust_anchor))
    }

    /// `(certificate, issuer)` pairs for every certificate below the anchor.
    pub fn links(&self) -> impl Iterator<Item = (&Certificate, &Certificate)> {
        self.certs.iter().zip(self.iter().skip(1))
    }
}

/// Builds and validates certification paths against one trust snapshot.
pub struct CertChainVerifier<'a> {
    snapshot: &'a TrustSnapshot,
    cache: Option<&'a OcspValidityCache>,
}

impl<'a> CertChainVerifier<'a> {
    /// Create a verifier for `snapshot`.
    #[must_use]
    pub fn new(snapshot: &'a TrustSnapshot) -> Self {
        Self {
            snapshot,
            cache: None,
        }
    }

    /// Use `cache` for OCSP response authentication.
    #[must_use]
    pub fn with_cache(mut self, cache: Option<&'a OcspValidityCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Build a path from `subject` to a trust anchor.
    ///
    /// Candidate issuers come from `pool` and the snapshot's intermediates.
    /// Anchors are tried before intermediates at every step, alternative
    /// issuers are backtracked over, and paths longer than the configured
    /// maximum depth are not explored.
    #[instrument(skip_all, fields(subject = %subject.subject()))]
    pub fn build_chain(
        &self,
        subject: &Certificate,
        pool: &[Certificate],
    ) -> Result<CertChain, TrustError> {
        let candidates: Vec<&Certificate> = pool
            .iter()
            .chain(self.snapshot.intermediates())
            .filter(|cert| cert.is_ca())
            .collect();

        let mut path = vec![subject.clone()];
        let mut visited = HashSet::from([*subject.fingerprint()]);

        match self.search(&mut path, &mut visited, &candidates) {
            Some(anchor) => {
                debug!(depth = path.len() + 1, anchor = %anchor.subject(), "built certification path");
                CertChain::new(path, anchor)
            },
            None => Err(TrustError::path_building(format!(
                "no path from {} to a trust anchor",
                subject.subject()
            ))),
        }
    }

    fn search(
        &self,
        path: &mut Vec<Certificate>,
        visited: &mut HashSet<[u8; 32]>,
        candidates: &[&Certificate],
    ) -> Option<Certificate> {
        let current = path.last()?.clone();
        let max_depth = self.snapshot.config().max_path_depth;

        if path.len() + 1 > max_depth {
            return None;
        }

        for anchor in self.snapshot.anchors() {
            if !visited.contains(anchor.fingerprint()) && current.is_issued_by(anchor) {
                return Some(anchor.clone());
            }
        }

        // Room for one more intermediate plus an anchor above it.
        if path.len() + 2 > max_depth {
            return None;
        }

        for candidate in candidates {
            if visited.contains(candidate.fingerprint()) || !current.is_issued_by(candidate) {
                continue;
            }
            trace!(candidate = %candidate.subject(), "trying issuer");

            visited.insert(*candidate.fingerprint());
            path.push((*candidate).clone());
            if let Some(anchor) = self.search(path, visited, candidates) {
                return Some(anchor);
            }
            path.pop();
            visited.remove(candidate.fingerprint());
        }

        None
    }

    /// Validate `chain` without revocation checking.
    ///
    /// Linkage, signatures, CA constraints, anchor membership, repetition and
    /// depth are always checked. Validity windows are checked only when
    /// `at_date` is given.
    #[instrument(skip_all, fields(subject = %chain.subject().subject(), depth = chain.len()))]
    pub fn verify_chain_only(
        &self,
        chain: &CertChain,
        at_date: Option<DateTime<Utc>>,
    ) -> Result<(), TrustError> {
        let max_depth = self.snapshot.config().max_path_depth;
        if chain.len() > max_depth {
            return Err(TrustError::path_building(format!(
                "path length {} exceeds maximum {max_depth}",
                chain.len()
            )));
        }

        if !self.snapshot.is_trust_anchor(chain.trust_anchor()) {
            return Err(TrustError::path_building(format!(
                "{} is not a trust anchor",
                chain.trust_anchor().subject()
            )));
        }

        let mut seen = HashSet::new();
        for cert in chain.iter() {
            if !seen.insert(*cert.fingerprint()) {
                return Err(TrustError::path_building(format!(
                    "certificate {} appears twice in path",
                    cert.subject()
                )));
            }
        }

        for (cert, issuer) in chain.links() {
            if cert.issuer() != issuer.subject() {
                return Err(TrustError::path_building(format!(
                    "issuer of {} is {}, not {}",
                    cert.subject(),
                    cert.issuer(),
                    issuer.subject()
                )));
            }
            let signed = cert
                .verify_signed_by(issuer)
                .map_err(|e| TrustError::path_building(format!("{}: {e}", cert.subject())))?;
            if !signed {
                return Err(TrustError::path_building(format!(
                    "signature on {} does not verify with key of {}",
                    cert.subject(),
                    issuer.subject()
                )));
            }
        }

        // Intermediates must be CAs allowed to sign certificates, with room
        // for the intermediates below them.
        for (below, ca) in chain.intermediates().iter().enumerate() {
            let Some(constraints) = ca.basic_constraints().filter(|bc| bc.ca) else {
                return Err(TrustError::path_building(format!(
                    "{} is not a CA certificate",
                    ca.subject()
                )));
            };
            if ca.key_usage().is_some_and(|ku| !ku.key_cert_sign) {
                return Err(TrustError::path_building(format!(
                    "{} key usage does not allow certificate signing",
                    ca.subject()
                )));
            }
            if let Some(path_len) = constraints.path_len {
                if below > path_len as usize {
                    return Err(TrustError::path_building(format!(
                        "{} allows {path_len} intermediates below it, path has {below}",
                        ca.subject()
                    )));
                }
            }
        }

        if let Some(at) = at_date {
            for cert in chain.iter() {
                if at < cert.not_before() {
                    return Err(TrustError::CertificateNotYetValid {
                        subject: cert.subject().to_string(),
                        not_before: cert.not_before(),
                    });
                }
                if at > cert.not_after() {
                    return Err(TrustError::CertificateExpired {
                        subject: cert.subject().to_string(),
                        not_after: cert.not_after(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate `chain` and require good OCSP status for every certificate
    /// below the anchor.
    ///
    /// Each such certificate needs exactly one matching response among
    /// `ocsp_responses`; byte-identical copies count once. OCSP time checks
    /// use `at_date`, or the current time when it is absent.
    #[instrument(skip_all, fields(subject = %chain.subject().subject(), responses = ocsp_responses.len()))]
    pub fn verify(
        &self,
        chain: &CertChain,
        ocsp_responses: &[OcspResponse],
        at_date: Option<DateTime<Utc>>,
    ) -> Result<(), TrustError> {
        self.verify_chain_only(chain, at_date)?;

        let at = at_date.unwrap_or_else(Utc::now);
        let ocsp = OcspVerifier::new(self.snapshot).with_cache(self.cache);

        for (cert, issuer) in chain.links() {
            let mut matching: Vec<&OcspResponse> = Vec::new();
            for response in ocsp_responses.iter().filter(|r| r.matches(cert, issuer)) {
                if !matching.iter().any(|m| m.der() == response.der()) {
                    matching.push(response);
                }
            }

            let response = match matching.as_slice() {
                [] => {
                    return Err(TrustError::MissingOcspResponse {
                        subject: cert.subject().to_string(),
                    })
                },
                [response] => *response,
                _ => {
                    return Err(TrustError::validation_info(format!(
                        "{} distinct OCSP responses for {}",
                        matching.len(),
                        cert.subject()
                    )))
                },
            };

            ocsp.verify_validity_and_status(response, cert, issuer, at)?;
            trace!(subject = %cert.subject(), "OCSP status good");
        }

        Ok(())
    }
}
