//! OCSP response verification.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, instrument, trace};
use xrd_crypto::SpkiVerifier;

use super::response::{CertStatus, OcspResponse, SingleResponse};
use crate::cache::{OcspCacheKey, OcspValidityCache};
use crate::cert::Certificate;
use crate::config::TrustSnapshot;
use crate::error::TrustError;

/// Check whether `response`'s thisUpdate is older than `at - freshness`.
#[must_use]
pub fn is_expired(response: &OcspResponse, at: DateTime<Utc>, freshness: Duration) -> bool {
    let Ok(freshness) = TimeDelta::from_std(freshness) else {
        return false;
    };
    let Some(oldest_allowed) = at.checked_sub_signed(freshness) else {
        return false;
    };
    response
        .responses()
        .iter()
        .any(|single| single.this_update < oldest_allowed)
}

/// Verifies OCSP responses against one trust snapshot.
pub struct OcspVerifier<'a> {
    snapshot: &'a TrustSnapshot,
    cache: Option<&'a OcspValidityCache>,
}

impl<'a> OcspVerifier<'a> {
    /// Create a verifier reading responders and options from `snapshot`.
    #[must_use]
    pub fn new(snapshot: &'a TrustSnapshot) -> Self {
        Self {
            snapshot,
            cache: None,
        }
    }

    /// Memoize response authentication in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: Option<&'a OcspValidityCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Verify that `response` is an authentic, current statement about
    /// `subject` issued by `issuer`, without looking at the status.
    #[instrument(skip_all, fields(subject = %subject.subject(), issuer = %issuer.subject(), %at))]
    pub fn verify_validity(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
        at: DateTime<Utc>,
    ) -> Result<(), TrustError> {
        self.verify_validity_inner(response, subject, issuer, at)
            .map(|_| ())
    }

    /// Verify validity, then require the status to be good.
    pub fn verify_validity_and_status(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
        at: DateTime<Utc>,
    ) -> Result<CertStatus, TrustError> {
        let single = self.verify_validity_inner(response, subject, issuer, at)?;
        status_result(single, subject)
    }

    /// Require the status reported for `subject` to be good.
    pub fn verify_status(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
    ) -> Result<CertStatus, TrustError> {
        let single = response
            .single_response_for(subject, issuer)
            .ok_or_else(|| TrustError::validation_info("cert mismatch"))?;
        status_result(single, subject)
    }

    fn verify_validity_inner<'r>(
        &self,
        response: &'r OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
        at: DateTime<Utc>,
    ) -> Result<&'r SingleResponse, TrustError> {
        // 1. The response must be about this certificate.
        let single = response
            .single_response_for(subject, issuer)
            .ok_or_else(|| TrustError::validation_info("cert mismatch"))?;

        // 2. Signed by the responder it names.
        let responder = self.authenticated_responder(response, subject, issuer)?;

        // 3. That responder may speak for the issuer.
        if !self.is_authorized_signer(&responder, issuer) {
            debug!(responder = %responder.subject(), "OCSP responder not authorized for issuer");
            return Err(TrustError::validation_info("signer unauthorized"));
        }

        // 4. Not from the future.
        if single.this_update > at {
            return Err(TrustError::validation_info(format!(
                "thisUpdate after now ({} > {at})",
                single.this_update
            )));
        }

        let config = self.snapshot.config();
        if let Some(freshness) = config.ocsp_freshness {
            if is_expired(response, at, freshness) {
                return Err(TrustError::validation_info(format!(
                    "OCSP response is too old (thisUpdate: {})",
                    single.this_update
                )));
            }
        }

        // 5. Not superseded.
        if config.verify_next_update {
            if let Some(next_update) = single.next_update {
                if next_update < at {
                    return Err(TrustError::validation_info(format!(
                        "nextUpdate before now ({next_update} < {at})"
                    )));
                }
            }
        } else {
            trace!("OCSP nextUpdate verification is turned off");
        }

        Ok(single)
    }

    /// Locate the responder certificate and check the response signature,
    /// going through the validity cache when one is configured.
    fn authenticated_responder(
        &self,
        response: &OcspResponse,
        subject: &Certificate,
        issuer: &Certificate,
    ) -> Result<Certificate, TrustError> {
        let key = OcspCacheKey::new(response.der(), subject, issuer);
        if let Some(responder) = self.cache.and_then(|cache| cache.get(&key)) {
            return Ok(responder);
        }

        let responder = self.find_signer(response, issuer)?;
        if let Some(cache) = self.cache {
            cache.insert(key, responder.clone());
        }
        Ok(responder)
    }

    fn find_signer(
        &self,
        response: &OcspResponse,
        issuer: &Certificate,
    ) -> Result<Certificate, TrustError> {
        let responder_id = response.responder_id();
        let candidates = response
            .certs()
            .iter()
            .chain(self.snapshot.responders_for(issuer))
            .chain(self.snapshot.all_responders())
            .chain(std::iter::once(issuer))
            .chain(self.snapshot.ca_certs())
            .filter(|cert| responder_id.identifies(cert));

        let verifier = SpkiVerifier::new();
        let mut found_any = false;
        for candidate in candidates {
            found_any = true;
            let valid = verifier.verify_oid(
                response.signature_oid(),
                candidate.spki_der(),
                response.tbs_response_data(),
                response.signature(),
            );
            match valid {
                Ok(true) => {
                    trace!(responder = %candidate.subject(), "OCSP response signature verified");
                    return Ok(candidate.clone());
                },
                Ok(false) => {},
                Err(e) => trace!(responder = %candidate.subject(), error = %e, "candidate key unusable"),
            }
        }

        if found_any {
            Err(TrustError::validation_info("invalid response signature"))
        } else {
            Err(TrustError::validation_info(
                "invalid response signature: no certificate for responder ID",
            ))
        }
    }

    fn is_authorized_signer(&self, responder: &Certificate, issuer: &Certificate) -> bool {
        responder == issuer
            || self.snapshot.responders_for(issuer).contains(responder)
            || (responder.has_ocsp_signing_eku() && responder.is_issued_by(issuer))
    }
}

fn status_result(single: &SingleResponse, subject: &Certificate) -> Result<CertStatus, TrustError> {
    match single.status {
        CertStatus::Good => Ok(CertStatus::Good),
        status => Err(TrustError::CertValidation {
            subject: subject.subject().to_string(),
            status: status.to_string(),
        }),
    }
}
