//! Signature verification.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use xrd_crypto::{DigestValue, SignatureEncoding, SpkiVerifier};

use super::container::{ParsedSignature, Reference, SignatureContainer};
use super::parts::{MessagePart, HASH_CHAIN, HASH_CHAIN_RESULT};
use crate::c14n;
use crate::cache::OcspValidityCache;
use crate::cert::Identity;
use crate::chain::CertChainVerifier;
use crate::config::{TrustSnapshot, TrustStore};
use crate::error::TrustError;
use crate::hashchain::HashChainVerifier;
use crate::resolver::{DigestResolver, LayeredResolver, MapResolver, PartContent};
use crate::xml::Document;

/// Verifies signed messages against the trust store.
///
/// Each call to [`SignatureVerifier::verify`] takes one snapshot of the
/// store and uses it throughout; replacing the store's contents does not
/// affect verifications already running.
#[derive(Clone)]
pub struct SignatureVerifier {
    store: TrustStore,
    cache: Option<Arc<OcspValidityCache>>,
    resolver: Option<Arc<dyn DigestResolver>>,
}

impl SignatureVerifier {
    /// Create a verifier over `store`, memoizing OCSP response checks in
    /// `cache` if given.
    #[must_use]
    pub fn new(store: TrustStore, cache: Option<Arc<OcspValidityCache>>) -> Self {
        Self {
            store,
            cache,
            resolver: None,
        }
    }

    /// Resolve hash chain references not satisfied by the container or the
    /// supplied parts through `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn DigestResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Verify `container` over `parts`.
    ///
    /// When `expected_signer` is given, the signing certificate must belong
    /// to it. Certificate validity windows are checked at `at_date`; without
    /// one they are skipped and OCSP time checks use the current time.
    #[instrument(skip_all, fields(parts = parts.len(), signer = expected_signer.map(tracing::field::display)))]
    pub fn verify(
        &self,
        container: &SignatureContainer,
        expected_signer: Option<&Identity>,
        at_date: Option<DateTime<Utc>>,
        parts: &[MessagePart],
    ) -> Result<(), TrustError> {
        let snapshot = self.store.snapshot();

        let signature = container.parse()?;
        debug!(signer = %signature.signing_cert().subject(), "signature parsed");

        if let Some(expected) = expected_signer {
            verify_signer(&snapshot, &signature, expected)?;
        }

        let chain_verifier = CertChainVerifier::new(&snapshot).with_cache(self.cache.as_deref());
        let chain = chain_verifier.build_chain(signature.signing_cert(), signature.extra_certs())?;
        chain_verifier.verify(&chain, signature.ocsp_responses(), at_date)?;
        debug!(depth = chain.len(), "certificate chain verified");

        match &container.hash_chain_result {
            Some(result) => self.verify_hash_chain(&signature, container, result, parts)?,
            None => verify_parts(&signature, parts)?,
        }

        verify_signature_value(&signature)?;
        debug!("signature verified");
        Ok(())
    }

    fn verify_hash_chain(
        &self,
        signature: &ParsedSignature,
        container: &SignatureContainer,
        result: &[u8],
        parts: &[MessagePart],
    ) -> Result<(), TrustError> {
        let reference = signature.reference(HASH_CHAIN_RESULT).ok_or_else(|| {
            TrustError::malformed_signature("signature does not reference the hash chain result")
        })?;
        if let Some(other) = signature
            .references()
            .iter()
            .find(|r| r.fragment().is_none() && r.uri != HASH_CHAIN_RESULT)
        {
            return Err(TrustError::malformed_signature(format!(
                "batch signature references {}",
                other.uri
            )));
        }
        if !reference_digest(reference, result)?.matches(&reference.digest) {
            return Err(TrustError::invalid_signature_value(
                "hash chain result does not match its reference",
            ));
        }

        let mut primary = MapResolver::new();
        if let Some(chain) = &container.hash_chain {
            primary.insert(HASH_CHAIN, chain.clone());
        }
        for part in parts {
            if let PartContent::Bytes(data) = &part.content {
                primary.insert(part.name.clone(), data.clone());
            }
        }
        let resolver = LayeredResolver {
            primary,
            fallback: self.resolver.as_deref(),
        };

        let inputs: HashMap<_, _> = parts
            .iter()
            .map(|part| (part.name.clone(), Some(part.content.clone())))
            .collect();
        HashChainVerifier::new(&resolver).verify(result, &inputs)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("store", &self.store)
            .field("cache", &self.cache.is_some())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

fn verify_signer(
    snapshot: &TrustSnapshot,
    signature: &ParsedSignature,
    expected: &Identity,
) -> Result<(), TrustError> {
    let actual = snapshot.identity_resolver().resolve(signature.signing_cert())?;
    if actual != *expected {
        warn!(%actual, %expected, "signer mismatch");
        return Err(TrustError::incorrect_certificate(format!(
            "name in certificate ({actual}) does not match expected signer ({expected})"
        )));
    }
    Ok(())
}

/// Digest of `data` as `reference` prescribes.
fn reference_digest(reference: &Reference, data: &[u8]) -> Result<DigestValue, TrustError> {
    let algorithm = reference.digest.algorithm;
    if !reference.canonicalize {
        return Ok(DigestValue::compute(algorithm, data));
    }
    let document = Document::parse_bytes(data).map_err(|e| {
        TrustError::invalid_signature_value(format!("cannot canonicalize {}: {e}", reference.uri))
    })?;
    Ok(DigestValue::compute(algorithm, &c14n::canonicalize(document.root())))
}

/// Check external references against `parts` one to one.
fn verify_parts(signature: &ParsedSignature, parts: &[MessagePart]) -> Result<(), TrustError> {
    for reference in signature.references().iter().filter(|r| r.fragment().is_none()) {
        let part = parts
            .iter()
            .find(|p| p.name == reference.uri)
            .ok_or_else(|| TrustError::InvalidReference {
                uri: reference.uri.clone(),
            })?;

        let actual = match &part.content {
            PartContent::Digest(d) if d.algorithm != reference.digest.algorithm => {
                return Err(TrustError::invalid_signature_value(format!(
                    "digest of {} uses {:?}, reference uses {:?}",
                    part.name, d.algorithm, reference.digest.algorithm
                )));
            },
            PartContent::Digest(d) => d.clone(),
            PartContent::Bytes(data) => reference_digest(reference, data)?,
        };
        if !actual.matches(&reference.digest) {
            return Err(TrustError::invalid_signature_value(format!(
                "digest of {} does not match reference",
                part.name
            )));
        }
    }

    if let Some(extra) = parts.iter().find(|p| signature.reference(&p.name).is_none()) {
        return Err(TrustError::invalid_signature_value(format!(
            "part {} is not covered by the signature",
            extra.name
        )));
    }
    Ok(())
}

/// Check same-document references and the signature value.
fn verify_signature_value(signature: &ParsedSignature) -> Result<(), TrustError> {
    for reference in signature.references() {
        let Some(id) = reference.fragment() else {
            continue;
        };
        let element = signature
            .element_by_id(id)
            .ok_or_else(|| TrustError::InvalidReference {
                uri: reference.uri.clone(),
            })?;
        let actual = DigestValue::compute(reference.digest.algorithm, &c14n::canonicalize(element));
        if !actual.matches(&reference.digest) {
            return Err(TrustError::invalid_signature_value(format!(
                "digest of {} does not match reference",
                reference.uri
            )));
        }
    }

    let verified = SpkiVerifier::new()
        .verify(
            signature.algorithm(),
            signature.signing_cert().spki_der(),
            signature.canonical_signed_info(),
            signature.value(),
            SignatureEncoding::Fixed,
        )
        .map_err(|e| TrustError::invalid_signature_value(e.to_string()))?;
    if !verified {
        return Err(TrustError::invalid_signature_value("signature is not valid"));
    }
    Ok(())
}
