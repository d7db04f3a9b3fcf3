//! OCSP response authentication and status.

use std::time::Duration;

use chrono::{TimeDelta, Utc};

use xrd_verify_core::ocsp::is_expired;
use xrd_verify_core::{
    CertStatus, Identity, OcspResponse, OcspValidityCache, OcspVerifier, TrustError,
    TrustSnapshot, VerifierConfig,
};

use crate::support::{Issued, OcspBuilder, Status};

struct Pki {
    root: Issued,
    ca: Issued,
    leaf: Issued,
}

fn pki() -> Pki {
    let root = Issued::root("Test Root CA");
    let ca = root.issue_ca("Test Signing CA");
    let leaf = ca.issue_signer(&Identity::new("EE", "COM", "12345678"));
    Pki { root, ca, leaf }
}

fn snapshot(pki: &Pki, config: VerifierConfig) -> TrustSnapshot {
    TrustSnapshot::builder()
        .config(config)
        .anchor(pki.root.cert.clone())
        .intermediate(pki.ca.cert.clone())
        .build()
}

fn check(
    snapshot: &TrustSnapshot,
    pki: &Pki,
    der: &[u8],
) -> Result<CertStatus, TrustError> {
    let response = OcspResponse::from_der(der)?;
    OcspVerifier::new(snapshot).verify_validity_and_status(
        &response,
        &pki.leaf.cert,
        &pki.ca.cert,
        Utc::now(),
    )
}

fn assert_validation_info(result: Result<CertStatus, TrustError>) {
    match result {
        Err(TrustError::IncorrectValidationInfo { .. }) => {},
        other => panic!("expected IncorrectValidationInfo, got {other:?}"),
    }
}

#[test]
fn test_signed_by_issuer() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca).build();

    assert_eq!(check(&snapshot, &pki, &der).unwrap(), CertStatus::Good);
}

#[test]
fn test_responder_by_key_hash() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca).by_key().build();

    assert_eq!(check(&snapshot, &pki, &der).unwrap(), CertStatus::Good);
}

#[test]
fn test_delegated_responder() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let responder = pki.ca.issue_responder("Test OCSP Responder");
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca)
        .signed_by(&responder)
        .build();

    assert_eq!(check(&snapshot, &pki, &der).unwrap(), CertStatus::Good);
}

#[test]
fn test_delegated_responder_needs_eku() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let not_responder = pki.ca.issue_signer(&Identity::new("EE", "COM", "87654321"));
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca)
        .signed_by(&not_responder)
        .build();

    assert_validation_info(check(&snapshot, &pki, &der));
}

#[test]
fn test_configured_responder() {
    let pki = pki();
    let outsider = Issued::root("Independent Responder");
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca)
        .signed_by(&outsider)
        .build();

    let unconfigured = snapshot(&pki, VerifierConfig::default());
    assert_validation_info(check(&unconfigured, &pki, &der));

    let configured = TrustSnapshot::builder()
        .anchor(pki.root.cert.clone())
        .intermediate(pki.ca.cert.clone())
        .ocsp_responder(&pki.ca.cert, outsider.cert.clone())
        .build();
    assert_eq!(check(&configured, &pki, &der).unwrap(), CertStatus::Good);
}

#[test]
fn test_bad_signature() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca)
        .corrupt_signature()
        .build();

    assert_validation_info(check(&snapshot, &pki, &der));
}

#[test]
fn test_response_for_other_certificate() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let other = pki.ca.issue_signer(&Identity::new("EE", "COM", "11111111"));
    let der = OcspBuilder::new(&other.cert, &pki.ca).build();

    assert_validation_info(check(&snapshot, &pki, &der));
}

#[test]
fn test_this_update_in_future() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca)
        .this_update(Utc::now() + TimeDelta::hours(1))
        .build();

    assert_validation_info(check(&snapshot, &pki, &der));
}

#[test]
fn test_next_update_check_can_be_disabled() {
    let pki = pki();
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca)
        .next_update(Utc::now() - TimeDelta::hours(1))
        .build();

    let strict = snapshot(&pki, VerifierConfig::default());
    assert_validation_info(check(&strict, &pki, &der));

    let lenient = snapshot(
        &pki,
        VerifierConfig {
            verify_next_update: false,
            ..VerifierConfig::default()
        },
    );
    assert_eq!(check(&lenient, &pki, &der).unwrap(), CertStatus::Good);
}

#[test]
fn test_freshness() {
    let pki = pki();
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca)
        .this_update(Utc::now() - TimeDelta::days(1))
        .build();

    let no_limit = snapshot(&pki, VerifierConfig::default());
    check(&no_limit, &pki, &der).unwrap();

    let hourly = snapshot(
        &pki,
        VerifierConfig {
            ocsp_freshness: Some(Duration::from_secs(3600)),
            ..VerifierConfig::default()
        },
    );
    assert_validation_info(check(&hourly, &pki, &der));

    let response = OcspResponse::from_der(&der).unwrap();
    assert!(is_expired(&response, Utc::now(), Duration::from_secs(3600)));
    assert!(!is_expired(&response, Utc::now(), Duration::from_secs(3 * 86_400)));
}

#[test]
fn test_revoked_and_unknown() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());

    for status in [Status::Revoked, Status::Unknown] {
        let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca).status(status).build();
        let response = OcspResponse::from_der(&der).unwrap();
        let verifier = OcspVerifier::new(&snapshot);

        // The response itself is valid; only the status is bad.
        verifier
            .verify_validity(&response, &pki.leaf.cert, &pki.ca.cert, Utc::now())
            .unwrap();
        let err = verifier
            .verify_validity_and_status(&response, &pki.leaf.cert, &pki.ca.cert, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TrustError::CertValidation { .. }), "{status:?}: {err}");
        assert!(err.is_definitive_revocation());
    }
}

#[test]
fn test_cache_records_authenticated_responder() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let cache = OcspValidityCache::new(Duration::from_secs(60), 16);
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca).build();
    let response = OcspResponse::from_der(&der).unwrap();
    let verifier = OcspVerifier::new(&snapshot).with_cache(Some(&cache));

    verifier
        .verify_validity(&response, &pki.leaf.cert, &pki.ca.cert, Utc::now())
        .unwrap();
    assert_eq!(cache.len(), 1);

    // Time checks are not cached.
    let err = verifier
        .verify_validity(
            &response,
            &pki.leaf.cert,
            &pki.ca.cert,
            Utc::now() - TimeDelta::days(2),
        )
        .unwrap_err();
    assert!(matches!(err, TrustError::IncorrectValidationInfo { .. }));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_failed_authentication_not_cached() {
    let pki = pki();
    let snapshot = snapshot(&pki, VerifierConfig::default());
    let cache = OcspValidityCache::from_config(snapshot.config());
    let der = OcspBuilder::new(&pki.leaf.cert, &pki.ca)
        .corrupt_signature()
        .build();
    let response = OcspResponse::from_der(&der).unwrap();

    let result = OcspVerifier::new(&snapshot).with_cache(Some(&cache)).verify_validity(
        &response,
        &pki.leaf.cert,
        &pki.ca.cert,
        Utc::now(),
    );
    assert!(result.is_err());
    assert!(cache.is_empty());
}
