//! Certification path building and validation.

use chrono::{TimeDelta, TimeZone, Utc};

use xrd_verify_core::{
    CertChain, CertChainVerifier, Identity, OcspResponse, TrustError, TrustSnapshot,
    VerifierConfig,
};

use crate::support::{Hierarchy, Issued, OcspBuilder, Status};

fn member() -> Identity {
    Identity::new("EE", "GOV", "70000001")
}

fn snapshot_for(hierarchy: &Hierarchy) -> TrustSnapshot {
    TrustSnapshot::builder()
        .anchor(hierarchy.root.cert.clone())
        .build()
}

fn parse(responses: &[Vec<u8>]) -> Vec<OcspResponse> {
    responses
        .iter()
        .map(|der| OcspResponse::from_der(der).unwrap())
        .collect()
}

#[test]
fn test_builds_path_from_pool() {
    let hierarchy = Hierarchy::new(3, &member());
    let snapshot = snapshot_for(&hierarchy);
    let verifier = CertChainVerifier::new(&snapshot);

    let chain = verifier
        .build_chain(&hierarchy.signer.cert, &hierarchy.intermediate_certs())
        .unwrap();
    assert_eq!(chain.len(), 5);
    assert_eq!(chain.subject(), &hierarchy.signer.cert);
    assert_eq!(chain.trust_anchor(), &hierarchy.root.cert);

    verifier.verify_chain_only(&chain, Some(Utc::now())).unwrap();
}

#[test]
fn test_builds_path_from_snapshot_intermediates() {
    let hierarchy = Hierarchy::new(2, &member());
    let snapshot = TrustSnapshot::builder()
        .anchor(hierarchy.root.cert.clone())
        .intermediates(hierarchy.intermediate_certs())
        .build();
    let verifier = CertChainVerifier::new(&snapshot);

    let chain = verifier.build_chain(&hierarchy.signer.cert, &[]).unwrap();
    assert_eq!(chain.len(), 4);
}

#[test]
fn test_pool_order_does_not_matter() {
    let hierarchy = Hierarchy::new(3, &member());
    let snapshot = snapshot_for(&hierarchy);
    let verifier = CertChainVerifier::new(&snapshot);

    let mut pool = hierarchy.intermediate_certs();
    pool.reverse();
    pool.push(Issued::root("Unrelated CA").cert);

    let chain = verifier.build_chain(&hierarchy.signer.cert, &pool).unwrap();
    assert_eq!(chain.len(), 5);
}

#[test]
fn test_missing_intermediate() {
    let hierarchy = Hierarchy::new(3, &member());
    let snapshot = snapshot_for(&hierarchy);
    let verifier = CertChainVerifier::new(&snapshot);

    let mut pool = hierarchy.intermediate_certs();
    pool.remove(1);

    let err = verifier
        .build_chain(&hierarchy.signer.cert, &pool)
        .unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }), "{err}");
}

#[test]
fn test_unknown_root() {
    let hierarchy = Hierarchy::new(1, &member());
    let snapshot = TrustSnapshot::builder()
        .anchor(Issued::root("Some Other Root").cert)
        .build();
    let verifier = CertChainVerifier::new(&snapshot);

    let err = verifier
        .build_chain(&hierarchy.signer.cert, &hierarchy.intermediate_certs())
        .unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }));

    // A chain assembled by hand still has to end at a configured anchor.
    let chain = CertChain::new(
        vec![hierarchy.signer.cert.clone(), hierarchy.intermediates[0].cert.clone()],
        hierarchy.root.cert.clone(),
    )
    .unwrap();
    let err = verifier.verify_chain_only(&chain, None).unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }));
}

#[test]
fn test_non_ca_issuer_rejected() {
    let root = Issued::root("Test Root CA");
    let not_ca = root.issue_non_ca("Not A CA");
    let signer = not_ca.issue_signer(&member());
    let snapshot = TrustSnapshot::builder().anchor(root.cert.clone()).build();
    let verifier = CertChainVerifier::new(&snapshot);

    let err = verifier
        .build_chain(&signer.cert, &[not_ca.cert.clone()])
        .unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }));

    let chain = CertChain::new(vec![signer.cert.clone(), not_ca.cert.clone()], root.cert.clone())
        .unwrap();
    let err = verifier.verify_chain_only(&chain, None).unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }));
}

#[test]
fn test_path_length_constraint() {
    let root = Issued::root("Test Root CA");
    let constrained = root.issue_constrained_ca("Constrained CA", 0);
    let below = constrained.issue_ca("Sub CA");
    let signer = below.issue_signer(&member());
    let snapshot = TrustSnapshot::builder().anchor(root.cert.clone()).build();
    let verifier = CertChainVerifier::new(&snapshot);

    let chain = verifier
        .build_chain(&signer.cert, &[constrained.cert.clone(), below.cert.clone()])
        .unwrap();
    let err = verifier.verify_chain_only(&chain, None).unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }));
}

#[test]
fn test_max_depth() {
    let hierarchy = Hierarchy::new(3, &member());
    let pool = hierarchy.intermediate_certs();

    let shallow = TrustSnapshot::builder()
        .config(VerifierConfig {
            max_path_depth: 4,
            ..VerifierConfig::default()
        })
        .anchor(hierarchy.root.cert.clone())
        .build();
    let err = CertChainVerifier::new(&shallow)
        .build_chain(&hierarchy.signer.cert, &pool)
        .unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }));

    let exact = TrustSnapshot::builder()
        .config(VerifierConfig {
            max_path_depth: 5,
            ..VerifierConfig::default()
        })
        .anchor(hierarchy.root.cert.clone())
        .build();
    let chain = CertChainVerifier::new(&exact)
        .build_chain(&hierarchy.signer.cert, &pool)
        .unwrap();

    // A chain built elsewhere is still held to the limit.
    let err = CertChainVerifier::new(&shallow)
        .verify_chain_only(&chain, None)
        .unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }));
}

#[test]
fn test_validity_window() {
    let root = Issued::root("Test Root CA");
    let leaf = root.issue_leaf_valid("Short Lived", 2020, 2021);
    let snapshot = TrustSnapshot::builder().anchor(root.cert.clone()).build();
    let verifier = CertChainVerifier::new(&snapshot);
    let chain = verifier.build_chain(&leaf.cert, &[]).unwrap();

    let inside = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
    verifier.verify_chain_only(&chain, Some(inside)).unwrap();

    let after = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let err = verifier.verify_chain_only(&chain, Some(after)).unwrap_err();
    assert!(matches!(err, TrustError::CertificateExpired { .. }), "{err}");

    let before = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
    let err = verifier.verify_chain_only(&chain, Some(before)).unwrap_err();
    assert!(matches!(err, TrustError::CertificateNotYetValid { .. }), "{err}");

    // No date, no window check.
    verifier.verify_chain_only(&chain, None).unwrap();
}

#[test]
fn test_verify_with_ocsp() {
    let hierarchy = Hierarchy::new(3, &member());
    let snapshot = snapshot_for(&hierarchy);
    let verifier = CertChainVerifier::new(&snapshot);
    let chain = verifier
        .build_chain(&hierarchy.signer.cert, &hierarchy.intermediate_certs())
        .unwrap();

    let responses = parse(&hierarchy.good_responses(Utc::now() - TimeDelta::days(1)));
    verifier.verify(&chain, &responses, Some(Utc::now())).unwrap();
    verifier.verify(&chain, &responses, None).unwrap();
}

#[test]
fn test_missing_ocsp_response() {
    let hierarchy = Hierarchy::new(2, &member());
    let snapshot = snapshot_for(&hierarchy);
    let verifier = CertChainVerifier::new(&snapshot);
    let chain = verifier
        .build_chain(&hierarchy.signer.cert, &hierarchy.intermediate_certs())
        .unwrap();

    let mut responses = parse(&hierarchy.good_responses(Utc::now() - TimeDelta::days(1)));
    responses.remove(1);

    let err = verifier.verify(&chain, &responses, None).unwrap_err();
    assert!(matches!(err, TrustError::MissingOcspResponse { .. }), "{err}");
}

#[test]
fn test_revoked_intermediate() {
    let hierarchy = Hierarchy::new(2, &member());
    let snapshot = snapshot_for(&hierarchy);
    let verifier = CertChainVerifier::new(&snapshot);
    let chain = verifier
        .build_chain(&hierarchy.signer.cert, &hierarchy.intermediate_certs())
        .unwrap();

    let links = hierarchy.links();
    let responses: Vec<Vec<u8>> = links
        .iter()
        .enumerate()
        .map(|(i, (cert, issuer))| {
            let status = if i == 1 { Status::Revoked } else { Status::Good };
            OcspBuilder::new(&cert.cert, issuer).status(status).build()
        })
        .collect();

    let err = verifier.verify(&chain, &parse(&responses), None).unwrap_err();
    match err {
        TrustError::CertValidation { subject, status } => {
            assert!(subject.contains("Test Intermediate CA 2"), "{subject}");
            assert!(status.starts_with("revoked"), "{status}");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_responses() {
    let hierarchy = Hierarchy::new(1, &member());
    let snapshot = snapshot_for(&hierarchy);
    let verifier = CertChainVerifier::new(&snapshot);
    let chain = verifier
        .build_chain(&hierarchy.signer.cert, &hierarchy.intermediate_certs())
        .unwrap();

    let mut responses = hierarchy.good_responses(Utc::now() - TimeDelta::days(1));

    // Byte-identical copies are one response.
    responses.push(responses[0].clone());
    verifier.verify(&chain, &parse(&responses), None).unwrap();

    // Two different responses about the same certificate are ambiguous.
    let (signer, issuer) = hierarchy.links()[0];
    responses.push(
        OcspBuilder::new(&signer.cert, issuer)
            .this_update(Utc::now() - TimeDelta::hours(2))
            .build(),
    );
    let err = verifier.verify(&chain, &parse(&responses), None).unwrap_err();
    assert!(matches!(err, TrustError::IncorrectValidationInfo { .. }), "{err}");
}
