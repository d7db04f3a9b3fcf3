//! End-to-end signature verification.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{TimeDelta, Utc};

use xrd_verify_core::resolver::DigestResolver;
use xrd_verify_core::signature::{attachment, HASH_CHAIN, HASH_CHAIN_RESULT, MESSAGE};
use xrd_verify_core::{
    DigestAlgorithm, DigestValue, HashChainBuilder, Identity, MessagePart, OcspValidityCache,
    SignatureContainer, SignatureVerifier, TrustError, TrustSnapshot, TrustStore,
};

use crate::support::{Hierarchy, Issued, SignatureBuilder};

const MESSAGE_BODY: &[u8] = b"<env:Envelope xmlns:env=\"http://schemas.xmlsoap.org/soap/envelope/\"><env:Body/></env:Envelope>";

fn member() -> Identity {
    Identity::new("EE", "GOV", "70000001")
}

struct Fixture {
    hierarchy: Hierarchy,
    store: TrustStore,
}

impl Fixture {
    /// Root, three intermediates and a signer for [`member`].
    fn new() -> Self {
        let hierarchy = Hierarchy::new(3, &member());
        let store = TrustStore::new(
            TrustSnapshot::builder()
                .anchor(hierarchy.root.cert.clone())
                .build(),
        );
        Self { hierarchy, store }
    }

    fn verifier(&self) -> SignatureVerifier {
        let cache = OcspValidityCache::from_config(self.store.snapshot().config());
        SignatureVerifier::new(self.store.clone(), Some(Arc::new(cache)))
    }

    /// Signature builder with the full chain and good OCSP evidence.
    fn signature(&self) -> SignatureBuilder<'_> {
        SignatureBuilder::new(&self.hierarchy.signer)
            .extra_certs(self.hierarchy.intermediate_certs())
            .ocsp(
                self.hierarchy
                    .good_responses(Utc::now() - TimeDelta::days(1)),
            )
    }
}

fn message() -> MessagePart {
    MessagePart::from_bytes(MESSAGE, MESSAGE_BODY)
}

#[test]
fn test_verifies_signed_message() {
    let fixture = Fixture::new();
    let xml = fixture.signature().reference(MESSAGE, MESSAGE_BODY).build();

    fixture
        .verifier()
        .verify(
            &SignatureContainer::new(xml),
            Some(&member()),
            Some(Utc::now()),
            &[message()],
        )
        .unwrap();
}

#[test]
fn test_verifies_without_expected_signer_or_date() {
    let fixture = Fixture::new();
    let xml = fixture.signature().reference(MESSAGE, MESSAGE_BODY).build();

    fixture
        .verifier()
        .verify(&SignatureContainer::new(xml), None, None, &[message()])
        .unwrap();
}

#[test]
fn test_message_with_attachments() {
    let fixture = Fixture::new();
    let xml = fixture
        .signature()
        .reference(MESSAGE, MESSAGE_BODY)
        .reference(&attachment(1), b"first attachment")
        .reference(&attachment(2), b"second attachment")
        .build();
    let verifier = fixture.verifier();
    let container = SignatureContainer::new(xml);

    let parts = vec![
        message(),
        MessagePart::from_bytes(attachment(1), b"first attachment".to_vec()),
        MessagePart::from_digest(
            attachment(2),
            DigestValue::compute(DigestAlgorithm::Sha256, b"second attachment"),
        ),
    ];
    verifier
        .verify(&container, Some(&member()), None, &parts)
        .unwrap();

    let mut swapped = parts.clone();
    swapped[1] = MessagePart::from_bytes(attachment(1), b"second attachment".to_vec());
    let err = verifier
        .verify(&container, Some(&member()), None, &swapped)
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidSignatureValue { .. }), "{err}");
}

#[test]
fn test_tampered_message() {
    let fixture = Fixture::new();
    let xml = fixture.signature().reference(MESSAGE, MESSAGE_BODY).build();

    let err = fixture
        .verifier()
        .verify(
            &SignatureContainer::new(xml),
            Some(&member()),
            None,
            &[MessagePart::from_bytes(MESSAGE, b"<forged/>".to_vec())],
        )
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidSignatureValue { .. }), "{err}");
    assert!(err.is_tamper_signal());
}

#[test]
fn test_tampered_signed_info() {
    let fixture = Fixture::new();
    let xml = fixture.signature().reference(MESSAGE, MESSAGE_BODY).build();

    // Point the reference at different content; the reference check passes
    // but the signature over SignedInfo no longer does.
    let forged = b"<forged/>";
    let original_digest = STANDARD.encode(xrd_crypto::digest(DigestAlgorithm::Sha256, MESSAGE_BODY));
    let forged_digest = STANDARD.encode(xrd_crypto::digest(DigestAlgorithm::Sha256, forged));
    let xml = String::from_utf8(xml)
        .unwrap()
        .replace(&original_digest, &forged_digest);

    let err = fixture
        .verifier()
        .verify(
            &SignatureContainer::new(xml),
            Some(&member()),
            None,
            &[MessagePart::from_bytes(MESSAGE, forged.to_vec())],
        )
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidSignatureValue { .. }), "{err}");
}

#[test]
fn test_wrong_signer() {
    let fixture = Fixture::new();
    let xml = fixture.signature().reference(MESSAGE, MESSAGE_BODY).build();

    let err = fixture
        .verifier()
        .verify(
            &SignatureContainer::new(xml),
            Some(&Identity::new("EE", "GOV", "70000002")),
            None,
            &[message()],
        )
        .unwrap_err();
    assert!(matches!(err, TrustError::IncorrectCertificate { .. }), "{err}");
}

#[test]
fn test_untrusted_root() {
    let fixture = Fixture::new();
    let xml = fixture.signature().reference(MESSAGE, MESSAGE_BODY).build();
    let store = TrustStore::new(
        TrustSnapshot::builder()
            .anchor(Issued::root("Some Other Root").cert)
            .build(),
    );

    let err = SignatureVerifier::new(store, None)
        .verify(&SignatureContainer::new(xml), None, None, &[message()])
        .unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }), "{err}");
}

#[test]
fn test_store_replacement_applies_to_later_calls() {
    let fixture = Fixture::new();
    let xml = fixture.signature().reference(MESSAGE, MESSAGE_BODY).build();
    let container = SignatureContainer::new(xml);
    let verifier = fixture.verifier();

    verifier.verify(&container, None, None, &[message()]).unwrap();

    fixture.store.replace(
        TrustSnapshot::builder()
            .anchor(Issued::root("Replacement Root").cert)
            .build(),
    );
    let err = verifier
        .verify(&container, None, None, &[message()])
        .unwrap_err();
    assert!(matches!(err, TrustError::PathBuildingFailed { .. }), "{err}");
}

#[test]
fn test_missing_ocsp_for_intermediate() {
    let fixture = Fixture::new();
    let mut responses = fixture
        .hierarchy
        .good_responses(Utc::now() - TimeDelta::days(1));
    responses.remove(2);
    let xml = SignatureBuilder::new(&fixture.hierarchy.signer)
        .extra_certs(fixture.hierarchy.intermediate_certs())
        .ocsp(responses)
        .reference(MESSAGE, MESSAGE_BODY)
        .build();

    let err = fixture
        .verifier()
        .verify(&SignatureContainer::new(xml), None, None, &[message()])
        .unwrap_err();
    assert!(matches!(err, TrustError::MissingOcspResponse { .. }), "{err}");
}

#[test]
fn test_no_ocsp_at_all() {
    let fixture = Fixture::new();
    let xml = SignatureBuilder::new(&fixture.hierarchy.signer)
        .extra_certs(fixture.hierarchy.intermediate_certs())
        .reference(MESSAGE, MESSAGE_BODY)
        .build();

    let err = fixture
        .verifier()
        .verify(&SignatureContainer::new(xml), None, None, &[message()])
        .unwrap_err();
    assert!(matches!(err, TrustError::MalformedSignature { .. }), "{err}");
}

#[test]
fn test_missing_part() {
    let fixture = Fixture::new();
    let xml = fixture
        .signature()
        .reference(MESSAGE, MESSAGE_BODY)
        .reference(&attachment(1), b"attachment")
        .build();

    let err = fixture
        .verifier()
        .verify(&SignatureContainer::new(xml), None, None, &[message()])
        .unwrap_err();
    assert_eq!(
        err,
        TrustError::InvalidReference {
            uri: attachment(1)
        }
    );
}

#[test]
fn test_unreferenced_part() {
    let fixture = Fixture::new();
    let xml = fixture.signature().reference(MESSAGE, MESSAGE_BODY).build();

    let err = fixture
        .verifier()
        .verify(
            &SignatureContainer::new(xml),
            None,
            None,
            &[
                message(),
                MessagePart::from_bytes(attachment(1), b"smuggled".to_vec()),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidSignatureValue { .. }), "{err}");
}

#[test]
fn test_not_xml() {
    let fixture = Fixture::new();
    let err = fixture
        .verifier()
        .verify(
            &SignatureContainer::new(b"<unterminated".to_vec()),
            None,
            None,
            &[message()],
        )
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidXml { .. }), "{err}");
}

/// Signs `messages` as one batch. Returns the signature, the hash chain
/// result and the hash chain of each message.
fn batch(fixture: &Fixture, messages: &[&[u8]]) -> (Vec<u8>, Vec<u8>, Vec<Vec<u8>>) {
    let mut builder = HashChainBuilder::new(DigestAlgorithm::Sha256);
    for (i, body) in messages.iter().enumerate() {
        let attachment_body = format!("attachment of message {i}");
        builder.add_group([
            (MESSAGE.to_string(), xrd_crypto::digest(DigestAlgorithm::Sha256, body)),
            (
                attachment(1),
                xrd_crypto::digest(DigestAlgorithm::Sha256, attachment_body.as_bytes()),
            ),
        ]);
    }
    let built = builder.build(HASH_CHAIN).unwrap();
    let result = built.result.to_xml().into_bytes();
    let chains = built
        .chains
        .iter()
        .map(|c| c.to_xml().into_bytes())
        .collect();

    let xml = fixture.signature().reference(HASH_CHAIN_RESULT, &result).build();
    (xml, result, chains)
}

fn batch_parts(i: usize, body: &[u8]) -> Vec<MessagePart> {
    vec![
        MessagePart::from_bytes(MESSAGE, body.to_vec()),
        MessagePart::from_bytes(attachment(1), format!("attachment of message {i}").into_bytes()),
    ]
}

#[test]
fn test_batch_signature() {
    let fixture = Fixture::new();
    let messages: [&[u8]; 3] = [b"<first/>", b"<second/>", b"<third/>"];
    let (xml, result, chains) = batch(&fixture, &messages);
    let verifier = fixture.verifier();

    for (i, body) in messages.iter().enumerate() {
        let container =
            SignatureContainer::new(xml.clone()).with_hash_chain(result.clone(), Some(chains[i].clone()));
        verifier
            .verify(&container, Some(&member()), Some(Utc::now()), &batch_parts(i, body))
            .unwrap();
    }
}

#[test]
fn test_batch_signature_tampered_message() {
    let fixture = Fixture::new();
    let messages: [&[u8]; 2] = [b"<first/>", b"<second/>"];
    let (xml, result, chains) = batch(&fixture, &messages);
    let container =
        SignatureContainer::new(xml).with_hash_chain(result, Some(chains[0].clone()));

    let err = fixture
        .verifier()
        .verify(&container, None, None, &batch_parts(0, b"<forged/>"))
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidHashChainResult { .. }), "{err}");
}

#[test]
fn test_batch_signature_wrong_chain() {
    let fixture = Fixture::new();
    let messages: [&[u8]; 2] = [b"<first/>", b"<second/>"];
    let (xml, result, chains) = batch(&fixture, &messages);
    let container =
        SignatureContainer::new(xml).with_hash_chain(result, Some(chains[1].clone()));

    let err = fixture
        .verifier()
        .verify(&container, None, None, &batch_parts(0, messages[0]))
        .unwrap_err();
    assert!(err.is_tamper_signal(), "{err}");
}

#[test]
fn test_batch_signature_tampered_result() {
    let fixture = Fixture::new();
    let messages: [&[u8]; 2] = [b"<first/>", b"<second/>"];
    let (xml, _, chains) = batch(&fixture, &messages);

    // A result from a different batch.
    let other: [&[u8]; 2] = [b"<other/>", b"<batch/>"];
    let (_, other_result, _) = batch(&fixture, &other);
    let container =
        SignatureContainer::new(xml).with_hash_chain(other_result, Some(chains[0].clone()));

    let err = fixture
        .verifier()
        .verify(&container, None, None, &batch_parts(0, messages[0]))
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidSignatureValue { .. }), "{err}");
}

#[test]
fn test_batch_chain_from_resolver() {
    struct ChainStore(Vec<u8>);

    impl DigestResolver for ChainStore {
        fn resolve(&self, uri: &str) -> Result<Vec<u8>, TrustError> {
            if uri == HASH_CHAIN {
                Ok(self.0.clone())
            } else {
                Err(TrustError::InvalidReference {
                    uri: uri.to_string(),
                })
            }
        }
    }

    let fixture = Fixture::new();
    let messages: [&[u8]; 2] = [b"<first/>", b"<second/>"];
    let (xml, result, chains) = batch(&fixture, &messages);
    let container = SignatureContainer::new(xml).with_hash_chain(result, None);

    let verifier = fixture
        .verifier()
        .with_resolver(Arc::new(ChainStore(chains[1].clone())));
    verifier
        .verify(&container, None, None, &batch_parts(1, messages[1]))
        .unwrap();
}
