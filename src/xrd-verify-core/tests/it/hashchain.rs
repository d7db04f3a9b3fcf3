//! Hash chains spanning several documents, written by hand.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use xrd_verify_core::hashchain::{
    digest_list, inputs_from, HashChain, HashChainResult, HashStep, StepValue, Transform,
};
use xrd_verify_core::resolver::{DigestResolver, MapResolver, PartContent};
use xrd_verify_core::hashchain::MAX_STEP_DEPTH;
use xrd_verify_core::{DigestAlgorithm, DigestValue, HashChainVerifier, TrustError};

const SHA256: DigestAlgorithm = DigestAlgorithm::Sha256;

fn sha256(data: &[u8]) -> Vec<u8> {
    xrd_crypto::digest(SHA256, data)
}

fn data_ref(uri: &str, content: &[u8]) -> StepValue {
    StepValue::DataRef {
        uri: uri.to_string(),
        transforms: Vec::new(),
        algorithm: None,
        digest: sha256(content),
    }
}

fn chain(steps: Vec<(&str, Vec<StepValue>)>) -> String {
    HashChain {
        default_algorithm: SHA256,
        steps: steps
            .into_iter()
            .map(|(id, values)| HashStep {
                id: id.to_string(),
                values,
            })
            .collect(),
    }
    .to_xml()
}

fn result(uri: &str, top: &[u8]) -> Vec<u8> {
    HashChainResult {
        digest: DigestValue::compute(SHA256, top),
        uri: uri.to_string(),
    }
    .to_xml()
    .into_bytes()
}

fn bytes(content: &[u8]) -> Option<PartContent> {
    Some(PartContent::Bytes(content.to_vec()))
}

/// `/top.xml#STEP0` holds a sibling digest and a reference into
/// `/leaf.xml#STEP0`, which covers the message.
fn two_document_chain(message: &[u8]) -> (Vec<u8>, MapResolver) {
    let leaf_step = vec![data_ref("/message.xml", message)];
    let leaf_bytes = digest_list(&[DigestValue::new(SHA256, sha256(message))]);
    let leaf_digest = sha256(&leaf_bytes);

    let sibling = sha256(b"another message");
    let top_step = vec![
        StepValue::HashValue {
            algorithm: None,
            digest: sibling.clone(),
        },
        StepValue::StepRef {
            uri: "/leaf.xml#STEP0".to_string(),
            algorithm: None,
            digest: Some(leaf_digest.clone()),
        },
    ];
    let top_bytes = digest_list(&[
        DigestValue::new(SHA256, sibling),
        DigestValue::new(SHA256, leaf_digest),
    ]);

    let resolver = MapResolver::new()
        .with("/top.xml", chain(vec![("STEP0", top_step)]))
        .with("/leaf.xml", chain(vec![("STEP0", leaf_step)]));
    (result("/top.xml#STEP0", &top_bytes), resolver)
}

#[test]
fn test_step_reference_across_documents() {
    let (result, resolver) = two_document_chain(b"<message/>");
    let inputs = inputs_from([("/message.xml", bytes(b"<message/>"))]);

    HashChainVerifier::new(&resolver).verify(&result, &inputs).unwrap();
}

#[test]
fn test_tampered_leaf_across_documents() {
    let (result, resolver) = two_document_chain(b"<message/>");
    let inputs = inputs_from([("/message.xml", bytes(b"<message>changed</message>"))]);

    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &inputs)
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidHashChainResult { .. }), "{err}");
    assert!(err.is_tamper_signal());
}

#[test]
fn test_input_supplied_as_digest() {
    let (result, resolver) = two_document_chain(b"<message/>");
    let supplied = DigestValue::compute(SHA256, b"<message/>");
    let inputs = inputs_from([("/message.xml", Some(PartContent::Digest(supplied)))]);
    HashChainVerifier::new(&resolver).verify(&result, &inputs).unwrap();

    let other_algorithm = DigestValue::compute(DigestAlgorithm::Sha512, b"<message/>");
    let inputs = inputs_from([("/message.xml", Some(PartContent::Digest(other_algorithm)))]);
    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &inputs)
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidHashChainResult { .. }), "{err}");
}

#[test]
fn test_input_content_from_resolver() {
    let (result, resolver) = two_document_chain(b"<message/>");
    let resolver = resolver.with("/message.xml", b"<message/>".to_vec());
    let inputs = inputs_from([("/message.xml", None)]);

    HashChainVerifier::new(&resolver).verify(&result, &inputs).unwrap();
}

#[test]
fn test_missing_document() {
    let (result, _) = two_document_chain(b"<message/>");
    let inputs = inputs_from([("/message.xml", bytes(b"<message/>"))]);

    let err = HashChainVerifier::new(&MapResolver::new())
        .verify(&result, &inputs)
        .unwrap_err();
    assert_eq!(
        err,
        TrustError::InvalidReference {
            uri: "/top.xml".to_string()
        }
    );
}

#[test]
fn test_reference_cycle() {
    let steps = vec![
        (
            "STEP0",
            vec![StepValue::StepRef {
                uri: "#STEP1".to_string(),
                algorithm: None,
                digest: None,
            }],
        ),
        (
            "STEP1",
            vec![StepValue::StepRef {
                uri: "#STEP0".to_string(),
                algorithm: None,
                digest: None,
            }],
        ),
    ];
    let resolver = MapResolver::new().with("/chain.xml", chain(steps));
    let result = result("/chain.xml#STEP0", b"anything");

    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, TrustError::MalformedHashChain { .. }), "{err}");
}

#[test]
fn test_input_referenced_twice() {
    let message = b"<message/>";
    let step = vec![data_ref("/message.xml", message), data_ref("/message.xml", message)];
    let top = digest_list(&[
        DigestValue::new(SHA256, sha256(message)),
        DigestValue::new(SHA256, sha256(message)),
    ]);
    let resolver = MapResolver::new().with("/chain.xml", chain(vec![("STEP0", step)]));
    let result = result("/chain.xml#STEP0", &top);
    let inputs = inputs_from([("/message.xml", bytes(message))]);

    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &inputs)
        .unwrap_err();
    assert!(matches!(err, TrustError::MalformedHashChain { .. }), "{err}");
}

#[test]
fn test_resolved_input_referenced_twice() {
    let message = b"<message/>";
    let step = vec![data_ref("/message.xml", message), data_ref("/message.xml", message)];
    let top = digest_list(&[
        DigestValue::new(SHA256, sha256(message)),
        DigestValue::new(SHA256, sha256(message)),
    ]);
    let resolver = MapResolver::new()
        .with("/chain.xml", chain(vec![("STEP0", step)]))
        .with("/message.xml", message.to_vec());
    let result = result("/chain.xml#STEP0", &top);

    // The leaf is served by the resolver alone, not by the input map.
    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, TrustError::MalformedHashChain { .. }), "{err}");
}

#[test]
fn test_step_referenced_twice() {
    let step_ref = || StepValue::StepRef {
        uri: "#STEP1".to_string(),
        algorithm: None,
        digest: None,
    };
    let leaf = sha256(b"leaf");
    let leaf_bytes = digest_list(&[DigestValue::new(SHA256, leaf.clone())]);
    let top = digest_list(&[
        DigestValue::new(SHA256, sha256(&leaf_bytes)),
        DigestValue::new(SHA256, sha256(&leaf_bytes)),
    ]);
    let steps = vec![
        ("STEP0", vec![step_ref(), step_ref()]),
        (
            "STEP1",
            vec![StepValue::HashValue {
                algorithm: None,
                digest: leaf,
            }],
        ),
    ];
    let resolver = MapResolver::new().with("/chain.xml", chain(steps));
    let result = result("/chain.xml#STEP0", &top);

    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, TrustError::MalformedHashChain { .. }), "{err}");
}

/// A chain of `len` steps, each referencing the next, ending in one
/// precomputed digest.
fn linear_chain(len: usize) -> (Vec<u8>, MapResolver) {
    let last = sha256(b"bottom");
    let mut bytes = digest_list(&[DigestValue::new(SHA256, last.clone())]);
    for _ in 1..len {
        bytes = digest_list(&[DigestValue::new(SHA256, sha256(&bytes))]);
    }

    let ids: Vec<String> = (0..len).map(|i| format!("STEP{i}")).collect();
    let steps = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let value = if i + 1 == len {
                StepValue::HashValue {
                    algorithm: None,
                    digest: last.clone(),
                }
            } else {
                StepValue::StepRef {
                    uri: format!("#STEP{}", i + 1),
                    algorithm: None,
                    digest: None,
                }
            };
            (id.as_str(), vec![value])
        })
        .collect();
    let resolver = MapResolver::new().with("/chain.xml", chain(steps));
    (result("/chain.xml#STEP0", &bytes), resolver)
}

#[test]
fn test_step_depth_limit() {
    let (result, resolver) = linear_chain(MAX_STEP_DEPTH);
    HashChainVerifier::new(&resolver)
        .verify(&result, &HashMap::new())
        .unwrap();

    let (result, resolver) = linear_chain(MAX_STEP_DEPTH + 1);
    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, TrustError::MalformedHashChain { .. }), "{err}");

    let (result, resolver) = linear_chain(50_000);
    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, TrustError::MalformedHashChain { .. }), "{err}");
}

#[test]
fn test_base64_transform() {
    let payload = b"binary attachment \x00\x01\x02";
    let encoded = STANDARD.encode(payload);
    let step = vec![StepValue::DataRef {
        uri: "/attachment1".to_string(),
        transforms: vec![Transform::Base64],
        algorithm: None,
        digest: sha256(payload),
    }];
    let top = digest_list(&[DigestValue::new(SHA256, sha256(payload))]);
    let resolver = MapResolver::new().with("/chain.xml", chain(vec![("STEP0", step)]));
    let result = result("/chain.xml#STEP0", &top);

    let inputs = inputs_from([("/attachment1", bytes(encoded.as_bytes()))]);
    HashChainVerifier::new(&resolver).verify(&result, &inputs).unwrap();

    let inputs = inputs_from([("/attachment1", bytes(b"not base64!"))]);
    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &inputs)
        .unwrap_err();
    assert!(matches!(err, TrustError::InvalidHashChainResult { .. }), "{err}");
}

#[test]
fn test_result_must_name_document() {
    let resolver = MapResolver::new();
    let result = result("#STEP0", b"anything");

    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, TrustError::MalformedHashChain { .. }), "{err}");
}

/// Resolver for a deployment where attachments are stored elsewhere and
/// their declared digests are trusted.
struct DetachedAttachments(MapResolver);

impl DigestResolver for DetachedAttachments {
    fn should_resolve(&self, uri: &str, _digest: &[u8]) -> bool {
        !uri.starts_with("/attachment")
    }

    fn resolve(&self, uri: &str) -> Result<Vec<u8>, TrustError> {
        self.0.resolve(uri)
    }
}

#[test]
fn test_detached_attachment_still_consumed() {
    let message = b"<message/>";
    let attachment = b"large attachment";
    let step = vec![data_ref("/message.xml", message), data_ref("/attachment1", attachment)];
    let top = digest_list(&[
        DigestValue::new(SHA256, sha256(message)),
        DigestValue::new(SHA256, sha256(attachment)),
    ]);
    let resolver =
        DetachedAttachments(MapResolver::new().with("/chain.xml", chain(vec![("STEP0", step)])));
    let result = result("/chain.xml#STEP0", &top);

    let inputs = inputs_from([("/message.xml", bytes(message)), ("/attachment1", None)]);
    HashChainVerifier::new(&resolver).verify(&result, &inputs).unwrap();

    // An input the chain never mentions is still an error.
    let inputs = inputs_from([
        ("/message.xml", bytes(message)),
        ("/attachment1", None),
        ("/attachment2", None),
    ]);
    let err = HashChainVerifier::new(&resolver)
        .verify(&result, &inputs)
        .unwrap_err();
    assert_eq!(
        err,
        TrustError::UnusedHashChainInputs {
            inputs: vec!["/attachment2".to_string()]
        }
    );
}
