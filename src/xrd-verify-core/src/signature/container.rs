//! XAdES signature containers.

use std::collections::HashMap;

use tracing::trace;
use xrd_crypto::{DigestAlgorithm, DigestValue, SignatureAlgorithm};

use crate::c14n::{self, EXC_C14N};
use crate::cert::Certificate;
use crate::error::TrustError;
use crate::hashchain::decode_base64;
use crate::ocsp::OcspResponse;
use crate::xml::{Document, Element};

/// XML-DSig namespace.
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XAdES 1.3.2 namespace.
pub const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// ASiC namespace of the `XAdESSignatures` wrapper.
pub const ASIC_NS: &str = "http://uri.etsi.org/02918/v1.2.1#";

/// A signature as received: the signature document and, for batch
/// signatures, the hash chain documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureContainer {
    /// `asic:XAdESSignatures` or bare `ds:Signature` document.
    pub signature_xml: Vec<u8>,
    /// Hash chain result the signature covers, for batch signatures.
    pub hash_chain_result: Option<Vec<u8>>,
    /// Hash chain linking this message to the result.
    pub hash_chain: Option<Vec<u8>>,
}

impl SignatureContainer {
    /// Container holding only a signature document.
    #[must_use]
    pub fn new(signature_xml: impl Into<Vec<u8>>) -> Self {
        Self {
            signature_xml: signature_xml.into(),
            ..Self::default()
        }
    }

    /// Attach batch signature documents.
    #[must_use]
    pub fn with_hash_chain(
        mut self,
        hash_chain_result: impl Into<Vec<u8>>,
        hash_chain: Option<Vec<u8>>,
    ) -> Self {
        self.hash_chain_result = Some(hash_chain_result.into());
        self.hash_chain = hash_chain;
        self
    }

    /// Parse the signature document.
    pub fn parse(&self) -> Result<ParsedSignature, TrustError> {
        ParsedSignature::parse(&self.signature_xml)
    }
}

/// A `ds:Reference` from `SignedInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Part name, or `#id` for an element of the signature itself.
    pub uri: String,
    /// Whether the referenced data is canonicalized before digesting.
    pub canonicalize: bool,
    /// Declared digest.
    pub digest: DigestValue,
}

impl Reference {
    /// Fragment identifier of a same-document reference.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.uri.strip_prefix('#')
    }
}

/// A structurally valid signature with its certificates and OCSP evidence
/// extracted.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    signature: Element,
    canonical_signed_info: Vec<u8>,
    algorithm: SignatureAlgorithm,
    value: Vec<u8>,
    references: Vec<Reference>,
    signing_cert: Certificate,
    extra_certs: Vec<Certificate>,
    ocsp_responses: Vec<OcspResponse>,
}

impl ParsedSignature {
    /// Parse and structurally check a signature document.
    pub fn parse(xml: &[u8]) -> Result<Self, TrustError> {
        let document = Document::parse_bytes(xml)?;
        let root = document.into_root();
        let signature = if root.is(DSIG_NS, "Signature") {
            root
        } else if root.is(ASIC_NS, "XAdESSignatures") {
            root.child(DSIG_NS, "Signature")
                .cloned()
                .ok_or_else(|| malformed("no signature in XAdESSignatures"))?
        } else {
            return Err(malformed(format!("unexpected root element {}", root.qualified_name())));
        };

        let signed_info = required(&signature, DSIG_NS, "SignedInfo")?;
        let c14n_method = required(signed_info, DSIG_NS, "CanonicalizationMethod")?;
        if c14n_method.attr("Algorithm") != Some(EXC_C14N) {
            return Err(malformed("unsupported canonicalization method"));
        }
        let method = required(signed_info, DSIG_NS, "SignatureMethod")?
            .attr("Algorithm")
            .unwrap_or_default();
        let algorithm = SignatureAlgorithm::from_uri(method)
            .ok_or_else(|| malformed(format!("unsupported signature method {method}")))?;

        let references = signed_info
            .children_named(DSIG_NS, "Reference")
            .map(parse_reference)
            .collect::<Result<Vec<_>, _>>()?;
        if references.is_empty() {
            return Err(malformed("SignedInfo has no references"));
        }

        let value = base64_text(required(&signature, DSIG_NS, "SignatureValue")?)?;

        let signing_cert = signature
            .child(DSIG_NS, "KeyInfo")
            .and_then(|k| k.child(DSIG_NS, "X509Data"))
            .and_then(|d| d.child(DSIG_NS, "X509Certificate"))
            .ok_or_else(|| malformed("signature does not contain signing certificate"))?;
        let signing_cert = Certificate::from_der(&base64_text(signing_cert)?)?;
        if !signing_cert.is_signing_cert() {
            return Err(malformed(format!(
                "certificate {} is not a signing certificate",
                signing_cert.subject()
            )));
        }

        let qualifying = signature
            .children_named(DSIG_NS, "Object")
            .find_map(|o| o.child(XADES_NS, "QualifyingProperties"));
        let unsigned = qualifying
            .and_then(|q| q.child(XADES_NS, "UnsignedProperties"))
            .and_then(|u| u.child(XADES_NS, "UnsignedSignatureProperties"));

        if let Some(expected) = qualifying
            .and_then(|q| q.child(XADES_NS, "SignedProperties"))
            .and_then(|s| s.child(XADES_NS, "SignedSignatureProperties"))
            .and_then(|s| s.child(XADES_NS, "SigningCertificate"))
        {
            check_signing_cert_digest(expected, &signing_cert)?;
        }

        let extra_certs = match unsigned {
            Some(unsigned) => parse_extra_certs(unsigned)?,
            None => Vec::new(),
        };

        let ocsp_responses = unsigned
            .and_then(|u| u.child(XADES_NS, "RevocationValues"))
            .and_then(|r| r.child(XADES_NS, "OCSPValues"))
            .map(|v| {
                v.children_named(XADES_NS, "EncapsulatedOCSPValue")
                    .map(|e| {
                        OcspResponse::from_der(&base64_text(e)?)
                            .map_err(|err| malformed(format!("unreadable OCSP response: {err}")))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        if ocsp_responses.is_empty() {
            return Err(malformed("signature does not contain OCSP responses"));
        }

        let canonical_signed_info = c14n::canonicalize(signed_info);
        trace!(
            references = references.len(),
            extra_certs = extra_certs.len(),
            ocsp = ocsp_responses.len(),
            "parsed signature"
        );

        Ok(Self {
            signature,
            canonical_signed_info,
            algorithm,
            value,
            references,
            signing_cert,
            extra_certs,
            ocsp_responses,
        })
    }

    /// Exclusive canonical form of `SignedInfo`, the signed bytes.
    #[must_use]
    pub fn canonical_signed_info(&self) -> &[u8] {
        &self.canonical_signed_info
    }

    /// Signature algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Decoded `SignatureValue`.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// References in `SignedInfo` order.
    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// The reference to `uri`, if any.
    #[must_use]
    pub fn reference(&self, uri: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.uri == uri)
    }

    /// Certificate the signature was made with.
    #[must_use]
    pub fn signing_cert(&self) -> &Certificate {
        &self.signing_cert
    }

    /// Encapsulated certificates other than the signing certificate.
    #[must_use]
    pub fn extra_certs(&self) -> &[Certificate] {
        &self.extra_certs
    }

    /// Encapsulated OCSP responses.
    #[must_use]
    pub fn ocsp_responses(&self) -> &[OcspResponse] {
        &self.ocsp_responses
    }

    /// Element of the signature with `Id` (or `id`) equal to `id`.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<&Element> {
        self.signature.find_by_id(id)
    }
}

fn malformed(reason: impl Into<String>) -> TrustError {
    TrustError::malformed_signature(reason)
}

fn required<'e>(parent: &'e Element, ns: &str, local: &str) -> Result<&'e Element, TrustError> {
    parent
        .child(ns, local)
        .ok_or_else(|| malformed(format!("{} has no {local}", parent.local_name)))
}

fn base64_text(element: &Element) -> Result<Vec<u8>, TrustError> {
    decode_base64(element.text().as_bytes())
        .map_err(|e| malformed(format!("invalid base64 in {}: {e}", element.local_name)))
}

fn digest_algorithm(method: &Element) -> Result<DigestAlgorithm, TrustError> {
    let uri = method.attr("Algorithm").unwrap_or_default();
    DigestAlgorithm::from_uri(uri).ok_or_else(|| malformed(format!("unsupported digest method {uri}")))
}

/// `ds:DigestMethod` and `ds:DigestValue` children of `parent`.
fn digest_of(parent: &Element) -> Result<DigestValue, TrustError> {
    let algorithm = digest_algorithm(required(parent, DSIG_NS, "DigestMethod")?)?;
    let bytes = base64_text(required(parent, DSIG_NS, "DigestValue")?)?;
    Ok(DigestValue::new(algorithm, bytes))
}

fn parse_reference(element: &Element) -> Result<Reference, TrustError> {
    let uri = element
        .attr("URI")
        .filter(|uri| !uri.is_empty() && *uri != "#")
        .ok_or_else(|| malformed("reference without URI"))?
        .to_string();

    let mut canonicalize = false;
    if let Some(transforms) = element.child(DSIG_NS, "Transforms") {
        for transform in transforms.elements() {
            match transform.attr("Algorithm") {
                Some(EXC_C14N) if transform.is(DSIG_NS, "Transform") => canonicalize = true,
                other => {
                    return Err(malformed(format!(
                        "unsupported transform {} on {uri}",
                        other.unwrap_or_default()
                    )))
                },
            }
        }
    }

    Ok(Reference {
        digest: digest_of(element)?,
        uri,
        canonicalize,
    })
}

fn cert_digest(cert: &Element) -> Result<DigestValue, TrustError> {
    digest_of(required(cert, XADES_NS, "CertDigest")?)
}

fn check_signing_cert_digest(
    signing_certificate: &Element,
    cert: &Certificate,
) -> Result<(), TrustError> {
    for candidate in signing_certificate.children_named(XADES_NS, "Cert") {
        let declared = cert_digest(candidate)?;
        if declared.matches_data(cert.der()) {
            return Ok(());
        }
    }
    Err(malformed("SigningCertificate digest does not match signing certificate"))
}

/// Encapsulated certificates, each of which must be listed with a matching
/// digest in `CompleteCertificateRefs`.
fn parse_extra_certs(unsigned: &Element) -> Result<Vec<Certificate>, TrustError> {
    let Some(values) = unsigned.child(XADES_NS, "CertificateValues") else {
        return Ok(Vec::new());
    };

    let mut refs: HashMap<&str, &Element> = HashMap::new();
    if let Some(cert_refs) = unsigned
        .child(XADES_NS, "CompleteCertificateRefs")
        .and_then(|c| c.child(XADES_NS, "CertRefs"))
    {
        for cert in cert_refs.children_named(XADES_NS, "Cert") {
            if let Some(id) = cert.attr("URI").and_then(|uri| uri.strip_prefix('#')) {
                refs.insert(id, cert);
            }
        }
    }

    let mut certs = Vec::new();
    for encapsulated in values.children_named(XADES_NS, "EncapsulatedX509Certificate") {
        let id = encapsulated
            .attr("Id")
            .ok_or_else(|| malformed("encapsulated certificate without Id"))?;
        let cert_ref = refs
            .get(id)
            .ok_or_else(|| malformed(format!("no certificate reference for {id}")))?;
        let der = base64_text(encapsulated)?;
        if !cert_digest(cert_ref)?.matches_data(&der) {
            return Err(malformed(format!("certificate digest mismatch for {id}")));
        }
        certs.push(Certificate::from_der(&der)?);
    }
    Ok(certs)
}
