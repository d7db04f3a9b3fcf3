//! Hash chain documents.

use std::collections::HashSet;
use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use der::asn1::{ObjectIdentifier, OctetStringRef};
use der::{Encode, EncodeValue, FixedTag, Length, Tag, Writer};
use spki::AlgorithmIdentifierRef;
use xrd_crypto::{DigestAlgorithm, DigestValue};

use crate::c14n::{self, EXC_C14N};
use crate::error::TrustError;
use crate::xml::{Document, Element};

/// Namespace of hash chain and hash chain result documents.
pub const HASH_CHAIN_NS: &str = "http://www.ria.ee/xroad/hashchain";

/// Base64 decoding transform.
pub const BASE64_TRANSFORM: &str = "http://www.w3.org/2000/09/xmldsig#base64";

/// Transform applied to referenced data before digesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Exclusive XML canonicalization of the document element.
    ExcC14n,
    /// Base64 decoding.
    Base64,
}

impl Transform {
    /// Algorithm URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::ExcC14n => EXC_C14N,
            Self::Base64 => BASE64_TRANSFORM,
        }
    }

    /// Look up a transform by algorithm URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::ExcC14n, Self::Base64]
            .into_iter()
            .find(|t| t.uri() == uri)
    }

    /// Apply the transform to `data`.
    pub fn apply(&self, data: &[u8]) -> Result<Vec<u8>, TrustError> {
        match self {
            Self::ExcC14n => {
                let doc = Document::parse_bytes(data).map_err(|e| {
                    TrustError::invalid_hash_chain_result(format!("cannot canonicalize input: {e}"))
                })?;
                Ok(c14n::canonicalize(doc.root()))
            },
            Self::Base64 => decode_base64(data).map_err(|e| {
                TrustError::invalid_hash_chain_result(format!("cannot decode input: {e}"))
            }),
        }
    }
}

/// One value in a hash step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepValue {
    /// Pre-computed digest of a sibling subtree.
    HashValue {
        /// Override of the chain's default algorithm.
        algorithm: Option<DigestAlgorithm>,
        /// Digest bytes.
        digest: Vec<u8>,
    },
    /// Digest of another hash step.
    StepRef {
        /// `[file]#STEPn`
        uri: String,
        /// Override of the chain's default algorithm.
        algorithm: Option<DigestAlgorithm>,
        /// Declared digest of the referenced step, if any.
        digest: Option<Vec<u8>>,
    },
    /// Digest of external data.
    DataRef {
        /// Name of the referenced input.
        uri: String,
        /// Transforms applied before digesting, in order.
        transforms: Vec<Transform>,
        /// Override of the chain's default algorithm.
        algorithm: Option<DigestAlgorithm>,
        /// Declared digest.
        digest: Vec<u8>,
    },
}

/// A hash step: an ordered list of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashStep {
    /// Fragment identifier, e.g. `STEP0`.
    pub id: String,
    /// Values in order.
    pub values: Vec<StepValue>,
}

/// A hash chain document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashChain {
    /// Algorithm for values without their own `DigestMethod`.
    pub default_algorithm: DigestAlgorithm,
    /// Steps in document order.
    pub steps: Vec<HashStep>,
}

impl HashChain {
    /// Parse a `HashChain` document.
    pub fn parse(xml: &[u8]) -> Result<Self, TrustError> {
        let doc = Document::parse_bytes(xml).map_err(malformed_xml)?;
        let root = doc.root();
        expect_name(root, "HashChain")?;

        let mut default_algorithm = None;
        let mut steps = Vec::new();
        let mut ids = HashSet::new();
        for child in root.elements() {
            match child.local_name.as_str() {
                _ if child.namespace.as_deref() != Some(HASH_CHAIN_NS) => {
                    return Err(unexpected(child));
                },
                "DefaultDigestMethod" if default_algorithm.is_none() && steps.is_empty() => {
                    default_algorithm = Some(parse_algorithm(child)?);
                },
                "HashStep" => {
                    let step = parse_step(child)?;
                    if !ids.insert(step.id.clone()) {
                        return Err(TrustError::malformed_hash_chain(format!(
                            "duplicate hash step id {}",
                            step.id
                        )));
                    }
                    steps.push(step);
                },
                _ => return Err(unexpected(child)),
            }
        }

        let default_algorithm = default_algorithm
            .ok_or_else(|| TrustError::malformed_hash_chain("missing DefaultDigestMethod"))?;
        if steps.is_empty() {
            return Err(TrustError::malformed_hash_chain("hash chain has no steps"));
        }
        Ok(Self {
            default_algorithm,
            steps,
        })
    }

    /// The step with fragment identifier `id`.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&HashStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Serialize as a `HashChain` document.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = format!("<HashChain xmlns=\"{HASH_CHAIN_NS}\">");
        write_digest_method(&mut out, "DefaultDigestMethod", self.default_algorithm);
        for step in &self.steps {
            let _ = write!(out, "<HashStep id=\"{}\">", escape(&step.id));
            for value in &step.values {
                write_value(&mut out, value);
            }
            out.push_str("</HashStep>");
        }
        out.push_str("</HashChain>");
        out
    }
}

/// A hash chain result document: the signed digest of a chain's top step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashChainResult {
    /// Digest of the top step's digest list.
    pub digest: DigestValue,
    /// `file#STEPn` of the top step.
    pub uri: String,
}

impl HashChainResult {
    /// Parse a `HashChainResult` document.
    pub fn parse(xml: &[u8]) -> Result<Self, TrustError> {
        let doc = Document::parse_bytes(xml).map_err(malformed_xml)?;
        let root = doc.root();
        expect_name(root, "HashChainResult")?;

        let mut elements = root.elements();
        let (Some(method), Some(value), Some(uri), None) =
            (elements.next(), elements.next(), elements.next(), elements.next())
        else {
            return Err(TrustError::malformed_hash_chain(
                "HashChainResult must contain DigestMethod, DigestValue and URI",
            ));
        };
        expect_name(method, "DigestMethod")?;
        expect_name(value, "DigestValue")?;
        expect_name(uri, "URI")?;

        let uri = uri.text().trim().to_string();
        if uri.is_empty() {
            return Err(TrustError::malformed_hash_chain("empty hash chain result URI"));
        }
        Ok(Self {
            digest: DigestValue::new(parse_algorithm(method)?, parse_digest(value)?),
            uri,
        })
    }

    /// Serialize as a `HashChainResult` document.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = format!("<HashChainResult xmlns=\"{HASH_CHAIN_NS}\">");
        write_digest_method(&mut out, "DigestMethod", self.digest.algorithm);
        let _ = write!(
            out,
            "<DigestValue>{}</DigestValue><URI>{}</URI></HashChainResult>",
            STANDARD.encode(&self.digest.bytes),
            escape(&self.uri)
        );
        out
    }
}

/// `DigestList ::= SEQUENCE OF SEQUENCE { digestAlgorithm AlgorithmIdentifier, digest OCTET STRING }`
struct DigestEntry<'a> {
    algorithm: AlgorithmIdentifierRef<'a>,
    digest: OctetStringRef<'a>,
}

impl<'a> DigestEntry<'a> {
    fn new(value: &'a DigestValue) -> der::Result<Self> {
        Ok(Self {
            algorithm: AlgorithmIdentifierRef {
                oid: ObjectIdentifier::new(value.algorithm.oid())?,
                parameters: None,
            },
            digest: OctetStringRef::new(&value.bytes)?,
        })
    }
}

impl EncodeValue for DigestEntry<'_> {
    fn value_len(&self) -> der::Result<Length> {
        self.algorithm.encoded_len()? + self.digest.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.algorithm.encode(writer)?;
        self.digest.encode(writer)
    }
}

impl FixedTag for DigestEntry<'_> {
    const TAG: Tag = Tag::Sequence;
}

/// DER `DigestList` over `digests`, the byte form of a hash step.
#[must_use]
pub fn digest_list(digests: &[DigestValue]) -> Vec<u8> {
    // Supported algorithms have valid OIDs and digests are far below the DER
    // length limit, so encoding cannot fail; an empty list never matches.
    digests
        .iter()
        .map(DigestEntry::new)
        .collect::<der::Result<Vec<_>>>()
        .and_then(|entries| entries.to_der())
        .unwrap_or_default()
}

/// Split `file#fragment`. The fragment must be non-empty.
pub(crate) fn split_step_uri(uri: &str) -> Result<(&str, &str), TrustError> {
    match uri.split_once('#') {
        Some((file, fragment)) if !fragment.is_empty() => Ok((file, fragment)),
        _ => Err(TrustError::malformed_hash_chain(format!(
            "invalid hash step URI {uri}"
        ))),
    }
}

pub(crate) fn decode_base64(data: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}

fn malformed_xml(e: TrustError) -> TrustError {
    TrustError::malformed_hash_chain(e.to_string())
}

fn unexpected(element: &Element) -> TrustError {
    TrustError::malformed_hash_chain(format!("unexpected element {}", element.qualified_name()))
}

fn expect_name(element: &Element, local: &str) -> Result<(), TrustError> {
    if element.is(HASH_CHAIN_NS, local) {
        Ok(())
    } else {
        Err(TrustError::malformed_hash_chain(format!(
            "expected {local}, found {}",
            element.qualified_name()
        )))
    }
}

fn parse_algorithm(element: &Element) -> Result<DigestAlgorithm, TrustError> {
    let uri = element.attr("Algorithm").ok_or_else(|| {
        TrustError::malformed_hash_chain(format!("{} has no Algorithm", element.local_name))
    })?;
    DigestAlgorithm::from_uri(uri)
        .ok_or_else(|| TrustError::malformed_hash_chain(format!("unsupported digest method {uri}")))
}

fn parse_digest(element: &Element) -> Result<Vec<u8>, TrustError> {
    decode_base64(element.text().as_bytes())
        .map_err(|e| TrustError::malformed_hash_chain(format!("invalid DigestValue: {e}")))
}

fn parse_step(element: &Element) -> Result<HashStep, TrustError> {
    let id = element
        .attr("id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| TrustError::malformed_hash_chain("HashStep without id"))?
        .to_string();

    let mut values = Vec::new();
    for child in element.elements() {
        if child.namespace.as_deref() != Some(HASH_CHAIN_NS) {
            return Err(unexpected(child));
        }
        values.push(match child.local_name.as_str() {
            "HashValue" => parse_hash_value(child)?,
            "StepRef" => parse_step_ref(child)?,
            "DataRef" => parse_data_ref(child)?,
            _ => return Err(unexpected(child)),
        });
    }
    if values.is_empty() {
        return Err(TrustError::malformed_hash_chain(format!("hash step {id} is empty")));
    }
    Ok(HashStep { id, values })
}

/// Children of a value element: optional `Transforms`, optional
/// `DigestMethod`, then `DigestValue`.
struct ValueParts<'e> {
    transforms: Option<&'e Element>,
    method: Option<&'e Element>,
    digest: Option<&'e Element>,
}

fn value_parts(element: &Element) -> Result<ValueParts<'_>, TrustError> {
    let mut parts = ValueParts {
        transforms: None,
        method: None,
        digest: None,
    };
    for child in element.elements() {
        let slot = match child.local_name.as_str() {
            _ if child.namespace.as_deref() != Some(HASH_CHAIN_NS) => return Err(unexpected(child)),
            "Transforms" if parts.method.is_none() && parts.digest.is_none() => &mut parts.transforms,
            "DigestMethod" if parts.digest.is_none() => &mut parts.method,
            "DigestValue" => &mut parts.digest,
            _ => return Err(unexpected(child)),
        };
        if slot.replace(child).is_some() {
            return Err(unexpected(child));
        }
    }
    Ok(parts)
}

fn required_digest(parts: &ValueParts<'_>, what: &str) -> Result<Vec<u8>, TrustError> {
    let element = parts
        .digest
        .ok_or_else(|| TrustError::malformed_hash_chain(format!("{what} without DigestValue")))?;
    parse_digest(element)
}

fn optional_algorithm(parts: &ValueParts<'_>) -> Result<Option<DigestAlgorithm>, TrustError> {
    parts.method.map(parse_algorithm).transpose()
}

fn required_uri(element: &Element) -> Result<String, TrustError> {
    element
        .attr("URI")
        .filter(|uri| !uri.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TrustError::malformed_hash_chain(format!("{} without URI", element.local_name)))
}

fn parse_hash_value(element: &Element) -> Result<StepValue, TrustError> {
    let parts = value_parts(element)?;
    if parts.transforms.is_some() {
        return Err(TrustError::malformed_hash_chain("HashValue cannot have transforms"));
    }
    Ok(StepValue::HashValue {
        algorithm: optional_algorithm(&parts)?,
        digest: required_digest(&parts, "HashValue")?,
    })
}

fn parse_step_ref(element: &Element) -> Result<StepValue, TrustError> {
    let uri = required_uri(element)?;
    split_step_uri(&uri)?;
    let parts = value_parts(element)?;
    if parts.transforms.is_some() {
        return Err(TrustError::malformed_hash_chain("StepRef cannot have transforms"));
    }
    Ok(StepValue::StepRef {
        algorithm: optional_algorithm(&parts)?,
        digest: parts.digest.map(parse_digest).transpose()?,
        uri,
    })
}

fn parse_data_ref(element: &Element) -> Result<StepValue, TrustError> {
    let uri = required_uri(element)?;
    let parts = value_parts(element)?;

    let mut transforms = Vec::new();
    if let Some(list) = parts.transforms {
        for transform in list.elements() {
            if !transform.is(HASH_CHAIN_NS, "Transform") {
                return Err(unexpected(transform));
            }
            let algorithm = transform.attr("Algorithm").unwrap_or_default();
            transforms.push(Transform::from_uri(algorithm).ok_or_else(|| {
                TrustError::malformed_hash_chain(format!("unsupported transform {algorithm}"))
            })?);
        }
    }

    Ok(StepValue::DataRef {
        transforms,
        algorithm: optional_algorithm(&parts)?,
        digest: required_digest(&parts, "DataRef")?,
        uri,
    })
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

fn write_digest_method(out: &mut String, element: &str, algorithm: DigestAlgorithm) {
    let _ = write!(out, "<{element} Algorithm=\"{}\"/>", algorithm.uri());
}

fn write_digest_value(out: &mut String, digest: &[u8]) {
    let _ = write!(out, "<DigestValue>{}</DigestValue>", STANDARD.encode(digest));
}

fn write_value(out: &mut String, value: &StepValue) {
    match value {
        StepValue::HashValue { algorithm, digest } => {
            out.push_str("<HashValue>");
            if let Some(alg) = algorithm {
                write_digest_method(out, "DigestMethod", *alg);
            }
            write_digest_value(out, digest);
            out.push_str("</HashValue>");
        },
        StepValue::StepRef {
            uri,
            algorithm,
            digest,
        } => {
            let _ = write!(out, "<StepRef URI=\"{}\">", escape(uri));
            if let Some(alg) = algorithm {
                write_digest_method(out, "DigestMethod", *alg);
            }
            if let Some(digest) = digest {
                write_digest_value(out, digest);
            }
            out.push_str("</StepRef>");
        },
        StepValue::DataRef {
            uri,
            transforms,
            algorithm,
            digest,
        } => {
            let _ = write!(out, "<DataRef URI=\"{}\">", escape(uri));
            if !transforms.is_empty() {
                out.push_str("<Transforms>");
                for transform in transforms {
                    let _ = write!(out, "<Transform Algorithm=\"{}\"/>", transform.uri());
                }
                out.push_str("</Transforms>");
            }
            if let Some(alg) = algorithm {
                write_digest_method(out, "DigestMethod", *alg);
            }
            write_digest_value(out, digest);
            out.push_str("</DataRef>");
        },
    }
}
