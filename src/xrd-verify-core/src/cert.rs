//! X.509 certificates and signer identities.
//!
//! [`Certificate`] is an owned, immutable snapshot of the fields the
//! verification core needs, extracted once with `x509-parser`. Cloning is
//! cheap (shared `Arc`), so certificates can be handed between the trust
//! snapshot, chains and OCSP responses freely.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::trace;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::*;
use xrd_crypto::{DigestAlgorithm, SpkiVerifier};

use crate::error::TrustError;

/// id-ad-ocsp access method in Authority Information Access.
const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

/// Basic constraints extension values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraints {
    /// Whether the subject is a CA.
    pub ca: bool,
    /// Maximum number of non-self-issued intermediates below this CA.
    pub path_len: Option<u32>,
}

/// The key usage bits the verifier cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyUsage {
    /// digitalSignature
    pub digital_signature: bool,
    /// nonRepudiation (contentCommitment)
    pub non_repudiation: bool,
    /// keyCertSign
    pub key_cert_sign: bool,
    /// cRLSign
    pub crl_sign: bool,
}

/// A DER-encoded distinguished name with its display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistinguishedName {
    raw: Vec<u8>,
    display: String,
}

impl DistinguishedName {
    /// Raw DER encoding of the `Name`.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

#[derive(Debug)]
struct Inner {
    der: Vec<u8>,
    fingerprint: [u8; 32],
    subject: DistinguishedName,
    issuer: DistinguishedName,
    serial: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    spki_der: Vec<u8>,
    public_key_bits: Vec<u8>,
    tbs_der: Vec<u8>,
    signature_oid: String,
    signature: Vec<u8>,
    basic_constraints: Option<BasicConstraints>,
    key_usage: Option<KeyUsage>,
    ocsp_signing: bool,
    ocsp_urls: Vec<String>,
    country: Option<String>,
    organization: Option<String>,
    common_name: Option<String>,
}

/// A parsed X.509 certificate.
#[derive(Clone)]
pub struct Certificate(Arc<Inner>);

impl Certificate {
    /// Parse a DER-encoded certificate.
    ///
    /// Any parse failure is reported as `MalformedSignature`, since
    /// certificates reach the verifier embedded in signature containers.
    pub fn from_der(der: &[u8]) -> Result<Self, TrustError> {
        let (rest, cert) = X509Certificate::from_der(der)
            .map_err(|e| TrustError::malformed_signature(format!("invalid certificate: {e}")))?;
        if !rest.is_empty() {
            return Err(TrustError::malformed_signature(
                "trailing data after certificate",
            ));
        }
        Self::from_parsed(der, &cert)
    }

    /// Parse every certificate in a PEM bundle, or a single DER certificate.
    pub fn from_pem_or_der(data: &[u8]) -> Result<Vec<Self>, TrustError> {
        if !data.starts_with(b"-----BEGIN") {
            return Self::from_der(data).map(|cert| vec![cert]);
        }

        let mut certs = Vec::new();
        for pem in Pem::iter_from_buffer(data) {
            let pem =
                pem.map_err(|e| TrustError::malformed_signature(format!("invalid PEM: {e}")))?;
            if pem.label == "CERTIFICATE" {
                certs.push(Self::from_der(&pem.contents)?);
            }
        }
        if certs.is_empty() {
            return Err(TrustError::malformed_signature("no certificate in PEM data"));
        }
        Ok(certs)
    }

    fn from_parsed(der: &[u8], cert: &X509Certificate<'_>) -> Result<Self, TrustError> {
        let invalid = |what: &str, e: X509Error| {
            TrustError::malformed_signature(format!("invalid {what} extension: {e}"))
        };

        let basic_constraints = cert
            .basic_constraints()
            .map_err(|e| invalid("basic constraints", e))?
            .map(|ext| BasicConstraints {
                ca: ext.value.ca,
                path_len: ext.value.path_len_constraint,
            });

        let key_usage = cert
            .key_usage()
            .map_err(|e| invalid("key usage", e))?
            .map(|ext| KeyUsage {
                digital_signature: ext.value.digital_signature(),
                non_repudiation: ext.value.non_repudiation(),
                key_cert_sign: ext.value.key_cert_sign(),
                crl_sign: ext.value.crl_sign(),
            });

        let ocsp_signing = cert
            .extended_key_usage()
            .map_err(|e| invalid("extended key usage", e))?
            .is_some_and(|ext| ext.value.ocsp_signing);

        let mut ocsp_urls = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
                for desc in &aia.accessdescs {
                    if desc.access_method.to_id_string() == OID_AD_OCSP {
                        if let GeneralName::URI(uri) = &desc.access_location {
                            ocsp_urls.push(uri.to_string());
                        }
                    }
                }
            }
        }

        let subject = cert.subject();

        let not_before = to_datetime(cert.validity().not_before.timestamp())?;
        let not_after = to_datetime(cert.validity().not_after.timestamp())?;

        trace!(subject = %subject, "parsed certificate");

        Ok(Self(Arc::new(Inner {
            der: der.to_vec(),
            fingerprint: Sha256::digest(der).into(),
            subject: DistinguishedName {
                raw: subject.as_raw().to_vec(),
                display: subject.to_string(),
            },
            issuer: DistinguishedName {
                raw: cert.issuer().as_raw().to_vec(),
                display: cert.issuer().to_string(),
            },
            serial: cert.tbs_certificate.raw_serial().to_vec(),
            not_before,
            not_after,
            spki_der: cert.public_key().raw.to_vec(),
            public_key_bits: cert.public_key().subject_public_key.data.to_vec(),
            tbs_der: cert.tbs_certificate.as_ref().to_vec(),
            signature_oid: cert.signature_algorithm.algorithm.to_id_string(),
            signature: cert.signature_value.data.to_vec(),
            basic_constraints,
            key_usage,
            ocsp_signing,
            ocsp_urls,
            country: first_attr(subject.iter_country()),
            organization: first_attr(subject.iter_organization()),
            common_name: first_attr(subject.iter_common_name()),
        })))
    }

    /// DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.0.der
    }

    /// SHA-256 of the DER encoding.
    #[must_use]
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.0.fingerprint
    }

    /// Subject name.
    #[must_use]
    pub fn subject(&self) -> &DistinguishedName {
        &self.0.subject
    }

    /// Issuer name.
    #[must_use]
    pub fn issuer(&self) -> &DistinguishedName {
        &self.0.issuer
    }

    /// Serial number as INTEGER contents octets.
    #[must_use]
    pub fn serial(&self) -> &[u8] {
        &self.0.serial
    }

    /// Start of the validity window.
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.0.not_before
    }

    /// End of the validity window.
    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.0.not_after
    }

    /// DER SubjectPublicKeyInfo.
    #[must_use]
    pub fn spki_der(&self) -> &[u8] {
        &self.0.spki_der
    }

    /// Contents of the `subjectPublicKey` BIT STRING.
    #[must_use]
    pub fn public_key_bits(&self) -> &[u8] {
        &self.0.public_key_bits
    }

    /// Hash of the public key, as used in OCSP `byKey` responder IDs and
    /// CertID issuer key hashes.
    #[must_use]
    pub fn public_key_hash(&self, algorithm: DigestAlgorithm) -> Vec<u8> {
        xrd_crypto::digest(algorithm, &self.0.public_key_bits)
    }

    /// Basic constraints, if the extension is present.
    #[must_use]
    pub fn basic_constraints(&self) -> Option<BasicConstraints> {
        self.0.basic_constraints
    }

    /// Key usage, if the extension is present.
    #[must_use]
    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.0.key_usage
    }

    /// Whether the extended key usage includes id-kp-OCSPSigning.
    #[must_use]
    pub fn has_ocsp_signing_eku(&self) -> bool {
        self.0.ocsp_signing
    }

    /// OCSP responder URLs from Authority Information Access.
    #[must_use]
    pub fn ocsp_urls(&self) -> &[String] {
        &self.0.ocsp_urls
    }

    /// Whether the certificate is a CA according to basic constraints.
    #[must_use]
    pub fn is_ca(&self) -> bool {
        self.0.basic_constraints.is_some_and(|bc| bc.ca)
    }

    /// Whether subject and issuer names are equal.
    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        self.0.subject == self.0.issuer
    }

    /// Whether this certificate may sign messages: key usage must be present
    /// and include non-repudiation.
    #[must_use]
    pub fn is_signing_cert(&self) -> bool {
        self.0.key_usage.is_some_and(|ku| ku.non_repudiation)
    }

    /// Whether `at` falls inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.0.not_before <= at && at <= self.0.not_after
    }

    /// Whether `issuer`'s subject matches this certificate's issuer name and
    /// `issuer`'s key verifies this certificate's signature.
    #[must_use]
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        self.issuer() == issuer.subject() && self.verify_signed_by(issuer).unwrap_or(false)
    }

    /// Check this certificate's signature with `issuer`'s public key.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> Result<bool, TrustError> {
        Ok(SpkiVerifier::new().verify_oid(
            &self.0.signature_oid,
            issuer.spki_der(),
            &self.0.tbs_der,
            &self.0.signature,
        )?)
    }

    /// Country (C) of the subject.
    #[must_use]
    pub fn subject_country(&self) -> Option<&str> {
        self.0.country.as_deref()
    }

    /// Organization (O) of the subject.
    #[must_use]
    pub fn subject_organization(&self) -> Option<&str> {
        self.0.organization.as_deref()
    }

    /// Common name (CN) of the subject.
    #[must_use]
    pub fn subject_common_name(&self) -> Option<&str> {
        self.0.common_name.as_deref()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.0.fingerprint == other.0.fingerprint
    }
}

impl Eq for Certificate {}

impl std::hash::Hash for Certificate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.fingerprint.hash(state);
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.0.subject.display)
            .field("issuer", &self.0.issuer.display)
            .field("not_after", &self.0.not_after)
            .finish()
    }
}

fn first_attr<'a, 'b: 'a>(
    mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    values
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
}

fn to_datetime(timestamp: i64) -> Result<DateTime<Utc>, TrustError> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| TrustError::malformed_signature("certificate validity out of range"))
}

// ============================================================================
// Identity
// ============================================================================

/// Identity of a federation member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Federation instance identifier.
    pub instance: String,
    /// Member class.
    pub member_class: String,
    /// Member code.
    pub member_code: String,
}

impl Identity {
    /// Create a new identity.
    #[must_use]
    pub fn new(
        instance: impl Into<String>,
        member_class: impl Into<String>,
        member_code: impl Into<String>,
    ) -> Self {
        Self {
            instance: instance.into(),
            member_class: member_class.into(),
            member_code: member_code.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instance, self.member_class, self.member_code)
    }
}

impl FromStr for Identity {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(instance), Some(class), Some(code), None)
                if !instance.is_empty() && !class.is_empty() && !code.is_empty() =>
            {
                Ok(Self::new(instance, class, code))
            },
            _ => Err(TrustError::incorrect_certificate(format!(
                "identity must have the form INSTANCE/CLASS/CODE, got '{s}'"
            ))),
        }
    }
}

/// Maps a signing certificate to the member identity it speaks for.
pub trait IdentityResolver: Send + Sync {
    /// Resolve the identity of `cert`'s subject.
    fn resolve(&self, cert: &Certificate) -> Result<Identity, TrustError>;
}

/// Reads the identity from subject attributes: C is the instance, O the
/// member class and CN the member code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectNameIdentityResolver;

impl IdentityResolver for SubjectNameIdentityResolver {
    fn resolve(&self, cert: &Certificate) -> Result<Identity, TrustError> {
        let missing = |attr: &str| {
            TrustError::incorrect_certificate(format!(
                "subject {} has no {attr} attribute",
                cert.subject()
            ))
        };

        Ok(Identity::new(
            cert.subject_country().ok_or_else(|| missing("C"))?,
            cert.subject_organization().ok_or_else(|| missing("O"))?,
            cert.subject_common_name().ok_or_else(|| missing("CN"))?,
        ))
    }
}
