//! OCSP response parsing (RFC 6960).

use chrono::{DateTime, Utc};
use der::asn1::{GeneralizedTime, ObjectIdentifier};
use der::{Decode, Encode};
use serde::Serialize;
use xrd_crypto::{constant_time_eq, DigestAlgorithm};

use super::asn1;
use crate::cert::Certificate;
use crate::error::TrustError;

/// Certificate status reported by an OCSP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertStatus {
    /// Not revoked.
    Good,
    /// Revoked at `time`.
    Revoked {
        /// Revocation time.
        time: DateTime<Utc>,
        /// CRLReason code, when given.
        reason: Option<u32>,
    },
    /// The responder does not know the certificate.
    Unknown,
}

impl std::fmt::Display for CertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => f.write_str("good"),
            Self::Revoked {
                time,
                reason: Some(reason),
            } => write!(f, "revoked at {time} (reason {reason})"),
            Self::Revoked { time, reason: None } => write!(f, "revoked at {time}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// How the response identifies its signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// DER `Name` of the responder certificate's subject.
    ByName(Vec<u8>),
    /// SHA-1 of the responder's public key bits.
    ByKey(Vec<u8>),
}

impl ResponderId {
    /// Whether `cert` is the certificate this ID names.
    #[must_use]
    pub fn identifies(&self, cert: &Certificate) -> bool {
        match self {
            Self::ByName(name) => name.as_slice() == cert.subject().raw(),
            Self::ByKey(hash) => {
                constant_time_eq(hash, &cert.public_key_hash(DigestAlgorithm::Sha1))
            },
        }
    }
}

/// CertID from a single response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    /// Hash used for the name and key hashes.
    pub hash_algorithm: DigestAlgorithm,
    /// Hash of the issuer's DER subject name.
    pub issuer_name_hash: Vec<u8>,
    /// Hash of the issuer's public key bits.
    pub issuer_key_hash: Vec<u8>,
    /// Serial number contents octets.
    pub serial: Vec<u8>,
}

impl CertId {
    /// Whether this ID designates `subject` as issued by `issuer`.
    #[must_use]
    pub fn matches(&self, subject: &Certificate, issuer: &Certificate) -> bool {
        let name_hash = xrd_crypto::digest(self.hash_algorithm, issuer.subject().raw());
        let key_hash = issuer.public_key_hash(self.hash_algorithm);
        self.serial == subject.serial()
            && constant_time_eq(&self.issuer_name_hash, &name_hash)
            && constant_time_eq(&self.issuer_key_hash, &key_hash)
    }
}

/// One entry of `responses` in the response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponse {
    /// Certificate this entry is about.
    pub cert_id: CertId,
    /// Reported status.
    pub status: CertStatus,
    /// Time the status was known to be correct.
    pub this_update: DateTime<Utc>,
    /// Time newer information will be available.
    pub next_update: Option<DateTime<Utc>>,
}

/// A parsed, successful basic OCSP response.
#[derive(Debug, Clone)]
pub struct OcspResponse {
    der: Vec<u8>,
    tbs_response_data: Vec<u8>,
    responder_id: ResponderId,
    produced_at: DateTime<Utc>,
    responses: Vec<SingleResponse>,
    signature_oid: String,
    signature: Vec<u8>,
    certs: Vec<Certificate>,
}

impl OcspResponse {
    /// Parse a DER `OCSPResponse`.
    ///
    /// Only successful responses of type id-pkix-ocsp-basic are accepted.
    pub fn from_der(der: &[u8]) -> Result<Self, TrustError> {
        let response = asn1::OcspResponse::from_der(der).map_err(invalid)?;
        let status = response.response_status.0;
        if status != asn1::STATUS_SUCCESSFUL {
            return Err(TrustError::validation_info(format!(
                "OCSP response status is {status}, not successful"
            )));
        }

        let bytes = response
            .response_bytes
            .ok_or_else(|| TrustError::validation_info("OCSP response has no response bytes"))?;
        if bytes.response_type != asn1::ID_PKIX_OCSP_BASIC {
            return Err(TrustError::validation_info(format!(
                "unsupported OCSP response type {}",
                bytes.response_type
            )));
        }
        let basic =
            asn1::BasicOcspResponse::from_der(bytes.response.as_bytes()).map_err(invalid)?;

        let mut result = Self::from_basic(basic)?;
        result.der = der.to_vec();
        Ok(result)
    }

    fn from_basic(basic: asn1::BasicOcspResponse) -> Result<Self, TrustError> {
        let tbs_response_data = basic.tbs_response_data.to_der().map_err(invalid)?;
        let signature_oid = canonical_oid(&basic.signature_algorithm.oid)?;
        let signature = basic
            .signature
            .as_bytes()
            .ok_or_else(|| TrustError::validation_info("OCSP signature is not octet aligned"))?
            .to_vec();

        let mut certs = Vec::new();
        for cert in basic.certs.unwrap_or_default() {
            let cert = cert
                .to_der()
                .map_err(invalid)
                .and_then(|der| Certificate::from_der(&der))
                .map_err(|e| {
                    TrustError::validation_info(format!("invalid OCSP responder certificate: {e}"))
                })?;
            certs.push(cert);
        }

        let data = basic.tbs_response_data;
        let responder_id = match data.responder_id {
            asn1::ResponderId::ByName(name) => ResponderId::ByName(name.to_der().map_err(invalid)?),
            asn1::ResponderId::ByKey(hash) => ResponderId::ByKey(hash.as_bytes().to_vec()),
        };
        if data.responses.is_empty() {
            return Err(TrustError::validation_info("OCSP response has no single responses"));
        }
        let responses = data
            .responses
            .into_iter()
            .map(single_response)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            der: Vec::new(),
            tbs_response_data,
            responder_id,
            produced_at: to_datetime(data.produced_at)?,
            responses,
            signature_oid,
            signature,
            certs,
        })
    }

    /// Complete DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// DER `tbsResponseData`, the signed portion.
    #[must_use]
    pub fn tbs_response_data(&self) -> &[u8] {
        &self.tbs_response_data
    }

    /// Responder identification.
    #[must_use]
    pub fn responder_id(&self) -> &ResponderId {
        &self.responder_id
    }

    /// When the response was signed.
    #[must_use]
    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    /// Every single response.
    #[must_use]
    pub fn responses(&self) -> &[SingleResponse] {
        &self.responses
    }

    /// Signature algorithm OID.
    #[must_use]
    pub fn signature_oid(&self) -> &str {
        &self.signature_oid
    }

    /// Signature over `tbsResponseData`.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Certificates embedded in the response.
    #[must_use]
    pub fn certs(&self) -> &[Certificate] {
        &self.certs
    }

    /// The single response about `subject` issued by `issuer`.
    #[must_use]
    pub fn single_response_for(
        &self,
        subject: &Certificate,
        issuer: &Certificate,
    ) -> Option<&SingleResponse> {
        self.responses
            .iter()
            .find(|single| single.cert_id.matches(subject, issuer))
    }

    /// Whether the response is about `subject` issued by `issuer`.
    #[must_use]
    pub fn matches(&self, subject: &Certificate, issuer: &Certificate) -> bool {
        self.single_response_for(subject, issuer).is_some()
    }
}

fn invalid(e: der::Error) -> TrustError {
    TrustError::validation_info(format!("malformed OCSP response: {e}"))
}

/// Dotted form of `oid`, rejecting encodings whose arcs overflow 32 bits.
fn canonical_oid(oid: &ObjectIdentifier) -> Result<String, TrustError> {
    let dotted = oid.to_string();
    match ObjectIdentifier::new(&dotted) {
        Ok(reencoded) if reencoded == *oid => Ok(dotted),
        _ => Err(TrustError::validation_info(
            "malformed OCSP response: object identifier arc out of range",
        )),
    }
}

fn to_datetime(time: GeneralizedTime) -> Result<DateTime<Utc>, TrustError> {
    let since_epoch = time.to_unix_duration();
    i64::try_from(since_epoch.as_secs())
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| TrustError::validation_info("OCSP time out of range"))
}

fn single_response(single: asn1::SingleResponse) -> Result<SingleResponse, TrustError> {
    let hash_oid = canonical_oid(&single.cert_id.hash_algorithm.oid)?;
    let hash_algorithm = DigestAlgorithm::from_oid(&hash_oid).ok_or_else(|| {
        TrustError::validation_info(format!("unsupported CertID hash algorithm {hash_oid}"))
    })?;

    let status = match single.cert_status {
        asn1::CertStatus::Good => CertStatus::Good,
        asn1::CertStatus::Revoked(info) => CertStatus::Revoked {
            time: to_datetime(info.revocation_time)?,
            reason: info.revocation_reason.map(|reason| u32::from(reason.0)),
        },
        asn1::CertStatus::Unknown => CertStatus::Unknown,
    };

    Ok(SingleResponse {
        cert_id: CertId {
            hash_algorithm,
            issuer_name_hash: single.cert_id.issuer_name_hash.into_bytes(),
            issuer_key_hash: single.cert_id.issuer_key_hash.into_bytes(),
            serial: single.cert_id.serial_number.as_bytes().to_vec(),
        },
        status,
        this_update: to_datetime(single.this_update)?,
        next_update: single.next_update.map(to_datetime).transpose()?,
    })
}
