//! Error types for trust verification.
//!
//! Every failure of the verification core is one of these variants; there is
//! no partial-trust outcome. Variants are grouped into the categories
//! reported by [`TrustError::category`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Broad classification of a [`TrustError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    /// Input does not have the expected container or document shape.
    Structural,
    /// Certificate path cannot be established or is temporally invalid.
    TrustPath,
    /// OCSP evidence is unusable or gives a definitive negative answer.
    Revocation,
    /// Message content does not match what was signed.
    Integrity,
    /// Signer is not who the caller expected.
    Identity,
}

/// Errors that can occur during trust verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    /// Signature document is not well-formed XML.
    #[error("Invalid XML: {reason}")]
    InvalidXml {
        /// Parser diagnostic.
        reason: String,
    },

    /// Signature container is missing required parts or is inconsistent.
    #[error("Malformed signature: {reason}")]
    MalformedSignature {
        /// What is wrong with the container.
        reason: String,
    },

    /// Hash chain document failed structural validation.
    #[error("Malformed hash chain: {reason}")]
    MalformedHashChain {
        /// What is wrong with the document.
        reason: String,
    },

    /// No valid certification path to a trust anchor.
    #[error("Path building failed: {reason}")]
    PathBuildingFailed {
        /// Which link is missing or invalid.
        reason: String,
    },

    /// A certificate in the path expired before the verification date.
    #[error("Certificate {subject} expired at {not_after}")]
    CertificateExpired {
        /// Subject of the expired certificate.
        subject: String,
        /// End of its validity window.
        not_after: DateTime<Utc>,
    },

    /// A certificate in the path is not yet valid at the verification date.
    #[error("Certificate {subject} is not valid before {not_before}")]
    CertificateNotYetValid {
        /// Subject of the certificate.
        subject: String,
        /// Start of its validity window.
        not_before: DateTime<Utc>,
    },

    /// No OCSP response was supplied for a certificate in the path.
    #[error("Missing OCSP response for {subject}")]
    MissingOcspResponse {
        /// Subject of the certificate without revocation evidence.
        subject: String,
    },

    /// OCSP evidence is malformed, unauthorized or stale.
    #[error("Incorrect validation info: {reason}")]
    IncorrectValidationInfo {
        /// Which OCSP check failed.
        reason: String,
    },

    /// Certificate is revoked or its status is unknown.
    #[error("Certificate {subject} failed validation: {status}")]
    CertValidation {
        /// Subject of the certificate.
        subject: String,
        /// Reported status.
        status: String,
    },

    /// A hash chain step did not match its declared digest.
    #[error("Invalid hash chain reference to {uri}")]
    InvalidHashChainRef {
        /// Step reference that failed.
        uri: String,
    },

    /// Hash chain calculation does not yield the declared result.
    #[error("Invalid hash chain result: {reason}")]
    InvalidHashChainResult {
        /// What did not match.
        reason: String,
    },

    /// Inputs were supplied that the hash chain never references.
    #[error("Inputs not referenced by hash chain: {}", inputs.join(", "))]
    UnusedHashChainInputs {
        /// Unreferenced input names, sorted.
        inputs: Vec<String>,
    },

    /// Signature value or a signed reference does not verify.
    #[error("Invalid signature value: {reason}")]
    InvalidSignatureValue {
        /// What did not verify.
        reason: String,
    },

    /// A referenced resource could not be resolved.
    #[error("Cannot resolve reference: {uri}")]
    InvalidReference {
        /// The unresolvable URI.
        uri: String,
    },

    /// Signing certificate does not belong to the expected signer.
    #[error("Incorrect certificate: {reason}")]
    IncorrectCertificate {
        /// Expected versus actual identity.
        reason: String,
    },

    /// Cryptographic primitive failure.
    #[error("Crypto error: {0}")]
    Crypto(#[from] xrd_crypto::CryptoError),
}

impl TrustError {
    /// Create an invalid XML error.
    #[must_use]
    pub fn invalid_xml(reason: impl Into<String>) -> Self {
        Self::InvalidXml {
            reason: reason.into(),
        }
    }

    /// Create a malformed signature error.
    #[must_use]
    pub fn malformed_signature(reason: impl Into<String>) -> Self {
        Self::MalformedSignature {
            reason: reason.into(),
        }
    }

    /// Create a malformed hash chain error.
    #[must_use]
    pub fn malformed_hash_chain(reason: impl Into<String>) -> Self {
        Self::MalformedHashChain {
            reason: reason.into(),
        }
    }

    /// Create a path building error.
    #[must_use]
    pub fn path_building(reason: impl Into<String>) -> Self {
        Self::PathBuildingFailed {
            reason: reason.into(),
        }
    }

    /// Create an incorrect validation info error.
    #[must_use]
    pub fn validation_info(reason: impl Into<String>) -> Self {
        Self::IncorrectValidationInfo {
            reason: reason.into(),
        }
    }

    /// Create an invalid signature value error.
    #[must_use]
    pub fn invalid_signature_value(reason: impl Into<String>) -> Self {
        Self::InvalidSignatureValue {
            reason: reason.into(),
        }
    }

    /// Create an invalid hash chain result error.
    #[must_use]
    pub fn invalid_hash_chain_result(reason: impl Into<String>) -> Self {
        Self::InvalidHashChainResult {
            reason: reason.into(),
        }
    }

    /// Create an incorrect certificate error.
    #[must_use]
    pub fn incorrect_certificate(reason: impl Into<String>) -> Self {
        Self::IncorrectCertificate {
            reason: reason.into(),
        }
    }

    /// Stable error code, suitable for machine-readable output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidXml { .. } => "InvalidXml",
            Self::MalformedSignature { .. } => "MalformedSignature",
            Self::MalformedHashChain { .. } => "MalformedHashChain",
            Self::PathBuildingFailed { .. } => "PathBuildingFailed",
            Self::CertificateExpired { .. } => "CertificateExpired",
            Self::CertificateNotYetValid { .. } => "CertificateNotYetValid",
            Self::MissingOcspResponse { .. } => "MissingOcspResponse",
            Self::IncorrectValidationInfo { .. } => "IncorrectValidationInfo",
            Self::CertValidation { .. } => "CertValidation",
            Self::InvalidHashChainRef { .. } => "InvalidHashChainRef",
            Self::InvalidHashChainResult { .. } => "InvalidHashChainResult",
            Self::UnusedHashChainInputs { .. } => "UnusedHashChainInputs",
            Self::InvalidSignatureValue { .. } => "InvalidSignatureValue",
            Self::InvalidReference { .. } => "InvalidReference",
            Self::IncorrectCertificate { .. } => "IncorrectCertificate",
            Self::Crypto(_) => "CryptoError",
        }
    }

    /// Category this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidXml { .. }
            | Self::MalformedSignature { .. }
            | Self::MalformedHashChain { .. }
            | Self::Crypto(_) => ErrorCategory::Structural,
            Self::PathBuildingFailed { .. }
            | Self::CertificateExpired { .. }
            | Self::CertificateNotYetValid { .. }
            | Self::MissingOcspResponse { .. } => ErrorCategory::TrustPath,
            Self::IncorrectValidationInfo { .. } | Self::CertValidation { .. } => {
                ErrorCategory::Revocation
            },
            Self::InvalidHashChainRef { .. }
            | Self::InvalidHashChainResult { .. }
            | Self::UnusedHashChainInputs { .. }
            | Self::InvalidSignatureValue { .. }
            | Self::InvalidReference { .. } => ErrorCategory::Integrity,
            Self::IncorrectCertificate { .. } => ErrorCategory::Identity,
        }
    }

    /// Check if this error means the content was altered after signing.
    #[must_use]
    pub fn is_tamper_signal(&self) -> bool {
        matches!(
            self,
            Self::InvalidHashChainRef { .. }
                | Self::InvalidHashChainResult { .. }
                | Self::UnusedHashChainInputs { .. }
                | Self::InvalidSignatureValue { .. }
        )
    }

    /// Check if the certificate was definitively rejected (revoked or unknown),
    /// as opposed to the evidence being unusable.
    #[must_use]
    pub fn is_definitive_revocation(&self) -> bool {
        matches!(self, Self::CertValidation { .. })
    }
}
