//! DER structures of RFC 6960 responses.
//!
//! ```text
//! OCSPResponse ::= SEQUENCE {
//!    responseStatus         OCSPResponseStatus,
//!    responseBytes          [0] EXPLICIT ResponseBytes OPTIONAL }
//!
//! BasicOCSPResponse ::= SEQUENCE {
//!    tbsResponseData      ResponseData,
//!    signatureAlgorithm   AlgorithmIdentifier,
//!    signature            BIT STRING,
//!    certs            [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL }
//! ```
//!
//! Every type decodes strict DER and encodes back to identical bytes, so the
//! signed `tbsResponseData` is recovered by re-encoding it.

use der::asn1::{
    Any, BitString, ContextSpecific, ContextSpecificRef, GeneralizedTime, Int, Null,
    ObjectIdentifier, OctetString,
};
use der::{
    Decode, DecodeValue, Encode, EncodeValue, FixedTag, Header, Length, Reader, Sequence, Tag,
    TagMode, TagNumber, Tagged, Writer,
};
use spki::AlgorithmIdentifierOwned;

/// id-pkix-ocsp-basic
pub const ID_PKIX_OCSP_BASIC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");

/// `successful` response status.
pub const STATUS_SUCCESSFUL: u8 = 0;

/// ASN.1 `ENUMERATED` holding a small value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Enumerated(pub u8);

impl<'a> DecodeValue<'a> for Enumerated {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        u8::decode_value(reader, header).map(Self)
    }
}

impl EncodeValue for Enumerated {
    fn value_len(&self) -> der::Result<Length> {
        self.0.value_len()
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.0.encode_value(writer)
    }
}

impl FixedTag for Enumerated {
    const TAG: Tag = Tag::Enumerated;
}

fn explicit<T>(tag_number: TagNumber, value: &T) -> ContextSpecificRef<'_, T> {
    ContextSpecificRef {
        tag_number,
        tag_mode: TagMode::Explicit,
        value,
    }
}

fn implicit<T>(tag_number: TagNumber, value: &T) -> ContextSpecificRef<'_, T> {
    ContextSpecificRef {
        tag_number,
        tag_mode: TagMode::Implicit,
        value,
    }
}

fn optional_explicit<'a, T, R>(reader: &mut R, tag_number: TagNumber) -> der::Result<Option<T>>
where
    T: Decode<'a>,
    R: Reader<'a>,
{
    Ok(ContextSpecific::<T>::decode_explicit(reader, tag_number)?.map(|field| field.value))
}

/// `OCSPResponse`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OcspResponse {
    /// `responseStatus`; zero is successful.
    pub response_status: Enumerated,
    /// `responseBytes`, present on success.
    pub response_bytes: Option<ResponseBytes>,
}

impl<'a> DecodeValue<'a> for OcspResponse {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            Ok(Self {
                response_status: reader.decode()?,
                response_bytes: optional_explicit(reader, TagNumber::N0)?,
            })
        })
    }
}

impl EncodeValue for OcspResponse {
    fn value_len(&self) -> der::Result<Length> {
        let bytes = self
            .response_bytes
            .as_ref()
            .map(|b| explicit(TagNumber::N0, b));
        self.response_status.encoded_len()? + bytes.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.response_status.encode(writer)?;
        self.response_bytes
            .as_ref()
            .map(|b| explicit(TagNumber::N0, b))
            .encode(writer)
    }
}

impl<'a> Sequence<'a> for OcspResponse {}

/// `ResponseBytes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseBytes {
    /// `responseType`.
    pub response_type: ObjectIdentifier,
    /// DER of the typed response.
    pub response: OctetString,
}

impl<'a> DecodeValue<'a> for ResponseBytes {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            Ok(Self {
                response_type: reader.decode()?,
                response: reader.decode()?,
            })
        })
    }
}

impl EncodeValue for ResponseBytes {
    fn value_len(&self) -> der::Result<Length> {
        self.response_type.encoded_len()? + self.response.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.response_type.encode(writer)?;
        self.response.encode(writer)
    }
}

impl<'a> Sequence<'a> for ResponseBytes {}

/// `BasicOCSPResponse`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicOcspResponse {
    /// `tbsResponseData`, the signed portion.
    pub tbs_response_data: ResponseData,
    /// `signatureAlgorithm`.
    pub signature_algorithm: AlgorithmIdentifierOwned,
    /// `signature`.
    pub signature: BitString,
    /// `certs`, each kept as its complete DER.
    pub certs: Option<Vec<Any>>,
}

impl<'a> DecodeValue<'a> for BasicOcspResponse {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            Ok(Self {
                tbs_response_data: reader.decode()?,
                signature_algorithm: reader.decode()?,
                signature: reader.decode()?,
                certs: optional_explicit(reader, TagNumber::N0)?,
            })
        })
    }
}

impl EncodeValue for BasicOcspResponse {
    fn value_len(&self) -> der::Result<Length> {
        let certs = self.certs.as_ref().map(|c| explicit(TagNumber::N0, c));
        self.tbs_response_data.encoded_len()?
            + self.signature_algorithm.encoded_len()?
            + self.signature.encoded_len()?
            + certs.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.tbs_response_data.encode(writer)?;
        self.signature_algorithm.encode(writer)?;
        self.signature.encode(writer)?;
        self.certs
            .as_ref()
            .map(|c| explicit(TagNumber::N0, c))
            .encode(writer)
    }
}

impl<'a> Sequence<'a> for BasicOcspResponse {}

/// `ResponseData`. Only version v1 exists, so the version is not kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseData {
    /// `responderID`.
    pub responder_id: ResponderId,
    /// `producedAt`.
    pub produced_at: GeneralizedTime,
    /// `responses`.
    pub responses: Vec<SingleResponse>,
    /// `responseExtensions`, undecoded.
    pub response_extensions: Option<Any>,
}

impl<'a> DecodeValue<'a> for ResponseData {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            // DER omits the DEFAULT v1, so any explicit version is invalid.
            if optional_explicit::<u8, _>(reader, TagNumber::N0)?.is_some() {
                return Err(Tag::Integer.value_error());
            }
            Ok(Self {
                responder_id: reader.decode()?,
                produced_at: reader.decode()?,
                responses: reader.decode()?,
                response_extensions: optional_explicit(reader, TagNumber::N1)?,
            })
        })
    }
}

impl EncodeValue for ResponseData {
    fn value_len(&self) -> der::Result<Length> {
        let extensions = self
            .response_extensions
            .as_ref()
            .map(|e| explicit(TagNumber::N1, e));
        self.responder_id.encoded_len()?
            + self.produced_at.encoded_len()?
            + self.responses.encoded_len()?
            + extensions.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.responder_id.encode(writer)?;
        self.produced_at.encode(writer)?;
        self.responses.encode(writer)?;
        self.response_extensions
            .as_ref()
            .map(|e| explicit(TagNumber::N1, e))
            .encode(writer)
    }
}

impl<'a> Sequence<'a> for ResponseData {}

/// `ResponderID`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponderId {
    /// `byName [1] Name`, the complete DER `Name`.
    ByName(Any),
    /// `byKey [2] KeyHash`, SHA-1 of the responder's public key bits.
    ByKey(OctetString),
}

impl<'a> Decode<'a> for ResponderId {
    fn decode<R: Reader<'a>>(reader: &mut R) -> der::Result<Self> {
        let tag = reader.peek_tag()?;
        let id = if !tag.is_context_specific() {
            None
        } else if tag.number() == TagNumber::N1 {
            optional_explicit(reader, TagNumber::N1)?.map(Self::ByName)
        } else if tag.number() == TagNumber::N2 {
            optional_explicit(reader, TagNumber::N2)?.map(Self::ByKey)
        } else {
            None
        };
        id.ok_or_else(|| tag.unexpected_error(None))
    }
}

impl EncodeValue for ResponderId {
    fn value_len(&self) -> der::Result<Length> {
        match self {
            Self::ByName(name) => name.encoded_len(),
            Self::ByKey(hash) => hash.encoded_len(),
        }
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        match self {
            Self::ByName(name) => name.encode(writer),
            Self::ByKey(hash) => hash.encode(writer),
        }
    }
}

impl Tagged for ResponderId {
    fn tag(&self) -> Tag {
        match self {
            Self::ByName(name) => explicit(TagNumber::N1, name).tag(),
            Self::ByKey(hash) => explicit(TagNumber::N2, hash).tag(),
        }
    }
}

/// `SingleResponse`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleResponse {
    /// `certID`.
    pub cert_id: CertId,
    /// `certStatus`.
    pub cert_status: CertStatus,
    /// `thisUpdate`.
    pub this_update: GeneralizedTime,
    /// `nextUpdate`.
    pub next_update: Option<GeneralizedTime>,
    /// `singleExtensions`, undecoded.
    pub single_extensions: Option<Any>,
}

impl<'a> DecodeValue<'a> for SingleResponse {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            Ok(Self {
                cert_id: reader.decode()?,
                cert_status: reader.decode()?,
                this_update: reader.decode()?,
                next_update: optional_explicit(reader, TagNumber::N0)?,
                single_extensions: optional_explicit(reader, TagNumber::N1)?,
            })
        })
    }
}

impl EncodeValue for SingleResponse {
    fn value_len(&self) -> der::Result<Length> {
        let next = self.next_update.as_ref().map(|t| explicit(TagNumber::N0, t));
        let extensions = self
            .single_extensions
            .as_ref()
            .map(|e| explicit(TagNumber::N1, e));
        self.cert_id.encoded_len()?
            + self.cert_status.encoded_len()?
            + self.this_update.encoded_len()?
            + next.encoded_len()?
            + extensions.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.cert_id.encode(writer)?;
        self.cert_status.encode(writer)?;
        self.this_update.encode(writer)?;
        self.next_update
            .as_ref()
            .map(|t| explicit(TagNumber::N0, t))
            .encode(writer)?;
        self.single_extensions
            .as_ref()
            .map(|e| explicit(TagNumber::N1, e))
            .encode(writer)
    }
}

impl<'a> Sequence<'a> for SingleResponse {}

/// `CertID`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertId {
    /// `hashAlgorithm`.
    pub hash_algorithm: AlgorithmIdentifierOwned,
    /// `issuerNameHash`.
    pub issuer_name_hash: OctetString,
    /// `issuerKeyHash`.
    pub issuer_key_hash: OctetString,
    /// `serialNumber`.
    pub serial_number: Int,
}

impl<'a> DecodeValue<'a> for CertId {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            Ok(Self {
                hash_algorithm: reader.decode()?,
                issuer_name_hash: reader.decode()?,
                issuer_key_hash: reader.decode()?,
                serial_number: reader.decode()?,
            })
        })
    }
}

impl EncodeValue for CertId {
    fn value_len(&self) -> der::Result<Length> {
        self.hash_algorithm.encoded_len()?
            + self.issuer_name_hash.encoded_len()?
            + self.issuer_key_hash.encoded_len()?
            + self.serial_number.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.hash_algorithm.encode(writer)?;
        self.issuer_name_hash.encode(writer)?;
        self.issuer_key_hash.encode(writer)?;
        self.serial_number.encode(writer)
    }
}

impl<'a> Sequence<'a> for CertId {}

/// `CertStatus`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertStatus {
    /// `good [0] IMPLICIT NULL`.
    Good,
    /// `revoked [1] IMPLICIT RevokedInfo`.
    Revoked(RevokedInfo),
    /// `unknown [2] IMPLICIT UnknownInfo`.
    Unknown,
}

impl<'a> Decode<'a> for CertStatus {
    fn decode<R: Reader<'a>>(reader: &mut R) -> der::Result<Self> {
        let tag = reader.peek_tag()?;
        let status = if !tag.is_context_specific() {
            None
        } else if tag.number() == TagNumber::N0 {
            ContextSpecific::<Null>::decode_implicit(reader, TagNumber::N0)?.map(|_| Self::Good)
        } else if tag.number() == TagNumber::N1 {
            ContextSpecific::<RevokedInfo>::decode_implicit(reader, TagNumber::N1)?
                .map(|field| Self::Revoked(field.value))
        } else if tag.number() == TagNumber::N2 {
            ContextSpecific::<Null>::decode_implicit(reader, TagNumber::N2)?.map(|_| Self::Unknown)
        } else {
            None
        };
        status.ok_or_else(|| tag.unexpected_error(None))
    }
}

impl EncodeValue for CertStatus {
    fn value_len(&self) -> der::Result<Length> {
        match self {
            Self::Good | Self::Unknown => Null.value_len(),
            Self::Revoked(info) => info.value_len(),
        }
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        match self {
            Self::Good | Self::Unknown => Null.encode_value(writer),
            Self::Revoked(info) => info.encode_value(writer),
        }
    }
}

impl Tagged for CertStatus {
    fn tag(&self) -> Tag {
        match self {
            Self::Good => implicit(TagNumber::N0, &Null).tag(),
            Self::Revoked(info) => implicit(TagNumber::N1, info).tag(),
            Self::Unknown => implicit(TagNumber::N2, &Null).tag(),
        }
    }
}

/// `RevokedInfo`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevokedInfo {
    /// `revocationTime`.
    pub revocation_time: GeneralizedTime,
    /// `revocationReason`, a CRLReason code.
    pub revocation_reason: Option<Enumerated>,
}

impl<'a> DecodeValue<'a> for RevokedInfo {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            Ok(Self {
                revocation_time: reader.decode()?,
                revocation_reason: optional_explicit(reader, TagNumber::N0)?,
            })
        })
    }
}

impl EncodeValue for RevokedInfo {
    fn value_len(&self) -> der::Result<Length> {
        let reason = self
            .revocation_reason
            .as_ref()
            .map(|r| explicit(TagNumber::N0, r));
        self.revocation_time.encoded_len()? + reason.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.revocation_time.encode(writer)?;
        self.revocation_reason
            .as_ref()
            .map(|r| explicit(TagNumber::N0, r))
            .encode(writer)
    }
}

impl<'a> Sequence<'a> for RevokedInfo {}
