// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! PKCS#7 `SignedData` envelope parsing.
//!
//! Receipts arrive as a `ContentInfo` wrapping `SignedData` (RFC 2315 / RFC 5652):
//!
//! ```text
//! ContentInfo ::= SEQUENCE { contentType OID, content [0] EXPLICIT SignedData }
//! SignedData  ::= SEQUENCE {
//!     version INTEGER,
//!     digestAlgorithms SET OF AlgorithmIdentifier,
//!     encapContentInfo SEQUENCE { eContentType OID, eContent [0] EXPLICIT OCTET STRING OPTIONAL },
//!     certificates [0] IMPLICIT SET OF Certificate OPTIONAL,
//!     crls [1] IMPLICIT ... OPTIONAL,
//!     signerInfos SET OF SignerInfo }
//! ```
//!
//! Receipt producers use BER, so indefinite lengths and chunked (constructed)
//! OCTET STRINGs are accepted in the envelope. Signed attributes and
//! certificates are hashed or parsed as-is and must be DER.
//!
//! Nothing here is trusted yet: the parsed [`SignedContainer`] is handed to the
//! signature verifier, which yields the payload once the signature checks out.

use std::borrow::Cow;

use x509_parser::der_parser::oid::Oid;

use crate::der::{tag, DerCursor, DerError, Element};
use crate::receipt_status::ReceiptStatus;

/// DER content octets of the object identifiers this module matches on.
pub mod oid {
    /// 1.2.840.113549.1.7.1
    pub const PKCS7_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
    /// 1.2.840.113549.1.7.2
    pub const PKCS7_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
    /// 1.2.840.113549.1.9.3
    pub const CONTENT_TYPE_ATTRIBUTE: &[u8] =
        &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];
    /// 1.2.840.113549.1.9.4
    pub const MESSAGE_DIGEST_ATTRIBUTE: &[u8] =
        &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];
}

/// Dotted-decimal form of DER object identifier content octets.
pub fn oid_to_string(content: &[u8]) -> String {
    Oid::new(Cow::Borrowed(content)).to_id_string()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("receipt is not a PKCS#7 structure: {0}")]
    UnknownFormat(String),

    #[error("PKCS#7 content type is {0}, expected signedData")]
    NotSignedData(String),

    #[error("PKCS#7 encapsulated content type is {0}, expected data")]
    NotDataContent(String),
}

impl ContainerError {
    pub fn status(&self) -> ReceiptStatus {
        match self {
            Self::UnknownFormat(_) => ReceiptStatus::UnknownReceiptFormat,
            Self::NotSignedData(_) => ReceiptStatus::InvalidPkcs7Signature,
            Self::NotDataContent(_) => ReceiptStatus::InvalidPkcs7Type,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownFormat(_) => "PKCS7_MALFORMED",
            Self::NotSignedData(_) => "PKCS7_NOT_SIGNED_DATA",
            Self::NotDataContent(_) => "PKCS7_NOT_DATA_CONTENT",
        }
    }
}

impl From<DerError> for ContainerError {
    fn from(e: DerError) -> Self {
        Self::UnknownFormat(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentifier<'a> {
    /// OID content octets.
    pub oid: &'a [u8],
    /// Parameters, as a complete encoded element.
    pub parameters: Option<&'a [u8]>,
}

impl AlgorithmIdentifier<'_> {
    pub fn oid_string(&self) -> String {
        oid_to_string(self.oid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerIdentifier<'a> {
    IssuerAndSerialNumber {
        /// Encoded issuer `Name`, tag and length included.
        issuer: &'a [u8],
        /// INTEGER content octets.
        serial: &'a [u8],
    },
    SubjectKeyIdentifier(&'a [u8]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAttribute<'a> {
    pub oid: &'a [u8],
    /// Encoded values of the attribute's SET, each a complete element.
    pub values: Vec<Element<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAttributes<'a> {
    /// The `[0] IMPLICIT` element as encoded in the signer info.
    pub raw: &'a [u8],
    pub attributes: Vec<SignedAttribute<'a>>,
}

impl<'a> SignedAttributes<'a> {
    pub fn get(&self, oid: &[u8]) -> Option<&SignedAttribute<'a>> {
        self.attributes.iter().find(|a| a.oid == oid)
    }

    /// The bytes the signature covers: the attributes re-tagged as a universal SET.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut out = self.raw.to_vec();
        if let Some(first) = out.first_mut() {
            *first = 0x31;
        }
        out
    }

    /// Content of the `messageDigest` attribute's single OCTET STRING value.
    pub fn message_digest(&self) -> Option<&'a [u8]> {
        let attribute = self.get(oid::MESSAGE_DIGEST_ATTRIBUTE)?;
        match attribute.values.as_slice() {
            [value] if value.header.is_universal(tag::OCTET_STRING) => Some(value.value),
            _ => None,
        }
    }

    /// Content of the `contentType` attribute's single OID value.
    pub fn content_type(&self) -> Option<&'a [u8]> {
        let attribute = self.get(oid::CONTENT_TYPE_ATTRIBUTE)?;
        match attribute.values.as_slice() {
            [value] if value.header.is_universal(tag::OBJECT_IDENTIFIER) => Some(value.value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerInfo<'a> {
    pub version: i64,
    pub signer: SignerIdentifier<'a>,
    pub digest_algorithm: AlgorithmIdentifier<'a>,
    pub signed_attributes: Option<SignedAttributes<'a>>,
    pub signature_algorithm: AlgorithmIdentifier<'a>,
    pub signature: &'a [u8],
}

/// A parsed but unverified signed-data envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedContainer<'a> {
    pub version: i64,
    pub digest_algorithms: Vec<AlgorithmIdentifier<'a>>,
    pub content_type: &'a [u8],
    payload: Cow<'a, [u8]>,
    /// Embedded certificates, each a complete DER `Certificate`.
    pub certificates: Vec<&'a [u8]>,
    pub signer_infos: Vec<SignerInfo<'a>>,
}

impl<'a> SignedContainer<'a> {
    /// Parse a receipt envelope.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ContainerError> {
        parse_signed_container(bytes)
    }

    /// Encapsulated content. Not authenticated until the signature is verified.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Cow<'a, [u8]> {
        self.payload
    }
}

/// Parse the outer `ContentInfo` and its `SignedData`.
pub fn parse_signed_container(bytes: &[u8]) -> Result<SignedContainer<'_>, ContainerError> {
    let mut top = DerCursor::new(bytes);
    let mut content_info = top.enter_ber(tag::SEQUENCE)?;
    if !top.is_empty() {
        return Err(ContainerError::UnknownFormat(format!(
            "{} trailing bytes after ContentInfo",
            top.remaining()
        )));
    }

    let content_type = content_info.read_expected(tag::OBJECT_IDENTIFIER)?;
    if content_type != oid::PKCS7_SIGNED_DATA {
        return Err(ContainerError::NotSignedData(oid_to_string(content_type)));
    }

    let explicit = content_info.read_ber_element()?;
    if !explicit.header.is_context(0) || !explicit.header.constructed {
        return Err(ContainerError::UnknownFormat(format!(
            "ContentInfo content has {}, expected [0]",
            explicit.header
        )));
    }

    let mut signed_data = explicit.contents().enter_ber(tag::SEQUENCE)?;
    let version = signed_data.read_integer()?;

    let mut digest_set = signed_data.enter_ber(tag::SET)?;
    let mut digest_algorithms = Vec::new();
    while !digest_set.is_empty() {
        digest_algorithms.push(read_algorithm_identifier(&mut digest_set)?);
    }

    let mut encapsulated = signed_data.enter_ber(tag::SEQUENCE)?;
    let content_type = encapsulated.read_expected(tag::OBJECT_IDENTIFIER)?;
    let econtent = if encapsulated.peek_is_context(0) {
        Some(encapsulated.read_ber_element()?)
    } else {
        None
    };

    let mut certificates = Vec::new();
    if signed_data.peek_is_context(0) {
        let mut certs = signed_data.read_ber_element()?.contents();
        while !certs.is_empty() {
            certificates.push(certs.read_element()?.raw);
        }
    }
    if signed_data.peek_is_context(1) {
        signed_data.skip_element()?;
    }

    let mut signer_set = signed_data.enter_ber(tag::SET)?;
    let mut signer_infos = Vec::new();
    while !signer_set.is_empty() {
        signer_infos.push(read_signer_info(&mut signer_set)?);
    }

    if content_type != oid::PKCS7_DATA {
        return Err(ContainerError::NotDataContent(oid_to_string(content_type)));
    }

    let econtent = econtent
        .ok_or_else(|| ContainerError::UnknownFormat("signed content is detached".to_string()))?;
    let mut econtent_cursor = econtent.contents();
    let octets = econtent_cursor.read_ber_element()?;
    let payload = octet_string_content(&octets, 0)?;

    Ok(SignedContainer {
        version,
        digest_algorithms,
        content_type,
        payload,
        certificates,
        signer_infos,
    })
}

fn read_algorithm_identifier<'a>(
    cursor: &mut DerCursor<'a>,
) -> Result<AlgorithmIdentifier<'a>, ContainerError> {
    let mut seq = cursor.enter_ber(tag::SEQUENCE)?;
    let oid = seq.read_expected(tag::OBJECT_IDENTIFIER)?;
    let parameters = if seq.is_empty() {
        None
    } else {
        Some(seq.read_ber_element()?.raw)
    };
    Ok(AlgorithmIdentifier { oid, parameters })
}

fn read_signer_info<'a>(cursor: &mut DerCursor<'a>) -> Result<SignerInfo<'a>, ContainerError> {
    let mut info = cursor.enter_ber(tag::SEQUENCE)?;
    let version = info.read_integer()?;

    let signer = if info.peek_is_context(0) {
        SignerIdentifier::SubjectKeyIdentifier(info.read_element()?.value)
    } else {
        let mut issuer_and_serial = info.enter_ber(tag::SEQUENCE)?;
        let issuer = issuer_and_serial.read_element()?;
        if !issuer.header.is_universal(tag::SEQUENCE) {
            return Err(ContainerError::UnknownFormat(format!(
                "signer issuer has {}, expected SEQUENCE",
                issuer.header
            )));
        }
        let serial = issuer_and_serial.read_expected(tag::INTEGER)?;
        SignerIdentifier::IssuerAndSerialNumber {
            issuer: issuer.raw,
            serial,
        }
    };

    let digest_algorithm = read_algorithm_identifier(&mut info)?;

    let signed_attributes = if info.peek_is_context(0) {
        Some(read_signed_attributes(info.read_element()?)?)
    } else {
        None
    };

    let signature_algorithm = read_algorithm_identifier(&mut info)?;
    let signature = info.read_expected(tag::OCTET_STRING)?;

    Ok(SignerInfo {
        version,
        signer,
        digest_algorithm,
        signed_attributes,
        signature_algorithm,
        signature,
    })
}

fn read_signed_attributes(element: Element<'_>) -> Result<SignedAttributes<'_>, ContainerError> {
    let mut attributes = Vec::new();
    let mut cursor = element.contents();
    while !cursor.is_empty() {
        let mut attribute = cursor.enter(tag::SEQUENCE)?;
        let oid = attribute.read_expected(tag::OBJECT_IDENTIFIER)?;
        let mut value_set = attribute.enter(tag::SET)?;
        let mut values = Vec::new();
        while !value_set.is_empty() {
            values.push(value_set.read_element()?);
        }
        attributes.push(SignedAttribute { oid, values });
    }
    Ok(SignedAttributes {
        raw: element.raw,
        attributes,
    })
}

/// Content of an OCTET STRING, joining the chunks of a constructed (BER) encoding.
fn octet_string_content<'a>(
    element: &Element<'a>,
    depth: usize,
) -> Result<Cow<'a, [u8]>, ContainerError> {
    if !element.header.is_universal(tag::OCTET_STRING) {
        return Err(ContainerError::UnknownFormat(format!(
            "signed content has {}, expected OCTET STRING",
            element.header
        )));
    }
    if !element.header.constructed {
        return Ok(Cow::Borrowed(element.value));
    }
    if depth >= 8 {
        return Err(ContainerError::UnknownFormat(
            "OCTET STRING chunks nested too deeply".to_string(),
        ));
    }

    let mut joined = Vec::with_capacity(element.value.len());
    let mut chunks = element.contents();
    while !chunks.is_empty() {
        let chunk = chunks.read_ber_element()?;
        joined.extend_from_slice(&octet_string_content(&chunk, depth + 1)?);
    }
    Ok(Cow::Owned(joined))
}
