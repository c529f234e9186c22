// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! PKCS#7 signer verification against a pinned root certificate.
//!
//! Every signer info in the container must verify: its certificate is located
//! among the embedded certificates (or is the pinned root), the signature over
//! the content (or over the signed attributes, whose `messageDigest` must match
//! the content) checks out, and the certificate chains to the pinned root.
//!
//! Only after all of that is the payload released to the caller.

use std::borrow::Cow;

use iapreceipt_common::signed_container::oid;
use iapreceipt_common::{ReceiptStatus, SignedContainer, SignerIdentifier, SignerInfo};

use crate::algorithms::{DigestAlgorithm, SignatureAlgorithm};
use crate::chain::{build_chain, ChainError, ParsedCertificate, DEFAULT_MAX_CHAIN_DEPTH};

#[derive(Debug, Clone)]
pub struct SignatureVerifyOptions {
    /// Maximum number of issuer links followed from the signing certificate.
    pub max_chain_depth: usize,
}

impl Default for SignatureVerifyOptions {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("no trusted root certificate was provided")]
    MissingTrustedRoot,

    #[error("trusted root certificate is not valid DER: {0}")]
    InvalidTrustedRoot(String),

    #[error("container has no signer infos")]
    NoSigners,

    #[error("no certificate matches the signer identifier")]
    SignerCertificateNotFound,

    #[error("unsupported signer algorithm: digest {digest}, signature {signature}")]
    UnsupportedAlgorithm { digest: String, signature: String },

    #[error("signed attributes carry no messageDigest")]
    MissingMessageDigest,

    #[error("messageDigest does not match the signed content")]
    DigestMismatch,

    #[error("signed contentType attribute is not data")]
    ContentTypeMismatch,

    #[error("signature verification failed: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl SignatureError {
    pub fn status(&self) -> ReceiptStatus {
        match self {
            Self::MissingTrustedRoot | Self::InvalidTrustedRoot(_) => {
                ReceiptStatus::InvalidAppleRootCertificate
            }
            _ => ReceiptStatus::FailedAppleSignature,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingTrustedRoot => "CERT_CHAIN_NO_TRUST_ANCHORS",
            Self::InvalidTrustedRoot(_) => "CERT_CHAIN_TRUST_ANCHOR_ERROR",
            Self::NoSigners => "PKCS7_NO_SIGNERS",
            Self::SignerCertificateNotFound => "PKCS7_SIGNER_CERT_NOT_FOUND",
            Self::UnsupportedAlgorithm { .. } => "UNSUPPORTED_ALG",
            Self::MissingMessageDigest => "PKCS7_MISSING_MESSAGE_DIGEST",
            Self::DigestMismatch => "PKCS7_DIGEST_MISMATCH",
            Self::ContentTypeMismatch => "PKCS7_CONTENT_TYPE_MISMATCH",
            Self::InvalidSignature(_) => "BAD_SIGNATURE",
            Self::Chain(e) => e.error_code(),
        }
    }
}

/// Verify every signer of `container` and return its payload.
pub fn verify_signed_container<'a>(
    container: SignedContainer<'a>,
    trusted_root_der: Option<&[u8]>,
    options: &SignatureVerifyOptions,
) -> Result<Cow<'a, [u8]>, SignatureError> {
    let root_der = trusted_root_der
        .filter(|der| !der.is_empty())
        .ok_or(SignatureError::MissingTrustedRoot)?;
    let anchor = ParsedCertificate::from_der(root_der)
        .map_err(|e| SignatureError::InvalidTrustedRoot(e.to_string()))?;

    if container.signer_infos.is_empty() {
        return Err(SignatureError::NoSigners);
    }

    let mut embedded = Vec::with_capacity(container.certificates.len());
    for der in &container.certificates {
        match ParsedCertificate::from_der(der) {
            Ok(cert) => embedded.push(cert),
            Err(e) => tracing::debug!(error = %e, "skipping unparseable embedded certificate"),
        }
    }

    for (index, signer) in container.signer_infos.iter().enumerate() {
        verify_signer(signer, container.payload(), &embedded, &anchor, options).map_err(|e| {
            tracing::debug!(signer = index, error = %e, "signer verification failed");
            e
        })?;
    }

    Ok(container.into_payload())
}

fn verify_signer(
    signer: &SignerInfo<'_>,
    payload: &[u8],
    embedded: &[ParsedCertificate],
    anchor: &ParsedCertificate,
    options: &SignatureVerifyOptions,
) -> Result<(), SignatureError> {
    let cert = find_signer_certificate(&signer.signer, embedded, anchor)
        .ok_or(SignatureError::SignerCertificateNotFound)?;

    let unsupported = || SignatureError::UnsupportedAlgorithm {
        digest: signer.digest_algorithm.oid_string(),
        signature: signer.signature_algorithm.oid_string(),
    };
    let digest =
        DigestAlgorithm::from_oid(&signer.digest_algorithm.oid_string()).ok_or_else(unsupported)?;
    let signature_oid = signer.signature_algorithm.oid_string();
    let algorithm =
        SignatureAlgorithm::from_signer(digest, &signature_oid).ok_or_else(unsupported)?;

    let message: Cow<'_, [u8]> = match &signer.signed_attributes {
        Some(attributes) => {
            let expected = attributes.message_digest().ok_or(SignatureError::MissingMessageDigest)?;
            if expected != digest.digest(payload).as_slice() {
                return Err(SignatureError::DigestMismatch);
            }
            if attributes.content_type().is_some_and(|ct| ct != oid::PKCS7_DATA) {
                return Err(SignatureError::ContentTypeMismatch);
            }
            Cow::Owned(attributes.signed_bytes())
        }
        None => Cow::Borrowed(payload),
    };

    algorithm
        .verify(&cert.spki_der, &message, signer.signature)
        .map_err(SignatureError::InvalidSignature)?;

    let path = build_chain(cert, embedded, anchor, options.max_chain_depth)?;
    tracing::debug!(chain = ?path, "signer certificate chains to the pinned root");
    Ok(())
}

fn find_signer_certificate<'c>(
    identifier: &SignerIdentifier<'_>,
    embedded: &'c [ParsedCertificate],
    anchor: &'c ParsedCertificate,
) -> Option<&'c ParsedCertificate> {
    embedded
        .iter()
        .chain(std::iter::once(anchor))
        .find(|cert| match identifier {
            SignerIdentifier::IssuerAndSerialNumber { issuer, serial } => {
                cert.issuer_raw.as_slice() == *issuer && cert.serial_raw.as_slice() == *serial
            }
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                cert.subject_key_identifier.as_deref() == Some(*ski)
            }
        })
}
