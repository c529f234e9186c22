// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Chain building from a signing certificate to a single pinned root.
//!
//! Issuers are looked up by subject name among the certificates embedded in the
//! receipt, then the pinned root. A candidate is accepted only when it verifies
//! the current certificate's signature, and every issuer other than the pinned
//! root must be a CA allowed to sign certificates. The chain must end at a
//! certificate that is byte-for-byte the pinned root.

use x509_parser::extensions::ParsedExtension;

use crate::algorithms::SignatureAlgorithm;

/// Upper bound on issuer lookups before giving up.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("invalid certificate DER: {0}")]
    InvalidCertificate(String),

    #[error("certificate chain ends in an untrusted root")]
    UntrustedRoot,

    #[error("failed to build certificate chain within {0} links")]
    TooDeep(usize),

    #[error("issuer {0} is not a certificate authority")]
    IssuerNotCa(String),
}

impl ChainError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCertificate(_) => "INVALID_CERT",
            Self::UntrustedRoot => "CERT_CHAIN_UNTRUSTED_ROOT",
            Self::TooDeep(_) => "CERT_CHAIN_BUILD_ERROR",
            Self::IssuerNotCa(_) => "CERT_CHAIN_ISSUER_NOT_CA",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub der: Vec<u8>,
    pub subject_dn: String,
    pub issuer_dn: String,
    /// Encoded issuer `Name`, for matching PKCS#7 issuer-and-serial identifiers.
    pub issuer_raw: Vec<u8>,
    /// Serial number INTEGER content octets.
    pub serial_raw: Vec<u8>,
    pub subject_key_identifier: Option<Vec<u8>>,
    pub spki_der: Vec<u8>,
    /// basicConstraints `cA`; false when the extension is absent.
    pub is_ca: bool,
    /// keyCertSign, or true when there is no keyUsage extension.
    pub can_sign_certificates: bool,
    tbs_der: Vec<u8>,
    signature_oid: String,
    signature: Vec<u8>,
}

impl ParsedCertificate {
    pub fn from_der(der: &[u8]) -> Result<Self, ChainError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| ChainError::InvalidCertificate(e.to_string()))?;

        let mut subject_key_identifier = None;
        let mut is_ca = false;
        let mut can_sign_certificates = true;
        for ext in cert.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(id) => {
                    subject_key_identifier = Some(id.0.to_vec())
                }
                ParsedExtension::BasicConstraints(bc) => is_ca = bc.ca,
                ParsedExtension::KeyUsage(ku) => can_sign_certificates = ku.key_cert_sign(),
                _ => {}
            }
        }

        Ok(Self {
            der: der.to_vec(),
            subject_dn: cert.tbs_certificate.subject.to_string(),
            issuer_dn: cert.tbs_certificate.issuer.to_string(),
            issuer_raw: cert.tbs_certificate.issuer.as_raw().to_vec(),
            serial_raw: cert.tbs_certificate.raw_serial().to_vec(),
            subject_key_identifier,
            spki_der: cert.tbs_certificate.subject_pki.raw.to_vec(),
            is_ca,
            can_sign_certificates,
            tbs_der: cert.tbs_certificate.as_ref().to_vec(),
            signature_oid: cert.signature_algorithm.algorithm.to_id_string(),
            signature: cert.signature_value.data.to_vec(),
        })
    }

    /// Whether this certificate may appear as an issuer in a chain.
    pub fn is_issuing_ca(&self) -> bool {
        self.is_ca && self.can_sign_certificates
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject_dn == self.issuer_dn
    }

    /// Whether `issuer`'s key produced this certificate's signature.
    pub fn is_signed_by(&self, issuer: &ParsedCertificate) -> bool {
        let Some(algorithm) = SignatureAlgorithm::from_certificate_oid(&self.signature_oid) else {
            tracing::debug!(
                oid = %self.signature_oid,
                subject = %self.subject_dn,
                "unsupported certificate signature algorithm"
            );
            return false;
        };
        algorithm.verify(&issuer.spki_der, &self.tbs_der, &self.signature).is_ok()
    }
}

/// Build `leaf -> ... -> anchor` using `pool` for intermediates.
///
/// Returns the subject names along the chain, leaf first.
pub fn build_chain(
    leaf: &ParsedCertificate,
    pool: &[ParsedCertificate],
    anchor: &ParsedCertificate,
    max_depth: usize,
) -> Result<Vec<String>, ChainError> {
    let mut path = vec![leaf.subject_dn.clone()];

    // The signing certificate is the pinned root itself.
    if leaf.der == anchor.der {
        return Ok(path);
    }

    let mut current = leaf;
    for _ in 0..max_depth {
        let issuer = pool
            .iter()
            .chain(std::iter::once(anchor))
            .filter(|candidate| candidate.subject_dn == current.issuer_dn)
            .find(|candidate| current.is_signed_by(candidate));

        let Some(issuer) = issuer else {
            tracing::debug!(
                subject = %current.subject_dn,
                issuer = %current.issuer_dn,
                "no verifying issuer found"
            );
            return Err(ChainError::UntrustedRoot);
        };

        path.push(issuer.subject_dn.clone());

        if issuer.der == anchor.der {
            return Ok(path);
        }

        if !issuer.is_issuing_ca() {
            tracing::debug!(
                subject = %issuer.subject_dn,
                is_ca = issuer.is_ca,
                key_cert_sign = issuer.can_sign_certificates,
                "issuer is not allowed to sign certificates"
            );
            return Err(ChainError::IssuerNotCa(issuer.subject_dn.clone()));
        }

        // A self-signed certificate that is not the anchor cannot lead anywhere else.
        if issuer.is_self_issued() && issuer.is_signed_by(issuer) {
            tracing::debug!(
                subject = %issuer.subject_dn,
                "chain ends in a self-signed certificate other than the pinned root"
            );
            return Err(ChainError::UntrustedRoot);
        }

        current = issuer;
    }

    Err(ChainError::TooDeep(max_depth))
}
