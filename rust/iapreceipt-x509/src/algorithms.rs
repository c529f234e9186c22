// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Digest and signature algorithm dispatch.
//!
//! Algorithms are identified by dotted OID strings, as produced by
//! `x509-parser` for certificates and by `oid_to_string` for PKCS#7 signer infos.

use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha384, Sha512};

use p256::elliptic_curve::sec1::ToEncodedPoint as _;
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey as _;
use rsa::RsaPublicKey;
use signature::Verifier as _;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn from_oid(oid: &str) -> Option<Self> {
        match oid {
            "1.3.14.3.2.26" => Some(Self::Sha1),
            "2.16.840.1.101.3.4.2.1" => Some(Self::Sha256),
            "2.16.840.1.101.3.4.2.2" => Some(Self::Sha384),
            "2.16.840.1.101.3.4.2.3" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaPkcs1v15(DigestAlgorithm),
    EcdsaP256Sha256,
    EcdsaP384Sha384,
}

impl SignatureAlgorithm {
    /// Combined signature OIDs, as used in certificates.
    pub fn from_certificate_oid(oid: &str) -> Option<Self> {
        match oid {
            // sha1WithRSAEncryption / sha256 / sha384 / sha512
            "1.2.840.113549.1.1.5" => Some(Self::RsaPkcs1v15(DigestAlgorithm::Sha1)),
            "1.2.840.113549.1.1.11" => Some(Self::RsaPkcs1v15(DigestAlgorithm::Sha256)),
            "1.2.840.113549.1.1.12" => Some(Self::RsaPkcs1v15(DigestAlgorithm::Sha384)),
            "1.2.840.113549.1.1.13" => Some(Self::RsaPkcs1v15(DigestAlgorithm::Sha512)),

            // ecdsa-with-SHA256 / SHA384
            "1.2.840.10045.4.3.2" => Some(Self::EcdsaP256Sha256),
            "1.2.840.10045.4.3.3" => Some(Self::EcdsaP384Sha384),
            _ => None,
        }
    }

    /// Signer infos may name the bare key algorithm and carry the digest separately.
    pub fn from_signer(digest: DigestAlgorithm, signature_oid: &str) -> Option<Self> {
        if signature_oid == "1.2.840.113549.1.1.1" {
            return Some(Self::RsaPkcs1v15(digest));
        }
        let algorithm = Self::from_certificate_oid(signature_oid)?;
        (algorithm.digest() == digest).then_some(algorithm)
    }

    pub fn digest(self) -> DigestAlgorithm {
        match self {
            Self::RsaPkcs1v15(digest) => digest,
            Self::EcdsaP256Sha256 => DigestAlgorithm::Sha256,
            Self::EcdsaP384Sha384 => DigestAlgorithm::Sha384,
        }
    }

    /// Verify `signature` over `message` with the key in `spki_der`.
    pub fn verify(self, spki_der: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String> {
        match self {
            Self::RsaPkcs1v15(DigestAlgorithm::Sha1) => {
                verify_rsa::<Sha1>(spki_der, message, signature)
            }
            Self::RsaPkcs1v15(DigestAlgorithm::Sha256) => {
                verify_rsa::<Sha256>(spki_der, message, signature)
            }
            Self::RsaPkcs1v15(DigestAlgorithm::Sha384) => {
                verify_rsa::<Sha384>(spki_der, message, signature)
            }
            Self::RsaPkcs1v15(DigestAlgorithm::Sha512) => {
                verify_rsa::<Sha512>(spki_der, message, signature)
            }
            Self::EcdsaP256Sha256 => {
                let pk = p256::PublicKey::from_public_key_der(spki_der)
                    .map_err(|e| format!("bad P-256 public key: {e}"))?;
                let ep = pk.to_encoded_point(false);
                let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(ep.as_bytes())
                    .map_err(|e| format!("bad P-256 public key: {e}"))?;
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|e| format!("bad ECDSA signature bytes: {e}"))?;
                vk.verify(message, &sig)
                    .map_err(|_| "ECDSA signature verification failed".to_string())
            }
            Self::EcdsaP384Sha384 => {
                let pk = p384::PublicKey::from_public_key_der(spki_der)
                    .map_err(|e| format!("bad P-384 public key: {e}"))?;
                let ep = pk.to_encoded_point(false);
                let vk = p384::ecdsa::VerifyingKey::from_sec1_bytes(ep.as_bytes())
                    .map_err(|e| format!("bad P-384 public key: {e}"))?;
                let sig = p384::ecdsa::Signature::from_der(signature)
                    .map_err(|e| format!("bad ECDSA signature bytes: {e}"))?;
                vk.verify(message, &sig)
                    .map_err(|_| "ECDSA signature verification failed".to_string())
            }
        }
    }
}

fn verify_rsa<D>(spki_der: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String>
where
    D: sha2::Digest + rsa::pkcs8::AssociatedOid,
{
    let key = RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| format!("bad RSA public key: {e}"))?;
    let vk = pkcs1v15::VerifyingKey::<D>::new(key);
    let sig = pkcs1v15::Signature::try_from(signature)
        .map_err(|e| format!("bad RSA signature bytes: {e}"))?;
    vk.verify(message, &sig).map_err(|_| "RSA signature verification failed".to_string())
}
