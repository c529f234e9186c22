// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Terminal outcome of one receipt validation run.

use std::fmt;

/// Exactly one of these is produced per validation run.
///
/// Only [`ReceiptStatus::ValidationSuccess`] authorizes entitlement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReceiptStatus {
    ValidationSuccess,
    NoReceiptPresent,
    UnknownFailure,
    UnknownReceiptFormat,
    InvalidPkcs7Signature,
    InvalidPkcs7Type,
    InvalidAppleRootCertificate,
    FailedAppleSignature,
    UnexpectedAsn1Type,
    MissingComponent,
    InvalidBundleIdentifier,
    InvalidVersionIdentifier,
    InvalidHash,
    InvalidExpired,
}

/// Coarse failure taxonomy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    /// Envelope, content type or attribute structure is malformed.
    Format,
    /// Trust anchor missing or signature invalid.
    Trust,
    Integrity,
    Identity,
    Temporal,
    Unknown,
}

impl ReceiptStatus {
    pub const ALL: [ReceiptStatus; 14] = [
        Self::ValidationSuccess,
        Self::NoReceiptPresent,
        Self::UnknownFailure,
        Self::UnknownReceiptFormat,
        Self::InvalidPkcs7Signature,
        Self::InvalidPkcs7Type,
        Self::InvalidAppleRootCertificate,
        Self::FailedAppleSignature,
        Self::UnexpectedAsn1Type,
        Self::MissingComponent,
        Self::InvalidBundleIdentifier,
        Self::InvalidVersionIdentifier,
        Self::InvalidHash,
        Self::InvalidExpired,
    ];

    pub fn is_success(self) -> bool {
        self == Self::ValidationSuccess
    }

    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::ValidationSuccess => "validationSuccess",
            Self::NoReceiptPresent => "noReceiptPresent",
            Self::UnknownFailure => "unknownFailure",
            Self::UnknownReceiptFormat => "unknownReceiptFormat",
            Self::InvalidPkcs7Signature => "invalidPKCS7Signature",
            Self::InvalidPkcs7Type => "invalidPKCS7Type",
            Self::InvalidAppleRootCertificate => "invalidAppleRootCertificate",
            Self::FailedAppleSignature => "failedAppleSignature",
            Self::UnexpectedAsn1Type => "unexpectedASN1Type",
            Self::MissingComponent => "missingComponent",
            Self::InvalidBundleIdentifier => "invalidBundleIdentifier",
            Self::InvalidVersionIdentifier => "invalidVersionIdentifier",
            Self::InvalidHash => "invalidHash",
            Self::InvalidExpired => "invalidExpired",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// `None` for success.
    pub fn kind(self) -> Option<ErrorKind> {
        let kind = match self {
            Self::ValidationSuccess => return None,
            Self::NoReceiptPresent => ErrorKind::NotFound,
            Self::UnknownReceiptFormat
            | Self::InvalidPkcs7Signature
            | Self::InvalidPkcs7Type
            | Self::UnexpectedAsn1Type
            | Self::MissingComponent => ErrorKind::Format,
            Self::InvalidAppleRootCertificate | Self::FailedAppleSignature => ErrorKind::Trust,
            Self::InvalidHash => ErrorKind::Integrity,
            Self::InvalidBundleIdentifier | Self::InvalidVersionIdentifier => ErrorKind::Identity,
            Self::InvalidExpired => ErrorKind::Temporal,
            Self::UnknownFailure => ErrorKind::Unknown,
        };
        Some(kind)
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::ValidationSuccess => "This receipt is valid.",
            Self::NoReceiptPresent => "A receipt was not found on this device.",
            Self::UnknownFailure => "An unexpected failure occurred during verification.",
            Self::UnknownReceiptFormat => "The receipt is not in PKCS7 format.",
            Self::InvalidPkcs7Signature => "Invalid PKCS7 Signature.",
            Self::InvalidPkcs7Type => "Invalid PKCS7 Type.",
            Self::InvalidAppleRootCertificate => "Public Apple root certificate not found.",
            Self::FailedAppleSignature => "Receipt not signed by Apple.",
            Self::UnexpectedAsn1Type => "Unexpected ASN1 Type.",
            Self::MissingComponent => "Expected component was not found.",
            Self::InvalidBundleIdentifier => "Receipt bundle identifier does not match application bundle identifier.",
            Self::InvalidVersionIdentifier => "Receipt version identifier does not match application version.",
            Self::InvalidHash => "Receipt failed hash check.",
            Self::InvalidExpired => "Receipt has expired.",
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
