// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Inputs a validation run needs besides the receipt itself.

use std::fmt;
use std::str::FromStr;

use iapreceipt_x509::SignatureVerifyOptions;
use time::OffsetDateTime;

/// Receipts larger than this are rejected before parsing.
pub const DEFAULT_MAX_RECEIPT_LEN: usize = 1024 * 1024;

/// The running application's identity, compared exactly against the receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub bundle_identifier: String,
    pub bundle_version: String,
}

impl AppIdentity {
    pub fn new(bundle_identifier: impl Into<String>, bundle_version: impl Into<String>) -> Self {
        Self {
            bundle_identifier: bundle_identifier.into(),
            bundle_version: bundle_version.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceIdentifierError {
    #[error("device identifier must be 16 bytes, got {0}")]
    InvalidLength(usize),

    #[error("device identifier is not hex or UUID text: {0}")]
    InvalidText(String),
}

/// The 16 raw bytes identifying the device the receipt was issued to.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier([u8; 16]);

impl DeviceIdentifier {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceIdentifier({})", hex::encode(self.0))
    }
}

impl From<[u8; 16]> for DeviceIdentifier {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for DeviceIdentifier {
    type Error = DeviceIdentifierError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 16]>::try_from(bytes)
            .map(Self)
            .map_err(|_| DeviceIdentifierError::InvalidLength(bytes.len()))
    }
}

/// Accepts 32 hex digits, or the hyphenated 8-4-4-4-12 UUID form.
impl FromStr for DeviceIdentifier {
    type Err = DeviceIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let compact: String = if trimmed.len() == 36 {
            let groups: Vec<&str> = trimmed.split('-').collect();
            let lens: Vec<usize> = groups.iter().map(|g| g.len()).collect();
            if lens != [8, 4, 4, 4, 12] {
                return Err(DeviceIdentifierError::InvalidText(s.to_string()));
            }
            groups.concat()
        } else {
            trimmed.to_string()
        };

        let bytes =
            hex::decode(&compact).map_err(|e| DeviceIdentifierError::InvalidText(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

#[derive(Debug, Clone)]
pub struct ReceiptValidationOptions {
    /// DER of the single root the receipt signer must chain to.
    pub trusted_root_der: Option<Vec<u8>>,
    pub app_identity: Option<AppIdentity>,
    pub device_identifier: Option<DeviceIdentifier>,
    /// Reference time for the expiration check. `None` means the current UTC time.
    pub now: Option<OffsetDateTime>,
    pub max_receipt_len: usize,
    pub signature: SignatureVerifyOptions,
}

impl Default for ReceiptValidationOptions {
    fn default() -> Self {
        Self {
            trusted_root_der: None,
            app_identity: None,
            device_identifier: None,
            now: None,
            max_receipt_len: DEFAULT_MAX_RECEIPT_LEN,
            signature: SignatureVerifyOptions::default(),
        }
    }
}

impl ReceiptValidationOptions {
    pub fn with_trusted_root(mut self, der: impl Into<Vec<u8>>) -> Self {
        self.trusted_root_der = Some(der.into());
        self
    }

    pub fn with_app_identity(mut self, identity: AppIdentity) -> Self {
        self.app_identity = Some(identity);
        self
    }

    pub fn with_device_identifier(mut self, device: DeviceIdentifier) -> Self {
        self.device_identifier = Some(device);
        self
    }

    pub fn with_now(mut self, now: OffsetDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_max_receipt_len(mut self, len: usize) -> Self {
        self.max_receipt_len = len;
        self
    }
}
