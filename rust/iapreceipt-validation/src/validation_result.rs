// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Validation result types.
//!
//! A run never returns `Err`: every outcome is a [`ReceiptValidation`] carrying
//! exactly one [`ReceiptStatus`], the stage reached, whatever record fields were
//! decoded, and diagnostic detail for failures.

use std::collections::HashMap;
use std::fmt;

use iapreceipt_common::{ReceiptRecord, ReceiptStatus};

/// Pipeline stages, in order. A run records the last one it completed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationStage {
    NotLoaded,
    Loaded,
    SignatureVerified,
    FieldsParsed,
    IdentityChecked,
    HashChecked,
    ExpirationChecked,
    Valid,
}

impl ValidationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotLoaded => "not_loaded",
            Self::Loaded => "loaded",
            Self::SignatureVerified => "signature_verified",
            Self::FieldsParsed => "fields_parsed",
            Self::IdentityChecked => "identity_checked",
            Self::HashChecked => "hash_checked",
            Self::ExpirationChecked => "expiration_checked",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Human-readable explanation of the failure.
    pub message: String,
    /// Machine-readable error code.
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptValidation {
    pub status: ReceiptStatus,
    pub stage: ValidationStage,
    /// Populated up to the stage reached. Only trust it when the status is success.
    pub record: ReceiptRecord,
    pub failures: Vec<ValidationFailure>,
    pub metadata: HashMap<String, String>,
}

impl ReceiptValidation {
    pub fn is_valid(&self) -> bool {
        self.status.is_success()
    }

    /// The verified record, only when validation succeeded.
    pub fn valid_record(&self) -> Option<&ReceiptRecord> {
        self.is_valid().then_some(&self.record)
    }

    pub fn into_record(self) -> ReceiptRecord {
        self.record
    }
}
