// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The receipt validation pipeline.
//!
//! Stages run in a fixed order and the first failure ends the run:
//!
//! 1. load the receipt from its [`ReceiptSource`]
//! 2. parse the PKCS#7 envelope
//! 3. verify the signer against the pinned root and release the payload
//! 4. decode receipt attributes and require the core fields
//! 5. compare bundle identifier and version with the running app
//! 6. recompute the device-binding hash
//! 7. reject receipts whose expiration date has passed

use std::collections::HashMap;

use iapreceipt_common::receipt_record::RECEIPT_PARSER;
use iapreceipt_common::{ReceiptRecord, ReceiptStatus, SignedContainer};
use iapreceipt_x509::verify_signed_container;
use time::OffsetDateTime;

use crate::device_hash::compute_receipt_hash;
use crate::receipt_source::ReceiptSource;
use crate::validation_options::ReceiptValidationOptions;
use crate::validation_result::{ReceiptValidation, ValidationFailure, ValidationStage};

/// Validates one receipt. Consumed by [`ReceiptValidator::validate`].
#[derive(Debug, Clone)]
pub struct ReceiptValidator {
    options: ReceiptValidationOptions,
}

/// Terminal failure of one stage.
struct StageFailure {
    status: ReceiptStatus,
    message: String,
    error_code: &'static str,
}

impl StageFailure {
    fn new(status: ReceiptStatus, message: impl Into<String>, error_code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }
}

/// Mutable state of one run.
struct Progress {
    stage: ValidationStage,
    record: ReceiptRecord,
    metadata: HashMap<String, String>,
}

impl Progress {
    fn reach(&mut self, stage: ValidationStage) {
        tracing::debug!(stage = %stage, "receipt validation stage reached");
        self.stage = stage;
    }
}

impl ReceiptValidator {
    pub fn new(options: ReceiptValidationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReceiptValidationOptions {
        &self.options
    }

    /// Run the whole pipeline against `source`.
    pub fn validate<S: ReceiptSource + ?Sized>(self, source: &S) -> ReceiptValidation {
        let mut progress = Progress {
            stage: ValidationStage::NotLoaded,
            record: ReceiptRecord::default(),
            metadata: HashMap::new(),
        };

        let outcome = self.run(source, &mut progress);

        let Progress {
            stage,
            record,
            mut metadata,
        } = progress;
        metadata.insert("receipt.stage".to_string(), stage.to_string());

        match outcome {
            Ok(()) => {
                metadata.insert(
                    "receipt.status".to_string(),
                    ReceiptStatus::ValidationSuccess.code().to_string(),
                );
                tracing::debug!(purchases = record.purchases.len(), "receipt is valid");
                ReceiptValidation {
                    status: ReceiptStatus::ValidationSuccess,
                    stage,
                    record,
                    failures: Vec::new(),
                    metadata,
                }
            }
            Err(failure) => {
                tracing::warn!(
                    status = failure.status.code(),
                    stage = %stage,
                    error_code = failure.error_code,
                    detail = %failure.message,
                    "receipt validation failed"
                );
                metadata.insert("receipt.status".to_string(), failure.status.code().to_string());
                ReceiptValidation {
                    status: failure.status,
                    stage,
                    record,
                    failures: vec![ValidationFailure {
                        message: failure.message,
                        error_code: Some(failure.error_code.to_string()),
                    }],
                    metadata,
                }
            }
        }
    }

    fn run<S: ReceiptSource + ?Sized>(
        &self,
        source: &S,
        progress: &mut Progress,
    ) -> Result<(), StageFailure> {
        let bytes = self.load(source)?;
        progress.metadata.insert("receipt.len".to_string(), bytes.len().to_string());
        progress.reach(ValidationStage::Loaded);

        let container = SignedContainer::parse(&bytes)
            .map_err(|e| StageFailure::new(e.status(), e.to_string(), e.error_code()))?;
        progress
            .metadata
            .insert("pkcs7.certificates".to_string(), container.certificates.len().to_string());

        let payload = verify_signed_container(
            container,
            self.options.trusted_root_der.as_deref(),
            &self.options.signature,
        )
        .map_err(|e| StageFailure::new(e.status(), e.to_string(), e.error_code()))?;
        progress.reach(ValidationStage::SignatureVerified);

        RECEIPT_PARSER
            .parse_into(&payload, &mut progress.record)
            .map_err(|e| {
                StageFailure::new(
                    ReceiptStatus::UnexpectedAsn1Type,
                    e.to_string(),
                    "UNEXPECTED_ASN1_TYPE",
                )
            })?;
        progress
            .metadata
            .insert("receipt.purchases".to_string(), progress.record.purchases.len().to_string());

        let missing = progress.record.missing_components();
        if !missing.is_empty() {
            return Err(StageFailure::new(
                ReceiptStatus::MissingComponent,
                format!("receipt is missing {}", missing.join(", ")),
                "MISSING_COMPONENT",
            ));
        }
        progress.reach(ValidationStage::FieldsParsed);

        self.check_identity(&progress.record)?;
        progress.reach(ValidationStage::IdentityChecked);

        self.check_hash(&progress.record)?;
        progress.reach(ValidationStage::HashChecked);

        self.check_expiration(&progress.record)?;
        progress.reach(ValidationStage::ExpirationChecked);

        progress.reach(ValidationStage::Valid);
        Ok(())
    }

    fn load<S: ReceiptSource + ?Sized>(&self, source: &S) -> Result<Vec<u8>, StageFailure> {
        let bytes = match source.load_receipt() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Err(StageFailure::new(
                    ReceiptStatus::NoReceiptPresent,
                    "no receipt was found",
                    "NO_RECEIPT",
                ))
            }
            Err(e) => {
                return Err(StageFailure::new(
                    ReceiptStatus::UnknownFailure,
                    e.to_string(),
                    "RECEIPT_LOAD_ERROR",
                ))
            }
        };

        if bytes.is_empty() {
            return Err(StageFailure::new(
                ReceiptStatus::UnknownReceiptFormat,
                "receipt is empty",
                "EMPTY_RECEIPT",
            ));
        }
        if bytes.len() > self.options.max_receipt_len {
            return Err(StageFailure::new(
                ReceiptStatus::UnknownReceiptFormat,
                format!(
                    "receipt is {} bytes, limit is {}",
                    bytes.len(),
                    self.options.max_receipt_len
                ),
                "RECEIPT_TOO_LARGE",
            ));
        }
        Ok(bytes)
    }

    fn check_identity(&self, record: &ReceiptRecord) -> Result<(), StageFailure> {
        let identity = self.options.app_identity.as_ref().ok_or_else(|| {
            StageFailure::new(
                ReceiptStatus::UnknownFailure,
                "no application identity configured",
                "MISSING_APP_IDENTITY",
            )
        })?;

        let bundle_identifier = record.bundle_identifier.as_deref().unwrap_or_default();
        if bundle_identifier != identity.bundle_identifier {
            return Err(StageFailure::new(
                ReceiptStatus::InvalidBundleIdentifier,
                format!(
                    "receipt bundle identifier {bundle_identifier:?} does not match {:?}",
                    identity.bundle_identifier
                ),
                "BUNDLE_ID_MISMATCH",
            ));
        }

        let bundle_version = record.bundle_version.as_deref().unwrap_or_default();
        if bundle_version != identity.bundle_version {
            return Err(StageFailure::new(
                ReceiptStatus::InvalidVersionIdentifier,
                format!(
                    "receipt bundle version {bundle_version:?} does not match {:?}",
                    identity.bundle_version
                ),
                "BUNDLE_VERSION_MISMATCH",
            ));
        }

        Ok(())
    }

    fn check_hash(&self, record: &ReceiptRecord) -> Result<(), StageFailure> {
        let device = self.options.device_identifier.ok_or_else(|| {
            StageFailure::new(
                ReceiptStatus::UnknownFailure,
                "no device identifier configured",
                "MISSING_DEVICE_IDENTIFIER",
            )
        })?;

        let computed = compute_receipt_hash(
            device.as_bytes(),
            record.opaque_value.as_deref().unwrap_or_default(),
            record.bundle_identifier_bytes.as_deref().unwrap_or_default(),
        );

        if record.hash.as_deref() != Some(computed.as_slice()) {
            return Err(StageFailure::new(
                ReceiptStatus::InvalidHash,
                "device-binding hash does not match the receipt",
                "HASH_MISMATCH",
            ));
        }
        Ok(())
    }

    fn check_expiration(&self, record: &ReceiptRecord) -> Result<(), StageFailure> {
        let Some(expiration) = record.expiration_date else {
            return Ok(());
        };

        let now = self.options.now.unwrap_or_else(OffsetDateTime::now_utc);
        if expiration < now {
            return Err(StageFailure::new(
                ReceiptStatus::InvalidExpired,
                format!("receipt expired at {expiration}"),
                "RECEIPT_EXPIRED",
            ));
        }
        Ok(())
    }
}

/// Validate `source` with `options` in one call.
pub fn validate_receipt<S: ReceiptSource + ?Sized>(
    source: &S,
    options: ReceiptValidationOptions,
) -> ReceiptValidation {
    ReceiptValidator::new(options).validate(source)
}
