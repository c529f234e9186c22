// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-app purchase receipt validation.
//!
//! Given the raw receipt, a pinned root certificate and the running app's
//! identity, [`ReceiptValidator`] decides whether the receipt is genuine, was
//! issued to this app on this device, and is still current.
//!
//! ```no_run
//! use iapreceipt_validation::{
//!     AppIdentity, FileReceiptSource, ReceiptValidationOptions, ReceiptValidator,
//! };
//!
//! # fn run(root_der: Vec<u8>, device: iapreceipt_validation::DeviceIdentifier) {
//! let options = ReceiptValidationOptions::default()
//!     .with_trusted_root(root_der)
//!     .with_app_identity(AppIdentity::new("com.example.app", "1.0"))
//!     .with_device_identifier(device);
//!
//! let result = ReceiptValidator::new(options).validate(&FileReceiptSource::new("receipt"));
//! if result.is_valid() {
//!     for purchase in &result.record.purchases {
//!         println!("{:?}", purchase.product_identifier);
//!     }
//! }
//! # }
//! ```

pub mod device_hash;
pub mod receipt_source;
pub mod receipt_validator;
pub mod validation_options;
pub mod validation_result;

pub use device_hash::{compute_receipt_hash, RECEIPT_HASH_LEN};
pub use receipt_source::{FileReceiptSource, ReceiptSource, ReceiptSourceError};
pub use receipt_validator::{validate_receipt, ReceiptValidator};
pub use validation_options::{
    AppIdentity, DeviceIdentifier, DeviceIdentifierError, ReceiptValidationOptions,
    DEFAULT_MAX_RECEIPT_LEN,
};
pub use validation_result::{ReceiptValidation, ValidationFailure, ValidationStage};

pub use iapreceipt_common::{PurchaseRecord, ReceiptRecord, ReceiptStatus};
