// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Top-level receipt fields.

use time::OffsetDateTime;

use crate::attribute_set::{AttributeSetError, AttributeSetParser, FieldRule};
use crate::der::{AttributeValue, ValueKind};
use crate::purchase_record::PurchaseRecord;

/// Attribute types in the receipt payload.
pub mod receipt_attribute {
    pub const BUNDLE_IDENTIFIER: i64 = 2;
    pub const BUNDLE_VERSION: i64 = 3;
    pub const OPAQUE_VALUE: i64 = 4;
    pub const HASH: i64 = 5;
    pub const CREATION_DATE: i64 = 12;
    pub const IN_APP_PURCHASE: i64 = 17;
    pub const ORIGINAL_APPLICATION_VERSION: i64 = 19;
    pub const EXPIRATION_DATE: i64 = 21;
}

/// Decoded receipt payload.
///
/// Fields stay `None` until decoded. The bundle identifier is kept twice: as
/// text for the identity check, and as the raw attribute content (the encoded
/// string, tag and length included) for the device-binding hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptRecord {
    pub bundle_identifier: Option<String>,
    pub bundle_identifier_bytes: Option<Vec<u8>>,
    pub bundle_version: Option<String>,
    pub opaque_value: Option<Vec<u8>>,
    pub hash: Option<Vec<u8>>,
    pub creation_date: Option<OffsetDateTime>,
    pub original_application_version: Option<String>,
    pub expiration_date: Option<OffsetDateTime>,
    pub purchases: Vec<PurchaseRecord>,
}

impl ReceiptRecord {
    /// Decode a verified receipt payload.
    pub fn parse(payload: &[u8]) -> Result<Self, AttributeSetError> {
        let mut record = Self::default();
        RECEIPT_PARSER.parse_into(payload, &mut record)?;
        Ok(record)
    }

    /// Names of the fields every valid receipt must carry but this one lacks.
    pub fn missing_components(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bundle_identifier.is_none() || self.bundle_identifier_bytes.is_none() {
            missing.push("bundle_identifier");
        }
        if self.bundle_version.is_none() {
            missing.push("bundle_version");
        }
        if self.opaque_value.is_none() {
            missing.push("opaque_value");
        }
        if self.hash.is_none() {
            missing.push("hash");
        }
        missing
    }
}

pub static RECEIPT_PARSER: AttributeSetParser<ReceiptRecord> =
    AttributeSetParser::new(RECEIPT_ATTRIBUTE_RULES);

pub const RECEIPT_ATTRIBUTE_RULES: &[FieldRule<ReceiptRecord>] = &[
    FieldRule {
        attribute_type: receipt_attribute::BUNDLE_IDENTIFIER,
        name: "bundle_identifier",
        kind: ValueKind::Text,
        assign: set_bundle_identifier,
    },
    FieldRule {
        attribute_type: receipt_attribute::BUNDLE_IDENTIFIER,
        name: "bundle_identifier_bytes",
        kind: ValueKind::RawBytes,
        assign: set_bundle_identifier_bytes,
    },
    FieldRule {
        attribute_type: receipt_attribute::BUNDLE_VERSION,
        name: "bundle_version",
        kind: ValueKind::Text,
        assign: set_bundle_version,
    },
    FieldRule {
        attribute_type: receipt_attribute::OPAQUE_VALUE,
        name: "opaque_value",
        kind: ValueKind::RawBytes,
        assign: set_opaque_value,
    },
    FieldRule {
        attribute_type: receipt_attribute::HASH,
        name: "hash",
        kind: ValueKind::RawBytes,
        assign: set_hash,
    },
    FieldRule {
        attribute_type: receipt_attribute::CREATION_DATE,
        name: "creation_date",
        kind: ValueKind::Timestamp,
        assign: set_creation_date,
    },
    FieldRule {
        attribute_type: receipt_attribute::IN_APP_PURCHASE,
        name: "in_app_purchase",
        kind: ValueKind::RawBytes,
        assign: push_purchase,
    },
    FieldRule {
        attribute_type: receipt_attribute::ORIGINAL_APPLICATION_VERSION,
        name: "original_application_version",
        kind: ValueKind::Text,
        assign: set_original_application_version,
    },
    FieldRule {
        attribute_type: receipt_attribute::EXPIRATION_DATE,
        name: "expiration_date",
        kind: ValueKind::Timestamp,
        assign: set_expiration_date,
    },
];

fn set_bundle_identifier(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    r.bundle_identifier = v.as_text().map(str::to_owned);
}

fn set_bundle_identifier_bytes(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    r.bundle_identifier_bytes = v.as_bytes().map(<[u8]>::to_vec);
}

fn set_bundle_version(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    r.bundle_version = v.as_text().map(str::to_owned);
}

fn set_opaque_value(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    r.opaque_value = v.as_bytes().map(<[u8]>::to_vec);
}

fn set_hash(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    r.hash = v.as_bytes().map(<[u8]>::to_vec);
}

fn set_creation_date(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    r.creation_date = v.as_timestamp();
}

fn push_purchase(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    let bytes = v.as_bytes().unwrap_or_default();
    match PurchaseRecord::parse(bytes) {
        Ok(purchase) => r.purchases.push(purchase),
        Err(e) => {
            tracing::debug!(error = %e, len = bytes.len(), "dropping malformed in-app purchase")
        }
    }
}

fn set_original_application_version(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    r.original_application_version = v.as_text().map(str::to_owned);
}

fn set_expiration_date(r: &mut ReceiptRecord, v: AttributeValue<'_>) {
    r.expiration_date = v.as_timestamp();
}
