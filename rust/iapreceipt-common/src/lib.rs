// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared receipt types and parsers.
//!
//! This crate knows how to take a receipt apart: the PKCS#7 envelope, the DER
//! attribute sets inside it, and the records they decode into. It does not
//! verify signatures or apply any policy; see `iapreceipt-x509` and
//! `iapreceipt-validation` for that.

pub mod attribute_set;
pub mod der;
pub mod purchase_record;
pub mod receipt_record;
pub mod receipt_status;
pub mod signed_container;

pub use attribute_set::{AttributeSetError, AttributeSetParser, FieldRule};
pub use der::{
    parse_receipt_timestamp, AttributeValue, DerCursor, DerError, Element, Header, ValueKind,
};
pub use purchase_record::PurchaseRecord;
pub use receipt_record::ReceiptRecord;
pub use receipt_status::{ErrorKind, ReceiptStatus};
pub use signed_container::{
    oid_to_string, AlgorithmIdentifier, ContainerError, SignedAttributes, SignedContainer,
    SignerIdentifier, SignerInfo,
};
