// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Table-driven parser for receipt attribute sets.
//!
//! Receipt payloads and each nested in-app purchase share one layout:
//!
//! ```text
//! SET OF SEQUENCE {
//!     type    INTEGER,
//!     version INTEGER,
//!     value   OCTET STRING
//! }
//! ```
//!
//! The parser walks the set and hands each value to every [`FieldRule`]
//! registered for its type. Unknown types are skipped. A value that fails to
//! decode leaves its field unset; only a broken SET/SEQUENCE/INTEGER/OCTET
//! STRING skeleton fails the whole set, because after that the remaining bytes
//! can no longer be segmented reliably.

use crate::der::{tag, AttributeValue, DerCursor, DerError, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeSetError {
    #[error("attribute set is not a SET: {0}")]
    NotASet(DerError),

    #[error("attribute at offset {offset} is not a SEQUENCE: {source}")]
    NotASequence { offset: usize, source: DerError },

    #[error("attribute at offset {offset} has no decodable type: {source}")]
    InvalidType { offset: usize, source: DerError },

    #[error("attribute type {attribute_type} has no decodable version: {source}")]
    InvalidVersion { attribute_type: i64, source: DerError },

    #[error("attribute type {attribute_type} value is not an OCTET STRING: {source}")]
    InvalidValue { attribute_type: i64, source: DerError },
}

/// Decode a value of `kind` for `attribute_type` and store it with `assign`.
///
/// `assign` only runs when decoding succeeded.
pub struct FieldRule<T: 'static> {
    pub attribute_type: i64,
    pub name: &'static str,
    pub kind: ValueKind,
    pub assign: fn(&mut T, AttributeValue<'_>),
}

/// Walks an attribute set and dispatches values through a rule table.
pub struct AttributeSetParser<T: 'static> {
    rules: &'static [FieldRule<T>],
}

impl<T: 'static> AttributeSetParser<T> {
    pub const fn new(rules: &'static [FieldRule<T>]) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'static [FieldRule<T>] {
        self.rules
    }

    /// Parse `bytes` into `target`.
    ///
    /// Fields are assigned as they are met, so on error `target` holds
    /// everything decoded before the failing attribute.
    pub fn parse_into(&self, bytes: &[u8], target: &mut T) -> Result<(), AttributeSetError> {
        let mut outer = DerCursor::new(bytes);
        let mut set = outer.enter(tag::SET).map_err(AttributeSetError::NotASet)?;

        while !set.is_empty() {
            let offset = set.position();
            let mut attribute = set
                .enter(tag::SEQUENCE)
                .map_err(|source| AttributeSetError::NotASequence { offset, source })?;

            let attribute_type = attribute
                .read_integer()
                .map_err(|source| AttributeSetError::InvalidType { offset, source })?;

            // Required for synchronization; the value itself carries no meaning here.
            let _version = attribute
                .read_integer()
                .map_err(|source| AttributeSetError::InvalidVersion { attribute_type, source })?;

            let value = attribute
                .read_expected(tag::OCTET_STRING)
                .map_err(|source| AttributeSetError::InvalidValue { attribute_type, source })?;

            self.dispatch(attribute_type, value, target);
        }

        Ok(())
    }

    fn dispatch(&self, attribute_type: i64, value: &[u8], target: &mut T) {
        let mut matched = false;
        for rule in self.rules.iter().filter(|r| r.attribute_type == attribute_type) {
            matched = true;
            match DerCursor::new(value).read_value(rule.kind) {
                Ok(decoded) => (rule.assign)(target, decoded),
                Err(e) => {
                    tracing::debug!(
                        attribute_type,
                        field = rule.name,
                        error = %e,
                        "attribute value did not decode; leaving field unset"
                    );
                }
            }
        }
        if !matched {
            tracing::trace!(attribute_type, len = value.len(), "skipping unrecognized attribute");
        }
    }
}
