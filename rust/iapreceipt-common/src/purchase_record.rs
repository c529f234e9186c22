// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-app purchase entries (receipt attribute 17).

use time::OffsetDateTime;

use crate::attribute_set::{AttributeSetError, AttributeSetParser, FieldRule};
use crate::der::{AttributeValue, ValueKind};

/// Attribute types inside an in-app purchase set.
pub mod purchase_attribute {
    pub const QUANTITY: i64 = 1701;
    pub const PRODUCT_IDENTIFIER: i64 = 1702;
    pub const TRANSACTION_IDENTIFIER: i64 = 1703;
    pub const PURCHASE_DATE: i64 = 1704;
    pub const ORIGINAL_TRANSACTION_IDENTIFIER: i64 = 1705;
    pub const ORIGINAL_PURCHASE_DATE: i64 = 1706;
    pub const SUBSCRIPTION_EXPIRATION_DATE: i64 = 1708;
    pub const WEB_ORDER_LINE_ITEM_ID: i64 = 1711;
    pub const CANCELLATION_DATE: i64 = 1712;
}

/// One purchase. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseRecord {
    pub quantity: Option<i64>,
    pub product_identifier: Option<String>,
    pub transaction_identifier: Option<String>,
    pub original_transaction_identifier: Option<String>,
    pub purchase_date: Option<OffsetDateTime>,
    pub original_purchase_date: Option<OffsetDateTime>,
    pub subscription_expiration_date: Option<OffsetDateTime>,
    pub cancellation_date: Option<OffsetDateTime>,
    pub web_order_line_item_id: Option<i64>,
}

impl PurchaseRecord {
    /// Decode a purchase from the content of a receipt's in-app purchase attribute.
    pub fn parse(bytes: &[u8]) -> Result<Self, AttributeSetError> {
        let mut purchase = Self::default();
        PURCHASE_PARSER.parse_into(bytes, &mut purchase)?;
        Ok(purchase)
    }
}

pub static PURCHASE_PARSER: AttributeSetParser<PurchaseRecord> =
    AttributeSetParser::new(PURCHASE_ATTRIBUTE_RULES);

pub const PURCHASE_ATTRIBUTE_RULES: &[FieldRule<PurchaseRecord>] = &[
    FieldRule {
        attribute_type: purchase_attribute::QUANTITY,
        name: "quantity",
        kind: ValueKind::Integer,
        assign: set_quantity,
    },
    FieldRule {
        attribute_type: purchase_attribute::PRODUCT_IDENTIFIER,
        name: "product_identifier",
        kind: ValueKind::Text,
        assign: set_product_identifier,
    },
    FieldRule {
        attribute_type: purchase_attribute::TRANSACTION_IDENTIFIER,
        name: "transaction_identifier",
        kind: ValueKind::Text,
        assign: set_transaction_identifier,
    },
    FieldRule {
        attribute_type: purchase_attribute::PURCHASE_DATE,
        name: "purchase_date",
        kind: ValueKind::Timestamp,
        assign: set_purchase_date,
    },
    FieldRule {
        attribute_type: purchase_attribute::ORIGINAL_TRANSACTION_IDENTIFIER,
        name: "original_transaction_identifier",
        kind: ValueKind::Text,
        assign: set_original_transaction_identifier,
    },
    FieldRule {
        attribute_type: purchase_attribute::ORIGINAL_PURCHASE_DATE,
        name: "original_purchase_date",
        kind: ValueKind::Timestamp,
        assign: set_original_purchase_date,
    },
    FieldRule {
        attribute_type: purchase_attribute::SUBSCRIPTION_EXPIRATION_DATE,
        name: "subscription_expiration_date",
        kind: ValueKind::Timestamp,
        assign: set_subscription_expiration_date,
    },
    FieldRule {
        attribute_type: purchase_attribute::WEB_ORDER_LINE_ITEM_ID,
        name: "web_order_line_item_id",
        kind: ValueKind::Integer,
        assign: set_web_order_line_item_id,
    },
    FieldRule {
        attribute_type: purchase_attribute::CANCELLATION_DATE,
        name: "cancellation_date",
        kind: ValueKind::Timestamp,
        assign: set_cancellation_date,
    },
];

fn set_quantity(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.quantity = v.as_integer();
}

fn set_product_identifier(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.product_identifier = v.as_text().map(str::to_owned);
}

fn set_transaction_identifier(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.transaction_identifier = v.as_text().map(str::to_owned);
}

fn set_purchase_date(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.purchase_date = v.as_timestamp();
}

fn set_original_transaction_identifier(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.original_transaction_identifier = v.as_text().map(str::to_owned);
}

fn set_original_purchase_date(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.original_purchase_date = v.as_timestamp();
}

fn set_subscription_expiration_date(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.subscription_expiration_date = v.as_timestamp();
}

fn set_web_order_line_item_id(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.web_order_line_item_id = v.as_integer();
}

fn set_cancellation_date(p: &mut PurchaseRecord, v: AttributeValue<'_>) {
    p.cancellation_date = v.as_timestamp();
}
