// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Receipt and purchase attribute-set decoding.

use iapreceipt_common::receipt_record::{receipt_attribute, RECEIPT_PARSER};
use iapreceipt_common::{AttributeSetError, PurchaseRecord, ReceiptRecord};
use iapreceipt_test_utils::{der, PurchaseBuilder, ReceiptPayloadBuilder};
use proptest::prelude::*;
use time::macros::datetime;

#[test]
fn receipt_fields_decode() {
    let created = datetime!(2024-01-02 03:04:05 UTC);
    let expires = datetime!(2025-01-02 03:04:05 UTC);
    let payload = ReceiptPayloadBuilder::new()
        .bundle_identifier("com.example.app")
        .bundle_version("42")
        .opaque_value(&[9, 8, 7])
        .hash(&[0xAA; 20])
        .creation_date(created)
        .original_application_version("1.0")
        .expiration_date(expires)
        .build();

    let record = ReceiptRecord::parse(&payload).unwrap();
    assert_eq!(record.bundle_identifier.as_deref(), Some("com.example.app"));
    assert_eq!(record.bundle_identifier_bytes, Some(der::utf8_string("com.example.app")));
    assert_eq!(record.bundle_version.as_deref(), Some("42"));
    assert_eq!(record.opaque_value, Some(vec![9, 8, 7]));
    assert_eq!(record.hash, Some(vec![0xAA; 20]));
    assert_eq!(record.creation_date, Some(created));
    assert_eq!(record.original_application_version.as_deref(), Some("1.0"));
    assert_eq!(record.expiration_date, Some(expires));
    assert!(record.purchases.is_empty());
    assert!(record.missing_components().is_empty());
}

#[test]
fn missing_components_are_named() {
    let payload = ReceiptPayloadBuilder::new().bundle_version("1").build();
    let record = ReceiptRecord::parse(&payload).unwrap();
    assert_eq!(record.missing_components(), vec!["bundle_identifier", "opaque_value", "hash"]);
}

#[test]
fn empty_set_decodes_to_empty_record() {
    let record = ReceiptRecord::parse(&der::set(&[])).unwrap();
    assert_eq!(record, ReceiptRecord::default());
}

#[test]
fn undecodable_values_leave_fields_unset() {
    let payload = ReceiptPayloadBuilder::new()
        .attribute(receipt_attribute::BUNDLE_VERSION, der::integer(3))
        .attribute(receipt_attribute::CREATION_DATE, der::ia5_string("yesterday"))
        .attribute(receipt_attribute::EXPIRATION_DATE, der::utf8_string("2024-01-01T00:00:00Z"))
        .bundle_identifier("still.here")
        .build();

    let record = ReceiptRecord::parse(&payload).unwrap();
    assert_eq!(record.bundle_version, None);
    assert_eq!(record.creation_date, None);
    assert_eq!(record.expiration_date, None);
    assert_eq!(record.bundle_identifier.as_deref(), Some("still.here"));
}

#[test]
fn outer_element_must_be_a_set() {
    let err = ReceiptRecord::parse(&der::sequence(&[])).unwrap_err();
    assert!(matches!(err, AttributeSetError::NotASet(_)));
}

#[test]
fn broken_attribute_skeleton_fails_the_set() {
    // Element inside the set is not a SEQUENCE.
    let not_seq = der::set(&der::integer(2));
    assert!(matches!(
        ReceiptRecord::parse(&not_seq).unwrap_err(),
        AttributeSetError::NotASequence { offset: 0, .. }
    ));

    // Type is not an INTEGER.
    let bad_type = der::set(&der::sequence(
        &[der::utf8_string("2"), der::integer(1), der::octet_string(&[])].concat(),
    ));
    assert!(matches!(ReceiptRecord::parse(&bad_type).unwrap_err(), AttributeSetError::InvalidType { .. }));

    // Version is missing.
    let no_version = der::set(&der::sequence(&[der::integer(2), der::octet_string(&[])].concat()));
    assert!(matches!(
        ReceiptRecord::parse(&no_version).unwrap_err(),
        AttributeSetError::InvalidVersion { attribute_type: 2, .. }
    ));

    // Value is not an OCTET STRING.
    let bad_value = der::set(&der::sequence(&[der::integer(2), der::integer(1), der::integer(0)].concat()));
    assert!(matches!(
        ReceiptRecord::parse(&bad_value).unwrap_err(),
        AttributeSetError::InvalidValue { attribute_type: 2, .. }
    ));
}

#[test]
fn fields_before_a_structural_failure_are_kept() {
    let mut content = ReceiptPayloadBuilder::new().bundle_identifier("partial").build();
    // Strip the SET header (short form) and append a broken element.
    content.drain(..2);
    content.extend(der::integer(7));
    let payload = der::set(&content);

    let mut record = ReceiptRecord::default();
    assert!(RECEIPT_PARSER.parse_into(&payload, &mut record).is_err());
    assert_eq!(record.bundle_identifier.as_deref(), Some("partial"));
}

#[test]
fn purchase_fields_decode() {
    let at = datetime!(2024-02-29 23:59:59 UTC);
    let bytes = PurchaseBuilder::new()
        .quantity(2)
        .product_identifier("gems.100")
        .transaction_identifier("t-2")
        .original_transaction_identifier("t-1")
        .purchase_date(at)
        .original_purchase_date(at)
        .web_order_line_item_id(77)
        .build();

    let purchase = PurchaseRecord::parse(&bytes).unwrap();
    assert_eq!(
        purchase,
        PurchaseRecord {
            quantity: Some(2),
            product_identifier: Some("gems.100".to_string()),
            transaction_identifier: Some("t-2".to_string()),
            original_transaction_identifier: Some("t-1".to_string()),
            purchase_date: Some(at),
            original_purchase_date: Some(at),
            subscription_expiration_date: None,
            cancellation_date: None,
            web_order_line_item_id: Some(77),
        }
    );
}

#[test]
fn empty_purchase_is_still_appended() {
    let payload = ReceiptPayloadBuilder::new()
        .purchase(&PurchaseBuilder::new())
        .purchase(&PurchaseBuilder::new().attribute(9000, vec![1]))
        .build();
    let record = ReceiptRecord::parse(&payload).unwrap();
    assert_eq!(record.purchases, vec![PurchaseRecord::default(), PurchaseRecord::default()]);
}

#[test]
fn malformed_nested_purchase_is_dropped() {
    let payload = ReceiptPayloadBuilder::new()
        .bundle_identifier("com.example.app")
        .purchase(&PurchaseBuilder::new().product_identifier("first"))
        .attribute(receipt_attribute::IN_APP_PURCHASE, der::utf8_string("not a set"))
        .attribute(receipt_attribute::IN_APP_PURCHASE, der::sequence(&[]))
        .purchase(&PurchaseBuilder::new().product_identifier("second"))
        .bundle_version("7")
        .build();

    let record = ReceiptRecord::parse(&payload).unwrap();
    let products: Vec<_> = record.purchases.iter().map(|p| p.product_identifier.as_deref()).collect();
    assert_eq!(products, vec![Some("first"), Some("second")]);
    assert_eq!(record.bundle_identifier.as_deref(), Some("com.example.app"));
    assert_eq!(record.bundle_version.as_deref(), Some("7"));
}

#[test]
fn purchase_with_broken_skeleton_is_dropped() {
    // Version INTEGER missing inside the nested set.
    let broken = der::set(&der::sequence(&[der::integer(1702), der::octet_string(&der::utf8_string("x"))].concat()));
    assert!(PurchaseRecord::parse(&broken).is_err());

    let payload = ReceiptPayloadBuilder::new()
        .attribute(receipt_attribute::IN_APP_PURCHASE, broken)
        .build();
    assert!(ReceiptRecord::parse(&payload).unwrap().purchases.is_empty());
}

fn purchase_strategy() -> impl Strategy<Value = (i64, String, String, i64)> {
    (
        1i64..1000,
        "[a-z]{1,12}(\\.[a-z]{1,8}){0,2}",
        "[0-9]{1,15}",
        0i64..i64::MAX,
    )
}

proptest! {
    #[test]
    fn n_purchases_decode_in_order(
        purchases in prop::collection::vec(purchase_strategy(), 0..12),
        unknown_type in 22i64..1000,
    ) {
        let mut builder = ReceiptPayloadBuilder::new()
            .bundle_identifier("com.example.app")
            .attribute(unknown_type, b"ignored".to_vec());
        for (quantity, product, transaction, line_item) in &purchases {
            builder = builder.purchase(
                &PurchaseBuilder::new()
                    .quantity(*quantity)
                    .product_identifier(product)
                    .attribute(1707, vec![0xFF])
                    .transaction_identifier(transaction)
                    .web_order_line_item_id(*line_item),
            );
        }

        let record = ReceiptRecord::parse(&builder.build()).unwrap();
        prop_assert_eq!(record.purchases.len(), purchases.len());
        for (decoded, (quantity, product, transaction, line_item)) in record.purchases.iter().zip(&purchases) {
            prop_assert_eq!(decoded.quantity, Some(*quantity));
            prop_assert_eq!(decoded.product_identifier.as_deref(), Some(product.as_str()));
            prop_assert_eq!(decoded.transaction_identifier.as_deref(), Some(transaction.as_str()));
            prop_assert_eq!(decoded.web_order_line_item_id, Some(*line_item));
            prop_assert_eq!(decoded.purchase_date, None);
        }
    }
}
