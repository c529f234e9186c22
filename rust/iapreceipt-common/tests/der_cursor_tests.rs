// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use iapreceipt_common::der::{tag, Length, TagClass};
use iapreceipt_common::{parse_receipt_timestamp, AttributeValue, DerCursor, DerError, ValueKind};
use iapreceipt_test_utils::der;
use time::macros::datetime;

#[test]
fn peek_does_not_advance() {
    let bytes = der::integer(5);
    let cursor = DerCursor::new(&bytes);

    let header = cursor.peek_header().unwrap();
    assert!(header.is_universal(tag::INTEGER));
    assert_eq!(header.class, TagClass::Universal);
    assert!(!header.constructed);
    assert_eq!(header.length, Length::Definite(1));
    assert_eq!(cursor.position(), 0);
    assert_eq!(cursor.peek_header().unwrap(), header);
}

#[test]
fn advanced_by_is_pure() {
    let bytes = [0u8; 4];
    let cursor = DerCursor::new(&bytes);
    let next = cursor.advanced_by(3).unwrap();

    assert_eq!(cursor.position(), 0);
    assert_eq!(next.position(), 3);
    assert_eq!(next.remaining(), 1);
    assert!(matches!(cursor.advanced_by(5), Err(DerError::Truncated { .. })));
}

#[test]
fn integers_decode_twos_complement() {
    for value in [0i64, 1, 127, 128, 255, 256, -1, -128, -129, 1701, i64::MAX, i64::MIN] {
        let bytes = der::integer(value);
        let mut cursor = DerCursor::new(&bytes);
        assert_eq!(cursor.read_integer().unwrap(), value, "value {value}");
        assert!(cursor.is_empty());
    }
}

#[test]
fn oversized_and_empty_integers_fail() {
    let nine = der::tlv(0x02, &[1; 9]);
    assert_eq!(
        DerCursor::new(&nine).read_integer().unwrap_err(),
        DerError::IntegerOverflow { length: 9 }
    );
    assert_eq!(DerCursor::new(&[0x02, 0x00]).read_integer().unwrap_err(), DerError::EmptyInteger);
}

#[test]
fn failed_read_leaves_cursor_unchanged() {
    let mut bytes = der::utf8_string("hi");
    bytes.extend(der::integer(9));
    let mut cursor = DerCursor::new(&bytes);

    assert!(matches!(cursor.read_integer(), Err(DerError::UnexpectedTag { .. })));
    assert!(matches!(cursor.read_timestamp(), Err(DerError::UnexpectedTag { .. })));
    assert_eq!(cursor.position(), 0);

    assert_eq!(cursor.read_text().unwrap(), "hi");
    assert_eq!(cursor.read_integer().unwrap(), 9);
    assert!(cursor.is_empty());
}

#[test]
fn text_accepts_utf8_and_ia5() {
    let utf8 = der::utf8_string("héllo");
    assert_eq!(DerCursor::new(&utf8).read_text().unwrap(), "héllo");

    let ia5 = der::ia5_string("plain");
    assert_eq!(
        DerCursor::new(&ia5).read_value(ValueKind::Text).unwrap(),
        AttributeValue::Ia5Text("plain")
    );

    let bad_ia5 = der::tlv(0x16, "héllo".as_bytes());
    assert!(matches!(DerCursor::new(&bad_ia5).read_text(), Err(DerError::InvalidText(_))));

    let bad_utf8 = der::tlv(0x0C, &[0xff, 0xfe]);
    assert!(matches!(DerCursor::new(&bad_utf8).read_text(), Err(DerError::InvalidText(_))));
}

#[test]
fn timestamps_require_the_exact_pattern() {
    let ok = der::ia5_string("2023-11-14T22:13:20Z");
    assert_eq!(
        DerCursor::new(&ok).read_timestamp().unwrap(),
        datetime!(2023-11-14 22:13:20 UTC)
    );

    for bad in ["2023-11-14 22:13:20Z", "2023-11-14T22:13:20", "2023-11-14T22:13:20+01:00", "2023-13-01T00:00:00Z", ""] {
        assert!(parse_receipt_timestamp(bad).is_err(), "{bad:?} should be rejected");
    }

    // UTF8String is not a timestamp carrier.
    let utf8 = der::utf8_string("2023-11-14T22:13:20Z");
    assert!(matches!(DerCursor::new(&utf8).read_timestamp(), Err(DerError::UnexpectedTag { .. })));
}

#[test]
fn raw_bytes_take_everything() {
    let bytes = der::utf8_string("abc");
    let mut cursor = DerCursor::new(&bytes);
    assert_eq!(cursor.read_value(ValueKind::RawBytes).unwrap(), AttributeValue::RawBytes(&bytes));
    assert!(cursor.is_empty());
}

#[test]
fn long_form_lengths_and_high_tag_numbers() {
    let content = vec![0xAB; 300];
    let bytes = der::octet_string(&content);
    assert_eq!(&bytes[..4], &[0x04, 0x82, 0x01, 0x2C]);
    assert_eq!(DerCursor::new(&bytes).read_expected(tag::OCTET_STRING).unwrap(), content.as_slice());

    // [APPLICATION 200] primitive, one content byte.
    let high = [0x5F, 0x81, 0x48, 0x01, 0x00];
    let header = DerCursor::new(&high).peek_header().unwrap();
    assert_eq!(header.class, TagClass::Application);
    assert_eq!(header.number, 200);
    assert_eq!(header.header_len, 4);
}

#[test]
fn declared_length_past_the_end_is_rejected() {
    let bytes = [0x04, 0x05, 0x01, 0x02];
    assert!(matches!(
        DerCursor::new(&bytes).read_element(),
        Err(DerError::LengthOverflow { length: 5, remaining: 2, .. })
    ));
    assert!(matches!(DerCursor::new(&[0x04]).peek_header(), Err(DerError::Truncated { .. })));
    assert!(matches!(
        DerCursor::new(&[0x04, 0xFF]).peek_header(),
        Err(DerError::InvalidLength { .. })
    ));
}

#[test]
fn indefinite_lengths_only_through_ber_reads() {
    let inner = [der::integer(1), der::integer(2)].concat();
    let ber = der::constructed(0x30, &inner, true);

    assert!(matches!(
        DerCursor::new(&ber).read_element(),
        Err(DerError::IndefiniteLength { .. })
    ));

    let mut cursor = DerCursor::new(&ber);
    let element = cursor.read_ber_element().unwrap();
    assert!(cursor.is_empty());
    assert_eq!(element.value, inner.as_slice());
    assert_eq!(element.raw, ber.as_slice());

    let mut seq = DerCursor::new(&ber).enter_ber(tag::SEQUENCE).unwrap();
    assert_eq!(seq.read_integer().unwrap(), 1);
    assert_eq!(seq.read_integer().unwrap(), 2);
    assert!(seq.is_empty());

    // Primitive elements cannot be indefinite.
    assert!(matches!(
        DerCursor::new(&[0x04, 0x80, 0x00, 0x00]).peek_header(),
        Err(DerError::InvalidLength { .. })
    ));
}

#[test]
fn unterminated_or_deeply_nested_ber_is_rejected() {
    let unterminated = [0x30, 0x80, 0x02, 0x01, 0x01];
    assert!(DerCursor::new(&unterminated).read_ber_element().is_err());

    let mut nested = Vec::new();
    for _ in 0..40 {
        nested.extend_from_slice(&[0x30, 0x80]);
    }
    for _ in 0..40 {
        nested.extend_from_slice(&[0x00, 0x00]);
    }
    assert!(matches!(
        DerCursor::new(&nested).read_ber_element(),
        Err(DerError::NestingTooDeep { .. })
    ));
}

#[test]
fn enter_requires_constructed_expected_tag() {
    let seq = der::sequence(&der::integer(1));
    assert!(matches!(
        DerCursor::new(&seq).enter(tag::SET),
        Err(DerError::UnexpectedTag { expected: 0x11, .. })
    ));
    let mut inner = DerCursor::new(&seq).enter(tag::SEQUENCE).unwrap();
    assert_eq!(inner.read_integer().unwrap(), 1);
}
