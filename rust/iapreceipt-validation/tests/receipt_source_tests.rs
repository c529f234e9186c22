// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write as _;

use iapreceipt_test_utils::{sign_receipt, ReceiptPayloadBuilder, TestPki};
use iapreceipt_validation::{
    AppIdentity, DeviceIdentifier, DeviceIdentifierError, FileReceiptSource, ReceiptSource, ReceiptSourceError,
    ReceiptStatus, ReceiptValidationOptions, ReceiptValidator,
};

#[test]
fn file_source_reads_existing_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"receipt bytes").unwrap();

    let source = FileReceiptSource::new(file.path());
    assert_eq!(source.load_receipt().unwrap(), Some(b"receipt bytes".to_vec()));
}

#[test]
fn missing_file_means_no_receipt() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileReceiptSource::new(dir.path().join("receipt"));
    assert!(source.load_receipt().unwrap().is_none());

    let result = ReceiptValidator::new(ReceiptValidationOptions::default()).validate(&source);
    assert_eq!(result.status, ReceiptStatus::NoReceiptPresent);
}

#[test]
fn unreadable_path_is_unknown_failure() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileReceiptSource::new(dir.path());
    assert!(matches!(source.load_receipt(), Err(ReceiptSourceError::Io { .. })));

    let result = ReceiptValidator::new(ReceiptValidationOptions::default()).validate(&source);
    assert_eq!(result.status, ReceiptStatus::UnknownFailure);
    assert_eq!(result.failures[0].error_code.as_deref(), Some("RECEIPT_LOAD_ERROR"));
}

#[test]
fn file_receipt_validates_end_to_end() {
    let pki = TestPki::new();
    let device = [7u8; 16];
    let payload = ReceiptPayloadBuilder::bound_to_device("com.example.app", "2.1", &device, b"opaque").build();
    let signed = sign_receipt(&payload, &pki);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&signed.bytes).unwrap();

    let options = ReceiptValidationOptions::default()
        .with_trusted_root(pki.root_der.clone())
        .with_app_identity(AppIdentity::new("com.example.app", "2.1"))
        .with_device_identifier(DeviceIdentifier::new(device));
    let result = ReceiptValidator::new(options).validate(&FileReceiptSource::new(file.path()));
    assert_eq!(result.status, ReceiptStatus::ValidationSuccess);
}

#[test]
fn slices_and_options_are_sources() {
    let bytes: &[u8] = b"abc";
    assert_eq!(bytes.load_receipt().unwrap(), Some(b"abc".to_vec()));
    assert_eq!(None::<Vec<u8>>.load_receipt().unwrap(), None);
}

#[test]
fn device_identifier_parses_hex_and_uuid() {
    let hex: DeviceIdentifier = "000102030405060708090a0b0c0d0e0f".parse().unwrap();
    let uuid: DeviceIdentifier = "00010203-0405-0607-0809-0A0B0C0D0E0F".parse().unwrap();
    let expected: [u8; 16] = core::array::from_fn(|i| i as u8);

    assert_eq!(hex.as_bytes(), &expected);
    assert_eq!(uuid, hex);
    assert_eq!(format!("{hex:?}"), "DeviceIdentifier(000102030405060708090a0b0c0d0e0f)");
}

#[test]
fn device_identifier_rejects_bad_input() {
    assert_eq!(
        "0001".parse::<DeviceIdentifier>().unwrap_err(),
        DeviceIdentifierError::InvalidLength(2)
    );
    assert!(matches!(
        "zz0102030405060708090a0b0c0d0e0f".parse::<DeviceIdentifier>(),
        Err(DeviceIdentifierError::InvalidText(_))
    ));
    assert!(matches!(
        "0001020-30405-0607-0809-0A0B0C0D0E0F".parse::<DeviceIdentifier>(),
        Err(DeviceIdentifierError::InvalidText(_))
    ));
    assert_eq!(
        DeviceIdentifier::try_from(&[1u8; 15][..]).unwrap_err(),
        DeviceIdentifierError::InvalidLength(15)
    );
}
