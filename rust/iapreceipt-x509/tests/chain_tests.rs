// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use iapreceipt_test_utils::{make_self_signed_ca, TestPki};
use iapreceipt_x509::{build_chain, ChainError, ParsedCertificate, DEFAULT_MAX_CHAIN_DEPTH};

fn parse(der: &[u8]) -> ParsedCertificate {
    ParsedCertificate::from_der(der).unwrap()
}

#[test]
fn leaf_chains_through_intermediate_to_pinned_root() {
    let pki = TestPki::new();
    let leaf = parse(&pki.leaf_der);
    let pool = vec![parse(&pki.intermediates[0])];
    let anchor = parse(&pki.root_der);

    let path = build_chain(&leaf, &pool, &anchor, DEFAULT_MAX_CHAIN_DEPTH).unwrap();
    assert_eq!(path.len(), 3);
    assert!(path[0].contains("Test Receipt Signer"));
    assert!(path[2].contains("Test Receipt Root CA"));
}

#[test]
fn embedded_copy_of_root_is_accepted() {
    let pki = TestPki::new();
    let leaf = parse(&pki.leaf_der);
    let pool = vec![parse(&pki.intermediates[0]), parse(&pki.root_der)];
    let anchor = parse(&pki.root_der);

    assert!(build_chain(&leaf, &pool, &anchor, DEFAULT_MAX_CHAIN_DEPTH).is_ok());
}

#[test]
fn missing_intermediate_is_untrusted() {
    let pki = TestPki::new();
    let leaf = parse(&pki.leaf_der);
    let anchor = parse(&pki.root_der);

    let err = build_chain(&leaf, &[], &anchor, DEFAULT_MAX_CHAIN_DEPTH).unwrap_err();
    assert_eq!(err, ChainError::UntrustedRoot);
    assert_eq!(err.error_code(), "CERT_CHAIN_UNTRUSTED_ROOT");
}

#[test]
fn unrelated_root_is_untrusted() {
    let pki = TestPki::new();
    let leaf = parse(&pki.leaf_der);
    let pool = vec![parse(&pki.intermediates[0]), parse(&pki.root_der)];
    let anchor = parse(&make_self_signed_ca("Some Other Root"));

    let err = build_chain(&leaf, &pool, &anchor, DEFAULT_MAX_CHAIN_DEPTH).unwrap_err();
    assert_eq!(err, ChainError::UntrustedRoot);
}

#[test]
fn root_with_same_name_but_different_key_is_untrusted() {
    let pki = TestPki::new();
    let leaf = parse(&pki.leaf_der);
    let pool = vec![parse(&pki.intermediates[0])];
    let impostor = parse(&make_self_signed_ca("Test Receipt Root CA"));
    assert_eq!(impostor.subject_dn, parse(&pki.root_der).subject_dn);

    let err = build_chain(&leaf, &pool, &impostor, DEFAULT_MAX_CHAIN_DEPTH).unwrap_err();
    assert_eq!(err, ChainError::UntrustedRoot);
}

#[test]
fn signing_certificate_may_be_the_pinned_root() {
    let pki = TestPki::self_signed();
    let leaf = parse(&pki.leaf_der);
    let anchor = parse(&pki.root_der);

    let path = build_chain(&leaf, &[], &anchor, DEFAULT_MAX_CHAIN_DEPTH).unwrap();
    assert_eq!(path.len(), 1);
}

#[test]
fn depth_limit_is_enforced() {
    let pki = TestPki::new();
    let leaf = parse(&pki.leaf_der);
    let pool = vec![parse(&pki.intermediates[0])];
    let anchor = parse(&pki.root_der);

    let err = build_chain(&leaf, &pool, &anchor, 1).unwrap_err();
    assert_eq!(err, ChainError::TooDeep(1));
    assert_eq!(err.error_code(), "CERT_CHAIN_BUILD_ERROR");
}

#[test]
fn signature_relationships_follow_the_hierarchy() {
    let pki = TestPki::new();
    let root = parse(&pki.root_der);
    let intermediate = parse(&pki.intermediates[0]);
    let leaf = parse(&pki.leaf_der);

    assert!(root.is_self_issued());
    assert!(root.is_signed_by(&root));
    assert!(intermediate.is_signed_by(&root));
    assert!(leaf.is_signed_by(&intermediate));
    assert!(!leaf.is_signed_by(&root));
}

#[test]
fn garbage_is_not_a_certificate() {
    let err = ParsedCertificate::from_der(&[0x30, 0x03, 0x02, 0x01, 0x01]).unwrap_err();
    assert!(matches!(err, ChainError::InvalidCertificate(_)));
}

#[test]
fn end_entity_issuer_is_rejected() {
    let pki = TestPki::with_end_entity_issuer();
    let leaf = parse(&pki.leaf_der);
    let end_entity = parse(&pki.intermediates[0]);
    let anchor = parse(&pki.root_der);

    assert!(!end_entity.is_ca);
    assert!(leaf.is_signed_by(&end_entity));
    assert!(end_entity.is_signed_by(&anchor));

    let err = build_chain(&leaf, &[end_entity], &anchor, DEFAULT_MAX_CHAIN_DEPTH).unwrap_err();
    assert!(matches!(&err, ChainError::IssuerNotCa(subject) if subject.contains("Test Receipt End Entity")));
    assert_eq!(err.error_code(), "CERT_CHAIN_ISSUER_NOT_CA");
}

#[test]
fn ca_without_cert_sign_usage_is_rejected() {
    let pki = TestPki::with_issuer_lacking_cert_sign();
    let leaf = parse(&pki.leaf_der);
    let restricted = parse(&pki.intermediates[0]);
    let anchor = parse(&pki.root_der);

    assert!(restricted.is_ca);
    assert!(!restricted.can_sign_certificates);

    let err = build_chain(&leaf, &[restricted], &anchor, DEFAULT_MAX_CHAIN_DEPTH).unwrap_err();
    assert!(matches!(err, ChainError::IssuerNotCa(_)));
}

#[test]
fn generated_intermediate_is_an_issuing_ca() {
    let pki = TestPki::new();
    assert!(parse(&pki.intermediates[0]).is_issuing_ca());
    assert!(parse(&pki.root_der).is_issuing_ca());
    assert!(!parse(&pki.leaf_der).is_ca);
}
