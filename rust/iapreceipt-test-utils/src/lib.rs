// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test-only utilities for building receipt validation scenarios.
//!
//! This crate keeps fixture generation out of the production crates: DER
//! encoding helpers, receipt payload builders, a throwaway certificate
//! hierarchy and a PKCS#7 signer that can be told to produce the malformed
//! variants the validators must reject.

use std::ops::Range;

use p256::pkcs8::DecodePrivateKey as _;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose,
    PKCS_ECDSA_P256_SHA256,
};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use signature::Signer as _;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Minimal DER encoders. Inputs are trusted; nothing here validates.
pub mod der {
    pub fn length(len: usize) -> Vec<u8> {
        if len < 0x80 {
            return vec![len as u8];
        }
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        let mut out = vec![0x80 | (bytes.len() - skip) as u8];
        out.extend_from_slice(&bytes[skip..]);
        out
    }

    pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend(length(content.len()));
        out.extend_from_slice(content);
        out
    }

    /// Constructed element, optionally in BER indefinite-length form.
    pub fn constructed(tag: u8, content: &[u8], indefinite: bool) -> Vec<u8> {
        if !indefinite {
            return tlv(tag, content);
        }
        let mut out = vec![tag, 0x80];
        out.extend_from_slice(content);
        out.extend_from_slice(&[0x00, 0x00]);
        out
    }

    pub fn integer(value: i64) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < bytes.len() - 1 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        tlv(0x02, &bytes[start..])
    }

    pub fn octet_string(content: &[u8]) -> Vec<u8> {
        tlv(0x04, content)
    }

    pub fn null() -> Vec<u8> {
        vec![0x05, 0x00]
    }

    pub fn oid(content: &[u8]) -> Vec<u8> {
        tlv(0x06, content)
    }

    pub fn utf8_string(text: &str) -> Vec<u8> {
        tlv(0x0C, text.as_bytes())
    }

    pub fn ia5_string(text: &str) -> Vec<u8> {
        tlv(0x16, text.as_bytes())
    }

    pub fn sequence(content: &[u8]) -> Vec<u8> {
        tlv(0x30, content)
    }

    pub fn set(content: &[u8]) -> Vec<u8> {
        tlv(0x31, content)
    }

    pub fn context(number: u8, content: &[u8]) -> Vec<u8> {
        tlv(0xA0 | number, content)
    }
}

/// Object identifier content octets used by the fixtures.
pub mod oids {
    pub const PKCS7_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
    pub const PKCS7_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
    pub const PKCS7_ENVELOPED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x03];
    pub const CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];
    pub const MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];
    pub const SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
    pub const ECDSA_WITH_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02];
}

/// `YYYY-MM-DDTHH:MM:SSZ`, the receipt timestamp form.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.to_offset(UtcOffset::UTC)
        .format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"))
        .expect("timestamp formats")
}

/// SHA-1 over device identifier, opaque value and encoded bundle identifier.
pub fn device_binding_hash(
    device_id: &[u8],
    opaque: &[u8],
    bundle_identifier_raw: &[u8],
) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(device_id);
    hasher.update(opaque);
    hasher.update(bundle_identifier_raw);
    hasher.finalize().into()
}

fn attribute_set(attributes: &[(i64, i64, Vec<u8>)]) -> Vec<u8> {
    let mut content = Vec::new();
    for (attribute_type, version, value) in attributes {
        let mut seq = der::integer(*attribute_type);
        seq.extend(der::integer(*version));
        seq.extend(der::octet_string(value));
        content.extend(der::sequence(&seq));
    }
    der::set(&content)
}

/// Builds an in-app purchase attribute set.
#[derive(Debug, Clone, Default)]
pub struct PurchaseBuilder {
    attributes: Vec<(i64, i64, Vec<u8>)>,
}

impl PurchaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute whose OCTET STRING holds `value` verbatim.
    pub fn attribute(mut self, attribute_type: i64, value: Vec<u8>) -> Self {
        self.attributes.push((attribute_type, 1, value));
        self
    }

    pub fn quantity(self, quantity: i64) -> Self {
        self.attribute(1701, der::integer(quantity))
    }

    pub fn product_identifier(self, id: &str) -> Self {
        self.attribute(1702, der::utf8_string(id))
    }

    pub fn transaction_identifier(self, id: &str) -> Self {
        self.attribute(1703, der::utf8_string(id))
    }

    pub fn purchase_date(self, at: OffsetDateTime) -> Self {
        self.attribute(1704, der::ia5_string(&format_timestamp(at)))
    }

    pub fn original_transaction_identifier(self, id: &str) -> Self {
        self.attribute(1705, der::utf8_string(id))
    }

    pub fn original_purchase_date(self, at: OffsetDateTime) -> Self {
        self.attribute(1706, der::ia5_string(&format_timestamp(at)))
    }

    pub fn subscription_expiration_date(self, at: OffsetDateTime) -> Self {
        self.attribute(1708, der::ia5_string(&format_timestamp(at)))
    }

    pub fn web_order_line_item_id(self, id: i64) -> Self {
        self.attribute(1711, der::integer(id))
    }

    pub fn cancellation_date(self, at: OffsetDateTime) -> Self {
        self.attribute(1712, der::ia5_string(&format_timestamp(at)))
    }

    pub fn build(&self) -> Vec<u8> {
        attribute_set(&self.attributes)
    }
}

/// Builds a receipt payload attribute set.
#[derive(Debug, Clone, Default)]
pub struct ReceiptPayloadBuilder {
    attributes: Vec<(i64, i64, Vec<u8>)>,
}

impl ReceiptPayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A complete payload bound to `device_id`, with a correct hash.
    pub fn bound_to_device(
        bundle_identifier: &str,
        bundle_version: &str,
        device_id: &[u8],
        opaque: &[u8],
    ) -> Self {
        let hash = device_binding_hash(device_id, opaque, &der::utf8_string(bundle_identifier));
        Self::new()
            .bundle_identifier(bundle_identifier)
            .bundle_version(bundle_version)
            .opaque_value(opaque)
            .hash(&hash)
    }

    pub fn attribute(mut self, attribute_type: i64, value: Vec<u8>) -> Self {
        self.attributes.push((attribute_type, 1, value));
        self
    }

    pub fn attribute_with_version(
        mut self,
        attribute_type: i64,
        version: i64,
        value: Vec<u8>,
    ) -> Self {
        self.attributes.push((attribute_type, version, value));
        self
    }

    pub fn bundle_identifier(self, id: &str) -> Self {
        self.attribute(2, der::utf8_string(id))
    }

    pub fn bundle_version(self, version: &str) -> Self {
        self.attribute(3, der::utf8_string(version))
    }

    pub fn opaque_value(self, opaque: &[u8]) -> Self {
        self.attribute(4, opaque.to_vec())
    }

    pub fn hash(self, hash: &[u8]) -> Self {
        self.attribute(5, hash.to_vec())
    }

    pub fn creation_date(self, at: OffsetDateTime) -> Self {
        self.attribute(12, der::ia5_string(&format_timestamp(at)))
    }

    pub fn purchase(self, purchase: &PurchaseBuilder) -> Self {
        self.attribute(17, purchase.build())
    }

    pub fn original_application_version(self, version: &str) -> Self {
        self.attribute(19, der::utf8_string(version))
    }

    pub fn expiration_date(self, at: OffsetDateTime) -> Self {
        self.attribute(21, der::ia5_string(&format_timestamp(at)))
    }

    pub fn build(&self) -> Vec<u8> {
        attribute_set(&self.attributes)
    }
}

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("certificate params");
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

fn leaf_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("certificate params");
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params
}

fn signing_key(key_pair: &KeyPair) -> p256::ecdsa::SigningKey {
    p256::ecdsa::SigningKey::from_pkcs8_der(&key_pair.serialize_der()).expect("P-256 PKCS#8 key")
}

/// A self-signed P-256 CA certificate, unrelated to any [`TestPki`].
pub fn make_self_signed_ca(common_name: &str) -> Vec<u8> {
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).expect("key generation");
    ca_params(common_name)
        .self_signed(&key_pair)
        .expect("self-signed CA")
        .der()
        .to_vec()
}

/// A throwaway certificate hierarchy with a P-256 receipt signing key.
pub struct TestPki {
    pub root_der: Vec<u8>,
    /// Certificates between the leaf and the root, leaf side first.
    pub intermediates: Vec<Vec<u8>>,
    pub leaf_der: Vec<u8>,
    pub leaf_key: p256::ecdsa::SigningKey,
}

impl TestPki {
    /// Root CA -> intermediate CA -> signing leaf.
    pub fn new() -> Self {
        Self::through_issuer(ca_params("Test Receipt Intermediate CA"))
    }

    /// Root CA -> end-entity certificate -> signing leaf issued by the end-entity key.
    pub fn with_end_entity_issuer() -> Self {
        Self::through_issuer(leaf_params("Test Receipt End Entity"))
    }

    /// Root CA -> CA whose keyUsage omits keyCertSign -> signing leaf.
    pub fn with_issuer_lacking_cert_sign() -> Self {
        let mut params = ca_params("Test Receipt Restricted CA");
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        Self::through_issuer(params)
    }

    fn through_issuer(issuer_params: CertificateParams) -> Self {
        let root_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).expect("key generation");
        let root = ca_params("Test Receipt Root CA").self_signed(&root_key).expect("root");

        let issuer_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).expect("key generation");
        let issuer = issuer_params.signed_by(&issuer_key, &root, &root_key).expect("issuer");

        let leaf_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).expect("key generation");
        let leaf = leaf_params("Test Receipt Signer")
            .signed_by(&leaf_key, &issuer, &issuer_key)
            .expect("leaf");

        Self {
            root_der: root.der().to_vec(),
            intermediates: vec![issuer.der().to_vec()],
            leaf_der: leaf.der().to_vec(),
            leaf_key: signing_key(&leaf_key),
        }
    }

    /// The signing certificate is itself the trusted root.
    pub fn self_signed() -> Self {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).expect("key generation");
        let cert = ca_params("Test Receipt Self-Signed Signer")
            .self_signed(&key_pair)
            .expect("self-signed signer");
        let der = cert.der().to_vec();
        Self {
            root_der: der.clone(),
            intermediates: Vec::new(),
            leaf_der: der,
            leaf_key: signing_key(&key_pair),
        }
    }
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}

/// Knobs for [`sign_receipt_with`]. The default produces a well-formed receipt.
#[derive(Debug, Clone)]
pub struct Pkcs7Options {
    pub signed_attributes: bool,
    pub content_type: Vec<u8>,
    pub encapsulated_content_type: Vec<u8>,
    pub include_intermediates: bool,
    pub include_leaf: bool,
    pub include_root: bool,
    /// Indefinite lengths throughout and a chunked payload OCTET STRING.
    pub ber_indefinite: bool,
    pub detached: bool,
    pub message_digest_override: Option<Vec<u8>>,
    pub corrupt_signature: bool,
}

impl Default for Pkcs7Options {
    fn default() -> Self {
        Self {
            signed_attributes: true,
            content_type: oids::PKCS7_SIGNED_DATA.to_vec(),
            encapsulated_content_type: oids::PKCS7_DATA.to_vec(),
            include_intermediates: true,
            include_leaf: true,
            include_root: false,
            ber_indefinite: false,
            detached: false,
            message_digest_override: None,
            corrupt_signature: false,
        }
    }
}

pub struct SignedReceipt {
    pub bytes: Vec<u8>,
    /// Where the payload sits in `bytes`, when it is stored contiguously.
    pub payload_range: Option<Range<usize>>,
}

impl SignedReceipt {
    /// A copy with one payload byte flipped.
    pub fn with_tampered_payload(&self) -> Vec<u8> {
        let range = self.payload_range.clone().expect("payload stored contiguously");
        let mut bytes = self.bytes.clone();
        bytes[range.end - 1] ^= 0x01;
        bytes
    }
}

pub fn sign_receipt(payload: &[u8], pki: &TestPki) -> SignedReceipt {
    sign_receipt_with(payload, pki, &Pkcs7Options::default())
}

pub fn sign_receipt_with(payload: &[u8], pki: &TestPki, options: &Pkcs7Options) -> SignedReceipt {
    let ber = options.ber_indefinite;
    let (_, leaf) = x509_parser::parse_x509_certificate(&pki.leaf_der).expect("leaf certificate");

    let sha256_alg = der::sequence(&der::oid(oids::SHA256));
    let ecdsa_alg = der::sequence(&der::oid(oids::ECDSA_WITH_SHA256));

    let digest = options
        .message_digest_override
        .clone()
        .unwrap_or_else(|| Sha256::digest(payload).to_vec());

    let content_type = [der::oid(oids::CONTENT_TYPE), der::set(&der::oid(oids::PKCS7_DATA))];
    let mut attributes = der::sequence(&content_type.concat());
    attributes.extend(der::sequence(
        &[der::oid(oids::MESSAGE_DIGEST), der::set(&der::octet_string(&digest))].concat(),
    ));

    let signed_bytes = if options.signed_attributes {
        der::set(&attributes)
    } else {
        payload.to_vec()
    };
    let signature: p256::ecdsa::Signature = pki.leaf_key.sign(&signed_bytes);
    let mut signature = signature.to_der().as_bytes().to_vec();
    if options.corrupt_signature {
        if let Some(last) = signature.last_mut() {
            *last ^= 0x01;
        }
    }

    let mut signer_info = der::integer(1);
    let mut issuer_and_serial = leaf.tbs_certificate.issuer.as_raw().to_vec();
    issuer_and_serial.extend(der::tlv(0x02, leaf.tbs_certificate.raw_serial()));
    signer_info.extend(der::sequence(&issuer_and_serial));
    signer_info.extend(&sha256_alg);
    if options.signed_attributes {
        signer_info.extend(der::context(0, &attributes));
    }
    signer_info.extend(&ecdsa_alg);
    signer_info.extend(der::octet_string(&signature));

    let mut certificates = Vec::new();
    if options.include_leaf {
        certificates.extend_from_slice(&pki.leaf_der);
    }
    if options.include_intermediates {
        for cert in &pki.intermediates {
            certificates.extend_from_slice(cert);
        }
    }
    if options.include_root {
        certificates.extend_from_slice(&pki.root_der);
    }

    let mut encapsulated = der::oid(&options.encapsulated_content_type);
    if !options.detached {
        let econtent = if ber {
            let split = payload.len() / 2;
            let (head, tail) = payload.split_at(split);
            let chunks = [der::octet_string(head), der::octet_string(tail)].concat();
            der::constructed(0x24, &chunks, true)
        } else {
            der::octet_string(payload)
        };
        encapsulated.extend(der::constructed(0xA0, &econtent, ber));
    }

    let mut signed_data = der::integer(1);
    signed_data.extend(der::set(&sha256_alg));
    signed_data.extend(der::constructed(0x30, &encapsulated, ber));
    if !certificates.is_empty() {
        signed_data.extend(der::constructed(0xA0, &certificates, ber));
    }
    signed_data.extend(der::set(&der::sequence(&signer_info)));

    let mut content_info = der::oid(&options.content_type);
    content_info.extend(der::constructed(0xA0, &der::constructed(0x30, &signed_data, ber), ber));
    let bytes = der::constructed(0x30, &content_info, ber);

    let payload_range = if ber || options.detached || payload.is_empty() {
        None
    } else {
        bytes
            .windows(payload.len())
            .position(|w| w == payload)
            .map(|start| start..start + payload.len())
    };

    SignedReceipt { bytes, payload_range }
}

/// Sign `payload` with the default options and a freshly generated hierarchy.
pub fn signed_receipt_fixture(payload: &[u8]) -> (TestPki, SignedReceipt) {
    let pki = TestPki::new();
    let signed = sign_receipt(payload, &pki);
    (pki, signed)
}
