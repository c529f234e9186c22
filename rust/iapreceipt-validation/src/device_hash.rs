// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Device-binding digest.

use sha1::{Digest as _, Sha1};

pub const RECEIPT_HASH_LEN: usize = 20;

/// SHA-1 over `device_id ‖ opaque ‖ bundle_identifier_raw`.
///
/// `bundle_identifier_raw` is the bundle identifier attribute's OCTET STRING
/// content as stored in the receipt, not the decoded text.
pub fn compute_receipt_hash(
    device_id: &[u8],
    opaque: &[u8],
    bundle_identifier_raw: &[u8],
) -> [u8; RECEIPT_HASH_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(device_id);
    hasher.update(opaque);
    hasher.update(bundle_identifier_raw);
    hasher.finalize().into()
}
