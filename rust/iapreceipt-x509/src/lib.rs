// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod algorithms;
pub mod chain;
pub mod signature_verifier;

pub use algorithms::{DigestAlgorithm, SignatureAlgorithm};
pub use chain::{build_chain, ChainError, ParsedCertificate, DEFAULT_MAX_CHAIN_DEPTH};
pub use signature_verifier::{verify_signed_container, SignatureError, SignatureVerifyOptions};
