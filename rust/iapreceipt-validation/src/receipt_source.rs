// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Where receipt bytes come from.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ReceiptSourceError {
    #[error("failed to read receipt from {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Supplies the raw receipt once per validation run.
///
/// `Ok(None)` means there is no receipt at all, which is reported distinctly
/// from a receipt that fails to load.
pub trait ReceiptSource {
    fn load_receipt(&self) -> Result<Option<Vec<u8>>, ReceiptSourceError>;
}

impl ReceiptSource for [u8] {
    fn load_receipt(&self) -> Result<Option<Vec<u8>>, ReceiptSourceError> {
        Ok(Some(self.to_vec()))
    }
}

impl ReceiptSource for Vec<u8> {
    fn load_receipt(&self) -> Result<Option<Vec<u8>>, ReceiptSourceError> {
        Ok(Some(self.clone()))
    }
}

impl ReceiptSource for Option<Vec<u8>> {
    fn load_receipt(&self) -> Result<Option<Vec<u8>>, ReceiptSourceError> {
        Ok(self.clone())
    }
}

/// Reads the receipt from a file. A missing file means no receipt.
#[derive(Debug, Clone)]
pub struct FileReceiptSource {
    path: PathBuf,
}

impl FileReceiptSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReceiptSource for FileReceiptSource {
    fn load_receipt(&self) -> Result<Option<Vec<u8>>, ReceiptSourceError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ReceiptSourceError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
