use std::fs;
use std::path::{Component, Path, PathBuf};

use super::{ClientError, DocumentStore};
use crate::tenancy::StorageKey;

/// Local filesystem backend: the storage key becomes a path relative to `root`.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a file path, rejecting anything that leaves `root`.
    fn resolve(&self, key: &StorageKey) -> Result<PathBuf, ClientError> {
        let relative = Path::new(key.as_str());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || key.as_str().is_empty() {
            return Err(ClientError::InvalidKey(key.as_str().to_string()));
        }
        Ok(self.root.join(relative).with_extension("pdf"))
    }
}

impl DocumentStore for FsDocumentStore {
    fn put(&self, key: &StorageKey, bytes: &[u8]) -> Result<(), ClientError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write to a sibling temp file first so readers never see a partial PDF.
        let tmp = path.with_extension("pdf.part");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(key = %key, bytes = bytes.len(), "Stored SDS document");
        Ok(())
    }
}
