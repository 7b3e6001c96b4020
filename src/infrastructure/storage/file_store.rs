//! File-backed key-value store: one file per key under a data directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::KeyValueStore;
use crate::shared::error::SyncError;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the data directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            SyncError::Storage(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SyncError> {
        if key.is_empty() {
            return Err(SyncError::Storage("empty storage key".into()));
        }
        Ok(self.root.join(format!("{}.json", encode_key(key))))
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9_-]`, so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, SyncError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), SyncError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        // Rename is atomic on the same filesystem; readers never see a partial file
        fs::rename(&tmp, &path)?;
        tracing::trace!(key, path = %path.display(), "Stored value");
        Ok(())
    }
}
