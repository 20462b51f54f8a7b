use std::{
    collections::BTreeMap,
    sync::RwLock,
};

use crate::{
    errors::RvError,
    storage::{Storage, StorageEntry},
};

/// In-memory storage backend over an ordered map. Mirrors the file
/// backend's hierarchical list semantics, which makes it a drop-in
/// stand-in for tests and for embedding without a data directory.
#[derive(Default)]
pub struct MemBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl Storage for MemBackend {
    fn list(&self, prefix: &str) -> Result<Vec<String>, RvError> {
        if prefix.starts_with('/') {
            return Err(RvError::ErrPhysicalBackendPrefixInvalid);
        }

        let entries = self.entries.read()?;

        let mut names: Vec<String> = Vec::new();
        for key in entries.range(prefix.to_string()..) {
            let key = key.0;
            if !key.starts_with(prefix) {
                break;
            }

            let remain = &key[prefix.len()..];
            let name = match remain.find('/') {
                Some(pos) => remain[..pos + 1].to_string(),
                None => remain.to_string(),
            };

            if names.last() != Some(&name) {
                names.push(name);
            }
        }

        Ok(names)
    }

    fn get(&self, k: &str) -> Result<Option<StorageEntry>, RvError> {
        if k.starts_with('/') {
            return Err(RvError::ErrPhysicalBackendKeyInvalid);
        }

        let entries = self.entries.read()?;

        Ok(entries.get(k).map(|value| StorageEntry { key: k.to_string(), value: value.clone() }))
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), RvError> {
        if entry.key.starts_with('/') {
            return Err(RvError::ErrPhysicalBackendKeyInvalid);
        }

        let mut entries = self.entries.write()?;

        entries.insert(entry.key.clone(), entry.value.clone());
        Ok(())
    }

    fn delete(&self, k: &str) -> Result<(), RvError> {
        if k.starts_with('/') {
            return Err(RvError::ErrPhysicalBackendKeyInvalid);
        }

        let mut entries = self.entries.write()?;

        entries.remove(k);
        Ok(())
    }
}

impl MemBackend {
    pub fn new() -> Self {
        MemBackend::default()
    }
}
