//! Byte-level key/value persistence for the crate. Keys are
//! slash-delimited strings and values are opaque bytes; `list` on a
//! prefix returns the immediate children, directories carrying a
//! trailing `/`.
//!
//! Two physical backends are provided: `file` for on-disk state and
//! `mem` for tests and embedding. Components never touch a backend
//! directly; they work through a [`view::StorageView`] scoped to
//! their own key prefix.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RvError;

pub mod file;
pub mod mem;
pub mod view;

pub use view::StorageView;

/// General methods every storage backend needs to implement.
pub trait Storage: Send + Sync {
    fn list(&self, prefix: &str) -> Result<Vec<String>, RvError>;
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, RvError>;
    fn put(&self, entry: &StorageEntry) -> Result<(), RvError>;
    fn delete(&self, key: &str) -> Result<(), RvError>;
}

/// This struct is used to describe a specific storage entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl Default for StorageEntry {
    fn default() -> Self {
        Self { key: String::new(), value: Vec::new() }
    }
}

impl StorageEntry {
    pub fn new(k: &str, v: &impl Serialize) -> Result<StorageEntry, RvError> {
        let data = serde_json::to_string(v)?;

        Ok(StorageEntry { key: k.to_string(), value: data.into_bytes() })
    }
}

pub fn new_backend(t: &str, conf: &HashMap<String, Value>) -> Result<Arc<dyn Storage>, RvError> {
    match t {
        "file" => {
            let backend = file::FileBackend::new(conf)?;
            Ok(Arc::new(backend))
        }
        "mem" => Ok(Arc::new(mem::MemBackend::new())),
        _ => Err(RvError::ErrPhysicalTypeInvalid),
    }
}
