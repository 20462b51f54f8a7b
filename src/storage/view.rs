use std::sync::Arc;

use super::{Storage, StorageEntry};
use crate::errors::RvError;

/// A view of the storage backend scoped under a key prefix. Every
/// component gets its own view, so no component can step outside its
/// slice of the keyspace.
pub struct StorageView {
    storage: Arc<dyn Storage>,
    prefix: String,
}

impl Storage for StorageView {
    fn list(&self, prefix: &str) -> Result<Vec<String>, RvError> {
        self.sanity_check(prefix)?;
        self.storage.list(self.expand_key(prefix).as_str())
    }

    fn get(&self, key: &str) -> Result<Option<StorageEntry>, RvError> {
        self.sanity_check(key)?;
        let storage_entry = self.storage.get(self.expand_key(key).as_str())?;
        if let Some(entry) = storage_entry {
            Ok(Some(StorageEntry { key: self.truncate_key(entry.key.as_str()), value: entry.value }))
        } else {
            Ok(None)
        }
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), RvError> {
        self.sanity_check(entry.key.as_str())?;
        let nested = StorageEntry { key: self.expand_key(entry.key.as_str()), value: entry.value.clone() };
        self.storage.put(&nested)
    }

    fn delete(&self, key: &str) -> Result<(), RvError> {
        self.sanity_check(key)?;
        self.storage.delete(self.expand_key(key).as_str())
    }
}

impl StorageView {
    pub fn new(storage: Arc<dyn Storage>, prefix: &str) -> Self {
        StorageView { storage, prefix: prefix.to_string() }
    }

    pub fn new_sub_view(&self, prefix: &str) -> StorageView {
        StorageView { storage: Arc::clone(&self.storage), prefix: self.expand_key(prefix) }
    }

    /// Collects every key under the view, recursing through
    /// sub-directories.
    pub fn get_keys(&self) -> Result<Vec<String>, RvError> {
        let mut keys: Vec<String> = Vec::new();
        let mut stack: Vec<String> = vec![String::new()];

        while let Some(dir) = stack.pop() {
            for item in self.list(&dir)? {
                let full = format!("{}{}", dir, item);
                if item.ends_with('/') {
                    stack.push(full);
                } else {
                    keys.push(full);
                }
            }
        }

        Ok(keys)
    }

    pub fn clear(&self) -> Result<(), RvError> {
        for key in self.get_keys()? {
            self.delete(&key)?;
        }

        Ok(())
    }

    fn sanity_check(&self, key: &str) -> Result<(), RvError> {
        if key.contains("..") || key.starts_with('/') {
            Err(RvError::ErrStorageKeySanityCheckFailed)
        } else {
            Ok(())
        }
    }

    fn expand_key(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    fn truncate_key(&self, full: &str) -> String {
        if let Some(result) = full.strip_prefix(self.prefix.as_str()) {
            result.to_string()
        } else {
            full.to_string()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::new_test_mem_backend;

    #[test]
    fn test_storage_view_scoping() {
        let backend = new_test_mem_backend();

        let view = StorageView::new(Arc::clone(&backend), "sub/");
        assert!(view.sanity_check("foo").is_ok());
        assert!(view.sanity_check("../foo").is_err());
        assert!(view.sanity_check("/foo").is_err());

        view.put(&StorageEntry { key: "foo".into(), value: b"v".to_vec() }).unwrap();

        // the underlying key carries the prefix, the view key does not
        assert!(backend.get("sub/foo").unwrap().is_some());
        let entry = view.get("foo").unwrap().unwrap();
        assert_eq!(entry.key, "foo");

        let sub = view.new_sub_view("deeper/");
        sub.put(&StorageEntry { key: "bar".into(), value: b"v".to_vec() }).unwrap();
        assert!(backend.get("sub/deeper/bar").unwrap().is_some());
    }

    #[test]
    fn test_storage_view_get_keys_and_clear() {
        let backend = new_test_mem_backend();
        let view = StorageView::new(backend, "scope/");

        for key in ["a", "b/c", "b/d/e"] {
            view.put(&StorageEntry { key: key.to_string(), value: b"v".to_vec() }).unwrap();
        }

        let mut keys = view.get_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b/c".to_string(), "b/d/e".to_string()]);

        view.clear().unwrap();
        assert_eq!(view.get_keys().unwrap().len(), 0);
    }
}
