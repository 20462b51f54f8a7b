//! The router maps mount paths to backends. Entries live in a trie
//! keyed by mount prefix, so resolving a request path to its backend
//! is a longest-prefix lookup. The expiration manager leans on this to
//! reach the backend that issued a lease when it needs to revoke or
//! renew the underlying grant.

use std::sync::{Arc, RwLock};

use radix_trie::{Trie, TrieCommon};

use crate::{
    errors::RvError,
    logical::{Backend, Request, Response},
    storage::StorageView,
};

struct RouterEntry {
    backend: Arc<dyn Backend>,
    view: Arc<StorageView>,
}

#[derive(Default)]
pub struct Router {
    root: Arc<RwLock<Trie<String, RouterEntry>>>,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    pub fn mount(&self, backend: Arc<dyn Backend>, prefix: &str, view: StorageView) -> Result<(), RvError> {
        log::debug!("mount, prefix: {prefix}");
        let mut root = self.root.write()?;

        // Check if this is a nested mount
        if root.get_ancestor(prefix).is_some() {
            return Err(RvError::ErrRouterMountConflict);
        }

        let router_entry = RouterEntry { backend, view: Arc::new(view) };

        root.insert(prefix.to_string(), router_entry);
        Ok(())
    }

    pub fn unmount(&self, prefix: &str) -> Result<(), RvError> {
        log::debug!("unmount, prefix: {prefix}");
        let mut root = self.root.write()?;
        root.remove(prefix);
        Ok(())
    }

    pub fn matching_mount(&self, path: &str) -> Result<String, RvError> {
        let root = self.root.read()?;
        if let Some(entry) = root.get_ancestor(path) {
            Ok(entry.key().unwrap().clone())
        } else {
            Ok("".to_string())
        }
    }

    pub fn matching_view(&self, path: &str) -> Result<Option<Arc<StorageView>>, RvError> {
        let root = self.root.read()?;
        if let Some(entry) = root.get_ancestor(path) {
            let router_entry = entry.value().unwrap();
            Ok(Some(router_entry.view.clone()))
        } else {
            Ok(None)
        }
    }

    pub fn handle_request(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        if !req.path.contains('/') {
            req.path.push('/');
        }

        let original = req.path.clone();

        let backend = {
            let root = self.root.read()?;
            let Some(entry) = root.get_ancestor(req.path.as_str()) else {
                return Err(RvError::ErrRouterMountNotFound);
            };

            let mount = entry.key().unwrap().as_str();
            let me = entry.value().unwrap();

            req.path = req.path.replacen(mount, "", 1);
            if req.path == "/" {
                req.path = String::new();
            }

            req.storage = Some(me.view.clone());

            me.backend.clone()
        };

        let response = backend.handle_request(req);

        req.path = original;
        req.storage = None;

        response
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, sync::Arc};

    use super::*;
    use crate::{
        errors::RvError,
        logical::{Backend, Field, FieldType, LogicalBackend, Operation, Path, PathOperation},
        new_fields, new_fields_internal, new_logical_backend, new_logical_backend_internal, new_path,
        new_path_internal,
        storage::StorageEntry,
        test_utils::new_test_mem_backend,
    };

    fn new_mock_backend() -> LogicalBackend {
        let mut backend = new_logical_backend!({
            paths: [
                {
                    pattern: "kv/(?P<name>.+)",
                    fields: {
                        "name": {
                            field_type: FieldType::Str,
                            description: "entry name"
                        },
                        "value": {
                            field_type: FieldType::Str,
                            description: "entry value"
                        }
                    },
                    operations: [
                        {op: Operation::Write, raw_handler: |_backend: &dyn Backend, req: &mut Request| -> Result<Option<Response>, RvError> {
                                let name = req.get_data("name")?;
                                let value = req.get_data("value")?;
                                let entry = StorageEntry {
                                    key: name.as_str().unwrap().to_string(),
                                    value: value.as_str().unwrap().as_bytes().to_vec(),
                                };
                                req.storage_put(&entry)?;
                                Ok(None)
                            }
                        },
                        {op: Operation::Read, raw_handler: |_backend: &dyn Backend, req: &mut Request| -> Result<Option<Response>, RvError> {
                                let name = req.get_data("name")?;
                                let raw = req.storage_get(name.as_str().unwrap())?;
                                let data = raw.map(|entry| {
                                    serde_json::json!({
                                        "value": String::from_utf8_lossy(&entry.value),
                                    })
                                    .as_object()
                                    .unwrap()
                                    .clone()
                                });
                                Ok(Some(Response::data_response(data)))
                            }
                        },
                        {op: Operation::Delete, raw_handler: |_backend: &dyn Backend, req: &mut Request| -> Result<Option<Response>, RvError> {
                                let name = req.get_data("name")?;
                                req.storage_delete(name.as_str().unwrap())?;
                                Ok(None)
                            }
                        },
                        {op: Operation::List, raw_handler: |_backend: &dyn Backend, req: &mut Request| -> Result<Option<Response>, RvError> {
                                let keys = req.storage_list("")?;
                                Ok(Some(Response::list_response(&keys)))
                            }
                        }
                    ]
                }
            ],
            help: "mock kv backend",
        });
        backend.init().unwrap();
        backend
    }

    #[test]
    fn test_router_mount_and_route() {
        let storage = new_test_mem_backend();
        let router = Router::new();

        let view = StorageView::new(Arc::clone(&storage), "mock/");
        router.mount(Arc::new(new_mock_backend()), "mock/", view).unwrap();

        assert_eq!(router.matching_mount("mock/kv/foo").unwrap(), "mock/");
        assert_eq!(router.matching_mount("other/kv").unwrap(), "");
        assert!(router.matching_view("mock/kv/foo").unwrap().is_some());

        // write through the router, backed by the mount's view
        let body = serde_json::json!({"value": "bar"}).as_object().cloned();
        let mut req = Request::new_write_request("mock/kv/foo", body);
        assert!(router.handle_request(&mut req).unwrap().is_none());

        // the write landed under the mount's storage prefix
        assert!(storage.get("mock/foo").unwrap().is_some());

        let mut req = Request::new_read_request("mock/kv/foo");
        let resp = router.handle_request(&mut req).unwrap().unwrap();
        assert_eq!(resp.data.unwrap()["value"], serde_json::json!("bar"));

        // the request path and storage are restored after routing
        assert_eq!(req.path, "mock/kv/foo");
        assert!(req.storage.is_none());

        let mut req = Request::new_list_request("mock/kv/foo");
        let resp = router.handle_request(&mut req).unwrap().unwrap();
        assert_eq!(resp.data.unwrap()["keys"], serde_json::json!(["foo"]));

        let mut req = Request::new_delete_request("mock/kv/foo", None);
        assert!(router.handle_request(&mut req).unwrap().is_none());
        assert!(storage.get("mock/foo").unwrap().is_none());

        let mut req = Request::new_read_request("unmounted/kv/foo");
        assert_eq!(router.handle_request(&mut req).unwrap_err(), RvError::ErrRouterMountNotFound);
    }

    #[test]
    fn test_router_nested_mount_conflict() {
        let storage = new_test_mem_backend();
        let router = Router::new();

        let view = StorageView::new(Arc::clone(&storage), "mock/");
        router.mount(Arc::new(new_mock_backend()), "mock/", view).unwrap();

        let nested = StorageView::new(Arc::clone(&storage), "mock2/");
        let err = router.mount(Arc::new(new_mock_backend()), "mock/nested/", nested).unwrap_err();
        assert_eq!(err, RvError::ErrRouterMountConflict);

        router.unmount("mock/").unwrap();
        let again = StorageView::new(storage, "mock2/");
        assert!(router.mount(Arc::new(new_mock_backend()), "mock/nested/", again).is_ok());
    }
}
