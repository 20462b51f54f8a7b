use std::{collections::HashMap, env, fs, path::PathBuf, sync::Arc};

use serde_json::Value;

use crate::{
    errors::RvError,
    logical::{Backend, LogicalBackend, Request, Response},
    modules::auth::{ExpirationManager, TokenStore},
    router::Router,
    storage::{self, Storage},
    utils::generate_uuid,
};

pub const TEST_DIR: &str = "tokenvault_test";

/// Temp directory that cleans itself up when the test drops it.
pub struct TestTempDir {
    pub path: PathBuf,
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

pub fn new_test_temp_dir(name: &str) -> TestTempDir {
    let path = env::temp_dir().join(format!("{}_{}_{}", TEST_DIR, name, generate_uuid()));
    fs::create_dir_all(&path).unwrap();
    TestTempDir { path }
}

pub fn new_test_mem_backend() -> Arc<dyn Storage> {
    let conf: HashMap<String, Value> = HashMap::new();
    storage::new_backend("mem", &conf).unwrap()
}

pub fn new_test_file_backend(name: &str) -> (Arc<dyn Storage>, TestTempDir) {
    let dir = new_test_temp_dir(name);
    let mut conf: HashMap<String, Value> = HashMap::new();
    conf.insert("path".to_string(), Value::String(dir.path.to_string_lossy().into_owned()));
    (storage::new_backend("file", &conf).unwrap(), dir)
}

/// Builds a linked expiration manager + token store over a fresh
/// in-memory backend. The expiry task is left unarmed; tests that need
/// it call `start_check_expired_lease_entries` themselves.
pub fn new_test_token_auth() -> (Arc<dyn Storage>, Arc<Router>, Arc<ExpirationManager>, Arc<TokenStore>) {
    let storage = new_test_mem_backend();
    let router = Arc::new(Router::new());

    let expiration = ExpirationManager::new(Arc::clone(&storage), Arc::clone(&router)).unwrap().wrap();
    let token_store = TokenStore::new(Arc::clone(&storage), Arc::clone(&expiration)).unwrap().wrap();

    expiration.set_token_store(&token_store).unwrap();

    (storage, router, expiration, token_store)
}

pub fn test_write_request(
    backend: &LogicalBackend,
    path: &str,
    client_token: &str,
    body: Option<serde_json::Map<String, Value>>,
) -> Result<Option<Response>, RvError> {
    let mut req = Request::new_write_request(path, body);
    req.client_token = client_token.to_string();
    backend.handle_request(&mut req)
}
