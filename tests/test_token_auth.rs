use std::{collections::HashMap, env, fs, sync::Arc, thread::sleep, time::Duration};

use go_defer::defer;
use serde_json::{json, Map, Value};

use tokenvault::{
    errors::RvError,
    logical::{Request, Response},
    modules::auth::TokenAuth,
    router::Router,
    rv_error_response,
    storage::{self, Storage},
};

fn new_file_backend(name: &str) -> (Arc<dyn Storage>, std::path::PathBuf) {
    let dir = env::temp_dir().join(name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    let mut conf: HashMap<String, Value> = HashMap::new();
    conf.insert("path".to_string(), Value::String(dir.to_string_lossy().into_owned()));

    (storage::new_backend("file", &conf).unwrap(), dir)
}

fn new_mem_backend() -> Arc<dyn Storage> {
    let conf: HashMap<String, Value> = HashMap::new();
    storage::new_backend("mem", &conf).unwrap()
}

fn write_request(
    auth: &TokenAuth,
    path: &str,
    client_token: &str,
    body: Option<Map<String, Value>>,
) -> Result<Option<Response>, RvError> {
    let mut req = Request::new_write_request(path, body);
    req.client_token = client_token.to_string();
    auth.router.handle_request(&mut req)
}

fn read_request(auth: &TokenAuth, path: &str, client_token: &str) -> Result<Option<Response>, RvError> {
    let mut req = Request::new_read_request(path);
    req.client_token = client_token.to_string();
    auth.router.handle_request(&mut req)
}

#[test]
fn test_token_auth_end_to_end() {
    let (storage, dir) = new_file_backend("tokenvault_test_token_auth_end_to_end");
    defer!(
        let _ = fs::remove_dir_all(&dir);
    );

    let auth = TokenAuth::setup(Arc::clone(&storage), Arc::new(Router::new())).unwrap();
    let root = auth.token_store.root_token().unwrap();

    // create a child token carrying a lease
    let body = json!({
        "policies": ["dev"],
        "lease": "1h",
    })
    .as_object()
    .cloned();
    let resp = write_request(&auth, "auth/token/create", &root.id, body).unwrap().unwrap();
    let child = resp.auth.unwrap();
    assert!(!child.client_token.is_empty());
    assert_eq!(child.ttl, Duration::from_secs(3600));
    assert!(child.renewable);

    // lookup through the router
    let resp = read_request(&auth, &format!("auth/token/lookup/{}", child.client_token), &root.id).unwrap().unwrap();
    let data = resp.data.unwrap();
    assert_eq!(data["id"], json!(child.client_token));
    assert_eq!(data["policies"], json!(["dev"]));
    assert_eq!(data["path"], json!("auth/token/create"));

    // lookup-self sees the caller's own token
    let resp = read_request(&auth, "auth/token/lookup-self", &child.client_token).unwrap().unwrap();
    assert_eq!(resp.data.unwrap()["id"], json!(child.client_token));

    // renew the lease
    let resp =
        write_request(&auth, &format!("auth/token/renew/{}", child.client_token), &root.id, None).unwrap().unwrap();
    let renewed = resp.auth.unwrap();
    assert_eq!(renewed.client_token, child.client_token);
    assert_eq!(renewed.ttl, Duration::from_secs(3600));

    // a restarted instance over the same storage still resolves the
    // same tokens (the salt is persisted, the leases are restored)
    let restarted = TokenAuth::setup(Arc::clone(&storage), Arc::new(Router::new())).unwrap();
    let resp =
        read_request(&restarted, &format!("auth/token/lookup/{}", child.client_token), &root.id).unwrap().unwrap();
    assert_eq!(resp.data.unwrap()["id"], json!(child.client_token));

    // revoke the subtree; the token disappears
    let resp = write_request(&auth, &format!("auth/token/revoke/{}", child.client_token), &root.id, None).unwrap();
    assert!(resp.is_none());
    let resp = read_request(&auth, &format!("auth/token/lookup/{}", child.client_token), &root.id).unwrap();
    assert!(resp.is_none());
}

#[test]
fn test_token_auth_cascade_and_orphan_via_router() {
    let auth = TokenAuth::setup(new_mem_backend(), Arc::new(Router::new())).unwrap();
    let root = auth.token_store.root_token().unwrap();

    let body = json!({"id": "child", "policies": ["root", "foo"]}).as_object().cloned();
    write_request(&auth, "auth/token/create", &root.id, body).unwrap();

    let body = json!({"id": "sub-child", "policies": ["foo"]}).as_object().cloned();
    write_request(&auth, "auth/token/create", "child", body).unwrap();

    // orphan revocation keeps the grandchild alive
    write_request(&auth, "auth/token/revoke-orphan/child", &root.id, None).unwrap();
    assert!(auth.token_store.lookup("child").unwrap().is_none());
    assert!(auth.token_store.lookup("sub-child").unwrap().is_some());

    // build a second chain and cascade instead
    let body = json!({"id": "child2", "policies": ["root", "foo"]}).as_object().cloned();
    write_request(&auth, "auth/token/create", &root.id, body).unwrap();
    let body = json!({"id": "sub-child2", "policies": ["foo"]}).as_object().cloned();
    write_request(&auth, "auth/token/create", "child2", body).unwrap();

    write_request(&auth, "auth/token/revoke/child2", &root.id, None).unwrap();
    assert!(auth.token_store.lookup("child2").unwrap().is_none());
    assert!(auth.token_store.lookup("sub-child2").unwrap().is_none());

    // the orphaned token from the first round is still there
    assert!(auth.token_store.lookup("sub-child").unwrap().is_some());
}

#[test]
fn test_token_auth_create_rules_via_router() {
    let auth = TokenAuth::setup(new_mem_backend(), Arc::new(Router::new())).unwrap();
    let root = auth.token_store.root_token().unwrap();

    let body = json!({"id": "client", "policies": ["foo", "bar"]}).as_object().cloned();
    write_request(&auth, "auth/token/create", &root.id, body).unwrap();

    let body = json!({"policies": ["foo", "bar", "baz"]}).as_object().cloned();
    let err = write_request(&auth, "auth/token/create", "client", body).unwrap_err();
    assert_eq!(err, rv_error_response!("child policies must be subset of parent"));

    let body = json!({"no_parent": true, "policies": ["foo"]}).as_object().cloned();
    let err = write_request(&auth, "auth/token/create", "client", body).unwrap_err();
    assert_eq!(err, rv_error_response!("root required to create orphan token"));

    let err = write_request(&auth, "auth/token/create", "no-such-token", None).unwrap_err();
    assert_eq!(err, rv_error_response!("parent token lookup failed"));
}

#[test]
fn test_token_auth_revoke_prefix_via_router() {
    let auth = TokenAuth::setup(new_mem_backend(), Arc::new(Router::new())).unwrap();
    let root = auth.token_store.root_token().unwrap();

    let body = json!({"policies": ["dev"], "lease": "1h"}).as_object().cloned();
    let resp = write_request(&auth, "auth/token/create", &root.id, body).unwrap().unwrap();
    let child = resp.auth.unwrap();

    // forget everything minted under the token-create path
    let resp = write_request(&auth, "auth/token/revoke-prefix/auth/token/create", &root.id, None).unwrap();
    assert!(resp.is_none());

    assert!(auth.token_store.lookup(&child.client_token).unwrap().is_none());
    assert!(auth.token_store.lookup(&root.id).unwrap().is_some());
}

#[test]
fn test_token_auth_lease_expiry() {
    let auth = TokenAuth::setup(new_mem_backend(), Arc::new(Router::new())).unwrap();
    let root = auth.token_store.root_token().unwrap();

    let body = json!({"policies": ["dev"], "lease": "1s"}).as_object().cloned();
    let resp = write_request(&auth, "auth/token/create", &root.id, body).unwrap().unwrap();
    let child = resp.auth.unwrap();

    assert!(auth.token_store.lookup(&child.client_token).unwrap().is_some());

    sleep(Duration::from_secs(4));

    // the lease ran out and took the token with it
    assert!(auth.token_store.lookup(&child.client_token).unwrap().is_none());
    assert!(auth.token_store.lookup(&root.id).unwrap().is_some());
}
