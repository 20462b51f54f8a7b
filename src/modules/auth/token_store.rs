use std::{collections::HashMap, ops::Deref, sync::Arc, time::Duration};

use humantime::parse_duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::{
    new_path, new_path_internal, new_fields, new_fields_internal,
    new_logical_backend, new_logical_backend_internal,
    rv_error_response,
    errors::RvError,
    logical::{
        field::FieldTrait, Auth, Backend, Field, FieldType, Lease, LogicalBackend, Operation, Path, PathOperation,
        Request, Response,
    },
    storage::{Storage, StorageEntry, StorageView},
    utils::{generate_uuid, is_str_subset, locks::Locks, salt::Salt},
};
use super::expiration::ExpirationManager;

pub const TOKEN_SUB_PATH: &str = "sys/token/";

const TOKEN_LOOKUP_PREFIX: &str = "lookup/";
const TOKEN_PARENT_PREFIX: &str = "parent/";
const TOKEN_ROOT_PATH: &str = "sys/root";
const TOKEN_CREATE_PATH: &str = "auth/token/create";
const TOKEN_ROOT_POLICY: &str = "root";

static AUTH_TOKEN_HELP: &str = r#"
The token credential backend is the only auth backend that is built in
and automatically available. It stores the tokens every other credential
backend hands out, tracks their parent/child relationships, and exposes
the operations to create, look up, renew and revoke them.
"#;

#[derive(Default, Serialize, Deserialize)]
struct TokenReqData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    policies: Vec<String>,
    #[serde(default)]
    meta: HashMap<String, String>,
    #[serde(default)]
    no_parent: bool,
    #[serde(default)]
    lease: String,
}

/// One live credential. The entry is persisted under the salted form
/// of its id, so the raw storage backend never holds a usable token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub id: String,
    pub parent: String,
    pub policies: Vec<String>,
    pub path: String,
    pub meta: HashMap<String, String>,
}

pub struct TokenStoreInner {
    pub view: Arc<StorageView>,
    pub salt: Salt,
    pub token_locks: Locks,
    pub expiration: Arc<ExpirationManager>,
}

pub struct TokenStore {
    pub inner: Arc<TokenStoreInner>,
}

impl Deref for TokenStore {
    type Target = TokenStoreInner;

    fn deref(&self) -> &TokenStoreInner {
        &self.inner
    }
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>, expiration: Arc<ExpirationManager>) -> Result<TokenStore, RvError> {
        let view = StorageView::new(storage, TOKEN_SUB_PATH);
        let salt = Salt::new(Some(&view), None)?;

        let inner = TokenStoreInner { view: Arc::new(view), salt, token_locks: Locks::new(), expiration };

        Ok(TokenStore { inner: Arc::new(inner) })
    }

    pub fn wrap(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn new_backend(&self) -> LogicalBackend {
        let ts_inner_arc1 = Arc::clone(&self.inner);
        let ts_inner_arc2 = Arc::clone(&self.inner);
        let ts_inner_arc3 = Arc::clone(&self.inner);
        let ts_inner_arc4 = Arc::clone(&self.inner);
        let ts_inner_arc5 = Arc::clone(&self.inner);
        let ts_inner_arc6 = Arc::clone(&self.inner);
        let ts_inner_arc7 = Arc::clone(&self.inner);

        let backend = new_logical_backend!({
            paths: [
                {
                    pattern: "create$",
                    operations: [
                        {op: Operation::Write, handler: ts_inner_arc1.handle_create}
                    ],
                    help: "The token create path is used to create new tokens."
                },
                {
                    pattern: "lookup/(?P<token>.+)",
                    fields: {
                        "token": {
                            field_type: FieldType::Str,
                            description: "Token to lookup"
                        }
                    },
                    operations: [
                        {op: Operation::Read, handler: ts_inner_arc2.handle_lookup}
                    ],
                    help: "This endpoint will lookup a token and its properties."
                },
                {
                    pattern: "lookup-self$",
                    operations: [
                        {op: Operation::Read, handler: ts_inner_arc3.handle_lookup_self}
                    ],
                    help: "This endpoint will lookup the token of the caller."
                },
                {
                    pattern: "revoke/(?P<token>.+)",
                    fields: {
                        "token": {
                            field_type: FieldType::Str,
                            description: "Token to revoke"
                        }
                    },
                    operations: [
                        {op: Operation::Write, handler: ts_inner_arc4.handle_revoke_tree}
                    ],
                    help: "This endpoint will delete the token and all of its child tokens."
                },
                {
                    pattern: "revoke-orphan/(?P<token>.+)",
                    fields: {
                        "token": {
                            field_type: FieldType::Str,
                            description: "Token to revoke (request body)"
                        }
                    },
                    operations: [
                        {op: Operation::Write, handler: ts_inner_arc5.handle_revoke_orphan}
                    ],
                    help: "This endpoint will delete the token and orphan its child tokens."
                },
                {
                    pattern: "revoke-prefix/(?P<prefix>.+)",
                    fields: {
                        "prefix": {
                            field_type: FieldType::Str,
                            description: "Mount path prefix whose leases should be revoked"
                        }
                    },
                    operations: [
                        {op: Operation::Write, handler: ts_inner_arc6.handle_revoke_prefix}
                    ],
                    help: "This endpoint will delete all tokens and leases issued under the given prefix."
                },
                {
                    pattern: "renew/(?P<token>.+)",
                    fields: {
                        "token": {
                            field_type: FieldType::Str,
                            description: "Token to renew (request body)"
                        },
                        "increment": {
                            field_type: FieldType::Int,
                            default: 0,
                            description: "The desired increment in seconds to the token expiration"
                        }
                    },
                    operations: [
                        {op: Operation::Write, handler: ts_inner_arc7.handle_renew}
                    ],
                    help: "This endpoint will renew the token and prevent expiration."
                }
            ],
            help: AUTH_TOKEN_HELP
        });

        backend
    }
}

impl TokenStoreInner {
    pub fn salt_id(&self, id: &str) -> Result<String, RvError> {
        self.salt.salt_id(id)
    }

    pub fn root_token(&self) -> Result<TokenEntry, RvError> {
        let mut te = TokenEntry {
            policies: vec![TOKEN_ROOT_POLICY.to_string()],
            path: TOKEN_ROOT_PATH.to_string(),
            ..TokenEntry::default()
        };

        self.create(&mut te)?;

        Ok(te)
    }

    pub fn create(&self, entry: &mut TokenEntry) -> Result<(), RvError> {
        if entry.id.is_empty() {
            entry.id = generate_uuid();
        }

        let salted_id = self.salt_id(&entry.id)?;

        let lock_entry = self.token_locks.get_lock(&salted_id);
        let _locked = lock_entry.lock.write()?;

        let path = format!("{}{}", TOKEN_LOOKUP_PREFIX, &salted_id);
        if self.view.get(&path)?.is_some() {
            return Err(RvError::ErrAuthTokenIdInUse);
        }

        if !entry.parent.is_empty() {
            let parent = self.lookup(&entry.parent)?;
            if parent.is_none() {
                return Err(RvError::ErrAuthTokenNotFound);
            }

            // The edge goes in first so a crash between the two writes
            // leaves a ghost edge rather than an unreachable child.
            let edge_path =
                format!("{}{}/{}", TOKEN_PARENT_PREFIX, self.salt_id(&entry.parent)?, &salted_id);
            let edge = StorageEntry { key: edge_path, ..StorageEntry::default() };

            self.view.put(&edge)?;
        }

        let entry = StorageEntry::new(&path, entry)?;

        self.view.put(&entry)
    }

    pub fn lookup(&self, id: &str) -> Result<Option<TokenEntry>, RvError> {
        if id.is_empty() {
            return Err(rv_error_response!("cannot lookup blank token"));
        }

        self.lookup_salted(self.salt_id(id)?.as_str())
    }

    pub fn lookup_salted(&self, salted_id: &str) -> Result<Option<TokenEntry>, RvError> {
        let path = format!("{}{}", TOKEN_LOOKUP_PREFIX, salted_id);
        let raw = self.view.get(&path)?;
        if raw.is_none() {
            return Ok(None);
        }

        let entry: TokenEntry = serde_json::from_slice(raw.unwrap().value.as_slice())?;

        Ok(Some(entry))
    }

    pub fn revoke(&self, id: &str) -> Result<(), RvError> {
        if id.is_empty() {
            return Err(rv_error_response!("cannot revoke blank token"));
        }

        self.revoke_salted(self.salt_id(id)?.as_str())
    }

    pub fn revoke_salted(&self, salted_id: &str) -> Result<(), RvError> {
        // The stripe lock covers only the storage mutation. Lease
        // revocation below can re-enter this store for the same id and
        // must find the lock free; it then sees the primary record
        // already gone and stops.
        let entry = {
            let lock_entry = self.token_locks.get_lock(salted_id);
            let _locked = lock_entry.lock.write()?;

            let entry = self.lookup_salted(salted_id)?;

            let path = format!("{}{}", TOKEN_LOOKUP_PREFIX, salted_id);
            self.view.delete(&path)?;

            if let Some(entry) = entry.as_ref() {
                if !entry.parent.is_empty() {
                    let edge_path =
                        format!("{}{}/{}", TOKEN_PARENT_PREFIX, self.salt_id(&entry.parent)?, salted_id);
                    self.view.delete(&edge_path)?;
                }
            }

            entry
        };

        if let Some(entry) = entry {
            // Revoke all leases held under this token.
            self.expiration.revoke_by_token(&entry.id)?;
        }

        Ok(())
    }

    pub fn revoke_tree(&self, id: &str) -> Result<(), RvError> {
        if id.is_empty() {
            return Err(rv_error_response!("cannot revoke blank token"));
        }

        self.revoke_tree_salted(self.salt_id(id)?.as_str())
    }

    pub fn revoke_tree_salted(&self, salted_id: &str) -> Result<(), RvError> {
        let path = format!("{}{}/", TOKEN_PARENT_PREFIX, salted_id);

        // Children go first so a crash mid-walk leaves a tree a rerun
        // can still finish.
        let children = self.view.list(&path)?;
        for child in children.iter() {
            self.revoke_tree_salted(child)?;
        }

        self.revoke_salted(salted_id)
    }

    pub fn revoke_all(&self) -> Result<(), RvError> {
        let lookup_view = self.view.new_sub_view(TOKEN_LOOKUP_PREFIX);
        for salted_id in lookup_view.get_keys()? {
            self.revoke_salted(&salted_id)?;
        }

        self.view.new_sub_view(TOKEN_PARENT_PREFIX).clear()
    }

    pub fn handle_create(&self, _backend: &dyn Backend, req: &mut Request) -> Result<Option<Response>, RvError> {
        let parent = self.lookup(&req.client_token)?;
        if parent.is_none() {
            return Err(rv_error_response!("parent token lookup failed"));
        }

        let parent = parent.unwrap();
        let is_root = parent.policies.iter().any(|s| s.as_str() == TOKEN_ROOT_POLICY);

        let body = req.body.clone().unwrap_or_default();
        let data: TokenReqData = serde_json::from_value(Value::Object(body))?;

        if data.policies.is_empty() {
            return Err(rv_error_response!("token must have at least one policy"));
        }

        let mut te = TokenEntry {
            parent: req.client_token.clone(),
            path: TOKEN_CREATE_PATH.to_string(),
            policies: data.policies.clone(),
            meta: data.meta.clone(),
            ..TokenEntry::default()
        };

        if !data.id.is_empty() {
            if !is_root {
                return Err(rv_error_response!("root required to specify token id"));
            }
            te.id = data.id.clone();
        }

        if data.no_parent {
            if !is_root {
                return Err(rv_error_response!("root required to create orphan token"));
            }
            te.parent = String::new();
        }

        if !is_root && !is_str_subset(&data.policies, &parent.policies) {
            return Err(rv_error_response!("child policies must be subset of parent"));
        }

        let mut lease_duration = Duration::ZERO;
        if !data.lease.is_empty() {
            lease_duration = parse_duration(&data.lease)?;
        }

        self.create(&mut te)?;

        let mut auth = Auth {
            lease: Lease { ttl: lease_duration, renewable: lease_duration.as_secs() > 0, ..Lease::default() },
            client_token: te.id.clone(),
            policies: te.policies.clone(),
            metadata: te.meta.clone(),
        };

        if lease_duration.as_secs() > 0 {
            self.expiration.register_auth(&te.path, &mut auth)?;
        }

        Ok(Some(Response { auth: Some(auth), ..Response::default() }))
    }

    pub fn handle_lookup(&self, _backend: &dyn Backend, req: &mut Request) -> Result<Option<Response>, RvError> {
        let id = req.get_data("token")?;
        let id = id.as_str().unwrap_or_default();
        if id.is_empty() {
            return Err(RvError::ErrRequestInvalid);
        }

        let te = self.lookup(id)?;

        Ok(te.map(Self::lookup_response))
    }

    pub fn handle_lookup_self(&self, _backend: &dyn Backend, req: &mut Request) -> Result<Option<Response>, RvError> {
        let te = self.lookup(&req.client_token)?;

        Ok(te.map(Self::lookup_response))
    }

    fn lookup_response(te: TokenEntry) -> Response {
        let data = serde_json::json!({
            "id": te.id,
            "policies": te.policies,
            "path": te.path,
            "meta": te.meta,
        })
        .as_object()
        .cloned();

        Response::data_response(data)
    }

    pub fn handle_revoke_tree(&self, _backend: &dyn Backend, req: &mut Request) -> Result<Option<Response>, RvError> {
        let id = req.get_data("token")?;
        let id = id.as_str().unwrap_or_default();

        self.revoke_tree(id)?;

        Ok(None)
    }

    pub fn handle_revoke_orphan(&self, _backend: &dyn Backend, req: &mut Request) -> Result<Option<Response>, RvError> {
        let id = req.get_data("token")?;
        let id = id.as_str().unwrap_or_default();

        self.revoke(id)?;

        Ok(None)
    }

    pub fn handle_revoke_prefix(&self, _backend: &dyn Backend, req: &mut Request) -> Result<Option<Response>, RvError> {
        let prefix = req.get_data("prefix")?;
        let prefix = prefix.as_str().unwrap_or_default();
        if prefix.is_empty() {
            return Err(RvError::ErrRequestInvalid);
        }

        self.expiration.revoke_prefix(prefix)?;

        Ok(None)
    }

    pub fn handle_renew(&self, _backend: &dyn Backend, req: &mut Request) -> Result<Option<Response>, RvError> {
        let id = req.get_data("token")?;
        let id = id.as_str().unwrap_or_default();
        if id.is_empty() {
            return Err(RvError::ErrRequestInvalid);
        }

        let te = self.lookup(id)?;
        if te.is_none() {
            return Err(RvError::ErrAuthTokenNotFound);
        }
        let te = te.unwrap();

        let increment = req.get_data_or_default("increment")?;
        let increment = Duration::from_secs(increment.as_int().unwrap_or(0).max(0) as u64);

        let auth = self.expiration.renew_token(&te.path, &te.id, increment)?;

        Ok(Some(Response { auth, ..Response::default() }))
    }
}
