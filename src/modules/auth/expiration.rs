//! The expiration manager tracks every lease the system has handed
//! out, arms a timer per outstanding lease, and revokes the underlying
//! grant when a lease runs out or is revoked explicitly. Auth leases
//! cascade into the token store; secret leases are revoked through the
//! backend that issued them, resolved via the router.

use std::{
    cmp::Reverse,
    hash::{Hash, Hasher},
    sync::{Arc, RwLock, Weak},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use better_default::Default;
use delay_timer::prelude::{DelayTimer, DelayTimerBuilder, TaskBuilder};
use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::token_store::TokenStore;
use crate::{
    errors::RvError,
    logical::{Auth, Request, Response, SecretData},
    router::Router,
    storage::{Storage, StorageEntry, StorageView},
    utils::{deserialize_system_time, generate_uuid, serialize_system_time},
};

pub const LEASE_VIEW_PREFIX: &str = "sys/expire/id/";
pub const TOKEN_VIEW_PREFIX: &str = "sys/expire/token/";
pub const MAX_LEASE_DURATION_SECS: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_LEASE_DURATION_SECS: Duration = Duration::from_secs(24 * 60 * 60);

/// One outstanding grant. Exactly one of `secret` and `auth` is set.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct LeaseEntry {
    #[serde(default)]
    pub lease_id: String,
    pub client_token: String,
    pub path: String,
    pub data: Map<String, Value>,
    pub secret: Option<SecretData>,
    pub auth: Option<Auth>,
    #[default(SystemTime::now())]
    #[serde(serialize_with = "serialize_system_time", deserialize_with = "deserialize_system_time")]
    pub issue_time: SystemTime,
    #[default(SystemTime::now())]
    #[serde(serialize_with = "serialize_system_time", deserialize_with = "deserialize_system_time")]
    pub expire_time: SystemTime,
}

pub struct ExpirationManager {
    pub self_ptr: Weak<Self>,
    pub router: Arc<Router>,
    pub id_view: Arc<StorageView>,
    pub token_view: Arc<StorageView>,
    pub token_store: RwLock<Weak<TokenStore>>,
    queue: Arc<RwLock<PriorityQueue<Arc<LeaseEntry>, Reverse<u64>>>>,
    task_timer: DelayTimer,
}

impl Hash for LeaseEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lease_id.hash(state);
        self.client_token.hash(state);
        self.path.hash(state);
    }
}

impl PartialEq for LeaseEntry {
    fn eq(&self, other: &Self) -> bool {
        self.lease_id == other.lease_id && self.client_token == other.client_token && self.path == other.path
    }
}

impl Eq for LeaseEntry {}

impl LeaseEntry {
    fn renewable(&self) -> bool {
        let now = SystemTime::now();
        if self.expire_time < now {
            return false;
        }

        if let Some(secret) = self.secret.as_ref() {
            if !secret.renewable() {
                return false;
            }
        }

        if let Some(auth) = self.auth.as_ref() {
            if !auth.renewable() {
                return false;
            }
        }

        true
    }
}

impl ExpirationManager {
    pub fn new(storage: Arc<dyn Storage>, router: Arc<Router>) -> Result<ExpirationManager, RvError> {
        let id_view = StorageView::new(Arc::clone(&storage), LEASE_VIEW_PREFIX);
        let token_view = StorageView::new(storage, TOKEN_VIEW_PREFIX);

        let expiration = ExpirationManager {
            self_ptr: Weak::new(),
            router,
            id_view: Arc::new(id_view),
            token_view: Arc::new(token_view),
            token_store: RwLock::new(Weak::new()),
            queue: Arc::new(RwLock::new(PriorityQueue::new())),
            task_timer: DelayTimerBuilder::default().build(),
        };

        Ok(expiration)
    }

    /// Wraps the manager in an `Arc` and points `self_ptr` back at it,
    /// so the expiry task can hold a weak reference to its owner.
    pub fn wrap(self) -> Arc<Self> {
        let mut wrap_self = Arc::new(self);
        let weak_self = Arc::downgrade(&wrap_self);
        unsafe {
            let ptr_self = Arc::into_raw(wrap_self) as *mut Self;
            (*ptr_self).self_ptr = weak_self;
            wrap_self = Arc::from_raw(ptr_self);
        }

        wrap_self
    }

    pub fn set_token_store(&self, ts: &Arc<TokenStore>) -> Result<(), RvError> {
        let mut token_store = self.token_store.write()?;
        *token_store = Arc::downgrade(ts);
        Ok(())
    }

    /// Reloads every persisted lease and rearms its timer. A lease
    /// whose expiry already passed fires on the next tick.
    pub fn restore(&self) -> Result<(), RvError> {
        let existing = self.id_view.get_keys()?;

        for lease_id in existing {
            let le = self.load_lease_entry(&lease_id)?;
            if le.is_none() {
                continue;
            }

            self.register_lease_entry(Arc::new(le.unwrap()))?;
        }

        Ok(())
    }

    pub fn register_auth(&self, source: &str, auth: &mut Auth) -> Result<(), RvError> {
        let token_store = self.token_store.read()?.upgrade().ok_or(RvError::ErrTokenStoreUninitialized)?;
        let lease_id = format!("{}/{}", source.trim_end_matches('/'), token_store.salt_id(&auth.client_token)?);

        let now = SystemTime::now();
        auth.issue_time = now;

        let le = LeaseEntry {
            lease_id,
            client_token: auth.client_token.clone(),
            path: source.to_string(),
            auth: Some(auth.clone()),
            issue_time: now,
            expire_time: now + auth.ttl,
            ..Default::default()
        };

        self.persist_lease_entry(&le)?;
        self.index_by_token(&le.client_token, &le.lease_id)?;
        self.register_lease_entry(Arc::new(le))?;

        Ok(())
    }

    pub fn register_secret(&self, req: &mut Request, resp: &mut Response) -> Result<(), RvError> {
        if let Some(secret) = resp.secret.as_mut() {
            if secret.ttl.as_secs() == 0 {
                secret.ttl = DEFAULT_LEASE_DURATION_SECS;
            }

            if secret.ttl > MAX_LEASE_DURATION_SECS {
                secret.ttl = MAX_LEASE_DURATION_SECS;
            }

            let now = SystemTime::now();
            secret.issue_time = now;

            let lease_id = format!("{}/{}", req.path.trim_end_matches('/'), generate_uuid());

            secret.lease_id = lease_id.clone();

            let le = LeaseEntry {
                lease_id,
                client_token: req.client_token.clone(),
                path: req.path.clone(),
                data: resp.data.clone().unwrap_or_default(),
                secret: Some(secret.clone()),
                issue_time: now,
                expire_time: now + secret.ttl,
                ..Default::default()
            };

            self.persist_lease_entry(&le)?;
            self.index_by_token(&le.client_token, &le.lease_id)?;

            secret.ttl = le.expire_time.duration_since(now)?;

            self.register_lease_entry(Arc::new(le))?;
        }

        Ok(())
    }

    /// Renews a secret lease by consulting the issuing backend's renew
    /// hook. The stored expiry only ever moves forward.
    pub fn renew(&self, lease_id: &str, increment: Duration) -> Result<Option<Response>, RvError> {
        let le = self.load_lease_entry(lease_id)?;
        if le.is_none() {
            return Err(RvError::ErrLeaseNotFound);
        }

        let mut le = le.unwrap();

        if !le.renewable() {
            return Err(RvError::ErrLeaseNotRenewable);
        }

        let resp = self.renew_secret_lease_entry(&le, increment)?;
        let Some(mut resp) = resp else {
            return Ok(None);
        };

        let Some(secret) = resp.secret.as_mut() else {
            return Ok(Some(resp));
        };

        let mut ttl = if increment.as_secs() > 0 { increment } else { secret.ttl };
        if ttl.as_secs() == 0 {
            ttl = DEFAULT_LEASE_DURATION_SECS;
        }
        if ttl > MAX_LEASE_DURATION_SECS {
            ttl = MAX_LEASE_DURATION_SECS;
        }

        let now = SystemTime::now();
        let expire_time = std::cmp::max(now + ttl, le.expire_time);

        secret.lease_id = lease_id.to_string();
        secret.issue_time = now;
        secret.ttl = expire_time.duration_since(now)?;

        le.data = resp.data.clone().unwrap_or_default();
        le.expire_time = expire_time;
        le.secret = Some(secret.clone());

        self.persist_lease_entry(&le)?;
        self.register_lease_entry(Arc::new(le))?;

        Ok(Some(resp))
    }

    /// Renews an auth lease. The token backend is the issuing backend
    /// here, so the lease is extended in place and the refreshed auth
    /// is handed back as the renewal response.
    pub fn renew_token(&self, source: &str, token: &str, increment: Duration) -> Result<Option<Auth>, RvError> {
        let token_store = self.token_store.read()?.upgrade().ok_or(RvError::ErrTokenStoreUninitialized)?;
        let lease_id = format!("{}/{}", source.trim_end_matches('/'), token_store.salt_id(token)?);

        let le = self.load_lease_entry(&lease_id)?;
        if le.is_none() {
            return Err(RvError::ErrLeaseNotFound);
        }

        let mut le = le.unwrap();

        if !le.renewable() {
            return Err(RvError::ErrLeaseNotRenewable);
        }

        let Some(mut auth) = le.auth.clone() else {
            return Err(RvError::ErrLeaseNotFound);
        };

        let ttl = if increment.as_secs() > 0 { increment } else { auth.ttl };
        let now = SystemTime::now();

        auth.ttl = ttl;
        auth.issue_time = now;
        auth.client_token = token.to_string();

        le.expire_time = std::cmp::max(now + ttl, le.expire_time);
        le.auth = Some(auth.clone());

        self.persist_lease_entry(&le)?;
        self.register_lease_entry(Arc::new(le))?;

        Ok(Some(auth))
    }

    /// Revokes a single lease. Idempotent: a missing record is a
    /// success. A failing revocation hook leaves the record in place
    /// so the next tick or the next restore retries it.
    pub fn revoke_lease_id(&self, lease_id: &str) -> Result<(), RvError> {
        self.revoke_lease_id_internal(lease_id, false)
    }

    fn revoke_lease_id_internal(&self, lease_id: &str, token_revoked: bool) -> Result<(), RvError> {
        let le = self.load_lease_entry(lease_id)?;
        if le.is_none() {
            return Ok(());
        }

        let le = le.unwrap();

        log::debug!("revoke lease_id: {}", &le.lease_id);

        // When the token store is already tearing the token down, its
        // own auth lease must not cascade back into the store: that
        // round trip would turn an orphan revocation into a tree one.
        let skip_cascade = token_revoked && le.auth.is_some();
        if !skip_cascade {
            self.revoke_lease_entry(&le)?;
        }

        self.delete_lease_entry(lease_id)?;
        self.deindex_by_token(&le.client_token, &le.lease_id)?;

        Ok(())
    }

    /// Revokes every lease issued under the given mount prefix.
    pub fn revoke_prefix(&self, prefix: &str) -> Result<(), RvError> {
        let mut prefix = prefix.to_string();
        if !prefix.ends_with('/') {
            prefix += "/";
        }

        let sub = self.id_view.new_sub_view(&prefix);
        let existing = sub.get_keys()?;
        for suffix in existing.iter() {
            let lease_id = format!("{}{}", prefix, suffix);
            self.revoke_lease_id(&lease_id)?;
        }

        Ok(())
    }

    /// Revokes every lease tied to the given token. Called by the
    /// token store while it deletes the token, so the token's own auth
    /// lease is dropped without cascading back into the store.
    pub fn revoke_by_token(&self, token: &str) -> Result<(), RvError> {
        let existing = self.lookup_by_token(token)?;
        for lease_id in existing.iter() {
            self.revoke_lease_id_internal(lease_id, true)?;
        }

        Ok(())
    }

    /// Arms the periodic task that drains expired leases. Revocation
    /// failures leave the head of the queue untouched so the entry is
    /// retried on a later tick.
    pub fn start_check_expired_lease_entries(&self) {
        let mut task_builder = TaskBuilder::default();

        let queue = Arc::clone(&self.queue);
        let expiration = Arc::clone(&self.self_ptr.upgrade().unwrap());

        let timer_check = move || {
            let queue_cloned = Arc::clone(&queue);
            let expiration_cloned = Arc::clone(&expiration);
            async move {
                let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|t| t.as_secs()).unwrap_or(0);
                let expired = {
                    let queue_locked = queue_cloned.read().unwrap();

                    queue_locked.peek().map(|(_le, Reverse(priority))| *priority < now).unwrap_or(false)
                };

                if !expired {
                    return;
                }

                let mut queue_write_locked = queue_cloned.write().unwrap();
                loop {
                    if let Some((le, Reverse(priority))) = queue_write_locked.peek() {
                        if *priority > now {
                            return;
                        }

                        if expiration_cloned.revoke_lease_id(&le.lease_id).is_err() {
                            return;
                        }
                    } else {
                        return;
                    }

                    let _le = queue_write_locked.pop();
                }
            }
        };

        let task =
            task_builder.set_task_id(1).set_frequency_repeated_by_seconds(1).spawn_async_routine(timer_check).unwrap();
        let _ = self.task_timer.add_task(task);
    }

    fn register_lease_entry(&self, le: Arc<LeaseEntry>) -> Result<(), RvError> {
        let priority = le.expire_time.duration_since(UNIX_EPOCH)?.as_secs();
        let mut queue_locked = self.queue.write()?;
        queue_locked.push(le, Reverse(priority));
        Ok(())
    }

    fn load_lease_entry(&self, lease_id: &str) -> Result<Option<LeaseEntry>, RvError> {
        let raw = self.id_view.get(lease_id)?;
        if raw.is_none() {
            return Ok(None);
        }

        let le: LeaseEntry = serde_json::from_slice(raw.unwrap().value.as_slice())?;

        Ok(Some(le))
    }

    fn persist_lease_entry(&self, le: &LeaseEntry) -> Result<(), RvError> {
        let value = serde_json::to_string(&le)?;

        let entry = StorageEntry { key: le.lease_id.clone(), value: value.as_bytes().to_vec() };

        self.id_view.put(&entry)
    }

    fn delete_lease_entry(&self, lease_id: &str) -> Result<(), RvError> {
        self.id_view.delete(lease_id)
    }

    fn token_index_key(&self, token: &str, lease_id: &str) -> Result<String, RvError> {
        let token_store = self.token_store.read()?.upgrade().ok_or(RvError::ErrTokenStoreUninitialized)?;
        Ok(format!("{}/{}", token_store.salt_id(token)?, token_store.salt_id(lease_id)?))
    }

    fn index_by_token(&self, token: &str, lease_id: &str) -> Result<(), RvError> {
        let key = self.token_index_key(token, lease_id)?;
        let entry = StorageEntry { key, value: lease_id.as_bytes().to_owned() };
        self.token_view.put(&entry)
    }

    fn deindex_by_token(&self, token: &str, lease_id: &str) -> Result<(), RvError> {
        let key = self.token_index_key(token, lease_id)?;
        self.token_view.delete(&key)
    }

    fn lookup_by_token(&self, token: &str) -> Result<Vec<String>, RvError> {
        let token_store = self.token_store.read()?.upgrade().ok_or(RvError::ErrTokenStoreUninitialized)?;
        let prefix = format!("{}/", token_store.salt_id(token)?);
        let sub_keys = self.token_view.list(&prefix)?;

        let mut ret: Vec<String> = Vec::new();

        for sub in sub_keys.iter() {
            let key = format!("{}{}", prefix, sub);
            let raw = self.token_view.get(&key)?;
            if raw.is_none() {
                continue;
            }

            let lease_id = String::from_utf8_lossy(&raw.unwrap().value).to_string();
            ret.push(lease_id);
        }

        Ok(ret)
    }

    /// Revokes the grant behind a lease. Auth leases cascade into the
    /// token store, which deletes the token and calls back into
    /// `revoke_by_token`; that path drops the auth lease without a
    /// second cascade, so the mutual recursion bottoms out there.
    fn revoke_lease_entry(&self, le: &LeaseEntry) -> Result<(), RvError> {
        if let Some(auth) = le.auth.as_ref() {
            let token_store = self.token_store.read()?.upgrade().ok_or(RvError::ErrTokenStoreUninitialized)?;
            return token_store.revoke_tree(&auth.client_token);
        }

        let secret = le.secret.clone();

        let mut data: Option<Map<String, Value>> = None;
        if !le.data.is_empty() {
            data = Some(le.data.clone());
        }

        let mut req = Request::new_revoke_request(&le.path, secret, data);
        let ret = self.router.handle_request(&mut req);
        if let Err(err) = ret {
            log::error!("failed to revoke entry: {:?}, err: {}", le, err);
            return Err(err);
        }

        Ok(())
    }

    fn renew_secret_lease_entry(&self, le: &LeaseEntry, _increment: Duration) -> Result<Option<Response>, RvError> {
        let mut secret: Option<SecretData> = None;
        if let Some(s) = le.secret.as_ref() {
            let mut s = s.clone();
            s.lease_id = String::new();
            s.issue_time = le.issue_time;
            secret = Some(s);
        }

        let mut data: Option<Map<String, Value>> = None;
        if !le.data.is_empty() {
            data = Some(le.data.clone());
        }

        let mut req = Request::new_renew_request(&le.path, secret, data);
        let ret = self.router.handle_request(&mut req);
        if ret.is_err() {
            log::error!("failed to renew entry: {}", ret.as_ref().unwrap_err());
        }

        ret
    }
}
