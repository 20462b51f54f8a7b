//! The token authentication core: the token store, the expiration
//! manager, and the logical backend that exposes the token operations.
//!
//! Clients hold bearer tokens and present them on every request.
//! Tokens form a parent/child forest; revoking a token's subtree takes
//! its transitive descendants with it, while an orphan revocation cuts
//! the children loose instead. Every token created with a lease is
//! tracked by the expiration manager, which revokes it when the lease
//! runs out.

use std::sync::Arc;

use crate::{
    errors::RvError,
    logical::Backend,
    router::Router,
    storage::{Storage, StorageView},
};

pub mod expiration;
pub mod token_store;
pub use expiration::ExpirationManager;
pub use token_store::TokenStore;

pub const AUTH_ROUTER_PREFIX: &str = "auth/";

const TOKEN_BACKEND_PATH: &str = "auth/token/";

/// The wired-up token subsystem: storage views, expiration manager and
/// token store linked together, with the token backend mounted on the
/// router and persisted leases restored.
pub struct TokenAuth {
    pub router: Arc<Router>,
    pub token_store: Arc<TokenStore>,
    pub expiration: Arc<ExpirationManager>,
}

impl TokenAuth {
    pub fn setup(storage: Arc<dyn Storage>, router: Arc<Router>) -> Result<Self, RvError> {
        let expiration = ExpirationManager::new(Arc::clone(&storage), Arc::clone(&router))?.wrap();
        let token_store = TokenStore::new(Arc::clone(&storage), Arc::clone(&expiration))?.wrap();

        expiration.set_token_store(&token_store)?;

        let mut backend = token_store.new_backend();
        backend.init()?;

        let view = StorageView::new(Arc::clone(&storage), TOKEN_BACKEND_PATH);
        router.mount(Arc::new(backend), TOKEN_BACKEND_PATH, view)?;

        expiration.restore()?;
        expiration.start_check_expired_lease_entries();

        Ok(Self { router, token_store, expiration })
    }
}
