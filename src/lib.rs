//! This crate is the token authentication core of an identity-based
//! secrets-management system. It issues, validates, renews and revokes
//! the bearer credentials ("tokens") that clients present on every
//! request.
//!
//! Tokens form a parent/child forest: revoking a token's subtree takes
//! its transitive descendants with it, while `revoke-orphan` cuts the
//! children loose instead. Each token created with a lease is tracked
//! by the expiration manager, which arms a timer for the lease and
//! revokes the token when it runs out. Leases can also be revoked in
//! bulk by mount-path prefix, which is how an operator forgets
//! everything a backend ever issued.
//!
//! The pieces fit together like this:
//!
//! - [`storage`] is the persistence boundary: an abstract byte-level
//!   key/value backend, with views scoping each component to its own
//!   key prefix. Token ids are never used as storage keys directly;
//!   they pass through a persisted HMAC salt first ([`utils::salt`]).
//! - [`modules::auth::TokenStore`] owns the token records, the
//!   parent/child index and the revocation rules.
//! - [`modules::auth::ExpirationManager`] owns the lease records and
//!   timers, and reaches the backend that issued a lease through the
//!   [`router`] when a grant has to be revoked or renewed.
//! - The token store's [`logical`] backend is the public request
//!   surface: `create`, `lookup`, `lookup-self`, `revoke`,
//!   `revoke-orphan`, `revoke-prefix` and `renew`.
//!
//! Seal/unseal, the encryption barrier, HTTP transport and the CLI
//! live in the surrounding system, not in this crate.

pub mod errors;
pub mod logical;
pub mod modules;
pub mod router;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

/// tokenvault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
