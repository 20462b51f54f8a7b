use std::collections::HashMap;

use derive_more::{Deref, DerefMut};
use serde::{Deserialize, Serialize};

use super::lease::Lease;

/// The token-bearing half of a response: who the new credential is,
/// what it may do, and for how long.
#[derive(Debug, Clone, Serialize, Deserialize, Deref, DerefMut)]
pub struct Auth {
    #[deref]
    #[deref_mut]
    pub lease: Lease,
    pub client_token: String,
    pub policies: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            lease: Lease::default(),
            client_token: String::new(),
            policies: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}
