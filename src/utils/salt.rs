//! One-way derivation from plaintext identifiers to storage keys, so a
//! raw dump of the storage backend never reveals live token ids.
//!
//! The salt is a 256-bit random seed generated on first use and
//! persisted under a fixed location; every later instance built over
//! the same storage loads the seed instead of regenerating it, which
//! keeps derived keys stable across restarts.

use openssl::{
    hash::MessageDigest,
    pkey::PKey,
    sign::Signer,
};
use rand::{thread_rng, Rng};

use crate::{
    errors::RvError,
    storage::{Storage, StorageEntry},
};

static DEFAULT_LOCATION: &str = "salt";

pub struct Config {
    pub location: String,
    pub hmac_type: MessageDigest,
}

impl Default for Config {
    fn default() -> Self {
        Self { location: DEFAULT_LOCATION.to_string(), hmac_type: MessageDigest::sha1() }
    }
}

pub struct Salt {
    pub config: Config,
    pub salt: String,
    pub generated: bool,
}

impl Salt {
    pub fn new(storage: Option<&dyn Storage>, config: Option<Config>) -> Result<Self, RvError> {
        let mut salt = Salt { config: config.unwrap_or_default(), salt: generate_seed(), generated: true };

        if salt.config.location.is_empty() {
            salt.config.location = DEFAULT_LOCATION.to_string();
        }

        if let Some(s) = storage {
            if let Some(raw) = s.get(&salt.config.location)? {
                salt.salt = String::from_utf8_lossy(&raw.value).to_string();
                salt.generated = false;
            } else {
                let entry = StorageEntry { key: salt.config.location.clone(), value: salt.salt.as_bytes().to_vec() };

                s.put(&entry)?;
            }
        }

        Ok(salt)
    }

    pub fn get_hmac(&self, data: &str) -> Result<String, RvError> {
        let pkey = PKey::hmac(self.salt.as_bytes())?;
        let mut signer = Signer::new(self.config.hmac_type, &pkey)?;
        signer.update(data.as_bytes())?;
        let hmac = signer.sign_to_vec()?;
        Ok(hex::encode(hmac.as_slice()))
    }

    pub fn salt_id(&self, id: &str) -> Result<String, RvError> {
        self.get_hmac(id)
    }

    pub fn did_generate(&self) -> bool {
        self.generated
    }
}

fn generate_seed() -> String {
    let mut buf = [0u8; 32];
    thread_rng().fill(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::new_test_mem_backend;

    #[test]
    fn test_salt_persistence() {
        let backend = new_test_mem_backend();

        let salt = Salt::new(Some(backend.as_ref()), None).unwrap();
        assert!(salt.did_generate());

        let ss = backend.get(DEFAULT_LOCATION).unwrap();
        assert!(ss.is_some());

        let salt2 = Salt::new(Some(backend.as_ref()), None).unwrap();
        assert!(!salt2.did_generate());
        assert_eq!(salt.salt, salt2.salt);

        let id = "foobarbaz";
        let sid1 = salt.salt_id(id).unwrap();
        let sid2 = salt2.salt_id(id).unwrap();
        assert_eq!(sid1, sid2);

        // hex-rendered HMAC-SHA1
        assert_eq!(sid1.len(), 40);
        assert_ne!(sid1, salt.salt_id("foobarqux").unwrap());
    }

    #[test]
    fn test_salt_nonpersistent_instances_differ() {
        let s1 = Salt::new(None, None).unwrap();
        let s2 = Salt::new(None, None).unwrap();
        assert_ne!(s1.salt_id("a").unwrap(), s2.salt_id("a").unwrap());
    }
}
