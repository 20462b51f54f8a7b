//! Striped locks for serializing mutations on individual keys without
//! a table of per-key mutexes. Keys hash onto a fixed set of stripes;
//! two keys on the same stripe share a lock, which is harmless for
//! correctness and bounds memory.

use std::sync::{Arc, RwLock};

use super::crypto::blake2b256_hash;

static LOCK_COUNT: usize = 256;

#[derive(Debug)]
pub struct LockEntry {
    pub lock: RwLock<u8>,
}

#[derive(Debug)]
pub struct Locks {
    pub locks: Vec<Arc<LockEntry>>,
}

impl Locks {
    pub fn new() -> Self {
        let mut locks = Self { locks: Vec::with_capacity(LOCK_COUNT) };

        for _ in 0..LOCK_COUNT {
            locks.locks.push(Arc::new(LockEntry { lock: RwLock::new(0) }));
        }

        locks
    }

    pub fn get_lock(&self, key: &str) -> Arc<LockEntry> {
        let index: usize = blake2b256_hash(key)[0].into();
        Arc::clone(&self.locks[index])
    }
}

impl Default for Locks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::{
        thread::{self, sleep},
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_locks_same_key_same_stripe() {
        let locks = Locks::new();
        let a = locks.get_lock("sometoken");
        let b = locks.get_lock("sometoken");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_locks_serialize_writers() {
        let data = Arc::new((Locks::new(), RwLock::new(0u32)));

        let d1 = Arc::clone(&data);
        let writer1 = thread::spawn(move || {
            let entry = d1.0.get_lock("key");
            let _locked = entry.lock.write().unwrap();
            sleep(Duration::from_millis(200));
            *d1.1.write().unwrap() += 1;
        });

        sleep(Duration::from_millis(50));

        let d2 = Arc::clone(&data);
        let writer2 = thread::spawn(move || {
            let entry = d2.0.get_lock("key");
            let _locked = entry.lock.write().unwrap();
            *d2.1.write().unwrap() += 1;
        });

        writer1.join().unwrap();
        writer2.join().unwrap();

        assert_eq!(*data.1.read().unwrap(), 2);
    }
}
