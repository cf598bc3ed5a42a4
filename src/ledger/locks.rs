//! Per-part mutual exclusion
//!
//! Holding a `PartGuard` is the only way to call the ledger's mutating
//! methods, so the assign-archive-publish sequence for one part can never
//! interleave with another event for that part. Distinct parts never wait on
//! each other beyond the brief map lock.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

/// Table of currently held part keys
pub struct PartLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Exclusive hold on one part key, released on drop
pub struct PartGuard<'a> {
    locks: &'a PartLocks,
    key: String,
}

impl PartLocks {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Block until `key` is free, then take it
    pub fn lock(&self, key: &str) -> PartGuard<'_> {
        let mut held = self.held.lock();
        while held.contains(key) {
            self.released.wait(&mut held);
        }
        held.insert(key.to_string());
        PartGuard {
            locks: self,
            key: key.to_string(),
        }
    }

    /// Take `key` only if nobody holds it
    pub fn try_lock(&self, key: &str) -> Option<PartGuard<'_>> {
        let mut held = self.held.lock();
        if !held.insert(key.to_string()) {
            return None;
        }
        Some(PartGuard {
            locks: self,
            key: key.to_string(),
        })
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }
}

impl Default for PartLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl PartGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn is_from(&self, locks: &PartLocks) -> bool {
        std::ptr::eq(self.locks, locks)
    }
}

impl Drop for PartGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        held.remove(&self.key);
        self.locks.released.notify_all();
    }
}
