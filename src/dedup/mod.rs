//! Message deduplication
//!
//! Brokers delivering at-least-once may hand the same payload over more than
//! once. `DedupCache` remembers the fingerprints of recently handled payloads
//! so each distinct payload reaches a handler once.
//!
//! Memory is bounded by clearing the whole set once it grows past its
//! capacity, which trades dedup history for a hard size limit.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Entries kept before the cache resets.
pub const DEFAULT_CAPACITY: usize = 1000;

/// SHA-256 digest of a payload, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(payload: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(payload)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct DedupCache {
    seen: Mutex<HashSet<Fingerprint>>,
    capacity: usize,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            capacity,
        }
    }

    /// Record `fingerprint` and return `true` if it has not been seen since
    /// the last reset; return `false` for a duplicate.
    ///
    /// Check and record happen under one lock, so concurrent deliveries of
    /// the same payload cannot both pass.
    pub fn should_process(&self, fingerprint: &Fingerprint) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if seen.contains(fingerprint) {
            return false;
        }
        seen.insert(fingerprint.clone());
        if seen.len() > self.capacity {
            tracing::debug!(capacity = self.capacity, "dedup cache full, clearing");
            seen.clear();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
