//! Process-local debounce for known_jobs announcements.
//!
//! Every enqueue wants the job name in the shared `known_jobs` set, but one
//! `SADD` per name every few minutes is plenty. Entries are never evicted;
//! the map only grows with the set of names this process has enqueued.

use std::collections::HashMap;
use std::sync::Mutex;

/// Seconds an announcement stays fresh.
pub const KNOWN_JOBS_TTL_SECS: i64 = 300;

#[derive(Debug)]
pub struct KnownJobRegistry {
    ttl_secs: i64,
    expiries: Mutex<HashMap<String, i64>>,
}

impl Default for KnownJobRegistry {
    fn default() -> Self {
        Self::new(KNOWN_JOBS_TTL_SECS)
    }
}

impl KnownJobRegistry {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            expiries: Mutex::new(HashMap::new()),
        }
    }

    /// True when `name` was never announced or its announcement expired.
    pub fn needs_announce(&self, name: &str, now: i64) -> bool {
        let expiries = self.expiries.lock().unwrap_or_else(|e| e.into_inner());
        match expiries.get(name) {
            Some(&expires_at) => now >= expires_at,
            None => true,
        }
    }

    /// Record a successful announcement made at `now`.
    pub fn mark_announced(&self, name: &str, now: i64) {
        let mut expiries = self.expiries.lock().unwrap_or_else(|e| e.into_inner());
        expiries.insert(name.to_string(), now.saturating_add(self.ttl_secs));
    }

    pub fn len(&self) -> usize {
        self.expiries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
