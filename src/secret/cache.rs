// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process-local cache of secret presence.
//!
//! Secrets are never deleted, so a positive answer stays valid forever. A
//! negative answer can become stale after a write from another process; the
//! write path always consults the database, which is the source of truth.

use dashmap::DashMap;

use crate::error::SmsResult;

/// Concurrent map of storage key → presence.
#[derive(Debug, Default)]
pub struct ExistenceCache {
    entries: DashMap<String, bool>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached answer, if any.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Record a presence answer.
    pub fn put(&self, key: &str, present: bool) {
        self.entries.insert(key.to_string(), present);
    }

    /// Return the cached answer or compute and cache it.
    ///
    /// `lookup` errors are propagated and nothing is cached.
    pub fn get_or_lookup<F>(&self, key: &str, lookup: F) -> SmsResult<bool>
    where
        F: FnOnce() -> SmsResult<bool>,
    {
        if let Some(present) = self.get(key) {
            return Ok(present);
        }
        let present = lookup()?;
        self.put(key, present);
        Ok(present)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
