// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the persistent data layout.

use std::path::{Path, PathBuf};

/// Base directory for all persistent service data.
/// Mounted as `type = "encrypted"` when running under Gramine.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities for the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all persistent data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Database ==========

    /// Path to the redb secret database.
    pub fn database(&self) -> PathBuf {
        self.root.join("sms.redb")
    }

    // ========== Key Material ==========

    /// Directory holding the at-rest encryption key.
    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    /// Default location of the AES-256 key file.
    pub fn aes_key(&self) -> PathBuf {
        self.keys_dir().join("aes.key")
    }
}
