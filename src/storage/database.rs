// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded secret database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `web3_secrets`: lowercase address → serialized `Secret`
//! - `web2_secrets`: lowercase owner address → serialized `Web2Secrets`
//! - `compute_secrets`: composite header key → serialized `StoredComputeSecret`
//! - `compute_secret_counts`: `app|role` → maximum secret count
//! - `tee_challenges`: lowercase chain task id → serialized `StoredTeeChallenge`
//!
//! redb allows a single write transaction at a time, so every
//! read-check-write sequence executed inside [`SmsDatabase::insert_if_absent`],
//! [`SmsDatabase::get_or_insert_with`] or [`SmsDatabase::modify`] is atomic
//! with respect to concurrent callers.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

// =============================================================================
// Table Definitions
// =============================================================================

/// Tables holding JSON-encoded records keyed by string.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Web3 secrets: lowercase address → serialized Secret.
pub const WEB3_SECRETS: JsonTable = TableDefinition::new("web3_secrets");

/// Web2 secrets: lowercase owner address → serialized Web2Secrets container.
pub const WEB2_SECRETS: JsonTable = TableDefinition::new("web2_secrets");

/// Compute secrets: `type|address|role|owner|key` → serialized StoredComputeSecret.
pub const COMPUTE_SECRETS: JsonTable = TableDefinition::new("compute_secrets");

/// TEE challenges: lowercase chain task id → serialized StoredTeeChallenge.
pub const TEE_CHALLENGES: JsonTable = TableDefinition::new("tee_challenges");

/// Write-once counters: `app|role` → maximum secret count.
const COMPUTE_SECRET_COUNTS: TableDefinition<&str, u64> =
    TableDefinition::new("compute_secret_counts");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// SmsDatabase
// =============================================================================

/// Embedded ACID store shared by every secret service.
pub struct SmsDatabase {
    db: Database,
}

impl SmsDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WEB3_SECRETS)?;
            let _ = write_txn.open_table(WEB2_SECRETS)?;
            let _ = write_txn.open_table(COMPUTE_SECRETS)?;
            let _ = write_txn.open_table(TEE_CHALLENGES)?;
            let _ = write_txn.open_table(COMPUTE_SECRET_COUNTS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // JSON Records
    // =========================================================================

    /// Look up a single record.
    pub fn get<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> DbResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Whether a record exists under `key`.
    pub fn contains(&self, table: JsonTable, key: &str) -> DbResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        Ok(table.get(key)?.is_some())
    }

    /// Number of records in a table.
    pub fn len(&self, table: JsonTable) -> DbResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        Ok(table.len()?)
    }

    /// Insert `value` only when `key` is vacant.
    ///
    /// Returns `false` (and leaves the stored record untouched) when a record
    /// already exists.
    pub fn insert_if_absent<T: Serialize>(
        &self,
        table: JsonTable,
        key: &str,
        value: &T,
    ) -> DbResult<bool> {
        let json = serde_json::to_vec(value)?;
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(table)?;
            let occupied = table.get(key)?.is_some();
            if !occupied {
                table.insert(key, json.as_slice())?;
            }
            !occupied
        };
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Return the record under `key`, creating it with `create` if vacant.
    ///
    /// Lookup and creation run in one write transaction, so concurrent first
    /// calls for the same key observe a single created value.
    pub fn get_or_insert_with<T, F>(&self, table: JsonTable, key: &str, create: F) -> DbResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> DbResult<T>,
    {
        let write_txn = self.db.begin_write()?;
        let value = {
            let mut table = write_txn.open_table(table)?;
            let existing: Option<T> = match table.get(key)? {
                Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
                None => None,
            };
            match existing {
                Some(value) => value,
                None => {
                    let value = create()?;
                    let json = serde_json::to_vec(&value)?;
                    table.insert(key, json.as_slice())?;
                    value
                }
            }
        };
        write_txn.commit()?;
        Ok(value)
    }

    /// Read-modify-write a single record atomically.
    ///
    /// `apply` receives the current record (if any) and returns the record to
    /// store (`None` leaves the table unchanged) together with a result.
    pub fn modify<T, R, F>(&self, table: JsonTable, key: &str, apply: F) -> DbResult<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> (Option<T>, R),
    {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(table)?;
            let current: Option<T> = match table.get(key)? {
                Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
                None => None,
            };
            let (updated, result) = apply(current);
            if let Some(updated) = updated {
                let json = serde_json::to_vec(&updated)?;
                table.insert(key, json.as_slice())?;
            }
            result
        };
        write_txn.commit()?;
        Ok(result)
    }

    // =========================================================================
    // Write-once Counters
    // =========================================================================

    /// Read a counter.
    pub fn get_counter(&self, key: &str) -> DbResult<Option<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COMPUTE_SECRET_COUNTS)?;
        Ok(table.get(key)?.map(|value| value.value()))
    }

    /// Set a counter only if it was never set. Returns `false` on conflict.
    pub fn insert_counter_if_absent(&self, key: &str, value: u64) -> DbResult<bool> {
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(COMPUTE_SECRET_COUNTS)?;
            let occupied = table.get(key)?.is_some();
            if !occupied {
                table.insert(key, value)?;
            }
            !occupied
        };
        write_txn.commit()?;
        Ok(inserted)
    }
}
