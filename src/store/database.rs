// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded keyed store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `records`: key → opaque value bytes
//!
//! All namespaces share one table; the key prefix (see [`super`]) selects
//! the namespace. Each mutation runs in its own write transaction, and redb
//! serializes write transactions, so compare-and-swap is atomic.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{KeyedStore, StoreResult};

/// Primary table: key → value bytes.
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Durable keyed store.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RECORDS)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Opened trust store");
        Ok(Self { db })
    }
}

impl KeyedStore for RedbStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(RECORDS)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn insert_if_absent(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        self.compare_and_swap(key, None, Some(value))
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let swapped = {
            let mut table = write_txn.open_table(RECORDS)?;

            // Copy the current value out before mutating the table
            let current = table.get(key)?.map(|v| v.value().to_vec());

            if current.as_deref() == expected {
                match new {
                    Some(value) => {
                        table.insert(key, value)?;
                    }
                    None => {
                        table.remove(key)?;
                    }
                }
                true
            } else {
                false
            }
        };

        if swapped {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(swapped)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(RECORDS)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS)?;

        let mut results = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_string(), value.value().to_vec()));
        }
        Ok(results)
    }
}
