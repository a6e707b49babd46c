// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Keyed Store
//!
//! Every piece of shared state (challenges, credentials, sessions, behavior
//! profiles, recipient history, risk preferences) lives behind the
//! [`KeyedStore`] trait. Components never hold their own maps.
//!
//! ## Backends
//!
//! - [`MemoryStore`] - process-local, used by tests and single-node dev runs
//! - [`RedbStore`] - embedded ACID file, one write transaction per mutation
//!
//! ## Key Layout
//!
//! ```text
//! challenge/{nonce}                       -> Challenge
//! credential/{credential_id}              -> Credential
//! owner_credential/{owner}/{credential_id} -> ()
//! session/{token_hash}                    -> SessionRecord
//! owner_session/{owner}/{token_hash}      -> ()
//! profile/{owner}                         -> BehaviorProfile
//! recipient/{wallet}/{recipient}          -> RecipientRecord
//! risk_pref/{owner}                       -> RiskPreferences
//! audit/{date}/{micros}-{event_id}         -> AuditEvent
//! ```
//!
//! Values are opaque bytes; [`JsonStoreExt`] layers serde_json on top.

pub mod database;
pub mod error;
pub mod memory;

use serde::{de::DeserializeOwned, Serialize};

pub use database::RedbStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

/// Escape a caller-supplied identifier for use inside a key.
///
/// `/` separates key segments, so it (and the escape byte) are
/// percent-encoded.
pub fn key_segment(raw: &str) -> String {
    raw.replace('%', "%25").replace('/', "%2F")
}

/// Maximum compare-and-swap attempts for one read-modify-write.
const MAX_CAS_ATTEMPTS: usize = 64;

/// Transactional keyed store.
///
/// `compare_and_swap` is the only primitive components use to mutate a
/// record they have read; it must be atomic with respect to every other
/// call on the same key.
pub trait KeyedStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Unconditionally write a value.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Write only if the key is absent. Returns `true` if written.
    fn insert_if_absent(&self, key: &str, value: &[u8]) -> StoreResult<bool>;

    /// Replace `expected` with `new` atomically.
    ///
    /// `expected = None` means "key must be absent"; `new = None` deletes.
    /// Returns `true` if the swap happened.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> StoreResult<bool>;

    /// Remove a key. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;
}

/// Typed JSON helpers over any [`KeyedStore`].
pub trait JsonStoreExt {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>>;

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()>;

    fn insert_json_if_absent<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<bool>;

    /// Read-modify-write a JSON record under compare-and-swap.
    ///
    /// `f` receives the current value (if any) and returns the value to
    /// store, or `None` to leave the record untouched. The closure may run
    /// more than once when another writer races on the same key.
    fn update_json<T, F>(&self, key: &str, f: F) -> StoreResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Option<T>;

    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<(String, T)>>;
}

impl<S: KeyedStore + ?Sized> JsonStoreExt for S {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, &bytes)
    }

    fn insert_json_if_absent<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<bool> {
        let bytes = serde_json::to_vec(value)?;
        self.insert_if_absent(key, &bytes)
    }

    fn update_json<T, F>(&self, key: &str, mut f: F) -> StoreResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Option<T>,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get(key)?;
            let decoded = match &current {
                Some(bytes) => Some(serde_json::from_slice(bytes)?),
                None => None,
            };

            let Some(next) = f(decoded) else {
                return Ok(None);
            };

            let encoded = serde_json::to_vec(&next)?;
            if self.compare_and_swap(key, current.as_deref(), Some(&encoded))? {
                return Ok(Some(next));
            }
            std::thread::yield_now();
        }

        Err(StoreError::Contention(key.to_string()))
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<(String, T)>> {
        self.scan_prefix(prefix)?
            .into_iter()
            .map(|(key, bytes)| Ok((key, serde_json::from_slice(&bytes)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Counter {
        value: u64,
    }

    #[test]
    fn key_segment_escapes_separators() {
        assert_eq!(key_segment("user_1"), "user_1");
        assert_eq!(key_segment("a/b%c"), "a%2Fb%25c");
    }

    #[test]
    fn update_json_creates_then_mutates() {
        let store = MemoryStore::new();

        let created = store
            .update_json("c", |cur: Option<Counter>| {
                Some(Counter {
                    value: cur.map_or(1, |c| c.value + 1),
                })
            })
            .unwrap();
        assert_eq!(created, Some(Counter { value: 1 }));

        store
            .update_json("c", |cur: Option<Counter>| {
                cur.map(|c| Counter { value: c.value + 1 })
            })
            .unwrap();
        assert_eq!(store.get_json::<Counter>("c").unwrap(), Some(Counter { value: 2 }));
    }

    #[test]
    fn update_json_none_leaves_record() {
        let store = MemoryStore::new();
        store.put_json("c", &Counter { value: 7 }).unwrap();

        let result = store.update_json("c", |_: Option<Counter>| None).unwrap();
        assert!(result.is_none());
        assert_eq!(store.get_json::<Counter>("c").unwrap(), Some(Counter { value: 7 }));
    }

    #[test]
    fn concurrent_updates_on_one_key_are_serialized() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .update_json("shared", |cur: Option<Counter>| {
                                Some(Counter {
                                    value: cur.map_or(1, |c| c.value + 1),
                                })
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            store.get_json::<Counter>("shared").unwrap(),
            Some(Counter { value: 200 })
        );
    }
}
