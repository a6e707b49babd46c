// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recipient history per wallet.
//!
//! Answers "has this wallet ever confirmed a transfer to this recipient".
//! Written only on confirmation, never at assessment time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::threat::normalize_address;
use crate::store::{key_segment, JsonStoreExt, KeyedStore, StoreResult};

const RECIPIENT_PREFIX: &str = "recipient/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub first_confirmed_at: DateTime<Utc>,
    pub last_confirmed_at: DateTime<Utc>,
    pub count: u64,
}

fn recipient_key(wallet: &str, recipient: &str) -> String {
    format!(
        "{RECIPIENT_PREFIX}{}/{}",
        key_segment(wallet),
        key_segment(&normalize_address(recipient))
    )
}

pub struct RecipientHistory {
    store: Arc<dyn KeyedStore>,
}

impl RecipientHistory {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Prior confirmed transfer from `wallet` to `recipient`.
    ///
    /// An unreadable record counts as "never", which keeps the
    /// first-time-recipient flag on.
    pub fn lookup(&self, wallet: &str, recipient: &str) -> Option<RecipientRecord> {
        match self.store.get_json::<RecipientRecord>(&recipient_key(wallet, recipient)) {
            Ok(record) => record,
            Err(e) => {
                warn!(wallet, error = %e, "Recipient history unreadable");
                None
            }
        }
    }

    pub fn has_confirmed_transfer(&self, wallet: &str, recipient: &str) -> bool {
        self.lookup(wallet, recipient).is_some()
    }

    pub fn record_confirmed(
        &self,
        wallet: &str,
        recipient: &str,
        confirmed_at: DateTime<Utc>,
    ) -> StoreResult<RecipientRecord> {
        let updated = self.store.update_json(
            &recipient_key(wallet, recipient),
            |current: Option<RecipientRecord>| {
                Some(match current {
                    Some(mut record) => {
                        record.count += 1;
                        record.first_confirmed_at = record.first_confirmed_at.min(confirmed_at);
                        record.last_confirmed_at = record.last_confirmed_at.max(confirmed_at);
                        record
                    }
                    None => RecipientRecord {
                        first_confirmed_at: confirmed_at,
                        last_confirmed_at: confirmed_at,
                        count: 1,
                    },
                })
            },
        )?;

        Ok(updated.unwrap_or(RecipientRecord {
            first_confirmed_at: confirmed_at,
            last_confirmed_at: confirmed_at,
            count: 1,
        }))
    }
}
