// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential registry.
//!
//! ## Storage Layout
//!
//! ```text
//! credential/{credential_id}                -> Credential
//! owner_credential/{owner}/{credential_id}  -> owner index entry
//! ```
//!
//! Credentials are created once and never overwritten by a later
//! registration. After creation only the signature counter and
//! `last_used_at` change, through [`CredentialRegistry::record_use`], which
//! re-checks counter monotonicity inside the compare-and-swap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::crypto::PublicKey;
use super::error::CredentialError;
use crate::store::{key_segment, JsonStoreExt, KeyedStore};

const CREDENTIAL_PREFIX: &str = "credential/";
const OWNER_INDEX_PREFIX: &str = "owner_credential/";

/// Authenticator transport hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Hybrid,
}

/// A registered public-key credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Base64url credential id.
    pub id: String,
    /// Owning user.
    pub owner: String,
    pub public_key: PublicKey,
    /// Last accepted signature counter.
    pub counter: u32,
    #[serde(default)]
    pub transports: Vec<Transport>,
    /// Attestation format used at registration (`none`, `packed`).
    pub attestation_format: String,
    /// Whether the authenticator verified the user at registration.
    pub user_verified: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Owner index entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OwnerIndexEntry {
    credential_id: String,
}

fn credential_key(id: &str) -> String {
    format!("{CREDENTIAL_PREFIX}{}", key_segment(id))
}

fn owner_prefix(owner: &str) -> String {
    format!("{OWNER_INDEX_PREFIX}{}/", key_segment(owner))
}

fn owner_index_key(owner: &str, id: &str) -> String {
    format!("{}{}", owner_prefix(owner), key_segment(id))
}

/// Persistent per-user credential store.
pub struct CredentialRegistry {
    store: Arc<dyn KeyedStore>,
}

impl CredentialRegistry {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, id: &str) -> Result<Credential, CredentialError> {
        self.store
            .get_json(&credential_key(id))?
            .ok_or(CredentialError::NotFound)
    }

    /// Persist a new credential. Fails if the id is already taken.
    pub fn insert(&self, credential: &Credential) -> Result<(), CredentialError> {
        if !self
            .store
            .insert_json_if_absent(&credential_key(&credential.id), credential)?
        {
            return Err(CredentialError::AlreadyRegistered);
        }

        self.store.put_json(
            &owner_index_key(&credential.owner, &credential.id),
            &OwnerIndexEntry {
                credential_id: credential.id.clone(),
            },
        )?;
        Ok(())
    }

    /// All credentials owned by `owner`, oldest first.
    pub fn list_for_owner(&self, owner: &str) -> Result<Vec<Credential>, CredentialError> {
        let entries = self.store.scan_json::<OwnerIndexEntry>(&owner_prefix(owner))?;

        let mut credentials = Vec::with_capacity(entries.len());
        for (_, entry) in entries {
            match self.get(&entry.credential_id) {
                Ok(credential) if credential.owner == owner => credentials.push(credential),
                Ok(_) | Err(CredentialError::NotFound) => {
                    tracing::warn!(
                        credential_id = %entry.credential_id,
                        "Stale owner index entry"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        credentials.sort_by_key(|c| c.created_at);
        Ok(credentials)
    }

    /// Delete a credential owned by `owner`.
    pub fn remove(&self, owner: &str, id: &str) -> Result<(), CredentialError> {
        let credential = self.get(id)?;
        if credential.owner != owner {
            return Err(CredentialError::OwnerMismatch);
        }
        self.store.delete(&credential_key(id))?;
        self.store.delete(&owner_index_key(owner, id))?;
        Ok(())
    }

    /// Advance the counter and stamp `last_used_at`.
    ///
    /// The monotonicity check runs again inside the compare-and-swap so two
    /// racing assertions cannot both move the counter.
    pub fn record_use(
        &self,
        id: &str,
        counter: u32,
        used_at: DateTime<Utc>,
    ) -> Result<Credential, CredentialError> {
        let mut regression = None;
        let updated = self
            .store
            .update_json(&credential_key(id), |current: Option<Credential>| {
                let mut credential = current?;
                if counter <= credential.counter {
                    regression = Some(credential.counter);
                    return None;
                }
                regression = None;
                credential.counter = counter;
                credential.last_used_at = Some(used_at);
                Some(credential)
            })?;

        match (updated, regression) {
            (Some(credential), _) => Ok(credential),
            (None, Some(stored)) => Err(CredentialError::CounterRegression {
                stored,
                received: counter,
            }),
            (None, None) => Err(CredentialError::NotFound),
        }
    }
}
