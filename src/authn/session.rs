// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session issuance and validation.
//!
//! Tokens are 32 random bytes handed to the client once. The server keeps
//! only `HMAC-SHA256(pepper, token)`, so a copy of the store cannot be
//! replayed into a live session without the pepper.
//!
//! ## Storage Layout
//!
//! ```text
//! session/{token_hash}                -> SessionRecord
//! owner_session/{owner}/{token_hash}  -> owner index entry
//! ```

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use super::error::SessionError;
use crate::clock::Clock;
use crate::store::{key_segment, JsonStoreExt, KeyedStore};

/// Default session lifetime in seconds (24h).
pub const DEFAULT_SESSION_TTL_SECS: i64 = 86_400;

/// Minimum pepper length accepted for token hashing.
pub const MIN_PEPPER_BYTES: usize = 32;

const TOKEN_BYTES: usize = 32;
const SESSION_PREFIX: &str = "session/";
const OWNER_INDEX_PREFIX: &str = "owner_session/";

type HmacSha256 = Hmac<Sha256>;

/// Server-side session record. Never contains the raw token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token_hash: String,
    pub owner: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A freshly issued session. `token` is shown to the client exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub token: String,
    pub token_hash: String,
    pub owner: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OwnerIndexEntry {
    token_hash: String,
}

fn session_key(token_hash: &str) -> String {
    format!("{SESSION_PREFIX}{token_hash}")
}

fn owner_prefix(owner: &str) -> String {
    format!("{OWNER_INDEX_PREFIX}{}/", key_segment(owner))
}

fn owner_index_key(owner: &str, token_hash: &str) -> String {
    format!("{}{token_hash}", owner_prefix(owner))
}

/// Turns verified identities into revocable, bounded-lifetime sessions.
pub struct SessionIssuer {
    store: Arc<dyn KeyedStore>,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
    mac: HmacSha256,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(
        store: Arc<dyn KeyedStore>,
        clock: Arc<dyn Clock>,
        pepper: &[u8],
    ) -> Result<Self, SessionError> {
        if pepper.len() < MIN_PEPPER_BYTES {
            return Err(SessionError::WeakPepper(MIN_PEPPER_BYTES));
        }
        let mac = HmacSha256::new_from_slice(pepper)
            .map_err(|_| SessionError::WeakPepper(MIN_PEPPER_BYTES))?;

        Ok(Self {
            store,
            clock,
            rng: SystemRandom::new(),
            mac,
            ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// One-way hash of a raw token, as used for storage and revocation.
    pub fn hash_token(&self, token: &str) -> Result<String, SessionError> {
        let raw = Base64UrlUnpadded::decode_vec(token).map_err(|_| SessionError::Malformed)?;
        if raw.len() != TOKEN_BYTES {
            return Err(SessionError::Malformed);
        }
        Ok(self.hash_raw(&raw))
    }

    fn hash_raw(&self, raw: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(raw);
        Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes())
    }

    pub fn issue(&self, owner: &str) -> Result<IssuedSession, SessionError> {
        let mut raw = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut raw)
            .map_err(|_| SessionError::Randomness)?;

        let now = self.clock.now();
        let token_hash = self.hash_raw(&raw);
        let record = SessionRecord {
            token_hash: token_hash.clone(),
            owner: owner.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
            revoked: false,
            revoked_at: None,
        };

        if !self
            .store
            .insert_json_if_absent(&session_key(&token_hash), &record)?
        {
            return Err(SessionError::Randomness);
        }
        self.store.put_json(
            &owner_index_key(owner, &token_hash),
            &OwnerIndexEntry {
                token_hash: token_hash.clone(),
            },
        )?;

        info!(owner, expires_at = %record.expires_at, "Session issued");
        Ok(IssuedSession {
            token: Base64UrlUnpadded::encode_string(&raw),
            token_hash,
            owner: record.owner,
            issued_at: now,
            expires_at: record.expires_at,
        })
    }

    /// Resolve a raw token to its owner.
    pub fn validate(&self, token: &str) -> Result<String, SessionError> {
        let token_hash = self.hash_token(token)?;
        let record: SessionRecord = self
            .store
            .get_json(&session_key(&token_hash))?
            .ok_or(SessionError::Unknown)?;

        if record.revoked {
            return Err(SessionError::Revoked);
        }
        if record.is_expired_at(self.clock.now()) {
            return Err(SessionError::Expired);
        }
        Ok(record.owner)
    }

    /// Revoke by token hash. Revoking an unknown or already revoked
    /// session is a no-op.
    pub fn revoke(&self, token_hash: &str) -> Result<(), SessionError> {
        let now = self.clock.now();
        let updated = self
            .store
            .update_json(&session_key(token_hash), |current: Option<SessionRecord>| {
                let mut record = current?;
                if record.revoked {
                    return None;
                }
                record.revoked = true;
                record.revoked_at = Some(now);
                Some(record)
            })?;

        if let Some(record) = updated {
            info!(owner = %record.owner, "Session revoked");
        }
        Ok(())
    }

    /// Revoke every session of `owner`. Returns how many were live.
    pub fn revoke_all_for_owner(&self, owner: &str) -> Result<usize, SessionError> {
        let entries = self
            .store
            .scan_json::<OwnerIndexEntry>(&owner_prefix(owner))?;

        let mut revoked = 0;
        for (_, entry) in entries {
            let live = self
                .store
                .get_json::<SessionRecord>(&session_key(&entry.token_hash))?
                .is_some_and(|r| !r.revoked);
            if live {
                self.revoke(&entry.token_hash)?;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// Delete expired session records and their owner index entries.
    pub fn purge_expired(&self) -> Result<usize, SessionError> {
        let now = self.clock.now();
        let mut removed = 0;

        for (key, bytes) in self.store.scan_prefix(SESSION_PREFIX)? {
            let Ok(record) = serde_json::from_slice::<SessionRecord>(&bytes) else {
                continue;
            };
            if record.is_expired_at(now) && self.store.compare_and_swap(&key, Some(&bytes), None)? {
                self.store
                    .delete(&owner_index_key(&record.owner, &record.token_hash))?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    const PEPPER: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn issuer() -> (SessionIssuer, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let issuer = SessionIssuer::new(store.clone(), clock.clone(), PEPPER).unwrap();
        (issuer, store, clock)
    }

    #[test]
    fn issue_then_validate() {
        let (issuer, _, _) = issuer();
        let session = issuer.issue("user_1").unwrap();
        assert_eq!(issuer.validate(&session.token).unwrap(), "user_1");
        assert_eq!(session.expires_at - session.issued_at, Duration::hours(24));
    }

    #[test]
    fn raw_token_never_stored() {
        let (issuer, store, _) = issuer();
        let session = issuer.issue("user_1").unwrap();

        for (key, value) in store.scan_prefix("").unwrap() {
            assert!(!key.contains(&session.token));
            assert!(!String::from_utf8_lossy(&value).contains(&session.token));
        }
    }

    #[test]
    fn expired_session_is_rejected() {
        let (issuer, _, clock) = issuer();
        let session = issuer.issue("user_1").unwrap();
        clock.advance(Duration::hours(24));
        assert!(matches!(
            issuer.validate(&session.token),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn revoke_is_idempotent() {
        let (issuer, _, _) = issuer();
        let session = issuer.issue("user_1").unwrap();

        issuer.revoke(&session.token_hash).unwrap();
        issuer.revoke(&session.token_hash).unwrap();
        issuer.revoke("never-issued").unwrap();

        assert!(matches!(
            issuer.validate(&session.token),
            Err(SessionError::Revoked)
        ));
    }

    #[test]
    fn malformed_and_unknown_tokens() {
        let (issuer, _, _) = issuer();
        assert!(matches!(issuer.validate("!!!"), Err(SessionError::Malformed)));
        assert!(matches!(issuer.validate("AAAA"), Err(SessionError::Malformed)));

        let unknown = Base64UrlUnpadded::encode_string(&[1u8; TOKEN_BYTES]);
        assert!(matches!(issuer.validate(&unknown), Err(SessionError::Unknown)));
    }

    #[test]
    fn different_pepper_cannot_validate() {
        let (issuer, store, clock) = issuer();
        let session = issuer.issue("user_1").unwrap();

        let other = SessionIssuer::new(store, clock, &[9u8; 32]).unwrap();
        assert!(matches!(
            other.validate(&session.token),
            Err(SessionError::Unknown)
        ));
    }

    #[test]
    fn revoke_all_for_owner_is_scoped() {
        let (issuer, _, _) = issuer();
        let a = issuer.issue("user_1").unwrap();
        let b = issuer.issue("user_1").unwrap();
        let c = issuer.issue("user_2").unwrap();

        assert_eq!(issuer.revoke_all_for_owner("user_1").unwrap(), 2);
        assert!(issuer.validate(&a.token).is_err());
        assert!(issuer.validate(&b.token).is_err());
        assert_eq!(issuer.validate(&c.token).unwrap(), "user_2");
    }

    #[test]
    fn purge_removes_only_expired() {
        let (issuer, store, clock) = issuer();
        issuer.issue("user_1").unwrap();
        clock.advance(Duration::hours(23));
        let fresh = issuer.issue("user_1").unwrap();
        clock.advance(Duration::hours(2));

        assert_eq!(issuer.purge_expired().unwrap(), 1);
        assert_eq!(store.scan_prefix(SESSION_PREFIX).unwrap().len(), 1);
        assert_eq!(store.scan_prefix(OWNER_INDEX_PREFIX).unwrap().len(), 1);
        assert_eq!(issuer.validate(&fresh.token).unwrap(), "user_1");
    }

    #[test]
    fn short_pepper_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        assert!(matches!(
            SessionIssuer::new(store, clock, b"short"),
            Err(SessionError::WeakPepper(32))
        ));
    }
}
