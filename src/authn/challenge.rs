// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-use ceremony challenges.
//!
//! ## Lifecycle
//!
//! ```text
//! ISSUED ──consume──▶ CONSUMED   (terminal)
//!    └────ttl────▶ EXPIRED       (terminal, checked lazily)
//! ```
//!
//! Consumption is a compare-and-swap on the stored record, so under
//! concurrent attempts on one nonce exactly one caller wins and every other
//! caller observes `AlreadyConsumed`.
//!
//! A consumed record keeps reporting `AlreadyConsumed` past its expiry
//! until [`ChallengeManager::purge_expired`] deletes it; after that a
//! replay reports `NotFound`. Either way the replay is rejected.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::ChallengeError;
use crate::clock::Clock;
use crate::store::{KeyedStore, StoreError};

/// Default challenge lifetime in seconds.
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 60;

/// Raw nonce length in bytes.
pub const CHALLENGE_BYTES: usize = 32;

const CHALLENGE_PREFIX: &str = "challenge/";

/// Which ceremony a challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyPurpose {
    Register,
    Authenticate,
}

impl std::fmt::Display for CeremonyPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CeremonyPurpose::Register => write!(f, "register"),
            CeremonyPurpose::Authenticate => write!(f, "authenticate"),
        }
    }
}

/// Stored challenge record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Challenge {
    /// Base64url (unpadded) encoding of the random nonce.
    pub value: String,
    pub purpose: CeremonyPurpose,
    /// Owner the ceremony is bound to, if known at issuance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl Challenge {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What the winner of a consumption learns about the challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMeta {
    pub value: String,
    pub purpose: CeremonyPurpose,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn challenge_key(value: &str) -> String {
    format!("{CHALLENGE_PREFIX}{value}")
}

/// Issues and consumes challenges against the keyed store.
pub struct ChallengeManager {
    store: Arc<dyn KeyedStore>,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
    ttl: Duration,
}

impl ChallengeManager {
    pub fn new(store: Arc<dyn KeyedStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            rng: SystemRandom::new(),
            ttl: Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a fresh nonce and persist it.
    pub fn issue(
        &self,
        purpose: CeremonyPurpose,
        owner: Option<&str>,
    ) -> Result<Challenge, ChallengeError> {
        let mut nonce = [0u8; CHALLENGE_BYTES];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| ChallengeError::Randomness)?;

        let now = self.clock.now();
        let challenge = Challenge {
            value: Base64UrlUnpadded::encode_string(&nonce),
            purpose,
            owner: owner.map(str::to_string),
            created_at: now,
            expires_at: now + self.ttl,
            consumed: false,
        };

        let bytes = serde_json::to_vec(&challenge).map_err(StoreError::from)?;
        if !self
            .store
            .insert_if_absent(&challenge_key(&challenge.value), &bytes)?
        {
            // 256-bit nonce collision; never reuse an existing record
            warn!("Challenge nonce collision");
            return Err(ChallengeError::Randomness);
        }

        debug!(%purpose, owner = ?challenge.owner, "Issued challenge");
        Ok(challenge)
    }

    /// Atomically consume a challenge.
    ///
    /// A consumed challenge reports `AlreadyConsumed` even after it has
    /// also expired; an unconsumed one past its expiry reports `Expired`.
    pub fn consume(&self, value: &str) -> Result<ChallengeMeta, ChallengeError> {
        let key = challenge_key(value);

        loop {
            let Some(current) = self.store.get(&key)? else {
                return Err(ChallengeError::NotFound);
            };
            let mut challenge: Challenge =
                serde_json::from_slice(&current).map_err(StoreError::from)?;

            if challenge.consumed {
                return Err(ChallengeError::AlreadyConsumed);
            }
            if challenge.is_expired_at(self.clock.now()) {
                return Err(ChallengeError::Expired);
            }

            challenge.consumed = true;
            let next = serde_json::to_vec(&challenge).map_err(StoreError::from)?;

            if self.store.compare_and_swap(&key, Some(&current), Some(&next))? {
                info!(purpose = %challenge.purpose, "Challenge consumed");
                return Ok(ChallengeMeta {
                    value: challenge.value,
                    purpose: challenge.purpose,
                    owner: challenge.owner,
                    created_at: challenge.created_at,
                });
            }
            // Lost the race; re-read and report what the winner left behind
        }
    }

    /// Delete expired records. Returns how many were removed.
    ///
    /// Reclaims space only; expiry is enforced at consumption.
    pub fn purge_expired(&self) -> Result<usize, ChallengeError> {
        let now = self.clock.now();
        let mut removed = 0;

        for (key, bytes) in self.store.scan_prefix(CHALLENGE_PREFIX)? {
            let expired = match serde_json::from_slice::<Challenge>(&bytes) {
                Ok(challenge) => challenge.is_expired_at(now),
                Err(_) => true,
            };
            if expired && self.store.compare_and_swap(&key, Some(&bytes), None)? {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "Purged expired challenges");
        }
        Ok(removed)
    }
}
