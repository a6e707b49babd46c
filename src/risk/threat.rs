// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local cache of known-bad addresses and domains.
//!
//! Lookups only ever read local state: a miss, an expired entry, and an
//! unavailable feed all look the same ("unknown"). Entries are stored as
//! `Arc<ThreatEntry>` and replaced whole, so a reader never sees a
//! half-written entry. Reads use `peek` under the shared lock and do not
//! reorder the LRU.
//!
//! When the cache is full, an expired or inactive entry makes room before
//! any live one does. Displacing a live entry is logged at `warn` and
//! counted in [`ThreatCache::displaced_live`].

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::clock::Clock;

/// Default entry lifetime after a refresh.
pub const DEFAULT_ENTRY_TTL_SECS: i64 = 86_400;

/// Default number of cached entries.
pub const DEFAULT_CAPACITY: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatKind {
    Address,
    Domain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatCategory {
    Phishing,
    Scam,
    Drainer,
    Sanctioned,
    Malware,
    #[serde(other)]
    Other,
}

/// Indicator as delivered by a feed, before expiry is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatIndicator {
    pub kind: ThreatKind,
    pub value: String,
    pub category: ThreatCategory,
    pub source: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Cached entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatEntry {
    pub kind: ThreatKind,
    /// Normalized value.
    pub value: String,
    pub category: ThreatCategory,
    pub source: String,
    pub active: bool,
    pub refreshed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ThreatEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lowercase and trim an on-chain address.
pub fn normalize_address(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Reduce a domain or URL to its lowercase host.
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let host = Url::parse(trimmed)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

pub fn normalize(kind: ThreatKind, raw: &str) -> String {
    match kind {
        ThreatKind::Address => normalize_address(raw),
        ThreatKind::Domain => normalize_domain(raw),
    }
}

type CacheKey = (ThreatKind, String);

pub struct ThreatCache {
    entries: RwLock<LruCache<CacheKey, Arc<ThreatEntry>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    displaced_live: AtomicU64,
}

impl ThreatCache {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            clock,
            ttl: Duration::seconds(DEFAULT_ENTRY_TTL_SECS),
            displaced_live: AtomicU64::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Live entry for `(kind, value)`, if any.
    pub fn lookup(&self, kind: ThreatKind, value: &str) -> Option<Arc<ThreatEntry>> {
        let key = (kind, normalize(kind, value));
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => {
                warn!("Threat cache lock poisoned, treating lookup as unknown");
                return None;
            }
        };
        let entry = entries.peek(&key)?;
        if entry.is_expired_at(self.clock.now()) {
            return None;
        }
        Some(Arc::clone(entry))
    }

    /// Whether `value` is an active, unexpired entry.
    pub fn is_listed(&self, kind: ThreatKind, value: &str) -> bool {
        self.lookup(kind, value).is_some_and(|entry| entry.active)
    }

    /// Insert or replace an entry, expiring `ttl` after now.
    pub fn upsert(&self, indicator: ThreatIndicator) {
        let refreshed_at = self.clock.now();
        self.upsert_at(indicator, refreshed_at);
    }

    /// Insert or replace an entry refreshed at `refreshed_at`.
    pub fn upsert_at(&self, indicator: ThreatIndicator, refreshed_at: DateTime<Utc>) {
        let value = normalize(indicator.kind, &indicator.value);
        let entry = Arc::new(ThreatEntry {
            kind: indicator.kind,
            value: value.clone(),
            category: indicator.category,
            source: indicator.source,
            active: indicator.active,
            refreshed_at,
            expires_at: refreshed_at + self.ttl,
        });

        let key = (indicator.kind, value);
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.write() else {
            warn!("Threat cache lock poisoned, dropping upsert");
            return;
        };

        if !entries.contains(&key) && entries.len() >= entries.cap().get() {
            // Least recently refreshed dead entry first
            let dead = entries
                .iter()
                .rev()
                .find(|(_, e)| !e.active || e.is_expired_at(now))
                .map(|(k, _)| k.clone());
            if let Some(dead) = dead {
                entries.pop(&dead);
            }
        }

        if let Some((evicted_key, evicted)) = entries.push(key.clone(), entry) {
            if evicted_key != key && evicted.active && !evicted.is_expired_at(now) {
                self.displaced_live.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind = ?evicted_key.0,
                    value = %evicted_key.1,
                    capacity = entries.cap().get(),
                    "Threat cache full, live entry displaced"
                );
            }
        }
    }

    /// Live, active entries pushed out by capacity since startup.
    pub fn displaced_live(&self) -> u64 {
        self.displaced_live.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.entries.read().map(|e| e.cap().get()).unwrap_or(0)
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
