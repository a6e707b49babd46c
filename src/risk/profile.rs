// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Behavior profiles.
//!
//! A profile is the rolling baseline of one owner's confirmed transactions:
//! average amount and daily frequency over the trailing 30 days, plus the
//! owner's most frequent counterparties.
//!
//! Profiles are read by the risk engine and written only by
//! [`ProfileStore::update_after_confirmed_transaction`]. Writes are a
//! compare-and-swap on `profile/{owner}`, so updates for one owner are
//! serialized and updates for different owners never touch the same key.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::ProfileError;
use super::threat::normalize_address;
use crate::clock::Clock;
use crate::store::{key_segment, JsonStoreExt, KeyedStore};

/// Trailing window for the baseline.
pub const PROFILE_WINDOW_DAYS: i64 = 30;

/// Samples retained per profile.
pub const MAX_WINDOW_SAMPLES: usize = 10_000;

/// Counterparties tracked per profile.
pub const TOP_COUNTERPARTIES: usize = 10;

const PROFILE_PREFIX: &str = "profile/";

/// One confirmed transaction inside the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountSample {
    pub at: DateTime<Utc>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyStat {
    pub address: String,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub owner: String,
    /// Mean amount over the window. Zero means no baseline.
    pub average_amount: f64,
    /// Confirmed transactions per day over the observed part of the window.
    pub frequency: f64,
    pub top_counterparties: Vec<CounterpartyStat>,
    /// Window samples, oldest first.
    #[serde(default)]
    pub samples: Vec<AmountSample>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl BehaviorProfile {
    /// Zero baseline.
    pub fn empty(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            average_amount: 0.0,
            frequency: 0.0,
            top_counterparties: Vec::new(),
            samples: Vec::new(),
            last_updated: None,
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.average_amount > 0.0
    }

    /// Confirmed transactions in `(now - window, now]`.
    pub fn recent_count(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let since = now - window;
        self.samples
            .iter()
            .filter(|s| s.at > since && s.at <= now)
            .count()
    }

    pub fn is_frequent_counterparty(&self, address: &str) -> bool {
        let address = normalize_address(address);
        self.top_counterparties.iter().any(|c| c.address == address)
    }

    fn record(&mut self, amount: f64, counterparty: &str, confirmed_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.samples.push(AmountSample {
            at: confirmed_at,
            amount,
        });
        self.samples.sort_by_key(|s| s.at);
        self.prune(now);
        if self.samples.len() > MAX_WINDOW_SAMPLES {
            let excess = self.samples.len() - MAX_WINDOW_SAMPLES;
            self.samples.drain(..excess);
        }

        self.recompute(now);
        self.record_counterparty(counterparty, confirmed_at);
        self.last_updated = Some(now);
    }

    /// The baseline as of `now`: samples that have aged out of the window
    /// are dropped and the average and frequency recomputed from the rest.
    pub fn as_of(&self, now: DateTime<Utc>) -> Self {
        let mut view = self.clone();
        view.prune(now);
        view.recompute(now);
        view
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let window_start = now - Duration::days(PROFILE_WINDOW_DAYS);
        self.samples.retain(|s| s.at > window_start);
    }

    fn recompute(&mut self, now: DateTime<Utc>) {
        let Some(oldest) = self.samples.first() else {
            self.average_amount = 0.0;
            self.frequency = 0.0;
            return;
        };

        let count = self.samples.len() as f64;
        self.average_amount = self.samples.iter().map(|s| s.amount).sum::<f64>() / count;

        let observed_days = ((now - oldest.at).num_seconds() as f64 / 86_400.0)
            .clamp(1.0, PROFILE_WINDOW_DAYS as f64);
        self.frequency = count / observed_days;
    }

    fn record_counterparty(&mut self, counterparty: &str, seen_at: DateTime<Utc>) {
        let address = normalize_address(counterparty);
        if let Some(stat) = self
            .top_counterparties
            .iter_mut()
            .find(|c| c.address == address)
        {
            stat.count += 1;
            stat.last_seen = stat.last_seen.max(seen_at);
            return;
        }

        if self.top_counterparties.len() >= TOP_COUNTERPARTIES {
            // Least frequent goes; ties go to the least recently seen
            if let Some(evict) = self
                .top_counterparties
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| (c.count, c.last_seen))
                .map(|(i, _)| i)
            {
                self.top_counterparties.swap_remove(evict);
            }
        }
        self.top_counterparties.push(CounterpartyStat {
            address,
            count: 1,
            last_seen: seen_at,
        });
    }
}

fn profile_key(owner: &str) -> String {
    format!("{PROFILE_PREFIX}{}", key_segment(owner))
}

/// Keyed-store backed profile access.
pub struct ProfileStore {
    store: Arc<dyn KeyedStore>,
    clock: Arc<dyn Clock>,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn KeyedStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current profile, or a zero baseline when absent or unreadable.
    ///
    /// The stored baseline was computed at the last confirmation; what is
    /// returned is recomputed over the window ending now. Nothing is
    /// written back.
    pub fn get(&self, owner: &str) -> BehaviorProfile {
        match self.store.get_json::<BehaviorProfile>(&profile_key(owner)) {
            Ok(Some(profile)) => profile.as_of(self.clock.now()),
            Ok(None) => BehaviorProfile::empty(owner),
            Err(e) => {
                warn!(owner, error = %e, "Profile unreadable, using zero baseline");
                BehaviorProfile::empty(owner)
            }
        }
    }

    /// Fold a confirmed transaction into the owner's baseline.
    pub fn update_after_confirmed_transaction(
        &self,
        owner: &str,
        amount: f64,
        counterparty: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<BehaviorProfile, ProfileError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ProfileError::InvalidAmount(amount));
        }

        let now = self.clock.now();
        let updated = self
            .store
            .update_json(&profile_key(owner), |current: Option<BehaviorProfile>| {
                let mut profile = current.unwrap_or_else(|| BehaviorProfile::empty(owner));
                profile.record(amount, counterparty, confirmed_at, now);
                Some(profile)
            })?
            .unwrap_or_else(|| BehaviorProfile::empty(owner));

        debug!(
            owner,
            average_amount = updated.average_amount,
            frequency = updated.frequency,
            samples = updated.samples.len(),
            "Profile updated"
        );
        Ok(updated)
    }
}
