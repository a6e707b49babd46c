// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-user risk preferences.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::PreferenceError;
use crate::clock::Clock;
use crate::store::{key_segment, JsonStoreExt, KeyedStore};

/// Threshold used when a user has not chosen one.
pub const DEFAULT_RISK_THRESHOLD: f64 = 0.5;

const PREFERENCE_PREFIX: &str = "risk_pref/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPreferences {
    /// Score at or above which transactions are blocked.
    pub risk_threshold: f64,
    pub updated_at: DateTime<Utc>,
}

pub fn validate_threshold(threshold: f64) -> Result<f64, PreferenceError> {
    if threshold.is_finite() && threshold > 0.0 && threshold <= 1.0 {
        Ok(threshold)
    } else {
        Err(PreferenceError::InvalidThreshold(threshold))
    }
}

fn preference_key(owner: &str) -> String {
    format!("{PREFERENCE_PREFIX}{}", key_segment(owner))
}

pub struct PreferenceStore {
    store: Arc<dyn KeyedStore>,
    clock: Arc<dyn Clock>,
    default_threshold: f64,
}

impl PreferenceStore {
    pub fn new(
        store: Arc<dyn KeyedStore>,
        clock: Arc<dyn Clock>,
        default_threshold: f64,
    ) -> Result<Self, PreferenceError> {
        Ok(Self {
            store,
            clock,
            default_threshold: validate_threshold(default_threshold)?,
        })
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    /// The owner's threshold, falling back to the default when unset,
    /// unreadable, or out of range.
    pub fn threshold(&self, owner: &str) -> f64 {
        match self.store.get_json::<RiskPreferences>(&preference_key(owner)) {
            Ok(Some(prefs)) => validate_threshold(prefs.risk_threshold).unwrap_or_else(|_| {
                warn!(owner, threshold = prefs.risk_threshold, "Stored risk threshold out of range");
                self.default_threshold
            }),
            Ok(None) => self.default_threshold,
            Err(e) => {
                warn!(owner, error = %e, "Risk preferences unreadable, using default");
                self.default_threshold
            }
        }
    }

    pub fn set_threshold(&self, owner: &str, threshold: f64) -> Result<(), PreferenceError> {
        let risk_threshold = validate_threshold(threshold)?;
        self.store.put_json(
            &preference_key(owner),
            &RiskPreferences {
                risk_threshold,
                updated_at: self.clock.now(),
            },
        )?;
        info!(owner, risk_threshold, "Risk threshold updated");
        Ok(())
    }
}
