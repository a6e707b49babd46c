// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Errors on the write side of the risk module.
//!
//! Assessment itself never fails. These cover confirmed-transaction
//! updates, preference changes, and threat-feed refreshes.

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Amount is negative, NaN, or infinite.
    #[error("invalid transaction amount: {0}")]
    InvalidAmount(f64),

    #[error("profile storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    /// Threshold outside (0, 1].
    #[error("risk threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("preference storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ThreatFeedError {
    #[error("threat feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("threat feed returned HTTP {0}")]
    Status(u16),

    #[error("threat feed entry rejected: {0}")]
    InvalidEntry(String),
}
