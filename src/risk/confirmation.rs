// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Confirmation Listener
//!
//! The only writer of behavior profiles and recipient history. Consumes
//! externally confirmed transactions from a channel and folds each one
//! into the owner's baseline.
//!
//! ## Shutdown
//!
//! Stops when the sender side closes or the `CancellationToken` fires.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ProfileError;
use super::history::RecipientHistory;
use super::profile::{BehaviorProfile, ProfileStore};

/// Notification that a transaction has been confirmed on-chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub owner: String,
    pub wallet: String,
    pub amount: f64,
    pub counterparty: String,
    pub confirmed_at: DateTime<Utc>,
}

pub struct ConfirmationListener {
    profiles: Arc<ProfileStore>,
    history: Arc<RecipientHistory>,
}

impl ConfirmationListener {
    pub fn new(profiles: Arc<ProfileStore>, history: Arc<RecipientHistory>) -> Self {
        Self { profiles, history }
    }

    /// Apply one confirmation.
    ///
    /// Recipient history is written before the profile. Re-recording a
    /// known recipient changes nothing the engine reads, so retrying after
    /// a failed profile write cannot double-count the profile.
    pub fn apply(&self, tx: &ConfirmedTransaction) -> Result<BehaviorProfile, ProfileError> {
        if !tx.amount.is_finite() || tx.amount < 0.0 {
            return Err(ProfileError::InvalidAmount(tx.amount));
        }

        self.history
            .record_confirmed(&tx.wallet, &tx.counterparty, tx.confirmed_at)?;
        self.profiles
            .update_after_confirmed_transaction(
                &tx.owner,
                tx.amount,
                &tx.counterparty,
                tx.confirmed_at,
            )
            .inspect_err(|e| {
                warn!(
                    owner = %tx.owner,
                    wallet = %tx.wallet,
                    error = %e,
                    "Recipient recorded but profile not updated"
                )
            })
    }

    /// Consume confirmations until the channel closes or shutdown fires.
    ///
    /// ```rust,ignore
    /// tokio::spawn(listener.run(rx, shutdown.clone()));
    /// ```
    pub async fn run(
        self,
        mut confirmations: mpsc::Receiver<ConfirmedTransaction>,
        shutdown: CancellationToken,
    ) {
        info!("Confirmation listener starting");

        loop {
            let tx = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = confirmations.recv() => match next {
                    Some(tx) => tx,
                    None => break,
                },
            };

            match self.apply(&tx) {
                Ok(profile) => debug!(
                    owner = %tx.owner,
                    wallet = %tx.wallet,
                    samples = profile.samples.len(),
                    "Applied confirmed transaction"
                ),
                Err(e) => warn!(
                    owner = %tx.owner,
                    wallet = %tx.wallet,
                    error = %e,
                    "Failed to apply confirmed transaction"
                ),
            }
        }

        info!("Confirmation listener shutting down");
    }
}
