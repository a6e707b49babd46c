// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Maintenance Sweeper
//!
//! Background task that reclaims expired challenges, sessions, and threat
//! entries. Expiry is already enforced on every read; the sweep only frees
//! space.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, like the threat feed
//! refresher.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::authn::{ChallengeManager, SessionIssuer};
use crate::risk::ThreatCache;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub challenges: usize,
    pub sessions: usize,
    pub threats: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.challenges + self.sessions + self.threats
    }
}

pub struct MaintenanceSweeper {
    challenges: Arc<ChallengeManager>,
    sessions: Arc<SessionIssuer>,
    threats: Arc<ThreatCache>,
    interval: Duration,
}

impl MaintenanceSweeper {
    pub fn new(
        challenges: Arc<ChallengeManager>,
        sessions: Arc<SessionIssuer>,
        threats: Arc<ThreatCache>,
    ) -> Self {
        Self {
            challenges,
            sessions,
            threats,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one sweep. Store failures are logged and the rest continues.
    pub fn sweep_once(&self) -> SweepReport {
        let challenges = self.challenges.purge_expired().unwrap_or_else(|e| {
            warn!(error = %e, "Challenge sweep failed");
            0
        });
        let sessions = self.sessions.purge_expired().unwrap_or_else(|e| {
            warn!(error = %e, "Session sweep failed");
            0
        });
        let threats = self.threats.purge_expired();

        SweepReport {
            challenges,
            sessions,
            threats,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Maintenance sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let report = self.sweep_once();
            if report.total() > 0 {
                debug!(
                    challenges = report.challenges,
                    sessions = report.sessions,
                    threats = report.threats,
                    "Maintenance sweep"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Maintenance sweeper shutting down");
    }
}
