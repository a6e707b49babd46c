// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared handles to every trust-boundary component, built once from
//! [`TrustConfig`] over a single keyed store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditSink;
use crate::authn::{
    AuthService, ChallengeManager, CredentialRegistry, CredentialVerifier, RelyingParty,
    RingCrypto, SessionError, SessionIssuer,
};
use crate::clock::Clock;
use crate::config::TrustConfig;
use crate::maintenance::MaintenanceSweeper;
use crate::risk::{
    ConfirmationListener, ConfirmedTransaction, HttpThreatFeed, PreferenceError, PreferenceStore,
    ProfileStore, RecipientHistory, RiskEngine, ThreatCache, ThreatFeedError, ThreatFeedRefresher,
};
use crate::store::KeyedStore;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid relying-party origin: {0}")]
    Origin(#[from] url::ParseError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Preferences(#[from] PreferenceError),

    #[error(transparent)]
    ThreatFeed(#[from] ThreatFeedError),
}

#[derive(Clone)]
pub struct TrustState {
    pub auth: Arc<AuthService>,
    pub challenges: Arc<ChallengeManager>,
    pub credentials: Arc<CredentialRegistry>,
    pub sessions: Arc<SessionIssuer>,
    pub profiles: Arc<ProfileStore>,
    pub history: Arc<RecipientHistory>,
    pub preferences: Arc<PreferenceStore>,
    pub threats: Arc<ThreatCache>,
    pub risk: Arc<RiskEngine>,
    threat_feed_url: Option<String>,
    threat_refresh_interval: Duration,
    maintenance_interval: Duration,
}

impl TrustState {
    pub fn new(
        config: &TrustConfig,
        store: Arc<dyn KeyedStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, StateError> {
        let relying_party = RelyingParty::new(config.rp_id.clone(), &config.rp_origins)?;

        let challenges = Arc::new(
            ChallengeManager::new(store.clone(), clock.clone()).with_ttl(config.challenge_ttl),
        );
        let credentials = Arc::new(CredentialRegistry::new(store.clone()));
        let verifier = Arc::new(CredentialVerifier::new(
            credentials.clone(),
            Arc::new(RingCrypto),
            relying_party,
            clock.clone(),
            audit.clone(),
        ));
        let sessions = Arc::new(
            SessionIssuer::new(store.clone(), clock.clone(), &config.session_pepper)?
                .with_ttl(config.session_ttl),
        );
        let auth = Arc::new(AuthService::new(
            challenges.clone(),
            verifier,
            sessions.clone(),
            audit.clone(),
            clock.clone(),
        ));

        let profiles = Arc::new(ProfileStore::new(store.clone(), clock.clone()));
        let history = Arc::new(RecipientHistory::new(store.clone()));
        let preferences = Arc::new(PreferenceStore::new(
            store,
            clock.clone(),
            config.default_risk_threshold,
        )?);
        let threats = Arc::new(
            ThreatCache::new(config.threat_cache_capacity, clock.clone())
                .with_ttl(config.threat_entry_ttl),
        );
        let risk = Arc::new(RiskEngine::new(
            profiles.clone(),
            history.clone(),
            threats.clone(),
            preferences.clone(),
            config.risk,
            clock,
            audit,
        ));

        Ok(Self {
            auth,
            challenges,
            credentials,
            sessions,
            profiles,
            history,
            preferences,
            threats,
            risk,
            threat_feed_url: config.threat_feed_url.clone(),
            threat_refresh_interval: config.threat_refresh_interval,
            maintenance_interval: config.maintenance_interval,
        })
    }

    /// The single writer of profiles and recipient history.
    pub fn confirmation_listener(&self) -> ConfirmationListener {
        ConfirmationListener::new(self.profiles.clone(), self.history.clone())
    }

    /// Spawn the confirmation listener behind a bounded channel.
    ///
    /// Confirmed transactions sent on the returned sender update profiles
    /// and recipient history. The listener stops when every sender is
    /// dropped or `shutdown` fires.
    pub fn spawn_confirmation_listener(
        &self,
        depth: usize,
        shutdown: CancellationToken,
    ) -> (mpsc::Sender<ConfirmedTransaction>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(depth.max(1));
        let handle = tokio::spawn(self.confirmation_listener().run(receiver, shutdown));
        (sender, handle)
    }

    pub fn maintenance_sweeper(&self) -> MaintenanceSweeper {
        MaintenanceSweeper::new(
            self.challenges.clone(),
            self.sessions.clone(),
            self.threats.clone(),
        )
        .with_interval(self.maintenance_interval)
    }

    /// `None` when no feed URL is configured.
    pub fn threat_refresher(
        &self,
    ) -> Result<Option<ThreatFeedRefresher<HttpThreatFeed>>, StateError> {
        let Some(url) = &self.threat_feed_url else {
            return Ok(None);
        };
        let feed = HttpThreatFeed::new(url.clone())?;
        Ok(Some(
            ThreatFeedRefresher::new(feed, self.threats.clone())
                .with_interval(self.threat_refresh_interval),
        ))
    }
}
