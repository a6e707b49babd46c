// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Threat Feed Refresher
//!
//! Background task that pulls indicators from an external feed and upserts
//! them into the [`ThreatCache`]. Lookups never wait on it: a failed
//! refresh is logged and retried with exponential backoff (capped at the
//! refresh interval) while the cache keeps serving what it has.
//!
//! ## Feed document
//!
//! ```json
//! {
//!   "source": "community-blocklist",
//!   "entries": [
//!     { "kind": "address", "value": "0x...", "category": "drainer" },
//!     { "kind": "domain", "value": "https://claim.example", "category": "phishing", "active": true }
//!   ]
//! }
//! ```
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, like the other background
//! tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::ThreatFeedError;
use super::threat::{ThreatCache, ThreatCategory, ThreatIndicator, ThreatKind};

/// Default interval between refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(900);

/// First retry delay after a failed refresh.
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

/// HTTP timeout for one feed request.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of threat indicators.
pub trait ThreatFeed: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<ThreatIndicator>, ThreatFeedError>> + Send;
}

#[derive(Debug, Deserialize)]
struct FeedDocument {
    source: String,
    entries: Vec<FeedRecord>,
}

#[derive(Debug, Deserialize)]
struct FeedRecord {
    kind: ThreatKind,
    value: String,
    category: ThreatCategory,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl FeedDocument {
    fn into_indicators(self) -> Result<Vec<ThreatIndicator>, ThreatFeedError> {
        let source = self.source;
        self.entries
            .into_iter()
            .map(|record| {
                if record.value.trim().is_empty() {
                    return Err(ThreatFeedError::InvalidEntry(format!(
                        "empty {:?} value",
                        record.kind
                    )));
                }
                Ok(ThreatIndicator {
                    kind: record.kind,
                    value: record.value,
                    category: record.category,
                    source: source.clone(),
                    active: record.active,
                })
            })
            .collect()
    }
}

/// Feed served as a JSON document over HTTPS.
#[derive(Clone)]
pub struct HttpThreatFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpThreatFeed {
    pub fn new(url: impl Into<String>) -> Result<Self, ThreatFeedError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ThreatFeed for HttpThreatFeed {
    fn fetch(&self) -> impl Future<Output = Result<Vec<ThreatIndicator>, ThreatFeedError>> + Send {
        async move {
            let response = self.client.get(&self.url).send().await?;

            if !response.status().is_success() {
                return Err(ThreatFeedError::Status(response.status().as_u16()));
            }

            let document: FeedDocument = response.json().await?;
            document.into_indicators()
        }
    }
}

/// Periodically refreshes the threat cache from a feed.
pub struct ThreatFeedRefresher<F> {
    feed: F,
    cache: Arc<ThreatCache>,
    interval: Duration,
}

impl<F: ThreatFeed> ThreatFeedRefresher<F> {
    pub fn new(feed: F, cache: Arc<ThreatCache>) -> Self {
        Self {
            feed,
            cache,
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fetch once and upsert everything. Returns the number of entries.
    pub async fn refresh_once(&self) -> Result<usize, ThreatFeedError> {
        let indicators = self.feed.fetch().await?;
        let count = indicators.len();
        let capacity = self.cache.capacity();
        if count > capacity {
            warn!(count, capacity, "Threat feed is larger than the cache; live entries will be displaced");
        }
        for indicator in indicators {
            self.cache.upsert(indicator);
        }
        Ok(count)
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Threat feed refresher starting"
        );

        let mut backoff = INITIAL_BACKOFF.min(self.interval);
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let delay = match self.refresh_once().await {
                Ok(count) => {
                    info!(count, cached = self.cache.len(), "Threat feed refreshed");
                    backoff = INITIAL_BACKOFF.min(self.interval);
                    self.interval
                }
                Err(e) => {
                    warn!(error = %e, retry_secs = backoff.as_secs(), "Threat feed refresh failed");
                    let delay = backoff;
                    backoff = (backoff * 2).min(self.interval);
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Threat feed refresher shutting down");
    }
}
