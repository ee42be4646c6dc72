//! Rebuild trigger driven by changes to the subscription list.
//!
//! The watcher polls the subscription source's [`Fingerprint`] on a fixed
//! interval. Every change observed produces exactly one rebuild attempt; the
//! coordinator's permit keeps attempts from overlapping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::lock::mutex_lock;

use super::rebuild::{
    RebuildCoordinator, RebuildError, RebuildPolicy, RebuildReport, RebuildTrigger,
};
use super::subscriptions::Fingerprint;

const SOURCE: &str = "application::watcher";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    /// The list changed and the rebuild published a new generation.
    Rebuilt(RebuildReport),
    /// The list changed but the rebuild failed; the next change retries.
    Failed,
    /// The subscription source could not be read this tick.
    Unreadable,
}

pub struct ChangeWatcher {
    coordinator: Arc<RebuildCoordinator>,
    interval: Duration,
    last_seen: Mutex<Option<Fingerprint>>,
}

impl ChangeWatcher {
    pub fn new(coordinator: Arc<RebuildCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
            last_seen: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<RebuildCoordinator> {
        &self.coordinator
    }

    /// Spawn the unconditional startup rebuild followed by the poll loop.
    ///
    /// Returns immediately; a failed startup rebuild is logged and the loop
    /// still starts, so a fixed subscription list is picked up later.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.startup().await {
                warn!(
                    error = %err,
                    "Startup rebuild failed; serving whatever the store already holds"
                );
            }
            self.poll_loop().await;
        })
    }

    /// The startup rebuild. Runs regardless of any previously seen fingerprint.
    pub async fn startup(&self) -> Result<RebuildReport, RebuildError> {
        match self.coordinator.subscriptions().fingerprint().await {
            Ok(fingerprint) => self.remember(fingerprint, "startup"),
            Err(err) => warn!(error = %err, "Subscription list unreadable at startup"),
        }
        self.coordinator
            .rebuild(RebuildTrigger::Startup, RebuildPolicy::Wait)
            .await
    }

    /// Check the subscription source once and rebuild if it changed.
    pub async fn poll_once(&self) -> PollOutcome {
        let fingerprint = match self.coordinator.subscriptions().fingerprint().await {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!(error = %err, "Subscription list unreadable; retrying next tick");
                return PollOutcome::Unreadable;
            }
        };

        {
            let last_seen = mutex_lock(&self.last_seen, SOURCE, "poll_once");
            if last_seen.as_ref() == Some(&fingerprint) {
                return PollOutcome::Unchanged;
            }
        }

        // Recorded before rebuilding so a failed attempt is not retried until
        // the list changes again.
        self.remember(fingerprint, "poll_once");
        info!("Subscription list changed; rebuilding");

        match self
            .coordinator
            .rebuild(RebuildTrigger::SubscriptionsChanged, RebuildPolicy::Wait)
            .await
        {
            Ok(report) => PollOutcome::Rebuilt(report),
            Err(_) => PollOutcome::Failed,
        }
    }

    async fn poll_loop(&self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // Skip the first immediate tick
        debug!(
            interval_ms = self.interval.as_millis() as u64,
            "Subscription watcher started"
        );

        loop {
            interval.tick().await;
            self.poll_once().await;
        }
    }

    fn remember(&self, fingerprint: Fingerprint, op: &'static str) {
        *mutex_lock(&self.last_seen, SOURCE, op) = Some(fingerprint);
    }
}
