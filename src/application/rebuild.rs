//! Full-cache rebuilds.
//!
//! A rebuild loads the subscription list, fetches and renders every feed
//! concurrently, renders the index page in subscription order, and publishes
//! the result as one [`Generation`]. Nothing reaches the live cache until
//! every feed has succeeded; a failed attempt leaves the previous generation
//! servable.
//!
//! At most one rebuild runs at a time. Callers choose whether a second trigger
//! waits for the running one ([`RebuildPolicy::Wait`]) or is dropped
//! ([`RebuildPolicy::Coalesce`]).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::cache::{CacheError, Generation, PageCache};
use crate::domain::{Subscription, find_duplicate};

use super::fetch::{PageBuildError, fetch_and_render};
use super::origin::OriginFetcher;
use super::render::{RenderError, RenderedFeed, render_index_page};
use super::subscriptions::{SubscriptionError, SubscriptionSource};

pub(crate) const METRIC_REBUILD_TOTAL: &str = "podfeeds_rebuild_total";
pub(crate) const METRIC_REBUILD_MS: &str = "podfeeds_rebuild_ms";

const TARGET: &str = "podfeeds::rebuild";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildTrigger {
    Startup,
    SubscriptionsChanged,
    Manual,
}

impl RebuildTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RebuildTrigger::Startup => "startup",
            RebuildTrigger::SubscriptionsChanged => "subscriptions_changed",
            RebuildTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for RebuildTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a rebuild is already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildPolicy {
    /// Queue behind the running rebuild.
    #[default]
    Wait,
    /// Give up immediately with [`RebuildError::Busy`].
    Coalesce,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Sequence number of the published generation, starting at 1.
    pub generation: u64,
    pub feeds: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("a rebuild is already running")]
    Busy,
    #[error(transparent)]
    Subscriptions(#[from] SubscriptionError),
    #[error("feed `{url}` is subscribed more than once")]
    Duplicate { url: String },
    #[error("feed `{url}` failed: {source}")]
    Feed {
        url: String,
        #[source]
        source: PageBuildError,
    },
    #[error("failed to render the index page: {0}")]
    Index(#[source] RenderError),
    #[error("failed to publish the new generation: {0}")]
    Cache(#[from] CacheError),
    #[error("feed task failed: {0}")]
    Task(String),
}

impl RebuildError {
    fn outcome(&self) -> &'static str {
        match self {
            RebuildError::Busy => "busy",
            RebuildError::Subscriptions(_) | RebuildError::Duplicate { .. } => "invalid",
            _ => "failed",
        }
    }
}

pub struct RebuildCoordinator {
    subscriptions: Arc<dyn SubscriptionSource>,
    fetcher: Arc<dyn OriginFetcher>,
    cache: Arc<dyn PageCache>,
    permit: Semaphore,
    generation: AtomicU64,
}

impl RebuildCoordinator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionSource>,
        fetcher: Arc<dyn OriginFetcher>,
        cache: Arc<dyn PageCache>,
    ) -> Self {
        Self {
            subscriptions,
            fetcher,
            cache,
            permit: Semaphore::new(1),
            generation: AtomicU64::new(0),
        }
    }

    pub fn subscriptions(&self) -> &Arc<dyn SubscriptionSource> {
        &self.subscriptions
    }

    /// Whether a rebuild currently holds the permit.
    pub fn is_running(&self) -> bool {
        self.permit.available_permits() == 0
    }

    /// Number of generations published by this coordinator.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[instrument(skip_all, fields(trigger = %trigger, ?policy))]
    pub async fn rebuild(
        &self,
        trigger: RebuildTrigger,
        policy: RebuildPolicy,
    ) -> Result<RebuildReport, RebuildError> {
        let started_at = Instant::now();
        let result = match self.acquire(policy).await {
            Ok(_permit) => self.run(started_at).await,
            Err(err) => Err(err),
        };
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(report) => {
                counter!(METRIC_REBUILD_TOTAL, "outcome" => "success").increment(1);
                histogram!(METRIC_REBUILD_MS).record(elapsed_ms);
                info!(
                    target: TARGET,
                    %trigger,
                    generation = report.generation,
                    feeds = report.feeds,
                    elapsed_ms,
                    "Published new cache generation"
                );
            }
            Err(RebuildError::Busy) => {
                counter!(METRIC_REBUILD_TOTAL, "outcome" => "busy").increment(1);
                info!(target: TARGET, %trigger, "Rebuild already running; trigger coalesced");
            }
            Err(err) => {
                counter!(METRIC_REBUILD_TOTAL, "outcome" => err.outcome()).increment(1);
                histogram!(METRIC_REBUILD_MS).record(elapsed_ms);
                match err {
                    RebuildError::Subscriptions(_) | RebuildError::Duplicate { .. } => warn!(
                        target: TARGET,
                        %trigger,
                        error = %err,
                        "Rebuild rejected; previous generation kept"
                    ),
                    _ => error!(
                        target: TARGET,
                        %trigger,
                        error = %err,
                        "Rebuild failed; previous generation kept"
                    ),
                }
            }
        }

        result
    }

    // The permit is never closed, so acquisition only fails while another
    // rebuild holds it.
    async fn acquire(&self, policy: RebuildPolicy) -> Result<SemaphorePermit<'_>, RebuildError> {
        match policy {
            RebuildPolicy::Wait => self.permit.acquire().await.map_err(|_| RebuildError::Busy),
            RebuildPolicy::Coalesce => self.permit.try_acquire().map_err(|_| RebuildError::Busy),
        }
    }

    async fn run(&self, started_at: Instant) -> Result<RebuildReport, RebuildError> {
        let list = self.subscriptions.load().await?;

        if let Some(url) = find_duplicate(&list.feeds) {
            return Err(RebuildError::Duplicate {
                url: url.to_string(),
            });
        }

        let rendered = self.fetch_all(&list.feeds).await?;

        let index_entries = list
            .feeds
            .iter()
            .zip(&rendered)
            .map(|(url, feed)| Subscription::for_feed(&feed.title, url))
            .collect();
        let index = render_index_page(index_entries, list.modified).map_err(RebuildError::Index)?;

        let feeds = list.feeds.len();
        let pages = list
            .feeds
            .into_iter()
            .zip(rendered)
            .map(|(url, feed)| (url, feed.page))
            .collect();
        self.cache.replace_all(Generation::new(index, pages)).await?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(RebuildReport {
            generation,
            feeds,
            elapsed: started_at.elapsed(),
        })
    }

    /// Fetch and render every feed concurrently. Results are returned in
    /// `feeds` order; the first failure cancels the remaining tasks.
    async fn fetch_all(&self, feeds: &[String]) -> Result<Vec<RenderedFeed>, RebuildError> {
        let mut slots: Vec<Option<RenderedFeed>> = (0..feeds.len()).map(|_| None).collect();
        let mut tasks = JoinSet::new();

        for (index, url) in feeds.iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let url = url.clone();
            tasks.spawn(async move {
                let result = fetch_and_render(fetcher.as_ref(), &url).await;
                (index, url, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, url, result) = match joined {
                Ok(done) => done,
                Err(err) => {
                    tasks.abort_all();
                    return Err(RebuildError::Task(err.to_string()));
                }
            };

            match result {
                Ok(fetched) => slots[index] = Some(fetched.rendered),
                Err(source) => {
                    tasks.abort_all();
                    return Err(RebuildError::Feed { url, source });
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    RebuildError::Task(format!("feed #{} produced no page", index + 1))
                })
            })
            .collect()
    }
}
