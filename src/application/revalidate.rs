//! Per-request conditional revalidation of cached feed pages.
//!
//! The cache is a hint; the origin decides freshness. A cached entry is served
//! unchanged only after the origin confirms it with a 304. Fresh content is
//! rendered and written back before it is served. On any failure the cached
//! entry stays exactly as it was.

use std::str::FromStr;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, PageCache};
use crate::domain::page::INDEX_KEY;
use crate::domain::{CacheKey, Page, is_web_url};

use super::fetch::{PageBuildError, fetch_and_render, render_fresh};
use super::origin::{FetchError, OriginFetcher, OriginResponse, UpstreamHeaders};
use super::render::RenderError;

pub(crate) const METRIC_REVALIDATE_TOTAL: &str = "podfeeds_revalidate_total";

/// Behaviour for a request whose URL has no cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissPolicy {
    /// Only rebuilds populate the cache; unknown URLs are not found.
    #[default]
    NotFound,
    /// Fetch and cache absolute `http`/`https` URLs on first request.
    FetchOnDemand,
}

impl FromStr for MissPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_found" => Ok(MissPolicy::NotFound),
            "fetch_on_demand" => Ok(MissPolicy::FetchOnDemand),
            other => Err(format!(
                "unknown miss policy `{other}` (expected not_found or fetch_on_demand)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
    /// The origin answered 304; the cached page was served as-is.
    NotModified,
    /// The origin sent new content, which replaced the cached page.
    Refreshed,
    /// There was no cached page; it was fetched under [`MissPolicy::FetchOnDemand`].
    FetchedOnDemand,
}

impl Revalidation {
    pub fn as_str(self) -> &'static str {
        match self {
            Revalidation::NotModified => "not_modified",
            Revalidation::Refreshed => "refreshed",
            Revalidation::FetchedOnDemand => "fetched_on_demand",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServedPage {
    pub page: Page,
    pub upstream_headers: UpstreamHeaders,
    pub revalidation: Revalidation,
}

#[derive(Debug, Error)]
pub enum RevalidateError {
    #[error("no feed url was given")]
    MissingUrl,
    #[error("`{url}` is not cached")]
    NotFound { url: String },
    #[error(transparent)]
    Origin(#[from] FetchError),
    #[error("failed to render `{url}`: {source}")]
    Render {
        url: String,
        #[source]
        source: RenderError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl RevalidateError {
    fn outcome(&self) -> &'static str {
        match self {
            RevalidateError::MissingUrl => "missing_url",
            RevalidateError::NotFound { .. } => "not_found",
            RevalidateError::Origin(_) => "origin_error",
            RevalidateError::Render { .. } => "render_error",
            RevalidateError::Cache(_) => "cache_error",
        }
    }
}

impl From<PageBuildError> for RevalidateError {
    fn from(err: PageBuildError) -> Self {
        match err {
            PageBuildError::Fetch(err) => RevalidateError::Origin(err),
            PageBuildError::Render { url, source } => RevalidateError::Render { url, source },
        }
    }
}

pub struct RevalidationHandler {
    cache: Arc<dyn PageCache>,
    fetcher: Arc<dyn OriginFetcher>,
    miss_policy: MissPolicy,
}

impl RevalidationHandler {
    pub fn new(
        cache: Arc<dyn PageCache>,
        fetcher: Arc<dyn OriginFetcher>,
        miss_policy: MissPolicy,
    ) -> Self {
        Self {
            cache,
            fetcher,
            miss_policy,
        }
    }

    pub fn miss_policy(&self) -> MissPolicy {
        self.miss_policy
    }

    /// Serve the page cached for `url`, revalidating it against its origin.
    pub async fn serve(&self, url: &str) -> Result<ServedPage, RevalidateError> {
        let result = self.serve_inner(url.trim()).await;
        record(&result);
        result
    }

    /// The published index page.
    pub async fn index(&self) -> Result<Page, RevalidateError> {
        self.cache
            .get(&CacheKey::Index)
            .await?
            .ok_or_else(|| RevalidateError::NotFound {
                url: INDEX_KEY.to_string(),
            })
    }

    pub async fn has_index(&self) -> Result<bool, CacheError> {
        Ok(self.cache.get(&CacheKey::Index).await?.is_some())
    }

    /// Unconditionally re-fetch `url` and overwrite its entry.
    ///
    /// The old entry is only replaced once the new page is rendered, so a
    /// failed refresh leaves it servable. URLs without an entry follow the miss
    /// policy.
    pub async fn force_refresh(&self, url: &str) -> Result<ServedPage, RevalidateError> {
        let result = self.force_refresh_inner(url.trim()).await;
        record(&result);
        result
    }

    fn key_for(&self, url: &str) -> Result<CacheKey, RevalidateError> {
        if url.is_empty() {
            return Err(RevalidateError::MissingUrl);
        }
        // The index lives under the reserved key; it is never a feed.
        if url == INDEX_KEY {
            return Err(RevalidateError::NotFound {
                url: url.to_string(),
            });
        }
        Ok(CacheKey::feed(url))
    }

    async fn serve_inner(&self, url: &str) -> Result<ServedPage, RevalidateError> {
        let key = self.key_for(url)?;

        let Some(cached) = self.cache.get(&key).await? else {
            return self.on_miss(url, &key).await;
        };

        let response = match self.fetcher.fetch(url, &cached.validators()).await {
            Ok(response) => response,
            Err(err) => {
                warn!(url, error = %err, "Origin revalidation failed; cached page kept");
                return Err(err.into());
            }
        };

        match response {
            OriginResponse::NotModified { headers } => {
                debug!(url, "Origin confirmed cached page");
                Ok(ServedPage {
                    page: cached,
                    upstream_headers: headers,
                    revalidation: Revalidation::NotModified,
                })
            }
            OriginResponse::Fresh {
                validators,
                body,
                headers,
            } => {
                let fetched = render_fresh(url, &body, validators, headers)?;
                let page = fetched.rendered.page;
                self.cache.set(&key, page.clone()).await?;
                debug!(url, etag = ?page.etag, "Origin sent new content; cache updated");
                Ok(ServedPage {
                    page,
                    upstream_headers: fetched.headers,
                    revalidation: Revalidation::Refreshed,
                })
            }
        }
    }

    async fn force_refresh_inner(&self, url: &str) -> Result<ServedPage, RevalidateError> {
        let key = self.key_for(url)?;
        if self.cache.get(&key).await?.is_none() {
            return self.on_miss(url, &key).await;
        }

        let fetched = fetch_and_render(self.fetcher.as_ref(), url).await?;
        let page = fetched.rendered.page;
        self.cache.set(&key, page.clone()).await?;
        info!(url, "Forced refresh replaced cached page");
        Ok(ServedPage {
            page,
            upstream_headers: fetched.headers,
            revalidation: Revalidation::Refreshed,
        })
    }

    async fn on_miss(&self, url: &str, key: &CacheKey) -> Result<ServedPage, RevalidateError> {
        if self.miss_policy == MissPolicy::NotFound || !is_web_url(url) {
            return Err(RevalidateError::NotFound {
                url: url.to_string(),
            });
        }

        let fetched = fetch_and_render(self.fetcher.as_ref(), url).await?;
        let page = fetched.rendered.page;
        self.cache.set(key, page.clone()).await?;
        info!(url, "Fetched uncached feed on demand");
        Ok(ServedPage {
            page,
            upstream_headers: fetched.headers,
            revalidation: Revalidation::FetchedOnDemand,
        })
    }
}

fn record(result: &Result<ServedPage, RevalidateError>) {
    let outcome = match result {
        Ok(served) => served.revalidation.as_str(),
        Err(err) => err.outcome(),
    };
    counter!(METRIC_REVALIDATE_TOTAL, "outcome" => outcome).increment(1);
}
