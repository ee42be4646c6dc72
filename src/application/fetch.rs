//! Fetch-then-render of a single feed, shared by rebuilds and revalidation.

use bytes::Bytes;
use thiserror::Error;

use crate::domain::Validators;

use super::origin::{FetchError, OriginFetcher, OriginResponse, UpstreamHeaders};
use super::render::{RenderError, RenderedFeed, render_feed_page};

#[derive(Debug, Error)]
pub enum PageBuildError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to render `{url}`: {source}")]
    Render {
        url: String,
        #[source]
        source: RenderError,
    },
}

/// A freshly rendered feed together with the origin headers to mirror.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub rendered: RenderedFeed,
    pub headers: UpstreamHeaders,
}

/// Unconditionally fetch `url` and render it.
pub async fn fetch_and_render(
    fetcher: &dyn OriginFetcher,
    url: &str,
) -> Result<FetchedFeed, PageBuildError> {
    match fetcher.fetch(url, &Validators::default()).await? {
        OriginResponse::Fresh {
            validators,
            body,
            headers,
        } => render_fresh(url, &body, validators, headers),
        OriginResponse::NotModified { .. } => Err(FetchError::UnexpectedNotModified {
            url: url.to_string(),
        }
        .into()),
    }
}

pub fn render_fresh(
    url: &str,
    body: &Bytes,
    validators: Validators,
    headers: UpstreamHeaders,
) -> Result<FetchedFeed, PageBuildError> {
    let rendered =
        render_feed_page(url, body, validators).map_err(|source| PageBuildError::Render {
            url: url.to_string(),
            source,
        })?;
    Ok(FetchedFeed { rendered, headers })
}
