//! Contract for talking to feed origins.

use async_trait::async_trait;
use axum::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{CACHE_CONTROL, EXPIRES, VARY},
};
use bytes::Bytes;
use thiserror::Error;

use crate::domain::Validators;

/// Response headers mirrored from the origin onto client responses.
pub const MIRRORED_HEADERS: [HeaderName; 3] = [CACHE_CONTROL, EXPIRES, VARY];

/// Client-cacheable headers copied from an origin response.
pub type UpstreamHeaders = Vec<(HeaderName, HeaderValue)>;

pub fn mirrored_headers(headers: &HeaderMap) -> UpstreamHeaders {
    MIRRORED_HEADERS
        .iter()
        .flat_map(|name| {
            headers
                .get_all(name)
                .iter()
                .map(move |value| (name.clone(), value.clone()))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub enum OriginResponse {
    /// The origin answered 304; the cached copy is current.
    NotModified { headers: UpstreamHeaders },
    /// The origin answered 2xx with a body.
    Fresh {
        validators: Validators,
        body: Bytes,
        headers: UpstreamHeaders,
    },
}

#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("request to `{url}` failed: {message}")]
    Transport { url: String, message: String },
    #[error("request to `{url}` timed out")]
    Timeout { url: String },
    #[error("origin `{url}` answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("origin `{url}` answered 304 to an unconditional request")]
    UnexpectedNotModified { url: String },
}

impl FetchError {
    pub fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Performs (optionally conditional) GET requests against an origin.
///
/// `If-None-Match` is sent when `validators.etag` is set and
/// `If-Modified-Since` when `validators.last_modified` is set; both may be
/// sent together.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(&self, url: &str, validators: &Validators)
    -> Result<OriginResponse, FetchError>;
}
