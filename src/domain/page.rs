//! Cached pages and the keys they are stored under.

use std::fmt;

use bytes::Bytes;

/// Storage key reserved for the index page.
pub const INDEX_KEY: &str = "/";

/// Key of a cache entry: either the index page or one subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Index,
    Feed(String),
}

impl CacheKey {
    pub fn feed(url: impl Into<String>) -> Self {
        Self::Feed(url.into())
    }

    /// The string form used by persistent stores.
    pub fn as_str(&self) -> &str {
        match self {
            CacheKey::Index => INDEX_KEY,
            CacheKey::Feed(url) => url.as_str(),
        }
    }

    /// Inverse of [`CacheKey::as_str`].
    pub fn from_storage(raw: &str) -> Self {
        if raw == INDEX_KEY {
            CacheKey::Index
        } else {
            CacheKey::Feed(raw.to_string())
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin validators used for conditional requests.
///
/// Both values are independently optional; empty strings are normalised to `None`
/// so a blank header never turns into a conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn new(etag: Option<&str>, last_modified: Option<&str>) -> Self {
        Self {
            etag: non_blank(etag),
            last_modified: non_blank(last_modified),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// A rendered page as held by the cache.
///
/// `body` is always gzip-compressed HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body: Bytes,
}

impl Page {
    pub fn new(validators: Validators, body: impl Into<Bytes>) -> Self {
        Self {
            etag: validators.etag,
            last_modified: validators.last_modified,
            body: body.into(),
        }
    }

    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }
}
