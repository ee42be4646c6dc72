//! Where the ordered list of subscribed feed URLs comes from.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("failed to read subscriptions from `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse subscriptions in `{path}`: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("subscription #{position} is blank")]
    BlankEntry { position: usize },
}

/// Feed URLs in configured order, plus the time the list last changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionList {
    pub feeds: Vec<String>,
    pub modified: Option<SystemTime>,
}

/// Identity of one version of the subscription list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub digest: String,
}

#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn load(&self) -> Result<SubscriptionList, SubscriptionError>;

    async fn fingerprint(&self) -> Result<Fingerprint, SubscriptionError>;
}

#[derive(Debug, Deserialize)]
struct SubscriptionFile {
    #[serde(default)]
    feeds: Vec<String>,
}

/// TOML file of the form `feeds = ["https://...", ...]`.
#[derive(Debug, Clone)]
pub struct FileSubscriptions {
    path: PathBuf,
}

impl FileSubscriptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<(Vec<u8>, Option<SystemTime>), SubscriptionError> {
        let read_error = |source| SubscriptionError::Read {
            path: self.path.clone(),
            source,
        };
        let contents = fs::read(&self.path).await.map_err(read_error)?;
        let modified = fs::metadata(&self.path)
            .await
            .map_err(read_error)?
            .modified()
            .ok();
        Ok((contents, modified))
    }
}

#[async_trait]
impl SubscriptionSource for FileSubscriptions {
    async fn load(&self) -> Result<SubscriptionList, SubscriptionError> {
        let (contents, modified) = self.read().await?;
        let feeds = parse_subscriptions(&self.path, &contents)?;
        Ok(SubscriptionList { feeds, modified })
    }

    async fn fingerprint(&self) -> Result<Fingerprint, SubscriptionError> {
        let (contents, modified) = self.read().await?;
        Ok(Fingerprint {
            modified,
            digest: hex::encode(Sha256::digest(&contents)),
        })
    }
}

/// Parse and normalise a subscription document. Entries are trimmed; blank
/// entries are rejected. Duplicates are left for the rebuild to report.
pub fn parse_subscriptions(path: &Path, contents: &[u8]) -> Result<Vec<String>, SubscriptionError> {
    let parse_error = |message: String| SubscriptionError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let text = std::str::from_utf8(contents).map_err(|err| parse_error(err.to_string()))?;
    let file: SubscriptionFile = toml::from_str(text).map_err(|err| parse_error(err.to_string()))?;

    file.feeds
        .into_iter()
        .enumerate()
        .map(|(index, feed)| {
            let feed = feed.trim();
            if feed.is_empty() {
                Err(SubscriptionError::BlankEntry {
                    position: index + 1,
                })
            } else {
                Ok(feed.to_string())
            }
        })
        .collect()
}
