#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use podfeeds::application::origin::{FetchError, OriginFetcher, OriginResponse};
use podfeeds::application::render::gunzip;
use podfeeds::application::subscriptions::{
    Fingerprint, SubscriptionError, SubscriptionList, SubscriptionSource,
};
use podfeeds::cache::{CacheError, Generation, MemoryPageCache, PageCache};
use podfeeds::domain::{CacheKey, Page, Validators};
use tokio::sync::watch;

pub fn rss(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>{title}</title>
    <link>https://example.com/</link>
    <description>All about {title}</description>
    <item>
      <title>{title} episode</title>
      <guid>{title}-1</guid>
      <enclosure url="https://example.com/{title}.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#
    )
}

pub fn html_of(page: &Page) -> String {
    String::from_utf8(gunzip(&page.body).expect("cached bodies are gzip"))
        .expect("cached html is utf-8")
}

/// Subscription list held in memory; `set` changes the fingerprint.
pub struct StaticSubscriptions {
    feeds: Mutex<Vec<String>>,
    version: AtomicUsize,
}

impl StaticSubscriptions {
    pub fn new(feeds: &[&str]) -> Self {
        Self {
            feeds: Mutex::new(feeds.iter().map(|feed| feed.to_string()).collect()),
            version: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, feeds: &[&str]) {
        *self.feeds.lock().unwrap() = feeds.iter().map(|feed| feed.to_string()).collect();
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionSource for StaticSubscriptions {
    async fn load(&self) -> Result<SubscriptionList, SubscriptionError> {
        Ok(SubscriptionList {
            feeds: self.feeds.lock().unwrap().clone(),
            modified: None,
        })
    }

    async fn fingerprint(&self) -> Result<Fingerprint, SubscriptionError> {
        Ok(Fingerprint {
            modified: None,
            digest: self.version.load(Ordering::SeqCst).to_string(),
        })
    }
}

#[derive(Clone)]
enum Script {
    Feed { title: String, delay: Duration },
    Unchanged,
    Fail(FetchError),
}

/// Origin double: answers from a per-URL script, counts calls, and can hold
/// every request at a gate until the test opens it.
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    gate: watch::Sender<bool>,
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate,
        }
    }

    pub fn feed(self, url: &str, title: &str) -> Self {
        self.feed_after(url, title, Duration::ZERO)
    }

    pub fn feed_after(self, url: &str, title: &str, delay: Duration) -> Self {
        self.script(
            url,
            Script::Feed {
                title: title.to_string(),
                delay,
            },
        );
        self
    }

    pub fn failing(self, url: &str) -> Self {
        self.script(
            url,
            Script::Fail(FetchError::Status {
                url: url.to_string(),
                status: 503,
            }),
        );
        self
    }

    pub fn set_feed(&self, url: &str, title: &str) {
        self.script(
            url,
            Script::Feed {
                title: title.to_string(),
                delay: Duration::ZERO,
            },
        );
    }

    pub fn set_failing(&self, url: &str) {
        self.script(
            url,
            Script::Fail(FetchError::Status {
                url: url.to_string(),
                status: 503,
            }),
        );
    }

    /// Answer 304 for `url` from now on.
    pub fn set_unchanged(&self, url: &str) {
        self.script(url, Script::Unchanged);
    }

    fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| called.as_str() == url)
            .count()
    }

    /// Wait until at least `count` requests have reached the fetcher.
    pub async fn wait_for_calls(&self, count: usize) {
        for _ in 0..500 {
            if self.total_calls() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("fetcher saw {} calls, expected {count}", self.total_calls());
    }
}

#[async_trait]
impl OriginFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        _validators: &Validators,
    ) -> Result<OriginResponse, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let script = self.scripts.lock().unwrap().get(url).cloned();
        match script {
            Some(Script::Feed { title, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let etag = format!("\"{title}\"");
                Ok(OriginResponse::Fresh {
                    validators: Validators::new(Some(etag.as_str()), None),
                    body: Bytes::from(rss(&title)),
                    headers: Vec::new(),
                })
            }
            Some(Script::Unchanged) => Ok(OriginResponse::NotModified {
                headers: Vec::new(),
            }),
            Some(Script::Fail(err)) => Err(err),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Memory cache that counts point writes and generation swaps.
#[derive(Default)]
pub struct CountingCache {
    inner: MemoryPageCache,
    sets: AtomicUsize,
    replacements: AtomicUsize,
}

impl CountingCache {
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageCache for CountingCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Page>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, page: Page) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, page).await
    }

    async fn erase(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.inner.erase(key).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }

    async fn replace_all(&self, generation: Generation) -> Result<(), CacheError> {
        self.replacements.fetch_add(1, Ordering::SeqCst);
        self.inner.replace_all(generation).await
    }
}
