use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use metrics::counter;

use crate::domain::{CacheKey, Page};

use super::lock::{rw_read, rw_write};
use super::{
    CacheError, Generation, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_WRITE, PageCache,
};

const SOURCE: &str = "cache::memory";
const STORE_LABEL: &str = "memory";

type Entries = HashMap<CacheKey, Page>;

/// In-process page cache.
///
/// The map lives behind an `Arc` that is swapped wholesale by
/// [`PageCache::replace_all`]; point writes clone-on-write through
/// [`Arc::make_mut`], so a reader holding the previous snapshot never sees a
/// torn update.
#[derive(Default)]
pub struct MemoryPageCache {
    entries: RwLock<Arc<Entries>>,
}

impl MemoryPageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, op: &'static str) -> Arc<Entries> {
        Arc::clone(&rw_read(&self.entries, SOURCE, op))
    }

    /// Number of cached entries, the index page included.
    pub fn len(&self) -> usize {
        self.snapshot("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PageCache for MemoryPageCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Page>, CacheError> {
        let page = self.snapshot("get").get(key).cloned();
        let metric = if page.is_some() {
            METRIC_CACHE_HIT
        } else {
            METRIC_CACHE_MISS
        };
        counter!(metric, "store" => STORE_LABEL).increment(1);
        Ok(page)
    }

    async fn set(&self, key: &CacheKey, page: Page) -> Result<(), CacheError> {
        let mut guard = rw_write(&self.entries, SOURCE, "set");
        Arc::make_mut(&mut guard).insert(key.clone(), page);
        counter!(METRIC_CACHE_WRITE, "store" => STORE_LABEL, "op" => "set").increment(1);
        Ok(())
    }

    async fn erase(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut guard = rw_write(&self.entries, SOURCE, "erase");
        if guard.contains_key(key) {
            Arc::make_mut(&mut guard).remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        *rw_write(&self.entries, SOURCE, "clear") = Arc::new(Entries::new());
        Ok(())
    }

    async fn replace_all(&self, generation: Generation) -> Result<(), CacheError> {
        let mut next = Entries::with_capacity(generation.len());
        next.extend(generation.into_entries());
        let next = Arc::new(next);

        *rw_write(&self.entries, SOURCE, "replace_all") = next;
        counter!(METRIC_CACHE_WRITE, "store" => STORE_LABEL, "op" => "replace_all").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use crate::domain::Validators;

    use super::*;

    fn page(body: &'static str, etag: Option<&str>) -> Page {
        Page::new(Validators::new(etag, None), body)
    }

    #[tokio::test]
    async fn missing_key_is_reported_as_absent() {
        let cache = MemoryPageCache::new();
        let found = cache
            .get(&CacheKey::feed("https://example.com/rss"))
            .await
            .expect("memory cache never fails");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn set_overwrites_and_erase_removes() {
        let cache = MemoryPageCache::new();
        let key = CacheKey::feed("https://example.com/rss");

        cache.set(&key, page("one", Some("\"1\""))).await.unwrap();
        cache.set(&key, page("two", Some("\"2\""))).await.unwrap();

        let cached = cache.get(&key).await.unwrap().expect("entry present");
        assert_eq!(cached.body, "two");
        assert_eq!(cached.etag.as_deref(), Some("\"2\""));

        cache.erase(&key).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
        cache.erase(&key).await.expect("erasing a missing key is not an error");
    }

    #[tokio::test]
    async fn replace_all_swaps_whole_generation() {
        let cache = MemoryPageCache::new();
        let stale = CacheKey::feed("https://old.example/rss");
        cache.set(&stale, page("old", None)).await.unwrap();

        let generation = Generation::new(
            page("index", None),
            vec![("https://new.example/rss".to_string(), page("new", None))],
        );
        cache.replace_all(generation).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&stale).await.unwrap().is_none());
        assert!(cache.get(&CacheKey::Index).await.unwrap().is_some());
        assert!(
            cache
                .get(&CacheKey::feed("https://new.example/rss"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn snapshot_taken_before_publish_is_unaffected() {
        let cache = MemoryPageCache::new();
        cache.set(&CacheKey::Index, page("first", None)).await.unwrap();

        let before = cache.snapshot("test");
        cache
            .replace_all(Generation::new(page("second", None), Vec::new()))
            .await
            .unwrap();

        assert_eq!(before.get(&CacheKey::Index).unwrap().body, "first");
        let after = cache.get(&CacheKey::Index).await.unwrap().unwrap();
        assert_eq!(after.body, "second");
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let cache = MemoryPageCache::new();
        cache.set(&CacheKey::Index, page("index", None)).await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let cache = MemoryPageCache::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache.entries.write().expect("lock should be acquired");
            panic!("poison page cache lock");
        }));

        cache.set(&CacheKey::Index, page("index", None)).await.unwrap();
        assert!(cache.get(&CacheKey::Index).await.unwrap().is_some());
    }
}
