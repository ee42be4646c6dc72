use async_trait::async_trait;
use metrics::counter;
use sqlx::{Row, query};

use crate::cache::{CacheError, Generation, PageCache};
use crate::domain::{CacheKey, Page, Validators};

use super::{SqlitePageCache, map_sqlx_error};

const STORE_LABEL: &str = "sqlite";

const UPSERT_PAGE: &str = "INSERT INTO pages (url, etag, last_modified, html) VALUES (?, ?, ?, ?) \
     ON CONFLICT(url) DO UPDATE SET \
     etag = excluded.etag, last_modified = excluded.last_modified, html = excluded.html";

#[async_trait]
impl PageCache for SqlitePageCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Page>, CacheError> {
        let row = query("SELECT etag, last_modified, html FROM pages WHERE url = ?")
            .bind(key.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(|err| map_sqlx_error("get", err))?;

        let Some(row) = row else {
            counter!(crate::cache::METRIC_CACHE_MISS, "store" => STORE_LABEL).increment(1);
            return Ok(None);
        };

        let etag: Option<String> = row
            .try_get("etag")
            .map_err(|err| CacheError::corrupt(key, err))?;
        let last_modified: Option<String> = row
            .try_get("last_modified")
            .map_err(|err| CacheError::corrupt(key, err))?;
        let html: Vec<u8> = row
            .try_get("html")
            .map_err(|err| CacheError::corrupt(key, err))?;

        counter!(crate::cache::METRIC_CACHE_HIT, "store" => STORE_LABEL).increment(1);
        Ok(Some(Page::new(
            Validators::new(etag.as_deref(), last_modified.as_deref()),
            html,
        )))
    }

    async fn set(&self, key: &CacheKey, page: Page) -> Result<(), CacheError> {
        query(UPSERT_PAGE)
            .bind(key.as_str())
            .bind(page.etag.as_deref())
            .bind(page.last_modified.as_deref())
            .bind(page.body.as_ref())
            .execute(self.pool())
            .await
            .map_err(|err| map_sqlx_error("set", err))?;

        counter!(crate::cache::METRIC_CACHE_WRITE, "store" => STORE_LABEL, "op" => "set")
            .increment(1);
        Ok(())
    }

    async fn erase(&self, key: &CacheKey) -> Result<(), CacheError> {
        query("DELETE FROM pages WHERE url = ?")
            .bind(key.as_str())
            .execute(self.pool())
            .await
            .map_err(|err| map_sqlx_error("erase", err))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        query("DELETE FROM pages")
            .execute(self.pool())
            .await
            .map_err(|err| map_sqlx_error("clear", err))?;
        Ok(())
    }

    async fn replace_all(&self, generation: Generation) -> Result<(), CacheError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|err| map_sqlx_error("replace_all.begin", err))?;

        query("DELETE FROM pages")
            .execute(&mut *tx)
            .await
            .map_err(|err| map_sqlx_error("replace_all.delete", err))?;

        for (key, page) in generation.into_entries() {
            query(UPSERT_PAGE)
                .bind(key.as_str())
                .bind(page.etag.as_deref())
                .bind(page.last_modified.as_deref())
                .bind(page.body.as_ref())
                .execute(&mut *tx)
                .await
                .map_err(|err| map_sqlx_error("replace_all.insert", err))?;
        }

        // Dropping `tx` on any error above rolls back, leaving the previous
        // generation in place.
        tx.commit()
            .await
            .map_err(|err| map_sqlx_error("replace_all.commit", err))?;

        counter!(crate::cache::METRIC_CACHE_WRITE, "store" => STORE_LABEL, "op" => "replace_all")
            .increment(1);
        Ok(())
    }
}
