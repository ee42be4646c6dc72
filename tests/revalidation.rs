mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CACHE_CONTROL;
use common::{CountingCache, html_of, rss};
use podfeeds::application::origin::FetchError;
use podfeeds::application::render::gzip;
use podfeeds::application::revalidate::{
    MissPolicy, Revalidation, RevalidateError, RevalidationHandler,
};
use podfeeds::cache::PageCache;
use podfeeds::domain::{CacheKey, Page, Validators};
use podfeeds::infra::origin::HttpOriginFetcher;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CACHED_ETAG: &str = "\"abc\"";
const CACHED_LAST_MODIFIED: &str = "Mon, 01 Jan 2024 00:00:00 GMT";

fn handler(cache: Arc<CountingCache>, miss_policy: MissPolicy) -> RevalidationHandler {
    let fetcher = HttpOriginFetcher::with_timeout(Duration::from_secs(5), "podfeeds-test")
        .expect("http client");
    RevalidationHandler::new(cache, Arc::new(fetcher), miss_policy)
}

async fn seeded_cache(url: &str) -> Arc<CountingCache> {
    let cache = Arc::new(CountingCache::default());
    let page = Page::new(
        Validators::new(Some(CACHED_ETAG), Some(CACHED_LAST_MODIFIED)),
        gzip(b"<p>cached copy</p>").expect("gzip"),
    );
    cache
        .set(&CacheKey::feed(url), page)
        .await
        .expect("seed cache");
    cache
}

#[tokio::test]
async fn not_modified_serves_cached_page_without_writing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .and(header("if-none-match", CACHED_ETAG))
        .and(header_exists("if-modified-since"))
        .respond_with(ResponseTemplate::new(304).insert_header("cache-control", "max-age=60"))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/feed.xml", server.uri());
    let cache = seeded_cache(&url).await;
    let writes_before = cache.sets();
    let handler = handler(cache.clone(), MissPolicy::NotFound);

    let served = handler.serve(&url).await.expect("served from cache");

    assert_eq!(served.revalidation, Revalidation::NotModified);
    assert_eq!(served.page.etag.as_deref(), Some(CACHED_ETAG));
    assert_eq!(html_of(&served.page), "<p>cached copy</p>");
    assert!(
        served
            .upstream_headers
            .iter()
            .any(|(name, value)| *name == CACHE_CONTROL && value.as_bytes() == b"max-age=60")
    );
    assert_eq!(cache.sets(), writes_before, "304 must not touch the cache");
}

#[tokio::test]
async fn changed_origin_replaces_the_cached_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"def\"")
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(rss("Fresh")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/feed.xml", server.uri());
    let cache = seeded_cache(&url).await;
    let handler = handler(cache.clone(), MissPolicy::NotFound);

    let served = handler.serve(&url).await.expect("refreshed");

    assert_eq!(served.revalidation, Revalidation::Refreshed);
    assert_eq!(served.page.etag.as_deref(), Some("\"def\""));
    assert!(served.page.last_modified.is_none());
    assert!(html_of(&served.page).contains("Fresh episode"));

    let stored = cache
        .get(&CacheKey::feed(url.as_str()))
        .await
        .expect("cache read")
        .expect("entry present");
    assert_eq!(stored, served.page);
}

#[tokio::test]
async fn origin_failure_keeps_the_cached_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = format!("{}/feed.xml", server.uri());
    let cache = seeded_cache(&url).await;
    let writes_before = cache.sets();
    let handler = handler(cache.clone(), MissPolicy::NotFound);

    let err = handler.serve(&url).await.expect_err("origin failed");
    assert!(matches!(
        err,
        RevalidateError::Origin(FetchError::Status { status: 500, .. })
    ));

    let stored = cache
        .get(&CacheKey::feed(url.as_str()))
        .await
        .expect("cache read")
        .expect("entry kept");
    assert_eq!(stored.etag.as_deref(), Some(CACHED_ETAG));
    assert_eq!(cache.sets(), writes_before);
}

#[tokio::test]
async fn unparseable_origin_body_keeps_the_cached_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gone</html>"))
        .mount(&server)
        .await;

    let url = format!("{}/feed.xml", server.uri());
    let cache = seeded_cache(&url).await;
    let handler = handler(cache.clone(), MissPolicy::NotFound);

    let err = handler.serve(&url).await.expect_err("render failed");
    assert!(matches!(err, RevalidateError::Render { .. }));

    let stored = cache
        .get(&CacheKey::feed(url.as_str()))
        .await
        .expect("cache read")
        .expect("entry kept");
    assert_eq!(stored.etag.as_deref(), Some(CACHED_ETAG));
}

#[tokio::test]
async fn unknown_feed_is_not_found_and_never_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss("Nope")))
        .expect(0)
        .mount(&server)
        .await;

    let handler = handler(Arc::new(CountingCache::default()), MissPolicy::NotFound);
    let url = format!("{}/unknown.xml", server.uri());

    let err = handler.serve(&url).await.expect_err("not subscribed");
    assert!(matches!(err, RevalidateError::NotFound { .. }));
}

#[tokio::test]
async fn blank_url_is_rejected() {
    let handler = handler(Arc::new(CountingCache::default()), MissPolicy::FetchOnDemand);

    let err = handler.serve("   ").await.expect_err("blank url");
    assert!(matches!(err, RevalidateError::MissingUrl));

    let err = handler.serve("/").await.expect_err("index key is not a feed");
    assert!(matches!(err, RevalidateError::NotFound { .. }));
}

#[tokio::test]
async fn fetch_on_demand_caches_unsubscribed_feeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/new.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("last-modified", CACHED_LAST_MODIFIED)
                .set_body_string(rss("Newcomer")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(CountingCache::default());
    let handler = handler(cache.clone(), MissPolicy::FetchOnDemand);
    let url = format!("{}/new.xml", server.uri());

    let served = handler.serve(&url).await.expect("fetched on demand");
    assert_eq!(served.revalidation, Revalidation::FetchedOnDemand);
    assert_eq!(served.page.last_modified.as_deref(), Some(CACHED_LAST_MODIFIED));
    assert_eq!(cache.sets(), 1);

    let err = handler
        .serve("file:///etc/passwd")
        .await
        .expect_err("only http origins are proxied");
    assert!(matches!(err, RevalidateError::NotFound { .. }));
}

#[tokio::test]
async fn force_refresh_overwrites_even_when_origin_would_confirm() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .and(header("if-none-match", CACHED_ETAG))
        .respond_with(ResponseTemplate::new(304))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"forced\"")
                .set_body_string(rss("Forced")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/feed.xml", server.uri());
    let cache = seeded_cache(&url).await;
    let handler = handler(cache.clone(), MissPolicy::NotFound);

    let served = handler.force_refresh(&url).await.expect("forced refresh");
    assert_eq!(served.page.etag.as_deref(), Some("\"forced\""));

    let stored = cache
        .get(&CacheKey::feed(url.as_str()))
        .await
        .expect("cache read")
        .expect("entry present");
    assert_eq!(stored.etag.as_deref(), Some("\"forced\""));
}

#[tokio::test]
async fn index_is_not_found_until_published() {
    let cache = Arc::new(CountingCache::default());
    let handler = handler(cache, MissPolicy::NotFound);

    assert!(!handler.has_index().await.expect("cache read"));
    let err = handler.index().await.expect_err("no index yet");
    assert!(matches!(err, RevalidateError::NotFound { .. }));
}
