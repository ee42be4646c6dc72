use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        HeaderValue, Request, StatusCode,
        header::{ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_TYPE, ETAG, VARY},
    },
    response::Response,
};
use podfeeds::application::origin::{FetchError, OriginFetcher, OriginResponse};
use podfeeds::application::render::{gunzip, gzip};
use podfeeds::application::revalidate::{MissPolicy, RevalidationHandler};
use podfeeds::cache::{MemoryPageCache, PageCache};
use podfeeds::domain::{CacheKey, Page, Validators, subscription::proxy_link};
use podfeeds::infra::http::{HttpState, REQUEST_ID_HEADER, build_router};
use tower::ServiceExt;

const FEED: &str = "https://example.com/feed.xml";
const FEED_HTML: &str = "<h1>Example feed</h1>";

/// Origin that confirms every cached page.
struct ConfirmingOrigin;

#[async_trait]
impl OriginFetcher for ConfirmingOrigin {
    async fn fetch(
        &self,
        _url: &str,
        _validators: &Validators,
    ) -> Result<OriginResponse, FetchError> {
        Ok(OriginResponse::NotModified {
            headers: vec![(CACHE_CONTROL, HeaderValue::from_static("max-age=300"))],
        })
    }
}

fn page(html: &str, etag: Option<&str>) -> Page {
    Page::new(Validators::new(etag, None), gzip(html.as_bytes()).expect("gzip"))
}

async fn router_with(cache: Arc<MemoryPageCache>) -> Router {
    let handler = RevalidationHandler::new(cache, Arc::new(ConfirmingOrigin), MissPolicy::NotFound);
    build_router(HttpState::new(Arc::new(handler)))
}

async fn seeded_router() -> (Router, Page) {
    let cache = Arc::new(MemoryPageCache::new());
    let feed = page(FEED_HTML, Some("\"v1\""));
    cache
        .set(&CacheKey::feed(FEED), feed.clone())
        .await
        .expect("seed feed");
    cache
        .set(&CacheKey::Index, page("<ul>index</ul>", None))
        .await
        .expect("seed index");
    (router_with(cache).await, feed)
}

async fn get(router: Router, uri: &str, accept_gzip: bool) -> Response {
    let mut request = Request::builder().uri(uri);
    if accept_gzip {
        request = request.header(ACCEPT_ENCODING, "gzip, deflate");
    }
    router
        .oneshot(request.body(Body::empty()).expect("request"))
        .await
        .expect("router is infallible")
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

#[tokio::test]
async fn gzip_clients_get_the_stored_bytes() {
    let (router, feed) = seeded_router().await;

    let response = get(router, &proxy_link(FEED), true).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get(CONTENT_ENCODING).unwrap(), "gzip");
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/html; charset=utf-8");
    assert_eq!(headers.get(ETAG).unwrap(), "\"v1\"");
    assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "max-age=300");
    assert!(
        headers
            .get_all(VARY)
            .iter()
            .any(|value| value.as_bytes().eq_ignore_ascii_case(b"accept-encoding"))
    );

    let body = body_bytes(response).await;
    assert_eq!(body, feed.body.to_vec());
    assert_eq!(gunzip(&body).expect("gzip body"), FEED_HTML.as_bytes());
}

#[tokio::test]
async fn identity_clients_get_inflated_html() {
    let (router, _) = seeded_router().await;

    let response = get(router, &proxy_link(FEED), false).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(CONTENT_ENCODING).is_none());
    assert_eq!(body_bytes(response).await, FEED_HTML.as_bytes());
}

#[tokio::test]
async fn index_is_served_from_the_reserved_key() {
    let (router, _) = seeded_router().await;

    let response = get(router, "/", false).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(ETAG).is_none());
    assert_eq!(body_bytes(response).await, b"<ul>index</ul>");
}

#[tokio::test]
async fn index_is_unavailable_before_the_first_rebuild() {
    let router = router_with(Arc::new(MemoryPageCache::new())).await;

    let response = get(router.clone(), "/", true).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = get(router, "/_health", false).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_reports_ready_once_indexed() {
    let (router, _) = seeded_router().await;

    let response = get(router, "/_health", false).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn podcast_without_url_is_a_bad_request() {
    let (router, _) = seeded_router().await;

    let response = get(router.clone(), "/podcast", false).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(router, "/podcast?url=", false).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsubscribed_feed_is_not_found() {
    let (router, _) = seeded_router().await;

    let response = get(router, &proxy_link("https://elsewhere.example/rss"), true).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn request_ids_are_echoed_or_generated() {
    let (router, _) = seeded_router().await;

    let request = Request::builder()
        .uri("/_health")
        .header(REQUEST_ID_HEADER, "trace-123")
        .body(Body::empty())
        .expect("request");
    let response = router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "trace-123");

    let response = get(router, "/_health", false).await;
    let generated = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .expect("generated id")
        .to_str()
        .expect("ascii id");
    assert_eq!(generated.len(), 36);
}
