use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, ETAG, LAST_MODIFIED, VARY},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::Deserialize;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        render::gunzip,
        revalidate::{RevalidateError, RevalidationHandler},
    },
    domain::{Page, subscription::PODCAST_ROUTE},
};

use super::middleware::{log_responses, set_request_context};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub pages: Arc<RevalidationHandler>,
}

impl HttpState {
    pub fn new(pages: Arc<RevalidationHandler>) -> Self {
        Self { pages }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route(PODCAST_ROUTE, get(podcast))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedQuery {
    url: Option<String>,
}

async fn index(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    match state.pages.index().await {
        Ok(page) => page_response(&page, &[], &headers),
        Err(RevalidateError::NotFound { .. }) => HttpError::new(
            "infra::http::public::index",
            StatusCode::SERVICE_UNAVAILABLE,
            "Podcast index is still being built",
            "index page has not been published yet",
        )
        .into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn podcast(
    State(state): State<HttpState>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
) -> Response {
    let url = query.url.unwrap_or_default();
    match state.pages.serve(&url).await {
        Ok(served) => page_response(&served.page, &served.upstream_headers, &headers),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn health(State(state): State<HttpState>) -> Response {
    match state.pages.has_index().await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::public::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Build the response for a cached page, sending the stored gzip bytes as-is
/// when the client accepts them and inflating them otherwise.
fn page_response(
    page: &Page,
    upstream: &[(HeaderName, HeaderValue)],
    request: &HeaderMap,
) -> Response {
    let gzip = accepts_gzip(request);
    let body = if gzip {
        page.body.clone()
    } else {
        match gunzip(&page.body) {
            Ok(html) => Bytes::from(html),
            Err(err) => {
                return HttpError::from_error(
                    "infra::http::public::page_response",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Cached page is unreadable",
                    &err,
                )
                .into_response();
            }
        }
    };

    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    headers.insert(VARY, HeaderValue::from_static("accept-encoding"));
    if gzip {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }

    if let Some(etag) = page.etag.as_deref().and_then(header_value) {
        headers.insert(ETAG, etag);
    }
    if let Some(last_modified) = page.last_modified.as_deref().and_then(header_value) {
        headers.insert(LAST_MODIFIED, last_modified);
    }

    for (name, value) in upstream {
        headers.append(name.clone(), value.clone());
    }

    response
}

fn header_value(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value).ok()
}

/// Whether `Accept-Encoding` admits gzip (explicitly or via `*`) with a
/// non-zero quality.
fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|entry| {
            let mut parts = entry.split(';');
            let coding = parts.next().unwrap_or_default().trim();
            let refused = parts.any(|param| {
                param
                    .trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });
            (coding.eq_ignore_ascii_case("gzip") || coding == "*") && !refused
        })
}
