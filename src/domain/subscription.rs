use std::collections::HashSet;

use url::{Url, form_urlencoded};

/// Route that serves one cached feed page.
pub const PODCAST_ROUTE: &str = "/podcast";

/// One entry of the index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub title: String,
    pub proxy_link: String,
}

impl Subscription {
    /// Build the index entry for a feed, falling back to the feed URL when the
    /// feed has no title.
    pub fn for_feed(title: &str, feed_url: &str) -> Self {
        let title = title.trim();
        let title = if title.is_empty() { feed_url } else { title };
        Self {
            title: title.to_string(),
            proxy_link: proxy_link(feed_url),
        }
    }
}

/// Local link under which a feed URL is served.
pub fn proxy_link(feed_url: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(feed_url.as_bytes()).collect();
    format!("{PODCAST_ROUTE}?url={encoded}")
}

/// Return the first URL that appears more than once.
/// Whether `url` is an absolute `http`/`https` URL with a host.
pub fn is_web_url(url: &str) -> bool {
    Url::parse(url.trim())
        .is_ok_and(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.has_host())
}

pub fn find_duplicate(feeds: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(feeds.len());
    feeds
        .iter()
        .find(|feed| !seen.insert(feed.as_str()))
        .map(String::as_str)
}
