//! Turns origin feed documents into cached HTML pages.
//!
//! Rendering is pure: it parses, templates and compresses, and leaves every
//! cache write to the caller.

mod compress;
mod parse;

use std::time::SystemTime;

use askama::Template;
use thiserror::Error;
use time::{
    OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description,
};

use crate::domain::{Page, Subscription, Validators};
use crate::presentation::views::{IndexTemplate, IndexView, PodcastTemplate, PodcastView};

pub use compress::{gunzip, gzip};
pub use parse::{ParseError, parse_feed};

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("feed could not be parsed: {0}")]
    Parse(#[from] ParseError),
    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),
    #[error("page compression failed: {0}")]
    Compress(#[from] std::io::Error),
}

/// A rendered feed page plus the title the index should list it under.
#[derive(Debug, Clone)]
pub struct RenderedFeed {
    pub title: String,
    pub page: Page,
}

/// Render one feed document. `validators` are the origin's, stored verbatim.
pub fn render_feed_page(
    feed_url: &str,
    document: &[u8],
    validators: Validators,
) -> Result<RenderedFeed, RenderError> {
    let podcast = parse_feed(document)?;
    let title = podcast.title.trim().to_string();

    let html = PodcastTemplate {
        view: PodcastView::new(feed_url, podcast),
    }
    .render()?;

    Ok(RenderedFeed {
        title,
        page: Page::new(validators, gzip(html.as_bytes())?),
    })
}

/// Render the index page listing `subscriptions` in order.
///
/// `modified` is the subscription file's modification time; it becomes the
/// page's `Last-Modified`. The index never carries an ETag.
pub fn render_index_page(
    subscriptions: Vec<Subscription>,
    modified: Option<SystemTime>,
) -> Result<Page, RenderError> {
    let html = IndexTemplate {
        view: IndexView { subscriptions },
    }
    .render()?;

    let validators = Validators {
        etag: None,
        last_modified: modified.and_then(http_date),
    };
    Ok(Page::new(validators, gzip(html.as_bytes())?))
}

/// Format `at` as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(at: SystemTime) -> Option<String> {
    OffsetDateTime::from(at)
        .to_offset(UtcOffset::UTC)
        .format(HTTP_DATE)
        .ok()
}
