use crate::domain::{CacheKey, Page};

/// A complete set of cache contents produced by one successful rebuild.
///
/// Always contains the index page plus one page per subscribed feed, in
/// subscription order.
#[derive(Debug, Clone)]
pub struct Generation {
    index: Page,
    feeds: Vec<(String, Page)>,
}

impl Generation {
    pub fn new(index: Page, feeds: Vec<(String, Page)>) -> Self {
        Self { index, feeds }
    }

    pub fn index(&self) -> &Page {
        &self.index
    }

    pub fn feeds(&self) -> &[(String, Page)] {
        &self.feeds
    }

    /// Number of entries including the index page.
    pub(crate) fn len(&self) -> usize {
        self.feeds.len() + 1
    }

    pub fn into_entries(self) -> impl Iterator<Item = (CacheKey, Page)> {
        std::iter::once((CacheKey::Index, self.index)).chain(
            self.feeds
                .into_iter()
                .map(|(url, page)| (CacheKey::Feed(url), page)),
        )
    }
}
