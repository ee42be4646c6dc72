use askama::Template;

use crate::domain::{
    Enclosure, Image, Item, Metadata, Podcast, Subscription, TocEntry, is_web_url,
};

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: IndexView,
}

#[derive(Template)]
#[template(path = "podcast.html")]
pub struct PodcastTemplate {
    pub view: PodcastView,
}

#[derive(Clone, Debug)]
pub struct IndexView {
    pub subscriptions: Vec<Subscription>,
}

#[derive(Clone, Debug)]
pub struct PodcastView {
    pub title: String,
    pub feed_url: String,
    /// `feed_url` when it is safe to link to, otherwise empty.
    pub feed_link: String,
    pub description_html: String,
    pub language: String,
    pub link: String,
    pub images: Vec<Image>,
    pub metadata: Vec<Metadata>,
    pub toc: Vec<TocEntry>,
    pub items: Vec<ItemView>,
}

#[derive(Clone, Debug)]
pub struct ItemView {
    pub anchor: String,
    pub title: String,
    pub link: String,
    pub guid: String,
    pub description_html: String,
    pub images: Vec<Image>,
    pub enclosures: Vec<Enclosure>,
    pub metadata: Vec<Metadata>,
}

impl PodcastView {
    pub fn new(feed_url: &str, podcast: Podcast) -> Self {
        let Podcast {
            title,
            description,
            language,
            link,
            images,
            metadata,
            items,
            toc,
        } = podcast;

        let title = if title.trim().is_empty() {
            feed_url.to_string()
        } else {
            title
        };

        Self {
            title,
            feed_url: feed_url.to_string(),
            feed_link: web_link(feed_url.to_string()),
            description_html: sanitize(&description),
            language,
            link: web_link(link),
            images: web_images(images),
            metadata,
            toc,
            items: items.into_iter().map(ItemView::from).collect(),
        }
    }

    pub fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }
}

impl From<Item> for ItemView {
    fn from(item: Item) -> Self {
        Self {
            anchor: item.anchor,
            title: item.title,
            link: web_link(item.link),
            guid: item.guid,
            description_html: sanitize(&item.description),
            images: web_images(item.images),
            enclosures: item
                .enclosures
                .into_iter()
                .filter(|enclosure| is_web_url(&enclosure.url))
                .collect(),
            metadata: item.metadata,
        }
    }
}

// Feed-supplied URLs end up in href/src attributes; anything other than
// http(s) is dropped so a feed cannot plant `javascript:` links.
fn web_link(url: String) -> String {
    if is_web_url(&url) {
        url
    } else {
        String::new()
    }
}

fn web_images(images: Vec<Image>) -> Vec<Image> {
    images
        .into_iter()
        .filter(|image| is_web_url(&image.url))
        .collect()
}

/// Strip scripts, handlers and other unsafe markup from feed-supplied HTML.
pub fn sanitize(html: &str) -> String {
    ammonia::clean(html)
}
