//! Feed document parsing.
//!
//! `feed-rs` does the heavy lifting: RSS 0.9x/1.0/2.0, Atom and JSON Feed,
//! declared character sets, prefixed namespaces and XHTML text constructs.
//! This module maps its model onto [`Podcast`] and assigns the positional
//! item anchors the table of contents links to.

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed, Link, Person, Text};
use feed_rs::parser;
use thiserror::Error;

use crate::domain::{Enclosure, Image, Item, Metadata, Podcast, TocEntry};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    Invalid(String),
}

impl From<parser::ParseFeedError> for ParseError {
    fn from(err: parser::ParseFeedError) -> Self {
        Self::Invalid(err.to_string())
    }
}

/// Parse a feed document into a [`Podcast`].
pub fn parse_feed(document: &[u8]) -> Result<Podcast, ParseError> {
    let feed = parser::parse(document)?;
    Ok(podcast_from(feed))
}

fn podcast_from(feed: Feed) -> Podcast {
    let mut metadata = dated(feed.updated, feed.published, &feed.authors);
    if let Some(rights) = text(feed.rights) {
        metadata.push(Metadata::new("Copyright", rights));
    }
    if let Some(generator) = feed.generator.and_then(|g| non_blank(&g.content)) {
        metadata.push(Metadata::new("Generator", generator));
    }

    let images = [feed.logo, feed.icon]
        .into_iter()
        .flatten()
        .filter_map(|image| image_from(&image))
        .collect();

    let items: Vec<Item> = feed
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| item_from(index + 1, entry))
        .collect();

    // A single-episode feed reads fine without a table of contents.
    let toc = if items.len() > 1 {
        items
            .iter()
            .map(|item| TocEntry {
                anchor: item.anchor.clone(),
                title: item.title.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    Podcast {
        title: text(feed.title).unwrap_or_default(),
        description: text(feed.description).unwrap_or_default(),
        language: feed.language.unwrap_or_default(),
        link: alternate_link(&feed.links),
        images,
        metadata,
        items,
        toc,
    }
}

fn item_from(position: usize, entry: Entry) -> Item {
    let mut enclosures: Vec<Enclosure> = entry
        .media
        .iter()
        .flat_map(|media| &media.content)
        .filter_map(|content| {
            let url = content.url.as_ref()?;
            Some(Enclosure {
                url: url.to_string(),
                mime_type: content
                    .content_type
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })
        })
        .collect();
    for link in entry
        .links
        .iter()
        .filter(|link| link.rel.as_deref() == Some("enclosure"))
    {
        if !enclosures.iter().any(|known| known.url == link.href) {
            enclosures.push(Enclosure {
                url: link.href.trim().to_string(),
                mime_type: link.media_type.clone().unwrap_or_default(),
            });
        }
    }

    let images = entry
        .media
        .iter()
        .flat_map(|media| &media.thumbnails)
        .filter_map(|thumbnail| image_from(&thumbnail.image))
        .collect();

    Item {
        title: text(entry.title).unwrap_or_default(),
        description: text(entry.summary).unwrap_or_default(),
        link: alternate_link(&entry.links),
        guid: entry.id,
        anchor: format!("item-{position}"),
        images,
        enclosures,
        metadata: dated(entry.updated, entry.published, &entry.authors),
    }
}

/// `Updated`, `Published` and `Authors`, in that order, each only if present.
fn dated(
    updated: Option<DateTime<Utc>>,
    published: Option<DateTime<Utc>>,
    authors: &[Person],
) -> Vec<Metadata> {
    let mut metadata = Vec::new();
    if let Some(updated) = updated {
        metadata.push(Metadata::new("Updated", updated.to_rfc2822()));
    }
    if let Some(published) = published {
        metadata.push(Metadata::new("Published", published.to_rfc2822()));
    }

    let mut names: Vec<String> = Vec::new();
    for name in authors.iter().filter_map(author) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if !names.is_empty() {
        metadata.push(Metadata::new("Authors", names.join(", ")));
    }
    metadata
}

/// `Name (email)`, or whichever half is present.
fn author(person: &Person) -> Option<String> {
    let name = non_blank(&person.name);
    let email = person.email.as_deref().and_then(non_blank);
    match (name, email) {
        (Some(name), Some(email)) => Some(format!("{name} ({email})")),
        (name, email) => name.or(email),
    }
}

fn alternate_link(links: &[Link]) -> String {
    links
        .iter()
        .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
        .and_then(|link| non_blank(&link.href))
        .unwrap_or_default()
}

fn image_from(image: &feed_rs::model::Image) -> Option<Image> {
    Some(Image {
        title: image.title.as_deref().and_then(non_blank).unwrap_or_default(),
        url: non_blank(&image.uri)?,
    })
}

fn text(text: Option<Text>) -> Option<String> {
    text.and_then(|text| non_blank(&text.content))
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
