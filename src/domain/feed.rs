//! Structured form of a parsed feed document.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Podcast {
    pub title: String,
    pub description: String,
    pub language: String,
    pub link: String,
    pub images: Vec<Image>,
    pub metadata: Vec<Metadata>,
    pub items: Vec<Item>,
    /// Empty unless the feed has more than one item.
    pub toc: Vec<TocEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    pub description: String,
    pub link: String,
    pub guid: String,
    /// Fragment identifier used by the table of contents.
    pub anchor: String,
    pub images: Vec<Image>,
    pub enclosures: Vec<Enclosure>,
    pub metadata: Vec<Metadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub key: &'static str,
    pub value: String,
}

impl Metadata {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub anchor: String,
    pub title: String,
}
