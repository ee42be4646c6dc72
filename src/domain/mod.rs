//! Domain layer types and invariants.

pub mod feed;
pub mod page;
pub mod subscription;

pub use feed::{Enclosure, Image, Item, Metadata, Podcast, TocEntry};
pub use page::{CacheKey, Page, Validators};
pub use subscription::{Subscription, find_duplicate, is_web_url};
