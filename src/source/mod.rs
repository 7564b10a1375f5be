//! Data source abstraction layer.
//!
//! This module defines the [`DataSource`] trait and the common [`FeedItem`]
//! type.  The only concrete implementation is [`FeedSource`], which speaks
//! RSS 2.0 and falls back to Atom / RSS 1.0 / JSON Feed.
//!
//! The relay talks to sources only through the trait, which is also how the
//! tests substitute canned feeds for the network.

mod feed;
mod feed_item;

pub use feed::FeedSource;
pub use feed_item::FeedItem;

use anyhow::Result;

/// Trait that every data source must implement.
pub trait DataSource {
    /// Human-readable label, used as the first line of every notification.
    fn name(&self) -> &str;

    /// Fetch the current entries, in feed order.
    ///
    /// Any error here is turned into a visible error notification by the
    /// caller, so implementations should not swallow failures.
    fn fetch(&self) -> Result<Vec<FeedItem>>;
}
