//! HTTP feed source.
//!
//! Fetches a feed URL with blocking [`reqwest`] and parses the body.  RSS 2.0
//! goes through the [`rss`] crate; anything it rejects is handed to
//! [`feed_rs`], which understands Atom, RSS 1.0 and JSON Feed.  Both parsers
//! are pure functions over bytes so tests never touch the network.

use anyhow::Result;
use thiserror::Error;
use tracing::debug;

use super::{DataSource, FeedItem};

/// Title substituted for entries that carry none.
const UNTITLED: &str = "(untitled)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} when fetching {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("unrecognised feed format (rss: {rss}; atom/json: {fallback})")]
    Parse { rss: String, fallback: String },
}

/// A feed polled over HTTP.
pub struct FeedSource {
    /// The feed URL to poll.
    pub url: String,
    /// Source name from the configuration.
    pub label: String,
}

impl FeedSource {
    /// Create a new feed source.
    ///
    /// # Arguments
    ///
    /// * `url` — full URL of the feed (e.g. `https://blog.rust-lang.org/feed.xml`).
    /// * `label` — source name, printed as the first line of each message.
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: label.into(),
        }
    }

    /// Parse a raw feed body, RSS 2.0 first and then the generic parser.
    pub fn parse_bytes(body: &[u8]) -> Result<Vec<FeedItem>, FetchError> {
        match rss::Channel::read_from(body) {
            Ok(channel) => Ok(Self::parse_channel(&channel)),
            Err(rss_err) => match feed_rs::parser::parse(body) {
                Ok(feed) => Ok(Self::parse_feed(feed)),
                Err(fallback_err) => Err(FetchError::Parse {
                    rss: rss_err.to_string(),
                    fallback: fallback_err.to_string(),
                }),
            },
        }
    }

    /// Convert an already-parsed [`rss::Channel`] into [`FeedItem`]s.
    pub fn parse_channel(channel: &rss::Channel) -> Vec<FeedItem> {
        channel
            .items()
            .iter()
            .map(|item| {
                // Prefer <link>, fall back to <guid>.
                let entry = FeedItem::new(
                    item.title().unwrap_or(UNTITLED),
                    item.link().unwrap_or_default(),
                )
                .with_fallback_id(item.guid().map(|g| g.value()));
                FeedItem {
                    description: item.description().map(String::from),
                    ..entry
                }
            })
            .collect()
    }

    /// Convert a [`feed_rs`] model (Atom and friends) into [`FeedItem`]s.
    pub fn parse_feed(feed: feed_rs::model::Feed) -> Vec<FeedItem> {
        feed.entries
            .into_iter()
            .map(|entry| {
                let link = select_entry_link(&entry);
                let title = entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| UNTITLED.to_string());
                let item = FeedItem::new(title, link).with_fallback_id(Some(entry.id.as_str()));
                FeedItem {
                    summary: entry.summary.map(|s| s.content),
                    description: entry.content.and_then(|c| c.body),
                    ..item
                }
            })
            .collect()
    }
}

/// The article URL of an entry: the first `alternate` (or rel-less) link,
/// else any non-empty link, else an `http(s)` id.
fn select_entry_link(entry: &feed_rs::model::Entry) -> String {
    let alternate = entry.links.iter().find(|link| {
        let rel = link.rel.as_deref().unwrap_or("");
        !link.href.trim().is_empty() && (rel.is_empty() || rel.eq_ignore_ascii_case("alternate"))
    });
    if let Some(link) = alternate.or_else(|| entry.links.iter().find(|l| !l.href.trim().is_empty())) {
        return link.href.trim().to_string();
    }
    let id = entry.id.trim();
    if id.starts_with("http://") || id.starts_with("https://") {
        return id.to_string();
    }
    String::new()
}

impl DataSource for FeedSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn fetch(&self) -> Result<Vec<FeedItem>> {
        debug!(url = %self.url, "fetching feed");
        let response = reqwest::blocking::get(&self.url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: self.url.clone(),
            }
            .into());
        }
        let body = response.bytes()?;
        let items = Self::parse_bytes(body.as_ref())?;
        debug!(count = items.len(), source = %self.label, "parsed feed");
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rss_items_in_order() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>https://example.com</link>
    <description>feed</description>
    <item>
      <title>First Post</title>
      <link>https://example.com/1</link>
      <description>First description</description>
    </item>
    <item>
      <title>Second Post</title>
      <link>https://example.com/2</link>
    </item>
  </channel>
</rss>"#;

        let items = FeedSource::parse_bytes(xml.as_bytes()).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First Post");
        assert_eq!(items[0].link, "https://example.com/1");
        assert_eq!(items[0].description.as_deref(), Some("First description"));
        assert_eq!(items[0].body(), "First description");
        assert_eq!(items[1].title, "Second Post");
        assert!(items[1].description.is_none());
    }

    #[test]
    fn handles_missing_title_and_link() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <description>only a body</description>
    </item>
  </channel>
</rss>"#;

        let items = FeedSource::parse_bytes(xml.as_bytes()).unwrap();

        assert_eq!(items[0].title, "(untitled)");
        assert_eq!(items[0].link, "");
        assert_eq!(items[0].id, "", "no link and no guid leaves no identity");
    }

    #[test]
    fn rss_id_falls_back_to_guid() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <title>With link</title>
      <link>https://example.com/1</link>
      <guid>guid-1</guid>
    </item>
    <item>
      <title>No link</title>
      <guid isPermaLink="false">guid-2</guid>
    </item>
  </channel>
</rss>"#;

        let items = FeedSource::parse_bytes(xml.as_bytes()).unwrap();

        assert_eq!(items[0].id, "https://example.com/1");
        assert_eq!(items[1].id, "guid-2");
        assert_eq!(items[1].link, "");
    }

    #[test]
    fn atom_prefers_alternate_link() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:feed</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Commented</title>
    <id>urn:entry:1</id>
    <link rel="replies" href="https://example.com/1/comments"/>
    <link rel="alternate" href="https://example.com/1"/>
    <updated>2024-01-01T00:00:00Z</updated>
  </entry>
  <entry>
    <title>Edit link only</title>
    <id>urn:entry:2</id>
    <link rel="edit" href="https://example.com/2/edit"/>
    <updated>2024-01-01T00:00:00Z</updated>
  </entry>
  <entry>
    <title>No links</title>
    <id>https://example.com/3</id>
    <updated>2024-01-01T00:00:00Z</updated>
  </entry>
</feed>"#;

        let items = FeedSource::parse_bytes(xml.as_bytes()).unwrap();

        assert_eq!(items[0].link, "https://example.com/1");
        assert_eq!(items[0].id, "https://example.com/1");
        assert_eq!(items[1].link, "https://example.com/2/edit");
        assert_eq!(items[2].link, "https://example.com/3");
    }

    #[test]
    fn falls_back_to_atom() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:feed</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Atom Entry</title>
    <id>urn:entry:1</id>
    <link href="https://example.com/atom/1"/>
    <updated>2024-01-01T00:00:00Z</updated>
    <summary>short summary</summary>
  </entry>
</feed>"#;

        let items = FeedSource::parse_bytes(xml.as_bytes()).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Atom Entry");
        assert_eq!(items[0].link, "https://example.com/atom/1");
        assert_eq!(items[0].summary.as_deref(), Some("short summary"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = FeedSource::parse_bytes(b"definitely not xml").unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[test]
    fn name_returns_label() {
        let src = FeedSource::new("http://example.com/feed", "My Feed");
        assert_eq!(src.name(), "My Feed");
    }
}
