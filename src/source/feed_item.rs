//! The entry type shared by every feed format.
//!
//! `FeedItem` is what a [`DataSource`](super::DataSource) hands back: one
//! entry per feed item, in the order the feed listed them.  RSS and Atom
//! parsers both normalise into this struct so the keyword filter and the
//! relay never look at format-specific types.

/// A single feed entry, normalised from any feed format.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeedItem {
    /// Unique identifier used as the de-duplication key.
    ///
    /// The article link when there is one, otherwise the RSS `<guid>` or
    /// Atom `<id>`.  Empty means the entry has no stable identity.
    pub id: String,

    /// Headline.  Parsers substitute `(untitled)` when the feed omits it.
    pub title: String,

    /// URL of the article.  Empty when the feed omits it.
    pub link: String,

    /// Short summary (Atom `<summary>`, or whatever the parser maps there).
    pub summary: Option<String>,

    /// Longer description (RSS `<description>`).
    pub description: Option<String>,
}

impl FeedItem {
    /// Create an entry keyed by its link.
    ///
    /// # Arguments
    ///
    /// * `title` — headline shown in the notification.
    /// * `link` — article URL; also becomes the [`id`](Self::id).
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        let link = link.into();
        Self {
            id: link.trim().to_string(),
            title: title.into(),
            link,
            summary: None,
            description: None,
        }
    }

    /// Use `fallback` as the id when the entry has no link.
    pub fn with_fallback_id(mut self, fallback: Option<&str>) -> Self {
        if self.id.is_empty() {
            if let Some(id) = fallback.map(str::trim).filter(|id| !id.is_empty()) {
                self.id = id.to_string();
            }
        }
        self
    }

    /// Body text used for keyword matching: the summary, else the
    /// description, else nothing.
    pub fn body(&self) -> &str {
        self.summary
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or_default()
    }

    /// `"<title> <body>"`, the haystack searched by the keyword filter.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.body())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
