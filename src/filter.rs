//! Keyword filtering and the fetch-to-candidate step.
//!
//! Matching is plain case-sensitive substring containment over
//! `"<title> <summary-or-description>"`.  No tokenising, no folding.

use tracing::warn;

use crate::config::MatchMode;
use crate::source::{DataSource, FeedItem};

/// A feed entry that passed the keyword filter and awaits the dedup check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Record-store key: the entry's [`FeedItem::id`].
    pub key: String,
    pub source_name: String,
    pub title: String,
    pub link: String,
}

impl Candidate {
    pub fn from_item(source_name: &str, item: FeedItem) -> Self {
        Self {
            key: item.id,
            source_name: source_name.to_string(),
            title: item.title,
            link: item.link,
        }
    }

    /// Stand-in for a feed that could not be fetched.  It flows through the
    /// normal dedup/notify path so the failure shows up in the chat.
    ///
    /// Each source gets its own key, so one failing feed never masks another.
    pub fn fetch_failure(source_name: &str, error: &anyhow::Error) -> Self {
        Self {
            key: format!("fetch-error:{source_name}"),
            source_name: source_name.to_string(),
            title: format!("【抓取失敗: {error:#}】"),
            link: String::new(),
        }
    }

    /// Notification body: source, title and link on separate lines.
    pub fn message(&self) -> String {
        format!("{}\n{}\n{}", self.source_name, self.title, self.link)
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
    mode: MatchMode,
}

impl KeywordFilter {
    pub fn new(keywords: Vec<String>, mode: MatchMode) -> Self {
        Self { keywords, mode }
    }

    pub fn matches_text(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        match self.mode {
            MatchMode::Any => self.keywords.iter().any(|kw| text.contains(kw.as_str())),
            MatchMode::All => self.keywords.iter().all(|kw| text.contains(kw.as_str())),
        }
    }

    pub fn matches(&self, item: &FeedItem) -> bool {
        self.matches_text(&item.search_text())
    }
}

/// Fetch `source` and keep the entries that pass `filter`, in feed order.
///
/// Entries with neither link nor guid/id cannot be de-duplicated and are
/// dropped.  A failed fetch yields exactly one [`Candidate::fetch_failure`].
pub fn fetch_candidates(source: &dyn DataSource, filter: &KeywordFilter) -> Vec<Candidate> {
    let name = source.name();
    match source.fetch() {
        Ok(items) => items
            .into_iter()
            .filter(|item| filter.matches(item))
            .filter(|item| {
                if item.id.is_empty() {
                    warn!(source = name, title = %item.title, "entry has no link or id, skipping");
                    return false;
                }
                true
            })
            .map(|item| Candidate::from_item(name, item))
            .collect(),
        Err(e) => {
            warn!(source = name, error = %format!("{e:#}"), "fetch failed");
            vec![Candidate::fetch_failure(name, &e)]
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
