//! One poll cycle.
//!
//! [`Relay`] owns everything a run needs (config, record store, notifier)
//! and walks the configured sources strictly in order:
//!
//! ```text
//! source ──disabled──► skipped
//!    │
//!    └─fetch─► candidates ──new/changed──► notify ─► record ─► persist
//!                      └────same title──► skip
//! ```
//!
//! There is no parallelism: each fetch, message and file write blocks the
//! cycle until it completes, so notifications arrive in feed order.

use tracing::{debug, error, info};

use crate::config::{Config, Source};
use crate::filter::{fetch_candidates, Candidate, KeywordFilter};
use crate::notify::{Delivery, Notifier};
use crate::source::{DataSource, FeedSource};
use crate::store::DedupStore;

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources_polled: usize,
    pub sources_skipped: usize,
    pub pushed: usize,
    pub duplicates: usize,
}

pub struct Relay {
    config: Config,
    filter: KeywordFilter,
    store: DedupStore,
    notifier: Notifier,
}

impl Relay {
    /// Assemble a relay for one cycle.
    ///
    /// # Arguments
    ///
    /// * `config` — effective configuration; its keywords build the filter.
    /// * `store` — records loaded from the previous run.
    /// * `notifier` — where new and edited entries are delivered.
    pub fn new(config: Config, store: DedupStore, notifier: Notifier) -> Self {
        let filter = KeywordFilter::new(config.keywords.clone(), config.match_mode);
        Self {
            config,
            filter,
            store,
            notifier,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    // -- polling -------------------------------------------------------------

    /// Poll every configured feed over HTTP.
    pub fn run(&mut self) -> RunSummary {
        self.run_with(|source: &Source| -> Box<dyn DataSource> {
            Box::new(FeedSource::new(&source.url, &source.name))
        })
    }

    /// Poll every configured source, building each [`DataSource`] with
    /// `open`.
    pub fn run_with<F>(&mut self, open: F) -> RunSummary
    where
        F: Fn(&Source) -> Box<dyn DataSource>,
    {
        let mut summary = RunSummary::default();
        let sources = self.config.sources.clone();

        for source in &sources {
            if !source.enabled {
                info!(source = %source.name, "source disabled, skipping");
                summary.sources_skipped += 1;
                continue;
            }

            let feed = open(source);
            summary.sources_polled += 1;
            for candidate in fetch_candidates(feed.as_ref(), &self.filter) {
                if self.push_if_new(&candidate) {
                    summary.pushed += 1;
                } else {
                    summary.duplicates += 1;
                }
            }
        }

        info!(
            polled = summary.sources_polled,
            skipped = summary.sources_skipped,
            pushed = summary.pushed,
            duplicates = summary.duplicates,
            "poll cycle finished"
        );
        summary
    }

    // -- per-candidate decision ---------------------------------------------

    /// Notify, record and persist `candidate` unless it is a duplicate.
    /// Returns whether it was pushed.
    fn push_if_new(&mut self, candidate: &Candidate) -> bool {
        if !self.store.is_new_or_changed(&candidate.key, &candidate.title) {
            debug!(title = %candidate.title, key = %candidate.key, "duplicate, skipping");
            return false;
        }

        // Delivery failures are already logged; the item still counts as pushed.
        if self.notifier.send(&candidate.message(), self.config.delay) == Delivery::Sent {
            info!(title = %candidate.title, link = %candidate.link, "pushed");
        }

        self.store.record(&candidate.key, &candidate.title);
        if let Err(e) = self.store.persist() {
            error!(error = %e, "cannot save records, will retry on next push");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
