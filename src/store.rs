//! Persistent record of what has already been pushed.
//!
//! The store maps each link to the title it was last pushed with.  Links
//! are kept in first-insertion order; once there are more than
//! [`MAX_RECORDS`] the oldest are dropped.  Editing a title updates the
//! entry in place and does not make it "younger".
//!
//! On disk it is a single pretty-printed JSON object, rewritten whole on
//! every save.  A file that cannot be read or parsed is replaced by an empty
//! store, which means previously pushed items will be pushed again.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, error, info};

/// Upper bound on stored links.
pub const MAX_RECORDS: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt record file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode records: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Insertion-ordered link → title map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Records {
    order: VecDeque<String>,
    titles: HashMap<String, String>,
}

impl Records {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, link: &str) -> Option<&str> {
        self.titles.get(link).map(String::as_str)
    }

    /// Insert or update.  An existing link keeps its position.
    pub fn insert(&mut self, link: &str, title: &str) {
        match self.titles.get_mut(link) {
            Some(stored) => *stored = title.to_string(),
            None => {
                self.order.push_back(link.to_string());
                self.titles.insert(link.to_string(), title.to_string());
            }
        }
    }

    /// Remove and return the oldest-inserted entry.
    pub fn pop_oldest(&mut self) -> Option<(String, String)> {
        let link = self.order.pop_front()?;
        let title = self.titles.remove(&link).unwrap_or_default();
        Some((link, title))
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.order
            .iter()
            .map(move |link| (link.as_str(), self.titles[link].as_str()))
    }
}

impl Serialize for Records {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (link, title) in self.iter() {
            map.serialize_entry(link, title)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Records {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = Records;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of link to title")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Records, A::Error> {
                let mut records = Records::default();
                while let Some((link, title)) = access.next_entry::<String, String>()? {
                    records.insert(&link, &title);
                }
                Ok(records)
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

// ---------------------------------------------------------------------------
// DedupStore
// ---------------------------------------------------------------------------

/// The dedup store: [`Records`] plus the file they live in.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    records: Records,
    capacity: usize,
}

impl DedupStore {
    /// An empty store backed by `path`; nothing is read.
    ///
    /// # Arguments
    ///
    /// * `path` — JSON file written by [`persist`](Self::persist).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Records::default(),
            capacity: MAX_RECORDS,
        }
    }

    /// Load from `path`.  A missing file is a fresh start; an unreadable or
    /// corrupt one is logged and also treated as a fresh start.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        match Self::read(&store.path) {
            Ok(Some(records)) => {
                debug!(count = records.len(), path = %store.path.display(), "loaded records");
                store.records = records;
            }
            Ok(None) => {
                info!(path = %store.path.display(), "no record file yet, starting empty");
            }
            Err(e) => {
                error!(error = %e, "cannot load records, starting empty");
            }
        }
        store
    }

    fn read(path: &Path) -> Result<Option<Records>, StoreError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    #[cfg(test)]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[cfg(test)]
    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `true` when `link` was never pushed, or was pushed under another title.
    pub fn is_new_or_changed(&self, link: &str, title: &str) -> bool {
        self.records.get(link) != Some(title)
    }

    pub fn record(&mut self, link: &str, title: &str) {
        self.records.insert(link, title);
        self.evict_if_over_capacity();
    }

    /// Drop oldest entries until within capacity.  Returns how many went.
    pub fn evict_if_over_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.records.len() > self.capacity {
            if let Some((link, _)) = self.records.pop_oldest() {
                debug!(%link, "evicted oldest record");
            }
            evicted += 1;
        }
        evicted
    }

    /// Enforce capacity, then rewrite the file.  On failure the in-memory
    /// records are untouched so a later call can succeed.
    pub fn persist(&mut self) -> Result<(), StoreError> {
        self.evict_if_over_capacity();
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(&self.path, json).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
