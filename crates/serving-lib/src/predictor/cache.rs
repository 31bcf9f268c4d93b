//! In-memory cache of deserialized predictors
//!
//! Entries are keyed by model name and stamped with the artifact's
//! modification time and size; a changed artifact invalidates its entry on
//! the next lookup.

use super::Predictor;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Identity of an artifact file at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl ArtifactStamp {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

struct CachedPredictor {
    stamp: ArtifactStamp,
    predictor: Arc<dyn Predictor>,
}

/// Predictor cache shared by request handlers
#[derive(Default)]
pub struct PredictorCache {
    entries: DashMap<String, CachedPredictor>,
}

impl PredictorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached predictor for `name` if its stamp still matches
    pub fn get(&self, name: &str, stamp: ArtifactStamp) -> Option<Arc<dyn Predictor>> {
        if let Some(entry) = self.entries.get(name) {
            if entry.stamp == stamp {
                return Some(entry.predictor.clone());
            }
        }
        self.evict_stale(name, stamp);
        None
    }

    /// Drop the entry of `name` unless it matches `stamp`; an entry refreshed
    /// by a concurrent insert is kept.
    fn evict_stale(&self, name: &str, stamp: ArtifactStamp) {
        self.entries.remove_if(name, |_, entry| entry.stamp != stamp);
    }

    pub fn insert(&self, name: &str, stamp: ArtifactStamp, predictor: Arc<dyn Predictor>) {
        self.entries
            .insert(name.to_string(), CachedPredictor { stamp, predictor });
    }

    pub fn invalidate(&self, name: &str) {
        self.entries.remove(name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
