//! Persisted path -> classification cache, split into two disjoint key sets.
//!
//! Every mutation goes through one async write lock, so a periodic scan
//! flush and a user-triggered `clear` never interleave.

use crate::error::CacheError;
use crate::models::{Category, Classification, Label};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use storage::KeyValueStore;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const NOTES_KEY: &str = "notes_classifications";
pub const OTHER_KEY: &str = "other_classifications";

/// path -> classification for one category.
pub type CacheMap = HashMap<String, Classification>;

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    path: String,
    confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<Label>,
}

fn key_for(category: Category) -> &'static str {
    match category {
        Category::Notes => NOTES_KEY,
        Category::Other => OTHER_KEY,
    }
}

/// Read-only view taken at scan start.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub notes: CacheMap,
    pub other: CacheMap,
}

impl CacheSnapshot {
    pub fn get(&self, path: &str) -> Option<Classification> {
        self.notes
            .get(path)
            .or_else(|| self.other.get(path))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.notes.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ClassificationCache {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl ClassificationCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Never fails; corrupt or unreadable state is discarded and logged.
    pub async fn load(&self, category: Category) -> CacheMap {
        let key = key_for(category);
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheMap::new(),
            Err(e) => {
                warn!("cannot read {}: {}", key, e);
                return CacheMap::new();
            }
        };
        match serde_json::from_str::<Vec<StoredEntry>>(&raw) {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|e| {
                    let label = e.label.unwrap_or(match category {
                        Category::Notes => Label::Notes,
                        Category::Other => Label::Other,
                    });
                    if Category::of_label(label) != category {
                        warn!(path = %e.path, "cached label {} filed under {}", label, key);
                        return None;
                    }
                    match Classification::new(label, e.confidence) {
                        Ok(c) => Some((e.path, c)),
                        Err(_) => {
                            warn!(path = %e.path, "dropping cached entry with confidence {}", e.confidence);
                            None
                        }
                    }
                })
                .collect(),
            Err(e) => {
                warn!("discarding corrupt {}: {}", key, e);
                if let Err(e) = self.store.remove(key).await {
                    warn!("cannot remove corrupt {}: {}", key, e);
                }
                CacheMap::new()
            }
        }
    }

    /// Overwrites one category. Idempotent.
    pub async fn save(&self, category: Category, map: &CacheMap) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        self.write(category, map).await
    }

    /// Both categories, with any path present in both kept only under notes.
    pub async fn snapshot(&self) -> CacheSnapshot {
        let notes = self.load(Category::Notes).await;
        let mut other = self.load(Category::Other).await;
        other.retain(|path, _| !notes.contains_key(path));
        CacheSnapshot { notes, other }
    }

    /// Writes a batch of fresh results. Each path lands in the category of
    /// its label and is removed from the other one.
    pub async fn merge<'a, I>(&self, batch: I) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = (&'a str, Classification)>,
    {
        let _guard = self.write_lock.lock().await;
        let mut notes = self.load(Category::Notes).await;
        let mut other = self.load(Category::Other).await;
        let mut written = 0;
        for (path, c) in batch {
            match Category::of_label(c.label) {
                Category::Notes => {
                    other.remove(path);
                    notes.insert(path.to_string(), c);
                }
                Category::Other => {
                    notes.remove(path);
                    other.insert(path.to_string(), c);
                }
            }
            written += 1;
        }
        if written == 0 {
            return Ok(0);
        }
        self.write(Category::Notes, &notes).await?;
        self.write(Category::Other, &other).await?;
        debug!(written, "cache batch flushed");
        Ok(written)
    }

    /// Drops entries for the given paths from both categories.
    pub async fn evict<'a, I>(&self, paths: I) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let _guard = self.write_lock.lock().await;
        let mut notes = self.load(Category::Notes).await;
        let mut other = self.load(Category::Other).await;
        let mut removed = 0;
        for path in paths {
            if notes.remove(path).is_some() {
                removed += 1;
            }
            if other.remove(path).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.write(Category::Notes, &notes).await?;
            self.write(Category::Other, &other).await?;
        }
        Ok(removed)
    }

    /// Drops entries whose files no longer exist.
    pub async fn prune_missing(&self) -> Result<usize, CacheError> {
        let _guard = self.write_lock.lock().await;
        let mut pruned = 0;
        for category in Category::ALL {
            let mut map = self.load(category).await;
            let before = map.len();
            map.retain(|path, _| Path::new(path).exists());
            if map.len() != before {
                pruned += before - map.len();
                self.write(category, &map).await?;
            }
        }
        if pruned > 0 {
            debug!(pruned, "stale cache entries removed");
        }
        Ok(pruned)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        for category in Category::ALL {
            self.store.remove(key_for(category)).await?;
        }
        Ok(())
    }

    async fn write(&self, category: Category, map: &CacheMap) -> Result<(), CacheError> {
        let mut entries: Vec<StoredEntry> = map
            .iter()
            .map(|(path, c)| StoredEntry {
                path: path.clone(),
                confidence: c.confidence,
                label: (c.label == Label::Unknown).then_some(c.label),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let raw = serde_json::to_string(&entries)?;
        self.store.put(key_for(category), &raw).await?;
        Ok(())
    }
}
