//! Persisted user preferences.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::KeyValueStore;
use tracing::warn;

pub const PREFERENCES_KEY: &str = "user_preferences";
pub const MIN_THRESHOLD: f32 = 0.5;
pub const MAX_THRESHOLD: f32 = 0.95;
pub const DEFAULT_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub scan_pdfs: bool,
    pub show_confidence: bool,
    pub confidence_threshold: f32,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            scan_pdfs: true,
            show_confidence: false,
            confidence_threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl UserPreferences {
    /// Threshold forced into [MIN_THRESHOLD, MAX_THRESHOLD].
    pub fn normalized(mut self) -> Self {
        self.confidence_threshold = clamp_threshold(self.confidence_threshold);
        self
    }
}

pub fn clamp_threshold(value: f32) -> f32 {
    if value.is_nan() {
        DEFAULT_THRESHOLD
    } else {
        value.clamp(MIN_THRESHOLD, MAX_THRESHOLD)
    }
}

#[derive(Clone)]
pub struct PreferencesStore {
    store: Arc<dyn KeyValueStore>,
    defaults: UserPreferences,
}

impl PreferencesStore {
    pub fn new(store: Arc<dyn KeyValueStore>, defaults: UserPreferences) -> Self {
        Self {
            store,
            defaults: defaults.normalized(),
        }
    }

    /// Never fails: unreadable or corrupt state falls back to defaults.
    pub async fn load(&self) -> UserPreferences {
        match self.store.get(PREFERENCES_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<UserPreferences>(&raw) {
                Ok(p) => p.normalized(),
                Err(e) => {
                    warn!("discarding corrupt preferences: {}", e);
                    self.defaults
                }
            },
            Ok(None) => self.defaults,
            Err(e) => {
                warn!("cannot read preferences: {}", e);
                self.defaults
            }
        }
    }

    pub async fn save(&self, prefs: UserPreferences) -> Result<UserPreferences, CacheError> {
        let prefs = prefs.normalized();
        let raw = serde_json::to_string(&prefs)?;
        self.store.put(PREFERENCES_KEY, &raw).await?;
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemoryKv;

    #[test]
    fn threshold_is_clamped() {
        assert_eq!(clamp_threshold(0.1), MIN_THRESHOLD);
        assert_eq!(clamp_threshold(1.0), MAX_THRESHOLD);
        assert_eq!(clamp_threshold(0.75), 0.75);
        assert_eq!(clamp_threshold(f32::NAN), DEFAULT_THRESHOLD);
    }

    #[tokio::test]
    async fn save_then_load() {
        let kv = Arc::new(MemoryKv::new());
        let store = PreferencesStore::new(kv, UserPreferences::default());
        assert_eq!(store.load().await, UserPreferences::default());

        let saved = store
            .save(UserPreferences {
                scan_pdfs: false,
                show_confidence: true,
                confidence_threshold: 0.99,
            })
            .await
            .unwrap();
        assert_eq!(saved.confidence_threshold, MAX_THRESHOLD);
        assert_eq!(store.load().await, saved);
    }

    #[tokio::test]
    async fn corrupt_preferences_fall_back_to_defaults() {
        let kv = Arc::new(MemoryKv::new());
        kv.put(PREFERENCES_KEY, "{not json").await.unwrap();
        let store = PreferencesStore::new(kv, UserPreferences::default());
        assert_eq!(store.load().await, UserPreferences::default());
    }
}
