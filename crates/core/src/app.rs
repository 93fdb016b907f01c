//! Command surface for a presentation layer: start/cancel scans, observe
//! results, select, delete, clear the cache and edit preferences.

use crate::cache::ClassificationCache;
use crate::classifier::Classifier;
use crate::config::AppConfig;
use crate::delete::{delete_files, DeleteState, DeletionReport};
use crate::error::{CacheError, PipelineError};
use crate::media::MediaSource;
use crate::config::ScanConfig;
use crate::models::{Category, MediaFile};
use crate::paths;
use crate::pipeline::{ScanEvent, ScanPipeline, ScanState, ScanSummary};
use crate::prefs::{PreferencesStore, UserPreferences};
use crate::results::ResultStore;
use crate::thumbnails::ThumbnailStore;
use anyhow::Context;
use providers::{LabelerFactory, ProviderRegistry};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use storage::KeyValueStore;
use tokio::sync::{mpsc, watch};
use tracing::info;

pub struct NoteSweeper {
    pipeline: ScanPipeline,
    cache: Arc<ClassificationCache>,
    classifier: Arc<Classifier>,
    prefs: PreferencesStore,
    thumbnails: Arc<ThumbnailStore>,
    results: Mutex<ResultStore>,
    scan_config: ScanConfig,
    delete_state: watch::Sender<DeleteState>,
}

impl NoteSweeper {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        media: Arc<dyn MediaSource>,
        labeler: Arc<dyn LabelerFactory>,
    ) -> Self {
        let cache = Arc::new(ClassificationCache::new(Arc::clone(&store)));
        let classifier = Arc::new(Classifier::new(
            labeler,
            config.classifier.model.clone(),
            config.classifier.input_size,
        ));
        let thumbnails = Arc::new(ThumbnailStore::new(&config.scan.thumbnail_dir));
        let pipeline = ScanPipeline::new(
            config.scan.clone(),
            Arc::clone(&cache),
            Arc::clone(&classifier),
            media,
            Arc::clone(&thumbnails),
        );
        let (delete_state, _) = watch::channel(DeleteState::Idle);
        Self {
            pipeline,
            cache,
            classifier,
            prefs: PreferencesStore::new(store, config.preferences),
            thumbnails,
            results: Mutex::new(ResultStore::new()),
            scan_config: config.scan.clone(),
            delete_state,
        }
    }

    /// Picks the labeler named by `classifier.provider`.
    pub fn from_registry(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        media: Arc<dyn MediaSource>,
        registry: &ProviderRegistry,
    ) -> anyhow::Result<Self> {
        let labeler = registry
            .labeler(Some(&config.classifier.provider))
            .with_context(|| format!("labeler '{}'", config.classifier.provider))?;
        Ok(Self::new(config, store, media, labeler))
    }

    pub async fn scan(&self) -> Result<Option<ScanSummary>, PipelineError> {
        self.scan_with(|_| {}).await
    }

    /// Runs a scan, applying every event to the result lists before handing
    /// it to `observer`. A no-op returning `Ok(None)` if a scan is running.
    pub async fn scan_with<F>(&self, mut observer: F) -> Result<Option<ScanSummary>, PipelineError>
    where
        F: FnMut(&ScanEvent),
    {
        let prefs = self.prefs.load().await;
        let (tx, mut rx) = mpsc::channel(64);
        let run = self.pipeline.run(prefs, tx);
        let consume = async {
            while let Some(event) = rx.recv().await {
                self.apply(&event);
                observer(&event);
            }
        };
        let (result, ()) = tokio::join!(run, consume);
        result
    }

    fn apply(&self, event: &ScanEvent) {
        let mut results = self.results();
        match event {
            ScanEvent::Started => results.clear(),
            ScanEvent::Found { file, category } => results.insert(file.clone(), *category),
            ScanEvent::Completed(_) => results.sort(),
            ScanEvent::Progress(_) | ScanEvent::Failed(_) => {}
        }
    }

    pub fn cancel_scan(&self) {
        self.pipeline.cancel();
    }

    pub fn scan_state(&self) -> watch::Receiver<ScanState> {
        self.pipeline.state()
    }

    pub fn current_scan_state(&self) -> ScanState {
        self.pipeline.current_state()
    }

    pub fn list(&self, category: Category) -> Vec<MediaFile> {
        self.results().list(category).to_vec()
    }

    pub fn toggle_selection(&self, path: &Path) -> Option<bool> {
        self.results().toggle(path)
    }

    pub fn set_selection(&self, paths: &[PathBuf], selected: bool) -> usize {
        self.results().set_selected(paths, selected)
    }

    pub fn select_all(&self, category: Category, selected: bool) -> usize {
        self.results().select_all(category, selected)
    }

    pub fn clear_selection(&self) {
        self.results().clear_selection()
    }

    pub fn selected(&self) -> Vec<MediaFile> {
        self.results().selected()
    }

    pub fn delete_state(&self) -> watch::Receiver<DeleteState> {
        self.delete_state.subscribe()
    }

    /// Deletes the current selection and drops deleted files from the lists.
    pub async fn delete_selected(&self) -> DeletionReport {
        let selected = self.selected();
        self.delete_state.send_replace(DeleteState::Deleting {
            total: selected.len(),
        });
        let roots = paths::scan_roots(&self.scan_config);
        let report = delete_files(&selected, &roots, &self.cache, &self.thumbnails).await;
        {
            let mut results = self.results();
            for path in &report.deleted {
                results.remove(path);
            }
        }
        self.delete_state
            .send_replace(DeleteState::Done(report.clone()));
        report
    }

    pub async fn clear_cache(&self) -> Result<(), CacheError> {
        self.cache.clear().await?;
        info!("classification cache cleared");
        Ok(())
    }

    pub async fn preferences(&self) -> UserPreferences {
        self.prefs.load().await
    }

    /// Saves preferences and re-partitions the current lists under the new
    /// threshold. The engine picks the threshold up on its next call.
    pub async fn update_preferences(
        &self,
        prefs: UserPreferences,
    ) -> Result<UserPreferences, CacheError> {
        let saved = self.prefs.save(prefs).await?;
        let mut results = self.results();
        let files: Vec<MediaFile> = Category::ALL
            .iter()
            .flat_map(|c| results.list(*c).to_vec())
            .collect();
        for file in files {
            if let Some(c) = file.classification {
                let category = Category::for_classification(&c, saved.confidence_threshold);
                results.insert(file, category);
            }
        }
        results.sort();
        Ok(saved)
    }

    /// Releases the labeling engine.
    pub async fn shutdown(&self) {
        self.classifier.release().await;
    }

    fn results(&self) -> MutexGuard<'_, ResultStore> {
        self.results.lock().unwrap_or_else(|e| e.into_inner())
    }
}
