//! The scan state machine: resolve roots, walk, reuse cached verdicts,
//! classify the rest, and stream results as they are decided.

use crate::cache::{CacheSnapshot, ClassificationCache};
use crate::classifier::Classifier;
use crate::config::ScanConfig;
use crate::error::{ItemError, PipelineError};
use crate::media::{run_blocking, MediaSource};
use crate::models::{path_key, Category, Classification, MediaFile, MediaKind};
use crate::paths;
use crate::prefs::UserPreferences;
use crate::scanner::{build_globset, spawn_walk, Candidate, WalkEvent};
use crate::thumbnails::ThumbnailStore;
use crate::voter::DocumentVoter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanProgress {
    pub processed: usize,
    /// Known once the walk has finished.
    pub total: Option<usize>,
    pub current_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub notes: usize,
    pub other: usize,
    pub from_cache: usize,
    pub classified: usize,
    pub skipped: usize,
    pub roots: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ScanSummary {
    fn new() -> Self {
        Self {
            notes: 0,
            other: 0,
            from_cache: 0,
            classified: 0,
            skipped: 0,
            roots: 0,
            cancelled: false,
            started_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    pub fn nothing_to_scan(&self) -> bool {
        self.roots == 0
    }
}

#[derive(Debug, Clone, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning(ScanProgress),
    Completed(ScanSummary),
    Error(String),
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Started,
    Found { file: MediaFile, category: Category },
    Progress(ScanProgress),
    Completed(ScanSummary),
    Failed(String),
}

/// Held for the duration of a scan. Dropping it consumes any pending
/// cancel request along with the running flag.
struct Running<'a> {
    running: &'a AtomicBool,
    cancel: &'a AtomicBool,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.cancel.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

pub struct ScanPipeline {
    config: ScanConfig,
    cache: Arc<ClassificationCache>,
    classifier: Arc<Classifier>,
    media: Arc<dyn MediaSource>,
    thumbnails: Arc<ThumbnailStore>,
    voter: DocumentVoter,
    running: AtomicBool,
    cancel: Arc<AtomicBool>,
    state: watch::Sender<ScanState>,
}

impl ScanPipeline {
    pub fn new(
        config: ScanConfig,
        cache: Arc<ClassificationCache>,
        classifier: Arc<Classifier>,
        media: Arc<dyn MediaSource>,
        thumbnails: Arc<ThumbnailStore>,
    ) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            voter: DocumentVoter::new(config.max_document_pages),
            config,
            cache,
            classifier,
            media,
            thumbnails,
            running: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ScanState {
        self.state.borrow().clone()
    }

    /// Asks the running scan to stop after the file in flight. A request made
    /// just before a scan starts applies to that scan.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Runs one scan pass. Returns `Ok(None)` without doing anything when a
    /// scan is already running.
    pub async fn run(
        &self,
        prefs: UserPreferences,
        events: mpsc::Sender<ScanEvent>,
    ) -> Result<Option<ScanSummary>, PipelineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("scan requested while one is running; ignoring");
            return Ok(None);
        }
        let _running = Running {
            running: &self.running,
            cancel: &self.cancel,
        };

        let result = self.scan(prefs.normalized(), &events).await;
        match &result {
            Ok(summary) => {
                info!(
                    notes = summary.notes,
                    other = summary.other,
                    cached = summary.from_cache,
                    classified = summary.classified,
                    skipped = summary.skipped,
                    cancelled = summary.cancelled,
                    "scan complete"
                );
                self.state.send_replace(ScanState::Completed(summary.clone()));
                emit(&events, ScanEvent::Completed(summary.clone())).await;
            }
            Err(e) => {
                warn!("scan failed: {}", e);
                self.state.send_replace(ScanState::Error(e.to_string()));
                emit(&events, ScanEvent::Failed(e.to_string())).await;
            }
        }
        result.map(Some)
    }

    async fn scan(
        &self,
        prefs: UserPreferences,
        events: &mpsc::Sender<ScanEvent>,
    ) -> Result<ScanSummary, PipelineError> {
        let started = Instant::now();
        let mut summary = ScanSummary::new();
        let mut progress = ScanProgress::default();
        self.state.send_replace(ScanState::Scanning(progress.clone()));
        emit(events, ScanEvent::Started).await;

        let excludes = build_globset(&self.config.exclude)?;
        let roots = paths::scan_roots(&self.config);
        summary.roots = roots.len();
        if roots.is_empty() {
            info!("no media folders found under {}", self.config.storage_root);
            summary.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(summary);
        }
        info!("scanning {} media folder(s)", roots.len());

        if let Err(e) = self.cache.prune_missing().await {
            warn!("cannot prune stale cache entries: {}", e);
        }
        // Fixed for the whole pass; writes made below never change a
        // skip/process decision already taken.
        let snapshot = self.cache.snapshot().await;
        debug!(entries = snapshot.len(), "cache snapshot loaded");

        let (mut rx, walker) = spawn_walk(roots, excludes, Arc::clone(&self.cancel));
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut pending: Vec<(String, Classification)> = Vec::new();
        let mut root_errors: Vec<String> = Vec::new();
        let mut fatal = None;
        let flush_every = self.config.flush_every.max(1);
        let mut flush_at = flush_every;

        while let Some(event) = rx.recv().await {
            if self.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match event {
                WalkEvent::EnterDir(dir) => {
                    progress.current_dir = dir.file_name().map(|n| n.to_string_lossy().into_owned());
                    tokio::task::yield_now().await;
                }
                WalkEvent::Error { path, error } => {
                    match &path {
                        Some(p) => warn!("cannot read {:?}: {}", p, error),
                        None => warn!("walk error: {}", error),
                    }
                    summary.skipped += 1;
                }
                WalkEvent::RootFailed { root, error } => {
                    warn!("cannot read {:?}: {}", root, error);
                    root_errors.push(format!("{}: {}", root.display(), error));
                }
                WalkEvent::Finished { files, roots_ok } => {
                    if roots_ok == 0 {
                        fatal = Some(PipelineError::NoAccessibleRoots(root_errors.join("; ")));
                    }
                    progress.total = Some(files);
                    self.publish(events, &progress).await;
                }
                WalkEvent::File(candidate) => {
                    if !seen.insert(candidate.path.clone()) {
                        continue;
                    }
                    if candidate.kind == MediaKind::Document && !prefs.scan_pdfs {
                        continue;
                    }
                    match self.process(&candidate, &snapshot, prefs.confidence_threshold).await {
                        Ok((file, fresh)) => {
                            let Some(classification) = file.classification else {
                                continue;
                            };
                            let category =
                                Category::for_classification(&classification, prefs.confidence_threshold);
                            match category {
                                Category::Notes => summary.notes += 1,
                                Category::Other => summary.other += 1,
                            }
                            if fresh {
                                summary.classified += 1;
                                pending.push((path_key(&file.path), classification));
                            } else {
                                summary.from_cache += 1;
                            }
                            emit(events, ScanEvent::Found { file, category }).await;
                            progress.processed += 1;
                            self.publish(events, &progress).await;
                        }
                        Err(e) => {
                            warn!("skipping {:?}: {}", candidate.path, e);
                            summary.skipped += 1;
                        }
                    }
                    if pending.len() >= flush_at {
                        flush_at = if self.flush(&mut pending).await {
                            flush_every
                        } else {
                            // Retry once another batch has accumulated.
                            pending.len() + flush_every
                        };
                    }
                }
            }
        }
        drop(rx);
        self.flush(&mut pending).await;

        if let Err(e) = walker.await {
            return Err(PipelineError::Walk(e.to_string()));
        }
        if let Some(e) = fatal {
            return Err(e);
        }
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// Returns the file with its classification, and whether it was freshly
    /// classified (as opposed to taken from the cache).
    async fn process(
        &self,
        candidate: &Candidate,
        snapshot: &CacheSnapshot,
        threshold: f32,
    ) -> Result<(MediaFile, bool), ItemError> {
        let file = MediaFile::new(candidate.path.clone(), candidate.size, candidate.kind);
        if let Some(cached) = snapshot.get(&path_key(&candidate.path)) {
            let thumb = match candidate.kind {
                MediaKind::Document => self.ensure_thumbnail(&candidate.path).await,
                MediaKind::Image => None,
            };
            return Ok((file.with_classification(cached).with_thumbnail(thumb), false));
        }

        let (classification, thumb) = match candidate.kind {
            MediaKind::Image => {
                let bitmap = run_blocking(&self.media, &candidate.path, |m, p| m.decode_image(p)).await?;
                (self.classifier.classify(&bitmap, threshold).await?, None)
            }
            MediaKind::Document => {
                let verdict = self
                    .voter
                    .vote(
                        &candidate.path,
                        &self.media,
                        &self.classifier,
                        threshold,
                        Some(&self.thumbnails),
                    )
                    .await?;
                (verdict.classification, verdict.thumbnail)
            }
        };
        Ok((
            file.with_classification(classification).with_thumbnail(thumb),
            true,
        ))
    }

    async fn ensure_thumbnail(&self, path: &Path) -> Option<PathBuf> {
        if let Some(existing) = self.thumbnails.existing(path) {
            return Some(existing);
        }
        let page = match run_blocking(&self.media, path, |m, p| m.render_page(p, 0)).await {
            Ok(page) => page,
            Err(e) => {
                debug!("no thumbnail for {:?}: {}", path, e);
                return None;
            }
        };
        match self.thumbnails.write(path, &page) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("thumbnail for {:?} failed: {}", path, e);
                None
            }
        }
    }

    /// Returns whether the pending batch was written.
    async fn flush(&self, pending: &mut Vec<(String, Classification)>) -> bool {
        if pending.is_empty() {
            return true;
        }
        match self
            .cache
            .merge(pending.iter().map(|(p, c)| (p.as_str(), *c)))
            .await
        {
            Ok(_) => {
                pending.clear();
                true
            }
            Err(e) => {
                warn!("cache flush failed, keeping {} entries: {}", pending.len(), e);
                false
            }
        }
    }

    async fn publish(&self, events: &mpsc::Sender<ScanEvent>, progress: &ScanProgress) {
        self.state.send_replace(ScanState::Scanning(progress.clone()));
        emit(events, ScanEvent::Progress(progress.clone())).await;
    }
}

/// A dropped receiver only means nobody is watching.
async fn emit(events: &mpsc::Sender<ScanEvent>, event: ScanEvent) {
    let _ = events.send(event).await;
}
