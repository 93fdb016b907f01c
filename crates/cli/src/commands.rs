use anyhow::{Context, Result};
use notesweep_core::config::AppConfig;
use notesweep_core::delete::DeletionReport;
use notesweep_core::media::FsMediaSource;
use notesweep_core::pipeline::{ScanEvent, ScanSummary};
use notesweep_core::prefs::UserPreferences;
use notesweep_core::{Category, Label, MediaFile, NoteSweeper};
use providers::http::{HttpLabelerConfig, HttpLabelerFactory};
use providers::noop::NoopLabelerFactory;
use providers::ProviderRegistry;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use storage::SqliteKv;
use tracing::{info, warn};

pub fn build_registry(cfg: &AppConfig) -> ProviderRegistry {
    let mut registry =
        ProviderRegistry::new().with_labeler("noop", Arc::new(NoopLabelerFactory));
    if let Some(base_url) = &cfg.classifier.base_url {
        registry = registry.with_labeler(
            "http",
            Arc::new(HttpLabelerFactory::new(HttpLabelerConfig {
                base_url: base_url.clone(),
                api_key: cfg.classifier.api_key.clone(),
            })),
        );
    }
    registry.set_preferred_labeler("noop")
}

pub async fn open_sweeper(cfg: &AppConfig) -> Result<Arc<NoteSweeper>> {
    let store = SqliteKv::open(&cfg.storage.path)
        .await
        .with_context(|| format!("opening store at {}", cfg.storage.path))?;
    let sweeper = NoteSweeper::from_registry(
        cfg,
        Arc::new(store),
        Arc::new(FsMediaSource::new()),
        &build_registry(cfg),
    )?;
    Ok(Arc::new(sweeper))
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRow {
    pub path: PathBuf,
    pub kind: String,
    pub size: u64,
    pub label: Option<String>,
    pub confidence: Option<f32>,
    pub thumbnail: Option<PathBuf>,
}

impl From<&MediaFile> for FileRow {
    fn from(f: &MediaFile) -> Self {
        Self {
            path: f.path.clone(),
            kind: f.kind.as_str().to_string(),
            size: f.size,
            label: f.classification.map(|c| c.label.to_string()),
            confidence: f.classification.map(|c| c.confidence),
            thumbnail: f.thumbnail.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub summary: ScanSummary,
    pub notes: Vec<FileRow>,
    pub other: Vec<FileRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub scan: ScanSummary,
    pub candidates: Vec<FileRow>,
    /// Files the engine gave no label; never deleted.
    pub unlabeled: usize,
    /// `None` when the deletion was not confirmed.
    pub deletion: Option<DeletionReport>,
}

fn rows(sweeper: &NoteSweeper, category: Category) -> Vec<FileRow> {
    sweeper.list(category).iter().map(FileRow::from).collect()
}

/// Runs one scan, cancelling it on Ctrl-C. `on_found` sees every file as it
/// is decided.
async fn scan_once<F>(sweeper: &Arc<NoteSweeper>, on_found: F) -> Result<ScanSummary>
where
    F: FnMut(&MediaFile, Category),
{
    let watcher = {
        let sweeper = Arc::clone(sweeper);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping scan");
                sweeper.cancel_scan();
            }
        })
    };
    let mut on_found = on_found;
    let result = sweeper
        .scan_with(|event| {
            if let ScanEvent::Found { file, category } = event {
                on_found(file, *category);
            }
        })
        .await;
    watcher.abort();
    result?.context("a scan is already running")
}

pub async fn scan(cfg: &AppConfig, verbose_rows: bool) -> Result<ScanReport> {
    let sweeper = open_sweeper(cfg).await?;
    let prefs = sweeper.preferences().await;
    let summary = scan_once(&sweeper, |file, category| {
        if verbose_rows {
            println!("{}", format_row(file, category, prefs.show_confidence));
        }
    })
    .await?;
    let report = ScanReport {
        summary,
        notes: rows(&sweeper, Category::Notes),
        other: rows(&sweeper, Category::Other),
    };
    sweeper.shutdown().await;
    Ok(report)
}

/// Scans, selects every file positively labeled as something other than
/// notes, and deletes the selection when `confirmed`.
pub async fn clean(cfg: &AppConfig, confirmed: bool) -> Result<CleanReport> {
    let sweeper = open_sweeper(cfg).await?;
    let summary = scan_once(&sweeper, |_, _| {}).await?;
    sweeper.select_all(Category::Other, true);
    let unlabeled: Vec<PathBuf> = sweeper
        .selected()
        .into_iter()
        .filter(|f| f.classification.map_or(true, |c| c.label == Label::Unknown))
        .map(|f| f.path)
        .collect();
    sweeper.set_selection(&unlabeled, false);
    if !unlabeled.is_empty() {
        warn!(count = unlabeled.len(), "files without a label are left in place");
    }
    let candidates: Vec<FileRow> = sweeper.selected().iter().map(FileRow::from).collect();
    let deletion = if confirmed && !candidates.is_empty() {
        Some(sweeper.delete_selected().await)
    } else {
        None
    };
    sweeper.shutdown().await;
    Ok(CleanReport {
        scan: summary,
        candidates,
        unlabeled: unlabeled.len(),
        deletion,
    })
}

pub async fn clear_cache(cfg: &AppConfig) -> Result<()> {
    let sweeper = open_sweeper(cfg).await?;
    sweeper.clear_cache().await?;
    Ok(())
}

/// Applies any given overrides and returns the stored preferences.
pub async fn prefs(
    cfg: &AppConfig,
    threshold: Option<f32>,
    scan_pdfs: Option<bool>,
    show_confidence: Option<bool>,
) -> Result<UserPreferences> {
    let sweeper = open_sweeper(cfg).await?;
    let mut prefs = sweeper.preferences().await;
    if threshold.is_none() && scan_pdfs.is_none() && show_confidence.is_none() {
        return Ok(prefs);
    }
    if let Some(t) = threshold {
        prefs.confidence_threshold = t;
    }
    if let Some(b) = scan_pdfs {
        prefs.scan_pdfs = b;
    }
    if let Some(b) = show_confidence {
        prefs.show_confidence = b;
    }
    let saved = sweeper.update_preferences(prefs).await?;
    info!(threshold = saved.confidence_threshold, "preferences saved");
    Ok(saved)
}

pub fn format_row(file: &MediaFile, category: Category, show_confidence: bool) -> String {
    let tag = match category {
        Category::Notes => "notes",
        Category::Other => "other",
    };
    match (show_confidence, file.classification) {
        (true, Some(c)) => format!("{:<5} {:>4.0}%  {}", tag, c.confidence * 100.0, file.path.display()),
        _ => format!("{:<5} {}", tag, file.path.display()),
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
