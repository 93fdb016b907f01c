//! Walks the media roots on the blocking pool and streams candidate files.

use crate::models::MediaKind;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct Candidate {
    /// Canonical path; the identity used for de-duplication and caching.
    pub path: PathBuf,
    pub size: u64,
    pub kind: MediaKind,
}

#[derive(Debug)]
pub enum WalkEvent {
    EnterDir(PathBuf),
    File(Candidate),
    /// An entry below a root could not be read.
    Error { path: Option<PathBuf>, error: String },
    RootFailed { root: PathBuf, error: String },
    Finished { files: usize, roots_ok: usize },
}

/// Spawns the walker. It stops early when `cancel` is set or the receiver
/// is dropped.
///
/// Symbolic links below a root are never followed or reported, so every
/// candidate lives inside the root it was found under. A root whose walk
/// yields errors and no files counts as failed.
pub fn spawn_walk(
    roots: Vec<PathBuf>,
    excludes: GlobSet,
    cancel: Arc<AtomicBool>,
) -> (mpsc::Receiver<WalkEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(100);
    let handle = task::spawn_blocking(move || {
        let mut files = 0usize;
        let mut roots_ok = 0usize;
        'roots: for root in roots {
            if let Err(e) = fs::read_dir(&root) {
                let event = WalkEvent::RootFailed {
                    root: root.clone(),
                    error: e.to_string(),
                };
                if tx.blocking_send(event).is_err() {
                    return;
                }
                continue;
            }

            let mut root_files = 0usize;
            let mut last_error = None;
            for entry in WalkDir::new(&root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || should_descend(e.path(), &excludes))
            {
                if cancel.load(Ordering::SeqCst) {
                    break 'roots;
                }
                let event = match entry {
                    Err(e) => {
                        let error = e.to_string();
                        last_error = Some(error.clone());
                        WalkEvent::Error {
                            path: e.path().map(Path::to_path_buf),
                            error,
                        }
                    }
                    Ok(entry) if entry.path_is_symlink() && entry.depth() > 0 => {
                        debug!(path = %entry.path().display(), "not following symlink");
                        continue;
                    }
                    Ok(entry) if entry.file_type().is_dir() => {
                        WalkEvent::EnterDir(entry.path().to_path_buf())
                    }
                    Ok(entry) => match candidate(entry.path()) {
                        Some(c) => {
                            root_files += 1;
                            WalkEvent::File(c)
                        }
                        None => continue,
                    },
                };
                if tx.blocking_send(event).is_err() {
                    // Receiver dropped, stop walking.
                    return;
                }
            }

            files += root_files;
            match last_error {
                Some(error) if root_files == 0 => {
                    let event = WalkEvent::RootFailed {
                        root: root.clone(),
                        error,
                    };
                    if tx.blocking_send(event).is_err() {
                        return;
                    }
                }
                _ => roots_ok += 1,
            }
        }
        let _ = tx.blocking_send(WalkEvent::Finished { files, roots_ok });
    });
    (rx, handle)
}

fn candidate(path: &Path) -> Option<Candidate> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    let kind = MediaKind::detect(path)?;
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Some(Candidate {
        path: canonical,
        size: meta.len(),
        kind,
    })
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat)?);
    }
    builder.build()
}

fn should_descend(path: &Path, excludes: &GlobSet) -> bool {
    !is_excluded(path, excludes) && !is_hidden(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn is_excluded(path: &Path, excludes: &GlobSet) -> bool {
    excludes.is_match(path)
}
