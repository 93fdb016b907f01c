//! Batch deletion of selected files. One failure never stops the batch.

use crate::cache::ClassificationCache;
use crate::models::{MediaFile, MediaKind};
use crate::thumbnails::ThumbnailStore;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub deleted: Vec<PathBuf>,
    pub bytes_freed: u64,
}

#[derive(Debug, Clone, Default)]
pub enum DeleteState {
    #[default]
    Idle,
    Deleting {
        total: usize,
    },
    Done(DeletionReport),
}

/// Deletes each file that lies inside one of `roots`. Symbolic links and
/// paths resolving outside every root are refused and reported as failures.
pub async fn delete_files(
    files: &[MediaFile],
    roots: &[PathBuf],
    cache: &ClassificationCache,
    thumbnails: &ThumbnailStore,
) -> DeletionReport {
    let roots: Vec<PathBuf> = roots
        .iter()
        .filter_map(|r| std::fs::canonicalize(r).ok())
        .collect();
    let mut report = DeletionReport::default();
    for file in files {
        let outcome = match confine(&file.path, &roots).await {
            Ok(()) => tokio::fs::remove_file(&file.path).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {
                if file.kind == MediaKind::Document {
                    if let Err(e) = thumbnails.remove(&file.path) {
                        warn!("cannot remove thumbnail for {:?}: {}", file.path, e);
                    }
                }
                report.succeeded += 1;
                report.bytes_freed += file.size;
                report.deleted.push(file.path.clone());
            }
            Err(e) => {
                warn!("cannot delete {:?}: {}", file.path, e);
                report.failed += 1;
                report.errors.push(format!("{}: {}", file.name, e));
            }
        }
    }

    let keys: Vec<String> = report
        .deleted
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    if let Err(e) = cache.evict(keys.iter().map(String::as_str)).await {
        warn!("cache eviction after delete failed: {}", e);
    }
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        "delete finished"
    );
    report
}

/// Fails unless `path` is a regular file whose canonical location is under
/// one of the (canonical) `roots`.
async fn confine(path: &Path, roots: &[PathBuf]) -> io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "not a regular file",
        ));
    }
    let canonical = tokio::fs::canonicalize(path).await?;
    if roots.iter().any(|r| canonical.starts_with(r)) {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "outside the scanned media folders",
        ))
    }
}
