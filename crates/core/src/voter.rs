//! Multi-page documents: classify a bounded sample of pages and reduce the
//! page verdicts to one.

use crate::classifier::Classifier;
use crate::error::ItemError;
use crate::media::{run_blocking, MediaSource};
use crate::models::{Classification, Label};
use crate::thumbnails::ThumbnailStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_PAGES: usize = 5;

/// Evenly spaced page indices, always including the first and last page.
pub fn sample_pages(total: usize, cap: usize) -> Vec<usize> {
    if total == 0 || cap == 0 {
        return Vec::new();
    }
    if total <= cap {
        return (0..total).collect();
    }
    if cap == 1 {
        return vec![0];
    }
    let mut pages: Vec<usize> = (0..cap).map(|i| i * (total - 1) / (cap - 1)).collect();
    pages.dedup();
    pages
}

/// Groups by label, averages each group, and picks the highest mean.
/// Ties keep the label seen first.
pub fn reduce(pages: &[Classification]) -> Classification {
    let mut groups: Vec<(Label, f32, usize)> = Vec::new();
    for page in pages {
        match groups.iter_mut().find(|(label, _, _)| *label == page.label) {
            Some(group) => {
                group.1 += page.confidence;
                group.2 += 1;
            }
            None => groups.push((page.label, page.confidence, 1)),
        }
    }
    let mut best: Option<Classification> = None;
    for (label, sum, count) in groups {
        let mean = sum / count as f32;
        if best.map(|b| mean > b.confidence).unwrap_or(true) {
            best = Some(Classification::clamped(label, mean));
        }
    }
    best.unwrap_or_else(Classification::unknown)
}

#[derive(Debug, Clone)]
pub struct DocumentVerdict {
    pub classification: Classification,
    pub pages_total: usize,
    pub pages_sampled: usize,
    pub thumbnail: Option<PathBuf>,
}

pub struct DocumentVoter {
    max_pages: usize,
}

impl Default for DocumentVoter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGES)
    }
}

impl DocumentVoter {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    /// Pages are rendered and classified one at a time. Any render or
    /// inference failure fails the whole document and discards its
    /// thumbnail.
    pub async fn vote(
        &self,
        path: &Path,
        media: &Arc<dyn MediaSource>,
        classifier: &Classifier,
        threshold: f32,
        thumbnails: Option<&ThumbnailStore>,
    ) -> Result<DocumentVerdict, ItemError> {
        let total = run_blocking(media, path, |m, p| m.page_count(p)).await?;
        let pages = sample_pages(total, self.max_pages);
        debug!(path = %path.display(), total, sampled = pages.len(), "voting on document");

        let mut thumbnail = None;
        let sampled = sample(
            path,
            &pages,
            media,
            classifier,
            threshold,
            thumbnails,
            &mut thumbnail,
        )
        .await;
        let verdicts = match sampled {
            Ok(v) => v,
            Err(e) => {
                if let (Some(store), Some(_)) = (thumbnails, thumbnail.take()) {
                    if let Err(err) = store.remove(path) {
                        warn!("cannot remove thumbnail for {:?}: {}", path, err);
                    }
                }
                return Err(e);
            }
        };

        Ok(DocumentVerdict {
            classification: reduce(&verdicts),
            pages_total: total,
            pages_sampled: pages.len(),
            thumbnail,
        })
    }
}

async fn sample(
    path: &Path,
    pages: &[usize],
    media: &Arc<dyn MediaSource>,
    classifier: &Classifier,
    threshold: f32,
    thumbnails: Option<&ThumbnailStore>,
    thumbnail: &mut Option<PathBuf>,
) -> Result<Vec<Classification>, ItemError> {
    let mut verdicts = Vec::with_capacity(pages.len());
    for &page in pages {
        let bitmap = run_blocking(media, path, move |m, p| m.render_page(p, page)).await?;
        if page == 0 {
            if let Some(store) = thumbnails {
                match store.write(path, &bitmap) {
                    Ok(t) => *thumbnail = Some(t),
                    Err(e) => warn!("thumbnail for {:?} failed: {}", path, e),
                }
            }
        }
        verdicts.push(classifier.classify(&bitmap, threshold).await?);
    }
    Ok(verdicts)
}
