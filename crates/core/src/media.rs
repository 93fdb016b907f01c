//! Host capabilities the core needs from the platform: decoding images and
//! rendering document pages.

use crate::error::MediaError;
use image::{DynamicImage, ImageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait MediaSource: Send + Sync {
    fn decode_image(&self, path: &Path) -> Result<DynamicImage, MediaError>;
    fn page_count(&self, path: &Path) -> Result<usize, MediaError>;
    fn render_page(&self, path: &Path, page: usize) -> Result<DynamicImage, MediaError>;
}

/// Rasterizes pages of multi-page documents.
pub trait PageRenderer: Send + Sync {
    fn page_count(&self, path: &Path) -> Result<usize, MediaError>;
    fn render_page(&self, path: &Path, page: usize) -> Result<DynamicImage, MediaError>;
}

/// Decodes images from disk; documents go through a renderer when one is built in.
/// With the `pdf` feature the renderer defaults to `PdfRenderer`.
#[derive(Clone)]
pub struct FsMediaSource {
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl Default for FsMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FsMediaSource {
    pub fn new() -> Self {
        #[cfg(feature = "pdf")]
        let renderer: Option<Arc<dyn PageRenderer>> = Some(Arc::new(crate::pdf::PdfRenderer));
        #[cfg(not(feature = "pdf"))]
        let renderer: Option<Arc<dyn PageRenderer>> = None;
        Self { renderer }
    }
}

impl MediaSource for FsMediaSource {
    fn decode_image(&self, path: &Path) -> Result<DynamicImage, MediaError> {
        image::open(path).map_err(|e| image_error(path, e))
    }

    fn page_count(&self, path: &Path) -> Result<usize, MediaError> {
        match &self.renderer {
            Some(r) => r.page_count(path),
            None => Err(MediaError::Unsupported(path.to_path_buf())),
        }
    }

    fn render_page(&self, path: &Path, page: usize) -> Result<DynamicImage, MediaError> {
        match &self.renderer {
            Some(r) => r.render_page(path, page),
            None => Err(MediaError::Unsupported(path.to_path_buf())),
        }
    }
}

pub(crate) fn image_error(path: &Path, err: ImageError) -> MediaError {
    match err {
        ImageError::IoError(source) => MediaError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => MediaError::Decode {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Runs a blocking media call on the blocking pool.
pub async fn run_blocking<T, F>(
    media: &Arc<dyn MediaSource>,
    path: &Path,
    f: F,
) -> Result<T, MediaError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MediaSource, &Path) -> Result<T, MediaError> + Send + 'static,
{
    let media = Arc::clone(media);
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || f(media.as_ref(), &owned))
        .await
        .map_err(|e| MediaError::Decode {
            path: path.to_path_buf(),
            reason: format!("worker failed: {}", e),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_and_reports_garbage() {
        let temp = tempfile::tempdir().unwrap();
        let good = temp.path().join("ok.png");
        image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]))
            .save(&good)
            .unwrap();
        let bad = temp.path().join("bad.png");
        std::fs::write(&bad, b"definitely not a png").unwrap();

        let media = FsMediaSource::new();
        let img = media.decode_image(&good).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
        assert!(matches!(
            media.decode_image(&bad),
            Err(MediaError::Decode { .. })
        ));
        assert!(matches!(
            media.decode_image(&temp.path().join("gone.png")),
            Err(MediaError::Io { .. })
        ));
    }

    #[test]
    fn rendering_without_renderer_is_unsupported() {
        let media = FsMediaSource { renderer: None };
        let doc = Path::new("/x/doc.pdf");
        assert!(matches!(media.page_count(doc), Err(MediaError::Unsupported(_))));
        assert!(matches!(media.render_page(doc, 0), Err(MediaError::Unsupported(_))));
    }
}
