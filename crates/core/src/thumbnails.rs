//! Generated preview images for documents, keyed by a hash of the source path.

use crate::error::MediaError;
use crate::media::image_error;
use image::DynamicImage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const THUMBNAIL_SIZE: u32 = 256;

#[derive(Debug, Clone)]
pub struct ThumbnailStore {
    dir: PathBuf,
}

impl ThumbnailStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, source: &Path) -> PathBuf {
        let hash = blake3::hash(source.to_string_lossy().as_bytes());
        self.dir.join(format!("{}.png", hash.to_hex()))
    }

    /// Returns the thumbnail path if one was already generated.
    pub fn existing(&self, source: &Path) -> Option<PathBuf> {
        let p = self.path_for(source);
        p.is_file().then_some(p)
    }

    pub fn write(&self, source: &Path, page: &DynamicImage) -> Result<PathBuf, MediaError> {
        fs::create_dir_all(&self.dir).map_err(|e| MediaError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let target = self.path_for(source);
        page.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
            .save(&target)
            .map_err(|e| image_error(&target, e))?;
        Ok(target)
    }

    /// Missing thumbnails are not an error.
    pub fn remove(&self, source: &Path) -> io::Result<()> {
        match fs::remove_file(self.path_for(source)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
