//! Locates the messenger's media folders across storage layouts.

use crate::config::ScanConfig;
use std::path::{Path, PathBuf};

/// First API level with scoped storage, where media moved under
/// `Android/media/<package>`.
pub const SCOPED_STORAGE_VERSION: u32 = 30;

const SCOPED_LAYOUTS: &[&str] = &[
    "Android/media/com.whatsapp/WhatsApp/Media",
    "Android/media/com.whatsapp.w4b/WhatsApp Business/Media",
];

const LEGACY_LAYOUTS: &[&str] = &["WhatsApp/Media", "WhatsApp Business/Media"];

const MEDIA_FOLDERS: &[&str] = &[
    "WhatsApp Images",
    "WhatsApp Documents",
    "WhatsApp Business Images",
    "WhatsApp Business Documents",
];

#[derive(Debug, Clone)]
pub struct PathResolver {
    storage_root: PathBuf,
    os_version: u32,
}

impl PathResolver {
    pub fn new(storage_root: impl Into<PathBuf>, os_version: u32) -> Self {
        Self {
            storage_root: storage_root.into(),
            os_version,
        }
    }

    /// Every plausible folder in priority order, existing or not.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let layouts: Vec<&str> = if self.os_version >= SCOPED_STORAGE_VERSION {
            SCOPED_LAYOUTS.iter().chain(LEGACY_LAYOUTS).copied().collect()
        } else {
            LEGACY_LAYOUTS.iter().chain(SCOPED_LAYOUTS).copied().collect()
        };
        let mut out = Vec::new();
        for layout in layouts {
            let media = self.storage_root.join(layout);
            for folder in MEDIA_FOLDERS {
                out.push(media.join(folder));
            }
        }
        out
    }

    /// Candidates that exist as directories. An empty result is a valid
    /// "nothing to scan" answer.
    pub fn resolve(&self) -> Vec<PathBuf> {
        self.candidates().into_iter().filter(|p| p.is_dir()).collect()
    }
}

/// Resolved folders followed by any configured extra roots, de-duplicated.
pub fn scan_roots(cfg: &ScanConfig) -> Vec<PathBuf> {
    let resolver = PathResolver::new(&cfg.storage_root, cfg.os_version);
    let mut roots = resolver.resolve();
    for extra in &cfg.include {
        let p = PathBuf::from(extra);
        if p.is_dir() && !contains(&roots, &p) {
            roots.push(p);
        }
    }
    roots
}

fn contains(roots: &[PathBuf], candidate: &Path) -> bool {
    roots.iter().any(|r| r == candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scoped_layouts_come_first_on_new_versions() {
        let resolver = PathResolver::new("/sd", 33);
        let first = &resolver.candidates()[0];
        assert!(first.starts_with("/sd/Android/media/com.whatsapp"));

        let legacy = PathResolver::new("/sd", 29);
        assert!(legacy.candidates()[0].starts_with("/sd/WhatsApp/Media"));
    }

    #[test]
    fn resolve_keeps_only_existing_dirs_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let legacy = temp.path().join("WhatsApp/Media/WhatsApp Images");
        let scoped = temp
            .path()
            .join("Android/media/com.whatsapp/WhatsApp/Media/WhatsApp Documents");
        fs::create_dir_all(&legacy).unwrap();
        fs::create_dir_all(&scoped).unwrap();

        let resolved = PathResolver::new(temp.path(), 31).resolve();
        assert_eq!(resolved, vec![scoped.clone(), legacy.clone()]);

        let resolved = PathResolver::new(temp.path(), 28).resolve();
        assert_eq!(resolved, vec![legacy, scoped]);
    }

    #[test]
    fn nothing_found_is_empty_not_error() {
        let temp = tempfile::tempdir().unwrap();
        assert!(PathResolver::new(temp.path(), 33).resolve().is_empty());
    }

    #[test]
    fn include_roots_are_appended_once() {
        let temp = tempfile::tempdir().unwrap();
        let images = temp.path().join("WhatsApp/Media/WhatsApp Images");
        let extra = temp.path().join("Download");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&extra).unwrap();

        let cfg = ScanConfig {
            storage_root: temp.path().to_string_lossy().into_owned(),
            include: vec![
                extra.to_string_lossy().into_owned(),
                images.to_string_lossy().into_owned(),
                temp.path().join("missing").to_string_lossy().into_owned(),
            ],
            ..ScanConfig::default()
        };
        assert_eq!(scan_roots(&cfg), vec![images, extra]);
    }
}
