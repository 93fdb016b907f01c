use crate::prefs::UserPreferences;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_FILE: &str = "notes_classifier.tflite";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub scan: ScanConfig,
    pub classifier: ClassifierConfig,
    pub preferences: UserPreferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/notesweep.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Root of shared external storage.
    pub storage_root: String,
    /// Platform API level; selects which storage layouts are tried first.
    pub os_version: u32,
    /// Extra roots scanned after the resolved ones.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Cache flush interval, in processed files.
    pub flush_every: usize,
    pub max_document_pages: usize,
    pub thumbnail_dir: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            storage_root: "/storage/emulated/0".to_string(),
            os_version: 30,
            include: Vec::new(),
            exclude: Vec::new(),
            flush_every: 10,
            max_document_pages: 5,
            thumbnail_dir: "data/thumbnails".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub provider: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub input_size: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: "noop".to_string(),
            base_url: None,
            api_key: None,
            model: DEFAULT_MODEL_FILE.to_string(),
            input_size: 224,
        }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("NOTESWEEP")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_file_over_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("custom.toml");
        std::fs::write(
            &file,
            r#"
            [scan]
            storage_root = "/sdcard"
            flush_every = 3

            [preferences]
            confidence_threshold = 0.8
            "#,
        )
        .unwrap();

        let cfg = load(Some(&file.to_string_lossy())).unwrap();
        assert_eq!(cfg.scan.storage_root, "/sdcard");
        assert_eq!(cfg.scan.flush_every, 3);
        assert_eq!(cfg.scan.max_document_pages, 5);
        assert_eq!(cfg.classifier.provider, "noop");
        assert_eq!(cfg.classifier.model, DEFAULT_MODEL_FILE);
        assert!((cfg.preferences.confidence_threshold - 0.8).abs() < f32::EPSILON);
        assert!(cfg.preferences.scan_pdfs);
    }
}
