use crate::error::ClassifierError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Closed set of labels the classifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Notes,
    Other,
    Unknown,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Notes => "notes",
            Label::Other => "other",
            Label::Unknown => "unknown",
        }
    }

    /// Maps an engine label string; anything unrecognized is `Unknown`.
    pub fn from_engine(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "notes" | "note" | "handwritten" => Label::Notes,
            "other" | "not_notes" | "not notes" => Label::Other,
            _ => Label::Unknown,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    pub confidence: f32,
}

impl Classification {
    /// Rejects confidences outside [0, 1] (NaN included).
    pub fn new(label: Label, confidence: f32) -> Result<Self, ClassifierError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ClassifierError::InvalidConfidence(confidence));
        }
        Ok(Self { label, confidence })
    }

    pub fn clamped(label: Label, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { label, confidence }
    }

    pub fn unknown() -> Self {
        Self {
            label: Label::Unknown,
            confidence: 0.0,
        }
    }
}

/// The two user-facing partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Notes,
    Other,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Notes, Category::Other];

    /// Partition a classification falls into under `threshold`.
    pub fn for_classification(c: &Classification, threshold: f32) -> Self {
        if c.label == Label::Notes && c.confidence >= threshold {
            Category::Notes
        } else {
            Category::Other
        }
    }

    /// Partition used by the persisted cache, which ignores the threshold.
    pub fn of_label(label: Label) -> Self {
        match label {
            Label::Notes => Category::Notes,
            Label::Other | Label::Unknown => Category::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Notes => "notes",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Document,
}

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];
const DOCUMENT_EXTS: &[&str] = &["pdf"];

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Document => "document",
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if IMAGE_EXTS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if DOCUMENT_EXTS.contains(&ext.as_str()) {
            Some(MediaKind::Document)
        } else {
            None
        }
    }

    /// Extension first; extension-less files are sniffed by content.
    pub fn detect(path: &Path) -> Option<Self> {
        if path.extension().is_some() {
            return Self::from_extension(path);
        }
        let kind = infer::get_from_path(path).ok().flatten()?;
        match kind.mime_type() {
            "application/pdf" => Some(MediaKind::Document),
            m if m.starts_with("image/") => Some(MediaKind::Image),
            _ => None,
        }
    }
}

/// One discovered file. Identity is the path alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub kind: MediaKind,
    pub thumbnail: Option<PathBuf>,
    pub classification: Option<Classification>,
    #[serde(default)]
    pub selected: bool,
}

impl MediaFile {
    pub fn new(path: PathBuf, size: u64, kind: MediaKind) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            path,
            name,
            size,
            kind,
            thumbnail: None,
            classification: None,
            selected: false,
        }
    }

    pub fn with_classification(mut self, c: Classification) -> Self {
        self.classification = Some(c);
        self
    }

    pub fn with_thumbnail(mut self, thumb: Option<PathBuf>) -> Self {
        self.thumbnail = thumb;
        self
    }

    pub fn cache_key(&self) -> String {
        path_key(&self.path)
    }
}

impl PartialEq for MediaFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for MediaFile {}

impl Hash for MediaFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_outside_unit_range_is_rejected() {
        assert!(Classification::new(Label::Notes, 0.5).is_ok());
        assert!(Classification::new(Label::Notes, 1.0).is_ok());
        assert!(Classification::new(Label::Notes, 1.01).is_err());
        assert!(Classification::new(Label::Notes, -0.1).is_err());
        assert!(Classification::new(Label::Notes, f32::NAN).is_err());
        assert_eq!(Classification::clamped(Label::Other, 3.0).confidence, 1.0);
        assert_eq!(Classification::clamped(Label::Other, f32::NAN).confidence, 0.0);
    }

    #[test]
    fn category_respects_threshold() {
        let c = Classification::clamped(Label::Notes, 0.72);
        assert_eq!(Category::for_classification(&c, 0.7), Category::Notes);
        assert_eq!(Category::for_classification(&c, 0.8), Category::Other);
        let u = Classification::unknown();
        assert_eq!(Category::for_classification(&u, 0.5), Category::Other);
        assert_eq!(Category::of_label(Label::Unknown), Category::Other);
    }

    #[test]
    fn media_files_compare_by_path_only() {
        let a = MediaFile::new(PathBuf::from("/m/a.png"), 10, MediaKind::Image);
        let mut b = MediaFile::new(PathBuf::from("/m/a.png"), 99, MediaKind::Image);
        b.selected = true;
        assert_eq!(a, b);
        assert_eq!(a.name, "a.png");
    }

    #[test]
    fn engine_labels_map_to_closed_set() {
        assert_eq!(Label::from_engine("notes"), Label::Notes);
        assert_eq!(Label::from_engine("not_notes"), Label::Other);
        assert_eq!(Label::from_engine("Other"), Label::Other);
        assert_eq!(Label::from_engine("cat"), Label::Unknown);
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(
            MediaKind::from_extension(Path::new("x/IMG-1.JPG")),
            Some(MediaKind::Image)
        );
        assert_eq!(
            MediaKind::from_extension(Path::new("x/doc.pdf")),
            Some(MediaKind::Document)
        );
        assert_eq!(MediaKind::from_extension(Path::new("x/voice.opus")), None);
    }
}
