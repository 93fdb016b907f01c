#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use notesweep_core::config::AppConfig;
use notesweep_core::media::{FsMediaSource, MediaSource};
use notesweep_core::{MediaError, NoteSweeper};
use providers::{ImageLabel, ImageLabeler, ImageTensor, LabelerFactory, LabelerOptions, ProviderError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storage::MemoryKv;
use tokio::sync::Semaphore;

pub const WHITE: [u8; 3] = [255, 255, 255];
pub const BLACK: [u8; 3] = [0, 0, 0];
/// Makes the fake engine fail.
pub const GREY: [u8; 3] = [128, 128, 128];
/// Makes the fake engine return no labels.
pub const BLUE: [u8; 3] = [60, 60, 255];

#[derive(Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Counters {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Labels by the colour of the first pixel: white is notes (0.9), black is
/// other (0.8), grey fails, anything else gets no labels.
pub struct ColorLabelerFactory {
    pub counters: Arc<Counters>,
    pub gate: Option<Arc<Semaphore>>,
    pub fail_create: bool,
}

impl ColorLabelerFactory {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            gate: None,
            fail_create: false,
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }
}

impl LabelerFactory for ColorLabelerFactory {
    fn create(&self, options: &LabelerOptions) -> Result<Box<dyn ImageLabeler>, ProviderError> {
        if self.fail_create {
            return Err(ProviderError::RequestFailed("model missing".into()));
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ColorLabeler {
            counters: Arc::clone(&self.counters),
            gate: self.gate.clone(),
            threshold: options.confidence_threshold,
        }))
    }
}

struct ColorLabeler {
    counters: Arc<Counters>,
    gate: Option<Arc<Semaphore>>,
    threshold: f32,
}

#[async_trait::async_trait]
impl ImageLabeler for ColorLabeler {
    async fn label(&self, input: &ImageTensor) -> Result<Vec<ImageLabel>, ProviderError> {
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        }
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let px = [input.pixels[0], input.pixels[1], input.pixels[2]];
        let labels = match px {
            WHITE => vec![
                ImageLabel { text: "notes".into(), confidence: 0.9, index: 0 },
                ImageLabel { text: "not_notes".into(), confidence: 0.1, index: 1 },
            ],
            BLACK => vec![ImageLabel { text: "not_notes".into(), confidence: 0.8, index: 1 }],
            GREY => return Err(ProviderError::RequestFailed("engine crashed".into())),
            _ => Vec::new(),
        };
        Ok(labels.into_iter().filter(|l| l.confidence >= self.threshold).collect())
    }

    fn close(&self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Images decode from disk. `.pdf` files are text: `LOCKED`, or a comma
/// separated list of page colours (`w`, `b`, `g`, `u`).
#[derive(Default)]
pub struct FakeDocuments {
    images: FsMediaSource,
    pub renders: AtomicUsize,
}

fn page_colors(path: &Path) -> Result<Vec<[u8; 3]>, MediaError> {
    let text = fs::read_to_string(path).map_err(|e| MediaError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let text = text.trim();
    if text == "LOCKED" {
        return Err(MediaError::Protected(path.to_path_buf()));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|c| match c.trim() {
            "w" => Ok(WHITE),
            "b" => Ok(BLACK),
            "g" => Ok(GREY),
            "u" => Ok(BLUE),
            other => Err(MediaError::Malformed {
                path: path.to_path_buf(),
                reason: format!("bad page {}", other),
            }),
        })
        .collect()
}

impl MediaSource for FakeDocuments {
    fn decode_image(&self, path: &Path) -> Result<DynamicImage, MediaError> {
        self.images.decode_image(path)
    }

    fn page_count(&self, path: &Path) -> Result<usize, MediaError> {
        Ok(page_colors(path)?.len())
    }

    fn render_page(&self, path: &Path, page: usize) -> Result<DynamicImage, MediaError> {
        let colors = page_colors(path)?;
        let color = colors.get(page).ok_or(MediaError::PageOutOfRange {
            path: path.to_path_buf(),
            page,
            count: colors.len(),
        })?;
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 60, Rgb(*color))))
    }
}

pub fn write_png(path: &Path, color: [u8; 3]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(32, 32, Rgb(color)).save(path).unwrap();
}

pub fn write_doc(path: &Path, pages: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, pages).unwrap();
}

pub struct Fixture {
    pub temp: tempfile::TempDir,
    pub config: AppConfig,
    pub kv: Arc<MemoryKv>,
    pub media: Arc<FakeDocuments>,
    pub counters: Arc<Counters>,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.scan.storage_root = temp.path().join("sdcard").to_string_lossy().into_owned();
        config.scan.os_version = 33;
        config.scan.thumbnail_dir = temp.path().join("thumbs").to_string_lossy().into_owned();
        config.scan.flush_every = 2;
        Self {
            temp,
            config,
            kv: Arc::new(MemoryKv::new()),
            media: Arc::new(FakeDocuments::default()),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.scan.storage_root)
            .join("Android/media/com.whatsapp/WhatsApp/Media/WhatsApp Images")
    }

    pub fn documents_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.scan.storage_root)
            .join("Android/media/com.whatsapp/WhatsApp/Media/WhatsApp Documents")
    }

    pub fn sweeper(&mut self) -> NoteSweeper {
        let factory = ColorLabelerFactory::new();
        self.counters = Arc::clone(&factory.counters);
        self.sweeper_with(factory)
    }

    pub fn sweeper_with(&self, factory: ColorLabelerFactory) -> NoteSweeper {
        NoteSweeper::new(
            &self.config,
            self.kv.clone(),
            self.media.clone(),
            Arc::new(factory),
        )
    }
}
