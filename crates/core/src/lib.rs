//! Core library: locating messenger media, classifying it as notes or other
//! media, caching verdicts, and bulk deletion.

pub mod app;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod delete;
pub mod error;
pub mod media;
pub mod models;
pub mod paths;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod pipeline;
pub mod prefs;
pub mod results;
pub mod scanner;
pub mod thumbnails;
pub mod voter;

pub use app::NoteSweeper;
pub use error::{CacheError, ClassifierError, ItemError, MediaError, PipelineError};
pub use models::{Category, Classification, Label, MediaFile, MediaKind};
