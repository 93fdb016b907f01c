//! Image-labeling engine abstractions.
//!
//! An engine is created by a [`LabelerFactory`] for a given set of
//! [`LabelerOptions`] and holds whatever native or remote resources it needs
//! until [`ImageLabeler::close`] is called.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod http;
pub mod noop;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("engine closed")]
    Closed,
}

/// A normalized RGB8 image, row-major, `width * height * 3` bytes.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLabel {
    pub text: String,
    pub confidence: f32,
    #[serde(default)]
    pub index: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelerOptions {
    /// File name of the bundled model artifact.
    pub model: String,
    /// Labels scoring below this are dropped by the engine.
    pub confidence_threshold: f32,
}

#[async_trait::async_trait]
pub trait ImageLabeler: Send + Sync {
    async fn label(&self, input: &ImageTensor) -> Result<Vec<ImageLabel>, ProviderError>;

    /// Releases engine resources. The engine must not be used afterwards.
    fn close(&self);
}

pub trait LabelerFactory: Send + Sync {
    fn create(&self, options: &LabelerOptions) -> Result<Box<dyn ImageLabeler>, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    labelers: HashMap<String, Arc<dyn LabelerFactory>>,
    pub preferred_labeler: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labeler(mut self, name: &str, factory: Arc<dyn LabelerFactory>) -> Self {
        self.labelers.insert(name.to_string(), factory);
        self
    }

    pub fn set_preferred_labeler(mut self, name: &str) -> Self {
        self.preferred_labeler = Some(name.to_string());
        self
    }

    pub fn labeler(&self, name: Option<&str>) -> Result<Arc<dyn LabelerFactory>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_labeler.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no labeler configured".into()))?;
        self.labelers
            .get(&key)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop::NoopLabelerFactory;

    #[test]
    fn registry_falls_back_to_preferred() {
        let reg = ProviderRegistry::new()
            .with_labeler("noop", Arc::new(NoopLabelerFactory))
            .set_preferred_labeler("noop");
        assert!(reg.labeler(None).is_ok());
        assert!(matches!(
            reg.labeler(Some("missing")),
            Err(ProviderError::UnknownProvider(name)) if name == "missing"
        ));
    }

    #[test]
    fn registry_without_preference_errors() {
        let reg = ProviderRegistry::new().with_labeler("noop", Arc::new(NoopLabelerFactory));
        assert!(reg.labeler(None).is_err());
    }
}
