//! Wraps an image-labeling engine behind a lazily built, swap-guarded handle.

use crate::error::ClassifierError;
use crate::models::{Classification, Label};
use image::imageops::FilterType;
use image::DynamicImage;
use providers::{
    ImageLabel, ImageLabeler, ImageTensor, LabelerFactory, LabelerOptions, ProviderError,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

struct Engine {
    options: LabelerOptions,
    labeler: Box<dyn ImageLabeler>,
}

pub struct Classifier {
    factory: Arc<dyn LabelerFactory>,
    model: String,
    input_size: u32,
    engine: Mutex<Option<Engine>>,
}

impl Classifier {
    pub fn new(factory: Arc<dyn LabelerFactory>, model: impl Into<String>, input_size: u32) -> Self {
        Self {
            factory,
            model: model.into(),
            input_size: input_size.max(1),
            engine: Mutex::new(None),
        }
    }

    /// Resizes to the model's square input and converts to RGB8.
    pub fn normalize(&self, image: &DynamicImage) -> ImageTensor {
        let size = self.input_size;
        let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        ImageTensor {
            width: size,
            height: size,
            pixels: rgb.into_raw(),
        }
    }

    /// Labels one bitmap. The engine is (re)built under the same lock that
    /// guards inference, so a threshold change never swaps it mid-call.
    pub async fn classify(
        &self,
        image: &DynamicImage,
        threshold: f32,
    ) -> Result<Classification, ClassifierError> {
        let input = self.normalize(image);
        let options = LabelerOptions {
            model: self.model.clone(),
            confidence_threshold: threshold,
        };

        let mut slot = self.engine.lock().await;
        let stale = slot.as_ref().map(|e| e.options != options).unwrap_or(true);
        if stale {
            if let Some(old) = slot.take() {
                debug!(
                    "releasing engine built for threshold {}",
                    old.options.confidence_threshold
                );
                old.labeler.close();
            }
            let labeler = self
                .factory
                .create(&options)
                .map_err(ClassifierError::Engine)?;
            info!(model = %options.model, threshold, "labeling engine ready");
            *slot = Some(Engine { options, labeler });
        }
        let engine = slot
            .as_ref()
            .ok_or(ClassifierError::Engine(ProviderError::Closed))?;

        let labels = engine
            .labeler
            .label(&input)
            .await
            .map_err(ClassifierError::Inference)?;
        top_label(&labels)
    }

    /// Closes the engine, if any. A later `classify` builds a fresh one.
    pub async fn release(&self) {
        if let Some(old) = self.engine.lock().await.take() {
            old.labeler.close();
            debug!("labeling engine released");
        }
    }
}

fn top_label(labels: &[ImageLabel]) -> Result<Classification, ClassifierError> {
    if let Some(bad) = labels.iter().find(|l| !(0.0..=1.0).contains(&l.confidence)) {
        return Err(ClassifierError::InvalidConfidence(bad.confidence));
    }
    match labels
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    {
        Some(l) => Classification::new(Label::from_engine(&l.text), l.confidence),
        None => Ok(Classification::unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(text: &str, confidence: f32) -> ImageLabel {
        ImageLabel {
            text: text.to_string(),
            confidence,
            index: 0,
        }
    }

    #[test]
    fn highest_scoring_label_wins() {
        let c = top_label(&[label("not_notes", 0.3), label("notes", 0.7)]).unwrap();
        assert_eq!(c, Classification::clamped(Label::Notes, 0.7));
    }

    #[test]
    fn no_labels_is_unknown() {
        assert_eq!(top_label(&[]).unwrap(), Classification::unknown());
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        assert!(matches!(
            top_label(&[label("notes", 1.5)]),
            Err(ClassifierError::InvalidConfidence(_))
        ));
        assert!(top_label(&[label("notes", f32::NAN)]).is_err());
    }
}
