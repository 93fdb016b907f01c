//! Labeler backed by a local inference server that hosts the model artifact.

use crate::{ImageLabel, ImageLabeler, ImageTensor, LabelerFactory, LabelerOptions, ProviderError};
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct HttpLabelerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct HttpLabelerFactory {
    client: Client,
    cfg: Arc<HttpLabelerConfig>,
}

impl HttpLabelerFactory {
    pub fn new(cfg: HttpLabelerConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }
}

impl LabelerFactory for HttpLabelerFactory {
    fn create(&self, options: &LabelerOptions) -> Result<Box<dyn ImageLabeler>, ProviderError> {
        if self.cfg.base_url.is_empty() {
            return Err(ProviderError::InvalidInput("empty base_url".into()));
        }
        Ok(Box::new(HttpLabeler {
            client: self.client.clone(),
            cfg: Arc::clone(&self.cfg),
            options: options.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct HttpLabeler {
    client: Client,
    cfg: Arc<HttpLabelerConfig>,
    options: LabelerOptions,
    closed: AtomicBool,
}

#[derive(Serialize)]
struct LabelRequest<'a> {
    model: &'a str,
    confidence_threshold: f32,
    width: u32,
    height: u32,
    format: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct LabelResponse {
    #[serde(default)]
    labels: Vec<ImageLabel>,
}

#[async_trait::async_trait]
impl ImageLabeler for HttpLabeler {
    async fn label(&self, input: &ImageTensor) -> Result<Vec<ImageLabel>, ProviderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        let body = LabelRequest {
            model: &self.options.model,
            confidence_threshold: self.options.confidence_threshold,
            width: input.width,
            height: input.height,
            format: "rgb8",
            data: base64::engine::general_purpose::STANDARD.encode(&input.pixels),
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/label", self.cfg.base_url.trim_end_matches('/')))
            .json(&body);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "status {}: {}",
                status, text
            )));
        }

        let parsed: LabelResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        // Server-side filtering is not guaranteed.
        Ok(parsed
            .labels
            .into_iter()
            .filter(|l| l.confidence >= self.options.confidence_threshold)
            .collect())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(model = %self.options.model, "http labeler closed");
        }
    }
}
