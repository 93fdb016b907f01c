use crate::{ImageLabel, ImageLabeler, ImageTensor, LabelerFactory, LabelerOptions, ProviderError};

/// Engine that never recognizes anything; every image comes back unlabeled.
#[derive(Debug, Default)]
pub struct NoopLabeler;

#[async_trait::async_trait]
impl ImageLabeler for NoopLabeler {
    async fn label(&self, _input: &ImageTensor) -> Result<Vec<ImageLabel>, ProviderError> {
        Ok(Vec::new())
    }

    fn close(&self) {}
}

#[derive(Debug, Default)]
pub struct NoopLabelerFactory;

impl LabelerFactory for NoopLabelerFactory {
    fn create(&self, _options: &LabelerOptions) -> Result<Box<dyn ImageLabeler>, ProviderError> {
        Ok(Box::new(NoopLabeler))
    }
}
