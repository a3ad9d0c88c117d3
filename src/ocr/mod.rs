use anyhow::Result;
use async_trait::async_trait;

/// Opaque text-recognition capability.
///
/// One engine instance is built per session by the
/// [`crate::PipelineController`], which hands the configured source language
/// to the constructor; the engine owns its own model loading and queuing.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an encoded image. Returning an empty string means
    /// "nothing to read", which the pipeline treats as a no-op, not an error.
    async fn recognize(&self, image: &[u8]) -> Result<String>;
}
