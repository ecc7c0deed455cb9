mod http;
mod response;

pub use http::HttpInferenceClient;

use crate::error::RequestError;
use crate::preview::SelectedFile;
use bytes::Bytes;
use std::future::Future;

/// What the generation endpoint handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    Url(String),
    Bytes { mime: String, data: Bytes },
}

/// Remote side of both workflows.
///
/// Implementations must be cheap to share: the controller holds one behind an `Arc`
/// and calls it from spawned tasks.
pub trait InferenceClient: Send + Sync + 'static {
    /// Upload an image and return the caption text.
    fn caption(
        &self,
        file: SelectedFile,
    ) -> impl Future<Output = Result<String, RequestError>> + Send;

    /// Submit a prompt and return the generated image.
    fn generate(
        &self,
        prompt: String,
    ) -> impl Future<Output = Result<GeneratedImage, RequestError>> + Send;
}
