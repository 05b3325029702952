use crate::{labels::LabelsError, ort_service::ModelLoadError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Cannot decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model returned {got} scores, expected {expected}")]
    OutputShape { expected: usize, got: usize },
    #[error("Model produced non-finite scores")]
    NonFiniteScores,
    #[error("Inference task failed: {0}")]
    Task(String),
}

impl PredictionError {
    /// Errors caused by what the caller sent, as opposed to a fault in the
    /// service or the model.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PredictionError::InvalidRequest(_)
                | PredictionError::Base64(_)
                | PredictionError::ImageDecode(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Labels(#[from] LabelsError),
    #[error(transparent)]
    Model(#[from] ModelLoadError),
    #[error("Class names file lists {labels} classes but the model declares {classes}")]
    ClassCountMismatch { labels: usize, classes: usize },
}
