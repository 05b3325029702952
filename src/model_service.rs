use crate::error::PredictionError;
use ndarray::Array4;

/// A loaded classifier network. Implementations are read-only after
/// construction and shared across request handlers.
pub trait ModelService: Send + Sync + 'static {
    fn num_classes(&self) -> usize;

    /// Raw per-class scores for a `[1, 3, H, W]` input.
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, PredictionError>;
}
