use crate::{
    error::{PredictionError, StartupError},
    labels::ClassIndex,
    model_service::ModelService,
    preprocessing::{decode_image, transform_image},
};
use ndarray::{Array1, ArrayView1};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionResponse {
    pub predicted_class: String,
    pub confidence: f64,
}

impl From<Prediction> for PredictionResponse {
    fn from(prediction: Prediction) -> Self {
        Self {
            predicted_class: prediction.label,
            confidence: round_confidence(prediction.confidence),
        }
    }
}

pub fn round_confidence(probability: f32) -> f64 {
    (f64::from(probability) * 10_000.0).round() / 10_000.0
}

pub fn softmax(scores: ArrayView1<f32>) -> Array1<f32> {
    let max = scores.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let exps = scores.mapv(|v| (v - max).exp());
    let sum = exps.sum();
    exps / sum
}

/// Index and value of the largest probability. On ties the lowest index
/// wins.
pub fn top1(probabilities: ArrayView1<f32>) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
}

pub struct Classifier {
    model: Box<dyn ModelService>,
    class_index: ClassIndex,
}

impl Classifier {
    pub fn new(model: impl ModelService, class_index: ClassIndex) -> Result<Self, StartupError> {
        if class_index.len() != model.num_classes() {
            return Err(StartupError::ClassCountMismatch {
                labels: class_index.len(),
                classes: model.num_classes(),
            });
        }

        Ok(Self {
            model: Box::new(model),
            class_index,
        })
    }

    /// Full pipeline from encoded image bytes to the top-1 class.
    pub fn classify(&self, image_data: &[u8]) -> Result<Prediction, PredictionError> {
        let img = decode_image(image_data)?;
        let input = transform_image(&img);
        let probabilities = self.probabilities(&input)?;

        let (class_id, confidence) = top1(probabilities.view()).ok_or(
            PredictionError::OutputShape {
                expected: self.class_index.len(),
                got: 0,
            },
        )?;
        let label = self
            .class_index
            .get(class_id)
            .ok_or(PredictionError::OutputShape {
                expected: self.class_index.len(),
                got: probabilities.len(),
            })?
            .to_string();

        tracing::debug!(
            "Predicted class_id={}, label={}, confidence={:.4}",
            class_id,
            label,
            confidence
        );

        Ok(Prediction {
            class_id,
            label,
            confidence,
        })
    }

    pub fn probabilities(
        &self,
        input: &ndarray::Array4<f32>,
    ) -> Result<Array1<f32>, PredictionError> {
        let scores = self.model.forward(input)?;
        if scores.len() != self.class_index.len() {
            return Err(PredictionError::OutputShape {
                expected: self.class_index.len(),
                got: scores.len(),
            });
        }
        if scores.iter().any(|v| !v.is_finite()) {
            return Err(PredictionError::NonFiniteScores);
        }

        Ok(softmax(Array1::from(scores).view()))
    }
}
