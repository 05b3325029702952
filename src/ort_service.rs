use crate::{
    config::{ModelConfig, Validatable},
    error::PredictionError,
    model_service::ModelService,
    preprocessing::INPUT_SIZE,
};
use ndarray::{Array, Array4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Failed to build ONNX session: {0}")]
    Session(#[from] ort::Error),
    #[error("Model warm-up failed: {0}")]
    WarmUp(PredictionError),
    #[error("Model for {architecture} outputs {got} classes, configuration declares {expected}")]
    ClassCount {
        architecture: String,
        expected: usize,
        got: usize,
    },
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Mutex<Session>>>,
    counter: Arc<AtomicUsize>,
    num_classes: usize,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelLoadError> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let mut builder =
                    Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
                if let Some(threads) = model_config.intra_threads {
                    builder = builder.with_intra_threads(threads)?;
                }
                let session = builder.commit_from_file(model_config.get_path())?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions for {} from {:?}",
            num_instances,
            model_config.architecture,
            model_config.get_path()
        );

        let service = Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            num_classes: model_config.num_classes,
        };
        service.warm_up(&model_config.architecture)?;

        Ok(service)
    }

    /// Runs every session once on a blank input and checks the output width
    /// against the configured class count.
    fn warm_up(&self, architecture: &str) -> Result<(), ModelLoadError> {
        let side = INPUT_SIZE as usize;
        let blank: Array4<f32> = Array::zeros((1, 3, side, side));

        for index in 0..self.sessions.len() {
            let scores = self
                .run_session(index, &blank)
                .map_err(ModelLoadError::WarmUp)?;
            if scores.len() != self.num_classes {
                return Err(ModelLoadError::ClassCount {
                    architecture: architecture.to_string(),
                    expected: self.num_classes,
                    got: scores.len(),
                });
            }
        }

        tracing::debug!("Warm-up passed on {} sessions", self.sessions.len());
        Ok(())
    }

    fn run_session(&self, index: usize, input: &Array4<f32>) -> Result<Vec<f32>, PredictionError> {
        let mut session = self.sessions[index].lock();

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| PredictionError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| PredictionError::Inference(e.to_string()))?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PredictionError::Inference(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

impl ModelService for OrtModelService {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, PredictionError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        self.run_session(index, input)
    }
}
