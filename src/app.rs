use crate::{
    config::{Config, Validatable},
    error::StartupError,
    inference_service::Classifier,
    labels::ClassIndex,
    ort_service::OrtModelService,
    server::HttpServer,
    telemetry::Metrics,
};
use std::{error::Error, sync::Arc};

/// Loads the class names and model, then serves until a shutdown signal.
/// Any loading failure aborts before the listener is bound.
pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let classifier = match load_classifier(&config) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::error!("Failed to load classifier: {}", e);
            return Err(Box::new(e));
        }
    };

    let metrics = Arc::new(Metrics::new()?);
    let server = HttpServer::new(classifier, metrics, &config.server).await?;
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn load_classifier(config: &Config) -> Result<Classifier, StartupError> {
    config.validate().map_err(StartupError::Config)?;

    let class_index = ClassIndex::new(&config.labels)?;
    if class_index.len() != config.model.num_classes {
        return Err(StartupError::ClassCountMismatch {
            labels: class_index.len(),
            classes: config.model.num_classes,
        });
    }

    tracing::info!(
        "Loading {} weights from {:?}",
        config.model.architecture,
        config.model.get_path()
    );
    let model = OrtModelService::new(&config.model)?;

    Classifier::new(model, class_index)
}
