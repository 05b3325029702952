use crate::{
    config::ErrorMode,
    error::PredictionError,
    inference_service::{Prediction, PredictionResponse},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    response::{IntoResponse, Json, Response},
};
use base64::{prelude::BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::instrument;

const ROUTE: &str = "/predict";

#[derive(Deserialize)]
pub struct ImageRequest {
    pub image_base64: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

pub struct ApiError {
    error: PredictionError,
    mode: ErrorMode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.mode.status_for(self.error.is_client_error());
        (
            status,
            Json(ErrorBody {
                detail: self.error.to_string(),
            }),
        )
            .into_response()
    }
}

#[instrument(skip(state, payload))]
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Bytes, BytesRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let started = Instant::now();
    let result = run_prediction(&state, payload).await;

    state
        .metrics
        .record_prediction_duration(started.elapsed().as_secs_f64() * 1000.0, ROUTE);

    match result {
        Ok(prediction) => {
            tracing::info!(
                class_id = prediction.class_id,
                label = %prediction.label,
                confidence = prediction.confidence,
                "Prediction served"
            );
            Ok(Json(prediction.into()))
        }
        Err(error) => {
            if error.is_client_error() {
                tracing::warn!("Rejected prediction request: {}", error);
            } else {
                tracing::error!("Prediction failed: {}", error);
            }
            Err(ApiError {
                error,
                mode: state.error_mode,
            })
        }
    }
}

async fn run_prediction(
    state: &SharedState,
    payload: Result<Bytes, BytesRejection>,
) -> Result<Prediction, PredictionError> {
    // The body is parsed as JSON whatever its Content-Type header says.
    let body = payload.map_err(|e| PredictionError::InvalidRequest(e.body_text()))?;
    let request: ImageRequest = serde_json::from_slice(&body)
        .map_err(|e| PredictionError::InvalidRequest(e.to_string()))?;
    let image_data = decode_base64(&request.image_base64)?;

    let classifier = state.classifier.clone();
    tokio::task::spawn_blocking(move || classifier.classify(&image_data))
        .await
        .map_err(|e| PredictionError::Task(e.to_string()))?
}

/// Standard-alphabet base64. Line breaks and other ASCII whitespace are
/// ignored, so MIME-wrapped payloads decode too.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64_STANDARD.decode(compact)
}

#[cfg(test)]
mod tests {
    use crate::{
        config::ErrorMode,
        inference_service::Classifier,
        labels::ClassIndex,
        model_service::{
            mock::{solid_png, FailingModel, CentrePixelModel},
            ModelService,
        },
        server::{build_router, SharedState},
        telemetry::Metrics,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use base64::{prelude::BASE64_STANDARD, Engine};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router_with(model: impl ModelService, error_mode: ErrorMode) -> Router {
        let classifier =
            Classifier::new(model, ClassIndex::from_names(["red", "green", "blue"])).unwrap();
        let state = SharedState {
            classifier: Arc::new(classifier),
            metrics: Arc::new(Metrics::new().unwrap()),
            error_mode,
        };
        build_router(state, 1024 * 1024)
    }

    async fn post_json(router: Router, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        send(router, request).await
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn payload(image: &[u8]) -> String {
        json!({ "image_base64": BASE64_STANDARD.encode(image) }).to_string()
    }

    #[tokio::test]
    async fn test_predict_returns_label_and_confidence() {
        let router = router_with(CentrePixelModel, ErrorMode::Split);
        let (status, body) = post_json(router, payload(&solid_png(64, 48, [200, 100, 50]))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "predicted_class": "red", "confidence": 0.7634 }));
    }

    #[tokio::test]
    async fn test_predict_is_idempotent() {
        let router = router_with(CentrePixelModel, ErrorMode::Split);
        let request = payload(&solid_png(100, 500, [20, 30, 240]));

        let (_, first) = post_json(router.clone(), request.clone()).await;
        let (_, second) = post_json(router, request).await;

        assert_eq!(first, second);
        assert_eq!(first["predicted_class"], "blue");
        let confidence = first["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert_eq!((confidence * 10_000.0).round() / 10_000.0, confidence);
    }

    #[tokio::test]
    async fn test_malformed_base64_is_bad_request() {
        let router = router_with(CentrePixelModel, ErrorMode::Split);
        let body = json!({ "image_base64": "not-valid-base64!!" }).to_string();
        let (status, body) = post_json(router, body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body["detail"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_line_wrapped_base64_is_accepted() {
        let router = router_with(CentrePixelModel, ErrorMode::Split);
        let encoded = BASE64_STANDARD.encode(solid_png(64, 48, [200, 100, 50]));
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(wrapped.contains('\n'));

        let body = json!({ "image_base64": format!("  {}\r\n", wrapped) }).to_string();
        let (status, body) = post_json(router, body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "predicted_class": "red", "confidence": 0.7634 }));
    }

    #[tokio::test]
    async fn test_body_without_content_type_is_accepted() {
        let router = router_with(CentrePixelModel, ErrorMode::Split);
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .body(Body::from(payload(&solid_png(64, 48, [200, 100, 50]))))
            .unwrap();
        let (status, body) = send(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["predicted_class"], "red");
    }

    #[tokio::test]
    async fn test_non_json_body_is_bad_request() {
        let router = router_with(CentrePixelModel, ErrorMode::Split);
        let (status, body) = post_json(router, "image_base64=abc".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body["detail"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_text_payload_is_bad_request() {
        let router = router_with(CentrePixelModel, ErrorMode::Split);
        let (status, body) = post_json(router, payload(b"just some plain text")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Cannot decode image"));
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let router = router_with(CentrePixelModel, ErrorMode::Split);
        let (status, body) = post_json(router, json!({ "image": "abc" }).to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("image_base64"));
    }

    #[tokio::test]
    async fn test_model_failure_status_depends_on_error_mode() {
        let image = payload(&solid_png(8, 8, [1, 2, 3]));

        let (status, body) =
            post_json(router_with(FailingModel, ErrorMode::Split), image.clone()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Inference failed: session run failed");

        let (status, _) = post_json(router_with(FailingModel, ErrorMode::Legacy), image).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
