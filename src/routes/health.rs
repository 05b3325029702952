use axum::response::Json;
use serde::Serialize;

const LIVENESS_MESSAGE: &str = "Server is running";

#[derive(Serialize)]
pub struct Liveness {
    status: &'static str,
}

/// Answers as long as the process is up; never touches the model.
pub async fn healthcheck() -> Json<Liveness> {
    Json(Liveness {
        status: LIVENESS_MESSAGE,
    })
}
