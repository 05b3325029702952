mod app;
mod error;
mod inference_service;
mod labels;
mod model_service;
mod ort_service;
mod preprocessing;
mod routes;
mod server;
mod telemetry;

pub mod config;

pub use app::start_app;
