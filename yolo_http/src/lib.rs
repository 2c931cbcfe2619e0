mod detection;
mod error;
mod image_utils;
mod inference_service;
mod model_service;
mod ort_service;
mod provisioner;
mod routes;
mod server;
mod state;

pub mod app;
pub mod config;

pub use app::start_app;
