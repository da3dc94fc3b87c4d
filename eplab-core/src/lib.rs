//! Image classification on ONNX Runtime execution providers.
//!
//! Discover the providers the runtime offers, compile the base model for
//! one of them (cached beside the model), load it and classify images
//! with a top-5 report.

pub mod compiler;
pub mod engine;
pub mod error;
pub mod labels;
pub mod layout;
pub mod pipeline;
pub mod preprocess;
pub mod provider;
pub mod report;
pub mod runtime;
pub mod session_config;
pub mod worker;

pub use error::{EplabError, Result};
pub use layout::ModelLayout;
pub use pipeline::Pipeline;
pub use provider::ExecutionProvider;
pub use report::PredictionResult;
pub use runtime::OrtRuntime;
pub use worker::Worker;
