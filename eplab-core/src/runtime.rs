use crate::error::BoxError;
use crate::preprocess::ImageTensor;
use crate::provider::ExecutionProvider;
use crate::session_config::SessionConfig;
use std::path::Path;

#[cfg(test)]
pub(crate) mod fake;
mod onnx;

pub use self::onnx::{OrtRuntime, OrtSession};

/// The native inference runtime: everything the pipeline needs from it.
///
/// Implementations own the process wide environment. Callers share one
/// instance behind an `Arc`.
pub trait Runtime {
    type Session: RuntimeSession;

    fn is_ready(&self) -> bool;

    fn discover_providers(&self) -> Result<Vec<ExecutionProvider>, BoxError>;

    /// Downloads and registers provider packages. Opaque to the pipeline.
    fn provision(&self) -> Result<(), BoxError> {
        Ok(())
    }

    fn compile(
        &self,
        model: &Path,
        provider: &ExecutionProvider,
        config: &SessionConfig,
        output: &Path,
    ) -> Result<(), BoxError>;

    fn create_session(
        &self,
        model: &Path,
        provider: &ExecutionProvider,
        config: &SessionConfig,
    ) -> Result<Self::Session, BoxError>;
}

pub trait RuntimeSession {
    fn input_names(&self) -> Vec<String>;

    fn output_names(&self) -> Vec<String>;

    /// Runs the model with `input` bound to `input_name` and returns the
    /// `output_name` tensor flattened.
    fn run(
        &mut self,
        input_name: &str,
        input: &ImageTensor,
        output_name: &str,
    ) -> Result<Vec<f32>, BoxError>;
}
