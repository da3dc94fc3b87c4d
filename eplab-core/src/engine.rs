use crate::error::{EplabError, Result};
use crate::preprocess::ImageTensor;
use crate::provider::ExecutionProvider;
use crate::runtime::{Runtime, RuntimeSession};
use crate::session_config::configure;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{Level, debug, info, span};

/// A loaded model, bound to the provider and artifact it was created from.
///
/// Runs are serialized through an internal lock, so a session can be shared
/// but never executes two inferences at once.
pub struct ModelSession<S> {
    provider: ExecutionProvider,
    artifact: PathBuf,
    input_name: String,
    output_name: String,
    inner: Mutex<S>,
}

impl<S> ModelSession<S> {
    pub fn provider(&self) -> &ExecutionProvider {
        &self.provider
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

pub struct InferenceEngine<R> {
    runtime: Arc<R>,
}

fn load_error(path: &Path, reason: &str) -> EplabError {
    EplabError::ModelLoad {
        path: path.to_path_buf(),
        source: reason.into(),
    }
}

impl<R: Runtime> InferenceEngine<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        InferenceEngine { runtime }
    }

    pub fn load(
        &self,
        artifact: &Path,
        provider: &ExecutionProvider,
    ) -> Result<ModelSession<R::Session>> {
        let span = span!(Level::DEBUG, "load_model", provider = provider.name());
        let _guard = span.enter();

        if !artifact.is_file() {
            return Err(load_error(artifact, "model file does not exist"));
        }
        if !self.runtime.is_ready() {
            return Err(EplabError::EnvironmentNotReady {
                reason: "runtime environment has been shut down".to_string(),
            });
        }

        let start = Instant::now();
        let config = configure(provider);
        let session = self
            .runtime
            .create_session(artifact, provider, &config)
            .map_err(|source| EplabError::ModelLoad {
                path: artifact.to_path_buf(),
                source,
            })?;

        let input_name = session
            .input_names()
            .into_iter()
            .next()
            .ok_or_else(|| load_error(artifact, "model declares no inputs"))?;
        let output_name = session
            .output_names()
            .into_iter()
            .next()
            .ok_or_else(|| load_error(artifact, "model declares no outputs"))?;

        info!(
            "Loaded {} on {provider} in {}ms",
            artifact.display(),
            start.elapsed().as_millis()
        );
        debug!("Binding input {input_name}, reading output {output_name}");

        Ok(ModelSession {
            provider: provider.clone(),
            artifact: artifact.to_path_buf(),
            input_name,
            output_name,
            inner: Mutex::new(session),
        })
    }

    pub fn run(&self, session: &ModelSession<R::Session>, input: &ImageTensor) -> Result<Vec<f32>> {
        let span = span!(Level::DEBUG, "inference", provider = session.provider.name());
        let _guard = span.enter();

        let mut inner = session.inner.lock().map_err(|_| EplabError::Inference {
            reason: "session lock poisoned by an earlier panic".to_string(),
        })?;

        let start = Instant::now();
        let output = inner
            .run(&session.input_name, input, &session.output_name)
            .map_err(|e| EplabError::Inference {
                reason: e.to_string(),
            })?;
        debug!("{} outputs in {}ms", output.len(), start.elapsed().as_millis());

        Ok(output)
    }
}
