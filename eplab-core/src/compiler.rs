use crate::error::{EplabError, Result};
use crate::provider::ExecutionProvider;
use crate::runtime::Runtime;
use crate::session_config::configure;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Level, debug, info, span, warn};

/// Compiles the base model into provider specific artifacts cached next to
/// it as `<provider>.<model file name>`.
///
/// A cached artifact is reused as long as it is not older than the base
/// model. Compilation goes through a `.partial` file that is only renamed
/// into place once the runtime reports success.
pub struct ModelCompiler<R> {
    runtime: Arc<R>,
}

/// Where the artifact for `provider` lives. Providers that run the base
/// model directly get the base path back.
pub fn artifact_path(base: &Path, provider: &ExecutionProvider) -> PathBuf {
    if !provider.needs_compilation() {
        return base.to_path_buf();
    }

    let mut name = OsString::from(provider.name());
    name.push(".");
    name.push(base.file_name().unwrap_or_default());
    base.with_file_name(name)
}

fn partial_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn is_fresh(base: &Path, artifact: &Path) -> bool {
    let Ok(artifact_meta) = fs::metadata(artifact) else {
        return false;
    };
    if !artifact_meta.is_file() {
        return false;
    }

    match (
        fs::metadata(base).and_then(|m| m.modified()),
        artifact_meta.modified(),
    ) {
        (Ok(base_time), Ok(artifact_time)) => artifact_time >= base_time,
        // Nothing to compare against, the artifact is all there is.
        _ => true,
    }
}

impl<R: Runtime> ModelCompiler<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        ModelCompiler { runtime }
    }

    pub fn is_compiled(&self, base: &Path, provider: &ExecutionProvider) -> bool {
        if !provider.needs_compilation() {
            return base.is_file();
        }
        is_fresh(base, &artifact_path(base, provider))
    }

    pub fn compile(&self, base: &Path, provider: &ExecutionProvider) -> Result<PathBuf> {
        let span = span!(Level::DEBUG, "compile", provider = provider.name());
        let _guard = span.enter();

        if !provider.needs_compilation() {
            debug!("{provider} runs the base model, nothing to compile");
            return Ok(base.to_path_buf());
        }

        let artifact = artifact_path(base, provider);
        if is_fresh(base, &artifact) {
            debug!("Reusing compiled model {}", artifact.display());
            return Ok(artifact);
        }
        if artifact.exists() {
            warn!("{} is older than the base model, recompiling", artifact.display());
        }

        if !self.runtime.is_ready() {
            return Err(EplabError::EnvironmentNotReady {
                reason: "runtime environment has been shut down".to_string(),
            });
        }

        let config = configure(provider);
        let partial = partial_path(&artifact);
        let start = Instant::now();

        let compiled = self
            .runtime
            .compile(base, provider, &config, &partial)
            .and_then(|_| fs::rename(&partial, &artifact).map_err(Into::into));

        match compiled {
            Ok(()) => {
                info!(
                    "Compiled {} in {}ms",
                    artifact.display(),
                    start.elapsed().as_millis()
                );
                Ok(artifact)
            }
            Err(source) => {
                let _ = fs::remove_file(&partial);
                Err(EplabError::CompilationFailed {
                    provider: provider.name().to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CPU, DIRECTML, OPENVINO, QNN};
    use crate::runtime::fake::FakeRuntime;
    use std::time::{Duration, SystemTime};

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("SqueezeNet.onnx");
        fs::write(&base, b"base model").unwrap();
        (dir, base)
    }

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_artifact_naming() {
        let base = Path::new("/models/SqueezeNet.onnx");
        assert_eq!(
            artifact_path(base, &ExecutionProvider::named(QNN)),
            Path::new("/models/QNNExecutionProvider.SqueezeNet.onnx")
        );
        assert_eq!(artifact_path(base, &ExecutionProvider::named(CPU)), base);
    }

    #[test]
    fn test_base_model_providers_skip_compilation() {
        let (dir, base) = setup();
        let runtime = Arc::new(FakeRuntime::with_providers(&[CPU, DIRECTML]));
        let compiler = ModelCompiler::new(runtime.clone());

        for name in [CPU, DIRECTML] {
            let path = compiler.compile(&base, &ExecutionProvider::named(name)).unwrap();
            assert_eq!(path, base);
        }

        assert_eq!(runtime.compile_calls(), 0);
        assert_eq!(entries(dir.path()), 1);
    }

    #[test]
    fn test_second_compile_hits_cache() {
        let (_dir, base) = setup();
        let runtime = Arc::new(FakeRuntime::with_providers(&[QNN]));
        let compiler = ModelCompiler::new(runtime.clone());
        let qnn = ExecutionProvider::named(QNN);

        let first = compiler.compile(&base, &qnn).unwrap();
        let first_mtime = fs::metadata(&first).unwrap().modified().unwrap();
        let second = compiler.compile(&base, &qnn).unwrap();
        let second_mtime = fs::metadata(&second).unwrap().modified().unwrap();

        assert_eq!(first, second);
        assert_eq!(first_mtime, second_mtime);
        assert_eq!(runtime.compile_calls(), 1);
        assert!(compiler.is_compiled(&base, &qnn));
    }

    #[test]
    fn test_compile_receives_provider_options() {
        let (_dir, base) = setup();
        let runtime = Arc::new(FakeRuntime::with_providers(&[OPENVINO]));
        let compiler = ModelCompiler::new(runtime.clone());

        compiler.compile(&base, &ExecutionProvider::named(OPENVINO)).unwrap();

        let configs = runtime.compile_configs();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].get("num_of_threads"), Some("4"));
    }

    #[test]
    fn test_stale_artifact_is_recompiled() {
        let (_dir, base) = setup();
        let runtime = Arc::new(FakeRuntime::with_providers(&[QNN]));
        let compiler = ModelCompiler::new(runtime.clone());
        let qnn = ExecutionProvider::named(QNN);

        compiler.compile(&base, &qnn).unwrap();

        fs::File::options()
            .write(true)
            .open(&base)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();
        assert!(!compiler.is_compiled(&base, &qnn));

        compiler.compile(&base, &qnn).unwrap();
        assert_eq!(runtime.compile_calls(), 2);
    }

    #[test]
    fn test_failed_compile_leaves_nothing_behind() {
        let (dir, base) = setup();
        let runtime = Arc::new(FakeRuntime::with_providers(&[QNN]).failing_compile());
        let compiler = ModelCompiler::new(runtime);
        let qnn = ExecutionProvider::named(QNN);

        match compiler.compile(&base, &qnn) {
            Err(EplabError::CompilationFailed { provider, .. }) => assert_eq!(provider, QNN),
            other => panic!("expected CompilationFailed, got {other:?}"),
        }

        assert!(!artifact_path(&base, &qnn).exists());
        assert_eq!(entries(dir.path()), 1);
    }
}
