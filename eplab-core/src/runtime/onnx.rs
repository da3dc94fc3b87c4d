use super::{Runtime, RuntimeSession};
use crate::error::{BoxError, EplabError, Result};
use crate::preprocess::ImageTensor;
use crate::provider::{self, DeviceKind, ExecutionProvider};
use crate::session_config::SessionConfig;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    DirectMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch, OpenVINOExecutionProvider, QNNExecutionProvider,
    TensorRTExecutionProvider, qnn::QNNExecutionProviderPerformanceMode, VitisAIExecutionProvider,
    XNNPACKExecutionProvider,
};
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::value::Tensor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// ONNX Runtime backed [`Runtime`].
///
/// ONNX Runtime keeps a single environment per process. Creating an
/// `OrtRuntime` commits that environment; [`OrtRuntime::shutdown`] marks it
/// unusable for further discovery, compilation and loading. Sessions that
/// were already created keep working until dropped.
pub struct OrtRuntime {
    ready: AtomicBool,
    intra_threads: usize,
}

impl OrtRuntime {
    pub fn init(log_id: &str) -> Result<OrtRuntime> {
        ort::init()
            .with_name(log_id)
            .commit()
            .map_err(|e| EplabError::EnvironmentNotReady {
                reason: e.to_string(),
            })?;
        debug!("ONNX Runtime environment {log_id} committed");

        Ok(OrtRuntime {
            ready: AtomicBool::new(true),
            intra_threads: num_cpus::get(),
        })
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }

    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    fn session_builder(
        &self,
        provider: &ExecutionProvider,
        config: &SessionConfig,
    ) -> Result<SessionBuilder, BoxError> {
        let ep = dispatch(provider, config)?;
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.intra_threads)?
            .with_execution_providers([ep])?;
        Ok(builder)
    }
}

// Probes are listed the way ONNX Runtime prefers them: dedicated
// accelerators first, CPU last.
fn probe(
    ep: impl OrtExecutionProvider,
    name: &str,
    vendor: &str,
    device: DeviceKind,
) -> Result<Option<ExecutionProvider>, BoxError> {
    let found = ep.is_available()?;
    trace!("{name} available: {found}");
    Ok(found.then(|| ExecutionProvider::new(name, vendor, device)))
}

/// Execution providers this build knows how to attach to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Qnn,
    OpenVino,
    VitisAi,
    TensorRt,
    Cuda,
    DirectMl,
    CoreMl,
    Xnnpack,
    Cpu,
}

impl Backend {
    fn from_name(name: &str) -> Option<Backend> {
        let backend = match name {
            provider::QNN => Backend::Qnn,
            provider::OPENVINO => Backend::OpenVino,
            provider::VITIS_AI => Backend::VitisAi,
            provider::TENSORRT => Backend::TensorRt,
            provider::CUDA => Backend::Cuda,
            provider::DIRECTML => Backend::DirectMl,
            provider::COREML => Backend::CoreMl,
            provider::XNNPACK => Backend::Xnnpack,
            provider::CPU => Backend::Cpu,
            _ => return None,
        };
        Some(backend)
    }

    fn build(self, config: &SessionConfig) -> ExecutionProviderDispatch {
        match self {
            Backend::Qnn => {
                let mut ep = QNNExecutionProvider::default();
                if config.get("htp_performance_mode") == Some("high_performance") {
                    ep = ep.with_performance_mode(QNNExecutionProviderPerformanceMode::HighPerformance);
                }
                ep.build()
            }
            Backend::OpenVino => {
                let mut ep = OpenVINOExecutionProvider::default();
                if let Some(threads) = config
                    .get("num_of_threads")
                    .and_then(|v| v.parse::<usize>().ok())
                {
                    ep = ep.with_num_threads(threads);
                }
                ep.build()
            }
            Backend::VitisAi => VitisAIExecutionProvider::default().build(),
            Backend::TensorRt => TensorRTExecutionProvider::default().build(),
            Backend::Cuda => CUDAExecutionProvider::default().build(),
            Backend::DirectMl => DirectMLExecutionProvider::default().build(),
            Backend::CoreMl => CoreMLExecutionProvider::default().build(),
            Backend::Xnnpack => XNNPACKExecutionProvider::default().build(),
            Backend::Cpu => CPUExecutionProvider::default().build(),
        }
    }
}

/// Attaches the provider with the options from its [`SessionConfig`].
/// Selection must not silently fall back to CPU: unknown providers are
/// rejected and registration errors are fatal.
fn dispatch(
    provider: &ExecutionProvider,
    config: &SessionConfig,
) -> Result<ExecutionProviderDispatch, BoxError> {
    let backend = Backend::from_name(provider.name())
        .ok_or_else(|| format!("{provider} cannot be attached by this build of ONNX Runtime"))?;
    Ok(backend.build(config).error_on_failure())
}

const EP_CONTEXT_ENABLE: &str = "ep.context_enable";
const EP_CONTEXT_FILE_PATH: &str = "ep.context_file_path";
const EP_CONTEXT_EMBED_MODE: &str = "ep.context_embed_mode";

/// Session entries that make the provider dump its compiled graph as an
/// EP context model at `output`, with the binary embedded in the file.
fn ep_context_entries(output: &str) -> [(&'static str, &str); 3] {
    [
        (EP_CONTEXT_ENABLE, "1"),
        (EP_CONTEXT_FILE_PATH, output),
        (EP_CONTEXT_EMBED_MODE, "1"),
    ]
}

// Session config entries are C strings, so the path has to be UTF-8.
fn utf8_path(path: &Path) -> Result<&str, BoxError> {
    path.to_str()
        .ok_or_else(|| format!("path {} is not valid UTF-8", path.display()).into())
}

impl Runtime for OrtRuntime {
    type Session = OrtSession;

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// ONNX Runtime has no API listing usable providers, so availability is
    /// probed one provider at a time. The reported order is therefore this
    /// fixed probe order, filtered to what the linked runtime supports, with
    /// CPU always present and last.
    fn discover_providers(&self) -> Result<Vec<ExecutionProvider>, BoxError> {
        let probes = [
            probe(QNNExecutionProvider::default(), provider::QNN, "Qualcomm", DeviceKind::Npu)?,
            probe(
                VitisAIExecutionProvider::default(),
                provider::VITIS_AI,
                "AMD",
                DeviceKind::Npu,
            )?,
            probe(
                OpenVINOExecutionProvider::default(),
                provider::OPENVINO,
                "Intel",
                DeviceKind::Npu,
            )?,
            probe(
                TensorRTExecutionProvider::default(),
                provider::TENSORRT,
                "NVIDIA",
                DeviceKind::Gpu,
            )?,
            probe(CUDAExecutionProvider::default(), provider::CUDA, "NVIDIA", DeviceKind::Gpu)?,
            probe(
                DirectMLExecutionProvider::default(),
                provider::DIRECTML,
                "Microsoft",
                DeviceKind::Gpu,
            )?,
            probe(CoreMLExecutionProvider::default(), provider::COREML, "Apple", DeviceKind::Npu)?,
            probe(
                XNNPACKExecutionProvider::default(),
                provider::XNNPACK,
                "Google",
                DeviceKind::Cpu,
            )?,
        ];

        let mut providers: Vec<ExecutionProvider> = probes.into_iter().flatten().collect();
        providers.push(ExecutionProvider::new(provider::CPU, "Microsoft", DeviceKind::Cpu));

        Ok(providers)
    }

    fn compile(
        &self,
        model: &Path,
        provider: &ExecutionProvider,
        config: &SessionConfig,
        output: &Path,
    ) -> Result<(), BoxError> {
        // With EP context enabled, committing the session makes the provider
        // write its compiled graph to `output`.
        let mut builder = self.session_builder(provider, config)?;
        for (key, value) in ep_context_entries(utf8_path(output)?) {
            builder = builder.with_config_entry(key, value)?;
        }
        let session = builder.commit_from_file(model)?;
        drop(session);

        Ok(())
    }

    fn create_session(
        &self,
        model: &Path,
        provider: &ExecutionProvider,
        config: &SessionConfig,
    ) -> Result<OrtSession, BoxError> {
        let session = self.session_builder(provider, config)?.commit_from_file(model)?;
        Ok(OrtSession { session })
    }
}

pub struct OrtSession {
    session: Session,
}

impl RuntimeSession for OrtSession {
    fn input_names(&self) -> Vec<String> {
        self.session.inputs.iter().map(|i| i.name.clone()).collect()
    }

    fn output_names(&self) -> Vec<String> {
        self.session.outputs.iter().map(|o| o.name.clone()).collect()
    }

    fn run(
        &mut self,
        input_name: &str,
        input: &ImageTensor,
        output_name: &str,
    ) -> Result<Vec<f32>, BoxError> {
        let tensor = Tensor::from_array(input.as_array().clone())?;
        let outputs = self.session.run(ort::inputs![input_name => tensor]?)?;
        let logits = outputs[output_name].try_extract_tensor::<f32>()?;

        Ok(logits.iter().copied().collect())
    }
}
