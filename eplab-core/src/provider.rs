use crate::error::{EplabError, Result};
use crate::runtime::Runtime;
use std::fmt;
use std::sync::Arc;
use tracing::{Level, debug, span};

pub const CPU: &str = "CPUExecutionProvider";
pub const DIRECTML: &str = "DmlExecutionProvider";
pub const OPENVINO: &str = "OpenVINOExecutionProvider";
pub const QNN: &str = "QNNExecutionProvider";
pub const NV_TENSORRT_RTX: &str = "NvTensorRTRTXExecutionProvider";
pub const VITIS_AI: &str = "VitisAIExecutionProvider";
pub const TENSORRT: &str = "TensorrtExecutionProvider";
pub const CUDA: &str = "CUDAExecutionProvider";
pub const COREML: &str = "CoreMLExecutionProvider";
pub const XNNPACK: &str = "XnnpackExecutionProvider";

/// Providers that execute the portable base model as-is.
const RUNS_BASE_MODEL: [&str; 2] = [CPU, DIRECTML];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Npu,
    Unknown,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Gpu => write!(f, "GPU"),
            Self::Npu => write!(f, "NPU"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// An execution provider as reported by the runtime.
///
/// Two providers are the same provider when their names match; vendor and
/// device are informational.
#[derive(Debug, Clone)]
pub struct ExecutionProvider {
    name: String,
    vendor: String,
    device: DeviceKind,
}

impl ExecutionProvider {
    pub fn new(name: impl Into<String>, vendor: impl Into<String>, device: DeviceKind) -> Self {
        ExecutionProvider {
            name: name.into(),
            vendor: vendor.into(),
            device,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, "", DeviceKind::Unknown)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    /// Whether the base model has to be compiled into a provider specific
    /// artifact before this provider can load it.
    pub fn needs_compilation(&self) -> bool {
        !RUNS_BASE_MODEL.contains(&self.name.as_str())
    }
}

impl PartialEq for ExecutionProvider {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ExecutionProvider {}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

pub struct ProviderRegistry<R> {
    runtime: Arc<R>,
}

impl<R: Runtime> ProviderRegistry<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        ProviderRegistry { runtime }
    }

    /// Providers currently registered with the runtime, in the order the
    /// runtime reports them. Every call queries the runtime again.
    pub fn discover(&self) -> Result<Vec<ExecutionProvider>> {
        let span = span!(Level::DEBUG, "discover_providers");
        let _guard = span.enter();

        if !self.runtime.is_ready() {
            return Err(EplabError::EnvironmentNotReady {
                reason: "runtime environment has not been initialized".to_string(),
            });
        }

        let providers = self
            .runtime
            .discover_providers()
            .map_err(|e| EplabError::EnvironmentNotReady {
                reason: e.to_string(),
            })?;

        for p in providers.iter() {
            debug!("Found provider: {} ({}, {})", p.name(), p.vendor(), p.device());
        }

        Ok(providers)
    }

    pub fn find(&self, name: &str) -> Result<Option<ExecutionProvider>> {
        Ok(self.discover()?.into_iter().find(|p| p.name() == name))
    }

    /// Runs the runtime's provisioning step (download and registration of
    /// provider packages) and returns a fresh discovery afterwards.
    pub fn provision(&self) -> Result<Vec<ExecutionProvider>> {
        let span = span!(Level::DEBUG, "provision_providers");
        let _guard = span.enter();

        self.runtime
            .provision()
            .map_err(|source| EplabError::ProvisioningFailed { source })?;

        self.discover()
    }
}
