use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Opaque error handed back by the runtime and codec collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = EplabError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum EplabError {
    #[error("runtime environment is not ready: {reason}")]
    EnvironmentNotReady { reason: String },

    #[error("provisioning execution providers failed")]
    ProvisioningFailed {
        #[source]
        source: BoxError,
    },

    #[error("no execution provider named {name}")]
    ProviderNotFound { name: String },

    #[error("no execution provider selected")]
    NoProviderSelected,

    #[error("failed to compile model for execution provider {provider}")]
    CompilationFailed {
        provider: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to decode image {}", .path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to load model {}", .path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("compiled model {} not found, compile it first", .path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("compiled model {} is older than the base model, compile it again", .path.display())]
    ArtifactStale { path: PathBuf },

    #[error("no model session loaded")]
    SessionNotLoaded,

    #[error("inference failed: {reason}")]
    Inference { reason: String },

    #[error("{labels} labels do not match {outputs} model outputs")]
    LabelCountMismatch { labels: usize, outputs: usize },

    #[error("failed to read labels from {}", .path.display())]
    LabelFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line} of {} has no ',' separator", .path.display())]
    MalformedLabel { path: PathBuf, line: usize },

    #[error("background worker stopped")]
    WorkerStopped,

    #[error("gave up waiting after {after:?}")]
    Timeout { after: Duration },
}
