use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_NAME: &str = "SqueezeNet";
pub const MODEL_EXTENSION: &str = "onnx";
pub const DEFAULT_IMAGE: &str = "image.jpg";

/// Where the model, its labels and its compiled artifacts live.
///
/// Everything sits in one directory: `<name>.onnx`, `<name>.Labels.txt`
/// and the `<provider>.<name>.onnx` artifacts written by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLayout {
    dir: PathBuf,
    model_name: String,
    labels: Option<PathBuf>,
}

impl ModelLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ModelLayout {
            dir: dir.into(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            labels: None,
        }
    }

    /// Layout rooted in the directory holding the running executable.
    pub fn beside_executable() -> io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(dir))
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_labels(mut self, path: impl Into<PathBuf>) -> Self {
        self.labels = Some(path.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn base_model_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{MODEL_EXTENSION}", self.model_name))
    }

    pub fn labels_path(&self) -> PathBuf {
        match &self.labels {
            Some(path) => path.clone(),
            None => self.dir.join(format!("{}.Labels.txt", self.model_name)),
        }
    }

    pub fn default_image_path(&self) -> PathBuf {
        self.dir.join(DEFAULT_IMAGE)
    }
}
