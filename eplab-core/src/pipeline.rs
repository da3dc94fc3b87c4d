use crate::compiler::{ModelCompiler, artifact_path};
use crate::engine::{InferenceEngine, ModelSession};
use crate::error::{EplabError, Result};
use crate::labels::LabelSet;
use crate::layout::ModelLayout;
use crate::preprocess::ImagePreprocessor;
use crate::provider::{ExecutionProvider, ProviderRegistry};
use crate::report::{PredictionResult, ResultFormatter};
use crate::runtime::Runtime;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Level, debug, info, span};

/// The select → compile → load → classify workflow for one model.
///
/// A loaded session only ever belongs to the provider that is currently
/// selected: selecting another provider, or a failed compile or load,
/// drops it.
pub struct Pipeline<R: Runtime> {
    layout: ModelLayout,
    registry: ProviderRegistry<R>,
    compiler: ModelCompiler<R>,
    engine: InferenceEngine<R>,
    preprocessor: ImagePreprocessor,
    formatter: ResultFormatter,
    selected: Option<ExecutionProvider>,
    session: Option<ModelSession<R::Session>>,
}

impl<R: Runtime> Pipeline<R> {
    pub fn new(runtime: Arc<R>, layout: ModelLayout) -> Pipeline<R> {
        Pipeline {
            layout,
            registry: ProviderRegistry::new(runtime.clone()),
            compiler: ModelCompiler::new(runtime.clone()),
            engine: InferenceEngine::new(runtime),
            preprocessor: ImagePreprocessor::default(),
            formatter: ResultFormatter::default(),
            selected: None,
            session: None,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }

    pub fn providers(&self) -> Result<Vec<ExecutionProvider>> {
        self.registry.discover()
    }

    /// Looks `name` up among the currently discovered providers.
    pub fn find(&self, name: &str) -> Result<ExecutionProvider> {
        self.registry
            .find(name)?
            .ok_or_else(|| EplabError::ProviderNotFound {
                name: name.to_string(),
            })
    }

    pub fn provision(&self) -> Result<Vec<ExecutionProvider>> {
        self.registry.provision()
    }

    pub fn select(&mut self, provider: ExecutionProvider) {
        if self.selected.as_ref() != Some(&provider) {
            info!("Selected execution provider: {provider}");
        }
        self.session = None;
        self.selected = Some(provider);
    }

    pub fn selected(&self) -> Option<&ExecutionProvider> {
        self.selected.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// Path the selected provider loads its model from.
    pub fn artifact_path(&self) -> Result<PathBuf> {
        let provider = self.selected.as_ref().ok_or(EplabError::NoProviderSelected)?;
        Ok(artifact_path(&self.layout.base_model_path(), provider))
    }

    pub fn is_compiled(&self) -> bool {
        match &self.selected {
            Some(p) => self.compiler.is_compiled(&self.layout.base_model_path(), p),
            None => false,
        }
    }

    pub fn compile(&mut self) -> Result<PathBuf> {
        let provider = self.selected.as_ref().ok_or(EplabError::NoProviderSelected)?;

        let compiled = self.compiler.compile(&self.layout.base_model_path(), provider);
        if compiled.is_err() {
            self.session = None;
        }
        compiled
    }

    pub fn load(&mut self) -> Result<()> {
        let provider = self.selected.as_ref().ok_or(EplabError::NoProviderSelected)?;
        self.session = None;

        let base = self.layout.base_model_path();
        let artifact = artifact_path(&base, provider);
        if !artifact.is_file() {
            return Err(EplabError::ArtifactMissing { path: artifact });
        }
        if !self.compiler.is_compiled(&base, provider) {
            return Err(EplabError::ArtifactStale { path: artifact });
        }

        self.session = Some(self.engine.load(&artifact, provider)?);
        Ok(())
    }

    /// Compiles (or reuses the cached artifact) and loads it.
    pub fn prepare(&mut self) -> Result<PathBuf> {
        let artifact = self.compile()?;
        self.load()?;
        Ok(artifact)
    }

    pub fn classify(&self, image: &Path) -> Result<PredictionResult> {
        let span = span!(Level::INFO, "classify");
        let _guard = span.enter();

        let session = self.session.as_ref().ok_or(EplabError::SessionNotLoaded)?;
        let start = Instant::now();

        info!(
            "Running classification on {} with {} ({})",
            image.display(),
            session.provider(),
            session.artifact().display()
        );

        let input = self.preprocessor.preprocess(image)?;
        let logits = self.engine.run(session, &input)?;
        let labels = LabelSet::load(&self.layout.labels_path())?;
        let result = self.formatter.format(&logits, labels.as_slice())?;

        debug!("{result:?}");
        info!("Classification completed in {}ms", start.elapsed().as_millis());

        Ok(result)
    }
}
