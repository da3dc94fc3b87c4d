use super::{Runtime, RuntimeSession};
use crate::error::BoxError;
use crate::preprocess::ImageTensor;
use crate::provider::ExecutionProvider;
use crate::session_config::SessionConfig;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory runtime for tests. Compiling writes a small marker file,
/// sessions return fixed logits.
pub struct FakeRuntime {
    ready: AtomicBool,
    providers: Mutex<Vec<ExecutionProvider>>,
    provisioned: Mutex<Vec<ExecutionProvider>>,
    fail_compile: bool,
    run_delay: Option<Duration>,
    logits: Vec<f32>,
    discover_calls: AtomicUsize,
    compile_configs: Mutex<Vec<SessionConfig>>,
    session_configs: Mutex<Vec<SessionConfig>>,
    run_calls: Arc<AtomicUsize>,
}

impl FakeRuntime {
    pub fn with_providers(names: &[&str]) -> Self {
        FakeRuntime {
            ready: AtomicBool::new(true),
            providers: Mutex::new(names.iter().map(|n| ExecutionProvider::named(*n)).collect()),
            provisioned: Mutex::new(Vec::new()),
            fail_compile: false,
            run_delay: None,
            logits: vec![1.0, 3.0, 2.0],
            discover_calls: AtomicUsize::new(0),
            compile_configs: Mutex::new(Vec::new()),
            session_configs: Mutex::new(Vec::new()),
            run_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_compile(mut self) -> Self {
        self.fail_compile = true;
        self
    }

    pub fn with_logits(mut self, logits: Vec<f32>) -> Self {
        self.logits = logits;
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = Some(delay);
        self
    }

    pub fn register(&self, provider: ExecutionProvider) {
        self.providers.lock().unwrap().push(provider);
    }

    pub fn provide_on_provision(&self, provider: ExecutionProvider) {
        self.provisioned.lock().unwrap().push(provider);
    }

    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    pub fn compile_calls(&self) -> usize {
        self.compile_configs.lock().unwrap().len()
    }

    pub fn compile_configs(&self) -> Vec<SessionConfig> {
        self.compile_configs.lock().unwrap().clone()
    }

    pub fn session_configs(&self) -> Vec<SessionConfig> {
        self.session_configs.lock().unwrap().clone()
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }
}

impl Runtime for FakeRuntime {
    type Session = FakeSession;

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn discover_providers(&self) -> Result<Vec<ExecutionProvider>, BoxError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.providers.lock().unwrap().clone())
    }

    fn provision(&self) -> Result<(), BoxError> {
        let mut provisioned = self.provisioned.lock().unwrap();
        self.providers.lock().unwrap().append(&mut provisioned);
        Ok(())
    }

    fn compile(
        &self,
        model: &Path,
        provider: &ExecutionProvider,
        config: &SessionConfig,
        output: &Path,
    ) -> Result<(), BoxError> {
        self.compile_configs.lock().unwrap().push(config.clone());
        if self.fail_compile {
            fs::write(output, b"half written")?;
            return Err(format!("{provider} rejected the model").into());
        }

        let base = fs::read(model)?;
        let mut compiled = format!("compiled for {provider}:").into_bytes();
        compiled.extend(base);
        fs::write(output, compiled)?;
        Ok(())
    }

    fn create_session(
        &self,
        model: &Path,
        _provider: &ExecutionProvider,
        config: &SessionConfig,
    ) -> Result<FakeSession, BoxError> {
        self.session_configs.lock().unwrap().push(config.clone());
        if fs::read(model)?.is_empty() {
            return Err("model file is empty".into());
        }

        Ok(FakeSession {
            logits: self.logits.clone(),
            delay: self.run_delay,
            runs: self.run_calls.clone(),
        })
    }
}

pub struct FakeSession {
    logits: Vec<f32>,
    delay: Option<Duration>,
    runs: Arc<AtomicUsize>,
}

impl RuntimeSession for FakeSession {
    fn input_names(&self) -> Vec<String> {
        vec!["data_0".to_string()]
    }

    fn output_names(&self) -> Vec<String> {
        vec!["softmaxout_1".to_string()]
    }

    fn run(
        &mut self,
        input_name: &str,
        input: &ImageTensor,
        output_name: &str,
    ) -> Result<Vec<f32>, BoxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if input_name != "data_0" || output_name != "softmaxout_1" {
            return Err(format!("unknown binding {input_name} -> {output_name}").into());
        }
        if input.shape() != [1, 3, 224, 224] {
            return Err(format!("expected [1, 3, 224, 224], got {:?}", input.shape()).into());
        }

        Ok(self.logits.clone())
    }
}
