#![warn(unused_extern_crates)]
use anyhow::{Error, Result};
use clap::Parser;
use eplab_core::layout::DEFAULT_MODEL_NAME;
use eplab_core::{ModelLayout, OrtRuntime, Pipeline, Worker};
use num_cpus::get as get_cpu_count;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, span};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding the model, its labels and compiled artifacts.
    /// Defaults to the directory of this executable
    #[arg(short = 'd', long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Base model name, loaded from <DIR>/<NAME>.onnx
    #[arg(short = 'm', long, value_name = "NAME", default_value = DEFAULT_MODEL_NAME)]
    model_name: String,

    /// Label file. Defaults to <DIR>/<NAME>.Labels.txt
    #[arg(short, long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Print the available execution providers and exit
    #[arg(long)]
    list: bool,

    /// Download and register provider packages before discovery
    #[arg(long)]
    provision: bool,

    /// Execution provider to run on. Defaults to the first one discovered
    #[arg(short, long, value_name = "NAME")]
    provider: Option<String>,

    /// Compile (or reuse) the model for the provider and exit
    #[arg(long)]
    compile_only: bool,

    /// Give up waiting on any single step after this many seconds
    #[arg(short, long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Cap on ONNX Runtime intra-op threads
    #[arg(long)]
    max_threads: Option<usize>,

    /// Images to classify. Defaults to <DIR>/image.jpg
    images: Vec<PathBuf>,
}

/// Waits on the worker, up to `timeout` when one is set.
fn run<T, F>(worker: &Worker<OrtRuntime>, timeout: Option<Duration>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Pipeline<OrtRuntime>) -> eplab_core::Result<T> + Send + 'static,
{
    let result = match timeout {
        Some(t) => worker.call_timeout(t, f),
        None => worker.call(f),
    };
    Ok(result?)
}

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let args = Args::parse();

    let dir = match args.model_dir {
        Some(dir) => dir,
        None => ModelLayout::beside_executable()?.dir().to_path_buf(),
    };
    let mut layout = ModelLayout::new(dir).with_model_name(args.model_name);
    if let Some(labels) = args.labels {
        layout = layout.with_labels(labels);
    }

    let images = if args.images.is_empty() {
        vec![layout.default_image_path()]
    } else {
        args.images
    };

    let total_threads = num_threads(args.max_threads);
    let runtime = OrtRuntime::init("eplab")?.with_intra_threads(total_threads);
    let worker = Worker::spawn(Pipeline::new(Arc::new(runtime), layout));
    let timeout = args.timeout_secs.map(Duration::from_secs);

    let providers = if args.provision {
        run(&worker, timeout, |p| p.provision())?
    } else {
        run(&worker, timeout, |p| p.providers())?
    };

    if args.list {
        for p in providers.iter() {
            println!("{:<32} {:<12} {}", p.name(), p.vendor(), p.device());
        }
        return Ok(());
    }

    let provider = match args.provider {
        Some(name) => run(&worker, timeout, move |p| p.find(&name))?,
        None => providers
            .into_iter()
            .next()
            .ok_or_else(|| Error::msg("No execution providers available"))?,
    };

    let artifact = run(&worker, timeout, move |p| {
        p.select(provider);
        p.compile()
    })?;
    info!("Model ready at {}", artifact.display());

    if args.compile_only {
        return Ok(());
    }

    run(&worker, timeout, |p| p.load())?;

    for image in images {
        let span = span!(Level::INFO, "image", path = %image.display());
        let _guard = span.enter();

        let path = image.clone();
        match run(&worker, timeout, move |p| p.classify(&path)) {
            Ok(result) => println!("{result}"),
            // Keep going with the remaining images
            Err(e) => error!("Failed to classify {}: {e:?}", image.display()),
        }
    }

    Ok(())
}

fn num_threads(max_threads: Option<usize>) -> usize {
    let total_threads = get_cpu_count();
    max_threads.unwrap_or(total_threads).min(total_threads)
}
