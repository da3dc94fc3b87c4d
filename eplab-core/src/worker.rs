use crate::error::{EplabError, Result};
use crate::pipeline::Pipeline;
use crate::runtime::Runtime;
use flume::{RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

type Job<R> = Box<dyn FnOnce(&mut Pipeline<R>) + Send>;

/// Owns a [`Pipeline`] on a dedicated thread so blocking work (compiling,
/// loading, inference) stays off the caller's thread.
///
/// Jobs run one at a time in submission order. A timed out call only stops
/// waiting: the job itself still runs to completion, and later jobs queue
/// behind it.
pub struct Worker<R: Runtime> {
    jobs: Option<Sender<Job<R>>>,
    handle: Option<JoinHandle<()>>,
}

impl<R> Worker<R>
where
    R: Runtime + Send + Sync + 'static,
    R::Session: Send,
{
    pub fn spawn(mut pipeline: Pipeline<R>) -> Worker<R> {
        let (tx, rx) = flume::unbounded::<Job<R>>();

        // Dedicated thread for model work
        let handle = thread::spawn(move || {
            for job in rx.iter() {
                job(&mut pipeline);
            }
            debug!("Worker channel closed, exiting");
        });

        Worker {
            jobs: Some(tx),
            handle: Some(handle),
        }
    }

    fn submit<T, F>(&self, f: F) -> Result<flume::Receiver<Result<T>>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Pipeline<R>) -> Result<T> + Send + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or(EplabError::WorkerStopped)?;
        let (reply_tx, reply_rx) = flume::bounded(1);

        let job: Job<R> = Box::new(move |pipeline: &mut Pipeline<R>| {
            // The caller may have given up waiting
            let _ = reply_tx.send(f(pipeline));
        });
        jobs.send(job).map_err(|_| EplabError::WorkerStopped)?;

        Ok(reply_rx)
    }

    pub fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Pipeline<R>) -> Result<T> + Send + 'static,
    {
        self.submit(f)?
            .recv()
            .map_err(|_| EplabError::WorkerStopped)?
    }

    pub fn call_timeout<T, F>(&self, timeout: Duration, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Pipeline<R>) -> Result<T> + Send + 'static,
    {
        match self.submit(f)?.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(EplabError::Timeout { after: timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(EplabError::WorkerStopped),
        }
    }
}

impl<R: Runtime> Drop for Worker<R> {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}
