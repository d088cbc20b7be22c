//! Batch compression orchestration
//!
//! A batch goes through one of two strategies, picked once per call:
//!
//! - [`Strategy::Polling`]: each file is uploaded as its own job and its
//!   progress follows the job states reported by the service.
//! - [`Strategy::Batched`]: all files go out in one request and progress is
//!   simulated until the positional response array arrives.
//!
//! Both report through the same [`ProgressCallback`] contract: zero or more
//! `processing` events per file followed by exactly one `completed` or
//! `error` event.

mod batched;
pub mod error;
mod polling;
pub mod progress;
pub mod reconcile;
pub mod request;
pub mod simulated;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_server;

pub use batched::BatchedStrategy;
pub use error::{CompressError, CompressResult};
pub use polling::PollingStrategy;
pub use progress::{
    ChannelProgress, CompressionStats, FileStatus, FileTask, FnProgress, ProgressCallback,
    ProgressEvent, ProgressSink, artifact_file_names,
};
pub use request::{InputFile, RequestBuilder};

use crate::api::Client;
use crate::config::Settings;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Server-side compression strategy of a batched request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressMode {
    /// One compression strategy, files handled one after another
    Single,
    /// Files compressed in parallel on the server
    #[default]
    Batch,
}

impl CompressMode {
    /// Resolve a user-supplied selector; anything but `single` is `Batch`
    pub fn from_selector(selector: Option<&str>) -> Self {
        match selector.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "single" => CompressMode::Single,
            _ => CompressMode::Batch,
        }
    }

    /// Path segment of `POST /compress/{mode}`
    pub fn endpoint_segment(&self) -> &'static str {
        match self {
            CompressMode::Single => "single",
            CompressMode::Batch => "rayon",
        }
    }

    /// Static estimate of the request duration driving simulated progress
    pub fn estimated_duration(&self) -> Duration {
        match self {
            CompressMode::Single => Duration::from_millis(8000),
            CompressMode::Batch => Duration::from_millis(4000),
        }
    }
}

/// How a batch is submitted and how its progress is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One job per file, progress observed by polling
    Polling,
    /// One request for all files, progress simulated
    Batched(CompressMode),
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Batched(CompressMode::default())
    }
}

/// Shared interface of the submission strategies
#[async_trait]
pub trait CompressStrategy: Send + Sync {
    /// Submit `files` and report every file through `sink`.
    ///
    /// Returns an error only when the whole batch is forfeit; every file has
    /// received its terminal event by then.
    async fn run(&self, files: &[InputFile], sink: Arc<ProgressSink>) -> CompressResult<()>;
}

/// Closes the sink on every exit path, including drop of the owning future
struct CloseOnDrop(Arc<ProgressSink>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Entry point for compressing a batch of files
#[derive(Debug, Clone)]
pub struct Orchestrator {
    client: Client,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(settings: Settings) -> Self {
        Self {
            client: Client::from_settings(&settings),
            settings,
        }
    }

    /// Orchestrator for the backend configured in the process environment
    pub fn from_env() -> Self {
        Self::new(Settings::global().clone())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn strategy(&self, strategy: Strategy) -> Box<dyn CompressStrategy> {
        match strategy {
            Strategy::Polling => Box::new(PollingStrategy::new(
                self.client.clone(),
                (&self.settings).into(),
            )),
            Strategy::Batched(mode) => Box::new(BatchedStrategy::new(
                self.client.clone(),
                mode,
                self.settings.tick_interval,
            )),
        }
    }

    /// Compress `files`, reporting progress to `callback`.
    ///
    /// Returns the final state of every file. An empty batch returns
    /// immediately without any request or callback.
    pub async fn compress<C>(
        &self,
        files: &[InputFile],
        strategy: Strategy,
        callback: C,
    ) -> CompressResult<Vec<FileTask>>
    where
        C: ProgressCallback + 'static,
    {
        self.compress_with_cancel(files, strategy, callback, &CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::compress`], aborting when `cancel` fires.
    ///
    /// On cancellation all timers and polls are released and no further
    /// callback is made.
    pub async fn compress_with_cancel<C>(
        &self,
        files: &[InputFile],
        strategy: Strategy,
        callback: C,
        cancel: &CancellationToken,
    ) -> CompressResult<Vec<FileTask>>
    where
        C: ProgressCallback + 'static,
    {
        if files.is_empty() {
            tracing::debug!(target: "compress", "Empty batch, nothing to do");
            return Ok(Vec::new());
        }

        let callback: Arc<dyn ProgressCallback> = Arc::new(callback);
        let sink = Arc::new(ProgressSink::new(
            files.iter().map(|f| f.name().to_string()),
            callback,
        ));
        let _close = CloseOnDrop(sink.clone());

        tracing::info!(
            target: "compress",
            files = files.len(),
            strategy = ?strategy,
            "Starting batch compression"
        );

        // Every row is visible before any I/O starts
        for index in 0..files.len() {
            sink.emit(ProgressEvent::processing(index, 0));
        }

        let runner = self.strategy(strategy);
        // Runner first: a batch that finished in the same poll as the
        // cancellation is reported as finished
        let result = tokio::select! {
            biased;
            result = runner.run(files, sink.clone()) => result,
            _ = cancel.cancelled() => {
                if sink.is_finished() {
                    tracing::debug!(target: "compress", "Cancellation arrived after every file finished");
                    Ok(())
                } else {
                    sink.close();
                    tracing::info!(target: "compress", "Batch compression cancelled");
                    return Err(CompressError::Cancelled);
                }
            }
        };

        result?;

        let tasks = sink.snapshot();
        tracing::info!(
            target: "compress",
            completed = tasks.iter().filter(|t| t.status == FileStatus::Completed).count(),
            failed = tasks.iter().filter(|t| t.status == FileStatus::Error).count(),
            "Batch compression finished"
        );
        Ok(tasks)
    }

    /// Start compressing in the background and return the events as a stream.
    ///
    /// The stream ends after the last terminal event. Dropping it aborts the
    /// operation.
    pub fn submit(&self, files: Vec<InputFile>, strategy: Strategy) -> ProgressStream {
        let (progress, receiver) = ChannelProgress::channel();
        let orchestrator = self.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = orchestrator.compress(&files, strategy, progress).await {
                tracing::warn!(target: "compress", error = %e, "Streamed batch failed");
            }
        });

        ProgressStream {
            inner: UnboundedReceiverStream::new(receiver),
            task,
        }
    }
}

/// Stream of [`ProgressEvent`]s of one batch operation
pub struct ProgressStream {
    inner: UnboundedReceiverStream<ProgressEvent>,
    task: JoinHandle<()>,
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
