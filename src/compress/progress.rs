//! Per-file progress reporting

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::error::FALLBACK_MESSAGE;

/// Highest progress value a non-terminal event may carry
pub const MAX_IN_FLIGHT_PROGRESS: u8 = 99;

/// Lifecycle of one file within a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Error)
    }
}

/// Statistics of a completed compression, rendered for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStats {
    pub original_size: u64,
    pub compressed_size: u64,
    /// Size reduction in percent, two decimals
    pub reduction: String,
    /// Server-side processing time in seconds, three decimals
    pub processing_time: String,
}

impl CompressionStats {
    pub fn new(
        original_size: u64,
        compressed_size: u64,
        reduction_percent: f64,
        processing_time_secs: f64,
    ) -> Self {
        Self {
            original_size,
            compressed_size,
            reduction: format!("{:.2}", reduction_percent),
            processing_time: format!("{:.3}", processing_time_secs),
        }
    }
}

/// One progress notification for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Position of the file in the submitted batch
    pub index: usize,
    /// Progress percentage (0 - 100)
    pub progress: u8,
    pub status: FileStatus,
    /// Set only on `Completed`
    pub stats: Option<CompressionStats>,
    /// Set only on `Completed`
    pub download_url: Option<String>,
    /// Set only on `Error`
    pub error_message: Option<String>,
}

impl ProgressEvent {
    /// Non-terminal update; 100 is reserved for completion
    pub fn processing(index: usize, progress: u8) -> Self {
        Self {
            index,
            progress: progress.min(MAX_IN_FLIGHT_PROGRESS),
            status: FileStatus::Processing,
            stats: None,
            download_url: None,
            error_message: None,
        }
    }

    pub fn completed(index: usize, stats: CompressionStats, download_url: String) -> Self {
        Self {
            index,
            progress: 100,
            status: FileStatus::Completed,
            stats: Some(stats),
            download_url: Some(download_url),
            error_message: None,
        }
    }

    pub fn failed(index: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            message
        };

        Self {
            index,
            progress: 0,
            status: FileStatus::Error,
            stats: None,
            download_url: None,
            error_message: Some(message),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Caller-visible state of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTask {
    pub index: usize,
    pub file_name: String,
    pub status: FileStatus,
    pub progress: u8,
    pub stats: Option<CompressionStats>,
    pub download_url: Option<String>,
    pub error_message: Option<String>,
}

impl FileTask {
    pub fn new(index: usize, file_name: impl Into<String>) -> Self {
        Self {
            index,
            file_name: file_name.into(),
            status: FileStatus::Pending,
            progress: 0,
            stats: None,
            download_url: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an event, returning whether it was accepted.
    ///
    /// Rejected: anything after a terminal event, and non-terminal events
    /// whose progress is lower than what was already reported.
    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        if self.is_terminal() {
            return false;
        }
        if !event.is_terminal() && event.progress < self.progress {
            return false;
        }

        self.status = event.status;
        self.progress = event.progress;
        self.stats = event.stats.clone();
        self.download_url = event.download_url.clone();
        self.error_message = event.error_message.clone();
        true
    }
}

/// Local file names for the artifacts of `tasks`, unique within the batch.
///
/// A name shared by several files is prefixed with the file index, the same
/// `{id}_{name}` shape the service uses for its download names.
pub fn artifact_file_names(tasks: &[FileTask]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for task in tasks {
        *counts.entry(task.file_name.as_str()).or_default() += 1;
    }

    let mut taken = HashSet::new();
    tasks
        .iter()
        .map(|task| {
            let mut name = if counts[task.file_name.as_str()] > 1 {
                format!("{}_{}", task.index, task.file_name)
            } else {
                task.file_name.clone()
            };
            while taken.contains(&name) {
                name = format!("{}_{}", task.index, name);
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Trait for receiving progress events
pub trait ProgressCallback: Send + Sync {
    /// Called for every accepted event, terminal ones included
    fn on_progress(&self, event: ProgressEvent);
}

/// Closure-based progress callback
pub struct FnProgress<F>(pub F);

impl<F> ProgressCallback for FnProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        (self.0)(event)
    }
}

/// Forwards events into an unbounded channel
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_progress(&self, event: ProgressEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.sender.send(event);
    }
}

/// Arc wrapper for progress callbacks
impl<T: ProgressCallback + ?Sized> ProgressCallback for Arc<T> {
    fn on_progress(&self, event: ProgressEvent) {
        (**self).on_progress(event)
    }
}

/// Box wrapper for progress callbacks
impl ProgressCallback for Box<dyn ProgressCallback> {
    fn on_progress(&self, event: ProgressEvent) {
        (**self).on_progress(event)
    }
}

struct SinkState {
    tasks: Vec<FileTask>,
    closed: bool,
}

/// Single funnel every strategy reports through.
///
/// Holds the [`FileTask`] of each index and forwards only events that keep
/// the per-file stream well formed: progress never regresses, nothing
/// follows a terminal event, nothing is delivered once the sink is closed.
/// The callback runs under the sink lock, so after [`ProgressSink::close`]
/// returns no callback is running or will run.
pub struct ProgressSink {
    state: Mutex<SinkState>,
    callback: Arc<dyn ProgressCallback>,
}

impl ProgressSink {
    pub fn new<I, S>(file_names: I, callback: Arc<dyn ProgressCallback>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks = file_names
            .into_iter()
            .enumerate()
            .map(|(index, name)| FileTask::new(index, name))
            .collect();

        Self {
            state: Mutex::new(SinkState {
                tasks,
                closed: false,
            }),
            callback,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an event, returning whether it reached the callback
    pub fn emit(&self, event: ProgressEvent) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }

        let Some(task) = state.tasks.get_mut(event.index) else {
            tracing::warn!(target: "compress::progress", index = event.index, "Dropping event for unknown file index");
            return false;
        };

        if !task.apply(&event) {
            tracing::trace!(
                target: "compress::progress",
                index = event.index,
                progress = event.progress,
                status = ?event.status,
                "Dropping out-of-order event"
            );
            return false;
        }

        self.callback.on_progress(event);
        true
    }

    /// Emit a terminal error for every file that has not finished yet
    pub fn fail_pending(&self, message: &str) {
        for index in self.pending_indices() {
            self.emit(ProgressEvent::failed(index, message));
        }
    }

    /// Indices that have not received a terminal event
    pub fn pending_indices(&self) -> Vec<usize> {
        self.lock()
            .tasks
            .iter()
            .filter(|t| !t.is_terminal())
            .map(|t| t.index)
            .collect()
    }

    /// Whether every file has received its terminal event
    pub fn is_finished(&self) -> bool {
        self.lock().tasks.iter().all(FileTask::is_terminal)
    }

    /// Stop delivering events; idempotent
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Current state of every file
    pub fn snapshot(&self) -> Vec<FileTask> {
        self.lock().tasks.clone()
    }
}
