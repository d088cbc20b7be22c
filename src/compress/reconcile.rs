//! Mapping of backend job results back onto caller file indices

use super::error::{CompressError, CompressResult};
use super::progress::{CompressionStats, ProgressEvent, ProgressSink};
use crate::api::{JobSnapshot, JobState};

/// Outcome of one batch reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Files that received a `completed` event
    pub completed: usize,
    /// Files that received an `error` event
    pub failed: usize,
    /// Response entries beyond the submitted file count
    pub ignored: usize,
    /// File indices the response had no entry for
    pub missing: Vec<usize>,
}

fn require<T: Copy>(value: Option<T>, field: &str) -> CompressResult<T> {
    value.ok_or_else(|| CompressError::Malformed(format!("missing field `{}`", field)))
}

/// Build display stats and the download URL from a finished job
pub fn completed_result(snapshot: &JobSnapshot) -> CompressResult<(CompressionStats, String)> {
    match snapshot.status {
        JobState::Done => {}
        JobState::Error => return Err(CompressError::JobFailed),
        other => {
            return Err(CompressError::Malformed(format!(
                "job is not finished (state {:?})",
                other
            )));
        }
    }

    let stats = CompressionStats::new(
        require(snapshot.original_size, "originalSize")?,
        require(snapshot.compressed_size, "compressedSize")?,
        require(snapshot.reduction_percent, "reductionPercent")?,
        require(snapshot.processing_time, "processingTime")?,
    );

    let download_url = snapshot
        .download_url
        .clone()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| CompressError::Malformed("missing field `downloadUrl`".to_string()))?;

    Ok((stats, download_url))
}

/// Emit the `completed` event of one polled job.
///
/// Nothing is emitted on error; the caller decides how the failure surfaces.
pub fn reconcile_job(index: usize, snapshot: &JobSnapshot, sink: &ProgressSink) -> CompressResult<()> {
    let (stats, download_url) = completed_result(snapshot)?;
    tracing::debug!(
        target: "compress::reconcile",
        index,
        reduction = %stats.reduction,
        processing_time = %stats.processing_time,
        "Job completed"
    );
    sink.emit(ProgressEvent::completed(index, stats, download_url));
    Ok(())
}

/// Walk a batch response positionally, emitting one terminal event per entry.
///
/// Entries at positions `>= file_count` are ignored. Indices past the end of a
/// short response are reported in [`Reconciliation::missing`] and receive no
/// event from this pass.
pub fn reconcile_batch(
    file_count: usize,
    entries: &[JobSnapshot],
    sink: &ProgressSink,
) -> Reconciliation {
    let mut outcome = Reconciliation::default();

    for (index, entry) in entries.iter().enumerate() {
        if index >= file_count {
            outcome.ignored += 1;
            continue;
        }

        match completed_result(entry) {
            Ok((stats, download_url)) => {
                sink.emit(ProgressEvent::completed(index, stats, download_url));
                outcome.completed += 1;
            }
            Err(e) => {
                tracing::warn!(target: "compress::reconcile", index, error = %e, "Batch entry failed");
                sink.emit(ProgressEvent::failed(index, e.user_message()));
                outcome.failed += 1;
            }
        }
    }

    if entries.len() < file_count {
        outcome.missing = (entries.len()..file_count).collect();
    }

    if outcome.ignored > 0 || !outcome.missing.is_empty() {
        tracing::warn!(
            target: "compress::reconcile",
            files = file_count,
            entries = entries.len(),
            ignored = outcome.ignored,
            missing = outcome.missing.len(),
            "Batch response length does not match submitted files"
        );
    }

    outcome
}
