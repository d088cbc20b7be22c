//! Per-job strategy: one upload per file, then status polling

use super::error::{CompressError, CompressResult};
use super::progress::{ProgressEvent, ProgressSink};
use super::reconcile::reconcile_job;
use super::request::{InputFile, RequestBuilder};
use super::tracker::{JobTracker, PollConfig};
use super::CompressStrategy;
use crate::api::Client;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// Progress reported once the service has accepted a job
const SUBMITTED_PROGRESS: u8 = 60;

/// Uploads every file as its own job and tracks each job independently.
///
/// Failures are per file: they end that file with an `error` event and
/// never affect the other files of the batch.
pub struct PollingStrategy {
    client: Client,
    poll: PollConfig,
}

impl PollingStrategy {
    pub fn new(client: Client, poll: PollConfig) -> Self {
        Self { client, poll }
    }

    async fn compress_one(&self, index: usize, file: &InputFile, sink: &ProgressSink) {
        if let Err(e) = self.submit_and_track(index, file, sink).await {
            tracing::error!(
                target: "compress::polling",
                index,
                file = file.name(),
                error = %e,
                "Compression failed"
            );
            sink.emit(ProgressEvent::failed(index, e.user_message()));
        }
    }

    async fn submit_and_track(
        &self,
        index: usize,
        file: &InputFile,
        sink: &ProgressSink,
    ) -> CompressResult<()> {
        let form = RequestBuilder::single_job(file).await?;
        let response = self
            .client
            .submit_job(form)
            .await
            .map_err(CompressError::from_submission)?;

        if !response.success {
            tracing::warn!(
                target: "compress::polling",
                index,
                reason = response.message.as_deref().unwrap_or_default(),
                "Service rejected job"
            );
            return Err(CompressError::Rejected);
        }
        let job = response
            .job_id
            .ok_or_else(|| CompressError::Malformed("missing field `jobId`".to_string()))?;

        tracing::debug!(target: "compress::polling", index, job = %job, file = file.name(), "Job submitted");
        sink.emit(ProgressEvent::processing(index, SUBMITTED_PROGRESS));

        let snapshot = JobTracker::new(&self.client, self.poll)
            .track(index, &job, sink)
            .await?;
        reconcile_job(index, &snapshot, sink)
    }
}

#[async_trait]
impl CompressStrategy for PollingStrategy {
    async fn run(&self, files: &[InputFile], sink: Arc<ProgressSink>) -> CompressResult<()> {
        // Files interleave on this task; no file waits on another's polling
        join_all(
            files
                .iter()
                .enumerate()
                .map(|(index, file)| self.compress_one(index, file, &sink)),
        )
        .await;
        Ok(())
    }
}
