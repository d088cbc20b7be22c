//! Batched strategy: every file in one request, progress simulated meanwhile

use super::error::{CompressError, CompressResult};
use super::progress::{ProgressEvent, ProgressSink};
use super::reconcile::reconcile_batch;
use super::request::{InputFile, RequestBuilder};
use super::simulated::{SimulatedProgress, SimulationProfile};
use super::{CompressMode, CompressStrategy};
use crate::api::{Client, JobSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Sends all files in a single `POST /compress/{mode}` exchange.
///
/// Any failure of the exchange itself fails the whole batch.
pub struct BatchedStrategy {
    client: Client,
    mode: CompressMode,
    tick: Duration,
}

impl BatchedStrategy {
    pub fn new(client: Client, mode: CompressMode, tick: Duration) -> Self {
        Self { client, mode, tick }
    }

    async fn exchange(&self, files: &[InputFile]) -> CompressResult<Vec<JobSnapshot>> {
        let form = RequestBuilder::batch(files).await?;
        self.client
            .compress_batch(self.mode.endpoint_segment(), form)
            .await
            .map_err(CompressError::from_submission)
    }
}

#[async_trait]
impl CompressStrategy for BatchedStrategy {
    async fn run(&self, files: &[InputFile], sink: Arc<ProgressSink>) -> CompressResult<()> {
        let profile = SimulationProfile::new(self.mode.estimated_duration(), self.tick);
        let simulation = SimulatedProgress::start(0..files.len(), sink.clone(), profile);

        let result = self.exchange(files).await;
        simulation.shutdown().await;

        match result {
            Ok(entries) => {
                let outcome = reconcile_batch(files.len(), &entries, &sink);
                for &index in &outcome.missing {
                    let err = CompressError::MissingResult { index };
                    sink.emit(ProgressEvent::failed(index, err.user_message()));
                }
                tracing::info!(
                    target: "compress::batched",
                    mode = ?self.mode,
                    completed = outcome.completed,
                    failed = outcome.failed,
                    missing = outcome.missing.len(),
                    "Batch reconciled"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(target: "compress::batched", mode = ?self.mode, error = %e, "Batch request failed");
                sink.fail_pending(&e.user_message());
                Err(e)
            }
        }
    }
}
