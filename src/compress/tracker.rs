//! Status polling for asynchronous server-side jobs

use super::error::{CompressError, CompressResult};
use super::progress::{ProgressEvent, ProgressSink};
use crate::api::{Client, JobHandle, JobSnapshot, JobState};
use crate::config::Settings;
use std::time::Duration;

/// Polling cadence and ceiling
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: crate::config::DEFAULT_POLL_INTERVAL,
            max_attempts: crate::config::DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl From<&Settings> for PollConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            interval: settings.poll_interval,
            max_attempts: settings.max_poll_attempts,
        }
    }
}

/// Progress shown for an observed job state.
///
/// `Done` maps to 95: the jump to 100 comes with the terminal event so the
/// stats can be attached to it.
pub fn observed_progress(state: JobState) -> Option<u8> {
    match state {
        JobState::Pending => Some(60),
        JobState::Processing => Some(75),
        JobState::Done => Some(95),
        JobState::Error | JobState::Unknown => None,
    }
}

/// Polls one job at a time until it reaches a terminal state
pub struct JobTracker<'a> {
    client: &'a Client,
    config: PollConfig,
}

impl<'a> JobTracker<'a> {
    pub fn new(client: &'a Client, config: PollConfig) -> Self {
        Self { client, config }
    }

    /// Poll `job` until it is done, reporting observed progress for `index`.
    ///
    /// Returns the final snapshot of a `done` job. A job the service marks as
    /// failed returns [`CompressError::JobFailed`]; running out of attempts
    /// returns [`CompressError::Timeout`].
    pub async fn track(
        &self,
        index: usize,
        job: &JobHandle,
        sink: &ProgressSink,
    ) -> CompressResult<JobSnapshot> {
        for attempt in 1..=self.config.max_attempts {
            let snapshot = self
                .client
                .job_status(job)
                .await
                .map_err(CompressError::from_poll)?;

            tracing::trace!(
                target: "compress::tracker",
                index,
                job = %job,
                attempt,
                state = ?snapshot.status,
                "Observed job state"
            );

            match snapshot.status {
                JobState::Done => {
                    sink.emit(ProgressEvent::processing(index, 95));
                    tracing::debug!(target: "compress::tracker", index, job = %job, attempt, "Job finished");
                    return Ok(snapshot);
                }
                JobState::Error => {
                    tracing::warn!(target: "compress::tracker", index, job = %job, "Job failed on server");
                    return Err(CompressError::JobFailed);
                }
                JobState::Unknown => {
                    tracing::warn!(target: "compress::tracker", index, job = %job, "Unrecognized job state, still polling");
                }
                state => {
                    if let Some(progress) = observed_progress(state) {
                        sink.emit(ProgressEvent::processing(index, progress));
                    }
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        tracing::warn!(
            target: "compress::tracker",
            index,
            job = %job,
            attempts = self.config.max_attempts,
            "Job polling timed out"
        );
        Err(CompressError::Timeout {
            attempts: self.config.max_attempts,
        })
    }
}
