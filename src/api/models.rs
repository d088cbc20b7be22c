//! Wire models for the compression service

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque identifier of one server-side compression job.
///
/// The service hands out numeric ids, but callers only ever echo them back,
/// so both JSON numbers and strings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JobHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => JobHandle(n.to_string()),
            RawId::Text(s) => JobHandle(s),
        })
    }
}

/// Response of `POST /compress`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub job_id: Option<JobHandle>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Server-side job state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Done,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

/// Job snapshot as returned by `GET /jobs/{id}` and as an element of the
/// batch response array.
///
/// Every metric is optional on the wire; the reconciler decides which
/// fields are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    #[serde(default)]
    pub job_id: Option<JobHandle>,
    #[serde(default)]
    pub status: JobState,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub original_size: Option<u64>,
    #[serde(default)]
    pub compressed_size: Option<u64>,
    #[serde(default)]
    pub reduction_percent: Option<f64>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub download_url: Option<String>,
}
