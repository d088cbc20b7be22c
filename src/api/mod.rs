//! HTTP client for the remote compression service

mod error;
pub mod models;

pub use error::{ApiError, ApiResult};
pub use models::{JobHandle, JobSnapshot, JobState, SubmitResponse};

use crate::config::Settings;
use futures::StreamExt;
use reqwest::Response;
use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Compression service client
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
}

impl Client {
    /// Create a client for the given service root
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.base_url.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    /// Submit one file as an asynchronous job (`POST /compress`)
    pub async fn submit_job(&self, form: Form) -> ApiResult<SubmitResponse> {
        let url = self.endpoint("/compress")?;
        tracing::debug!(target: "api", url = %url, "Submitting compression job");

        let response = self.http.post(url).multipart(form).send().await?;
        decode(response).await
    }

    /// Fetch the current state of a job (`GET /jobs/{id}`)
    pub async fn job_status(&self, job: &JobHandle) -> ApiResult<JobSnapshot> {
        let url = self.endpoint(&format!("/jobs/{}", job))?;
        tracing::trace!(target: "api", url = %url, "Polling job status");

        let response = self.http.get(url).send().await?;
        decode(response).await
    }

    /// Compress every file of the form in one exchange (`POST /compress/{mode}`).
    ///
    /// The response must be a JSON array, positionally aligned with the
    /// `file` fields of the form.
    pub async fn compress_batch(&self, mode: &str, form: Form) -> ApiResult<Vec<JobSnapshot>> {
        let url = self.endpoint(&format!("/compress/{}", mode))?;
        tracing::debug!(target: "api", url = %url, "Submitting batch compression");

        let response = self.http.post(url).multipart(form).send().await?;
        let value: serde_json::Value = decode(response).await?;

        match value {
            serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
            other => Err(ApiError::Decode(format!(
                "expected an array of job results, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Stream a compressed artifact to `dest`, returning the number of bytes written.
    ///
    /// `url` is usually the `downloadUrl` of a completed job; relative paths are
    /// resolved against the base URL.
    pub async fn download(&self, url: &str, dest: &Path) -> ApiResult<u64> {
        let url = match Url::parse(url) {
            Ok(absolute) => absolute,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.endpoint(url)?,
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(target: "api", url = %url, dest = %dest.display(), "Downloading artifact");

        let response = check_status(self.http.get(url).send().await?).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// Turn non-2xx responses into [`ApiError::Status`] with the body attached
async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(target: "api", status = status.as_u16(), body = %body, "Backend returned an error status");
    Err(ApiError::status(status.as_u16(), body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let response = check_status(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
