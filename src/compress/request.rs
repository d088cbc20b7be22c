//! Input files and multipart request construction

use super::error::{CompressError, CompressResult};
use bytes::Bytes;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;

/// Multipart field every file is sent under
pub const FILE_FIELD: &str = "file";

/// Content type announced for uploaded documents
pub const DOCUMENT_MIME: &str = "application/pdf";

/// Buffer size for streaming reads (64KB)
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
enum Source {
    Memory(Bytes),
    Disk { path: PathBuf, len: u64 },
}

/// One document to compress. Read-only for the orchestrator.
#[derive(Debug, Clone)]
pub struct InputFile {
    name: String,
    source: Source,
}

impl InputFile {
    /// In-memory document
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: Source::Memory(data.into()),
        }
    }

    /// Document on disk; its contents are streamed when the request is sent
    pub async fn from_path(path: impl AsRef<Path>) -> CompressResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| CompressError::FileRead(format!("{}: {}", path.display(), e)))?;

        if !metadata.is_file() {
            return Err(CompressError::FileRead(format!(
                "{}: not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.pdf".to_string());

        Ok(Self {
            name,
            source: Source::Disk {
                path: path.to_path_buf(),
                len: metadata.len(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes
    pub fn len(&self) -> u64 {
        match &self.source {
            Source::Memory(data) => data.len() as u64,
            Source::Disk { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the multipart part for this file
    async fn to_part(&self) -> CompressResult<Part> {
        let part = match &self.source {
            Source::Memory(data) => Part::bytes(data.to_vec()),
            Source::Disk { path, len } => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| CompressError::FileRead(format!("{}: {}", path.display(), e)))?;
                let stream = ReaderStream::with_capacity(file, STREAM_BUFFER_SIZE);
                Part::stream_with_length(Body::wrap_stream(stream), *len)
            }
        };

        part.file_name(self.name.clone())
            .mime_str(DOCUMENT_MIME)
            .map_err(|e| CompressError::Other(e.to_string()))
    }
}

/// Builds the outbound upload bodies.
///
/// Field order follows input order, which is what lets the batch response
/// be matched back to file indices by position.
pub struct RequestBuilder;

impl RequestBuilder {
    /// Body of `POST /compress`: a single `file` field
    pub async fn single_job(file: &InputFile) -> CompressResult<Form> {
        Ok(Form::new().part(FILE_FIELD, file.to_part().await?))
    }

    /// Body of `POST /compress/{mode}`: one `file` field per input, in order
    pub async fn batch(files: &[InputFile]) -> CompressResult<Form> {
        let mut form = Form::new();
        for file in files {
            form = form.part(FILE_FIELD, file.to_part().await?);
        }

        tracing::debug!(
            target: "compress::request",
            files = files.len(),
            total_bytes = files.iter().map(InputFile::len).sum::<u64>(),
            "Built batch upload"
        );
        Ok(form)
    }
}
