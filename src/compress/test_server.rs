//! In-process stand-in for the compression service, used by tests

use crate::api::Client;
use crate::config::Settings;
use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Scripted backend behaviour
#[derive(Debug, Clone)]
pub struct Script {
    default_states: Vec<String>,
    states: HashMap<String, Vec<String>>,
    submit_failure: Option<(u16, String)>,
    submit_rejected: bool,
    status_failure: Option<u16>,
    batch_body: Option<String>,
    batch_failure: Option<(u16, String)>,
    batch_truncate: usize,
    batch_extra: usize,
    batch_errors: Vec<String>,
    batch_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            default_states: vec!["pending".into(), "processing".into(), "done".into()],
            states: HashMap::new(),
            submit_failure: None,
            submit_rejected: false,
            status_failure: None,
            batch_body: None,
            batch_failure: None,
            batch_truncate: 0,
            batch_extra: 0,
            batch_errors: Vec::new(),
            batch_delay: Duration::ZERO,
        }
    }
}

impl Script {
    /// Job states reported for `file_name`, one per poll; the last one repeats
    pub fn states(mut self, file_name: &str, states: &[&str]) -> Self {
        self.states.insert(
            file_name.to_string(),
            states.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn submit_failure(mut self, status: u16, body: &str) -> Self {
        self.submit_failure = Some((status, body.to_string()));
        self
    }

    pub fn submit_rejected(mut self) -> Self {
        self.submit_rejected = true;
        self
    }

    pub fn status_failure(mut self, status: u16) -> Self {
        self.status_failure = Some(status);
        self
    }

    pub fn batch_body(mut self, body: &str) -> Self {
        self.batch_body = Some(body.to_string());
        self
    }

    pub fn batch_failure(mut self, status: u16, body: &str) -> Self {
        self.batch_failure = Some((status, body.to_string()));
        self
    }

    /// Drop this many entries from the end of the batch response
    pub fn batch_truncate(mut self, n: usize) -> Self {
        self.batch_truncate = n;
        self
    }

    /// Append this many surplus entries to the batch response
    pub fn batch_extra(mut self, n: usize) -> Self {
        self.batch_extra = n;
        self
    }

    /// Report the batch entry of `file_name` as failed
    pub fn batch_error(mut self, file_name: &str) -> Self {
        self.batch_errors.push(file_name.to_string());
        self
    }

    pub fn batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }
}

struct Job {
    file_name: String,
    size: u64,
    polls: usize,
}

struct Backend {
    base_url: String,
    script: Script,
    next_id: AtomicI64,
    jobs: Mutex<HashMap<i64, Job>>,
    submits: AtomicUsize,
    polls: AtomicUsize,
    batch_modes: Mutex<Vec<String>>,
}

impl Backend {
    fn done_entry(&self, id: i64, file_name: &str, size: u64) -> Value {
        let compressed = size / 2;
        let reduction = if size == 0 {
            0.0
        } else {
            (1.0 - compressed as f64 / size as f64) * 100.0
        };
        json!({
            "jobId": id,
            "status": "done",
            "originalFilename": file_name,
            "originalSize": size,
            "compressedSize": compressed,
            "reductionPercent": reduction,
            "processingTime": 0.25,
            "downloadUrl": format!("{}/download/{}_{}", self.base_url, id, file_name),
        })
    }
}

/// Running mock backend; the server stops when this is dropped
pub struct MockBackend {
    state: Arc<Backend>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(Backend {
            base_url: format!("http://{}", addr),
            script,
            next_id: AtomicI64::new(1),
            jobs: Mutex::new(HashMap::new()),
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            batch_modes: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/compress", post(handle_submit))
            .route("/compress/:mode", post(handle_batch))
            .route("/jobs/:id", get(handle_job))
            .route("/download/:file", get(handle_download))
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state, server }
    }

    pub fn url(&self) -> &str {
        &self.state.base_url
    }

    /// Settings pointing at this backend, with test-friendly intervals
    pub fn settings(&self) -> Settings {
        Settings::with_base_url(self.url())
            .unwrap()
            .poll_interval(Duration::from_millis(5))
            .max_poll_attempts(20)
            .tick_interval(Duration::from_millis(5))
    }

    pub fn client(&self) -> Client {
        Client::from_settings(&self.settings())
    }

    pub fn submits(&self) -> usize {
        self.state.submits.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.state.polls.load(Ordering::SeqCst)
    }

    pub fn batch_modes(&self) -> Vec<String> {
        self.state.batch_modes.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn read_files(mut multipart: Multipart) -> Vec<(String, u64)> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload.pdf".to_string());
        let data = field.bytes().await.unwrap();
        files.push((name, data.len() as u64));
    }
    files
}

async fn handle_submit(State(backend): State<Arc<Backend>>, multipart: Multipart) -> Response {
    backend.submits.fetch_add(1, Ordering::SeqCst);
    let files = read_files(multipart).await;

    if let Some((status, body)) = &backend.script.submit_failure {
        return (StatusCode::from_u16(*status).unwrap(), body.clone()).into_response();
    }
    if backend.script.submit_rejected {
        return Json(json!({ "success": false, "message": "rejected" })).into_response();
    }

    let Some((file_name, size)) = files.into_iter().next() else {
        return (StatusCode::BAD_REQUEST, "No file uploaded").into_response();
    };

    let id = backend.next_id.fetch_add(1, Ordering::SeqCst);
    backend.jobs.lock().unwrap().insert(
        id,
        Job {
            file_name,
            size,
            polls: 0,
        },
    );

    Json(json!({
        "success": true,
        "jobId": id,
        "message": "Job created, worker will process it",
    }))
    .into_response()
}

async fn handle_job(State(backend): State<Arc<Backend>>, Path(id): Path<i64>) -> Response {
    backend.polls.fetch_add(1, Ordering::SeqCst);

    if let Some(status) = backend.script.status_failure {
        return (StatusCode::from_u16(status).unwrap(), "status unavailable").into_response();
    }

    let mut jobs = backend.jobs.lock().unwrap();
    let Some(job) = jobs.get_mut(&id) else {
        return (StatusCode::NOT_FOUND, "Job not found").into_response();
    };

    job.polls += 1;
    let states = backend
        .script
        .states
        .get(&job.file_name)
        .unwrap_or(&backend.script.default_states);
    let state = states[(job.polls - 1).min(states.len() - 1)].clone();

    let body = if state == "done" {
        backend.done_entry(id, &job.file_name, job.size)
    } else {
        json!({
            "jobId": id,
            "status": state,
            "originalFilename": job.file_name,
            "originalSize": 0,
            "compressedSize": 0,
            "reductionPercent": 0.0,
            "processingTime": 0.0,
            "downloadUrl": null,
        })
    };

    Json(body).into_response()
}

async fn handle_batch(
    State(backend): State<Arc<Backend>>,
    Path(mode): Path<String>,
    multipart: Multipart,
) -> Response {
    backend.batch_modes.lock().unwrap().push(mode);
    let files = read_files(multipart).await;

    if !backend.script.batch_delay.is_zero() {
        tokio::time::sleep(backend.script.batch_delay).await;
    }

    if let Some((status, body)) = &backend.script.batch_failure {
        return (StatusCode::from_u16(*status).unwrap(), body.clone()).into_response();
    }
    if let Some(body) = &backend.script.batch_body {
        return (
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.clone(),
        )
            .into_response();
    }

    let mut entries: Vec<Value> = files
        .iter()
        .map(|(name, size)| {
            let id = backend.next_id.fetch_add(1, Ordering::SeqCst);
            if backend.script.batch_errors.contains(name) {
                json!({ "jobId": id, "status": "error", "originalFilename": name })
            } else {
                backend.done_entry(id, name, *size)
            }
        })
        .collect();

    let keep = entries.len().saturating_sub(backend.script.batch_truncate);
    entries.truncate(keep);
    for _ in 0..backend.script.batch_extra {
        let id = backend.next_id.fetch_add(1, Ordering::SeqCst);
        entries.push(backend.done_entry(id, "surplus.pdf", 10));
    }

    Json(Value::Array(entries)).into_response()
}

async fn handle_download(Path(file): Path<String>) -> Response {
    format!("%PDF-compressed:{}", file).into_response()
}
