use anyhow::{Context, bail};
use clap::Parser;
use futures::StreamExt;
use pdf_squeeze::{
    CompressMode, Event, EventBroadcaster, FileStatus, InputFile, LogConfig, Orchestrator,
    Settings, Strategy, compress::artifact_file_names, logging::init_logging,
};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Compress documents with a remote compression service
#[derive(Debug, Parser)]
#[command(name = "pdf-squeeze", version)]
struct Cli {
    /// Documents to compress
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Server-side strategy for batched requests (`single` or `batch`)
    #[arg(long)]
    mode: Option<String>,

    /// Submit one job per file and poll its status instead of one batched request
    #[arg(long)]
    poll: bool,

    /// Download compressed files into this directory
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Print progress events as JSON lines
    #[arg(long)]
    json: bool,

    /// Backend base URL, overrides BACKEND_URL
    #[arg(long, value_name = "URL")]
    backend: Option<String>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Also write logs to ~/.pdf-squeeze/logs
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(LogConfig {
        log_to_file: cli.log_file,
        log_level: cli.log_level.clone(),
        ..LogConfig::default()
    })
    .context("Failed to initialize logging system")?;

    let settings = match &cli.backend {
        Some(url) => Settings::with_base_url(url)?,
        None => Settings::global().clone(),
    };
    tracing::info!(target: "main", base_url = %settings.base_url, "Using compression service");

    let strategy = if cli.poll {
        Strategy::Polling
    } else {
        Strategy::Batched(CompressMode::from_selector(cli.mode.as_deref()))
    };

    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        files.push(
            InputFile::from_path(path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?,
        );
    }
    let names: Vec<String> = files.iter().map(|f| f.name().to_string()).collect();

    let broadcaster = EventBroadcaster::default();
    let printer = if cli.json {
        let stream = broadcaster.json_stream();
        tokio::spawn(async move {
            tokio::pin!(stream);
            while let Some(line) = stream.next().await {
                println!("{}", line);
            }
        })
    } else {
        let mut receiver = broadcaster.subscribe();
        let names = names.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => print_event(&names, &event),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let orchestrator = Orchestrator::new(settings);
    let result = orchestrator
        .compress_with_cancel(&files, strategy, broadcaster.clone(), &cancel)
        .await;

    // Last sender gone: the printer drains and stops
    drop(broadcaster);
    let _ = printer.await;

    let tasks = result?;

    if let Some(out) = &cli.out {
        tokio::fs::create_dir_all(out)
            .await
            .with_context(|| format!("Cannot create {}", out.display()))?;

        let artifact_names = artifact_file_names(&tasks);
        for (task, artifact_name) in tasks.iter().zip(&artifact_names) {
            if task.status != FileStatus::Completed {
                continue;
            }
            let Some(url) = &task.download_url else {
                continue;
            };
            let dest = out.join(artifact_name);
            let bytes = orchestrator
                .client()
                .download(url, &dest)
                .await
                .with_context(|| format!("Cannot download {}", task.file_name))?;
            if !cli.json {
                println!("saved {} ({} bytes)", dest.display(), bytes);
            }
        }
    }

    let failed = tasks.iter().filter(|t| t.status == FileStatus::Error).count();
    if failed > 0 {
        bail!("{} of {} files failed", failed, tasks.len());
    }
    Ok(())
}

fn print_event(names: &[String], event: &Event) {
    let name = |index: usize| names.get(index).map(String::as_str).unwrap_or("?");
    match event {
        Event::FileProgress { index, progress } => {
            println!("[{:>3}%] {}", progress, name(*index));
        }
        Event::FileCompleted { index, stats, .. } => println!(
            "[done] {}: {} -> {} bytes (-{}%) in {}s",
            name(*index),
            stats.original_size,
            stats.compressed_size,
            stats.reduction,
            stats.processing_time
        ),
        Event::FileFailed { index, error } => {
            println!("[fail] {}: {}", name(*index), error);
        }
    }
}
