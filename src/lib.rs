pub mod api;
pub mod compress;
pub mod config;
pub mod events;
pub mod logging;

// Re-export commonly used types
pub use api::Client;
pub use compress::{
    CompressError, CompressMode, CompressResult, FileStatus, FileTask, InputFile, Orchestrator,
    ProgressCallback, ProgressEvent, ProgressStream, Strategy,
};
pub use config::Settings;
pub use events::{Event, EventBroadcaster};
pub use logging::{LogConfig, LogGuard};
