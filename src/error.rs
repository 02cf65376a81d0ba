use std::path::PathBuf;
use std::time::Duration;

/// A specialized Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Top-level error type for both capture pipelines.
///
/// Every variant is fatal to the current run; nothing is retried. Partial
/// output left on disk after a failure must be treated as discardable.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("failed to capture still frame to '{path}': {message}")]
    Capture { path: PathBuf, message: String },

    #[error("finished flag was not observed within {waited:?}")]
    Timeout { waited: Duration },

    #[error("recording timed out after {waited:?} waiting for the animation to finish")]
    RecordingTimeout { waited: Duration },

    #[error("failed to start encoder process '{program}': {source}")]
    EncoderSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("an encoder process is already running for this session")]
    EncoderBusy,

    #[error("interrupted by user")]
    Interrupted,

    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),
}
