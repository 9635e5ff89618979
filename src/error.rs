//! Crate-wide error type for everything that runs off the real-time thread.
//!
//! The RT callback (`AudioEngine::process_block`) never returns or throws —
//! it counts x-runs and keeps rendering (see §7 of the spec). This type is
//! for the UI/loader/decoder side only.

use std::path::PathBuf;

/// Crate-wide result alias for off-RT operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error for loaders, the sample pool, and graph construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV parse error in {path}: {message}")]
    WavParse { path: PathBuf, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("no output device available")]
    NoOutputDevice,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub fn wav_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::WavParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for attaching context to a `Result`.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}
