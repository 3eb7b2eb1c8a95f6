//! Error type shared by the segment engine, its stores and the tools.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutoskipError>;

#[derive(Debug, Error)]
pub enum AutoskipError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("cannot encode settings: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audio decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("no audio tracks found in {0}")]
    NoAudioTrack(String),

    #[error("audio processing is not available: {0}")]
    AudioUnavailable(String),

    #[error("cannot tap audio source: {0}")]
    TapFailed(String),

    #[error("seek to {position:.2}s failed: {reason}")]
    SeekFailed { position: f64, reason: String },

    #[error("cannot persist cache: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("HOME environment variable not set")]
    NoHomeDir,
}
