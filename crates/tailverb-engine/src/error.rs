use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the streaming pipeline.
///
/// Every variant is fatal for the run that produced it. Nothing in the
/// engine retries; callers own retry policy.
#[derive(Error, Debug)]
pub enum Error {
    /// Source path missing, unreadable, or not decodable.
    #[error("source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// Destination could not be created for writing.
    #[error("destination unavailable: {path}: {reason}")]
    DestinationUnavailable { path: PathBuf, reason: String },

    /// Sink was opened with a different format than the source reports.
    #[error(
        "format mismatch: source is {expected_rate} Hz / {expected_channels} ch, \
         sink is {actual_rate} Hz / {actual_channels} ch"
    )]
    FormatMismatch {
        expected_rate: u32,
        expected_channels: usize,
        actual_rate: u32,
        actual_channels: usize,
    },

    /// A block violated the effect engine's input contract.
    #[error("effect state fault: {0}")]
    EffectStateFault(String),

    /// Read failure after the source was opened.
    #[error("read error: {0}")]
    Read(String),

    /// Write failure after the destination was opened.
    #[error("write error: {0}")]
    Write(String),

    /// Invalid parameters or configuration file.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cancellation was observed between two chunks.
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
