//! Error kinds raised along the sample -> aggregate -> report -> transmit pipeline.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("stat source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("stat source did not exit within {0:?}")]
    SourceTimeout(Duration),

    #[error("malformed sample line {line}: {reason}")]
    MalformedSample { line: usize, reason: String },

    #[error("target {target} unavailable ({}): {source}", .path.display())]
    TargetUnavailable {
        target: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SensorError {
    /// Whether this error prevents the current tick from sending a report.
    /// Malformed lines and unavailable targets only degrade the tick's data.
    pub fn is_tick_fatal(&self) -> bool {
        !matches!(
            self,
            SensorError::MalformedSample { .. } | SensorError::TargetUnavailable { .. }
        )
    }

    /// Errors that will repeat on every later tick no matter the failure policy.
    /// A failed write closes the writer, so it counts as a lost connection.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            SensorError::Transport(TransportError::Write(_) | TransportError::Closed)
                | SensorError::Config(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("write to output connection failed: {0}")]
    Write(#[from] io::Error),

    #[error("output connection is closed")]
    Closed,

    #[error("report of {0} bytes does not fit a length-prefixed frame")]
    FrameTooLarge(usize),
}
