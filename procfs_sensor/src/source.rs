//! Stat source: runs the per-process statistics command once per tick.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::SensorError;

/// Raw command output plus the instant it was requested.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub captured_at: NaiveDateTime,
    pub text: String,
}

#[async_trait]
pub trait StatSource: Send + Sync {
    async fn capture(&self) -> Result<RawSample, SensorError>;
}

/// Runs an external program with no arguments and returns its stdout.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    timeout: Option<Duration>,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl StatSource for CommandSource {
    async fn capture(&self) -> Result<RawSample, SensorError> {
        let captured_at = Local::now().naive_local();

        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a timed-out child must not outlive the tick
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => timeout(limit, cmd.output())
                .await
                .map_err(|_| SensorError::SourceTimeout(limit))?,
            None => cmd.output().await,
        }
        .map_err(|e| SensorError::SourceUnavailable(format!("cannot run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SensorError::SourceUnavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(RawSample {
            captured_at,
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
