//! Parser for the tabular per-process output of the stat command (pidstat).
//!
//! The column layout is fixed per deployment and lives in [`ColumnLayout`]; every
//! positional assumption about the tool's output is made here and nowhere else.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::SensorError;

/// Where the interesting fields sit in a pidstat data row.
///
/// The default matches `pidstat` with no arguments under a 24h locale:
/// `Time UID PID %usr %system %guest %wait %CPU CPU Command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ColumnLayout {
    /// Banner, blank line and column header.
    pub header_lines: usize,
    pub columns: usize,
    pub pid_column: usize,
    pub cpu_column: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            header_lines: 3,
            columns: 10,
            pid_column: 2,
            cpu_column: 7,
        }
    }
}

impl ColumnLayout {
    pub fn validate(&self) -> Result<(), SensorError> {
        if self.pid_column >= self.columns || self.cpu_column >= self.columns {
            return Err(SensorError::Config(format!(
                "stat-layout columns out of range: pid {} / cpu {} with {} columns",
                self.pid_column, self.cpu_column, self.columns
            )));
        }
        if self.pid_column == self.cpu_column {
            return Err(SensorError::Config(
                "stat-layout pid-column and cpu-column must differ".into(),
            ));
        }
        Ok(())
    }
}

/// What to do with a row that has the right shape but unparsable values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParsePolicy {
    /// Drop the row and keep going.
    #[default]
    Tolerant,
    /// Fail the whole sample.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Fields { pid: u32, cpu: f64 },
    /// Wrong column count: banners, blank lines, trailing summaries.
    Skip,
    Malformed(String),
}

pub fn parse_line(line: &str, layout: &ColumnLayout) -> LineOutcome {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != layout.columns {
        return LineOutcome::Skip;
    }

    let (Some(&pid_tok), Some(&cpu_tok)) =
        (tokens.get(layout.pid_column), tokens.get(layout.cpu_column))
    else {
        return LineOutcome::Malformed(format!(
            "layout column out of range for {} tokens",
            tokens.len()
        ));
    };

    let pid = match pid_tok.parse::<u32>() {
        Ok(p) => p,
        Err(_) => return LineOutcome::Malformed(format!("bad pid {pid_tok:?}")),
    };

    // Some locales print "12,5" for 12.5.
    let cpu = match cpu_tok.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => return LineOutcome::Malformed(format!("bad cpu percentage {cpu_tok:?}")),
    };

    LineOutcome::Fields { pid, cpu }
}

/// Per-process CPU usage in the order the stat command printed it.
///
/// A pid seen twice keeps its first position and its last value, so summing
/// over [`ProcessUsage::iter`] is reproducible for identical input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessUsage {
    rows: Vec<(u32, f64)>,
    index: HashMap<u32, usize>,
}

impl ProcessUsage {
    pub fn insert(&mut self, pid: u32, cpu: f64) {
        match self.index.get(&pid) {
            Some(&at) => self.rows[at].1 = cpu,
            None => {
                self.index.insert(pid, self.rows.len());
                self.rows.push((pid, cpu));
            }
        }
    }

    pub fn get(&self, pid: u32) -> Option<f64> {
        self.index.get(&pid).map(|&at| self.rows[at].1)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in output order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.rows.iter().copied()
    }
}

impl FromIterator<(u32, f64)> for ProcessUsage {
    fn from_iter<I: IntoIterator<Item = (u32, f64)>>(iter: I) -> Self {
        let mut usage = ProcessUsage::default();
        for (pid, cpu) in iter {
            usage.insert(pid, cpu);
        }
        usage
    }
}

/// Per-process CPU usage extracted from one run of the stat command.
#[derive(Debug, Clone, Default)]
pub struct ParsedSample {
    pub usage: ProcessUsage,
    pub skipped: usize,
    pub malformed: usize,
}

pub fn parse_sample(
    text: &str,
    layout: &ColumnLayout,
    policy: ParsePolicy,
) -> Result<ParsedSample, SensorError> {
    let mut out = ParsedSample::default();

    for (idx, line) in text.lines().enumerate().skip(layout.header_lines) {
        match parse_line(line, layout) {
            LineOutcome::Fields { pid, cpu } => {
                // last row wins for a repeated pid
                out.usage.insert(pid, cpu);
            }
            LineOutcome::Skip => out.skipped += 1,
            LineOutcome::Malformed(reason) => match policy {
                ParsePolicy::Tolerant => {
                    debug!(line = idx + 1, %reason, "skipping malformed stat line");
                    out.malformed += 1;
                }
                ParsePolicy::Strict => {
                    return Err(SensorError::MalformedSample {
                        line: idx + 1,
                        reason,
                    })
                }
            },
        }
    }

    Ok(out)
}
