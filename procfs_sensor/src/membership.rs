//! Target membership: which pids belong to a cgroup right now.

use futures::future::join_all;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::warn;

use crate::error::SensorError;

/// Membership of one target as seen on this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Membership {
    Members(HashSet<u32>),
    /// The membership file could not be read (group removed, never existed, permissions).
    Unavailable,
}

impl Membership {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Membership::Unavailable)
    }
}

#[derive(Debug, Clone)]
pub struct MembershipReader {
    root: PathBuf,
    file: String,
}

impl MembershipReader {
    pub fn new(root: impl Into<PathBuf>, file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file: file.into(),
        }
    }

    /// `<root>/<target>/<file>`, e.g. `/sys/fs/cgroup/perf_event/web/tasks`.
    pub fn path_for(&self, target: &str) -> PathBuf {
        self.root.join(target).join(&self.file)
    }

    pub async fn read(&self, target: &str) -> Result<HashSet<u32>, SensorError> {
        let path = self.path_for(target);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(parse_members(&raw)),
            Err(source) => Err(SensorError::TargetUnavailable {
                target: target.to_string(),
                path,
                source,
            }),
        }
    }

    /// Reads every target concurrently. The result is in `targets` order, one entry each.
    pub async fn read_all(&self, targets: &[String]) -> Vec<Membership> {
        join_all(targets.iter().map(|t| async move {
            match self.read(t).await {
                Ok(pids) => Membership::Members(pids),
                Err(e) => {
                    warn!(group = %t, error = %e, "target membership unavailable, reporting zero");
                    Membership::Unavailable
                }
            }
        }))
        .await
    }
}

/// One pid per line; the empty line after the final newline is not a member.
pub fn parse_members(raw: &str) -> HashSet<u32> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| l.parse().ok())
        .collect()
}
