//! One tick of the sensor: sample -> parse -> read memberships -> aggregate -> report -> send.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::aggregate::aggregate;
use crate::config::SensorConfig;
use crate::error::SensorError;
use crate::membership::MembershipReader;
use crate::parser::{parse_sample, ColumnLayout, ParsePolicy};
use crate::report::Report;
use crate::scheduler::Scheduler;
use crate::source::StatSource;
use crate::transport::TransportHandle;

/// What a failed tick does to the sensor as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log it and try again at the next tick.
    #[default]
    Continue,
    /// Stop scheduling and surface the error.
    Abort,
}

/// Result of a tick that produced and sent a report.
#[derive(Debug, Clone)]
pub struct TickSummary {
    pub report: Report,
    pub unavailable_targets: Vec<String>,
    pub malformed_lines: usize,
}

pub struct Sensor<S> {
    name: String,
    targets: Vec<String>,
    source: S,
    layout: ColumnLayout,
    parse_policy: ParsePolicy,
    membership: MembershipReader,
    transport: TransportHandle,
}

impl<S: StatSource> Sensor<S> {
    pub fn new(
        name: impl Into<String>,
        targets: Vec<String>,
        source: S,
        membership: MembershipReader,
        transport: TransportHandle,
    ) -> Self {
        Self {
            name: name.into(),
            targets,
            source,
            layout: ColumnLayout::default(),
            parse_policy: ParsePolicy::default(),
            membership,
            transport,
        }
    }

    pub fn from_config(config: &SensorConfig, source: S, transport: TransportHandle) -> Self {
        Self::new(
            config.name.clone(),
            config.target.clone(),
            source,
            MembershipReader::new(&config.cgroup_root, &config.membership_file),
            transport,
        )
        .with_parsing(config.stat_layout, config.parse_policy)
    }

    pub fn with_parsing(mut self, layout: ColumnLayout, policy: ParsePolicy) -> Self {
        self.layout = layout;
        self.parse_policy = policy;
        self
    }

    /// Build this tick's report without sending it.
    pub async fn measure(&self) -> Result<TickSummary, SensorError> {
        let raw = self.source.capture().await?;
        let parsed = parse_sample(&raw.text, &self.layout, self.parse_policy)?;

        let memberships = self.membership.read_all(&self.targets).await;
        let unavailable_targets = self
            .targets
            .iter()
            .zip(&memberships)
            .filter(|(_, m)| m.is_unavailable())
            .map(|(t, _)| t.clone())
            .collect();

        let agg = aggregate(&parsed.usage, &self.targets, &memberships);
        let report = Report::build(&raw.captured_at, &self.name, &self.targets, agg);

        Ok(TickSummary {
            report,
            unavailable_targets,
            malformed_lines: parsed.malformed,
        })
    }

    /// Run the full pipeline once, including delivery.
    pub async fn tick(&self) -> Result<TickSummary, SensorError> {
        let summary = self.measure().await?;
        let bytes = summary.report.to_json_bytes()?;
        self.transport.send(bytes).await?;
        Ok(summary)
    }

    /// Tick on `scheduler` until `cancel` fires, or until a failure `policy` escalates.
    /// Returns the number of ticks the scheduler ran.
    pub async fn run(
        &self,
        scheduler: &Scheduler,
        cancel: &CancellationToken,
        policy: FailurePolicy,
    ) -> Result<u64, SensorError> {
        scheduler
            .run(cancel, |seq| async move {
                match self.tick().await {
                    Ok(summary) => {
                        debug!(
                            seq,
                            global = summary.report.global_usage,
                            unavailable = summary.unavailable_targets.len(),
                            malformed = summary.malformed_lines,
                            "report sent"
                        );
                        Ok(())
                    }
                    Err(e) if e.is_unrecoverable() || policy == FailurePolicy::Abort => {
                        error!(seq, error = %e, "tick failed, stopping sensor");
                        Err(e)
                    }
                    Err(e) if !e.is_tick_fatal() => {
                        warn!(seq, error = %e, "tick dropped, continuing");
                        Ok(())
                    }
                    Err(e) => {
                        error!(seq, error = %e, "tick failed, continuing at next interval");
                        Ok(())
                    }
                }
            })
            .await
    }
}
