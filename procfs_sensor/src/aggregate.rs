//! Per-target and global CPU sums for one tick.

use crate::membership::Membership;
use crate::parser::ProcessUsage;

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// One entry per configured target, in configured order.
    pub per_target: Vec<(String, f64)>,
    pub global: f64,
}

/// `memberships[i]` belongs to `targets[i]`; a missing entry counts as unavailable.
///
/// Every sum walks `usage` in row order so identical samples give identical floats.
pub fn aggregate(
    usage: &ProcessUsage,
    targets: &[String],
    memberships: &[Membership],
) -> Aggregate {
    let per_target = targets
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let sum = match memberships.get(i) {
                // idle members are not sampled and contribute nothing
                Some(Membership::Members(pids)) => usage
                    .iter()
                    .filter(|(pid, _)| pids.contains(pid))
                    .map(|(_, cpu)| cpu)
                    .sum(),
                Some(Membership::Unavailable) | None => 0.0,
            };
            (name.clone(), sum)
        })
        .collect();

    Aggregate {
        per_target,
        global: usage.iter().map(|(_, cpu)| cpu).sum(),
    }
}
