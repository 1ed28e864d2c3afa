//! Provisioning stages reported by the hypervisor port.

use serde::{Deserialize, Serialize};

/// A coarse phase of the provisioning workflow. The hypervisor port
/// invokes its progress callback with these, strictly in order, never
/// skipping a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Cloning,
    Configuring,
    PoweringOn,
    WaitingForNetwork,
    Ready,
}

impl Stage {
    /// All stages, in the order the hypervisor port must report them.
    pub const ORDERED: [Stage; 5] = [
        Stage::Cloning,
        Stage::Configuring,
        Stage::PoweringOn,
        Stage::WaitingForNetwork,
        Stage::Ready,
    ];

    /// Seed per-stage cost in seconds, used to estimate remaining time
    /// Config may override this table.
    pub fn seed_cost_seconds(self) -> u64 {
        match self {
            Stage::Cloning => 80,
            Stage::Configuring => 65,
            Stage::PoweringOn => 45,
            Stage::WaitingForNetwork => 25,
            Stage::Ready => 0,
        }
    }

    fn index(self) -> usize {
        Self::ORDERED.iter().position(|s| *s == self).expect("Stage::ORDERED is exhaustive")
    }

    /// Sum of the seed costs of every stage strictly after this one —
    /// the estimated remaining seconds for this stage onward.
    pub fn estimated_remaining_seconds(self) -> u64 {
        Self::ORDERED[self.index() + 1..]
            .iter()
            .map(|s| s.seed_cost_seconds())
            .sum()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Cloning => "CLONING",
            Stage::Configuring => "CONFIGURING",
            Stage::PoweringOn => "POWERING_ON",
            Stage::WaitingForNetwork => "WAITING_FOR_NETWORK",
            Stage::Ready => "READY",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_has_no_remaining_time() {
        assert_eq!(Stage::Ready.estimated_remaining_seconds(), 0);
    }

    #[test]
    fn cloning_remaining_time_sums_every_later_stage() {
        assert_eq!(
            Stage::Cloning.estimated_remaining_seconds(),
            65 + 45 + 25 + 0
        );
    }

    #[test]
    fn remaining_time_strictly_decreases_along_the_ordered_stages() {
        let mut last = u64::MAX;
        for stage in Stage::ORDERED {
            let remaining = stage.estimated_remaining_seconds();
            assert!(remaining <= last);
            last = remaining;
        }
    }
}
