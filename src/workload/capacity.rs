use serde::{Deserialize, Serialize};

use crate::model::{Task, TeamMember};

/// Absorbs float noise so that exactly 100% or 120% stays in the lower tier
const EPSILON: f64 = 1e-9;

/// Thresholds in percent of capacity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPolicy {
    /// Above this the assignment is flagged as overallocation
    pub warn_above: f64,
    /// Above this the member is shown as an unsuitable drop target
    pub discourage_above: f64,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            warn_above: 100.0,
            discourage_above: 120.0,
        }
    }
}

impl CapacityPolicy {
    pub fn classify(&self, projected: f64) -> CapacityVerdict {
        if projected <= self.warn_above + EPSILON {
            CapacityVerdict::Accept
        } else if projected <= self.discourage_above + EPSILON {
            CapacityVerdict::Warn
        } else {
            CapacityVerdict::Discourage
        }
    }
}

/// Advisory only. None of these block the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityVerdict {
    Accept,
    Warn,
    Discourage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapacityAssessment {
    pub current: f64,
    pub projected: f64,
    pub verdict: CapacityVerdict,
}

impl CapacityAssessment {
    /// Whether the member should be highlighted as a valid drop target
    pub fn is_drop_target(&self) -> bool {
        self.verdict != CapacityVerdict::Discourage
    }

    /// Whether to show an overallocation notice
    pub fn needs_notice(&self) -> bool {
        self.verdict != CapacityVerdict::Accept
    }
}

/// `current + estimate / capacity * 100`. A member without capacity is
/// infinitely loaded by any positive estimate.
pub fn projected_utilization(current: f64, capacity: f64, estimate_hours: f64) -> f64 {
    let estimate = estimate_hours.max(0.0);
    if estimate == 0.0 {
        current
    } else if capacity > 0.0 {
        current + estimate * 100.0 / capacity
    } else {
        f64::INFINITY
    }
}

/// Evaluate assigning `task` to `member` against the member's current load
pub fn assess(member: &TeamMember, task: &Task, policy: &CapacityPolicy) -> CapacityAssessment {
    let current = member.utilization();
    let projected = projected_utilization(current, member.capacity, task.estimate_hours());
    CapacityAssessment {
        current,
        projected,
        verdict: policy.classify(projected),
    }
}
