use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[serde(alias = "todo")]
    Backlog,
    InProgress,
    Review,
    Done,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// A unit of work with an optional effort estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Effort estimate in hours
    #[serde(default, alias = "estimatedHours")]
    pub estimate: Option<f64>,
    pub project_id: String,
    /// At most one assignee; reassignment replaces it
    #[serde(default)]
    pub assignee_id: Option<String>,
}

impl Task {
    pub fn estimate_hours(&self) -> f64 {
        self.estimate.unwrap_or(0.0).max(0.0)
    }

    pub fn assign_to(&mut self, member_id: impl Into<String>) {
        self.assignee_id = Some(member_id.into());
    }
}

/// Roster entry. Utilization is always derived from capacity and
/// allocated hours; an incoming `utilization` field is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    /// Capacity for the period, in hours
    pub capacity: f64,
    /// Hours already allocated in the period
    pub allocated: f64,
}

impl TeamMember {
    /// Allocated hours as a percentage of capacity
    pub fn utilization(&self) -> f64 {
        if self.capacity > 0.0 {
            self.allocated * 100.0 / self.capacity
        } else if self.allocated > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    pub fn available_hours(&self) -> f64 {
        (self.capacity - self.allocated).max(0.0)
    }
}
