use parking_lot::Mutex;

use super::capacity::{assess, CapacityAssessment, CapacityPolicy};
use crate::api::WorkloadBackend;
use crate::error::PortalError;
use crate::model::{Task, TeamMember};

/// Outcome of a persisted assignment
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentResult {
    pub task_id: String,
    pub assignee_id: String,
    /// Guard verdict against the roster as it was before the write. `None`
    /// when the task or member was not in the local snapshot.
    pub assessment: Option<CapacityAssessment>,
    /// False if the write went through but the roster refetch failed
    pub roster_refreshed: bool,
}

/// Roster and task snapshot for drag-and-drop assignment.
///
/// Utilization is never cached: every evaluation reads the latest roster,
/// and every assignment refetches it.
pub struct AssignmentBoard<B> {
    backend: B,
    policy: CapacityPolicy,
    roster: Mutex<Vec<TeamMember>>,
    tasks: Mutex<Vec<Task>>,
}

impl<B: WorkloadBackend> AssignmentBoard<B> {
    pub fn new(backend: B, policy: CapacityPolicy) -> Self {
        Self {
            backend,
            policy,
            roster: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> &CapacityPolicy {
        &self.policy
    }

    pub async fn refresh_roster(&self) -> Result<usize, PortalError> {
        let roster = self.backend.fetch_roster().await?;
        let count = roster.len();
        *self.roster.lock() = roster;
        tracing::debug!(members = count, "roster refreshed");
        Ok(count)
    }

    pub async fn load_tasks(&self, project_id: Option<&str>) -> Result<usize, PortalError> {
        let tasks = self.backend.fetch_tasks(project_id).await?;
        let count = tasks.len();
        *self.tasks.lock() = tasks;
        Ok(count)
    }

    pub fn roster(&self) -> Vec<TeamMember> {
        self.roster.lock().clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().iter().find(|t| t.id == task_id).cloned()
    }

    /// Run the guard for a (task, member) pair from the current snapshot
    pub fn evaluate(&self, task_id: &str, member_id: &str) -> Option<CapacityAssessment> {
        let task = self.task(task_id)?;
        let roster = self.roster.lock();
        let member = roster.iter().find(|m| m.id == member_id)?;
        Some(assess(member, &task, &self.policy))
    }

    /// Guard results for every member, for highlighting drop targets
    pub fn evaluate_all(&self, task_id: &str) -> Vec<(TeamMember, CapacityAssessment)> {
        let Some(task) = self.task(task_id) else {
            return Vec::new();
        };
        self.roster
            .lock()
            .iter()
            .map(|m| (m.clone(), assess(m, &task, &self.policy)))
            .collect()
    }

    /// Persist the assignment, then refetch the roster.
    ///
    /// The guard is advisory, so a discouraged assignment is still written.
    /// A failed write is returned as-is and leaves local state untouched.
    pub async fn assign(&self, task_id: &str, member_id: &str) -> Result<AssignmentResult, PortalError> {
        let assessment = self.evaluate(task_id, member_id);
        if let Some(a) = &assessment {
            if a.needs_notice() {
                tracing::warn!(task_id, member_id, projected = a.projected, verdict = ?a.verdict, "assignment overallocates member");
            }
        }

        self.backend.assign_task(task_id, member_id).await?;

        if let Some(task) = self.tasks.lock().iter_mut().find(|t| t.id == task_id) {
            task.assign_to(member_id);
        }

        let roster_refreshed = match self.refresh_roster().await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(%err, "roster refresh after assignment failed");
                false
            }
        };

        tracing::info!(task_id, member_id, "task assigned");
        Ok(AssignmentResult {
            task_id: task_id.to_string(),
            assignee_id: member_id.to_string(),
            assessment,
            roster_refreshed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TaskPriority, TaskStatus};
    use crate::workload::CapacityVerdict;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Backend that books the task's estimate onto the assignee
    struct FakeWorkload {
        roster: Mutex<Vec<TeamMember>>,
        tasks: Vec<Task>,
        roster_calls: AtomicUsize,
        assigned: Mutex<Vec<(String, String)>>,
        fail_assign: AtomicBool,
    }

    impl FakeWorkload {
        fn new() -> Self {
            Self {
                roster: Mutex::new(vec![
                    TeamMember {
                        id: "rosa".into(),
                        name: "Rosa".into(),
                        capacity: 40.0,
                        allocated: 36.0,
                    },
                    TeamMember {
                        id: "ken".into(),
                        name: "Ken".into(),
                        capacity: 40.0,
                        allocated: 10.0,
                    },
                ]),
                tasks: vec![Task {
                    id: "t1".into(),
                    title: "Pricing page".into(),
                    status: TaskStatus::InProgress,
                    priority: TaskPriority::High,
                    estimate: Some(16.0),
                    project_id: "p1".into(),
                    assignee_id: Some("ken".into()),
                }],
                roster_calls: AtomicUsize::new(0),
                assigned: Mutex::new(Vec::new()),
                fail_assign: AtomicBool::new(false),
            }
        }
    }

    impl WorkloadBackend for FakeWorkload {
        async fn fetch_roster(&self) -> Result<Vec<TeamMember>, PortalError> {
            self.roster_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.roster.lock().clone())
        }

        async fn fetch_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>, PortalError> {
            Ok(self
                .tasks
                .iter()
                .filter(|t| project_id.map_or(true, |p| t.project_id == p))
                .cloned()
                .collect())
        }

        async fn assign_task(&self, task_id: &str, assignee_id: &str) -> Result<(), PortalError> {
            if self.fail_assign.load(Ordering::SeqCst) {
                return Err(PortalError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            let hours = self
                .tasks
                .iter()
                .find(|t| t.id == task_id)
                .map(Task::estimate_hours)
                .unwrap_or(0.0);
            if let Some(member) = self.roster.lock().iter_mut().find(|m| m.id == assignee_id) {
                member.allocated += hours;
            }
            self.assigned.lock().push((task_id.into(), assignee_id.into()));
            Ok(())
        }
    }

    async fn loaded_board() -> AssignmentBoard<FakeWorkload> {
        let board = AssignmentBoard::new(FakeWorkload::new(), CapacityPolicy::default());
        board.refresh_roster().await.unwrap();
        board.load_tasks(Some("p1")).await.unwrap();
        board
    }

    #[tokio::test]
    async fn test_discouraged_assignment_is_still_written() {
        let board = loaded_board().await;

        let before = board.evaluate("t1", "rosa").unwrap();
        assert_eq!(before.verdict, CapacityVerdict::Discourage);

        let result = board.assign("t1", "rosa").await.unwrap();
        assert_eq!(result.assessment, Some(before));
        assert!(result.roster_refreshed);
        assert_eq!(board.backend.assigned.lock().len(), 1);

        // one assignee, replaced not added
        assert_eq!(board.task("t1").unwrap().assignee_id.as_deref(), Some("rosa"));

        // refreshed roster reflects the booking
        let rosa = board.roster().into_iter().find(|m| m.id == "rosa").unwrap();
        assert_eq!(rosa.allocated, 52.0);
        assert_eq!(board.backend.roster_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_evaluation_tracks_latest_roster() {
        let board = loaded_board().await;
        assert_eq!(board.evaluate("t1", "ken").unwrap().verdict, CapacityVerdict::Accept);

        board.backend.roster.lock()[1].allocated = 30.0;
        assert_eq!(board.evaluate("t1", "ken").unwrap().verdict, CapacityVerdict::Accept);

        board.refresh_roster().await.unwrap();
        // 75 + 40 = 115
        assert_eq!(board.evaluate("t1", "ken").unwrap().verdict, CapacityVerdict::Warn);
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_once() {
        let board = loaded_board().await;
        board.backend.fail_assign.store(true, Ordering::SeqCst);

        let err = board.assign("t1", "rosa").await.unwrap_err();
        assert!(matches!(err, PortalError::Status { status: 500, .. }));
        assert_eq!(board.task("t1").unwrap().assignee_id.as_deref(), Some("ken"));
        assert_eq!(board.backend.roster_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evaluate_all_marks_drop_targets() {
        let board = loaded_board().await;
        let targets: Vec<(String, bool)> = board
            .evaluate_all("t1")
            .into_iter()
            .map(|(m, a)| (m.id, a.is_drop_target()))
            .collect();
        assert_eq!(targets, [("rosa".to_string(), false), ("ken".to_string(), true)]);
        assert!(board.evaluate_all("missing").is_empty());
        assert!(board.evaluate("t1", "missing").is_none());
    }
}
