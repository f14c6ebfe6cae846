pub mod portal;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PortalError;
use crate::model::{Message, Metadata, Task, TeamMember};

pub use portal::PortalClient;

/// Query for one page of message history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub limit: usize,
    /// Only messages older than this message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

/// Standard `{ success, data, error }` response body
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// `data` of a successful response, or the reason it failed
    pub fn into_data(self) -> Result<Option<T>, PortalError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(PortalError::Rejected(
                self.error.unwrap_or_else(|| "request unsuccessful".to_string()),
            ))
        }
    }
}

/// Message endpoints of the portal backend
pub trait MessageBackend: Send + Sync {
    /// Send a message. The created message arrives later through the
    /// conversation subscription; `data` is returned only if the backend echoes it.
    fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> impl Future<Output = Result<Option<Message>, PortalError>> + Send;

    /// One page of history, oldest to newest
    fn fetch_messages(
        &self,
        conversation_id: &str,
        query: &HistoryQuery,
    ) -> impl Future<Output = Result<Vec<Message>, PortalError>> + Send;
}

/// Task and roster endpoints of the portal backend
pub trait WorkloadBackend: Send + Sync {
    fn fetch_roster(&self) -> impl Future<Output = Result<Vec<TeamMember>, PortalError>> + Send;

    fn fetch_tasks(
        &self,
        project_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Task>, PortalError>> + Send;

    fn assign_task(
        &self,
        task_id: &str,
        assignee_id: &str,
    ) -> impl Future<Output = Result<(), PortalError>> + Send;
}

impl<T: MessageBackend> MessageBackend for Arc<T> {
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<Option<Message>, PortalError> {
        (**self).send_message(conversation_id, content, metadata).await
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<Message>, PortalError> {
        (**self).fetch_messages(conversation_id, query).await
    }
}

impl<T: WorkloadBackend> WorkloadBackend for Arc<T> {
    async fn fetch_roster(&self) -> Result<Vec<TeamMember>, PortalError> {
        (**self).fetch_roster().await
    }

    async fn fetch_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>, PortalError> {
        (**self).fetch_tasks(project_id).await
    }

    async fn assign_task(&self, task_id: &str, assignee_id: &str) -> Result<(), PortalError> {
        (**self).assign_task(task_id, assignee_id).await
    }
}
