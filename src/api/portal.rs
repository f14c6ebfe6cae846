//! REST client for the portal backend
//!
//! Each call is a single attempt. Failures come back as [`PortalError`];
//! nothing here retries.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::{ApiEnvelope, HistoryQuery, MessageBackend, WorkloadBackend};
use crate::config::ApiConfig;
use crate::error::PortalError;
use crate::model::{Message, Metadata, Task, TeamMember};

#[derive(Serialize)]
struct SendMessageBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignBody<'a> {
    assignee_id: &'a str,
}

#[derive(Clone)]
pub struct PortalClient {
    base: Url,
    token: Option<String>,
    client: Client,
}

impl PortalClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, PortalError> {
        let base = Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, token, client })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, PortalError> {
        Self::new(
            &config.base_url,
            config.token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PortalError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PortalError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<Option<T>, PortalError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortalError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: ApiEnvelope<T> = response.json().await?;
        envelope.into_data()
    }
}

impl MessageBackend for PortalClient {
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<Option<Message>, PortalError> {
        let url = self.endpoint(&["conversations", conversation_id, "messages"])?;
        tracing::debug!(%url, "sending message");
        let response = self
            .authorize(self.client.post(url))
            .json(&SendMessageBody { content, metadata })
            .send()
            .await?;
        Self::read(response).await
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<Message>, PortalError> {
        let url = self.endpoint(&["conversations", conversation_id, "messages"])?;
        tracing::debug!(%url, limit = query.limit, before = ?query.before, "fetching history");
        let response = self
            .authorize(self.client.get(url))
            .query(query)
            .send()
            .await?;
        Ok(Self::read(response).await?.unwrap_or_default())
    }
}

impl WorkloadBackend for PortalClient {
    async fn fetch_roster(&self) -> Result<Vec<TeamMember>, PortalError> {
        let url = self.endpoint(&["workload"])?;
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::read(response).await?.ok_or(PortalError::MissingData)
    }

    async fn fetch_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>, PortalError> {
        let mut url = self.endpoint(&["tasks"])?;
        if let Some(project_id) = project_id {
            url.query_pairs_mut().append_pair("projectId", project_id);
        }
        let response = self.authorize(self.client.get(url)).send().await?;
        Ok(Self::read(response).await?.unwrap_or_default())
    }

    async fn assign_task(&self, task_id: &str, assignee_id: &str) -> Result<(), PortalError> {
        let url = self.endpoint(&["tasks", task_id, "assign"])?;
        tracing::debug!(%url, assignee_id, "assigning task");
        let response = self
            .authorize(self.client.post(url))
            .json(&AssignBody { assignee_id })
            .send()
            .await?;
        Self::read::<serde_json::Value>(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = PortalClient::new("http://localhost:8080/api/", None, Duration::from_secs(5)).unwrap();
        let url = client.endpoint(&["conversations", "c 1/x", "messages"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/conversations/c%201%2Fx/messages");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(matches!(
            PortalClient::new("::nope", None, Duration::from_secs(5)),
            Err(PortalError::Url(_))
        ));
    }
}
