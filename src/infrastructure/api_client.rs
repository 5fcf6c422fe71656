use crate::domain::models::{
    EndSessionRequest, FocusSession, NewTask, StartSessionRequest, Task, TaskPatch, UserSettings,
};
use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// The FocusFlow REST backend. It is the source of truth for tasks and sessions.
#[async_trait]
pub trait FocusFlowApi: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, InfraError>;
    async fn create_task(&self, task: &NewTask) -> Result<Task, InfraError>;
    async fn update_task(&self, id: i64, patch: &TaskPatch) -> Result<Task, InfraError>;
    async fn delete_task(&self, id: i64) -> Result<(), InfraError>;
    async fn start_session(&self, request: &StartSessionRequest) -> Result<FocusSession, InfraError>;
    async fn end_session(&self, id: i64, request: &EndSessionRequest) -> Result<FocusSession, InfraError>;
    async fn get_settings(&self) -> Result<UserSettings, InfraError>;
    async fn update_settings(&self, patch: &UserSettings) -> Result<UserSettings, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFocusFlowApi {
    client: Client,
    base_url: Url,
}

impl ReqwestFocusFlowApi {
    pub fn new(config: &ApiConfig) -> Result<Self, InfraError> {
        let mut base_url = Url::parse(&config.base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid api base url '{}': {error}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "api base url cannot be a base: {}",
                config.base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .map_err(|error| InfraError::InvalidConfig(format!("failed to build http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("api base url cannot be a base".to_string()))?;
            path.pop_if_empty();
            path.push("api");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn send_for_body(&self, request: RequestBuilder, action: &str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while {action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("failed reading response while {action}: {error}")))?;

        if !status.is_success() {
            return Err(InfraError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<T, InfraError> {
        let body = self.send_for_body(request, action).await?;
        serde_json::from_str(&body)
            .map_err(|error| InfraError::Payload(format!("invalid payload while {action}: {error}; body={body}")))
    }
}

#[async_trait]
impl FocusFlowApi for ReqwestFocusFlowApi {
    async fn list_tasks(&self) -> Result<Vec<Task>, InfraError> {
        let url = self.endpoint(&["tasks"])?;
        self.send_json(self.client.get(url), "listing tasks").await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, InfraError> {
        let url = self.endpoint(&["tasks"])?;
        self.send_json(self.client.post(url).json(task), "creating task")
            .await
    }

    async fn update_task(&self, id: i64, patch: &TaskPatch) -> Result<Task, InfraError> {
        let id = id.to_string();
        let url = self.endpoint(&["tasks", &id])?;
        self.send_json(self.client.patch(url).json(patch), "updating task")
            .await
    }

    async fn delete_task(&self, id: i64) -> Result<(), InfraError> {
        let id = id.to_string();
        let url = self.endpoint(&["tasks", &id])?;
        self.send_for_body(self.client.delete(url), "deleting task")
            .await?;
        Ok(())
    }

    async fn start_session(&self, request: &StartSessionRequest) -> Result<FocusSession, InfraError> {
        let url = self.endpoint(&["focus-sessions"])?;
        self.send_json(self.client.post(url).json(request), "starting focus session")
            .await
    }

    async fn end_session(&self, id: i64, request: &EndSessionRequest) -> Result<FocusSession, InfraError> {
        let id = id.to_string();
        let url = self.endpoint(&["focus-sessions", &id])?;
        self.send_json(self.client.patch(url).json(request), "ending focus session")
            .await
    }

    async fn get_settings(&self) -> Result<UserSettings, InfraError> {
        let url = self.endpoint(&["settings"])?;
        self.send_json(self.client.get(url), "loading settings").await
    }

    async fn update_settings(&self, patch: &UserSettings) -> Result<UserSettings, InfraError> {
        let url = self.endpoint(&["settings"])?;
        self.send_json(self.client.patch(url).json(patch), "updating settings")
            .await
    }
}
