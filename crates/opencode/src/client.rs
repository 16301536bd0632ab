use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tracing::{debug, error, info};

use crate::error::{OpenCodeError, Result};
use crate::events::EventSubscription;
use crate::traits::AgentSessions;
use crate::types::{CreateSessionRequest, ModelRef, PromptRequest, Session};

pub struct OpenCodeClient {
    base_url: String,
    client: Client,
    model: Option<ModelRef>,
}

impl OpenCodeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            model: None,
        }
    }

    pub fn with_model(mut self, provider_id: &str, model_id: &str) -> Self {
        self.model = Some(ModelRef {
            provider_id: provider_id.to_string(),
            model_id: model_id.to_string(),
        });
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> Option<&ModelRef> {
        self.model.as_ref()
    }

    fn directory_query(directory: &Path) -> [(&'static str, String); 1] {
        [("directory", directory.to_string_lossy().into_owned())]
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(OpenCodeError::SessionNotFound(
                response.url().path().to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenCodeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl AgentSessions for OpenCodeClient {
    async fn create_session(&self, directory: &Path, title: &str) -> Result<Session> {
        let request = CreateSessionRequest {
            title: Some(title.to_string()),
            parent_id: None,
        };

        info!(directory = %directory.display(), title = %title, "Creating OpenCode session");

        let response = self
            .client
            .post(format!("{}/session", self.base_url))
            .query(&Self::directory_query(directory))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to create OpenCode session");
                OpenCodeError::Request(e)
            })?;

        let session = Self::expect_success(response).await?.json().await?;
        Ok(session)
    }

    async fn subscribe(&self, directory: &Path) -> Result<EventSubscription> {
        let url = format!("{}/event", self.base_url);
        info!(url = %url, directory = %directory.display(), "Subscribing to OpenCode SSE events");

        let response = self
            .client
            .get(&url)
            .query(&Self::directory_query(directory))
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            error!(status = %response.status(), "Failed to connect to OpenCode SSE");
            return Err(OpenCodeError::Connection(format!(
                "Failed to connect to event stream: {}",
                response.status()
            )));
        }

        Ok(EventSubscription::from_response(response))
    }

    async fn send_input(&self, session_id: &str, directory: &Path, text: &str) -> Result<()> {
        let request = PromptRequest::new(text).with_model(self.model.clone());

        debug!(
            session_id = %session_id,
            prompt_length = text.len(),
            "Sending prompt to OpenCode"
        );

        let response = self
            .client
            .post(format!(
                "{}/session/{}/prompt_async",
                self.base_url, session_id
            ))
            .query(&Self::directory_query(directory))
            .json(&request)
            .send()
            .await?;

        Self::expect_success(response).await?;
        Ok(())
    }

    async fn abort(&self, session_id: &str, directory: &Path) -> Result<()> {
        info!(session_id = %session_id, "Aborting OpenCode session");

        let response = self
            .client
            .post(format!("{}/session/{}/abort", self.base_url, session_id))
            .query(&Self::directory_query(directory))
            .send()
            .await?;

        Self::expect_success(response).await?;
        Ok(())
    }
}
