//! OpenAI-compatible chat completion client.
//!
//! Talks to any endpoint exposing `POST {base}/chat/completions`; the base url
//! and key come from [`Settings`].

use crate::core::assistant::{ChatMessage, Role};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{CompletionError, CompletionService};
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        WireMessage {
            role: message.role.as_str(),
            content: &message.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[injectable(CompletionService)]
impl OpenAiCompletionClient {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> OpenAiCompletionClient {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!("falling back to default http client: {e}");
                Client::new()
            });

        OpenAiCompletionClient {
            client,
            base_url: settings.openai_base_url.trim_end_matches('/').to_owned(),
            api_key: settings.openai_api_key.clone(),
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_prompt: &str,
        model: &str,
    ) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::NotConfigured)?;

        let system = ChatMessage::new(Role::System, system_prompt);
        let user = ChatMessage::new(Role::User, user_prompt);
        let messages = std::iter::once(&system)
            .chain(history.iter())
            .chain(std::iter::once(&user))
            .map(WireMessage::from)
            .collect();

        debug!("requesting completion from {model} with {} history messages", history.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&CompletionRequest { model, messages })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}
