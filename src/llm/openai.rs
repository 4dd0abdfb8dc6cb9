//! OpenAI-compatible `chat/completions` adapter, used for Moonshot and Zhipu.

use crate::error::{PodscribeError, Result};
use crate::llm::{StructuredLlm, StructuredRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct OpenAiCompatClient {
    client: Client,
    name: &'static str,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(name: &'static str, base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            client: Client::new(),
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: String::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn build_request<'a>(&'a self, request: &'a StructuredRequest) -> ChatRequest<'a> {
        let mut system = request.system.clone();
        // json_object mode has no schema slot, so the schema rides in the prompt.
        if let Some(schema) = &request.response_schema {
            system.push_str("\n\nRespond with JSON matching this schema:\n");
            system.push_str(&schema.to_string());
        }
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user.clone(),
                },
            ],
            temperature: request.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize, Debug)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl StructuredLlm for OpenAiCompatClient {
    async fn call_structured(&self, request: &StructuredRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Calling {} {} ({} prompt chars)", self.name, self.model, request.user.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request(request))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(PodscribeError::ApiStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            PodscribeError::MalformedResponse(format!("unreadable {} envelope: {}", self.name, e))
        })?;

        let content = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(PodscribeError::MalformedResponse(format!(
                "{} returned no content",
                self.name
            )));
        }

        Ok(content)
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}
