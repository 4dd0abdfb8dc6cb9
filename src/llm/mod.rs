pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiCompatClient;

use crate::config::{Config, Provider};
use crate::error::{PodscribeError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// One structured-output request: prompts plus the JSON shape expected back.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub response_schema: Option<Value>,
}

impl StructuredRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            response_schema: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// A language model that answers with raw JSON text.
///
/// Adapters only move bytes: parsing and validation happen in the caller.
#[async_trait]
pub trait StructuredLlm: Send + Sync {
    async fn call_structured(&self, request: &StructuredRequest) -> Result<String>;
    fn name(&self) -> &'static str;
    fn model(&self) -> &str;
}

/// Build the client for the configured provider.
pub fn create_client(config: &Config) -> Result<Box<dyn StructuredLlm>> {
    let provider = config.provider;
    let api_key = config
        .provider_settings(provider)
        .api_key
        .clone()
        .ok_or_else(|| PodscribeError::Config(format!("No API key configured for {}", provider)))?;
    let model = config.model_for(provider);
    let base_url = config.base_url_for(provider);
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let client: Box<dyn StructuredLlm> = match provider {
        Provider::Gemini => Box::new(
            GeminiClient::new(api_key)
                .with_model(model)
                .with_base_url(base_url)
                .with_timeout(timeout)?,
        ),
        Provider::Moonshot | Provider::Zhipu => Box::new(
            OpenAiCompatClient::new(provider.name(), base_url, api_key)
                .with_model(model)
                .with_timeout(timeout)?,
        ),
    };
    Ok(client)
}
