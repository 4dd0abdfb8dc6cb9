use crate::batch::{BatchConfig, RetryPolicy};
use crate::error::{PodscribeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Moonshot,
    Zhipu,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Moonshot => "moonshot",
            Provider::Zhipu => "zhipu",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Gemini => crate::llm::gemini::DEFAULT_MODEL,
            Provider::Moonshot => "moonshot-v1-32k",
            Provider::Zhipu => "glm-4-flash",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::Moonshot => "https://api.moonshot.cn/v1",
            Provider::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
        }
    }

    fn key_env(self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Moonshot => "MOONSHOT_API_KEY",
            Provider::Zhipu => "ZHIPU_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "moonshot" | "kimi" => Ok(Provider::Moonshot),
            "zhipu" | "glm" => Ok(Provider::Zhipu),
            _ => Err(format!(
                "Unknown provider: {}. Use 'gemini', 'moonshot', or 'zhipu'",
                s
            )),
        }
    }
}

/// Credentials and endpoint for one provider. Unset fields fall back to
/// the provider's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Provider,
    pub gemini: ProviderSettings,
    pub moonshot: ProviderSettings,
    pub zhipu: ProviderSettings,
    pub target_language: String,
    pub chunk_size: usize,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub confidence_warn_threshold: f32,
    pub request_timeout_secs: u64,
    pub store_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podscribe");
        Self {
            provider: Provider::default(),
            gemini: ProviderSettings::default(),
            moonshot: ProviderSettings::default(),
            zhipu: ProviderSettings::default(),
            target_language: "zh".to_string(),
            chunk_size: 50,
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            confidence_warn_threshold: 0.7,
            request_timeout_secs: 60,
            store_dir: data_dir.join("episodes"),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    PodscribeError::Config(format!("{}: {}", config_path.display(), e))
                })?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Override values from environment variables.
    pub fn apply_env(&mut self) {
        for provider in [Provider::Gemini, Provider::Moonshot, Provider::Zhipu] {
            if let Ok(key) = std::env::var(provider.key_env()) {
                self.provider_settings_mut(provider).api_key = Some(key);
            }
        }
        if let Ok(provider) = std::env::var("PODSCRIBE_PROVIDER") {
            if let Ok(p) = provider.parse() {
                self.provider = p;
            }
        }
        if let Ok(language) = std::env::var("PODSCRIBE_LANGUAGE") {
            self.target_language = language;
        }
        if let Ok(chunk_size) = std::env::var("PODSCRIBE_CHUNK_SIZE") {
            if let Ok(c) = chunk_size.parse() {
                self.chunk_size = c;
            }
        }
        if let Ok(retries) = std::env::var("PODSCRIBE_MAX_RETRIES") {
            if let Ok(r) = retries.parse() {
                self.max_retries = r;
            }
        }
        if let Ok(dir) = std::env::var("PODSCRIBE_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
    }

    pub fn provider_settings(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::Moonshot => &self.moonshot,
            Provider::Zhipu => &self.zhipu,
        }
    }

    pub fn model_for(&self, provider: Provider) -> &str {
        self.provider_settings(provider)
            .model
            .as_deref()
            .unwrap_or_else(|| provider.default_model())
    }

    pub fn base_url_for(&self, provider: Provider) -> &str {
        self.provider_settings(provider)
            .base_url
            .as_deref()
            .unwrap_or_else(|| provider.default_base_url())
    }

    fn provider_settings_mut(&mut self, provider: Provider) -> &mut ProviderSettings {
        match provider {
            Provider::Gemini => &mut self.gemini,
            Provider::Moonshot => &mut self.moonshot,
            Provider::Zhipu => &mut self.zhipu,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider_settings(self.provider).api_key.is_none() {
            return Err(PodscribeError::Config(format!(
                "{} not set. Export it or add it to the [{}] section of the config file",
                self.provider.key_env(),
                self.provider
            )));
        }

        if self.chunk_size == 0 {
            return Err(PodscribeError::Config(
                "Chunk size must be greater than 0".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(PodscribeError::Config(
                "Max retries must be greater than 0".to_string(),
            ));
        }

        if self.backoff_factor < 1.0 {
            return Err(PodscribeError::Config(
                "Backoff factor must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_factor,
        )
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            chunk_size: self.chunk_size,
            retry: self.retry_policy(),
            confidence_warn_threshold: self.confidence_warn_threshold,
            show_progress: true,
        }
    }

    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("podscribe").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("MOONSHOT".parse::<Provider>().unwrap(), Provider::Moonshot);
        assert_eq!("glm".parse::<Provider>().unwrap(), Provider::Zhipu);
        assert!("unknown".parse::<Provider>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.target_language, "zh");
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.model_for(Provider::Moonshot), "moonshot-v1-32k");
    }

    #[test]
    fn test_validate_missing_api_key() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_with_api_key() {
        let mut config = Config::default();
        config.gemini.api_key = Some("test-key".to_string());
        assert!(config.validate().is_ok());

        config.provider = Provider::Zhipu;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.gemini.api_key = Some("test-key".to_string());
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            provider = "moonshot"
            chunk_size = 20

            [moonshot]
            api_key = "sk-test"
            "#,
        )
        .unwrap();
        assert_eq!(config.provider, Provider::Moonshot);
        assert_eq!(config.chunk_size, 20);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.moonshot.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model_for(Provider::Moonshot), "moonshot-v1-32k");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
    }
}
