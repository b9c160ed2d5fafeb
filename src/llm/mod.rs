pub mod extract;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failures of the generative backend itself, as opposed to bad model output.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

/// A generative text backend. Implementations return the raw model text,
/// even when it is empty or unusable; judging the output is the caller's job.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    fn name(&self) -> &str;
}

#[derive(Clone)]
pub struct LlmManager {
    generator: Arc<dyn TextGenerator>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Arc<dyn TextGenerator> = match config.backend.as_str() {
            "remote" => Arc::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Arc::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { generator })
    }

    #[cfg(test)]
    pub fn from_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.generator)
    }

    pub fn backend_name(&self) -> &str {
        self.generator.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn rejects_unknown_backend() {
        let mut config = AppConfig::default().llm;
        config.backend = "local".to_string();
        let err = LlmManager::new(&config).err().unwrap();
        assert!(matches!(err, LlmError::ConfigError(_)));
    }

    #[test]
    fn remote_backend_requires_api_key() {
        let config = AppConfig::default().llm;
        assert!(config.api_key.is_none());
        let err = LlmManager::new(&config).err().unwrap();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn ollama_backend_needs_no_key() {
        let mut config = AppConfig::default().llm;
        config.backend = "ollama".to_string();
        config.api_url = None;
        let manager = LlmManager::new(&config).unwrap();
        assert_eq!(manager.backend_name(), "ollama");
    }
}
