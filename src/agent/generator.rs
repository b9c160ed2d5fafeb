use crate::llm::extract::{extract_query, ExtractError};
use crate::llm::{LlmError, TextGenerator};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The model answered but no query could be pulled out of the answer.
    #[error("No extractable query: {0}")]
    NoExtractableQuery(#[from] ExtractError),
    /// The backend could not be reached or returned garbage.
    #[error(transparent)]
    Backend(#[from] LlmError),
}

/// Prompt in, cleaned candidate query out.
#[derive(Clone)]
pub struct QueryGenerator {
    backend: Arc<dyn TextGenerator>,
}

impl QueryGenerator {
    pub fn new(backend: Arc<dyn TextGenerator>) -> Self {
        Self { backend }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!("Prompt for {}: {}", self.backend.name(), prompt);
        let raw = self.backend.complete(prompt).await?;
        debug!("Raw model output: {}", raw);

        extract_query(&raw).map_err(|e| {
            warn!("Model output contained no query block");
            GenerationError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGenerator;

    #[tokio::test]
    async fn returns_block_contents() {
        let backend = ScriptedGenerator::new(vec![Ok("Sure!\n```sql\nSELECT 1;\n```".to_string())]);
        let generator = QueryGenerator::new(backend.clone());
        assert_eq!(generator.generate("p").await.unwrap(), "SELECT 1;");
        assert_eq!(backend.prompts(), vec!["p"]);
    }

    #[tokio::test]
    async fn distinguishes_bad_output_from_backend_failure() {
        let backend = ScriptedGenerator::new(vec![
            Ok("I cannot answer that.".to_string()),
            Err(LlmError::ConnectionError("refused".to_string())),
        ]);
        let generator = QueryGenerator::new(backend);

        let first = generator.generate("p").await.unwrap_err();
        assert!(matches!(first, GenerationError::NoExtractableQuery(_)));
        assert!(first.to_string().starts_with("No extractable query"));

        let second = generator.generate("p").await.unwrap_err();
        assert!(matches!(second, GenerationError::Backend(_)));
    }
}
