pub mod openai;

pub use openai::OpenAIClient;

use anyhow::Result;
use async_trait::async_trait;
use relata_common::config::LLMConfig;
use std::sync::Arc;

/// Builds the generation/embedding client from configuration. Returns `None`
/// without an API key; callers degrade to their no-LLM path.
pub fn create_llm_client(config: &LLMConfig) -> Option<Arc<dyn LLMClient>> {
    let api_key = config.api_key.clone()?;
    Some(Arc::new(OpenAIClient::new(
        api_key,
        config.model.clone(),
        config.embedding_model.clone(),
        config.base_url.clone(),
    )))
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed multiple texts. Returns embeddings in the same order as
    /// input. Default implementation falls back to individual embed() calls.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::new();
        for text in texts {
            results.push(self.embed(&text).await?);
        }
        Ok(results)
    }
}
