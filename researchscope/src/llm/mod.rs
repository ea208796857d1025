use anyhow::Result;
use common::{LlmConfig, LlmTask};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::models::Sentiment;

/// Core trait for the generation service (summaries, analysis, embeddings)
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate completion for a given prompt
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Summarize one bounded chunk of text in roughly `min_length..=max_length` words
    async fn summarize(&self, content: &str, max_length: usize, min_length: usize) -> Result<String>;

    /// Generate vector embedding for text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Named entities mentioned in the text
    async fn extract_entities(&self, text: &str) -> Result<Vec<EntityMention>>;

    /// Overall sentiment of the text
    async fn analyze_sentiment(&self, text: &str) -> Result<Sentiment>;

    /// Noun phrases in order of appearance, repeated on each occurrence
    async fn noun_phrases(&self, text: &str) -> Result<Vec<String>>;
}

/// Request structure for LLM generation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Token usage metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Entity as reported by the provider, before it is located in the text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    pub label: String,
}

pub mod remote;
pub mod retry;
pub mod summarizer;

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Providers for the three kinds of model work a run needs.
#[derive(Clone)]
pub struct ModelSet {
    pub summarizer: Arc<dyn LlmProvider>,
    pub analyzer: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn LlmProvider>,
}

impl ModelSet {
    /// One provider for everything
    pub fn uniform(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            summarizer: provider.clone(),
            analyzer: provider.clone(),
            embedder: provider,
        }
    }

    /// Build remote providers per task, falling back to `[llm.remote]`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let build = |task: LlmTask| -> Result<Arc<dyn LlmProvider>> {
            let mut section = config.for_task(task).cloned().unwrap_or_default();
            if task == LlmTask::Embedding && config.embedding.is_none() {
                section.model = Some(DEFAULT_EMBEDDING_MODEL.to_string());
            }
            let provider = remote::RemoteLlmProvider::from_config(&section, &config.retry)?;
            info!("LLM provider for {:?}: model {}", task, provider.model());
            Ok(Arc::new(provider))
        };

        Ok(Self {
            summarizer: build(LlmTask::Summarization)?,
            analyzer: build(LlmTask::Analysis)?,
            embedder: build(LlmTask::Embedding)?,
        })
    }
}

/// Helper to extract JSON from text that might contain markdown backticks or preamble
pub fn extract_json_from_text(text: &str) -> Option<String> {
    // 1. Try to find content between ```json and ```
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 2. Try to find content between ``` and ```
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 3. Try to find the first '{' and last '}'
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return Some(text[start..=end].to_string());
        }
    }

    None
}
