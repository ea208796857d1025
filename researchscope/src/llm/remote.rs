use anyhow::{Context, Result};
use common::{RemoteLlmConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::{retry_on_quota, QuotaExhausted, RetryPolicy};
use super::{EntityMention, LlmProvider, LlmRequest, LlmResponse, UsageMetadata};
use crate::error::ResearchError;
use crate::models::Sentiment;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Analysis prompts see at most this many characters of the input.
const MAX_ANALYSIS_CHARS: usize = 12_000;

/// Remote LLM provider using OpenAI-compatible HTTP API
pub struct RemoteLlmProvider {
    base_url: String,
    api_key: String,
    model: String,
    default_timeout: Duration,
    default_max_tokens: usize,
    default_temperature: f32,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl RemoteLlmProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_timeout: Duration::from_secs(30),
            default_max_tokens: 500,
            default_temperature: 0.7,
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_defaults(
        mut self,
        timeout_secs: u64,
        max_tokens: usize,
        temperature: f32,
    ) -> Self {
        self.default_timeout = Duration::from_secs(timeout_secs);
        self.default_max_tokens = max_tokens;
        self.default_temperature = temperature;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build from a config section, reading the API key from the environment.
    ///
    /// A missing key is a [`ResearchError::Configuration`].
    pub fn from_config(config: &RemoteLlmConfig, retry: &RetryConfig) -> Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = common::api_key_from_env(key_env).ok_or_else(|| {
            ResearchError::Configuration(format!("environment variable {} is not set", key_env))
        })?;

        let provider = Self::new(
            config.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
            api_key,
            config.model.as_deref().unwrap_or(DEFAULT_MODEL),
        )
        .with_defaults(
            config.timeout_seconds.unwrap_or(30),
            config.max_tokens.unwrap_or(500),
            config.temperature.unwrap_or(0.7),
        )
        .with_retry(RetryPolicy::from_config(retry));
        Ok(provider)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn embedding_url(&self) -> String {
        // Infer embedding URL from base_url (chat endpoint)
        // e.g. http://localhost:11434/v1/chat/completions -> http://localhost:11434/v1/embeddings
        if self.base_url.ends_with("/embeddings") {
            self.base_url.clone()
        } else if self.base_url.ends_with("/chat/completions") {
            self.base_url.replace("/chat/completions", "/embeddings")
        } else if self.base_url.ends_with("/completions") {
            self.base_url.replace("/completions", "/embeddings")
        } else {
            format!("{}/embeddings", self.base_url.trim_end_matches('/'))
        }
    }

    /// One chat-completion round trip, without retry.
    async fn chat_once(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let timeout = request
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let req_body = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            max_tokens: Some(request.max_tokens.unwrap_or(self.default_max_tokens)),
            temperature: Some(request.temperature.unwrap_or(self.default_temperature)),
        };

        // Make HTTP request with timeout
        let response = tokio::time::timeout(
            timeout,
            self.client
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&req_body)
                .send(),
        )
        .await
        .context("LLM request timed out")?
        .context("LLM HTTP request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(QuotaExhausted(format!("LLM API error {}: {}", status, body)).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, body);
        }

        let resp_body: OpenAiResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        let choice = resp_body
            .choices
            .first()
            .context("LLM response has no choices")?;

        // Some gateways answer 200 with the quota notice as the completion text
        let content = &choice.message.content;
        if content.contains("quota_metric") && content.contains("rate-limits") {
            return Err(QuotaExhausted(content.clone()).into());
        }

        let usage = resp_body
            .usage
            .map(|u| UsageMetadata {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: content.clone(),
            usage,
            model: resp_body.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let embedding_url = self.embedding_url();
        let req_body = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_string(),
        };

        let response = tokio::time::timeout(
            self.default_timeout,
            self.client
                .post(&embedding_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&req_body)
                .send(),
        )
        .await
        .context("Embedding request timed out")?
        .context("Embedding HTTP request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(QuotaExhausted(format!("Embedding API error {}: {}", status, body)).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error {}: {} (URL: {})", status, body, embedding_url);
        }

        let body_text = response.text().await.context("Failed to read embedding response body")?;

        // Try parsing as standard OpenAI response
        match serde_json::from_str::<EmbeddingResponse>(&body_text) {
            Ok(resp_body) => {
                if let Some(first) = resp_body.data.into_iter().next() {
                    return Ok(first.embedding);
                }
            }
            Err(e) => {
                // Fallback: try parsing as a raw list of floats (some old/direct providers do this)
                if let Ok(raw_vec) = serde_json::from_str::<Vec<f32>>(&body_text) {
                    return Ok(raw_vec);
                }
                // Fallback: try parsing as a single embedding object
                #[derive(Deserialize)]
                struct SingleEmbed {
                    embedding: Vec<f32>,
                }
                if let Ok(single) = serde_json::from_str::<SingleEmbed>(&body_text) {
                    return Ok(single.embedding);
                }

                anyhow::bail!("Failed to parse Embedding response: {} (Body: {})", e, body_text);
            }
        }

        anyhow::bail!("Embedding response has no data: {}", body_text);
    }

    /// Low-temperature generation whose answer must be a JSON object.
    async fn generate_json<T: serde::de::DeserializeOwned>(
        &self,
        task: &'static str,
        prompt: String,
        max_tokens: usize,
    ) -> Result<T> {
        let response = self
            .generate(LlmRequest {
                prompt,
                max_tokens: Some(max_tokens),
                temperature: Some(0.0),
                timeout_seconds: None,
            })
            .await?;

        let cleaned_json = super::extract_json_from_text(&response.content).ok_or_else(|| {
            ResearchError::Model {
                task,
                reason: "no JSON object in response".to_string(),
            }
        })?;

        serde_json::from_str(&cleaned_json).map_err(|e| {
            ResearchError::Model {
                task,
                reason: format!("invalid JSON ({}): {}", e, cleaned_json),
            }
            .into()
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for RemoteLlmProvider {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        retry_on_quota(&self.retry, "LLM generation", || self.chat_once(&request)).await
    }

    async fn summarize(&self, content: &str, max_length: usize, min_length: usize) -> Result<String> {
        let prompt = format!(
            r#"Summarize the following text in plain prose between {min} and {max} words.
Capture the key points of the ENTIRE text, not just its opening lines.
Do not add information that is not in the text. Reply with the summary only.

TEXT:
{content}
"#,
            min = min_length,
            max = max_length,
            content = content
        );

        let response = self
            .generate(LlmRequest {
                prompt,
                // Roughly two tokens per word leaves headroom for the upper bound
                max_tokens: Some(max_length.saturating_mul(2).max(64)),
                temperature: Some(0.3),
                timeout_seconds: None,
            })
            .await?;

        let summary = response.content.trim().to_string();
        if summary.is_empty() {
            return Err(ResearchError::Model {
                task: "summarization",
                reason: "empty completion".to_string(),
            }
            .into());
        }
        Ok(summary)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        retry_on_quota(&self.retry, "embedding", || self.embed_once(text)).await
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<EntityMention>> {
        let prompt = format!(
            r#"List the named entities in the text below.
Use these labels: PERSON, ORG, GPE, LOC, NORP, DATE, EVENT, PRODUCT, WORK_OF_ART, LAW, MISC.
Copy each entity exactly as written in the text.

OUTPUT FORMAT (strict JSON):
{{"entities": [{{"text": "...", "label": "..."}}]}}

TEXT:
{}
"#,
            truncate_chars(text, MAX_ANALYSIS_CHARS)
        );

        let parsed: EntitiesJson = self.generate_json("entity extraction", prompt, 800).await?;
        Ok(parsed
            .entities
            .into_iter()
            .filter(|e| !e.text.trim().is_empty())
            .map(|e| EntityMention {
                text: e.text.trim().to_string(),
                label: e.label.trim().to_uppercase(),
            })
            .collect())
    }

    async fn analyze_sentiment(&self, text: &str) -> Result<Sentiment> {
        let prompt = format!(
            r#"Classify the overall sentiment of the text below as POSITIVE, NEGATIVE or NEUTRAL
and give your confidence between 0 and 1.

OUTPUT FORMAT (strict JSON):
{{"label": "POSITIVE", "score": 0.9}}

TEXT:
{}
"#,
            truncate_chars(text, MAX_ANALYSIS_CHARS)
        );

        let parsed: SentimentJson = self.generate_json("sentiment analysis", prompt, 50).await?;
        Ok(Sentiment::new(parsed.label.trim(), parsed.score))
    }

    async fn noun_phrases(&self, text: &str) -> Result<Vec<String>> {
        let prompt = format!(
            r#"List the noun phrases of the text below in order of appearance.
Repeat a phrase each time it occurs. Copy phrases exactly as written.

OUTPUT FORMAT (strict JSON):
{{"phrases": ["...", "..."]}}

TEXT:
{}
"#,
            truncate_chars(text, MAX_ANALYSIS_CHARS)
        );

        let parsed: PhrasesJson = self.generate_json("key phrase extraction", prompt, 800).await?;
        Ok(parsed
            .phrases
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect())
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EntitiesJson {
    #[serde(default)]
    entities: Vec<EntityJson>,
}

#[derive(Debug, Deserialize)]
struct EntityJson {
    text: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct SentimentJson {
    label: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct PhrasesJson {
    #[serde(default)]
    phrases: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
