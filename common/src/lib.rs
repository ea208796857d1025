/*!
common/src/lib.rs

Shared configuration types and helpers for Researchscope.

This file provides:
- Config data structures (deserialized from TOML), every section optional
- An async loader for a TOML config file, with default/override merging
- Small helpers shared by the pipeline and its binaries
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Remote LLM endpoint (OpenAI-compatible HTTP API)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// Backoff applied when the generation service reports quota exhaustion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_millis: u64,
    pub max_delay_millis: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_millis: 4_000,
            max_delay_millis: 10_000,
        }
    }
}

/// Which pipeline task an LLM endpoint is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmTask {
    /// Chunk and rollup summaries
    Summarization,
    /// Entities, sentiment and noun phrases
    Analysis,
    /// Semantic index embeddings
    Embedding,
}

/// LLM top-level config: a fallback `remote` plus task-specific overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub remote: Option<RemoteLlmConfig>,
    pub summarization: Option<RemoteLlmConfig>,
    pub analysis: Option<RemoteLlmConfig>,
    pub embedding: Option<RemoteLlmConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl LlmConfig {
    /// Task-specific section if present, otherwise the `remote` fallback.
    pub fn for_task(&self, task: LlmTask) -> Option<&RemoteLlmConfig> {
        let specific = match task {
            LlmTask::Summarization => self.summarization.as_ref(),
            LlmTask::Analysis => self.analysis.as_ref(),
            LlmTask::Embedding => self.embedding.as_ref(),
        };
        specific.or(self.remote.as_ref())
    }
}

/// Search collaborator selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// "serper" or "duckduckgo"
    pub provider: String,
    pub api_url: Option<String>,
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "serper".to_string(),
            api_url: None,
            api_key_env: "SERPER_API_KEY".to_string(),
            timeout_seconds: 15,
        }
    }
}

/// On-disk article cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: String,
    /// Entries older than this are treated as misses and removed
    pub ttl_seconds: Option<u64>,
    /// Oldest entries are evicted once the cache holds more than this
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: "data/cache".to_string(),
            ttl_seconds: None,
            max_entries: None,
        }
    }
}

/// Politeness / fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    /// Minimum gap between two fetch dispatches
    pub delay_millis: u64,
    pub fetch_timeout_seconds: u64,
    pub user_agent: String,
    /// Cleaned text shorter than this counts as an empty page
    pub min_text_chars: usize,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            delay_millis: 2_000,
            fetch_timeout_seconds: 20,
            user_agent: "Researchscope/0.1.0".to_string(),
            min_text_chars: 100,
        }
    }
}

/// Per-article enrichment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Word budget of one summarization chunk
    pub chunk_max_words: usize,
    pub summary_max_length: usize,
    pub summary_min_length: usize,
    pub key_phrase_count: usize,
    /// Use a lead-sentence summary instead of "" when summarization fails
    pub extractive_fallback: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            chunk_max_words: 1024,
            summary_max_length: 150,
            summary_min_length: 50,
            key_phrase_count: 5,
            extractive_fallback: false,
        }
    }
}

/// Cross-article synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub num_topics: usize,
    pub topic_words: usize,
    /// Gibbs sampling sweeps for the topic model
    pub iterations: usize,
    pub seed: u64,
    pub summary_max_length: usize,
    pub summary_min_length: usize,
    pub key_theme_count: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            num_topics: 5,
            topic_words: 10,
            iterations: 200,
            seed: 42,
            summary_max_length: 300,
            summary_min_length: 100,
            key_theme_count: 10,
        }
    }
}

/// Adaptive research memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub similarity_threshold: f64,
    /// Fallback source list used until effectiveness data exists
    pub curated_sources: Vec<String>,
    pub max_effective_sources: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            curated_sources: default_curated_sources(),
            max_effective_sources: 5,
        }
    }
}

/// Academic, news and reference domains used before any history exists.
pub fn default_curated_sources() -> Vec<String> {
    [
        "arxiv.org",
        "sci-hub.se",
        "core.ac.uk",
        "unpaywall.org",
        "doaj.org",
        "reuters.com",
        "apnews.com",
        "bbc.com",
        "theguardian.com",
        "aljazeera.com",
        "wikipedia.org",
        "britannica.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Run output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    /// Search results requested per query
    pub num_sources: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "data/research_outputs".to_string(),
            num_sources: 5,
        }
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Read an API key from the named environment variable, ignoring blank values.
pub fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_string_with_defaults() {
        let toml = r#"
            [llm.remote]
            api_url = "http://localhost:11434/v1/chat/completions"
            model = "llama3"

            [llm.embedding]
            model = "nomic-embed-text"

            [synthesis]
            num_topics = 3

            [memory]
            curated_sources = ["arxiv.org"]
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.synthesis.num_topics, 3);
        assert_eq!(cfg.synthesis.topic_words, 10);
        assert_eq!(cfg.memory.curated_sources, vec!["arxiv.org".to_string()]);
        assert_eq!(cfg.cache.dir, "data/cache");
        assert_eq!(cfg.llm.retry.max_attempts, 5);

        let analysis = cfg.llm.for_task(LlmTask::Analysis).expect("fallback to remote");
        assert_eq!(analysis.model.as_deref(), Some("llama3"));
        let embedding = cfg.llm.for_task(LlmTask::Embedding).expect("embedding section");
        assert_eq!(embedding.model.as_deref(), Some("nomic-embed-text"));
    }

    #[test]
    fn empty_config_uses_curated_source_list() {
        let cfg: Config = toml::from_str("").expect("parse empty config");
        assert_eq!(cfg.memory.curated_sources.len(), 12);
        assert!(cfg.memory.curated_sources.contains(&"arxiv.org".to_string()));
        assert!(cfg.llm.for_task(LlmTask::Summarization).is_none());
        assert_eq!(cfg.search.provider, "serper");
    }

    #[tokio::test]
    async fn override_file_takes_precedence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");

        tokio::fs::write(
            &default_path,
            "[output]\ndir = \"out\"\nnum_sources = 8\n\n[politeness]\ndelay_millis = 500\n",
        )
        .await
        .expect("write default");
        tokio::fs::write(&override_path, "[output]\nnum_sources = 3\n")
            .await
            .expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load merged config");
        assert_eq!(cfg.output.dir, "out");
        assert_eq!(cfg.output.num_sources, 3);
        assert_eq!(cfg.politeness.delay_millis, 500);
    }

    #[tokio::test]
    async fn missing_files_yield_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        let cfg = Config::load_with_defaults(Some(&missing), None)
            .await
            .expect("defaults");
        assert_eq!(cfg.output.num_sources, 5);
    }
}
