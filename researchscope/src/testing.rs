//! Deterministic collaborators for unit tests.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ResearchError;
use crate::llm::{EntityMention, LlmProvider, LlmRequest, LlmResponse, UsageMetadata};
use crate::models::{Article, Sentiment};
use crate::scraping::PageSource;
use crate::search::SearchProvider;
use crate::text;

/// Which sub-tasks of [`MockLlm`] fail
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub summarize: bool,
    pub entities: bool,
    pub sentiment: bool,
    pub phrases: bool,
    pub embed: bool,
    /// Summaries fail with an exhausted rate limit
    pub rate_limited: bool,
}

/// LLM stand-in: summaries are the leading words, entities the capitalized
/// words, embeddings a hashed bag of words.
#[derive(Default)]
pub struct MockLlm {
    pub failures: Failures,
    pub calls: Mutex<Vec<&'static str>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: Failures) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 16];
    for token in text::tokenize(text) {
        let bucket = token.bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize)) % 16;
        v[bucket] += 1.0;
    }
    v
}

#[async_trait::async_trait]
impl LlmProvider for MockLlm {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.record("generate");
        Ok(LlmResponse {
            content: request.prompt,
            usage: UsageMetadata::default(),
            model: "mock".to_string(),
        })
    }

    async fn summarize(&self, content: &str, _max_length: usize, _min_length: usize) -> Result<String> {
        self.record("summarize");
        if self.failures.rate_limited {
            return Err(ResearchError::RateLimited { attempts: 5 }.into());
        }
        if self.failures.summarize {
            anyhow::bail!("summarizer unavailable");
        }
        Ok(content.split_whitespace().take(8).collect::<Vec<_>>().join(" "))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.record("embed");
        if self.failures.embed {
            anyhow::bail!("embedder unavailable");
        }
        Ok(hashed_embedding(text))
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<EntityMention>> {
        self.record("entities");
        if self.failures.entities {
            anyhow::bail!("ner unavailable");
        }
        let mut seen: Vec<EntityMention> = Vec::new();
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.chars().next().map_or(false, char::is_uppercase) {
                let mention = EntityMention {
                    text: word.to_string(),
                    label: "MISC".to_string(),
                };
                if !seen.contains(&mention) {
                    seen.push(mention);
                }
            }
        }
        Ok(seen)
    }

    async fn analyze_sentiment(&self, _text: &str) -> Result<Sentiment> {
        self.record("sentiment");
        if self.failures.sentiment {
            anyhow::bail!("sentiment unavailable");
        }
        Ok(Sentiment::new("POSITIVE", 0.8))
    }

    async fn noun_phrases(&self, text: &str) -> Result<Vec<String>> {
        self.record("phrases");
        if self.failures.phrases {
            anyhow::bail!("parser unavailable");
        }
        Ok(text::content_terms(text))
    }
}

/// Search returning fixed URLs and recording the queries it saw
#[derive(Default)]
pub struct StaticSearch {
    pub urls: Vec<String>,
    pub queries: Mutex<Vec<String>>,
    pub unconfigured: bool,
}

impl StaticSearch {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.unconfigured {
            return Err(ResearchError::Configuration("no search API key configured".into()).into());
        }
        Ok(self.urls.iter().take(count).cloned().collect())
    }
}

/// Page source serving canned HTML; unknown URLs fail like a dead host
#[derive(Default)]
pub struct MapPageSource {
    pub pages: HashMap<String, String>,
    pub fetched: Mutex<Vec<String>>,
}

impl MapPageSource {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl PageSource for MapPageSource {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("connection refused: {}", url))
    }
}

/// Minimal article page with one paragraph of `body`
pub fn article_html(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title></head><body><article><h1>{title}</h1><p>{body}</p></article></body></html>"
    )
}

pub fn article(url: &str, text: &str) -> Article {
    Article {
        url: url.to_string(),
        title: format!("Article at {}", url),
        raw_text: text.to_string(),
        cleaned_text: text.to_string(),
        keywords: Vec::new(),
        publish_date: None,
        authors: Vec::new(),
    }
}
