use anyhow::Result;
use common::EnrichmentConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ResearchError;
use crate::index::SemanticIndex;
use crate::llm::summarizer::{self, SummaryParams};
use crate::llm::{EntityMention, LlmProvider, ModelSet};
use crate::models::{Article, Entity, ProcessedArticle, Sentiment, Span};
use crate::text;

/// Entities, sentiment and key phrases of one text
#[derive(Debug, Clone, Default)]
pub struct TextAnalysis {
    pub entities: Vec<Entity>,
    pub sentiment: Sentiment,
    pub key_phrases: Vec<String>,
}

/// Use `default` for a failed sub-task unless the failure must abort the run.
fn recover<T>(task: &str, result: Result<T>, default: impl FnOnce() -> T) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if ResearchError::is_fatal_error(&e) => Err(e),
        Err(e) => {
            warn!("{} failed, using default: {:#}", task, e);
            Ok(default())
        }
    }
}

/// Run entity extraction, sentiment and key-phrase ranking over `text`.
///
/// Each sub-task fails independently and falls back to its empty value.
pub async fn analyze_text(analyzer: &dyn LlmProvider, text: &str, key_phrase_count: usize) -> Result<TextAnalysis> {
    let mentions = recover("entity extraction", analyzer.extract_entities(text).await, Vec::new)?;
    let entities = locate_entities(text, &mentions);

    let sentiment = recover("sentiment analysis", analyzer.analyze_sentiment(text).await, Sentiment::neutral)?;

    let key_phrases = match recover("noun phrase extraction", analyzer.noun_phrases(text).await.map(Some), || None)? {
        Some(phrases) => rank_key_phrases(phrases, &entities, key_phrase_count),
        None => Vec::new(),
    };

    Ok(TextAnalysis {
        entities,
        sentiment,
        key_phrases,
    })
}

/// Summarize `text` chunk by chunk. A non-fatal failure yields `""`, or the
/// leading sentences when `extractive_fallback` is set.
pub async fn summarize_or_default(
    summarizer_model: &dyn LlmProvider,
    text: &str,
    params: SummaryParams,
    extractive_fallback: bool,
) -> Result<String> {
    match summarizer::summarize_chunked(summarizer_model, text, params).await {
        Ok(summary) => Ok(summary),
        Err(e) if ResearchError::is_fatal_error(&e) => Err(e),
        Err(e) if extractive_fallback => {
            warn!("summarization failed, using extractive summary: {:#}", e);
            Ok(summarizer::extractive_summary(text, params.max_length))
        }
        Err(e) => {
            warn!("summarization failed: {:#}", e);
            Ok(String::new())
        }
    }
}

/// Every occurrence of each reported entity in `text`, in reading order.
///
/// Mentions that do not occur verbatim are dropped.
pub fn locate_entities(text: &str, mentions: &[EntityMention]) -> Vec<Entity> {
    let mut seen: Vec<&str> = Vec::new();
    let mut entities = Vec::new();
    for mention in mentions {
        let needle = mention.text.trim();
        if needle.is_empty() || seen.contains(&needle) {
            continue;
        }
        seen.push(needle);

        let before = entities.len();
        for (start, matched) in text.match_indices(needle) {
            entities.push(Entity {
                text: matched.to_string(),
                label: mention.label.clone(),
                span: Span {
                    start,
                    end: start + matched.len(),
                },
            });
        }
        if entities.len() == before {
            debug!("entity {:?} not found in text, dropping", needle);
        }
    }
    entities.sort_by_key(|e| (e.span.start, e.span.end));
    entities
}

/// Most frequent of the noun phrases and entity texts together.
pub fn rank_key_phrases(noun_phrases: Vec<String>, entities: &[Entity], n: usize) -> Vec<String> {
    let candidates = noun_phrases
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .chain(entities.iter().map(|e| e.text.clone()));
    text::rank_by_frequency(candidates, n)
}

/// Per-article enrichment: summary, entities, sentiment, key phrases.
///
/// Summaries are added to the semantic index as a side effect.
pub struct EnrichmentEngine {
    models: ModelSet,
    index: SemanticIndex,
    config: EnrichmentConfig,
}

impl EnrichmentEngine {
    pub fn new(models: ModelSet, config: EnrichmentConfig) -> Self {
        let index = SemanticIndex::new(models.embedder.clone());
        Self { models, index, config }
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    fn summary_params(&self) -> SummaryParams {
        SummaryParams {
            chunk_max_words: self.config.chunk_max_words,
            max_length: self.config.summary_max_length,
            min_length: self.config.summary_min_length,
        }
    }

    /// Enrich one article.
    ///
    /// Only a fatal failure (exhausted rate limit, missing credential) is an
    /// `Err`; every other sub-task failure leaves its field at the default.
    pub async fn process(&mut self, article: Arc<Article>) -> Result<ProcessedArticle> {
        let text = article.cleaned_text.as_str();
        debug!(url = %article.url, "enriching {} chars", text.len());

        let summary = summarize_or_default(
            self.models.summarizer.as_ref(),
            text,
            self.summary_params(),
            self.config.extractive_fallback,
        )
        .await?;

        let analysis = analyze_text(self.models.analyzer.as_ref(), text, self.config.key_phrase_count).await?;

        if !summary.is_empty() {
            let indexed = self.index.add(&summary).await;
            recover("semantic indexing", indexed, || ())?;
        }

        info!(
            url = %article.url,
            "enriched: {} word summary, {} entities, sentiment {}",
            summary.split_whitespace().count(),
            analysis.entities.len(),
            analysis.sentiment.label
        );

        Ok(ProcessedArticle {
            summary,
            entities: analysis.entities,
            sentiment: analysis.sentiment,
            key_phrases: analysis.key_phrases,
            article,
        })
    }

    /// Summaries nearest to `query`, closest first.
    pub async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        self.index.search(query, k).await
    }
}
