use anyhow::Result;
use common::SynthesisConfig;
use tracing::info;

use crate::enrichment::{analyze_text, summarize_or_default};
use crate::llm::summarizer::SummaryParams;
use crate::llm::ModelSet;
use crate::models::{CombinedAnalysis, ProcessedArticle, Sentiment};
use crate::topics::{self, LdaParams};

/// Combines the processed articles of a run into one analysis
pub struct SynthesisEngine {
    models: ModelSet,
    config: SynthesisConfig,
    chunk_max_words: usize,
}

impl SynthesisEngine {
    pub fn new(models: ModelSet, config: SynthesisConfig, chunk_max_words: usize) -> Self {
        Self {
            models,
            config,
            chunk_max_words,
        }
    }

    /// Roll-up summary, entities, sentiment, themes and topics across `articles`.
    pub async fn combine(&self, articles: &[ProcessedArticle]) -> Result<CombinedAnalysis> {
        let summaries: Vec<String> = articles
            .iter()
            .map(|a| a.summary.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let combined_text = summaries.join(" ");
        if combined_text.is_empty() {
            info!("synthesis: no summaries to combine across {} sources", articles.len());
            return Ok(CombinedAnalysis {
                comprehensive_summary: String::new(),
                common_entities: Vec::new(),
                overall_sentiment: Sentiment::neutral(),
                key_themes: Vec::new(),
                topics: Vec::new(),
                source_count: articles.len(),
            });
        }

        let params = SummaryParams {
            chunk_max_words: self.chunk_max_words,
            max_length: self.config.summary_max_length,
            min_length: self.config.summary_min_length,
        };
        let comprehensive_summary =
            summarize_or_default(self.models.summarizer.as_ref(), &combined_text, params, false).await?;

        let analysis = analyze_text(
            self.models.analyzer.as_ref(),
            &combined_text,
            self.config.key_theme_count,
        )
        .await?;

        let topics = topics::fit_topics(&summaries, &LdaParams::from(&self.config));

        info!(
            "synthesis: {} sources, {} themes, {} topics",
            articles.len(),
            analysis.key_phrases.len(),
            topics.len()
        );

        Ok(CombinedAnalysis {
            comprehensive_summary,
            common_entities: analysis.entities,
            overall_sentiment: analysis.sentiment,
            key_themes: analysis.key_phrases,
            topics,
            source_count: articles.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::EnrichmentEngine;
    use crate::testing::{article, Failures, MockLlm};
    use common::EnrichmentConfig;
    use std::sync::Arc;

    async fn processed(llm: Arc<MockLlm>, texts: &[&str]) -> Vec<ProcessedArticle> {
        let mut engine = EnrichmentEngine::new(ModelSet::uniform(llm), EnrichmentConfig::default());
        let mut out = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let url = format!("https://site{}.example.com/a", i);
            out.push(engine.process(Arc::new(article(&url, text))).await.expect("process"));
        }
        out
    }

    #[tokio::test]
    async fn combines_summaries_entities_and_themes() {
        let llm = Arc::new(MockLlm::new());
        let articles = processed(
            llm.clone(),
            &[
                "Germany expands solar capacity. Officials cite falling panel prices.",
                "Solar tariffs in Germany drop again. Installers report record demand.",
                "Spain follows Germany with new solar auctions this spring.",
            ],
        )
        .await;

        let engine = SynthesisEngine::new(ModelSet::uniform(llm.clone()), SynthesisConfig::default(), 1024);
        let combined = engine.combine(&articles).await.expect("combine");

        assert_eq!(combined.source_count, 3);
        assert!(!combined.comprehensive_summary.is_empty());
        assert!(combined.common_entities.iter().any(|e| e.text == "Germany"));
        assert_eq!(combined.overall_sentiment.label, "POSITIVE");
        assert_eq!(combined.key_themes[..3], ["germany", "solar", "Germany"]);
        // three documents cannot support five topics
        assert!(combined.topics.is_empty());
    }

    #[tokio::test]
    async fn topics_are_fitted_when_documents_suffice() {
        let llm = Arc::new(MockLlm::new());
        let articles = processed(
            llm.clone(),
            &[
                "Solar farms expand quickly.",
                "Wind turbines expand offshore.",
                "Bank rates rise sharply.",
            ],
        )
        .await;
        let config = SynthesisConfig {
            num_topics: 2,
            topic_words: 4,
            ..Default::default()
        };
        let engine = SynthesisEngine::new(ModelSet::uniform(llm), config, 1024);
        let combined = engine.combine(&articles).await.expect("combine");
        assert_eq!(combined.topics.len(), 2);
        assert!(combined.topics.iter().all(|t| t.words.len() <= 4));
    }

    #[tokio::test]
    async fn failed_rollup_summary_is_empty_not_fatal() {
        let articles = processed(Arc::new(MockLlm::new()), &["Markets rallied on Friday."]).await;
        let failing = Arc::new(MockLlm::failing(Failures {
            summarize: true,
            ..Default::default()
        }));
        let engine = SynthesisEngine::new(ModelSet::uniform(failing), SynthesisConfig::default(), 1024);
        let combined = engine.combine(&articles).await.expect("combine");
        assert_eq!(combined.comprehensive_summary, "");
        assert_eq!(combined.source_count, 1);
    }

    #[tokio::test]
    async fn no_summaries_means_no_analysis_calls() {
        let failing = Arc::new(MockLlm::failing(Failures {
            summarize: true,
            ..Default::default()
        }));
        let articles = processed(
            failing.clone(),
            &["Markets rallied on Friday.", "Bond yields fell.", "Oil prices held steady."],
        )
        .await;
        assert!(articles.iter().all(|a| a.summary.is_empty()));

        let analyzer = Arc::new(MockLlm::new());
        let models = ModelSet {
            summarizer: failing,
            analyzer: analyzer.clone(),
            embedder: analyzer.clone(),
        };
        let engine = SynthesisEngine::new(models, SynthesisConfig::default(), 1024);
        let combined = engine.combine(&articles).await.expect("combine");

        assert_eq!(analyzer.count("sentiment"), 0);
        assert_eq!(analyzer.count("entities"), 0);
        assert_eq!(combined.comprehensive_summary, "");
        assert_eq!(combined.overall_sentiment, Sentiment::neutral());
        assert!(combined.common_entities.is_empty());
        assert!(combined.key_themes.is_empty());
        assert_eq!(combined.source_count, 3);
    }
}
