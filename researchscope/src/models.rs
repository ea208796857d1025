use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Raw fetch result for one web page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub raw_text: String,
    pub cleaned_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authors: Vec<String>,
}

/// Byte range of an entity inside the analysed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Named entity found in a text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    /// Entity class, e.g. PERSON, ORG, GPE
    pub label: String,
    pub span: Span,
}

/// Sentiment label with confidence in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f32,
}

impl Sentiment {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            label: label.into().to_uppercase(),
            score,
        }
    }

    /// Default used when sentiment scoring fails
    pub fn neutral() -> Self {
        Self {
            label: "NEUTRAL".to_string(),
            score: 0.0,
        }
    }
}

impl Default for Sentiment {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Article enriched with summary, entities, sentiment and key phrases
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedArticle {
    pub summary: String,
    pub entities: Vec<Entity>,
    pub sentiment: Sentiment,
    pub key_phrases: Vec<String>,
    pub article: Arc<Article>,
}

/// One latent topic and its most probable terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: usize,
    pub words: Vec<String>,
}

/// Cross-article synthesis of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedAnalysis {
    pub comprehensive_summary: String,
    pub common_entities: Vec<Entity>,
    pub overall_sentiment: Sentiment,
    pub key_themes: Vec<String>,
    pub topics: Vec<Topic>,
    pub source_count: usize,
}

/// Per-source line of a persisted run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceArticle {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub key_phrases: Vec<String>,
    pub sentiment: Sentiment,
}

impl From<&ProcessedArticle> for SourceArticle {
    fn from(processed: &ProcessedArticle) -> Self {
        Self {
            title: processed.article.title.clone(),
            url: processed.article.url.clone(),
            summary: processed.summary.clone(),
            key_phrases: processed.key_phrases.clone(),
            sentiment: processed.sentiment.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub total_sources: usize,
    pub generation_timestamp: DateTime<Utc>,
}

/// Result of one research run. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRun {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub combined_analysis: CombinedAnalysis,
    pub source_articles: Vec<SourceArticle>,
    pub metadata: RunMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_is_clamped_and_uppercased() {
        let s = Sentiment::new("positive", 1.7);
        assert_eq!(s.label, "POSITIVE");
        assert_eq!(s.score, 1.0);

        let s = Sentiment::new("negative", f32::NAN);
        assert_eq!(s.score, 0.0);
        assert_eq!(Sentiment::default(), Sentiment::neutral());
    }
}
