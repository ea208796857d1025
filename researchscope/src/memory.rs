use chrono::{DateTime, Utc};
use common::MemoryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::fetcher::domain_of;
use crate::models::{ResearchRun, Topic};
use crate::text;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub result_count: usize,
}

/// Condensed outcome of one run, kept per query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDigest {
    pub summary: String,
    pub themes: Vec<String>,
    pub topics: Vec<Topic>,
    pub timestamp: DateTime<Utc>,
}

/// How often a domain produced a usable (summarized) article.
/// `success <= total` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub domain: String,
    pub success: u32,
    pub total: u32,
}

impl SourceRecord {
    pub fn success_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.success as f64 / self.total as f64)
    }
}

/// Serializable snapshot of everything the memory has learned
#[derive(Debug, Clone, Serialize)]
pub struct ResearchHistory {
    pub query_history: Vec<QueryRecord>,
    pub topic_memory: HashMap<String, Vec<TopicDigest>>,
    pub source_effectiveness: Vec<SourceRecord>,
    pub total_queries: usize,
}

/// TF-IDF similarity over past queries.
///
/// The model is refitted over the stored queries on every lookup.
#[derive(Debug, Default)]
struct QueryIndex {
    queries: Vec<String>,
}

impl QueryIndex {
    fn add(&mut self, query: &str) {
        self.queries.push(query.to_string());
    }

    fn similar(&self, query: &str, threshold: f64) -> Vec<String> {
        if self.queries.len() < 2 {
            return Vec::new();
        }

        let docs: Vec<Vec<String>> = self.queries.iter().map(|q| text::tokenize(q)).collect();
        let mut vocab: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            for term in doc {
                let next = vocab.len();
                vocab.entry(term.as_str()).or_insert(next);
            }
        }

        let mut df = vec![0usize; vocab.len()];
        for doc in &docs {
            let mut seen = vec![false; vocab.len()];
            for term in doc {
                let id = vocab[term.as_str()];
                if !seen[id] {
                    seen[id] = true;
                    df[id] += 1;
                }
            }
        }

        let n = docs.len() as f64;
        let idf: Vec<f64> = df.iter().map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0).collect();

        let vectorize = |tokens: &[String]| -> Vec<f64> {
            let mut v = vec![0.0; vocab.len()];
            for term in tokens {
                if let Some(&id) = vocab.get(term.as_str()) {
                    v[id] += 1.0;
                }
            }
            for (x, w) in v.iter_mut().zip(&idf) {
                *x *= w;
            }
            let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > 0.0 {
                v.iter_mut().for_each(|x| *x /= norm);
            }
            v
        };

        let probe = vectorize(&text::tokenize(query));
        docs.iter()
            .zip(&self.queries)
            .filter(|(doc, _)| {
                let similarity: f64 = vectorize(doc.as_slice()).iter().zip(&probe).map(|(a, b)| a * b).sum();
                similarity > threshold
            })
            .map(|(_, q)| q.clone())
            .collect()
    }
}

/// Cross-run memory: past queries, per-query digests, per-domain success.
///
/// Owned by the aggregator and only changed between runs.
pub struct ResearchMemory {
    config: MemoryConfig,
    query_history: Vec<QueryRecord>,
    topic_memory: HashMap<String, Vec<TopicDigest>>,
    sources: Vec<SourceRecord>,
    source_index: HashMap<String, usize>,
    query_index: QueryIndex,
}

impl ResearchMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            query_history: Vec::new(),
            topic_memory: HashMap::new(),
            sources: Vec::new(),
            source_index: HashMap::new(),
            query_index: QueryIndex::default(),
        }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.config.similarity_threshold
    }

    /// Earlier queries whose TF-IDF cosine similarity to `query` exceeds
    /// `threshold`, oldest first. Needs at least two earlier queries.
    pub fn find_similar_queries(&self, query: &str, threshold: f64) -> Vec<String> {
        self.query_index.similar(query, threshold)
    }

    /// Domains worth steering the search towards.
    ///
    /// Before any run has been recorded this is the curated source list;
    /// afterwards the best domains by success rate, ties in first-seen order.
    pub fn effective_sources(&self, _query: &str) -> Vec<String> {
        if self.sources.is_empty() {
            return self.config.curated_sources.clone();
        }

        let mut rated: Vec<(&str, f64)> = self
            .sources
            .iter()
            .filter_map(|s| s.success_rate().map(|rate| (s.domain.as_str(), rate)))
            .collect();
        rated.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        rated
            .into_iter()
            .take(self.config.max_effective_sources)
            .map(|(domain, _)| domain.to_string())
            .collect()
    }

    /// Record a finished run.
    pub fn update(&mut self, query: &str, run: &ResearchRun) {
        self.query_history.push(QueryRecord {
            query: query.to_string(),
            timestamp: Utc::now(),
            result_count: run.source_articles.len(),
        });

        let analysis = &run.combined_analysis;
        self.topic_memory
            .entry(query.to_string())
            .or_default()
            .push(TopicDigest {
                summary: analysis.comprehensive_summary.clone(),
                themes: analysis.key_themes.clone(),
                topics: analysis.topics.clone(),
                timestamp: Utc::now(),
            });

        for source in &run.source_articles {
            let domain = domain_of(&source.url);
            let idx = match self.source_index.get(&domain) {
                Some(&idx) => idx,
                None => {
                    self.sources.push(SourceRecord {
                        domain: domain.clone(),
                        success: 0,
                        total: 0,
                    });
                    self.source_index.insert(domain, self.sources.len() - 1);
                    self.sources.len() - 1
                }
            };
            let record = &mut self.sources[idx];
            record.total += 1;
            if !source.summary.is_empty() {
                record.success += 1;
            }
            debug!(domain = %record.domain, "source stats {}/{}", record.success, record.total);
        }

        self.query_index.add(query);
        info!(
            "memory: {} queries, {} tracked domains",
            self.query_history.len(),
            self.sources.len()
        );
    }

    pub fn history(&self) -> ResearchHistory {
        ResearchHistory {
            query_history: self.query_history.clone(),
            topic_memory: self.topic_memory.clone(),
            source_effectiveness: self.sources.clone(),
            total_queries: self.query_history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CombinedAnalysis, RunMetadata, Sentiment, SourceArticle};

    fn run(query: &str, sources: &[(&str, &str)]) -> ResearchRun {
        let source_articles: Vec<SourceArticle> = sources
            .iter()
            .map(|(url, summary)| SourceArticle {
                title: "t".into(),
                url: url.to_string(),
                summary: summary.to_string(),
                key_phrases: Vec::new(),
                sentiment: Sentiment::neutral(),
            })
            .collect();
        ResearchRun {
            query: query.to_string(),
            timestamp: Utc::now(),
            combined_analysis: CombinedAnalysis {
                comprehensive_summary: "rollup".into(),
                common_entities: Vec::new(),
                overall_sentiment: Sentiment::neutral(),
                key_themes: vec!["theme".into()],
                topics: Vec::new(),
                source_count: source_articles.len(),
            },
            metadata: RunMetadata {
                total_sources: source_articles.len(),
                generation_timestamp: Utc::now(),
            },
            source_articles,
        }
    }

    fn memory() -> ResearchMemory {
        ResearchMemory::new(MemoryConfig::default())
    }

    #[test]
    fn similar_queries_need_two_priors() {
        let mut memory = memory();
        memory.update("vaccine effectiveness study", &run("vaccine effectiveness study", &[]));
        assert!(memory.find_similar_queries("vaccine efficacy", 0.3).is_empty());

        memory.update("climate change policy", &run("climate change policy", &[]));
        assert_eq!(
            memory.find_similar_queries("vaccine efficacy", 0.3),
            vec!["vaccine effectiveness study"]
        );
        assert!(memory.find_similar_queries("quantum computing", 0.3).is_empty());
    }

    #[test]
    fn similar_queries_keep_history_order() {
        let mut memory = memory();
        for q in ["solar power cost", "wind farm cost", "solar power subsidies"] {
            memory.update(q, &run(q, &[]));
        }
        let similar = memory.find_similar_queries("solar power", 0.3);
        assert_eq!(similar, vec!["solar power cost", "solar power subsidies"]);
    }

    #[test]
    fn curated_sources_until_stats_exist() {
        let memory = memory();
        assert_eq!(memory.effective_sources("anything"), MemoryConfig::default().curated_sources);
    }

    #[test]
    fn sources_ranked_by_success_rate() {
        let mut memory = memory();
        memory.update(
            "q1",
            &run(
                "q1",
                &[
                    ("https://a.com/1", ""),
                    ("https://a.com/2", "ok"),
                    ("https://b.org/1", "ok"),
                    ("https://c.net/1", ""),
                    ("https://d.io/1", "ok"),
                ],
            ),
        );
        assert_eq!(memory.effective_sources("q2"), vec!["b.org", "d.io", "a.com", "c.net"]);

        let history = memory.history();
        assert_eq!(history.total_queries, 1);
        assert_eq!(history.query_history[0].result_count, 5);
        let a = history.source_effectiveness.iter().find(|s| s.domain == "a.com").expect("a.com");
        assert_eq!((a.success, a.total), (1, 2));
        assert!(history.source_effectiveness.iter().all(|s| s.success <= s.total));
        assert_eq!(history.topic_memory["q1"].len(), 1);
    }

    #[test]
    fn effective_sources_are_capped() {
        let mut memory = memory();
        let urls: Vec<String> = (0..8).map(|i| format!("https://site{}.com/x", i)).collect();
        let sources: Vec<(&str, &str)> = urls.iter().map(|u| (u.as_str(), "ok")).collect();
        memory.update("q", &run("q", &sources));
        assert_eq!(
            memory.effective_sources("q"),
            vec!["site0.com", "site1.com", "site2.com", "site3.com", "site4.com"]
        );
    }

    #[test]
    fn topic_memory_appends_per_query() {
        let mut memory = memory();
        memory.update("q", &run("q", &[]));
        memory.update("q", &run("q", &[]));
        let history = memory.history();
        assert_eq!(history.topic_memory["q"].len(), 2);
        assert_eq!(history.query_history.len(), 2);
    }
}
