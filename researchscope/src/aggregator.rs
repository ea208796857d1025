use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::Config;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::cache::ContentCache;
use crate::enrichment::EnrichmentEngine;
use crate::fetcher::{ArticleFetcher, FetchReport};
use crate::llm::ModelSet;
use crate::memory::{ResearchHistory, ResearchMemory};
use crate::models::{ResearchRun, RunMetadata, SourceArticle};
use crate::scraping::HttpPageSource;
use crate::search;
use crate::synthesis::SynthesisEngine;

/// Result of one `research_topic` call
#[derive(Debug)]
pub enum ResearchOutcome {
    /// The run was analysed and written to `path`
    Completed {
        run: ResearchRun,
        path: PathBuf,
        fetch_report: FetchReport,
    },
    /// A stage produced nothing to work with; no file was written
    NoResults { reason: String },
}

/// On-disk layout of a run file
#[derive(Serialize)]
struct RunFile<'a> {
    query: &'a str,
    timestamp: DateTime<Utc>,
    results: &'a ResearchRun,
}

/// Runs the fetch, enrich, synthesize, persist, remember pipeline.
///
/// Holds the memory for the life of the process; `&mut self` keeps runs
/// from overlapping.
pub struct ResearchAggregator {
    fetcher: ArticleFetcher,
    enrichment: EnrichmentEngine,
    synthesis: SynthesisEngine,
    memory: ResearchMemory,
    output_dir: PathBuf,
    num_sources: usize,
}

impl ResearchAggregator {
    pub fn new(fetcher: ArticleFetcher, models: ModelSet, config: &Config) -> Self {
        Self {
            fetcher,
            enrichment: EnrichmentEngine::new(models.clone(), config.enrichment.clone()),
            synthesis: SynthesisEngine::new(models, config.synthesis.clone(), config.enrichment.chunk_max_words),
            memory: ResearchMemory::new(config.memory.clone()),
            output_dir: PathBuf::from(&config.output.dir),
            num_sources: config.output.num_sources,
        }
    }

    /// Wire up the HTTP collaborators described by `config`.
    ///
    /// Fails with a configuration error when an LLM API key is missing.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let models = ModelSet::from_config(&config.llm)?;
        let politeness = &config.politeness;
        let search = search::from_config(&config.search, &politeness.user_agent)?;
        let pages = Arc::new(HttpPageSource::new(politeness.fetch_timeout_seconds, &politeness.user_agent)?);
        let cache = ContentCache::open(&config.cache).await?;

        let fetcher = ArticleFetcher::new(cache, search, pages)
            .with_politeness(Duration::from_millis(politeness.delay_millis), politeness.min_text_chars);
        Ok(Self::new(fetcher, models, config))
    }

    pub fn with_num_sources(mut self, num_sources: usize) -> Self {
        self.num_sources = num_sources;
        self
    }

    pub fn memory(&self) -> &ResearchMemory {
        &self.memory
    }

    pub fn history(&self) -> ResearchHistory {
        self.memory.history()
    }

    /// Summaries from this process's runs nearest to `query`.
    pub async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        self.enrichment.semantic_search(query, k).await
    }

    /// Research `query` end to end.
    ///
    /// Returns `Err` only for failures that abort the run (missing credential,
    /// exhausted rate limit, unwritable output). Nothing is written or
    /// remembered in that case.
    pub async fn research_topic(&mut self, query: &str) -> Result<ResearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(ResearchOutcome::NoResults {
                reason: "empty query".to_string(),
            });
        }
        info!("Starting research on topic: {}", query);

        let similar = self
            .memory
            .find_similar_queries(query, self.memory.similarity_threshold());
        if !similar.is_empty() {
            info!("Found similar previous queries: {:?}", similar);
        }

        let sources = self.memory.effective_sources(query);
        info!("Using effective sources: {:?}", sources);

        let fetch_report = self.fetcher.fetch_many(query, &sources, self.num_sources).await?;
        let articles = fetch_report.articles();
        if articles.is_empty() {
            warn!("No articles found for {:?}", query);
            return Ok(ResearchOutcome::NoResults {
                reason: format!("no articles could be fetched for \"{}\"", query),
            });
        }

        info!("Processing {} article(s)", articles.len());
        let mut processed = Vec::with_capacity(articles.len());
        for article in articles {
            processed.push(self.enrichment.process(article).await?);
        }

        if processed.iter().all(|p| p.summary.is_empty()) {
            warn!("No article could be summarized for {:?}", query);
            return Ok(ResearchOutcome::NoResults {
                reason: format!("none of the {} fetched article(s) could be summarized", processed.len()),
            });
        }

        info!("Combining and analyzing summaries");
        let combined_analysis = self.synthesis.combine(&processed).await?;

        let now = Utc::now();
        let run = ResearchRun {
            query: query.to_string(),
            timestamp: now,
            combined_analysis,
            source_articles: processed.iter().map(SourceArticle::from).collect(),
            metadata: RunMetadata {
                total_sources: processed.len(),
                generation_timestamp: now,
            },
        };

        let path = save_run(&self.output_dir, &run).await?;
        info!(path = %path.display(), "Research results saved");

        self.memory.update(query, &run);
        Ok(ResearchOutcome::Completed {
            run,
            path,
            fetch_report,
        })
    }
}

/// Write `run` to a new file under `dir`; never overwrites an existing file.
pub async fn save_run(dir: &Path, run: &ResearchRun) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let file_name = format!(
        "research_{}_{}.json",
        run.timestamp.format("%Y%m%d_%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    );
    let path = dir.join(file_name);

    let body = serde_json::to_vec_pretty(&RunFile {
        query: &run.query,
        timestamp: run.timestamp,
        results: run,
    })
    .context("Failed to serialize research run")?;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .with_context(|| format!("Failed to create run file: {}", path.display()))?;
    file.write_all(&body)
        .await
        .with_context(|| format!("Failed to write run file: {}", path.display()))?;
    file.flush().await?;
    Ok(path)
}
