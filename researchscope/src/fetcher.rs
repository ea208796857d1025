use anyhow::Result;
use common::PolitenessConfig;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::ContentCache;
use crate::error::{FetchFailure, ResearchError};
use crate::models::Article;
use crate::scraping::{self, PageSource};
use crate::search::{self, SearchProvider};
use crate::text;

/// What happened to one candidate URL
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Fetched {
        url: String,
        #[serde(skip)]
        article: Arc<Article>,
        from_cache: bool,
    },
    Failed {
        url: String,
        reason: FetchFailure,
    },
}

/// Per-URL results of one `fetch_many` call, in candidate order
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchReport {
    /// Successfully obtained articles, in candidate order
    pub fn articles(&self) -> Vec<Arc<Article>> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                FetchOutcome::Fetched { article, .. } => Some(article.clone()),
                FetchOutcome::Failed { .. } => None,
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FetchFailure)> {
        self.outcomes.iter().filter_map(|o| match o {
            FetchOutcome::Failed { url, reason } => Some((url.as_str(), reason)),
            FetchOutcome::Fetched { .. } => None,
        })
    }

    pub fn cache_hits(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FetchOutcome::Fetched { from_cache: true, .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| matches!(o, FetchOutcome::Fetched { .. }))
    }
}

/// Spaces out network dispatches from one fetcher.
///
/// The lock is held while waiting, so dispatches are serialized while the
/// fetches themselves still overlap.
struct Pacer {
    interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dispatch: Mutex::new(None),
        }
    }

    async fn wait_turn(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}

/// Resolves, fetches, parses and caches the articles for a query
pub struct ArticleFetcher {
    cache: ContentCache,
    search: Arc<dyn SearchProvider>,
    pages: Arc<dyn PageSource>,
    pacer: Pacer,
    min_text_chars: usize,
}

impl ArticleFetcher {
    pub fn new(cache: ContentCache, search: Arc<dyn SearchProvider>, pages: Arc<dyn PageSource>) -> Self {
        let politeness = PolitenessConfig::default();
        Self {
            cache,
            search,
            pages,
            pacer: Pacer::new(Duration::from_millis(politeness.delay_millis)),
            min_text_chars: politeness.min_text_chars,
        }
    }

    pub fn with_politeness(mut self, delay: Duration, min_text_chars: usize) -> Self {
        self.pacer = Pacer::new(delay);
        self.min_text_chars = min_text_chars;
        self
    }

    /// Fetch up to `count` search results for `query`, plus results restricted
    /// to the `source_hint` domains.
    ///
    /// Only a fatal error (missing search credential) is returned as `Err`;
    /// per-URL failures are reported in the [`FetchReport`].
    pub async fn fetch_many(&self, query: &str, source_hint: &[String], count: usize) -> Result<FetchReport> {
        let candidates = self.resolve_candidates(query, source_hint, count).await?;
        if candidates.is_empty() {
            info!("No candidate URLs for {:?}", query);
            return Ok(FetchReport::default());
        }

        info!("Fetching {} candidate URL(s) for {:?}", candidates.len(), query);
        let outcomes = join_all(candidates.iter().map(|url| self.fetch_candidate(url))).await;
        let report = FetchReport { outcomes };

        for (url, reason) in report.failures() {
            let err = ResearchError::Fetch {
                url: url.to_string(),
                reason: reason.clone(),
            };
            warn!("{}", err);
        }
        info!(
            "Fetched {}/{} article(s), {} from cache",
            report.articles().len(),
            report.outcomes.len(),
            report.cache_hits()
        );
        Ok(report)
    }

    async fn resolve_candidates(&self, query: &str, source_hint: &[String], count: usize) -> Result<Vec<String>> {
        let mut candidates = self.search_or_empty(query, count).await?;

        if !source_hint.is_empty() {
            let restricted = search::site_restricted_query(query, source_hint);
            for url in self.search_or_empty(&restricted, count).await? {
                if !candidates.contains(&url) {
                    candidates.push(url);
                }
            }
        }
        Ok(candidates)
    }

    async fn search_or_empty(&self, query: &str, count: usize) -> Result<Vec<String>> {
        match self.search.search(query, count).await {
            Ok(mut urls) => {
                urls.truncate(count);
                let mut unique: Vec<String> = Vec::with_capacity(urls.len());
                for url in urls {
                    if !unique.contains(&url) {
                        unique.push(url);
                    }
                }
                Ok(unique)
            }
            Err(e) if ResearchError::is_fatal_error(&e) => Err(e),
            Err(e) => {
                warn!("search failed for {:?}: {:#}", query, e);
                Ok(Vec::new())
            }
        }
    }

    async fn fetch_candidate(&self, url: &str) -> FetchOutcome {
        if !is_valid_url(url) {
            return FetchOutcome::Failed {
                url: url.to_string(),
                reason: FetchFailure::InvalidUrl,
            };
        }

        match self.fetch_article(url).await {
            Ok((article, from_cache)) => FetchOutcome::Fetched {
                url: url.to_string(),
                article: Arc::new(article),
                from_cache,
            },
            Err(reason) => FetchOutcome::Failed {
                url: url.to_string(),
                reason,
            },
        }
    }

    async fn fetch_article(&self, url: &str) -> std::result::Result<(Article, bool), FetchFailure> {
        match self.cache.get(url).await {
            Ok(Some(article)) => {
                debug!(url = %url, "cache hit");
                return Ok((article, true));
            }
            Ok(None) => {}
            Err(e) => warn!(url = %url, "cache read failed, fetching: {:#}", e),
        }

        self.pacer.wait_turn().await;
        let html = self
            .pages
            .fetch_html(url)
            .await
            .map_err(|e| FetchFailure::Network(format!("{:#}", e)))?;
        if html.trim().is_empty() {
            return Err(FetchFailure::EmptyBody);
        }

        let parsed = scraping::parse_article(url, &html).map_err(|e| FetchFailure::Parse(format!("{:#}", e)))?;
        let cleaned_text = text::clean_text(&parsed.text);
        if cleaned_text.chars().count() < self.min_text_chars.max(1) {
            return Err(FetchFailure::EmptyBody);
        }

        let article = Article {
            url: url.to_string(),
            title: parsed.title,
            raw_text: parsed.text,
            cleaned_text,
            keywords: parsed.keywords,
            publish_date: parsed.publish_date,
            authors: parsed.authors,
        };

        if let Err(e) = self.cache.put(url, &article).await {
            warn!(url = %url, "cache write failed: {:#}", e);
        }
        Ok((article, false))
    }
}

/// Scheme and authority must both be present.
pub fn is_valid_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => !parsed.scheme().is_empty() && parsed.has_host(),
        Err(_) => false,
    }
}

/// Network authority of a URL (host plus non-default port), or "" if none.
pub fn domain_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}
