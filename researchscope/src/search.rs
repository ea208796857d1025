use anyhow::{Context, Result};
use common::SearchConfig;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ResearchError;

const SERPER_URL: &str = "https://google.serper.dev/search";
const DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com/html/";

/// Resolves a research query into candidate article URLs
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    /// Up to `count` URLs, best match first
    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>>;
}

/// Build the search provider named in the config.
pub fn from_config(config: &SearchConfig, user_agent: &str) -> Result<Arc<dyn SearchProvider>> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    match config.provider.as_str() {
        "serper" => {
            let mut provider =
                SerperSearch::new(common::api_key_from_env(&config.api_key_env), timeout)?;
            if let Some(url) = &config.api_url {
                provider = provider.with_endpoint(url.clone());
            }
            Ok(Arc::new(provider))
        }
        "duckduckgo" => {
            let mut provider = DuckDuckGoSearch::new(user_agent, timeout)?;
            if let Some(url) = &config.api_url {
                provider = provider.with_endpoint(url.clone());
            }
            Ok(Arc::new(provider))
        }
        other => Err(ResearchError::Configuration(format!("unknown search provider '{}'", other)).into()),
    }
}

/// Google results through the serper.dev API
pub struct SerperSearch {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl SerperSearch {
    /// A missing key is only reported when a search is attempted.
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            endpoint: SERPER_URL.to_string(),
            api_key,
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    link: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SerperSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ResearchError::Configuration("no search API key configured (SERPER_API_KEY)".to_string())
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&SerperRequest { q: query, num: count })
            .send()
            .await
            .context("search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("search failed with status {}: {}", status, body);
        }

        let body: SerperResponse = response.json().await.context("failed to parse search response")?;
        let urls: Vec<String> = body
            .organic
            .into_iter()
            .filter_map(|r| r.link)
            .take(count)
            .collect();
        info!("search: {} result(s) for {:?}", urls.len(), query);
        Ok(urls)
    }
}

/// Keyless search through DuckDuckGo's HTML interface
pub struct DuckDuckGoSearch {
    endpoint: String,
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            endpoint: DUCKDUCKGO_URL.to_string(),
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .context("search request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("search failed with status {}", status);
        }

        let html = response.text().await.context("failed to read search results")?;
        let urls = parse_duckduckgo_results(&html, count);
        info!("search: {} result(s) for {:?}", urls.len(), query);
        Ok(urls)
    }
}

/// Result links of a DuckDuckGo HTML page.
pub fn parse_duckduckgo_results(html: &str, count: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.result__url") else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_duckduckgo_href(href) else {
            debug!("search: skipping result link {}", href);
            continue;
        };
        if !urls.contains(&resolved) {
            urls.push(resolved);
        }
        if urls.len() >= count {
            break;
        }
    }
    urls
}

/// Result hrefs are either direct links or `/l/?uddg=<encoded target>` redirects.
fn resolve_duckduckgo_href(href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        if let Ok(parsed) = url::Url::parse(href) {
            if parsed.path().starts_with("/l/") {
                return parsed
                    .query_pairs()
                    .find(|(k, _)| k == "uddg")
                    .map(|(_, v)| v.into_owned());
            }
        }
        return Some(href.to_string());
    }
    if href.starts_with("//") {
        return resolve_duckduckgo_href(&format!("https:{}", href));
    }
    None
}

/// Site-restricted variant of a query, e.g. `q (site:a.org OR site:b.com)`.
pub fn site_restricted_query(query: &str, domains: &[String]) -> String {
    let sites: Vec<String> = domains.iter().map(|d| format!("site:{}", d)).collect();
    format!("{} ({})", query, sites.join(" OR "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_and_redirect_links() {
        let html = r#"
            <html><body>
              <a class="result__url" href="https://example.com/a">example.com/a</a>
              <a class="result__url" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fnews.org%2Fstory&rut=x">news.org</a>
              <a class="result__url" href="https://example.com/a">dup</a>
              <a class="result__url" href="/relative">nope</a>
              <a class="other" href="https://ignored.com">ignored</a>
              <a class="result__url" href="https://third.net/">third</a>
            </body></html>
        "#;
        let urls = parse_duckduckgo_results(html, 10);
        assert_eq!(
            urls,
            vec!["https://example.com/a", "https://news.org/story", "https://third.net/"]
        );
        assert_eq!(parse_duckduckgo_results(html, 1).len(), 1);
    }

    #[test]
    fn builds_site_restricted_query() {
        let q = site_restricted_query("fusion power", &["arxiv.org".to_string(), "bbc.com".to_string()]);
        assert_eq!(q, "fusion power (site:arxiv.org OR site:bbc.com)");
    }

    #[tokio::test]
    async fn serper_without_key_is_a_configuration_error() {
        let search = SerperSearch::new(None, Duration::from_secs(1)).expect("client");
        let err = search.search("anything", 3).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResearchError>(),
            Some(ResearchError::Configuration(_))
        ));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = SearchConfig {
            provider: "altavista".to_string(),
            ..Default::default()
        };
        assert!(from_config(&config, "ua").is_err());
    }
}
