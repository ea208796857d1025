use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::text;

/// Number of frequency keywords derived when a page declares none.
const DERIVED_KEYWORDS: usize = 10;

/// Fetches the HTML of a page
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

/// Plain HTTP page source
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.context("failed to fetch article page")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("article fetch failed with status: {}", status));
        }

        response.text().await.context("failed to read response body")
    }
}

/// Structured fields extracted from one HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    pub text: String,
    pub keywords: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub authors: Vec<String>,
}

/// Parse a fetched page into title, body text, keywords, date and authors.
///
/// The body comes from readability; when that finds nothing the usual content
/// containers are tried, then all paragraphs.
pub fn parse_article(url: &str, html: &str) -> Result<ParsedPage> {
    let url_obj = url::Url::parse(url).context("failed to parse article URL")?;
    let document = Html::parse_document(html);

    let mut reader = Cursor::new(html.as_bytes());
    let (readable_title, body) = match readability::extractor::extract(&mut reader, &url_obj) {
        Ok(product) => {
            // Convert HTML to Markdown for cleaner LLM input
            let text = match html2text::from_read(product.content.as_bytes(), 120) {
                Ok(markdown) => markdown,
                Err(e) => {
                    warn!("scraping: failed to convert extracted HTML to text: {}", e);
                    product.text
                }
            };
            (product.title, text)
        }
        Err(e) => {
            warn!("scraping: readability failed for {}: {}", url, e);
            (String::new(), String::new())
        }
    };

    let body = if body.trim().is_empty() {
        fallback_body(&document).unwrap_or_default()
    } else {
        body
    };
    info!("scraping: extracted {} chars from {}", body.len(), url);

    let title = Some(readable_title.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&document, "meta[property=\"og:title\"]"))
        .or_else(|| first_text(&document, "title"))
        .unwrap_or_default();

    let mut keywords: Vec<String> = meta_content(&document, "meta[name=\"keywords\"]")
        .map(|k| {
            k.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if keywords.is_empty() {
        keywords = text::frequent_terms(&body, DERIVED_KEYWORDS);
    }

    Ok(ParsedPage {
        title,
        text: body,
        keywords,
        publish_date: publish_date(&document),
        authors: authors(&document),
    })
}

fn fallback_body(document: &Html) -> Option<String> {
    let selectors = ["article", "main", ".post-content", ".entry-content", "#content"];

    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                if let Ok(markdown) = html2text::from_read(element.html().as_bytes(), 120) {
                    if !markdown.trim().is_empty() {
                        debug!("scraping: found content using selector '{}'", selector_str);
                        return Some(markdown);
                    }
                }
            }
        }
    }

    // Fallback: just get all paragraphs
    let p_selector = Selector::parse("p").ok()?;
    let mut full_html = String::new();
    for element in document.select(&p_selector) {
        full_html.push_str(&element.html());
        full_html.push('\n');
    }
    if full_html.is_empty() {
        return None;
    }
    html2text::from_read(full_html.as_bytes(), 120).ok()
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
}

fn publish_date(document: &Html) -> Option<DateTime<Utc>> {
    let candidates = [
        "meta[property=\"article:published_time\"]",
        "meta[name=\"pubdate\"]",
        "meta[name=\"publish-date\"]",
        "meta[name=\"date\"]",
        "meta[itemprop=\"datePublished\"]",
    ];
    let from_meta = candidates
        .iter()
        .filter_map(|s| meta_content(document, s))
        .find_map(|v| parse_date(&v));
    if from_meta.is_some() {
        return from_meta;
    }

    let selector = Selector::parse("time[datetime]").ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("datetime"))
        .find_map(parse_date)
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let date_part = value.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn authors(document: &Html) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for selector in ["meta[name=\"author\"]", "meta[property=\"article:author\"]"] {
        if let Ok(sel) = Selector::parse(selector) {
            for el in document.select(&sel) {
                if let Some(content) = el.value().attr("content") {
                    push_authors(&mut found, content);
                }
            }
        }
    }
    if let Ok(sel) = Selector::parse("[rel=\"author\"]") {
        for el in document.select(&sel) {
            push_authors(&mut found, &el.text().collect::<String>());
        }
    }
    found
}

fn push_authors(found: &mut Vec<String>, raw: &str) {
    let raw = raw.trim();
    // Profile URLs are not names
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return;
    }
    for name in raw.split([',', ';']).flat_map(|s| s.split(" and ")) {
        let name = name.trim().trim_start_matches("By ").trim_start_matches("by ").trim();
        if !name.is_empty() && !found.iter().any(|f| f.eq_ignore_ascii_case(name)) {
            found.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Vaccine trial results | Example News</title>
  <meta name="keywords" content="vaccines, clinical trials ,health">
  <meta name="author" content="Jane Doe and John Roe">
  <meta property="article:published_time" content="2024-03-05T10:30:00Z">
</head>
<body>
  <nav><a href="/">Home</a></nav>
  <article>
    <h1>Vaccine trial results</h1>
    <p>The phase three trial enrolled thirty thousand volunteers across twelve countries and
    reported strong protection against severe disease during the six month follow-up period.</p>
    <p>Researchers said the efficacy estimate held across age groups, although confidence
    intervals were wider for participants over seventy five years old.</p>
    <p>Regulators are expected to review the full dataset before the end of the year.</p>
  </article>
</body>
</html>"#;

    #[test]
    fn parses_metadata_and_body() {
        let parsed = parse_article("https://news.example.com/vaccines/trial", PAGE).expect("parse");
        assert!(parsed.title.contains("Vaccine trial results"));
        assert!(parsed.text.contains("thirty thousand volunteers"));
        assert_eq!(parsed.keywords, vec!["vaccines", "clinical trials", "health"]);
        assert_eq!(parsed.authors, vec!["Jane Doe", "John Roe"]);
        assert_eq!(
            parsed.publish_date.map(|d| d.to_rfc3339()),
            Some("2024-03-05T10:30:00+00:00".to_string())
        );
    }

    #[test]
    fn derives_keywords_when_page_declares_none() {
        let html = "<html><head><title>T</title></head><body><article>\
                    <p>Fusion reactors need plasma. Plasma confinement is hard. Fusion research continues.</p>\
                    </article></body></html>";
        let parsed = parse_article("https://example.org/fusion", html).expect("parse");
        assert_eq!(parsed.keywords.first().map(String::as_str), Some("fusion"));
        assert!(parsed.keywords.contains(&"plasma".to_string()));
        assert!(parsed.publish_date.is_none());
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(parse_article("not a url", PAGE).is_err());
    }

    #[test]
    fn parses_plain_dates() {
        assert!(parse_date("2023-11-02").is_some());
        assert!(parse_date("2023-11-02 14:00").is_some());
        assert!(parse_date("yesterday").is_none());
    }
}
