use thiserror::Error;

/// Failure taxonomy of a research run.
///
/// Pipeline functions return `anyhow::Result` and wrap these variants with
/// context; the orchestrator recovers the variant with `downcast_ref` to decide
/// whether a failure is isolated to one item or aborts the run.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Missing credential or unusable configuration. Aborts the run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network or parse failure for a single URL.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: FetchFailure },

    /// A single enrichment or synthesis sub-task failed.
    #[error("{task} failed: {reason}")]
    Model { task: &'static str, reason: String },

    /// Quota exhaustion persisted through every backoff attempt. Aborts the run.
    #[error("rate limit still exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },
}

/// Why a candidate URL produced no article.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchFailure {
    #[error("URL is not well-formed")]
    InvalidUrl,
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("page has no usable text")]
    EmptyBody,
}

impl ResearchError {
    /// Whether this failure must abort the whole run rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::RateLimited { .. })
    }

    /// Looks through an `anyhow` chain for a fatal `ResearchError`.
    pub fn is_fatal_error(err: &anyhow::Error) -> bool {
        err.chain()
            .filter_map(|cause| cause.downcast_ref::<ResearchError>())
            .any(ResearchError::is_fatal)
    }
}
