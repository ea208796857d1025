// Chunked summarization
use anyhow::{Context, Result};
use tracing::{debug, info};

use super::LlmProvider;

/// Length bounds and chunk budget for one summarization pass
#[derive(Debug, Clone, Copy)]
pub struct SummaryParams {
    pub chunk_max_words: usize,
    pub max_length: usize,
    pub min_length: usize,
}

/// Split text into sentences, keeping terminal punctuation.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or end of text.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Group sentences into chunks of at most `max_words` words.
///
/// Chunks never split a sentence; a sentence longer than the budget becomes a
/// chunk of its own.
pub fn chunk_text(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.split_whitespace().count();
        if !current.is_empty() && current_len + sentence_len > max_words {
            chunks.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
        current.push(sentence);
        current_len += sentence_len;
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Summarize each chunk independently and join the results in reading order.
///
/// Fails as a whole if any chunk fails; callers decide on the fallback.
pub async fn summarize_chunked<P: LlmProvider + ?Sized>(
    provider: &P,
    text: &str,
    params: SummaryParams,
) -> Result<String> {
    let chunks = chunk_text(text, params.chunk_max_words);
    if chunks.is_empty() {
        return Ok(String::new());
    }

    debug!("Summarizing {} chunk(s)", chunks.len());
    let mut summaries = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let summary = provider
            .summarize(chunk, params.max_length, params.min_length)
            .await
            .with_context(|| format!("summarizing chunk {}/{}", i + 1, chunks.len()))?;
        summaries.push(summary.trim().to_string());
    }

    let joined = summaries.join(" ");
    info!("LLM summarization successful: {} chunk(s), {} chars", chunks.len(), joined.len());
    Ok(joined)
}

/// Fallback extractive summary when the LLM fails: the leading sentences up to
/// `max_words` words.
pub fn extractive_summary(text: &str, max_words: usize) -> String {
    let mut picked = Vec::new();
    let mut words = 0;
    for sentence in split_sentences(text) {
        let len = sentence.split_whitespace().count();
        if !picked.is_empty() && words + len > max_words {
            break;
        }
        words += len;
        picked.push(sentence);
    }
    truncate_words(&picked.join(" "), max_words)
}

fn truncate_words(s: &str, max_words: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= max_words {
        s.to_string()
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        let text = "First one. Second one! Third? Version 1.5 is out. trailing";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third?", "Version 1.5 is out.", "trailing"]
        );
    }

    #[test]
    fn test_chunks_respect_sentence_boundaries() {
        let text = "one two three. four five six. seven eight. nine.";
        let chunks = chunk_text(text, 5);
        assert_eq!(chunks, vec!["one two three.", "four five six. seven eight.", "nine."]);
        for chunk in &chunks {
            assert!(chunk.ends_with('.'));
        }
    }

    #[test]
    fn test_oversized_sentence_is_its_own_chunk() {
        let long = "word ".repeat(20).trim().to_string() + ".";
        let text = format!("Short start. {} Short end.", long);
        let chunks = chunk_text(&text, 5);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "Short start.");
        assert_eq!(chunks[1], long);
        assert_eq!(chunks[2], "Short end.");
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("   ", 10).is_empty());
    }

    #[test]
    fn test_extractive_summary() {
        let text = "First sentence is the headline. Second sentence is a bullet. \
                    Third sentence is another bullet.";
        let summary = extractive_summary(text, 10);
        assert_eq!(summary, "First sentence is the headline. Second sentence is a bullet.");
    }

    #[test]
    fn test_extractive_summary_truncation() {
        let long_sentence = "a ".repeat(150);
        let summary = extractive_summary(&format!("{}. Second sentence.", long_sentence.trim()), 100);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.trim_end_matches("...").split_whitespace().count(), 100);
    }
}
