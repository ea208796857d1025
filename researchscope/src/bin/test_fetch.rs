use researchscope::scraping::{self, HttpPageSource, PageSource};
use researchscope::text;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    let urls = if urls.is_empty() {
        vec![
            "https://en.wikipedia.org/wiki/Rust_(programming_language)".to_string(),
            "https://www.bbc.com/news".to_string(),
        ]
    } else {
        urls
    };

    let source = match HttpPageSource::new(20, "Researchscope/0.1.0") {
        Ok(s) => s,
        Err(e) => {
            println!("✗ Cannot build HTTP client: {:#}", e);
            return;
        }
    };

    for url in urls {
        println!("\n{}", "=".repeat(60));
        println!("Testing: {}", url);
        println!("{}", "=".repeat(60));

        let html = match source.fetch_html(&url).await {
            Ok(html) => html,
            Err(e) => {
                println!("✗ Fetch failed: {:#}", e);
                continue;
            }
        };

        match scraping::parse_article(&url, &html) {
            Ok(page) => {
                let cleaned = text::clean_text(&page.text);
                println!("✓ Success!");
                println!("  Title: {}", page.title);
                println!("  Authors: {}", page.authors.join(", "));
                println!("  Published: {:?}", page.publish_date);
                println!("  Keywords: {}", page.keywords.join(", "));
                println!("  Text: {} chars ({} after cleaning)", page.text.len(), cleaned.len());
                let preview: String = cleaned.chars().take(300).collect();
                println!("\n  {}...", preview);
            }
            Err(e) => {
                println!("✗ Parse failed: {:#}", e);
            }
        }
    }
}
