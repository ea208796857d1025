use researchscope::llm::remote::RemoteLlmProvider;
use researchscope::llm::LlmProvider;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let Some(api_key) = common::api_key_from_env("OPENAI_API_KEY") else {
        eprintln!("Set OPENAI_API_KEY to run the LLM smoke test");
        std::process::exit(2);
    };

    let base_url =
        std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

    println!("\n{}", "=".repeat(60));
    println!("Testing LLM Provider");
    println!("Base URL: {}", base_url);
    println!("Model: {}", model);
    println!("{}", "=".repeat(60));

    let provider = RemoteLlmProvider::new(&base_url, &api_key, &model).with_defaults(30, 500, 0.7);

    let article = "Germany's parliament approved a plan on Thursday to expand offshore wind capacity \
                   to 30 gigawatts by 2030. Economy minister Robert Habeck said the North Sea projects \
                   would cut reliance on imported gas, while industry groups in Hamburg warned that grid \
                   connections are lagging behind turbine construction.";

    println!("\n[1] Summarize");
    match provider.summarize(article, 60, 20).await {
        Ok(summary) => println!("✓ {}", summary),
        Err(e) => eprintln!("✗ {:#}", e),
    }

    println!("\n[2] Entities");
    match provider.extract_entities(article).await {
        Ok(entities) => {
            for e in entities {
                println!("  {} ({})", e.text, e.label);
            }
        }
        Err(e) => eprintln!("✗ {:#}", e),
    }

    println!("\n[3] Sentiment");
    match provider.analyze_sentiment(article).await {
        Ok(s) => println!("✓ {} ({:.2})", s.label, s.score),
        Err(e) => eprintln!("✗ {:#}", e),
    }

    println!("\n[4] Noun phrases");
    match provider.noun_phrases(article).await {
        Ok(phrases) => println!("✓ {}", phrases.join(", ")),
        Err(e) => eprintln!("✗ {:#}", e),
    }

    println!("\n[5] Embedding");
    match provider.embed(article).await {
        Ok(v) => println!("✓ {} dimensions", v.len()),
        Err(e) => eprintln!("✗ {:#}", e),
    }
}
