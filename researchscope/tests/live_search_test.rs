// Hits the real search API; run with `cargo test -- --ignored` and SERPER_API_KEY in .env
use researchscope::search::{SearchProvider, SerperSearch};
use std::time::Duration;

#[tokio::test]
#[ignore]
async fn test_live_serper_search() {
    dotenv::dotenv().ok();
    let Some(key) = common::api_key_from_env("SERPER_API_KEY") else {
        eprintln!("SERPER_API_KEY not set, skipping");
        return;
    };

    let search = SerperSearch::new(Some(key), Duration::from_secs(15)).expect("client");
    let urls = search.search("renewable energy storage", 3).await.expect("live search");
    assert!(!urls.is_empty());
    assert!(urls.len() <= 3);
    assert!(urls.iter().all(|u| u.starts_with("http")));
}
