use researchscope::error::ResearchError;
use researchscope::search::{SearchProvider, SerperSearch};
use std::time::Duration;

#[tokio::test]
async fn test_serper_returns_organic_links() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("x-api-key", "serper-key")
        .match_body(mockito::Matcher::PartialJsonString(r#"{"q": "heat pumps", "num": 2}"#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"organic": [
                {"link": "https://a.example/heat"},
                {"title": "no link here"},
                {"link": "https://b.example/pumps"},
                {"link": "https://c.example/extra"}
            ]}"#,
        )
        .create_async()
        .await;

    let search = SerperSearch::new(Some("serper-key".to_string()), Duration::from_secs(5))
        .expect("client")
        .with_endpoint(server.url());
    let urls = search.search("heat pumps", 2).await.expect("search");
    assert_eq!(urls, vec!["https://a.example/heat", "https://b.example/pumps"]);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_serper_without_key_is_a_configuration_error() {
    let search = SerperSearch::new(None, Duration::from_secs(5)).expect("client");
    let err = search.search("anything", 5).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ResearchError>(),
        Some(ResearchError::Configuration(_))
    ));
    assert!(ResearchError::is_fatal_error(&err));
}

#[tokio::test]
async fn test_serper_http_error_is_not_fatal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .with_body("unavailable")
        .create_async()
        .await;

    let search = SerperSearch::new(Some("k".to_string()), Duration::from_secs(5))
        .expect("client")
        .with_endpoint(server.url());
    let err = search.search("anything", 5).await.unwrap_err();
    assert!(err.to_string().contains("503"));
    assert!(!ResearchError::is_fatal_error(&err));
}
