use camarabot::config::ApiSettings;
use camarabot::{ApiClient, Error};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer, max_attempts: u32) -> ApiSettings {
    ApiSettings {
        base_url: server.uri(),
        timeout_secs: 1,
        max_attempts,
        backoff_multiplier_secs: 0,
        backoff_max_secs: 0,
        pause_every: 0,
        pause_for_secs: 0,
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: i64,
}

#[tokio::test]
async fn test_timeout_is_retried_until_attempts_run_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proposicoes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"dados": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let api = ApiClient::new(&settings(&server, 2)).unwrap();
    let result = api.get_dados::<Vec<Item>>("proposicoes", &[]).await;

    assert!(matches!(result, Err(Error::Timeout { .. })), "got {:?}", result);
    assert_eq!(api.requests_issued(), 2);
}

#[tokio::test]
async fn test_http_error_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/votacoes/123-4"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&settings(&server, 3)).unwrap();
    let result = api.get_dados::<serde_json::Value>("votacoes/123-4", &[]).await;

    match result {
        Err(Error::Api { status, url }) => {
            assert_eq!(status, 500);
            assert!(url.ends_with("/votacoes/123-4"));
        }
        other => panic!("expected an API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_dados_is_a_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deputados"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"links": []})))
        .mount(&server)
        .await;

    let api = ApiClient::new(&settings(&server, 3)).unwrap();
    let result = api.get_dados::<Vec<Item>>("deputados", &[]).await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let listed: Vec<Item> = api.get_list("deputados", &[]).await;
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_listing_failure_degrades_to_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proposicoes"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let api = ApiClient::new(&settings(&server, 3)).unwrap();
    let listed: Vec<Item> = api.get_list("proposicoes", &[]).await;
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_pages_stop_on_short_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proposicoes"))
        .and(query_param("pagina", "1"))
        .and(query_param("itens", "2"))
        .and(query_param("ano", "2024"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": [{"id": 1}, {"id": 2}]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/proposicoes"))
        .and(query_param("pagina", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": [{"id": 3}]})))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&settings(&server, 1)).unwrap();
    let items: Vec<Item> = api
        .get_pages("proposicoes", &[("ano", "2024".to_string())], 2, None)
        .await
        .unwrap();

    assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }, Item { id: 3 }]);
}

#[tokio::test]
async fn test_pages_stop_at_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/votacoes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": [{"id": 7}, {"id": 8}]})))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&settings(&server, 1)).unwrap();
    let items: Vec<Item> = api.get_pages("votacoes", &[], 2, Some(1)).await.unwrap();
    assert_eq!(items, vec![Item { id: 7 }]);
}
