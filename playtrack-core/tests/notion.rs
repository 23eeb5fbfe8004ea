use playtrack_core::{ApiErrorClass, NotionClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> NotionClient {
    NotionClient::with_base_url(&server.uri(), "secret-token", "db-1").unwrap()
}

#[tokio::test]
async fn query_database_sends_auth_and_version_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/databases/db-1/query"))
        .and(header("authorization", "Bearer secret-token"))
        .and(header("notion-version", "2022-06-28"))
        .and(body_partial_json(json!({ "page_size": 100 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "results": [
                {
                    "object": "page",
                    "id": "page-1",
                    "properties": { "App ID": { "type": "number", "number": 440 } }
                }
            ],
            "has_more": true,
            "next_cursor": "cursor-2"
        })))
        .mount(&server)
        .await;

    let page = client_for(&server).query_database(None, 100).await.unwrap();

    assert!(page.has_more);
    assert_eq!(page.next_cursor.as_deref(), Some("cursor-2"));
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].number_id("App ID"), Some(440));
}

#[tokio::test]
async fn query_database_forwards_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/databases/db-1/query"))
        .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client_for(&server)
        .query_database(Some("cursor-2"), 100)
        .await
        .unwrap();

    assert!(!page.has_more);
    assert!(page.results.is_empty());
}

#[tokio::test]
async fn create_page_targets_database_parent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_partial_json(json!({
            "parent": { "database_id": "db-1" },
            "properties": { "App ID": { "number": 620 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "page",
            "id": "new-page"
        })))
        .mount(&server)
        .await;

    let mut properties = serde_json::Map::new();
    properties.insert("App ID".into(), json!({ "number": 620 }));
    let page_id = client_for(&server).create_page(properties).await.unwrap();

    assert_eq!(page_id.as_deref(), Some("new-page"));
}

#[tokio::test]
async fn update_page_uses_patch() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/pages/page-9"))
        .and(body_partial_json(json!({
            "properties": { "Session Count": { "number": 3 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "page-9" })))
        .mount(&server)
        .await;

    let mut properties = serde_json::Map::new();
    properties.insert("Session Count".into(), json!({ "number": 3 }));
    let page_id = client_for(&server)
        .update_page("page-9", properties)
        .await
        .unwrap();

    assert_eq!(page_id.as_deref(), Some("page-9"));
}

#[tokio::test]
async fn successful_write_without_page_id_is_still_ok() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "page" })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/pages/page-9"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let created = client.create_page(serde_json::Map::new()).await.unwrap();
    let updated = client
        .update_page("page-9", serde_json::Map::new())
        .await
        .unwrap();

    assert_eq!(created, None);
    assert_eq!(updated, None);
}

#[tokio::test]
async fn rejected_write_keeps_response_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"code":"validation_error"}"#),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_page(serde_json::Map::new())
        .await
        .unwrap_err();

    assert_eq!(err.classification(), Some(ApiErrorClass::Permanent));
    assert!(err.to_string().contains("validation_error"));
}
