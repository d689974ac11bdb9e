mod common;

use httpmock::prelude::*;
use serde_json::{json, Value};

use common::configured_tester;

const DATA_SOURCE: &str = "gitlab_users";

fn api_user(id: i64, username: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "name": username,
        "state": "active",
        "avatar_url": null,
        "created_at": "2024-01-01T00:00:00.000Z"
    })
}

#[tokio::test]
async fn test_collects_every_page() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v4/users")
                .query_param("search", "ds-acctest-")
                .query_param("sort", "desc")
                .query_param("order_by", "name")
                .query_param("per_page", "100")
                .query_param("page", "1");
            then.status(200)
                .header("x-next-page", "2")
                .json_body(json!([api_user(3, "ds-acctest-c"), api_user(2, "ds-acctest-b")]));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v4/users")
                .query_param("search", "ds-acctest-")
                .query_param("page", "2");
            then.status(200)
                .header("x-next-page", "")
                .json_body(json!([api_user(1, "ds-acctest-a")]));
        })
        .await;

    let tester = configured_tester(&server).await;
    let config = json!({"search": "ds-acctest-", "sort": "desc", "order_by": "name"});
    tester
        .validate_data_source_config(DATA_SOURCE, config.clone())
        .await
        .unwrap();

    let state = tester.read_data_source(DATA_SOURCE, config.clone()).await.unwrap();
    first.assert_async().await;
    second.assert_async().await;

    let users = state["users"].as_array().unwrap();
    assert_eq!(users.len(), 3);
    assert_eq!(users[0]["username"], "ds-acctest-c");
    assert_eq!(users[2]["id"], 1);
    assert_eq!(state["search"], "ds-acctest-");

    let again = tester.read_data_source(DATA_SOURCE, config).await.unwrap();
    assert_eq!(state["id"], again["id"]);
    assert_eq!(state["id"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_unset_filters_are_not_sent() {
    let server = MockServer::start_async().await;
    let list = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v4/users")
                .query_param("blocked", "true")
                .matches(|req| {
                    let query = req.query_params.clone().unwrap_or_default();
                    !query.iter().any(|(name, _)| name == "search" || name == "active")
                });
            then.status(200).json_body(json!([]));
        })
        .await;

    let tester = configured_tester(&server).await;
    let state = tester
        .read_data_source(DATA_SOURCE, json!({"blocked": true, "search": null}))
        .await
        .unwrap();

    list.assert_async().await;
    assert_eq!(state["users"], json!([]));
}

#[tokio::test]
async fn test_invalid_sort_rejected() {
    let server = MockServer::start_async().await;
    let tester = configured_tester(&server).await;
    assert!(tester
        .validate_data_source_config(DATA_SOURCE, json!({"sort": "sideways"}))
        .await
        .is_err());
}

#[tokio::test]
async fn test_repeated_next_page_stops_listing() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v4/users").query_param("page", "1");
            then.status(200)
                .header("x-next-page", "2")
                .json_body(json!([api_user(1, "a")]));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v4/users").query_param("page", "2");
            then.status(200)
                .header("x-next-page", "2")
                .json_body(json!([api_user(2, "b")]));
        })
        .await;

    let tester = configured_tester(&server).await;
    let state = tester.read_data_source(DATA_SOURCE, json!({})).await.unwrap();

    assert_eq!(first.hits_async().await, 1);
    assert_eq!(second.hits_async().await, 1);
    assert_eq!(state["users"].as_array().unwrap().len(), 2);
}
