mod helpers;

use std::sync::Arc;

use axum::http::StatusCode;
use sentiment_space::export::{DirectorySink, ExportSink};
use sentiment_space::inference::TextGenerator;
use serde_json::json;

#[tokio::test]
async fn analyze_returns_created_record() {
    let app = helpers::ready_app();
    let body = helpers::analyze(&app.router, "What a great morning run along the river").await;

    assert!(body["id"].as_i64().unwrap() > 0);
    assert_eq!(body["raw_text"], "What a great morning run along the river");
    assert_eq!(body["summary"], "A short summary.");
    assert_eq!(body["sentiment"], "positive");
    assert_eq!(body["confidence"], 0.84);
    assert!(body["created_at"].is_string());
    assert!(body.get("updated_at").is_none());
}

#[tokio::test]
async fn ids_strictly_increase() {
    let app = helpers::ready_app();
    let mut last = 0;
    for text in ["first thought", "second thought", "third thought"] {
        let id = helpers::analyze(&app.router, text).await["id"].as_i64().unwrap();
        assert!(id > last, "{id} should exceed {last}");
        last = id;
    }
}

#[tokio::test]
async fn sentiment_and_confidence_are_both_present_or_both_null() {
    let app = helpers::ready_app();
    helpers::analyze(&app.router, "an awful commute this morning").await;
    let degraded = helpers::unavailable_app();
    helpers::analyze(&degraded.router, "hello").await;

    for router in [&app.router, &degraded.router] {
        let (_, body) = helpers::get(router, "/entries").await;
        for entry in body["entries"].as_array().unwrap() {
            assert_eq!(entry["sentiment"].is_null(), entry["confidence"].is_null());
            if let Some(c) = entry["confidence"].as_f64() {
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }
}

#[tokio::test]
async fn unavailable_model_degrades_to_placeholder() {
    let app = helpers::unavailable_app();
    let body = helpers::analyze(&app.router, "hello").await;

    assert!(body["summary"].is_null());
    assert!(body["sentiment"].is_null());
    assert!(body["confidence"].is_null());

    let (status, listing) = helpers::get(&app.router, "/entries").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["entries"][0]["id"], body["id"]);
    assert_eq!(listing["entries"][0]["raw_text"], "hello");
}

#[tokio::test]
async fn empty_text_is_rejected_without_writing() {
    let app = helpers::ready_app();
    let before = app.store.count(None).await.unwrap();

    for payload in [json!({"raw_text": ""}), json!({"raw_text": "   \n"}), json!({})] {
        let (status, body) = helpers::post_json(&app.router, "/analyze", payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    assert_eq!(app.store.count(None).await.unwrap(), before);
    // Validation happens before the model is touched.
    assert_eq!(app.gateway.load_attempts(), 0);
}

#[tokio::test]
async fn oversized_text_is_rejected() {
    let app = helpers::ready_app();
    let text = "a".repeat(10_001);
    let (status, _) = helpers::post_json(&app.router, "/analyze", json!({ "raw_text": text })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn mid_generation_failure_is_a_server_error() {
    let loader = || -> anyhow::Result<Box<dyn TextGenerator>> { Ok(Box::new(helpers::FailingGenerator)) };
    let app = helpers::test_app(Arc::new(loader), None);

    let (status, body) = helpers::post_json(
        &app.router,
        "/analyze",
        json!({"raw_text": "a thought long enough to summarize"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INFERENCE_ERROR");
    assert_eq!(app.store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn pagination_returns_third_and_fourth_newest() {
    let app = helpers::ready_app();
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(helpers::analyze(&app.router, &format!("entry number {i}")).await["id"].as_i64().unwrap());
    }

    let (status, body) = helpers::get(&app.router, "/entries?limit=2&offset=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 5);
    let got: Vec<i64> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_i64().unwrap())
        .collect();
    assert_eq!(got, vec![ids[2], ids[1]]);
}

#[tokio::test]
async fn listing_is_idempotent() {
    let app = helpers::ready_app();
    for text in ["one great day", "an awful night", "plain tuesday"] {
        helpers::analyze(&app.router, text).await;
    }

    let first = helpers::get(&app.router, "/entries?limit=10").await;
    let second = helpers::get(&app.router, "/entries?limit=10").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn sentiment_filter_returns_matching_newest_first() {
    let app = helpers::ready_app();
    helpers::analyze(&app.router, "a great lunch with friends").await;
    helpers::analyze(&app.router, "an awful migraine all day").await;
    helpers::analyze(&app.router, "great news about the move").await;
    helpers::analyze(&app.router, "the bus was on time").await;

    let (status, body) = helpers::get(&app.router, "/entries?sentiment=positive").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["sentiment"] == "positive"));
    assert_eq!(entries[0]["raw_text"], "great news about the move");
    assert_eq!(entries[1]["raw_text"], "a great lunch with friends");
    assert!(entries[0]["created_at"].as_str() >= entries[1]["created_at"].as_str());
}

#[tokio::test]
async fn invalid_listing_parameters_are_rejected() {
    let app = helpers::ready_app();
    for uri in [
        "/entries?limit=-1",
        "/entries?offset=-5",
        "/entries?limit=abc",
        "/entries?sentiment=ecstatic",
    ] {
        let (status, body) = helpers::get(&app.router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{uri}");
    }
}

#[tokio::test]
async fn offset_past_end_is_empty_page() {
    let app = helpers::ready_app();
    helpers::analyze(&app.router, "only entry").await;
    let (status, body) = helpers::get(&app.router, "/entries?offset=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_on_cold_gateway_load_once() {
    let app = helpers::ready_app();
    assert_eq!(app.gateway.state().label(), "unloaded");

    let mut handles = Vec::new();
    for i in 0..16 {
        let router = app.router.clone();
        handles.push(tokio::spawn(async move {
            helpers::post_json(&router, "/analyze", json!({ "raw_text": format!("concurrent thought {i}") })).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(!body["sentiment"].is_null());
        ids.push(body["id"].as_i64().unwrap());
    }

    assert_eq!(app.gateway.load_attempts(), 1);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(app.store.count(None).await.unwrap(), 16);
}

#[tokio::test]
async fn stats_counts_by_label() {
    let app = helpers::ready_app();
    helpers::analyze(&app.router, "great").await;
    helpers::analyze(&app.router, "awful").await;
    helpers::analyze(&app.router, "great day out").await;

    let (status, body) = helpers::get(&app.router, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["sentiment_distribution"]["positive"], 2);
    assert_eq!(body["sentiment_distribution"]["negative"], 1);
}

#[tokio::test]
async fn get_entry_by_id() {
    let app = helpers::ready_app();
    let created = helpers::analyze(&app.router, "look me up later").await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = helpers::get(&app.router, &format!("/entries/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, created);
}

#[tokio::test]
async fn model_reload_retries_failed_load() {
    let app = helpers::unavailable_app();
    helpers::analyze(&app.router, "hello").await;
    assert_eq!(app.gateway.load_attempts(), 1);

    let (status, body) = helpers::post_json(&app.router, "/model/reload", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], false);
    assert!(body["reason"].as_str().unwrap().contains("weights not found"));
    assert_eq!(body["status"]["load_attempts"], 2);
}

#[tokio::test]
async fn export_disabled_is_forbidden() {
    let app = helpers::ready_app();
    let (status, body) = helpers::post_json(&app.router, "/export", json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "EXPORT_DISABLED");
}

#[tokio::test]
async fn export_selected_thoughts() {
    let tmp = tempfile::TempDir::new().unwrap();
    let sink: Arc<dyn ExportSink> = Arc::new(DirectorySink::new(tmp.path(), "exports"));
    let app = helpers::test_app(Arc::new(helpers::CountingLoader::ready()), Some(sink));

    let a = helpers::analyze(&app.router, "first").await["id"].as_i64().unwrap();
    helpers::analyze(&app.router, "second").await;
    let c = helpers::analyze(&app.router, "third").await["id"].as_i64().unwrap();

    let (status, body) =
        helpers::post_json(&app.router, "/export", json!({"thought_ids": [a, c, 9999]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["thought_count"], 2);

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(body["location"].as_str().unwrap()).unwrap()).unwrap();
    assert_eq!(written["thoughts"][0]["id"], a);
    assert_eq!(written["thoughts"][1]["id"], c);

    let (status, body) = helpers::post_json(&app.router, "/export", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["thought_count"], 3);
}

#[tokio::test]
async fn storage_failure_is_500_and_service_keeps_running() {
    let conn = helpers::test_db();
    conn.pragma_update(None, "query_only", "ON").unwrap();
    let app = helpers::test_app_with_db(conn, Arc::new(helpers::CountingLoader::ready()), None);

    let (status, body) =
        helpers::post_json(&app.router, "/analyze", json!({"raw_text": "a great day"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "STORAGE_ERROR");
    assert!(body["error"]["message"].is_string());

    let (status, body) = helpers::get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    // Reads still go through the same connection.
    let (status, body) = helpers::get(&app.router, "/entries").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}
