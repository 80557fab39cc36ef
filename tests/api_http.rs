// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /opportunities/score (+ filter, limit, bad weights/bounds)
// - POST /opportunities/research (static provider)
// - POST /niche/analyze, POST /competitors/analyze, POST /competitors/research
// - one undecodable record in a batch is skipped, not fatal
// - POST /tasks/opportunities + GET /tasks/{id}
// - GET /local/* → 501
// - GET /metrics

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use seo_opportunity_engine::config::EngineConfig;
use seo_opportunity_engine::metrics::Metrics;
use seo_opportunity_engine::competitive::{SerpResult, SerpSnapshot};
use seo_opportunity_engine::provider::StaticProvider;
use seo_opportunity_engine::store::InMemoryTaskStore;
use seo_opportunity_engine::{api, AppState, KeywordRecord, MetricSet};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn test_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    // Never pick up a weights file from the working directory.
    cfg.paths.weights_file = "target/__no_such_weights__.json".into();
    cfg
}

/// Build the same Router the binary uses, with an in-memory store and a
/// small static provider.
fn test_router() -> Router {
    let provider = StaticProvider::new(
        vec![
            KeywordRecord::new("running shoes", MetricSet::new(40_000).difficulty(70).cpc(1.8)),
            KeywordRecord::new("trail running shoes", MetricSet::new(6_000).difficulty(25).cpc(1.1)),
        ],
        vec![SerpSnapshot {
            keyword: "running shoes".into(),
            search_volume: 40_000,
            results: vec![
                SerpResult {
                    domain: "https://www.nike.com/running".into(),
                    position: 1,
                },
                SerpResult {
                    domain: "mysite.com".into(),
                    position: 6,
                },
            ],
        }],
    );
    let state = AppState::new(
        test_config(),
        Arc::new(InMemoryTaskStore::new(chrono::Duration::seconds(60), 100)),
        Arc::new(provider),
        Metrics::detached(),
    );
    api::router(state)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn send_json(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let (status, bytes) = send(app, method, uri, body).await;
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let (status, bytes) = send(test_router(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap().trim(), "OK");
}

#[tokio::test]
async fn score_ranks_and_filters() {
    let payload = json!({
        "keywords": [
            {"keyword": "tiny", "search_volume": 50, "keyword_difficulty": 5},
            {"keyword": "hard", "search_volume": 20000, "keyword_difficulty": 90, "cpc": 3.0},
            {"keyword": "easy", "search_volume": 20000, "keyword_difficulty": 10, "cpc": 3.0},
            {"keyword": "broken", "search_volume": 100, "competition": 4.0}
        ],
        "filter": {"min_volume": 100}
    });
    let (status, v) = send_json(test_router(), "POST", "/opportunities/score", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);

    let scored = v["scored"].as_array().expect("scored array");
    let ids: Vec<&str> = scored.iter().map(|k| k["entity_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["easy", "hard"]);
    assert_eq!(v["filtered_out"], json!(1));
    assert_eq!(v["skipped"], json!(1));

    let top = &scored[0];
    for field in ["component_scores", "composite_score", "opportunity_level", "roi"] {
        assert!(top.get(field).is_some(), "missing '{field}'");
    }
}

#[tokio::test]
async fn score_limit_truncates() {
    let payload = json!({
        "keywords": [
            {"keyword": "a", "search_volume": 10},
            {"keyword": "b", "search_volume": 1000},
            {"keyword": "c", "search_volume": 100000}
        ],
        "limit": 1
    });
    let (status, v) = send_json(test_router(), "POST", "/opportunities/score", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["scored"].as_array().unwrap().len(), 1);
    assert_eq!(v["scored"][0]["entity_id"], json!("c"));
}

#[tokio::test]
async fn incoherent_filter_is_400_with_error_body() {
    let payload = json!({
        "keywords": [],
        "filter": {"min_cpc": 5.0, "max_cpc": 1.0}
    });
    let (status, v) = send_json(test_router(), "POST", "/opportunities/score", Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], json!("bad_request"));
    assert!(v["message"].as_str().unwrap().contains("min_cpc"));
}

#[tokio::test]
async fn score_skips_one_undecodable_record() {
    let payload = json!({
        "keywords": [
            {"keyword": "good", "search_volume": 5000, "keyword_difficulty": 20},
            {"keyword": "off the scale", "search_volume": 5000, "keyword_difficulty": 300},
            {"keyword": "also good", "search_volume": 800}
        ]
    });
    let (status, v) = send_json(test_router(), "POST", "/opportunities/score", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["skipped"], json!(1));
    let ids: Vec<&str> = v["scored"]
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k["entity_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["good", "also good"]);
}

#[tokio::test]
async fn malformed_body_is_400_with_error_body() {
    let payload = json!({"keywords": "running shoes"});
    let (status, v) = send_json(test_router(), "POST", "/opportunities/score", Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], json!("bad_request"));

    let resp = test_router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/niche/analyze")
                .body(Body::from(r#"{"name":"x","keywords":[]}"#))
                .expect("build request"),
        )
        .await
        .expect("oneshot");
    // no content-type header
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("json error body");
    assert_eq!(v["error"], json!("bad_request"));
}

#[tokio::test]
async fn research_uses_the_provider() {
    let payload = json!({"keywords": ["Running Shoes", "trail running shoes", "unknown thing"]});
    let (status, v) =
        send_json(test_router(), "POST", "/opportunities/research", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["provider"], json!("static"));
    assert_eq!(v["requested"], json!(3));
    assert_eq!(v["found"], json!(2));
    assert_eq!(v["report"]["scored"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn niche_analysis_summarizes() {
    let payload = json!({
        "name": "running",
        "keywords": [
            {"keyword": "running shoes", "search_volume": 40000, "keyword_difficulty": 70},
            {"keyword": "running shoe", "search_volume": 9000, "keyword_difficulty": 60},
            {"keyword": "marathon training plan", "search_volume": 3000, "keyword_difficulty": 20}
        ]
    });
    let (status, v) = send_json(test_router(), "POST", "/niche/analyze", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["niche"], json!("running"));
    assert_eq!(v["keyword_count"], json!(3));
    assert_eq!(v["total_volume"], json!(52000));
    assert!(v["clusters"].as_array().is_some());
    assert!(v["recommendation"].as_str().is_some());
}

#[tokio::test]
async fn niche_skips_one_undecodable_record() {
    let payload = json!({
        "name": "running",
        "keywords": [
            {"keyword": "running shoes", "search_volume": 40000, "keyword_difficulty": 70},
            {"keyword": "running socks", "search_volume": -5}
        ]
    });
    let (status, v) = send_json(test_router(), "POST", "/niche/analyze", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["keyword_count"], json!(1));
    assert_eq!(v["skipped"], json!(1));
}

#[tokio::test]
async fn niche_requires_a_name() {
    let payload = json!({"name": "  ", "keywords": []});
    let (status, v) = send_json(test_router(), "POST", "/niche/analyze", Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], json!("bad_request"));
}

#[tokio::test]
async fn competitor_analysis_reports_gaps() {
    let payload = json!({
        "target_domain": "mysite.com",
        "serps": [
            {"keyword": "running shoes", "search_volume": 40000, "results": [
                {"domain": "nike.com", "position": 1},
                {"domain": "mysite.com", "position": 4}
            ]},
            {"keyword": "trail shoes", "search_volume": 5000, "results": [
                {"domain": "nike.com", "position": 2}
            ]}
        ]
    });
    let (status, v) = send_json(test_router(), "POST", "/competitors/analyze", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["keywords_analyzed"], json!(2));
    assert_eq!(v["competitors"][0]["domain"], json!("nike.com"));
    let gaps = v["keyword_gaps"].as_array().unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0]["keyword"], json!("trail shoes"));
}

#[tokio::test]
async fn competitor_research_fetches_serps_from_the_provider() {
    let payload = json!({
        "target_domain": "mysite.com",
        "keywords": ["running shoes", "hiking boots"]
    });
    let (status, v) =
        send_json(test_router(), "POST", "/competitors/research", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["provider"], json!("static"));
    assert_eq!(v["requested"], json!(2));
    assert_eq!(v["found"], json!(1));
    assert_eq!(v["missing"], json!(["hiking boots"]));
    assert_eq!(v["report"]["keywords_analyzed"], json!(1));
    assert_eq!(v["report"]["competitors"][0]["domain"], json!("nike.com"));
    assert_eq!(v["report"]["target"]["domain"], json!("mysite.com"));

    let (status, v) = send_json(
        test_router(),
        "POST",
        "/competitors/research",
        Some(json!({"target_domain": " ", "keywords": ["running shoes"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], json!("bad_request"));
}

#[tokio::test]
async fn background_task_completes() {
    let app = test_router();
    let payload = json!({
        "keywords": [
            {"keyword": "a", "search_volume": 100},
            {"keyword": "b", "search_volume": 10000},
            {"keyword": "c", "search_volume": "many"}
        ]
    });
    let (status, v) =
        send_json(app.clone(), "POST", "/tasks/opportunities", Some(payload)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = v["task_id"].as_str().expect("task_id").to_string();

    let mut last = Json::Null;
    for _ in 0..50 {
        let (status, v) = send_json(app.clone(), "GET", &format!("/tasks/{task_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        if v["status"] == json!("completed") {
            last = v;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["status"], json!("completed"), "task never completed");
    assert_eq!(last["kind"], json!("opportunities"));
    assert_eq!(last["result"]["scored"][0]["entity_id"], json!("b"));
    assert_eq!(last["result"]["skipped"], json!(1));
}

#[tokio::test]
async fn unknown_task_is_404() {
    let (status, v) = send_json(test_router(), "GET", "/tasks/task_99999999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"], json!("not_found"));
}

#[tokio::test]
async fn local_seo_endpoints_are_501() {
    for feature in ["reviews", "competitors", "geo"] {
        let (status, v) =
            send_json(test_router(), "GET", &format!("/local/{feature}"), None).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED, "feature {feature}");
        assert_eq!(v["error"], json!("not_implemented"));
    }
    let (status, _) = send_json(test_router(), "GET", "/local/citations", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_route_is_mounted() {
    let (status, _) = send(test_router(), "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
}
