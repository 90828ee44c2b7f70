//! Message Batches strategy tests: submit, poll, stream results.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{
    cache_entry_count, fixture, seed_main_db, skill_url, verdict_rows, write_content,
};
use serde_json::json;
use skillscan_core::prompt::{prompt_hash, truncate_content};
use skillscan_core::{ClassifierClient, FsVerdictCache, Strategy, run_filter_with};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GOOD_CONTENT: &str = "---\nname: deploy\n---\n# Deploy\n";
const BAD_CONTENT: &str = "---\nname: notes\n---\n# Notes\n";

fn batch_status(status: &str, results_url: Option<String>) -> serde_json::Value {
    json!({
        "id": "msgbatch_01",
        "type": "message_batch",
        "processing_status": status,
        "request_counts": {
            "processing": if status == "ended" { 0 } else { 2 },
            "succeeded": if status == "ended" { 1 } else { 0 },
            "errored": if status == "ended" { 1 } else { 0 },
            "canceled": 0,
            "expired": 0
        },
        "results_url": results_url
    })
}

#[tokio::test]
async fn batches_flow_polls_to_completion_and_records_each_outcome() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages/batches"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(batch_status("in_progress", None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    // First poll still in progress, then terminal with a results URL.
    Mock::given(method("GET"))
        .and(path("/v1/messages/batches/msgbatch_01"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(batch_status("in_progress", None)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/messages/batches/msgbatch_01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_status(
            "ended",
            Some(format!("{}/v1/messages/batches/msgbatch_01/results", server.uri())),
        )))
        .mount(&server)
        .await;

    let good_id = prompt_hash(&truncate_content(GOOD_CONTENT));
    let bad_id = prompt_hash(&truncate_content(BAD_CONTENT));
    let results_jsonl = format!(
        "{}\n{}\n",
        json!({
            "custom_id": good_id,
            "result": {
                "type": "succeeded",
                "message": {
                    "content": [
                        {"type": "text", "text": "{\"is_skill\": true, \"reason\": \"workflow instructions\"}"}
                    ]
                }
            }
        }),
        json!({ "custom_id": bad_id, "result": {"type": "errored"} }),
    );
    Mock::given(method("GET"))
        .and(path("/v1/messages/batches/msgbatch_01/results"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_jsonl))
        .expect(1)
        .mount(&server)
        .await;

    let mut fx = fixture(&server.uri());
    fx.config.strategy = Strategy::Batches;
    write_content(&fx.config.content_dir, "good", GOOD_CONTENT);
    write_content(&fx.config.content_dir, "bad", BAD_CONTENT);
    seed_main_db(&fx.config.main_db, &[&skill_url("good"), &skill_url("bad")]);

    let client = ClassifierClient::new(&fx.config).expect("client");
    let cache = FsVerdictCache::open(&fx.config.cache_dir).expect("cache");
    let summary = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("run");

    assert_eq!(summary.submitted_units, 2);
    assert_eq!(summary.valid, 1);
    assert_eq!(summary.errors, 1);

    let rows = verdict_rows(&fx.config.output_db);
    assert_eq!(rows.len(), 2);
    let bad_row = rows.iter().find(|(url, _, _)| url.contains("/bad/")).expect("bad row");
    assert_eq!(bad_row.2, "API error: errored");
    let good_row = rows.iter().find(|(url, _, _)| url.contains("/good/")).expect("good row");
    assert!(good_row.1);

    // Only the success was cached; the errored unit retries next run.
    assert_eq!(cache_entry_count(&fx.config.cache_dir), 1);
    assert!(
        fx.config
            .cache_dir
            .join(format!("{good_id}.json"))
            .exists()
    );
}

#[tokio::test]
async fn unreachable_batch_endpoint_records_failures_for_the_whole_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages/batches"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let mut fx = fixture(&server.uri());
    fx.config.strategy = Strategy::Batches;
    write_content(&fx.config.content_dir, "solo", GOOD_CONTENT);
    seed_main_db(&fx.config.main_db, &[&skill_url("solo")]);

    let client = ClassifierClient::new(&fx.config).expect("client");
    let cache = FsVerdictCache::open(&fx.config.cache_dir).expect("cache");
    let summary = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("run");

    assert_eq!(summary.errors, 1);
    let rows = verdict_rows(&fx.config.output_db);
    assert!(rows[0].2.starts_with("API error:"));
    assert_eq!(cache_entry_count(&fx.config.cache_dir), 0);
}
