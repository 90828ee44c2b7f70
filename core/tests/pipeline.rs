//! End-to-end pipeline tests against a mock Messages API endpoint.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{
    cache_entry_count, error_body, fixture, message_body, seed_main_db, skill_url, verdict_rows,
    write_content,
};
use skillscan_core::{ClassifierClient, FsVerdictCache, run_filter_with};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SKILL_CONTENT: &str = "---\nname: deploy\ndescription: Deploy the app\n---\n# Steps\n";

#[tokio::test]
async fn identical_content_costs_one_call_and_fans_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body(
            r#"{"is_skill": true, "reason": "extends capabilities"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let fx = fixture(&server.uri());
    write_content(&fx.config.content_dir, "one", SKILL_CONTENT);
    write_content(&fx.config.content_dir, "two", SKILL_CONTENT);
    seed_main_db(&fx.config.main_db, &[&skill_url("one"), &skill_url("two")]);

    let client = ClassifierClient::new(&fx.config).expect("client");
    let cache = FsVerdictCache::open(&fx.config.cache_dir).expect("cache");
    let summary = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("run");

    assert_eq!(summary.submitted_units, 1);
    assert_eq!(summary.deduplicated, 1);
    assert_eq!(summary.valid, 2);
    assert_eq!(summary.files_rebuilt, 2);

    let rows = verdict_rows(&fx.config.output_db);
    assert_eq!(rows.len(), 2);
    assert!(
        rows.iter()
            .all(|(_, is_skill, reason)| *is_skill && reason == "extends capabilities")
    );
    assert_eq!(cache_entry_count(&fx.config.cache_dir), 1);
}

#[tokio::test]
async fn structurally_invalid_file_never_reaches_the_classifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("{}")))
        .expect(0)
        .mount(&server)
        .await;

    let fx = fixture(&server.uri());
    write_content(&fx.config.content_dir, "plain", "Hello world");
    seed_main_db(&fx.config.main_db, &[&skill_url("plain")]);

    let client = ClassifierClient::new(&fx.config).expect("client");
    let cache = FsVerdictCache::open(&fx.config.cache_dir).expect("cache");
    let summary = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("run");

    assert_eq!(summary.frontmatter_rejected, 1);
    assert_eq!(summary.submitted_units, 0);

    let rows = verdict_rows(&fx.config.output_db);
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].1);
    assert_eq!(rows[0].2, "No valid YAML frontmatter");
    // Pre-filter rejections never touch the cache.
    assert_eq!(cache_entry_count(&fx.config.cache_dir), 0);
}

#[tokio::test]
async fn persistent_failure_is_retried_thrice_recorded_and_reattempted() {
    let server = MockServer::start().await;
    // 3 attempts on the first run, 3 more on the second: failures are not
    // cached and their verdicts are not definitive.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(529).set_body_json(error_body("overloaded_error", "overloaded")),
        )
        .expect(6)
        .mount(&server)
        .await;

    let fx = fixture(&server.uri());
    write_content(&fx.config.content_dir, "flaky", SKILL_CONTENT);
    seed_main_db(&fx.config.main_db, &[&skill_url("flaky")]);

    let client = ClassifierClient::new(&fx.config).expect("client");
    let cache = FsVerdictCache::open(&fx.config.cache_dir).expect("cache");

    let first = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("first run");
    assert_eq!(first.errors, 1);

    let rows = verdict_rows(&fx.config.output_db);
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].1);
    assert!(rows[0].2.starts_with("API error:"));
    assert_eq!(cache_entry_count(&fx.config.cache_dir), 0);

    let second = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("second run");
    assert_eq!(second.submitted_units, 1, "failed unit must be re-attempted");
    assert_eq!(second.errors, 1);
}

#[tokio::test]
async fn second_run_is_resolved_entirely_from_the_verdict_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body(
            r#"{"is_skill": false, "reason": "a blog post"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let fx = fixture(&server.uri());
    write_content(&fx.config.content_dir, "post", SKILL_CONTENT);
    seed_main_db(&fx.config.main_db, &[&skill_url("post")]);

    let client = ClassifierClient::new(&fx.config).expect("client");
    let cache = FsVerdictCache::open(&fx.config.cache_dir).expect("cache");

    let first = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("first run");
    assert_eq!(first.submitted_units, 1);

    let second = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("second run");
    assert_eq!(second.already_recorded, 1);
    assert_eq!(second.submitted_units, 0);
    assert_eq!(second.cached, 0, "nothing should even reach the cache");

    let rows = verdict_rows(&fx.config.output_db);
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn later_url_with_known_content_is_served_from_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body(
            r#"{"is_skill": true, "reason": "extends capabilities"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let fx = fixture(&server.uri());
    write_content(&fx.config.content_dir, "first", SKILL_CONTENT);
    seed_main_db(&fx.config.main_db, &[&skill_url("first")]);

    let client = ClassifierClient::new(&fx.config).expect("client");
    let cache = FsVerdictCache::open(&fx.config.cache_dir).expect("cache");
    run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("first run");

    // A new repository with byte-identical content shows up later.
    write_content(&fx.config.content_dir, "copycat", SKILL_CONTENT);
    seed_main_db(&fx.config.main_db, &[&skill_url("copycat")]);

    let second = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("second run");
    assert_eq!(second.cached, 1);
    assert_eq!(second.submitted_units, 0);

    let rows = verdict_rows(&fx.config.output_db);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|(_, is_skill, _)| *is_skill));
}

#[tokio::test]
async fn parse_failures_are_recorded_but_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(message_body("I cannot classify this.")),
        )
        .expect(3)
        .mount(&server)
        .await;

    let fx = fixture(&server.uri());
    write_content(&fx.config.content_dir, "vague", SKILL_CONTENT);
    seed_main_db(&fx.config.main_db, &[&skill_url("vague")]);

    let client = ClassifierClient::new(&fx.config).expect("client");
    let cache = FsVerdictCache::open(&fx.config.cache_dir).expect("cache");
    let summary = run_filter_with(&fx.config, &client, &cache)
        .await
        .expect("run");

    assert_eq!(summary.errors, 1);
    let rows = verdict_rows(&fx.config.output_db);
    assert!(rows[0].2.starts_with("Parse error:"));
    assert_eq!(cache_entry_count(&fx.config.cache_dir), 0);
}
