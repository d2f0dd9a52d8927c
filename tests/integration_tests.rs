//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: YAML pipeline → HTTP requests → DuckDB →
//! staged snapshot → validation

use clap::Parser;
use pretty_assertions::assert_eq;
use pulse_etl::cli::{Cli, Runner};
use pulse_etl::config::PipelineConfig;
use pulse_etl::engine::SyncEngine;
use pulse_etl::template::TemplateContext;
use pulse_etl::validation::{Mismatch, Validator};
use pulse_etl::FieldValue;
use serde_json::json;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{
    body_string_contains, header, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHOP: &str = r#"
database:
  path: ":memory:"
staging:
  url: "memory://"
http:
  rate_limit: null
retry:
  max_attempts: 3
  rate_limit_delay_secs: 0
  backoff: { type: constant, initial_ms: 1 }
sources:
  - name: shop
    base_url: "{{ env.API }}"
    endpoints:
      orders:
        kind: page_indexed
        path: /orders
        page_size: 2
        stop: empty_page
      order:
        kind: detail
        path: "/orders/{{ id }}"
    list_endpoint: orders
    detail_endpoint: order
    table:
      name: orders
      primary_key: [id]
      columns:
        - { name: id, type: integer }
        - { name: total, type: decimal, precision: 10, scale: 2 }
        - { name: placed_at, type: timestamp }
        - { name: customer, type: text, path: customer.name }
"#;

fn context(server: &MockServer) -> TemplateContext {
    TemplateContext::new().with_env("API", server.uri())
}

/// Pipeline whose database and identifier cache live under `dir`
fn file_backed(yaml: &str, dir: &Path) -> String {
    let database = format!(
        "path: \"{}\"\nidentifier_cache:\n  path: \"{}\"",
        dir.join("pulse.duckdb").display(),
        dir.join("ids.json").display()
    );
    yaml.replacen("path: \":memory:\"", &database, 1)
}

#[test]
fn test_pipelines_keep_state_out_of_the_working_directory() {
    let ctx = TemplateContext::new()
        .with_env("API", "http://localhost")
        .with_env("CREDENTIALS", "/tmp/creds.env");
    for yaml in [SHOP, FEED] {
        let config = PipelineConfig::from_yaml_str(yaml, &ctx).unwrap();
        assert!(config.database.is_in_memory());
        assert!(config.identifier_cache.path.is_none());
    }

    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::from_yaml_str(&file_backed(SHOP, dir.path()), &ctx).unwrap();
    assert_eq!(
        Path::new(&config.database.path),
        dir.path().join("pulse.duckdb")
    );
    assert!(config.identifier_cache.path.is_some());
}

async fn engine(server: &MockServer, yaml: &str) -> SyncEngine {
    let config = PipelineConfig::from_yaml_str(yaml, &context(server)).unwrap();
    SyncEngine::from_config(&config, CancellationToken::new())
        .await
        .unwrap()
}

async fn mount_orders(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 3}])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;

    for (id, total) in [(1, "19.99"), (2, "5.00"), (3, "120.50")] {
        Mock::given(method("GET"))
            .and(path(format!("/orders/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "total": total,
                "placed_at": "2024-05-01T10:00:00.250Z",
                "customer": {"name": format!("customer-{id}")}
            })))
            .mount(server)
            .await;
    }
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn test_sync_then_validate() {
    let server = MockServer::start().await;
    mount_orders(&server).await;

    let engine = engine(&server, SHOP).await;
    let report = engine.sync("shop").await.unwrap();

    assert_eq!(report.fetched, 3);
    assert_eq!(report.new_ids, 3);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.cached, 3);
    assert_eq!(report.staged_rows, 3);

    let table = engine.source("shop").unwrap().config.table.clone();
    let persisted = engine.database().fetch_table(&table).unwrap();
    assert_eq!(persisted.len(), 3);
    assert_eq!(
        persisted.rows[0].get("customer"),
        Some(&FieldValue::from("customer-1"))
    );

    let validation = engine.validate(&Validator::new()).await.unwrap();
    assert!(validation.passed());
    assert_eq!(validation.table("orders").unwrap().sampled, 3);
}

#[tokio::test]
async fn test_resync_after_lost_cache_is_idempotent() {
    let server = MockServer::start().await;
    mount_orders(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let yaml = file_backed(SHOP, dir.path());

    let first = engine(&server, &yaml).await;
    assert_eq!(first.sync("shop").await.unwrap().inserted, 3);
    drop(first);

    // Same database and cache: nothing is new
    let second = engine(&server, &yaml).await;
    let report = second.sync("shop").await.unwrap();
    assert_eq!(report.new_ids, 0);
    assert_eq!(report.written(), 0);
    drop(second);

    // Cache lost after persisting: records are overwritten, not duplicated
    std::fs::remove_file(dir.path().join("ids.json")).unwrap();
    let third = engine(&server, &yaml).await;
    let report = third.sync("shop").await.unwrap();
    assert_eq!(report.new_ids, 3);
    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 3);
    assert_eq!(third.database().row_count("orders").unwrap(), 3);
    assert_eq!(third.known_ids("shop").await.unwrap(), 3);
}

#[tokio::test]
async fn test_rate_limited_page_is_requested_again() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_orders(&server).await;

    let engine = engine(&server, SHOP).await;
    let report = engine.sync("shop").await.unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.inserted, 3);
}

// ============================================================================
// Auth
// ============================================================================

const FEED: &str = r#"
database:
  path: ":memory:"
staging:
  url: "memory://"
http:
  rate_limit: null
retry:
  max_attempts: 3
  rate_limit_delay_secs: 0
  backoff: { type: constant, initial_ms: 1 }
sources:
  - name: fit
    base_url: "{{ env.API }}"
    auth:
      token_url: "{{ env.API }}/oauth/token"
      client_id: fit-client
      client_secret: fit-secret
      credentials_file: "{{ env.CREDENTIALS }}"
    endpoints:
      steps:
        kind: cursor
        path: /steps
    list_endpoint: steps
    table:
      name: hourly_steps
      primary_key: [date, hour]
      columns:
        - { name: date, type: date }
        - { name: hour, type: integer }
        - { name: step_count, type: integer, path: steps }
"#;

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let credentials = dir.path().join(".env");
    std::fs::write(
        &credentials,
        "OTHER=keep\nFIT_ACCESS_TOKEN=stale\nFIT_REFRESH_TOKEN=r1\n",
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/steps"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "refresh_token": "r2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/steps"))
        .and(header("Authorization", "Bearer fresh"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "2024-01-01T08", "date": "2024-01-01", "hour": 8, "steps": 1200},
                {"id": "2024-01-01T09", "date": "2024-01-01", "hour": 9, "steps": 300}
            ],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/steps"))
        .and(header("Authorization", "Bearer fresh"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "2024-01-02T08", "date": "2024-01-02", "hour": 8, "steps": 40}
            ]
        })))
        .mount(&server)
        .await;

    let ctx = context(&server).with_env("CREDENTIALS", credentials.display().to_string());
    let config = PipelineConfig::from_yaml_str(FEED, &ctx).unwrap();
    let engine = SyncEngine::from_config(&config, CancellationToken::new())
        .await
        .unwrap();

    let report = engine.sync("fit").await.unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.inserted, 3);

    let saved = std::fs::read_to_string(&credentials).unwrap();
    assert!(saved.starts_with("OTHER=keep\n"));
    assert!(saved.contains("FIT_ACCESS_TOKEN=fresh\n"));
    assert!(saved.contains("FIT_REFRESH_TOKEN=r2\n"));
    assert!(saved.contains("FIT_TOKEN_EXPIRY="));

    let validation = engine.validate(&Validator::new()).await.unwrap();
    assert!(validation.passed());
    assert_eq!(
        validation.table("hourly_steps").unwrap().key_columns,
        vec!["date".to_string(), "hour".to_string()]
    );
}

#[tokio::test]
async fn test_rejected_refresh_fails_the_source() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let credentials = dir.path().join(".env");
    std::fs::write(&credentials, "FIT_ACCESS_TOKEN=stale\nFIT_REFRESH_TOKEN=revoked\n").unwrap();

    Mock::given(method("GET"))
        .and(path("/steps"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let ctx = context(&server).with_env("CREDENTIALS", credentials.display().to_string());
    let config = PipelineConfig::from_yaml_str(FEED, &ctx).unwrap();
    let engine = SyncEngine::from_config(&config, CancellationToken::new())
        .await
        .unwrap();

    let summary = engine.sync_all().await;
    assert!(!summary.all_succeeded());
    assert_eq!(summary.failed_sources(), vec!["fit"]);
    assert_eq!(engine.database().row_count("hourly_steps").unwrap(), 0);

    let saved = std::fs::read_to_string(&credentials).unwrap();
    assert!(saved.contains("FIT_ACCESS_TOKEN=stale"));
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_validation_reports_divergent_field() {
    let server = MockServer::start().await;
    mount_orders(&server).await;

    let engine = engine(&server, SHOP).await;
    engine.sync("shop").await.unwrap();

    let table = engine.source("shop").unwrap().config.table.clone();
    let mut tampered = engine.database().fetch_table(&table).unwrap();
    for row in &mut tampered.rows {
        row.insert("total".to_string(), FieldValue::Decimal("0.01".to_string()));
    }
    engine.database().upsert(&table, &tampered.rows).unwrap();

    let validation = engine.validate(&Validator::new()).await.unwrap();
    assert!(!validation.passed());
    assert_eq!(validation.failed_tables(), vec!["orders"]);
    match validation.mismatches()[0] {
        Mismatch::Field(sample) => assert_eq!(sample.field, "total"),
        other => panic!("unexpected mismatch {other:?}"),
    }
}

// ============================================================================
// CLI
// ============================================================================

#[tokio::test]
async fn test_cli_sync_and_validate_across_runs() {
    let server = MockServer::start().await;
    mount_orders(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let yaml = file_backed(SHOP, dir.path())
        .replace("{{ env.API }}", &server.uri())
        .replace(
            "url: \"memory://\"",
            &format!("url: \"{}\"", dir.path().join("staging").display()),
        );
    let pipeline = dir.path().join("pipeline.yaml");
    std::fs::write(&pipeline, yaml).unwrap();
    let config = pipeline.display().to_string();

    let sync = Runner::new(Cli::parse_from(["pulse-etl", "-c", &config, "-f", "json", "sync"]));
    assert!(sync.run().await.unwrap());
    assert!(dir.path().join("staging/shop/staged.json").exists());

    let validate = Runner::new(Cli::parse_from(["pulse-etl", "-c", &config, "validate"]));
    assert!(validate.run().await.unwrap());

    let unknown = Runner::new(Cli::parse_from([
        "pulse-etl", "-c", &config, "sync", "--sources", "nope",
    ]));
    assert!(unknown.run().await.is_err());
}
