//! Tests for engine module

use super::*;
use crate::template::TemplateContext;
use crate::types::FieldValue;
use crate::validation::Mismatch;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PIPELINE: &str = r#"
database:
  path: ":memory:"
staging:
  url: "memory://"
http:
  rate_limit: null
retry:
  max_attempts: 2
  rate_limit_delay_secs: 0
  backoff: { type: constant, initial_ms: 1 }
sources:
  - name: shop
    base_url: "{{ env.API }}"
    endpoints:
      orders:
        kind: page_indexed
        path: /orders
        page_size: 10
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
        - { name: status, type: text }
"#;

fn config(server: &MockServer, yaml: &str) -> PipelineConfig {
    let ctx = TemplateContext::new().with_env("API", server.uri());
    PipelineConfig::from_yaml_str(yaml, &ctx).unwrap()
}

async fn engine(server: &MockServer) -> SyncEngine {
    SyncEngine::from_config(&config(server, PIPELINE), CancellationToken::new())
        .await
        .unwrap()
}

fn order(id: i64, total: &str, status: &str) -> JsonValue {
    json!({"id": id, "total": total, "status": status})
}

async fn mount_list(server: &MockServer, ids: &[i64]) {
    let items: Vec<_> = ids.iter().map(|id| json!({"id": id})).collect();
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, id: i64, total: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/orders/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(order(id, total, "paid")))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_details_fetched_for_new_ids_only() {
    let server = MockServer::start().await;
    mount_list(&server, &[1, 2, 3]).await;
    mount_detail(&server, 1, "1.00", 0).await;
    mount_detail(&server, 2, "20.00", 1).await;
    mount_detail(&server, 3, "3.50", 1).await;

    let engine = engine(&server).await;
    engine
        .cache()
        .add_ids("shop_ids", &[RecordId::Int(1)])
        .await
        .unwrap();

    let report = engine.sync("shop").await.unwrap();

    assert_eq!(report.fetched, 3);
    assert_eq!(report.new_ids, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.cached, 2);
    assert_eq!(report.staged_rows, 2);
    assert_eq!(engine.known_ids("shop").await.unwrap(), 3);
    assert_eq!(engine.database().row_count("orders").unwrap(), 2);
}

#[tokio::test]
async fn test_second_run_fetches_nothing() {
    let server = MockServer::start().await;
    mount_list(&server, &[2]).await;
    mount_detail(&server, 2, "20.00", 1).await;

    let engine = engine(&server).await;
    engine.sync("shop").await.unwrap();
    let second = engine.sync("shop").await.unwrap();

    assert_eq!(second.new_ids, 0);
    assert_eq!(second.written(), 0);
}

#[tokio::test]
async fn test_list_items_stored_without_detail_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([order(5, "5.00", "open"), order(6, "6.00", "open")])),
        )
        .mount(&server)
        .await;

    let yaml = PIPELINE.replace("    detail_endpoint: order\n", "");
    let engine = SyncEngine::from_config(&config(&server, &yaml), CancellationToken::new())
        .await
        .unwrap();

    let report = engine.sync("shop").await.unwrap();
    assert_eq!(report.inserted, 2);

    let table = engine.database().fetch_table(&engine.source("shop").unwrap().config.table).unwrap();
    assert_eq!(table.rows[1]["total"], FieldValue::Decimal("6.00".to_string()));
}

#[tokio::test]
async fn test_deleted_record_is_skipped_and_not_cached() {
    let server = MockServer::start().await;
    mount_list(&server, &[1, 2]).await;
    mount_detail(&server, 1, "1.00", 1).await;
    Mock::given(method("GET"))
        .and(path("/orders/2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let engine = engine(&server).await;
    let report = engine.sync("shop").await.unwrap();

    assert_eq!(report.not_found, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.cached, 1);
    assert_eq!(engine.known_ids("shop").await.unwrap(), 1);
}

#[tokio::test]
async fn test_unmappable_record_is_not_cached() {
    let server = MockServer::start().await;
    mount_list(&server, &[1, 2]).await;
    mount_detail(&server, 1, "1.00", 1).await;
    mount_detail(&server, 2, "twelve", 1).await;

    let engine = engine(&server).await;
    let report = engine.sync("shop").await.unwrap();

    assert_eq!(report.unmapped, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(engine.known_ids("shop").await.unwrap(), 1);
}

#[tokio::test]
async fn test_resync_after_lost_cache_update_has_no_duplicates() {
    let server = MockServer::start().await;
    mount_list(&server, &[1, 2, 3]).await;
    for id in 1..=3 {
        mount_detail(&server, id, "9.99", 2).await;
    }

    let config = config(&server, PIPELINE);
    let first = SyncEngine::from_config(&config, CancellationToken::new())
        .await
        .unwrap();
    first.sync("shop").await.unwrap();

    // Same database, but the identifier cache never saw the first run
    let database = Arc::clone(&first.database);
    let source = config.source("shop").unwrap();
    let http = HttpClient::with_config(config.http.client_config(&source.base_url)).unwrap();
    let fetcher = PaginatedFetcher::new(
        Arc::new(http),
        config.retry.error_policy(),
        config.retry.retry_policy(),
    );
    let mut second = SyncEngine::new(database, Arc::new(FileIdentifierStore::in_memory()));
    second.add_source(SourcePipeline::new(source.clone(), fetcher));

    let report = second.sync("shop").await.unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 3);
    assert_eq!(second.database().row_count("orders").unwrap(), 3);
}

#[tokio::test]
async fn test_failing_source_does_not_stop_others() {
    let server = MockServer::start().await;
    mount_list(&server, &[1]).await;
    mount_detail(&server, 1, "1.00", 1).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let second_source = r#"
  - name: broken
    base_url: "{{ env.API }}"
    endpoints:
      things: { kind: page_indexed, path: /broken }
    list_endpoint: things
    table:
      name: things
      primary_key: [id]
      columns: [{ name: id, type: integer }]
"#;
    let yaml = format!("{PIPELINE}{second_source}");
    let engine = SyncEngine::from_config(&config(&server, &yaml), CancellationToken::new())
        .await
        .unwrap();

    let summary = engine.sync_all().await;

    assert!(!summary.all_succeeded());
    assert_eq!(summary.failed_sources(), vec!["broken"]);
    assert!(matches!(
        summary.run("broken").unwrap().error(),
        Some(Error::Upstream { status: 500, .. })
    ));
    assert_eq!(summary.reports()[0].inserted, 1);
}

#[tokio::test]
async fn test_validate_after_sync() {
    let server = MockServer::start().await;
    mount_list(&server, &[1, 2]).await;
    mount_detail(&server, 1, "20.00", 1).await;
    mount_detail(&server, 2, "5.00", 1).await;

    let engine = engine(&server).await;
    engine.sync("shop").await.unwrap();

    let report = engine.validate(&Validator::new()).await.unwrap();
    assert!(report.passed());

    // Change one value behind the pipeline's back
    let schema = engine.source("shop").unwrap().config.table.clone();
    let tampered = schema.record_from_json(&order(1, "20.01", "paid")).unwrap();
    engine.database().upsert(&schema, &[tampered]).unwrap();

    let report = engine.validate(&Validator::new()).await.unwrap();
    match &report.mismatches()[..] {
        [Mismatch::Field(sample)] => {
            assert_eq!(sample.field, "total");
            assert_eq!(sample.key, "1");
        }
        other => panic!("unexpected mismatches {other:?}"),
    }
}

#[tokio::test]
async fn test_validate_without_staged_data() {
    let server = MockServer::start().await;
    let engine = engine(&server).await;
    let report = engine.validate(&Validator::new()).await.unwrap();
    assert!(report.tables.is_empty());
    assert!(report.passed());
}

#[tokio::test]
async fn test_cancelled_engine_does_not_start() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();
    let engine = SyncEngine::from_config(&config(&server, PIPELINE), cancel.clone())
        .await
        .unwrap();
    cancel.cancel();

    assert!(matches!(engine.sync("shop").await, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_unknown_source_and_missing_auth() {
    let server = MockServer::start().await;
    let engine = engine(&server).await;

    assert_eq!(engine.source_names(), vec!["shop"]);
    let debug = format!("{engine:?}");
    assert!(debug.starts_with("SyncEngine"));
    assert!(debug.contains("sources: [\"shop\"]"));
    assert!(engine.sync("nope").await.is_err());
    let err = engine.refresh("shop").await.unwrap_err();
    assert!(err.to_string().contains("no auth configured"));
}

#[tokio::test]
async fn test_missing_credentials_name_the_source() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let yaml = PIPELINE.replace(
        "    endpoints:\n",
        &format!(
            "    auth:\n      token_url: http://localhost/token\n      client_id: c\n      client_secret: s\n      credentials_file: \"{}\"\n    endpoints:\n",
            dir.path().join("missing.env").display()
        ),
    );

    let err = SyncEngine::from_config(&config(&server, &yaml), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Source 'shop': Credential store error"));
}
