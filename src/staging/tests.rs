//! Tests for staging module

use super::*;
use crate::schema::{ColumnDef, FieldType, TableSchema};
use crate::types::{FieldValue, Record};
use pretty_assertions::assert_eq;

fn schema() -> TableSchema {
    TableSchema::new(
        "activities",
        vec![
            ColumnDef::new("id", FieldType::Integer),
            ColumnDef::new("name", FieldType::Text),
        ],
        vec!["id".to_string()],
    )
}

fn row(id: i64, name: &str) -> Record {
    let mut r = Record::new();
    r.insert("id".to_string(), FieldValue::Integer(id));
    r.insert("name".to_string(), FieldValue::from(name));
    r
}

#[test]
fn test_staged_key() {
    assert_eq!(staged_key("strava"), "strava/staged.json");
    assert_eq!(staged_key("google.fit"), "google_fit/staged.json");
}

#[test]
fn test_parse_local_path() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().to_str().unwrap();
    let store = StagingStore::parse(path).unwrap();
    assert_eq!(store.scheme(), "file");
    assert!(!store.is_cloud());
}

#[test]
fn test_parse_memory() {
    let store = StagingStore::parse("memory://").unwrap();
    assert_eq!(store.scheme(), "memory");
    assert!(!store.is_cloud());
}

#[tokio::test]
async fn test_get_missing_snapshot() {
    let store = StagingStore::in_memory();
    assert!(store.get_table("strava").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stage_merges_by_primary_key() {
    let store = StagingStore::in_memory();
    let schema = schema();

    store
        .stage("strava", &schema, vec![row(1, "ride"), row(2, "run")])
        .await
        .unwrap();
    let table = store
        .stage("strava", &schema, vec![row(2, "long run"), row(3, "swim")])
        .await
        .unwrap();

    assert_eq!(table.rows, vec![row(1, "ride"), row(2, "long run"), row(3, "swim")]);
    assert_eq!(store.get_table("strava").await.unwrap(), Some(table));
}

#[tokio::test]
async fn test_local_snapshot_survives_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().to_str().unwrap();

    let store = StagingStore::parse(path).unwrap();
    let written = schema().empty_table().with_rows(vec![row(9, "hike")]);
    let location = store.put_table("strava", &written).await.unwrap();
    assert_eq!(location, "file://strava/staged.json");
    assert!(temp_dir.path().join("strava").join("staged.json").exists());

    let reopened = StagingStore::parse(path).unwrap();
    assert_eq!(reopened.get_table("strava").await.unwrap(), Some(written));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_an_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("strava")).unwrap();
    std::fs::write(temp_dir.path().join("strava").join("staged.json"), "not json").unwrap();

    let store = StagingStore::parse(temp_dir.path().to_str().unwrap()).unwrap();
    let err = store.get_table("strava").await.unwrap_err();
    assert!(err.to_string().contains("Corrupt staged snapshot"));
}
