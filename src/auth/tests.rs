//! Tests for the auth module

use super::*;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OAuthClient {
    OAuthClient::new(format!("{}/oauth/token", server.uri()), "cid", "csecret")
}

fn memory_store(access: &str) -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::new(CredentialState::new(
        access,
        "refresh-1",
    )))
}

#[tokio::test]
async fn test_refresh_posts_form_and_persists() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=cid"))
        .and(body_string_contains("client_secret=csecret"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "refresh_token": "refresh-2",
            "expires_at": 1_900_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = memory_store("old-access");
    let refresher = AuthRefresher::load("strava", client_for(&server), store.clone())
        .await
        .unwrap();

    let token = refresher.refresh().await.unwrap();

    assert_eq!(token, "new-access");
    let saved = store.snapshot();
    assert_eq!(saved.access_token, "new-access");
    assert_eq!(saved.refresh_token, "refresh-2");
    assert_eq!(saved.expiry, Utc.timestamp_opt(1_900_000_000, 0).single());
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let store = memory_store("old-access");
    let refresher = AuthRefresher::load("youtube", client_for(&server), store.clone())
        .await
        .unwrap();
    refresher.refresh().await.unwrap();

    let current = refresher.current().await;
    assert_eq!(current.refresh_token, "refresh-1");
    assert!(current.expiry.is_some());
    assert!(!current.is_expired());
}

#[tokio::test]
async fn test_refresh_failure_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let store = memory_store("old-access");
    let refresher = AuthRefresher::load("strava", client_for(&server), store.clone())
        .await
        .unwrap();

    let err = refresher.refresh().await.unwrap_err();

    assert!(matches!(err, crate::Error::Auth { status: 400, ref body } if body == "invalid_grant"));
    assert_eq!(refresher.access_token().await, "old-access");
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_concurrent_rejections_refresh_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "fresh"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = memory_store("stale");
    let refresher = Arc::new(
        AuthRefresher::load("strava", client_for(&server), store.clone())
            .await
            .unwrap(),
    );

    let a = {
        let r = refresher.clone();
        tokio::spawn(async move { r.refresh_rejected("stale").await })
    };
    let b = {
        let r = refresher.clone();
        tokio::spawn(async move { r.refresh_rejected("stale").await })
    };

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a, "fresh");
    assert_eq!(b, "fresh");
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_ensure_fresh_skips_valid_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let state = CredentialState::new("valid", "r")
        .with_expiry(Utc::now() + chrono::Duration::hours(1));
    let store = Arc::new(MemoryCredentialStore::new(state.clone()));
    let refresher = AuthRefresher::new("strava", client_for(&server), state, store);

    assert_eq!(refresher.ensure_fresh().await.unwrap(), "valid");
}

#[tokio::test]
async fn test_ensure_fresh_refreshes_expired_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "renewed",
                "expires_in": 21600
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = CredentialState::new("expired", "r")
        .with_expiry(Utc::now() - chrono::Duration::minutes(5));
    let store = Arc::new(MemoryCredentialStore::new(state.clone()));
    let refresher = AuthRefresher::new("youtube", client_for(&server), state, store);

    assert_eq!(refresher.ensure_fresh().await.unwrap(), "renewed");
    assert_eq!(refresher.ensure_fresh().await.unwrap(), "renewed");
}

#[tokio::test]
async fn test_env_file_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join(".env");
    std::fs::write(
        &env_path,
        "OTHER_SETTING=keep-me\nSTRAVA_ACCESS_TOKEN=a1\nSTRAVA_REFRESH_TOKEN=r1\n",
    )
    .unwrap();

    let store = EnvFileCredentialStore::new(&env_path, "strava");
    let loaded = store.load().await.unwrap();
    assert_eq!(loaded, CredentialState::new("a1", "r1"));

    let expiry = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    store
        .save(&CredentialState::new("a2", "r2").with_expiry(expiry))
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&env_path).unwrap();
    assert!(contents.starts_with("OTHER_SETTING=keep-me\n"));
    assert!(contents.contains("STRAVA_ACCESS_TOKEN=a2"));
    assert!(contents.contains("STRAVA_TOKEN_EXPIRY="));

    let reloaded = store.load().await.unwrap();
    assert_eq!(reloaded.access_token, "a2");
    assert_eq!(reloaded.refresh_token, "r2");
    assert_eq!(reloaded.expiry, Some(expiry));
}

#[tokio::test]
async fn test_env_file_store_missing_key() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join(".env");
    std::fs::write(&env_path, "STRAVA_ACCESS_TOKEN=a1\n").unwrap();

    let err = EnvFileCredentialStore::new(&env_path, "STRAVA")
        .load()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("STRAVA_REFRESH_TOKEN"));
}
