//! Current-user caching

use apimart_client::{ApiClient, FileTokenStore, MemoryTokenStore, SessionCache, TokenStore};
use apimart_core::{Role, TokenSet};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session(server: &MockServer, tokens: Option<TokenSet>) -> (SessionCache, Arc<MemoryTokenStore>) {
    let store = Arc::new(match tokens {
        Some(tokens) => MemoryTokenStore::with_tokens(tokens),
        None => MemoryTokenStore::new(),
    });
    let client = ApiClient::builder()
        .base_url(server.uri())
        .token_store(store.clone())
        .build()
        .unwrap();
    (SessionCache::new(client), store)
}

fn me(avatar_url: Option<String>) -> Value {
    json!({
        "success": true,
        "data": {
            "id": "u1",
            "email": "ada@example.com",
            "display_name": "Ada",
            "role": "provider",
            "avatar_url": avatar_url,
            "balance": "12.50",
            "plan": "pro"
        }
    })
}

#[tokio::test]
async fn test_cached_user_is_served_within_ttl() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me(None)))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (cache, _store) = session(&mock_server, Some(TokenSet::new("A1", "R1")));

    let first = cache.refresh_user(false).await.unwrap().unwrap();
    let second = cache.refresh_user(false).await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.role, Role::Provider);
    assert_eq!(first.extra.get("plan"), Some(&json!("pro")));
    assert!(cache.is_logged_in());

    // Forcing always goes to the backend
    cache.refresh_user(true).await.unwrap();
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me(None)))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (cache, _store) = session(&mock_server, Some(TokenSet::new("A1", "R1")));
    let cache = cache.with_ttl(Duration::from_millis(50));

    cache.refresh_user(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    cache.refresh_user(false).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(me(None))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (cache, _store) = session(&mock_server, Some(TokenSet::new("A1", "R1")));

    let (a, b) = tokio::join!(cache.refresh_user(false), cache.refresh_user(true));
    assert_eq!(a.unwrap(), b.unwrap());
    assert!(!cache.is_loading());
}

#[tokio::test]
async fn test_signed_out_skips_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me(None)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (cache, _store) = session(&mock_server, None);
    assert!(cache.refresh_user(true).await.unwrap().is_none());
    assert!(!cache.is_logged_in());
}

#[tokio::test]
async fn test_clear_user_signs_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me(None)))
        .mount(&mock_server)
        .await;

    let (cache, store) = session(&mock_server, Some(TokenSet::new("A1", "R1")));
    cache.refresh_user(false).await.unwrap();
    assert!(cache.user().is_some());

    cache.clear_user().await.unwrap();

    assert!(!cache.is_logged_in());
    assert!(cache.user().is_none());
    assert!(cache.snapshot().is_none());
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_session_clears_user_and_tokens() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (cache, store) = session(&mock_server, Some(TokenSet::new("A1", "R1")));

    assert!(cache.refresh_user(false).await.unwrap().is_none());
    assert!(!cache.is_logged_in());
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_keeps_previous_entry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me(None)))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let (cache, _store) = session(&mock_server, Some(TokenSet::new("A1", "R1")));
    cache.refresh_user(false).await.unwrap();

    let err = cache.refresh_user(true).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(cache.user().unwrap().email, "ada@example.com");
}

#[tokio::test]
async fn test_avatar_is_downloaded_once_per_url() {
    let mock_server = MockServer::start().await;
    let avatar_url = format!("{}/static/ada.png", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me(Some(avatar_url.clone()))))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/static/ada.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (cache, _store) = session(&mock_server, Some(TokenSet::new("A1", "R1")));
    cache.refresh_user(false).await.unwrap();

    let first = cache.avatar().await.unwrap().unwrap();
    assert_eq!(first.as_ref(), &[0x89, 0x50, 0x4e, 0x47]);

    // Same URL after a refetch keeps the downloaded bytes
    cache.refresh_user(true).await.unwrap();
    let second = cache.avatar().await.unwrap().unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_listener_drops_user_when_tokens_are_cleared() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me(None)))
        .mount(&mock_server)
        .await;

    let (cache, _store) = session(&mock_server, Some(TokenSet::new("A1", "R1")));
    let listener = cache.spawn_auth_listener();
    cache.refresh_user(false).await.unwrap();
    assert!(cache.is_logged_in());

    // Another component signs out through the shared client
    cache.client().clear_session().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!cache.is_logged_in());
    listener.abort();
}

#[tokio::test]
async fn test_logout_from_another_process_drops_user() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me(None)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("tokens.json");
    let build = || {
        ApiClient::builder()
            .base_url(mock_server.uri())
            .token_store(Arc::new(FileTokenStore::new(&token_file)))
            .build()
            .unwrap()
    };

    let ours = build();
    ours.store_tokens(&TokenSet::new("A1", "R1")).await.unwrap();
    let cache = SessionCache::new(ours);
    let listener = cache.spawn_auth_listener();
    cache.refresh_user(false).await.unwrap();
    assert!(cache.is_logged_in());

    // A second client on the same token file stands in for another process
    let theirs = build();
    theirs.clear_session().await.unwrap();
    assert!(!theirs.tokens().is_logged_in().await);

    tokio::time::timeout(Duration::from_secs(5), async {
        while cache.is_logged_in() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("cached user was not dropped");
    assert!(cache.user().is_none());
    listener.abort();
}
