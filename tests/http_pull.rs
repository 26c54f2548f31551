//! End-to-end pulls against a mock HTTP peer.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use cas_pull::{MemoryStore, ObjectId, PullConfig, PullSession};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> PullConfig {
    PullConfig {
        host: server.uri(),
        username: "replicator".to_string(),
        password: "secret".to_string(),
        query: "type:any".to_string(),
        readers: 4,
        queue_capacity: 8,
        retry_delay: Duration::from_millis(50),
        ..Default::default()
    }
}

async fn wait_for_objects(store: &MemoryStore, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while store.len() < expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {expected} objects, have {}",
            store.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn id(hash: &str) -> ObjectId {
    ObjectId::new("sha256", hash).unwrap()
}

#[tokio::test]
async fn pulls_listed_objects_into_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cas/query"))
        .and(query_param("q", "type:any"))
        .and(query_param("count", "all"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("hash://sha256/one\nhash://sha256/two\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cas/file/sha256/one"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("first"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cas/file/sha256/two"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("second"),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let session = PullSession::new(config_for(&server), store.clone()).unwrap();
    session.start().await.unwrap();

    wait_for_objects(&store, 2).await;
    tokio::time::timeout(Duration::from_secs(5), session.stop())
        .await
        .expect("stop timed out");

    let one = store.get(&id("one")).unwrap();
    assert_eq!(one.content_type, "text/plain");
    assert_eq!(one.body, b"first");
    let two = store.get(&id("two")).unwrap();
    assert_eq!(two.body, b"second");
    // Listing order survives the concurrent fetches.
    assert_eq!(
        store
            .commit_log()
            .into_iter()
            .flatten()
            .collect::<Vec<_>>(),
        vec![id("one"), id("two")]
    );
}

#[tokio::test]
async fn authenticates_when_the_peer_rejects_anonymous_listings() {
    let server = MockServer::start().await;
    // Authorized mocks first: wiremock serves the earliest match.
    Mock::given(method("GET"))
        .and(path("/cas/query"))
        .and(header("cookie", "s=granted"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hash://sha256/secret-obj\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cas/query"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cas/auth"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "s=granted; Path=/; HttpOnly"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cas/file/sha256/secret-obj"))
        .and(header("cookie", "s=granted"))
        .respond_with(ResponseTemplate::new(200).set_body_string("classified"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let session = PullSession::new(config_for(&server), store.clone()).unwrap();
    session.start().await.unwrap();

    wait_for_objects(&store, 1).await;
    tokio::time::timeout(Duration::from_secs(5), session.stop())
        .await
        .expect("stop timed out");

    assert_eq!(store.get(&id("secret-obj")).unwrap().body, b"classified");
}

#[tokio::test]
async fn recovers_from_transient_listing_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cas/query"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cas/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hash://sha256/late\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cas/file/sha256/late"))
        .respond_with(ResponseTemplate::new(200).set_body_string("eventually"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let session = PullSession::new(config_for(&server), store.clone()).unwrap();
    session.start().await.unwrap();

    wait_for_objects(&store, 1).await;
    tokio::time::timeout(Duration::from_secs(5), session.stop())
        .await
        .expect("stop timed out");

    assert_eq!(store.get(&id("late")).unwrap().body, b"eventually");
}
