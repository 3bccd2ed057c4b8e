//! Credential store refresh behaviour against a fake token endpoint.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use twitch_bridge::bus::EventBus;
use twitch_bridge::credentials::CredentialStore;
use twitch_bridge::schema::SchemaRegistry;
use twitch_client::AuthProvider;

use common::{FakeTwitch, auth_options};

fn store_for(server: &FakeTwitch) -> (Arc<EventBus>, Arc<CredentialStore>) {
    let bus = Arc::new(EventBus::new(Arc::new(SchemaRegistry::twitch())));
    let store = Arc::new(
        CredentialStore::new(bus.clone()).with_token_url(server.url("/oauth2/token")),
    );
    (bus, store)
}

#[tokio::test]
async fn test_first_use_refreshes_and_notifies() {
    let server = FakeTwitch::start().await;
    let (bus, store) = store_for(&server);
    let mut refreshed = bus.subscribe_to("v1.auth.refreshed");

    let handle = store.get_or_create("bot", Some(auth_options())).unwrap();
    assert!(handle.token().is_empty());

    let token = handle.provider().access_token().await.unwrap();
    assert_eq!(token, "t1");

    let snapshot = handle.token();
    assert_eq!(snapshot.access_token, "t1");
    assert_eq!(snapshot.expires_in, Some(1001));
    assert!(snapshot.obtainment_timestamp > 0);
    assert_eq!(snapshot.scope, vec!["scope:0"]);
    assert!(snapshot.expires_at().is_some());

    let envelope = refreshed.recv().await.unwrap();
    assert_eq!(envelope.payload, json!({ "instance": "bot" }));
    assert_eq!(server.hits("/oauth2/token"), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = FakeTwitch::start().await;
    let (bus, store) = store_for(&server);
    let mut refreshed = bus.subscribe_to("v1.auth.refreshed");
    let handle = store.get_or_create("bot", Some(auth_options())).unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let auth = handle.auth();
            tokio::spawn(async move { auth.access_token().await.unwrap() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), "t1");
    }

    assert_eq!(server.hits("/oauth2/token"), 1);
    assert!(refreshed.recv().await.is_some());
    assert!(refreshed.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_never_see_partial_snapshot() {
    let server = FakeTwitch::start().await;
    let (_bus, store) = store_for(&server);
    let handle = store.get_or_create("bot", Some(auth_options())).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let handle = store.get("bot").unwrap();
        let done = done.clone();
        tokio::spawn(async move {
            let mut seen = std::collections::BTreeSet::new();
            while !done.load(Ordering::SeqCst) {
                let snapshot = handle.token();
                if snapshot.is_empty() {
                    assert_eq!(snapshot.expires_in, None);
                    assert_eq!(snapshot.obtainment_timestamp, 0);
                    assert!(snapshot.scope.is_empty());
                } else {
                    let n: u64 = snapshot.access_token[1..].parse().unwrap();
                    assert_eq!(snapshot.expires_in, Some(1000 + n));
                    assert_eq!(snapshot.scope.len() as u64, n);
                    assert!(snapshot.obtainment_timestamp > 0);
                    seen.insert(n);
                }
                tokio::task::yield_now().await;
            }
            seen
        })
    };

    for _ in 0..3 {
        handle.provider().refresh().await.unwrap();
    }
    let last = handle.token();
    done.store(true, Ordering::SeqCst);
    let seen = reader.await.unwrap();
    assert!(seen.iter().all(|n| (1..=3).contains(n)));
    assert_eq!(last.access_token, "t3");
    assert_eq!(last.expires_in, Some(1003));
    assert_eq!(last.scope.len(), 3);
    assert_eq!(server.hits("/oauth2/token"), 3);
}

#[tokio::test]
async fn test_identity_is_shared_across_consumers() {
    let server = FakeTwitch::start().await;
    let (_bus, store) = store_for(&server);

    let created = store.get_or_create("bot", Some(auth_options())).unwrap();
    let looked_up = store.get("bot").unwrap();
    let reused = store.get_or_create("bot", None).unwrap();

    assert!(created.ptr_eq(&looked_up));
    assert!(created.ptr_eq(&reused));

    looked_up.provider().access_token().await.unwrap();
    assert_eq!(created.token().access_token, "t1");
    assert_eq!(store.len(), 1);
}
