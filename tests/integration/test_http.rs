//! HTTP tests against a live certificate API server.
//!
//! Each test binds the router to an ephemeral port and talks to it with a
//! real HTTP client.

use std::net::SocketAddr;

use certify_engine::{create_router, AppState, Config, MemoryStore};
use certify_store::{Course, StoreEnvelope, Template};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Starts a server with courses 1-3 and returns its base URL.
async fn spawn_server() -> (String, MemoryStore) {
    let store = MemoryStore::empty();
    for (id, name) in [(1, "Rust 101"), (2, "Async Rust"), (3, "Unsafe Rust")] {
        store.add_course(Course::new(id, name)).await;
    }

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    let addr: SocketAddr = listener.local_addr().expect("No local address");
    let router = create_router(AppState::new(store.clone(), Config::default()));

    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    (format!("http://{addr}/api/certificates"), store)
}

async fn create(client: &Client, base: &str, body: Value) -> Value {
    let response = client
        .post(format!("{base}/templates"))
        .json(&body)
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Invalid JSON")
}

async fn resolve(client: &Client, base: &str, course: u64) -> Value {
    client
        .get(format!("{base}/courses/{course}/template"))
        .send()
        .await
        .expect("Request failed")
        .json::<Value>()
        .await
        .expect("Invalid JSON")["data"]
        .clone()
}

#[tokio::test]
async fn test_assignment_flow_over_http() {
    let (base, _store) = spawn_server().await;
    let client = Client::new();

    let a = create(&client, &base, json!({"name": "A", "isDefault": true})).await;
    assert_eq!(a["success"], true);
    assert_eq!(a["data"]["template"]["isDefault"], true);
    let b = create(&client, &base, json!({"name": "B", "courseIds": [2, 3]})).await;
    let b_id = b["data"]["template"]["id"].as_u64().expect("Missing id");
    assert_eq!(b["data"]["activation"]["activated"], json!([2, 3]));

    let course_1 = resolve(&client, &base, 1).await;
    assert_eq!(course_1["source"], "default");
    assert_eq!(course_1["template"]["name"], "A");
    let course_2 = resolve(&client, &base, 2).await;
    assert_eq!(course_2["source"], "assigned");
    assert_eq!(course_2["template"]["id"], b_id);

    let reclaim: Value = client
        .post(format!("{base}/templates/1/courses"))
        .json(&json!({"courseIds": [2]}))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(reclaim["data"]["revocations"][0]["previousTemplate"], b_id);
    assert_eq!(resolve(&client, &base, 2).await["template"]["name"], "A");

    let availability: Value = client
        .get(format!("{base}/templates/1/availability"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(availability["data"][2]["eligibility"]["state"], "locked");
    assert_eq!(availability["data"][2]["eligibility"]["owner"], b_id);

    let deleted = client
        .delete(format!("{base}/templates/{b_id}"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(resolve(&client, &base, 3).await["source"], "default");
}

#[tokio::test]
async fn test_errors_use_envelope() {
    let (base, store) = spawn_server().await;
    let client = Client::new();
    create(&client, &base, json!({"name": "A"})).await;

    let response = client
        .post(format!("{base}/templates/1/courses"))
        .json(&json!({"courseIds": [1, 42]}))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("42")));
    assert!(store.state().await.snapshot().assignments.is_empty());

    let response = client
        .put(format!("{base}/templates/7"))
        .json(&json!({"name": "Ghost"}))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signature_upload_and_preview() {
    let (base, _store) = spawn_server().await;
    let client = Client::new();
    create(&client, &base, json!({"name": "A"})).await;

    let upload: Value = client
        .post(format!("{base}/templates/1/signature"))
        .header("content-type", "image/png")
        .header("x-file-name", "sig.png")
        .body(vec![0x89, b'P', b'N', b'G'])
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(upload["data"]["kind"], "signature");
    assert_eq!(upload["data"]["sizeBytes"], 4);

    let preview: Value = client
        .get(format!("{base}/templates/1/preview"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert!(preview["data"]
        .as_str()
        .is_some_and(|url| url.ends_with("/templates/1/preview")));
}

#[tokio::test]
async fn test_missing_default_decodes_as_none() {
    let (base, _store) = spawn_server().await;

    let envelope: StoreEnvelope<Option<Template>> = Client::new()
        .get(format!("{base}/active"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid envelope");

    assert!(envelope.success);
    assert_eq!(envelope.into_result().expect("Expected success"), None);
}
