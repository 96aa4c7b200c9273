//! Webhook endpoint tests: signature enforcement and event routing
//! through the full HTTP stack.

mod test_utils;

use hmac::{Hmac, Mac};
use serde_json::{Value as JsonValue, json};
use sha2::Sha256;
use test_utils::{TestApp, spawn_app_with, wait_for_job};

use conductor_sync::config::AppConfig;

const SECRET: &str = "whsec_test_1234";

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("hmac key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

async fn signed_app() -> TestApp {
    let config = AppConfig {
        profile: "test".to_string(),
        webhook_jira_secret: Some(SECRET.to_string()),
        ..AppConfig::default()
    };
    spawn_app_with(config).await.expect("spawn app")
}

/// Import an issue and turn auto-sync on for its mapping, returning the
/// mapping id.
async fn mapped_issue(app: &TestApp, key: &str) -> String {
    conductor_sync::seeds::seed_field_mappings(&app.db)
        .await
        .expect("seed field mappings");
    app.tracker.put(key, json!({ "summary": "Watched issue" }));

    let job: JsonValue = app
        .client
        .post(app.url("/sync/import"))
        .json(&json!({ "jiraKey": key, "projectKey": "PROJ" }))
        .send()
        .await
        .expect("import")
        .json()
        .await
        .expect("parse job");
    wait_for_job(app, job["id"].as_str().expect("job id")).await;

    let mappings: JsonValue = app
        .client
        .get(app.url("/sync/mappings"))
        .send()
        .await
        .expect("list mappings")
        .json()
        .await
        .expect("parse mappings");
    let mapping_id = mappings["mappings"][0]["id"]
        .as_str()
        .expect("mapping id")
        .to_string();

    app.client
        .post(app.url(&format!("/sync/mappings/{}/auto-sync", mapping_id)))
        .json(&json!({ "enabled": true }))
        .send()
        .await
        .expect("enable auto-sync");

    mapping_id
}

fn event_body(key: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "webhookEvent": "jira:issue_updated",
        "issue": { "key": key, "fields": { "summary": "Updated remotely" } },
        "changelog": { "items": [
            { "field": "summary", "fromString": "Watched issue", "toString": "Updated remotely" }
        ] },
    }))
    .expect("serialize event")
}

#[tokio::test]
async fn signed_delivery_for_auto_synced_mapping_enqueues_resync() {
    let app = signed_app().await;
    mapped_issue(&app, "PROJ-1").await;
    app.tracker
        .put("PROJ-1", json!({ "summary": "Updated remotely" }));

    let body = event_body("PROJ-1");
    let response = app
        .client
        .post(app.url("/webhooks/jira"))
        .header("x-hub-signature", sign(&body))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("post webhook");
    assert_eq!(response.status(), 202);

    let ack: JsonValue = response.json().await.expect("parse ack");
    assert_eq!(ack["status"], "enqueued");
    let job_id = ack["job"]["id"].as_str().expect("job id");
    let finished = wait_for_job(&app, job_id).await;
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["operation"], "webhook_sync");
}

#[tokio::test]
async fn unsigned_delivery_is_rejected() {
    let app = signed_app().await;

    let response = app
        .client
        .post(app.url("/webhooks/jira"))
        .header("content-type", "application/json")
        .body(event_body("PROJ-1"))
        .send()
        .await
        .expect("post webhook");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn tampered_delivery_is_rejected() {
    let app = signed_app().await;

    let signature = sign(&event_body("PROJ-1"));
    let response = app
        .client
        .post(app.url("/webhooks/jira"))
        .header("x-hub-signature", signature)
        .header("content-type", "application/json")
        .body(event_body("PROJ-999"))
        .send()
        .await
        .expect("post webhook");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn delivery_for_unmapped_issue_is_acknowledged_and_dropped() {
    let app = signed_app().await;

    let body = event_body("PROJ-404");
    let response = app
        .client
        .post(app.url("/webhooks/jira"))
        .header("x-hub-signature", sign(&body))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("post webhook");
    assert_eq!(response.status(), 200);

    let ack: JsonValue = response.json().await.expect("parse ack");
    assert_eq!(ack["status"], "dropped");
    assert_eq!(ack["reason"], "no_mapping");
}

#[tokio::test]
async fn irrelevant_events_are_dropped_before_routing() {
    let app = signed_app().await;
    mapped_issue(&app, "PROJ-1").await;

    let body = serde_json::to_vec(&json!({
        "webhookEvent": "jira:issue_deleted",
        "issue": { "key": "PROJ-1" },
    }))
    .expect("serialize event");

    let response = app
        .client
        .post(app.url("/webhooks/jira"))
        .header("x-hub-signature", sign(&body))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("post webhook");
    assert_eq!(response.status(), 200);

    let ack: JsonValue = response.json().await.expect("parse ack");
    assert_eq!(ack["reason"], "irrelevant_event");
}
