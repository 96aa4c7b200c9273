//! End-to-end sync flows over HTTP: import, export, bulk passes,
//! conflict detection and resolution, all against the real router and
//! worker pool with fake Jira and BRD backends.

mod test_utils;

use serde_json::{Value as JsonValue, json};
use test_utils::{spawn_app, wait_for_job};

async fn seed(app: &test_utils::TestApp) {
    conductor_sync::seeds::seed_field_mappings(&app.db)
        .await
        .expect("seed field mappings");
}

#[tokio::test]
async fn import_creates_brd_and_mapping() {
    let app = spawn_app().await.expect("spawn app");
    seed(&app).await;
    app.tracker.put(
        "PROJ-1",
        json!({ "summary": "Login feature", "description": "OAuth2 login" }),
    );

    let response = app
        .client
        .post(app.url("/sync/import"))
        .json(&json!({ "jiraKey": "PROJ-1", "projectKey": "PROJ" }))
        .send()
        .await
        .expect("post import");
    assert_eq!(response.status(), 202);

    let job: JsonValue = response.json().await.expect("parse job");
    let finished = wait_for_job(&app, job["id"].as_str().expect("job id")).await;
    assert_eq!(finished["status"], "completed");

    let mappings: JsonValue = app
        .client
        .get(app.url("/sync/mappings"))
        .send()
        .await
        .expect("list mappings")
        .json()
        .await
        .expect("parse mappings");
    let list = mappings["mappings"].as_array().expect("mappings array");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["jira_key"], "PROJ-1");

    let brd_id = list[0]["brd_id"].as_str().expect("brd id");
    let doc = app.brds.get(brd_id).expect("created BRD");
    assert_eq!(doc.fields["title"], "Login feature");
    assert_eq!(doc.fields["description"], "OAuth2 login");
}

#[tokio::test]
async fn import_of_mapped_key_is_rejected() {
    let app = spawn_app().await.expect("spawn app");
    seed(&app).await;
    app.tracker.put("PROJ-1", json!({ "summary": "Once" }));

    let body = json!({ "jiraKey": "PROJ-1", "projectKey": "PROJ" });
    let first: JsonValue = app
        .client
        .post(app.url("/sync/import"))
        .json(&body)
        .send()
        .await
        .expect("first import")
        .json()
        .await
        .expect("parse job");
    wait_for_job(&app, first["id"].as_str().expect("job id")).await;

    let second = app
        .client
        .post(app.url("/sync/import"))
        .json(&body)
        .send()
        .await
        .expect("second import");
    assert_eq!(second.status(), 409);
    let problem: JsonValue = second.json().await.expect("parse problem");
    assert_eq!(problem["code"], "ALREADY_MAPPED");
}

#[tokio::test]
async fn export_creates_issue_and_mapping() {
    let app = spawn_app().await.expect("spawn app");
    seed(&app).await;
    app.brds
        .put("brd-doc-1", json!({ "title": "Billing revamp" }));

    let response = app
        .client
        .post(app.url("/sync/export"))
        .json(&json!({ "brdId": "brd-doc-1", "projectKey": "PROJ" }))
        .send()
        .await
        .expect("post export");
    assert_eq!(response.status(), 202);

    let job: JsonValue = response.json().await.expect("parse job");
    let finished = wait_for_job(&app, job["id"].as_str().expect("job id")).await;
    assert_eq!(finished["status"], "completed");

    let issue = app.tracker.get("PROJ-1").expect("created issue");
    assert_eq!(issue.fields["summary"], "Billing revamp");
}

#[tokio::test]
async fn bulk_import_records_item_failures_without_aborting() {
    let app = spawn_app().await.expect("spawn app");
    seed(&app).await;
    app.tracker.put("PROJ-1", json!({ "summary": "One" }));
    app.tracker.put("PROJ-3", json!({ "summary": "Three" }));

    let response = app
        .client
        .post(app.url("/sync/bulk/import"))
        .json(&json!({
            "jiraKeys": ["PROJ-1", "PROJ-2", "PROJ-3"],
            "projectKey": "PROJ",
        }))
        .send()
        .await
        .expect("post bulk import");
    assert_eq!(response.status(), 202);

    let job: JsonValue = response.json().await.expect("parse job");
    let finished = wait_for_job(&app, job["id"].as_str().expect("job id")).await;

    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["processed_items"], 2);
    assert_eq!(finished["failed_items"], 1);
    assert_eq!(finished["progress"], 100);
    let failures = finished["item_failures"].as_array().expect("failures");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["item"], "PROJ-2");
}

#[tokio::test]
async fn bulk_import_rejects_empty_batches() {
    let app = spawn_app().await.expect("spawn app");

    let response = app
        .client
        .post(app.url("/sync/bulk/import"))
        .json(&json!({ "jiraKeys": [], "projectKey": "PROJ" }))
        .send()
        .await
        .expect("post bulk import");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn resync_detects_conflict_and_resolution_settles_it() {
    let app = spawn_app().await.expect("spawn app");
    seed(&app).await;
    app.tracker.put("PROJ-1", json!({ "summary": "Original" }));

    let job: JsonValue = app
        .client
        .post(app.url("/sync/import"))
        .json(&json!({ "jiraKey": "PROJ-1", "projectKey": "PROJ" }))
        .send()
        .await
        .expect("import")
        .json()
        .await
        .expect("parse job");
    wait_for_job(&app, job["id"].as_str().expect("job id")).await;

    let mappings: JsonValue = app
        .client
        .get(app.url("/sync/mappings"))
        .send()
        .await
        .expect("list mappings")
        .json()
        .await
        .expect("parse mappings");
    let mapping = &mappings["mappings"][0];
    let mapping_id = mapping["id"].as_str().expect("mapping id");
    let brd_id = mapping["brd_id"].as_str().expect("brd id");

    // Both sides edit the same field after the import.
    app.tracker.put("PROJ-1", json!({ "summary": "Remote edit" }));
    app.brds.put(brd_id, json!({ "title": "Local edit" }));

    let resync: JsonValue = app
        .client
        .post(app.url(&format!("/sync/mappings/{}/resync", mapping_id)))
        .json(&json!({}))
        .send()
        .await
        .expect("resync")
        .json()
        .await
        .expect("parse job");
    let finished = wait_for_job(&app, resync["id"].as_str().expect("job id")).await;
    assert_eq!(finished["status"], "completed");

    let conflicts: JsonValue = app
        .client
        .get(app.url("/sync/conflicts?status=pending"))
        .send()
        .await
        .expect("list conflicts")
        .json()
        .await
        .expect("parse conflicts");
    let pending = conflicts["conflicts"].as_array().expect("conflicts");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["field"], "title");
    assert_eq!(pending[0]["local_value"], "Local edit");
    assert_eq!(pending[0]["remote_value"], "Remote edit");

    let conflict_id = pending[0]["id"].as_str().expect("conflict id");
    let resolved: JsonValue = app
        .client
        .post(app.url(&format!("/sync/conflicts/{}/resolve", conflict_id)))
        .json(&json!({ "strategy": "keep_remote", "resolvedBy": "pm-1" }))
        .send()
        .await
        .expect("resolve")
        .json()
        .await
        .expect("parse resolution");
    assert_eq!(resolved["conflict"]["status"], "resolved");
    assert_eq!(resolved["conflict"]["resolved_value"], "Remote edit");
    assert_eq!(resolved["conflict"]["resolved_by"], "pm-1");

    // A settled conflict never changes again.
    let again = app
        .client
        .post(app.url(&format!("/sync/conflicts/{}/resolve", conflict_id)))
        .json(&json!({ "strategy": "keep_local" }))
        .send()
        .await
        .expect("second resolve");
    assert_eq!(again.status(), 409);
}

#[tokio::test]
async fn disabled_mapping_rejects_resync() {
    let app = spawn_app().await.expect("spawn app");
    seed(&app).await;
    app.tracker.put("PROJ-1", json!({ "summary": "One" }));

    let job: JsonValue = app
        .client
        .post(app.url("/sync/import"))
        .json(&json!({ "jiraKey": "PROJ-1", "projectKey": "PROJ" }))
        .send()
        .await
        .expect("import")
        .json()
        .await
        .expect("parse job");
    wait_for_job(&app, job["id"].as_str().expect("job id")).await;

    let mappings: JsonValue = app
        .client
        .get(app.url("/sync/mappings"))
        .send()
        .await
        .expect("list mappings")
        .json()
        .await
        .expect("parse mappings");
    let mapping_id = mappings["mappings"][0]["id"].as_str().expect("mapping id");

    let disabled: JsonValue = app
        .client
        .post(app.url(&format!("/sync/mappings/{}/disable", mapping_id)))
        .send()
        .await
        .expect("disable")
        .json()
        .await
        .expect("parse mapping");
    assert_eq!(disabled["sync_enabled"], false);

    let resync = app
        .client
        .post(app.url(&format!("/sync/mappings/{}/resync", mapping_id)))
        .json(&json!({}))
        .send()
        .await
        .expect("resync");
    assert_eq!(resync.status(), 400);
}

#[tokio::test]
async fn job_listing_filters_and_validates() {
    let app = spawn_app().await.expect("spawn app");
    seed(&app).await;
    app.tracker.put("PROJ-1", json!({ "summary": "One" }));

    let job: JsonValue = app
        .client
        .post(app.url("/sync/import"))
        .json(&json!({ "jiraKey": "PROJ-1", "projectKey": "PROJ" }))
        .send()
        .await
        .expect("import")
        .json()
        .await
        .expect("parse job");
    wait_for_job(&app, job["id"].as_str().expect("job id")).await;

    let completed: JsonValue = app
        .client
        .get(app.url("/sync/jobs?status=completed"))
        .send()
        .await
        .expect("list jobs")
        .json()
        .await
        .expect("parse jobs");
    assert_eq!(completed["jobs"].as_array().expect("jobs").len(), 1);

    let bogus = app
        .client
        .get(app.url("/sync/jobs?status=bogus"))
        .send()
        .await
        .expect("list jobs");
    assert_eq!(bogus.status(), 400);

    let missing = app
        .client
        .get(app.url(&format!("/sync/jobs/{}", uuid::Uuid::new_v4())))
        .send()
        .await
        .expect("get job");
    assert_eq!(missing.status(), 404);

    let stats: JsonValue = app
        .client
        .get(app.url("/sync/queue/stats"))
        .send()
        .await
        .expect("queue stats")
        .json()
        .await
        .expect("parse stats");
    assert_eq!(stats["completed"], 1);
}

#[tokio::test]
async fn field_mapping_creation_is_validated() {
    let app = spawn_app().await.expect("spawn app");

    // Non-invertible transform on a bidirectional rule
    let bad = app
        .client
        .post(app.url("/sync/field-mappings"))
        .json(&json!({
            "sourceField": "budget",
            "targetField": "story_points",
            "direction": "bidirectional",
            "transform": "budget_to_story_points",
        }))
        .send()
        .await
        .expect("post rule");
    assert_eq!(bad.status(), 400);

    let good = app
        .client
        .post(app.url("/sync/field-mappings"))
        .json(&json!({
            "sourceField": "budget",
            "targetField": "story_points",
            "direction": "brd_to_jira",
            "transform": "budget_to_story_points",
            "isCustomField": true,
            "jiraFieldId": "customfield_10016",
        }))
        .send()
        .await
        .expect("post rule");
    assert_eq!(good.status(), 201);
    let rule: JsonValue = good.json().await.expect("parse rule");
    assert_eq!(rule["transform"], "budget_to_story_points");

    let listed: JsonValue = app
        .client
        .get(app.url("/sync/field-mappings"))
        .send()
        .await
        .expect("list rules")
        .json()
        .await
        .expect("parse rules");
    assert_eq!(listed["field_mappings"].as_array().expect("rules").len(), 1);
}
