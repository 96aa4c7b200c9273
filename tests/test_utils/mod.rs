//! Test utilities for integration testing.
//!
//! Provides an in-memory SQLite database with migrations applied, fake
//! Jira and BRD backends, and a helper that runs the full application
//! (HTTP server plus worker pool) on an ephemeral port.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use conductor_sync::clients::{
    BrdDocument, BrdRef, BrdStore, IssueTracker, RemoteIssue, RemoteIssueRef, SyncError,
};
use conductor_sync::config::AppConfig;
use conductor_sync::server::{AppState, create_app};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// In-memory Jira standing in for the real tracker.
#[derive(Default)]
pub struct FakeTracker {
    issues: Mutex<HashMap<String, RemoteIssue>>,
    seq: AtomicUsize,
}

impl FakeTracker {
    pub fn put(&self, key: &str, fields: JsonValue) {
        let issue = RemoteIssue {
            key: key.to_string(),
            project_key: key.split('-').next().map(|s| s.to_string()),
            fields,
            updated_at: Some(Utc::now()),
        };
        self.issues
            .lock()
            .expect("tracker lock")
            .insert(key.to_string(), issue);
    }

    pub fn get(&self, key: &str) -> Option<RemoteIssue> {
        self.issues.lock().expect("tracker lock").get(key).cloned()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn fetch_issue(&self, key: &str) -> Result<RemoteIssue, SyncError> {
        self.get(key)
            .ok_or_else(|| SyncError::not_found(format!("Issue {} does not exist", key)))
    }

    async fn create_issue(
        &self,
        project_key: &str,
        fields: &JsonValue,
    ) -> Result<RemoteIssueRef, SyncError> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let key = format!("{}-{}", project_key, n);
        self.put(&key, fields.clone());
        Ok(RemoteIssueRef {
            key,
            id: Some(n.to_string()),
        })
    }

    async fn update_issue(&self, key: &str, fields: &JsonValue) -> Result<(), SyncError> {
        let mut issues = self.issues.lock().expect("tracker lock");
        let issue = issues
            .get_mut(key)
            .ok_or_else(|| SyncError::not_found(format!("Issue {} does not exist", key)))?;
        issue.fields = fields.clone();
        issue.updated_at = Some(Utc::now());
        Ok(())
    }
}

/// In-memory BRD document store.
#[derive(Default)]
pub struct FakeBrdStore {
    docs: Mutex<HashMap<String, BrdDocument>>,
    seq: AtomicUsize,
}

impl FakeBrdStore {
    pub fn put(&self, id: &str, fields: JsonValue) {
        let doc = BrdDocument {
            id: id.to_string(),
            fields,
            updated_at: Some(Utc::now()),
        };
        self.docs
            .lock()
            .expect("brd lock")
            .insert(id.to_string(), doc);
    }

    pub fn get(&self, id: &str) -> Option<BrdDocument> {
        self.docs.lock().expect("brd lock").get(id).cloned()
    }
}

#[async_trait]
impl BrdStore for FakeBrdStore {
    async fn fetch_brd(&self, id: &str) -> Result<BrdDocument, SyncError> {
        self.get(id)
            .ok_or_else(|| SyncError::not_found(format!("BRD {} does not exist", id)))
    }

    async fn create_brd(&self, fields: &JsonValue) -> Result<BrdRef, SyncError> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("brd-{}", n);
        self.put(&id, fields.clone());
        Ok(BrdRef { id })
    }

    async fn update_brd(&self, id: &str, fields: &JsonValue) -> Result<(), SyncError> {
        let mut docs = self.docs.lock().expect("brd lock");
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| SyncError::not_found(format!("BRD {} does not exist", id)))?;
        doc.fields = fields.clone();
        doc.updated_at = Some(Utc::now());
        Ok(())
    }
}

/// A running application instance backed by fakes.
pub struct TestApp {
    pub base_url: String,
    pub db: DatabaseConnection,
    pub state: AppState,
    pub tracker: Arc<FakeTracker>,
    pub brds: Arc<FakeBrdStore>,
    pub client: reqwest::Client,
    shutdown: CancellationToken,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Spawn the full application (router plus worker pool) on an ephemeral
/// port with the given configuration.
pub async fn spawn_app_with(mut config: AppConfig) -> Result<TestApp> {
    // Keep the queue snappy so tests do not wait on the poll interval.
    config.sync.tick_interval_ms = 25;

    let db = setup_test_db().await?;
    let tracker = Arc::new(FakeTracker::default());
    let brds = Arc::new(FakeBrdStore::default());
    let state = AppState::build(config, db.clone(), tracker.clone(), brds.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn(state.queue.clone().run(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = create_app(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(TestApp {
        base_url: format!("http://{}", addr),
        db,
        state,
        tracker,
        brds,
        client: reqwest::Client::new(),
        shutdown,
    })
}

/// Spawn the application with default test configuration.
pub async fn spawn_app() -> Result<TestApp> {
    let config = AppConfig {
        profile: "test".to_string(),
        ..AppConfig::default()
    };
    spawn_app_with(config).await
}

/// Poll a job until it reaches a terminal status, returning its final
/// JSON representation.
pub async fn wait_for_job(app: &TestApp, job_id: &str) -> JsonValue {
    for _ in 0..400 {
        let job: JsonValue = app
            .client
            .get(app.url(&format!("/sync/jobs/{}", job_id)))
            .send()
            .await
            .expect("fetch job")
            .json()
            .await
            .expect("parse job");

        if matches!(
            job["status"].as_str(),
            Some("completed") | Some("failed") | Some("cancelled")
        ) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} did not reach a terminal status in time", job_id);
}
