//! End-to-end HTTP tests against a migrated database.
//!
//! Run with `cargo test -p jotter-api -- --ignored` and `DATABASE_URL` set.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use jotter_api::{router, ApiConfig, AppState};
use jotter_db::test_fixtures::TestDatabase;
use jotter_db::FilesystemBackend;

struct Harness {
    app: Router,
    test_db: TestDatabase,
    _store: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let test_db = TestDatabase::new().await;
        let store = TempDir::new().unwrap();
        let config = ApiConfig {
            object_store_path: store.path().to_path_buf(),
            ..ApiConfig::default()
        };
        let storage = Arc::new(FilesystemBackend::new(store.path()));
        let app = router(AppState::new(test_db.db.clone(), storage, config));
        Self {
            app,
            test_db,
            _store: store,
        }
    }

    async fn send(&self, subject: &str, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-auth-subject", subject);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn create(&self, subject: &str, uri: &str, body: Value) -> i64 {
        let (status, json) = self.send(subject, "POST", uri, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "POST {uri}: {json}");
        assert_eq!(json["status"], json!("created"));
        json["id"].as_i64().unwrap()
    }

    async fn queued_jobs(&self, note_id: i64) -> Vec<String> {
        sqlx::query_scalar("SELECT job_type FROM job_queue WHERE note_id = $1 ORDER BY job_type")
            .bind(note_id)
            .fetch_all(&self.test_db.pool)
            .await
            .unwrap()
    }

    async fn finish(self, subjects: &[&str]) {
        for subject in subjects {
            let (status, _) = self.send(subject, "DELETE", "/user", None).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
        self.test_db.cleanup().await;
    }
}

fn subject() -> String {
    format!("api-test-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_note_create_queues_extraction_and_is_owner_scoped() {
    let h = Harness::new().await;
    let (alice, bob) = (subject(), subject());

    let note_id = h.create(&alice, "/note", json!({"text": "ran 5km, heart rate 150"})).await;
    assert_eq!(h.queued_jobs(note_id).await, vec!["extract_entities"]);

    let (status, json) = h.send(&alice, "GET", &format!("/note/{note_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["text"], json!("ran 5km, heart rate 150"));

    // Bob sees nothing and changes nothing
    let (status, _) = h.send(&bob, "GET", &format!("/note/{note_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, json) = h.send(&bob, "GET", &format!("/note?id={note_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], json!([]));
    assert_eq!(json["pagination"]["total"], json!(0));
    let (status, _) = h
        .send(&bob, "PATCH", &format!("/note/{note_id}"), Some(json!({"text": "mine now"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h.send(&bob, "DELETE", &format!("/note/{note_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = h.send(&alice, "GET", &format!("/note/{note_id}"), None).await;
    assert_eq!(json["data"]["text"], json!("ran 5km, heart rate 150"));

    let (status, _) = h.send(&alice, "DELETE", &format!("/note/{note_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    h.finish(&[&alice, &bob]).await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_note_validation() {
    let h = Harness::new().await;
    let alice = subject();

    let (status, json) = h.send(&alice, "POST", "/note", Some(json!({"text": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], json!("error"));

    let (status, _) = h
        .send(&alice, "POST", "/note", Some(json!({"audio_key": "../etc/passwd"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.send(&alice, "GET", "/note/not-a-number", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // PATCH trims like POST and refuses blank text
    let note_id = h.create(&alice, "/note", json!({"text": "slept 7h"})).await;
    let (status, _) = h
        .send(&alice, "PATCH", &format!("/note/{note_id}"), Some(json!({"text": "  \t "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, json) = h
        .send(&alice, "PATCH", &format!("/note/{note_id}"), Some(json!({"text": "  slept 8h  "})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["text"], json!("slept 8h"));

    // A lookback too large for the calendar is a client error, not a crash
    let (status, json) = h.send(&alice, "GET", "/note?start=100000000d", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], json!("error"));

    h.finish(&[&alice]).await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_media_note_queues_media_stages() {
    let h = Harness::new().await;
    let alice = subject();

    let note_id = h
        .create(
            &alice,
            "/note",
            json!({"audio_key": "audio/2026/10/a.m4a", "image_key": "image/2026/10/b.png"}),
        )
        .await;
    assert_eq!(
        h.queued_jobs(note_id).await,
        vec!["describe_image", "transcribe_audio"]
    );

    h.finish(&[&alice]).await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_task_tags_replace_and_filter() {
    let h = Harness::new().await;
    let alice = subject();

    let task_id = h
        .create(&alice, "/task", json!({"summary": "Buy milk", "tags": ["Errands", "Home"]}))
        .await;

    let (_, json) = h.send(&alice, "GET", "/task?tag=errands", None).await;
    assert_eq!(json["pagination"]["total"], json!(1));

    let (status, json) = h
        .send(&alice, "PATCH", &format!("/task/{task_id}"), Some(json!({"tags": ["Shopping"]})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["tags"], json!(["shopping"]));

    let (_, json) = h.send(&alice, "GET", "/task?tag=errands,home", None).await;
    assert_eq!(json["pagination"]["total"], json!(0));
    let (_, json) = h.send(&alice, "GET", "/task?tag=errands&tag=shopping", None).await;
    assert_eq!(json["pagination"]["total"], json!(1));

    // Occurrences live under the task
    let occurrence_id = h
        .create(&alice, &format!("/task/{task_id}/occurrence"), json!({"priority": 2}))
        .await;
    let (_, json) = h
        .send(&alice, "GET", &format!("/task/{task_id}/occurrence"), None)
        .await;
    assert_eq!(json["data"][0]["id"], json!(occurrence_id));
    assert_eq!(json["data"][0]["origin"], json!("user"));

    h.finish(&[&alice]).await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_link_pagination() {
    let h = Harness::new().await;
    let alice = subject();

    for i in 0..6 {
        h.create(&alice, "/link", json!({"url": format!("https://example.com/{i}")}))
            .await;
    }

    let (_, first) = h.send(&alice, "GET", "/link?limit=4", None).await;
    assert_eq!(first["data"].as_array().unwrap().len(), 4);
    assert_eq!(
        first["pagination"],
        json!({"total": 6, "limit": 4, "offset": 0, "has_more": true})
    );

    let (_, second) = h.send(&alice, "GET", "/link?limit=4&offset=4", None).await;
    assert_eq!(second["data"].as_array().unwrap().len(), 2);
    assert_eq!(second["pagination"]["has_more"], json!(false));

    let (status, _) = h.send(&alice, "GET", "/link?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    h.finish(&[&alice]).await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_metric_data_and_schedule() {
    let h = Harness::new().await;
    let alice = subject();

    let metric_id = h.create(&alice, "/metric", json!({"name": "Heart Rate"})).await;
    let (status, _) = h.send(&alice, "POST", "/metric", Some(json!({"name": "heart  rate"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    h.create(&alice, &format!("/metric/{metric_id}/data"), json!({"value": 150.0, "units": "bpm"}))
        .await;
    let (_, json) = h.send(&alice, "GET", &format!("/metric/{metric_id}"), None).await;
    assert_eq!(json["data"]["name"], json!("heart_rate"));
    assert_eq!(json["data"]["data"][0]["value"], json!(150.0));

    let (status, _) = h
        .send(
            &alice,
            "POST",
            &format!("/metric/{metric_id}/schedule"),
            Some(json!({"minute": "61", "value": 1.0})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    h.create(
        &alice,
        &format!("/metric/{metric_id}/schedule"),
        json!({"minute": "0", "hour": "8", "value": 1.0}),
    )
    .await;
    let (status, _) = h
        .send(&alice, "POST", &format!("/metric/{metric_id}/schedule"), Some(json!({"value": 2.0})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = h
        .send(&alice, "PATCH", &format!("/metric/{metric_id}/schedule"), Some(json!({"hour": "9"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["hour"], json!("9"));

    let (status, _) = h
        .send(&alice, "DELETE", &format!("/metric/{metric_id}/schedule"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = h
        .send(&alice, "GET", &format!("/metric/{metric_id}/schedule"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.finish(&[&alice]).await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_upload_detects_content_type() {
    let h = Harness::new().await;
    let alice = subject();

    let mut png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
    png.extend_from_slice(&[0u8; 32]);
    let boundary = "jotterboundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"x.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(&png);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let upload = |kind: &str| {
        Request::post(format!("/upload?kind={kind}"))
            .header("x-auth-subject", alice.as_str())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body.clone()))
            .unwrap()
    };

    let response = h.app.clone().oneshot(upload("image")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    let key = json["key"].as_str().unwrap();
    assert!(key.starts_with("image/") && key.ends_with(".png"), "key: {key}");

    let response = h.app.clone().oneshot(upload("audio")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    h.finish(&[&alice]).await;
}
