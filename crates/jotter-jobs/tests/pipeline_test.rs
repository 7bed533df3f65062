//! Pipeline stages run directly against the database with mock model backends.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use jotter_db::test_fixtures::TestDatabase;
use jotter_db::{
    generate_object_key, CreateNoteRequest, Database, EntityFilter, FilesystemBackend, ObjectKind,
    StorageBackend,
};
use jotter_inference::extraction::{EXTRACTION_SYSTEM_PROMPT, TAGGING_SYSTEM_PROMPT};
use jotter_inference::mock::MockInferenceBackend;
use jotter_jobs::{
    DescribeImageHandler, ExtractEntitiesHandler, Job, JobContext, JobHandler, JobPayload,
    JobRepository, JobResult, JobStatus, JobType, Note, Origin, TaggingHandler,
    TranscribeAudioHandler,
};

const EXTRACTION_REPLY: &str = r#"{
    "metrics": [{"name": "Resting Heart Rate", "value": 58, "units": "bpm"}],
    "links": [{"url": "https://example.com/training-plan", "description": "training plan"}],
    "tasks": [{"summary": "Book physio", "priority": 3, "completed": false}]
}"#;

fn job_for(note_id: i64, job_type: JobType, origin: Origin) -> JobContext {
    JobContext::new(Job {
        id: Uuid::now_v7(),
        note_id: Some(note_id),
        job_type,
        status: JobStatus::Running,
        priority: job_type.default_priority(),
        payload: Some(
            serde_json::to_value(JobPayload {
                entity_id: note_id,
                origin,
            })
            .unwrap(),
        ),
        result: None,
        error_message: None,
        retry_count: 0,
        max_retries: 3,
        created_at: Utc::now(),
        started_at: Some(Utc::now()),
        completed_at: None,
    })
}

async fn create_note(db: &Database, user: i64, req: CreateNoteRequest) -> Note {
    let mut tx = db.begin().await.unwrap();
    let note = db.notes.create_tx(&mut tx, user, &req).await.unwrap();
    tx.commit().await.unwrap();
    note
}

async fn reload(db: &Database, user: i64, id: i64) -> Note {
    let mut tx = db.begin().await.unwrap();
    db.notes.get_tx(&mut tx, user, id).await.unwrap().unwrap()
}

async fn pending_types(db: &Database, note_id: i64) -> Vec<JobType> {
    db.jobs
        .get_for_note(note_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|j| j.status == JobStatus::Pending)
        .map(|j| j.job_type)
        .collect()
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_text_note_extraction_then_tagging() {
    let mut test_db = TestDatabase::new().await;
    let user = test_db.create_user().await;
    let db = test_db.db.clone();

    let note = create_note(
        &db,
        user,
        CreateNoteRequest {
            text: Some("Resting HR 58. Read the plan at example.com. Need to book physio.".into()),
            ..Default::default()
        },
    )
    .await;

    let mock = MockInferenceBackend::new().with_system_response(EXTRACTION_SYSTEM_PROMPT, EXTRACTION_REPLY);
    let extract = ExtractEntitiesHandler::new(db.clone(), Arc::new(mock.clone()));

    let result = extract.execute(job_for(note.id, JobType::ExtractEntities, Origin::Text)).await;
    let JobResult::Success(Some(data)) = result else {
        panic!("extraction should succeed, got {result:?}");
    };
    assert_eq!(data["created"]["data_points"], 1);
    assert_eq!(data["created"]["links"], 1);
    assert_eq!(data["created"]["tasks"], 1);
    assert!(reload(&db, user, note.id).await.text_processed);
    assert_eq!(pending_types(&db, note.id).await, vec![JobType::Tagging]);

    // Redelivery is a no-op
    let again = extract.execute(job_for(note.id, JobType::ExtractEntities, Origin::Text)).await;
    assert!(matches!(again, JobResult::Skipped(_)));
    assert_eq!(mock.generate_call_count(), 1);

    // Derived rows carry the note's time and origin
    let mut tx = db.begin().await.unwrap();
    let filter = EntityFilter::for_owner(user, Utc::now());
    let (tasks, _) = db.tasks.list_tx(&mut tx, &filter).await.unwrap();
    let (metrics, _) = db.metrics.list_tx(&mut tx, &filter).await.unwrap();
    let (links, _) = db.links.list_tx(&mut tx, &filter).await.unwrap();
    drop(tx);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].note_id, Some(note.id));
    assert_eq!(metrics[0].name, "resting_heart_rate");
    assert_eq!(metrics[0].display_name, "Resting Heart Rate");

    // The model tags the task, names a foreign link id, and ignores the metric
    let tag_reply = json!([
        {"kind": "task", "id": tasks[0].id, "tags": ["Health", "appointments"]},
        {"kind": "link", "id": links[0].id + 1000, "tags": ["spam"]},
    ])
    .to_string();
    let tagging = TaggingHandler::new(
        db.clone(),
        Arc::new(MockInferenceBackend::new().with_system_response(TAGGING_SYSTEM_PROMPT, tag_reply)),
    );
    let result = tagging.execute(job_for(note.id, JobType::Tagging, Origin::Text)).await;
    assert!(matches!(result, JobResult::Success(_)), "got {result:?}");

    let mut tx = db.begin().await.unwrap();
    let task = db.tasks.get_tx(&mut tx, user, tasks[0].id).await.unwrap().unwrap();
    let link = db.links.get_tx(&mut tx, user, links[0].id).await.unwrap().unwrap();
    drop(tx);
    assert!(task.tagged);
    assert_eq!(task.tags, vec!["appointments".to_string(), "health".to_string()]);
    assert!(link.tagged);
    assert!(link.tags.is_empty());

    let again = tagging.execute(job_for(note.id, JobType::Tagging, Origin::Text)).await;
    assert!(matches!(again, JobResult::Skipped(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_audio_and_image_queue_one_extraction() {
    let mut test_db = TestDatabase::new().await;
    let user = test_db.create_user().await;
    let db = test_db.db.clone();
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir.path()));

    let audio_key = generate_object_key(ObjectKind::Audio, "wav", Utc::now());
    let image_key = generate_object_key(ObjectKind::Image, "png", Utc::now());
    storage.write(&audio_key, b"RIFF....WAVE").await.unwrap();
    storage.write(&image_key, b"\x89PNG....").await.unwrap();

    let note = create_note(
        &db,
        user,
        CreateNoteRequest {
            audio_key: Some(audio_key),
            image_key: Some(image_key),
            ..Default::default()
        },
    )
    .await;

    let mock = MockInferenceBackend::new()
        .with_transcript("Ran five kilometres this morning")
        .with_vision_response("A running watch on a wrist.\nTEXT: 5.02 km 24:31");
    let transcribe =
        TranscribeAudioHandler::new(db.clone(), storage.clone(), Some(Arc::new(mock.clone())));
    let describe = DescribeImageHandler::new(db.clone(), storage.clone(), Some(Arc::new(mock.clone())));

    let first = transcribe.execute(job_for(note.id, JobType::TranscribeAudio, Origin::Audio)).await;
    let JobResult::Success(Some(data)) = first else {
        panic!("transcription should succeed, got {first:?}");
    };
    assert_eq!(data["extraction_queued"], false);
    assert!(pending_types(&db, note.id).await.is_empty());

    let second = describe.execute(job_for(note.id, JobType::DescribeImage, Origin::Image)).await;
    let JobResult::Success(Some(data)) = second else {
        panic!("description should succeed, got {second:?}");
    };
    assert_eq!(data["extraction_queued"], true);

    // A duplicate delivery writes nothing and queues nothing
    let dup = transcribe.execute(job_for(note.id, JobType::TranscribeAudio, Origin::Audio)).await;
    assert!(matches!(dup, JobResult::Skipped(_)));
    assert_eq!(pending_types(&db, note.id).await, vec![JobType::ExtractEntities]);

    let stored = reload(&db, user, note.id).await;
    assert_eq!(stored.audio_transcript.as_deref(), Some("Ran five kilometres this morning"));
    assert_eq!(stored.image_description.as_deref(), Some("A running watch on a wrist."));
    assert_eq!(stored.image_text.as_deref(), Some("5.02 km 24:31"));
    assert_eq!(mock.call_count("transcribe"), 1);
    assert_eq!(mock.get_calls()[0].input, "audio/wav:12");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_unconfigured_backend_and_missing_object_let_pipeline_continue() {
    let mut test_db = TestDatabase::new().await;
    let user = test_db.create_user().await;
    let db = test_db.db.clone();
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn StorageBackend> = Arc::new(FilesystemBackend::new(dir.path()));

    let note = create_note(
        &db,
        user,
        CreateNoteRequest {
            text: Some("went for a swim".into()),
            audio_key: Some(generate_object_key(ObjectKind::Audio, "ogg", Utc::now())),
            image_key: Some(generate_object_key(ObjectKind::Image, "jpg", Utc::now())),
        },
    )
    .await;

    // No transcription service configured
    let transcribe = TranscribeAudioHandler::new(db.clone(), storage.clone(), None);
    let result = transcribe.execute(job_for(note.id, JobType::TranscribeAudio, Origin::Audio)).await;
    assert!(matches!(result, JobResult::Skipped(ref r) if r.contains("not configured")));

    // Image object was never uploaded
    let mock = MockInferenceBackend::new();
    let describe = DescribeImageHandler::new(db.clone(), storage, Some(Arc::new(mock.clone())));
    let result = describe.execute(job_for(note.id, JobType::DescribeImage, Origin::Image)).await;
    assert!(matches!(result, JobResult::Skipped(_)));
    assert_eq!(mock.call_count("describe_image"), 0);

    let stored = reload(&db, user, note.id).await;
    assert!(stored.audio_processed && stored.image_processed);
    assert!(stored.audio_transcript.is_none() && stored.image_description.is_none());
    assert_eq!(pending_types(&db, note.id).await, vec![JobType::ExtractEntities]);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_missing_note_is_skipped() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let mock = Arc::new(MockInferenceBackend::new());

    let extract = ExtractEntitiesHandler::new(db.clone(), mock.clone());
    let result = extract.execute(job_for(i64::MAX, JobType::ExtractEntities, Origin::Text)).await;
    assert!(matches!(result, JobResult::Skipped(_)));

    let tagging = TaggingHandler::new(db, mock.clone());
    let result = tagging.execute(job_for(i64::MAX, JobType::Tagging, Origin::Text)).await;
    assert!(matches!(result, JobResult::Skipped(_)));
    assert_eq!(mock.generate_call_count(), 0);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection with migrations applied
async fn test_malformed_model_output_extracts_nothing() {
    let mut test_db = TestDatabase::new().await;
    let user = test_db.create_user().await;
    let db = test_db.db.clone();

    let note = create_note(
        &db,
        user,
        CreateNoteRequest {
            text: Some("nothing much today".into()),
            ..Default::default()
        },
    )
    .await;

    let mock = MockInferenceBackend::new().with_fixed_response("I could not find anything, sorry!");
    let extract = ExtractEntitiesHandler::new(db.clone(), Arc::new(mock));
    let result = extract.execute(job_for(note.id, JobType::ExtractEntities, Origin::Text)).await;

    let JobResult::Success(Some(data)) = result else {
        panic!("malformed output should not fail the job, got {result:?}");
    };
    assert_eq!(data["tagging_queued"], false);
    assert!(reload(&db, user, note.id).await.text_processed);
    assert!(pending_types(&db, note.id).await.is_empty());

    test_db.cleanup().await;
}
