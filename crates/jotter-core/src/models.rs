//! Domain models for jotter.
//!
//! Row types derive `sqlx::FromRow` and map one-to-one onto the tables in
//! `migrations/`. Request types carry the allow-listed fields each API verb
//! accepts; `validate()` enforces the minimum-content rules before anything
//! touches the database.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::cron::CronSpec;
use crate::error::{Error, Result};

// =============================================================================
// ORIGIN
// =============================================================================

/// Where a row came from: typed by the user or derived by a pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    User,
    Text,
    Audio,
    Image,
    Schedule,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::User => "user",
            Origin::Text => "text",
            Origin::Audio => "audio",
            Origin::Image => "image",
            Origin::Schedule => "schedule",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Origin::User),
            "text" => Ok(Origin::Text),
            "audio" => Ok(Origin::Audio),
            "image" => Ok(Origin::Image),
            "schedule" => Ok(Origin::Schedule),
            other => Err(Error::InvalidInput(format!("unknown origin '{other}'"))),
        }
    }
}

impl TryFrom<String> for Origin {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

// =============================================================================
// USER
// =============================================================================

/// Account resolved from the identity provider's opaque subject.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub external_id: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// NOTE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub text: Option<String>,
    pub audio_key: Option<String>,
    pub image_key: Option<String>,
    pub audio_transcript: Option<String>,
    pub image_description: Option<String>,
    pub image_text: Option<String>,
    pub audio_processed: bool,
    pub image_processed: bool,
    pub text_processed: bool,
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// All textual content available for extraction, in a stable order.
    pub fn content_text(&self) -> String {
        [
            self.text.as_deref(),
            self.audio_transcript.as_deref(),
            self.image_description.as_deref(),
            self.image_text.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    /// True once every media object on the note has been processed.
    pub fn media_processed(&self) -> bool {
        (!has_content(&self.audio_key) || self.audio_processed)
            && (!has_content(&self.image_key) || self.image_processed)
    }

    /// Pipeline stages to queue when the note is created.
    pub fn initial_jobs(&self) -> Vec<JobType> {
        let mut jobs = Vec::new();
        if has_content(&self.audio_key) {
            jobs.push(JobType::TranscribeAudio);
        }
        if has_content(&self.image_key) {
            jobs.push(JobType::DescribeImage);
        }
        if jobs.is_empty() {
            jobs.push(JobType::ExtractEntities);
        }
        jobs
    }

    /// Origin recorded on rows extracted from this note.
    pub fn derived_origin(&self) -> Origin {
        if has_content(&self.text) {
            Origin::Text
        } else if has_content(&self.audio_key) {
            Origin::Audio
        } else if has_content(&self.image_key) {
            Origin::Image
        } else {
            Origin::Text
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub text: Option<String>,
    pub audio_key: Option<String>,
    pub image_key: Option<String>,
}

impl CreateNoteRequest {
    pub fn validate(&self) -> Result<()> {
        if has_content(&self.text) || has_content(&self.audio_key) || has_content(&self.image_key)
        {
            Ok(())
        } else {
            Err(Error::InvalidInput(
                "note needs at least one of text, audio_key or image_key".into(),
            ))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
    pub text: Option<String>,
}

impl UpdateNoteRequest {
    pub fn validate(&self) -> Result<()> {
        reject_blank("text", &self.text)
    }
}

// =============================================================================
// TASK / OCCURRENCE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub note_id: Option<i64>,
    pub summary: String,
    pub description: Option<String>,
    pub tagged: bool,
    pub created_at: DateTime<Utc>,
    /// Normalized names of assigned tags.
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub note_id: Option<i64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> Result<()> {
        require("summary", &self.summary)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl UpdateTaskRequest {
    pub fn validate(&self) -> Result<()> {
        reject_blank("summary", &self.summary)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Occurrence {
    pub id: i64,
    pub task_id: i64,
    pub priority: i32,
    pub completed: bool,
    pub time: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub origin: Origin,
    pub note_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOccurrenceRequest {
    pub priority: Option<i32>,
    pub completed: Option<bool>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOccurrenceRequest {
    pub priority: Option<i32>,
    pub completed: Option<bool>,
    pub time: Option<DateTime<Utc>>,
}

// =============================================================================
// LINK
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Link {
    pub id: i64,
    pub user_id: i64,
    pub note_id: Option<i64>,
    pub url: String,
    pub description: Option<String>,
    pub tagged: bool,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateLinkRequest {
    pub note_id: Option<i64>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl CreateLinkRequest {
    pub fn validate(&self) -> Result<()> {
        require("url", &self.url)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLinkRequest {
    pub url: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl UpdateLinkRequest {
    pub fn validate(&self) -> Result<()> {
        reject_blank("url", &self.url)
    }
}

// =============================================================================
// METRIC / DATA
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Metric {
    pub id: i64,
    pub user_id: i64,
    /// Normalized lookup key, unique per user.
    pub name: String,
    pub display_name: String,
    pub tagged: bool,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    /// Data points inside the requested window; filled by the list query.
    #[sqlx(skip)]
    #[serde(default)]
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMetricRequest {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl CreateMetricRequest {
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMetricRequest {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl UpdateMetricRequest {
    pub fn validate(&self) -> Result<()> {
        reject_blank("name", &self.name)
    }
}

/// One timestamped value of a metric.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DataPoint {
    pub id: i64,
    pub metric_id: i64,
    pub value: f64,
    pub units: Option<String>,
    pub time: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub origin: Origin,
    pub note_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDataRequest {
    pub value: Option<f64>,
    pub units: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl CreateDataRequest {
    pub fn validate(&self) -> Result<()> {
        match self.value {
            Some(v) if v.is_finite() => Ok(()),
            Some(_) => Err(Error::InvalidInput("value must be a finite number".into())),
            None => Err(Error::InvalidInput("value is required".into())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDataRequest {
    pub value: Option<f64>,
    pub units: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl UpdateDataRequest {
    pub fn validate(&self) -> Result<()> {
        match self.value {
            Some(v) if !v.is_finite() => {
                Err(Error::InvalidInput("value must be a finite number".into()))
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// TAG
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTagRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTagRequest {
    pub name: Option<String>,
}

/// Entity kinds that carry a tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagTarget {
    Task(i64),
    Link(i64),
    Metric(i64),
}

impl TagTarget {
    pub fn id(&self) -> i64 {
        match self {
            TagTarget::Task(id) | TagTarget::Link(id) | TagTarget::Metric(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TagTarget::Task(_) => "task",
            TagTarget::Link(_) => "link",
            TagTarget::Metric(_) => "metric",
        }
    }
}

impl fmt::Display for TagTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

// =============================================================================
// SCHEDULES
// =============================================================================

/// Recurring data point definition (one per metric).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DataSchedule {
    pub id: i64,
    pub metric_id: i64,
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month: String,
    pub day_of_week: String,
    pub next_run: DateTime<Utc>,
    pub period_seconds: Option<i64>,
    pub value: f64,
    pub units: Option<String>,
}

impl DataSchedule {
    pub fn cron_spec(&self) -> Result<CronSpec> {
        CronSpec::from_fields(
            &self.minute,
            &self.hour,
            &self.day_of_month,
            &self.month,
            &self.day_of_week,
        )
    }
}

/// Recurring occurrence definition (one per task).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OccurrenceSchedule {
    pub id: i64,
    pub task_id: i64,
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month: String,
    pub day_of_week: String,
    pub next_run: DateTime<Utc>,
    pub period_seconds: Option<i64>,
    pub priority: i32,
}

impl OccurrenceSchedule {
    pub fn cron_spec(&self) -> Result<CronSpec> {
        CronSpec::from_fields(
            &self.minute,
            &self.hour,
            &self.day_of_month,
            &self.month,
            &self.day_of_week,
        )
    }
}

/// Cron fields as they arrive in a request body; absent fields mean `*`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronFieldsInput {
    pub minute: Option<String>,
    pub hour: Option<String>,
    pub day_of_month: Option<String>,
    pub month: Option<String>,
    pub day_of_week: Option<String>,
}

impl CronFieldsInput {
    pub fn is_empty(&self) -> bool {
        self.minute.is_none()
            && self.hour.is_none()
            && self.day_of_month.is_none()
            && self.month.is_none()
            && self.day_of_week.is_none()
    }

    /// Parse with `*` for every missing field.
    pub fn to_spec(&self) -> Result<CronSpec> {
        self.overlay(&CronSpec::every_minute())
    }

    /// Parse, taking missing fields from `base`.
    pub fn overlay(&self, base: &CronSpec) -> Result<CronSpec> {
        let pick = |input: &Option<String>, current: String| -> String {
            input.clone().unwrap_or(current)
        };
        CronSpec::from_fields(
            &pick(&self.minute, base.minute.to_string()),
            &pick(&self.hour, base.hour.to_string()),
            &pick(&self.day_of_month, base.day_of_month.to_string()),
            &pick(&self.month, base.month.to_string()),
            &pick(&self.day_of_week, base.day_of_week.to_string()),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDataScheduleRequest {
    #[serde(flatten)]
    pub cron: CronFieldsInput,
    pub period_seconds: Option<i64>,
    pub value: Option<f64>,
    pub units: Option<String>,
}

impl CreateDataScheduleRequest {
    pub fn validate(&self) -> Result<CronSpec> {
        validate_period(self.period_seconds)?;
        CreateDataRequest {
            value: self.value,
            ..Default::default()
        }
        .validate()?;
        self.cron.to_spec()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOccurrenceScheduleRequest {
    #[serde(flatten)]
    pub cron: CronFieldsInput,
    pub period_seconds: Option<i64>,
    pub priority: Option<i32>,
}

impl CreateOccurrenceScheduleRequest {
    pub fn validate(&self) -> Result<CronSpec> {
        validate_period(self.period_seconds)?;
        self.cron.to_spec()
    }
}

/// PATCH body for either schedule kind; fields not meaningful for a kind are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    #[serde(flatten)]
    pub cron: CronFieldsInput,
    /// `Some(None)` clears the period; `None` leaves it unchanged.
    #[serde(default, with = "double_option")]
    pub period_seconds: Option<Option<i64>>,
    pub value: Option<f64>,
    pub units: Option<String>,
    pub priority: Option<i32>,
}

impl UpdateScheduleRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(period) = self.period_seconds {
            validate_period(period)?;
        }
        UpdateDataRequest {
            value: self.value,
            ..Default::default()
        }
        .validate()
    }

    /// True when the PATCH changes anything that affects `next_run`.
    pub fn changes_timing(&self) -> bool {
        !self.cron.is_empty() || self.period_seconds.is_some()
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Option<i64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<i64>>, D::Error> {
        Option::<i64>::deserialize(deserializer).map(Some)
    }
}

fn validate_period(period_seconds: Option<i64>) -> Result<()> {
    match period_seconds {
        Some(p) if p <= 0 => Err(Error::InvalidInput(format!(
            "period_seconds must be positive, got {p}"
        ))),
        _ => Ok(()),
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// Pipeline stage a queued job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Transcribe a note's audio object
    TranscribeAudio,
    /// Describe a note's image object
    DescribeImage,
    /// Extract metrics, links and tasks from note text
    ExtractEntities,
    /// Assign tags to entities derived from a note
    Tagging,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::TranscribeAudio => "transcribe_audio",
            JobType::DescribeImage => "describe_image",
            JobType::ExtractEntities => "extract_entities",
            JobType::Tagging => "tagging",
        }
    }

    /// Default priority for this job type (higher = more urgent)
    pub fn default_priority(&self) -> i32 {
        match self {
            // Media stages gate extraction
            JobType::TranscribeAudio | JobType::DescribeImage => 6,
            JobType::ExtractEntities => 4,
            JobType::Tagging => 2,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transcribe_audio" => Ok(JobType::TranscribeAudio),
            "describe_image" => Ok(JobType::DescribeImage),
            "extract_entities" => Ok(JobType::ExtractEntities),
            "tagging" => Ok(JobType::Tagging),
            other => Err(Error::Job(format!("unknown job type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Finished without effect because of a data problem; never retried.
    Skipped,
    /// Dead-lettered after exhausting retries.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Skipped => "skipped",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "skipped" => Ok(JobStatus::Skipped),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Job(format!("unknown job status '{other}'"))),
        }
    }
}

/// Message carried between pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub entity_id: i64,
    pub origin: Origin,
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub note_id: Option<i64>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Decode the stage payload.
    pub fn payload(&self) -> Result<JobPayload> {
        let raw = self
            .payload
            .clone()
            .ok_or_else(|| Error::Job(format!("job {} has no payload", self.id)))?;
        Ok(serde_json::from_value(raw)?)
    }
}

/// Queue counts by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub skipped: i64,
    pub failed: i64,
}

// =============================================================================
// HELPERS
// =============================================================================

/// True when the value is present and not blank.
pub fn has_content(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn require(field: &str, value: &Option<String>) -> Result<()> {
    if has_content(value) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{field} is required")))
    }
}

fn reject_blank(field: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(Error::InvalidInput(format!("{field} cannot be empty")))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_round_trip() {
        for origin in [
            Origin::User,
            Origin::Text,
            Origin::Audio,
            Origin::Image,
            Origin::Schedule,
        ] {
            assert_eq!(origin.as_str().parse::<Origin>().unwrap(), origin);
        }
        assert!("email".parse::<Origin>().is_err());
    }

    #[test]
    fn test_origin_serde_lowercase() {
        let json = serde_json::to_string(&Origin::Schedule).unwrap();
        assert_eq!(json, "\"schedule\"");
    }

    #[test]
    fn test_note_requires_content() {
        assert!(CreateNoteRequest::default().validate().is_err());
        let blank = CreateNoteRequest {
            text: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.validate().is_err());
        let audio = CreateNoteRequest {
            audio_key: Some("audio/abc.m4a".into()),
            ..Default::default()
        };
        assert!(audio.validate().is_ok());
    }

    #[test]
    fn test_note_content_text_joins_derived_fields() {
        let note = Note {
            id: 1,
            user_id: 1,
            text: Some("ran 5k".into()),
            audio_key: None,
            image_key: Some("img/1.png".into()),
            audio_transcript: None,
            image_description: Some("a running watch".into()),
            image_text: Some("  ".into()),
            audio_processed: false,
            image_processed: true,
            text_processed: false,
            created_at: Utc::now(),
        };
        assert_eq!(note.content_text(), "ran 5k\n\na running watch");
        assert_eq!(note.derived_origin(), Origin::Text);
    }

    #[test]
    fn test_note_initial_jobs_and_media_state() {
        let mut note = Note {
            id: 2,
            user_id: 1,
            text: Some("hello".into()),
            audio_key: Some("audio/2026/10/a.m4a".into()),
            image_key: Some("image/2026/10/b.png".into()),
            audio_transcript: None,
            image_description: None,
            image_text: None,
            audio_processed: false,
            image_processed: false,
            text_processed: false,
            created_at: Utc::now(),
        };
        assert_eq!(
            note.initial_jobs(),
            vec![JobType::TranscribeAudio, JobType::DescribeImage]
        );
        assert!(!note.media_processed());
        note.audio_processed = true;
        assert!(!note.media_processed());
        note.image_processed = true;
        assert!(note.media_processed());

        note.audio_key = None;
        note.image_key = None;
        assert_eq!(note.initial_jobs(), vec![JobType::ExtractEntities]);
        assert!(note.media_processed());
    }

    #[test]
    fn test_data_value_required_and_finite() {
        assert!(CreateDataRequest::default().validate().is_err());
        let nan = CreateDataRequest {
            value: Some(f64::NAN),
            ..Default::default()
        };
        assert!(nan.validate().is_err());
        let ok = CreateDataRequest {
            value: Some(75.5),
            units: Some("bpm".into()),
            time: None,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_patch_rejects_blank_required_fields() {
        let patch = UpdateTaskRequest {
            summary: Some("".into()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        assert!(UpdateTaskRequest::default().validate().is_ok());

        let patch = UpdateNoteRequest {
            text: Some(" \n\t ".into()),
        };
        assert!(matches!(patch.validate(), Err(Error::InvalidInput(_))));
        assert!(UpdateNoteRequest::default().validate().is_ok());
    }

    #[test]
    fn test_schedule_request_defaults_to_wildcards() {
        let req: CreateOccurrenceScheduleRequest =
            serde_json::from_str(r#"{"minute":"0","hour":"5","priority":2}"#).unwrap();
        let spec = req.validate().unwrap();
        assert_eq!(spec.to_string(), "0 5 * * *");
        assert_eq!(req.priority, Some(2));
    }

    #[test]
    fn test_schedule_request_rejects_bad_period() {
        let req = CreateDataScheduleRequest {
            period_seconds: Some(0),
            value: Some(1.0),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_schedule_patch_overlays_existing_fields() {
        let base: CronSpec = "0 5 * * *".parse().unwrap();
        let patch = CronFieldsInput {
            hour: Some("7".into()),
            ..Default::default()
        };
        assert_eq!(patch.overlay(&base).unwrap().to_string(), "0 7 * * *");
    }

    #[test]
    fn test_schedule_patch_period_tristate() {
        let absent: UpdateScheduleRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.period_seconds, None);
        assert!(!absent.changes_timing());

        let cleared: UpdateScheduleRequest =
            serde_json::from_str(r#"{"period_seconds":null}"#).unwrap();
        assert_eq!(cleared.period_seconds, Some(None));
        assert!(cleared.changes_timing());

        let set: UpdateScheduleRequest =
            serde_json::from_str(r#"{"period_seconds":30}"#).unwrap();
        assert_eq!(set.period_seconds, Some(Some(30)));
    }

    #[test]
    fn test_job_type_round_trip() {
        for jt in [
            JobType::TranscribeAudio,
            JobType::DescribeImage,
            JobType::ExtractEntities,
            JobType::Tagging,
        ] {
            assert_eq!(jt.as_str().parse::<JobType>().unwrap(), jt);
            let json = serde_json::to_value(jt).unwrap();
            assert_eq!(json, serde_json::Value::String(jt.as_str().to_string()));
        }
    }

    #[test]
    fn test_job_payload_decode() {
        let job = Job {
            id: Uuid::now_v7(),
            note_id: Some(9),
            job_type: JobType::ExtractEntities,
            status: JobStatus::Pending,
            priority: 4,
            payload: Some(serde_json::json!({"entity_id": 9, "origin": "audio"})),
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let payload = job.payload().unwrap();
        assert_eq!(payload.entity_id, 9);
        assert_eq!(payload.origin, Origin::Audio);
    }

    #[test]
    fn test_tag_target_accessors() {
        let t = TagTarget::Metric(12);
        assert_eq!(t.id(), 12);
        assert_eq!(t.kind(), "metric");
        assert_eq!(t.to_string(), "metric 12");
    }
}
